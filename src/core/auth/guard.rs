//! Access guard
//!
//! Middleware that admits a request only when it carries a valid access token,
//! plus an extractor that hands the verified identity to handlers.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{HeaderMap, header, request::Parts},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::core::auth::jwt::{TokenClass, TokenService};
use crate::core::auth::service::AuthError;

/// Identity verified by [`require_access`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    pub id: Uuid,
}

/// Extract Bearer token from Authorization header
pub fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let auth_header = headers
        .get(header::AUTHORIZATION)
        .ok_or(AuthError::MissingToken)?
        .to_str()
        .map_err(|_| AuthError::InvalidAccessToken)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(AuthError::InvalidAccessToken)?
        .trim();

    if token.is_empty() {
        return Err(AuthError::InvalidAccessToken);
    }

    Ok(token)
}

/// Reject the request unless it carries a valid access token
///
/// Use with `axum::middleware::from_fn_with_state`.
pub async fn require_access(
    State(tokens): State<TokenService>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let user_id = {
        let token = extract_bearer_token(request.headers()).inspect_err(|e| {
            tracing::debug!("Guard rejected {}: {}", request.uri().path(), e);
        })?;

        tokens.verify(token, TokenClass::Access).map_err(|e| {
            let err = AuthError::from(e);
            tracing::debug!("Guard rejected {}: {}", request.uri().path(), err);
            err
        })?
    };

    request.extensions_mut().insert(AuthUser { id: user_id });

    Ok(next.run(request).await)
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // Only present behind require_access
        parts
            .extensions
            .get::<AuthUser>()
            .copied()
            .ok_or(AuthError::MissingToken)
    }
}
