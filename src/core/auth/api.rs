//! Auth API endpoints
//!
//! Provides REST API endpoints for authentication:
//! - POST /api/auth/register - Register a new user
//! - POST /api/auth/login - Login and get tokens
//! - POST /api/auth/refresh - Exchange a refresh token for a new access token
//! - GET /api/auth/profile - Get the current user's profile (guarded)
//! - PUT /api/auth/profile - Partially update the current user's profile (guarded)

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use std::sync::Arc;

use crate::core::auth::guard::{AuthUser, require_access};
use crate::core::auth::jwt::TokenService;
use crate::core::auth::service::{AuthError, AuthService};
use crate::core::db::store::CredentialStore;
use crate::core::models::{
    ApiError, AuthResponse, LoginRequest, RefreshRequest, RefreshResponse, RegisterRequest,
    UpdateProfileRequest, UserProfile, UserSummary,
};

/// Auth API state containing the auth service
#[derive(Clone)]
pub struct AuthApiState {
    pub auth_service: AuthService,
    pub tokens: TokenService,
}

impl AuthApiState {
    pub fn new(store: Arc<dyn CredentialStore>, tokens: TokenService) -> Self {
        Self {
            auth_service: AuthService::new(store, tokens.clone()),
            tokens,
        }
    }
}

impl AuthError {
    /// HTTP status and stable machine-readable code
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AuthError::DuplicateEmail => (StatusCode::BAD_REQUEST, "DUPLICATE_EMAIL"),
            AuthError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "INVALID_INPUT"),
            AuthError::InvalidCredentials => (StatusCode::UNAUTHORIZED, "INVALID_CREDENTIALS"),
            AuthError::MissingToken => (StatusCode::UNAUTHORIZED, "MISSING_TOKEN"),
            AuthError::ExpiredAccessToken | AuthError::InvalidAccessToken => {
                (StatusCode::UNAUTHORIZED, "INVALID_ACCESS_TOKEN")
            }
            AuthError::InvalidRefreshToken => (StatusCode::FORBIDDEN, "INVALID_REFRESH_TOKEN"),
            AuthError::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            AuthError::InternalError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

/// Convert AuthError to API response
impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = match &self {
            AuthError::InternalError(detail) => {
                tracing::error!("Internal error: {}", detail);
                "Server error".to_string()
            }
            // Expired and invalid look the same from outside
            AuthError::ExpiredAccessToken | AuthError::InvalidAccessToken => {
                "Token is not valid".to_string()
            }
            _ => self.to_string(),
        };

        (status, Json(ApiError::new(message, code))).into_response()
    }
}

/// Create the auth API router
pub fn auth_api_router(state: AuthApiState) -> Router {
    let guard = middleware::from_fn_with_state(state.tokens.clone(), require_access);
    let state = Arc::new(state);

    let guarded = Router::new()
        .route(
            "/api/auth/profile",
            get(profile_handler).put(update_profile_handler),
        )
        .route_layer(guard);

    Router::new()
        .route("/api/auth/register", post(register_handler))
        .route("/api/auth/login", post(login_handler))
        .route("/api/auth/refresh", post(refresh_handler))
        .merge(guarded)
        .with_state(state)
}

/// Unwrap a JSON body, turning axum's plain-text rejection into `INVALID_INPUT`
fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, AuthError> {
    body.map(|Json(request)| request).map_err(|rejection| {
        tracing::debug!("Rejected request body: {}", rejection.body_text());
        AuthError::InvalidInput("Invalid request body".to_string())
    })
}

/// POST /api/auth/register
/// Register a new user
async fn register_handler(
    State(state): State<Arc<AuthApiState>>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AuthResponse>), AuthError> {
    let request = json_body(body)?;
    tracing::info!("Registration attempt for email: {}", request.email);

    let response = state.auth_service.register(request).await?;

    tracing::info!("User registered successfully: {}", response.user.email);

    Ok((StatusCode::CREATED, Json(response)))
}

/// POST /api/auth/login
/// Login and get access/refresh tokens
async fn login_handler(
    State(state): State<Arc<AuthApiState>>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>, AuthError> {
    let request = json_body(body)?;
    tracing::info!("Login attempt for email: {}", request.email);

    let response = state.auth_service.login(request).await?;

    tracing::info!("User logged in successfully: {}", response.user.email);

    Ok(Json(response))
}

/// POST /api/auth/refresh
/// Exchange a refresh token for a new access token
async fn refresh_handler(
    State(state): State<Arc<AuthApiState>>,
    body: Result<Json<RefreshRequest>, JsonRejection>,
) -> Result<Json<RefreshResponse>, AuthError> {
    tracing::debug!("Token refresh request");

    // A missing or unreadable body means no token was supplied
    let request = body.map(|Json(request)| request).unwrap_or_default();

    let response = state.auth_service.refresh(request).await?;

    Ok(Json(response))
}

/// GET /api/auth/profile
async fn profile_handler(
    State(state): State<Arc<AuthApiState>>,
    user: AuthUser,
) -> Result<Json<UserProfile>, AuthError> {
    let profile = state.auth_service.profile(user.id).await?;

    Ok(Json(profile))
}

/// PUT /api/auth/profile
/// Absent fields are left untouched
async fn update_profile_handler(
    State(state): State<Arc<AuthApiState>>,
    user: AuthUser,
    body: Result<Json<UpdateProfileRequest>, JsonRejection>,
) -> Result<Json<UserSummary>, AuthError> {
    let request = json_body(body)?;
    let updated = state.auth_service.update_profile(user.id, request).await?;

    tracing::info!("Profile updated for user: {}", user.id);

    Ok(Json(updated))
}
