//! Authentication service
//!
//! Business logic behind the auth endpoints: registration, login, access token
//! renewal and profile management. Coordinates the credential store and the
//! token service.

use std::sync::Arc;

use uuid::Uuid;

use crate::core::auth::jwt::{TokenClass, TokenError, TokenService};
use crate::core::db::models::{NewUser, UserChanges};
use crate::core::db::password::MAX_PASSWORD_BYTES;
use crate::core::db::store::{CredentialStore, StoreError};
use crate::core::models::{
    AuthResponse, LoginRequest, RefreshRequest, RefreshResponse, RegisterRequest,
    UpdateProfileRequest, UserProfile, UserSummary,
};

/// Authentication service error types
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("User already exists")]
    DuplicateEmail,

    #[error("{0}")]
    InvalidInput(String),

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Authentication token required")]
    MissingToken,

    #[error("Invalid refresh token")]
    InvalidRefreshToken,

    #[error("Access token expired")]
    ExpiredAccessToken,

    #[error("Invalid access token")]
    InvalidAccessToken,

    #[error("User not found")]
    NotFound,

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => AuthError::NotFound,
            StoreError::DuplicateEmail => AuthError::DuplicateEmail,
            _ => AuthError::InternalError(err.to_string()),
        }
    }
}

/// Access-class verification failures. Refresh verification maps its own errors.
impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired => AuthError::ExpiredAccessToken,
            TokenError::InvalidSignature => AuthError::InvalidAccessToken,
            _ => AuthError::InternalError(err.to_string()),
        }
    }
}

/// Authentication service
#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn CredentialStore>,
    tokens: TokenService,
}

impl AuthService {
    /// Create a new authentication service
    pub fn new(store: Arc<dyn CredentialStore>, tokens: TokenService) -> Self {
        Self { store, tokens }
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    /// Emails are compared and stored trimmed and lower-cased
    fn normalize_email(email: &str) -> String {
        email.trim().to_lowercase()
    }

    /// Validate email format
    fn validate_email(email: &str) -> Result<(), AuthError> {
        let invalid = || AuthError::InvalidInput("Invalid email format".to_string());

        if email.is_empty() || !email.contains('@') {
            return Err(invalid());
        }

        // something@something.something
        let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
        if local.is_empty() || domain.is_empty() || domain.contains('@') {
            return Err(invalid());
        }

        if !domain.contains('.') || domain.split('.').any(|p| p.is_empty()) {
            return Err(invalid());
        }

        Ok(())
    }

    fn require_non_empty(value: &str, field: &str) -> Result<(), AuthError> {
        if value.trim().is_empty() {
            return Err(AuthError::InvalidInput(format!("{field} must not be empty")));
        }
        Ok(())
    }

    /// Non-blank and short enough that bcrypt sees every byte
    fn validate_password(password: &str) -> Result<(), AuthError> {
        Self::require_non_empty(password, "Password")?;
        if password.len() > MAX_PASSWORD_BYTES {
            return Err(AuthError::InvalidInput(format!(
                "Password must be at most {MAX_PASSWORD_BYTES} bytes"
            )));
        }
        Ok(())
    }

    /// Register a new user and issue both tokens
    pub async fn register(&self, request: RegisterRequest) -> Result<AuthResponse, AuthError> {
        let email = Self::normalize_email(&request.email);

        Self::require_non_empty(&request.name, "Name")?;
        Self::validate_email(&email)?;
        Self::validate_password(&request.password)?;

        // Uniqueness is decided by the store, not by a lookup here
        let user = self
            .store
            .create(NewUser {
                name: request.name.trim().to_string(),
                email,
                password: request.password,
                profile_image_url: request.profile_image_url,
            })
            .await?;

        let tokens = self.tokens.issue_pair(user.id)?;

        Ok(AuthResponse {
            user: user.into(),
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
        })
    }

    /// Login an existing user
    ///
    /// Unknown email and wrong password are indistinguishable to the caller.
    pub async fn login(&self, request: LoginRequest) -> Result<AuthResponse, AuthError> {
        let email = Self::normalize_email(&request.email);

        let user = self
            .store
            .authenticate(&email, &request.password)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        let tokens = self.tokens.issue_pair(user.id)?;

        Ok(AuthResponse {
            user: user.into(),
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
        })
    }

    /// Exchange a refresh token for a new access token
    ///
    /// The refresh token itself is not rotated.
    pub async fn refresh(&self, request: RefreshRequest) -> Result<RefreshResponse, AuthError> {
        let token = request
            .refresh_token
            .filter(|t| !t.trim().is_empty())
            .ok_or(AuthError::MissingToken)?;

        let user_id = self
            .tokens
            .verify(&token, TokenClass::Refresh)
            .map_err(|e| {
                tracing::debug!("Refresh token rejected: {}", e);
                AuthError::InvalidRefreshToken
            })?;

        // Orphaned token: the identity was deleted after issuance
        if self.store.find_by_id(user_id).await?.is_none() {
            tracing::debug!("Refresh token for unknown user: {}", user_id);
            return Err(AuthError::InvalidRefreshToken);
        }

        let access_token = self.tokens.issue_access(user_id)?;

        Ok(RefreshResponse { access_token })
    }

    /// Get the full profile of an authenticated user
    pub async fn profile(&self, user_id: Uuid) -> Result<UserProfile, AuthError> {
        let user = self
            .store
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::NotFound)?;

        Ok(user.into())
    }

    /// Apply a partial profile update
    ///
    /// Absent fields keep their value. Present but blank text fields are rejected.
    pub async fn update_profile(
        &self,
        user_id: Uuid,
        request: UpdateProfileRequest,
    ) -> Result<UserSummary, AuthError> {
        let changes = Self::resolve_changes(request)?;

        let user = self.store.update(user_id, changes).await?;

        Ok(user.into())
    }

    fn resolve_changes(request: UpdateProfileRequest) -> Result<UserChanges, AuthError> {
        let name = match request.name {
            Some(name) => {
                Self::require_non_empty(&name, "Name")?;
                Some(name.trim().to_string())
            }
            None => None,
        };

        let email = match request.email {
            Some(email) => {
                let email = Self::normalize_email(&email);
                Self::validate_email(&email)?;
                Some(email)
            }
            None => None,
        };

        if let Some(password) = &request.password {
            Self::validate_password(password)?;
        }

        Ok(UserChanges {
            name,
            email,
            password: request.password,
            profile_image_url: request.profile_image_url,
        })
    }
}
