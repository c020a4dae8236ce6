//! JWT utilities for token generation and validation
//!
//! Provides JWT token creation and validation using HS256 algorithm.
//! Access tokens are short-lived (15 minutes), refresh tokens are long-lived (7 days).
//! Each token class is signed with its own secret.

use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default access token expiration time (15 minutes)
const ACCESS_TOKEN_EXPIRATION_MINUTES: i64 = 15;

/// Default refresh token expiration time (7 days)
const REFRESH_TOKEN_EXPIRATION_DAYS: i64 = 7;

const ACCESS_SECRET_VAR: &str = "JWT_SECRET";
const REFRESH_SECRET_VAR: &str = "REFRESH_TOKEN_SECRET";

/// Token configuration
#[derive(Clone)]
pub struct TokenConfig {
    access_secret: String,
    refresh_secret: String,
    /// Access token lifetime
    pub access_ttl: Duration,
    /// Refresh token lifetime
    pub refresh_ttl: Duration,
}

impl std::fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenConfig")
            .field("access_secret", &"<redacted>")
            .field("refresh_secret", &"<redacted>")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish()
    }
}

impl TokenConfig {
    /// Create a token configuration with default lifetimes.
    ///
    /// Fails if both classes would share a secret.
    pub fn new(
        access_secret: impl Into<String>,
        refresh_secret: impl Into<String>,
    ) -> Result<Self, TokenError> {
        let access_secret = access_secret.into();
        let refresh_secret = refresh_secret.into();

        if access_secret == refresh_secret {
            return Err(TokenError::SecretsMustDiffer);
        }

        Ok(Self {
            access_secret,
            refresh_secret,
            access_ttl: Duration::minutes(ACCESS_TOKEN_EXPIRATION_MINUTES),
            refresh_ttl: Duration::days(REFRESH_TOKEN_EXPIRATION_DAYS),
        })
    }

    /// Create config from environment variables
    pub fn from_env() -> Result<Self, TokenError> {
        let access_secret = std::env::var(ACCESS_SECRET_VAR)
            .map_err(|_| TokenError::MissingSecret(ACCESS_SECRET_VAR))?;
        let refresh_secret = std::env::var(REFRESH_SECRET_VAR)
            .map_err(|_| TokenError::MissingSecret(REFRESH_SECRET_VAR))?;

        let access_exp = std::env::var("JWT_ACCESS_EXPIRATION_MINUTES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(ACCESS_TOKEN_EXPIRATION_MINUTES);

        let refresh_exp = std::env::var("JWT_REFRESH_EXPIRATION_DAYS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(REFRESH_TOKEN_EXPIRATION_DAYS);

        Ok(Self::new(access_secret, refresh_secret)?
            .access_token_expiration(Duration::minutes(access_exp))
            .refresh_token_expiration(Duration::days(refresh_exp)))
    }

    /// Set access token lifetime
    pub fn access_token_expiration(mut self, ttl: Duration) -> Self {
        self.access_ttl = ttl;
        self
    }

    /// Set refresh token lifetime
    pub fn refresh_token_expiration(mut self, ttl: Duration) -> Self {
        self.refresh_ttl = ttl;
        self
    }
}

/// JWT errors
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("{0} environment variable not set")]
    MissingSecret(&'static str),

    #[error("Access and refresh secrets must differ")]
    SecretsMustDiffer,

    #[error("Token encoding failed: {0}")]
    EncodingError(String),

    #[error("Token expired")]
    Expired,

    #[error("Invalid token signature")]
    InvalidSignature,
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            _ => TokenError::InvalidSignature,
        }
    }
}

/// Token class, selects secret and lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenClass {
    Access,
    Refresh,
}

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Identity reference (user ID)
    pub id: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

impl Claims {
    /// Get user ID as UUID
    pub fn user_id(&self) -> Result<Uuid, TokenError> {
        Uuid::parse_str(&self.id).map_err(|_| TokenError::InvalidSignature)
    }
}

/// Token pair (access + refresh)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    /// Access token (short-lived)
    pub access_token: String,
    /// Refresh token (long-lived)
    pub refresh_token: String,
}

#[derive(Clone)]
struct ClassKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl ClassKeys {
    fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }
}

/// Issues and verifies both token classes
#[derive(Clone)]
pub struct TokenService {
    access: ClassKeys,
    refresh: ClassKeys,
}

impl TokenService {
    /// Create a new token service
    pub fn new(config: TokenConfig) -> Self {
        Self {
            access: ClassKeys::new(&config.access_secret, config.access_ttl),
            refresh: ClassKeys::new(&config.refresh_secret, config.refresh_ttl),
        }
    }

    /// Create token service from environment variables
    pub fn from_env() -> Result<Self, TokenError> {
        Ok(Self::new(TokenConfig::from_env()?))
    }

    fn keys(&self, class: TokenClass) -> &ClassKeys {
        match class {
            TokenClass::Access => &self.access,
            TokenClass::Refresh => &self.refresh,
        }
    }

    fn issue(&self, user_id: Uuid, class: TokenClass) -> Result<String, TokenError> {
        let keys = self.keys(class);
        let now = Utc::now();
        let exp = now + keys.ttl;

        let claims = Claims {
            id: user_id.to_string(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
        };

        encode(&Header::default(), &claims, &keys.encoding)
            .map_err(|e| TokenError::EncodingError(e.to_string()))
    }

    /// Generate an access token
    pub fn issue_access(&self, user_id: Uuid) -> Result<String, TokenError> {
        self.issue(user_id, TokenClass::Access)
    }

    /// Generate a refresh token
    pub fn issue_refresh(&self, user_id: Uuid) -> Result<String, TokenError> {
        self.issue(user_id, TokenClass::Refresh)
    }

    /// Generate both access and refresh tokens
    pub fn issue_pair(&self, user_id: Uuid) -> Result<TokenPair, TokenError> {
        Ok(TokenPair {
            access_token: self.issue_access(user_id)?,
            refresh_token: self.issue_refresh(user_id)?,
        })
    }

    /// Verify a token against the secret of its class and return the identity reference
    pub fn verify(&self, token: &str, class: TokenClass) -> Result<Uuid, TokenError> {
        let mut validation = Validation::default();
        validation.leeway = 0;

        let token_data = decode::<Claims>(token, &self.keys(class).decoding, &validation)?;

        token_data.claims.user_id()
    }
}
