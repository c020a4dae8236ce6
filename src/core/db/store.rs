//! Credential store boundary
//!
//! The auth service only sees this trait. Email uniqueness is enforced by the
//! store itself so concurrent registrations cannot both succeed.

use async_trait::async_trait;
use uuid::Uuid;

use crate::core::db::models::{NewUser, User, UserChanges};
use crate::core::db::password::{DEFAULT_BCRYPT_COST, verify_dummy, verify_password};

/// Credential store error types
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("User not found")]
    NotFound,

    #[error("Email already exists")]
    DuplicateEmail,

    #[error("Password hashing failed: {0}")]
    HashingError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                StoreError::DuplicateEmail
            }
            sqlx::Error::RowNotFound => StoreError::NotFound,
            _ => StoreError::DatabaseError(err.to_string()),
        }
    }
}

/// Persistence for user identities
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Create a user. Fails with `DuplicateEmail` if the email is taken.
    async fn create(&self, user: NewUser) -> Result<User, StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    /// Apply a partial update, re-hashing the password if one is given
    async fn update(&self, id: Uuid, changes: UserChanges) -> Result<User, StoreError>;

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError>;

    /// bcrypt cost used for new hashes
    fn bcrypt_cost(&self) -> u32 {
        DEFAULT_BCRYPT_COST
    }

    /// Authenticate a user by email and password
    /// Returns the user if credentials are valid, None otherwise.
    /// An unknown email still pays for one bcrypt verify.
    async fn authenticate(&self, email: &str, password: &str) -> Result<Option<User>, StoreError> {
        let user = match self.find_by_email(email).await? {
            Some(u) => u,
            None => {
                verify_dummy(password, self.bcrypt_cost())?;
                return Ok(None);
            }
        };

        if verify_password(password, &user.password_hash)? {
            Ok(Some(user))
        } else {
            Ok(None)
        }
    }
}
