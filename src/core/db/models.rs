//! Database models for authkeep
//!
//! This module defines the entity structs that map to the `users` table.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

use crate::core::models::{UserProfile, UserSummary};

/// User entity representing a registered user
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub profile_image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// User data for creation (password is plain text, hashed by the store)
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
    pub profile_image_url: Option<String>,
}

/// User data for updates
///
/// `None` keeps the stored value. `profile_image_url: Some(None)` clears it.
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub name: Option<String>,
    pub email: Option<String>,
    /// Plain text, hashed by the store
    pub password: Option<String>,
    pub profile_image_url: Option<Option<String>>,
}

impl UserChanges {
    /// Apply the changes to an in-memory entity
    pub fn apply(self, user: &mut User, password_hash: Option<String>, now: DateTime<Utc>) {
        if let Some(name) = self.name {
            user.name = name;
        }
        if let Some(email) = self.email {
            user.email = email;
        }
        if let Some(hash) = password_hash {
            user.password_hash = hash;
        }
        if let Some(url) = self.profile_image_url {
            user.profile_image_url = url;
        }
        user.updated_at = now;
    }
}

impl From<User> for UserSummary {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            profile_image_url: user.profile_image_url,
        }
    }
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            profile_image_url: user.profile_image_url,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}
