//! In-memory credential store
//!
//! Used when no `DATABASE_URL` is configured and by the test suite.
//! The email index is claimed through a `DashMap` entry, so two concurrent
//! registrations for one email cannot both succeed.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use uuid::Uuid;

use crate::core::db::models::{NewUser, User, UserChanges};
use crate::core::db::password::{DEFAULT_BCRYPT_COST, hash_password};
use crate::core::db::store::{CredentialStore, StoreError};

pub struct InMemoryUserStore {
    users: DashMap<Uuid, User>,
    emails: DashMap<String, Uuid>,
    bcrypt_cost: u32,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::with_cost(DEFAULT_BCRYPT_COST)
    }

    /// Create a store hashing with the given bcrypt cost
    pub fn with_cost(bcrypt_cost: u32) -> Self {
        Self {
            users: DashMap::new(),
            emails: DashMap::new(),
            bcrypt_cost,
        }
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl Default for InMemoryUserStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialStore for InMemoryUserStore {
    async fn create(&self, new_user: NewUser) -> Result<User, StoreError> {
        let password_hash = hash_password(&new_user.password, self.bcrypt_cost)?;
        let id = Uuid::new_v4();

        match self.emails.entry(new_user.email.clone()) {
            Entry::Occupied(_) => return Err(StoreError::DuplicateEmail),
            Entry::Vacant(slot) => {
                slot.insert(id);
            }
        }

        let now = Utc::now();
        let user = User {
            id,
            name: new_user.name,
            email: new_user.email,
            password_hash,
            profile_image_url: new_user.profile_image_url,
            created_at: now,
            updated_at: now,
        };
        self.users.insert(id, user.clone());

        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.users.get(&id).map(|u| u.value().clone()))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let id = match self.emails.get(email) {
            Some(id) => *id,
            None => return Ok(None),
        };
        Ok(self.users.get(&id).map(|u| u.value().clone()))
    }

    async fn update(&self, id: Uuid, changes: UserChanges) -> Result<User, StoreError> {
        let password_hash = match &changes.password {
            Some(password) => Some(hash_password(password, self.bcrypt_cost)?),
            None => None,
        };

        let mut user = self.users.get_mut(&id).ok_or(StoreError::NotFound)?;

        if let Some(email) = &changes.email {
            if *email != user.email {
                match self.emails.entry(email.clone()) {
                    Entry::Occupied(_) => return Err(StoreError::DuplicateEmail),
                    Entry::Vacant(slot) => {
                        slot.insert(id);
                    }
                }
                self.emails.remove(&user.email);
            }
        }

        changes.apply(user.value_mut(), password_hash, Utc::now());

        Ok(user.value().clone())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        match self.users.remove(&id) {
            Some((_, user)) => {
                self.emails.remove(&user.email);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn bcrypt_cost(&self) -> u32 {
        self.bcrypt_cost
    }
}
