//! Credential storage for authkeep
//!
//! This module provides the credential store boundary, its in-memory and
//! PostgreSQL implementations, and password hashing.

pub mod memory;
pub mod models;
pub mod password;
pub mod pool;
pub mod repositories;
pub mod store;

// Re-export commonly used items
pub use memory::InMemoryUserStore;
pub use models::{NewUser, User, UserChanges};
pub use pool::{DbConfig, DbError, create_pool, create_pool_with_migrations};
pub use repositories::UserRepository;
pub use store::{CredentialStore, StoreError};
