//! Password hashing shared by the credential stores
//!
//! bcrypt with a random salt per hash.

use std::sync::LazyLock;

use dashmap::DashMap;

use crate::core::db::store::StoreError;

/// Default cost factor for bcrypt hashing
pub const DEFAULT_BCRYPT_COST: u32 = 10;

/// Range bcrypt accepts for the cost factor
pub const BCRYPT_COST_RANGE: std::ops::RangeInclusive<u32> = 4..=31;

/// bcrypt only reads this many bytes of a password
pub const MAX_PASSWORD_BYTES: usize = 72;

/// Throwaway hashes for `verify_dummy`, one per cost factor
static DUMMY_HASHES: LazyLock<DashMap<u32, String>> = LazyLock::new(DashMap::new);

/// Hash a password using bcrypt with automatic salt generation
pub fn hash_password(password: &str, cost: u32) -> Result<String, StoreError> {
    bcrypt::hash(password, cost).map_err(|e| StoreError::HashingError(e.to_string()))
}

/// Verify a password against a bcrypt hash
pub fn verify_password(password: &str, hash: &str) -> Result<bool, StoreError> {
    bcrypt::verify(password, hash).map_err(|e| StoreError::HashingError(e.to_string()))
}

/// Run a full verify against a throwaway hash of the given cost.
/// Lets a lookup miss take as long as a wrong password.
pub fn verify_dummy(password: &str, cost: u32) -> Result<(), StoreError> {
    let cached = DUMMY_HASHES.get(&cost).map(|hash| hash.value().clone());
    let hash = match cached {
        Some(hash) => hash,
        None => {
            let hash = hash_password("authkeep-unknown-user", cost)?;
            DUMMY_HASHES.entry(cost).or_insert(hash).value().clone()
        }
    };

    verify_password(password, &hash).map(|_| ())
}
