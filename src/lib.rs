//! authkeep - credential authentication with short-lived access tokens
//! and long-lived refresh tokens
//!
//! The `server` feature provides the token service, credential stores, the
//! access guard and the axum router. The `client` feature provides a session
//! manager whose transport renews expired access tokens transparently.

pub mod core;

#[cfg(feature = "client")]
pub mod client;
