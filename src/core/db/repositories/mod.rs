//! Database repositories for authkeep
//!
//! Repositories encapsulate data access and implement the credential store
//! boundary used by the auth service.

pub mod user;

pub use user::UserRepository;
