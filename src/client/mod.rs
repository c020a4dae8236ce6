//! Client side of the auth protocol
//!
//! A session manager on top of a transport that renews expired access tokens.

pub mod error;
pub mod session;
pub mod storage;
pub mod transport;

pub use error::ClientError;
pub use session::{Identity, SessionEvent, SessionManager, SessionState};
pub use storage::{FileTokenStore, MemoryTokenStore, StorageError, StoredTokens, TokenStore};
pub use transport::{AuthTransport, OutboundRequest, Renewal};

pub const REGISTER_PATH: &str = "/api/auth/register";
pub const LOGIN_PATH: &str = "/api/auth/login";
pub const REFRESH_PATH: &str = "/api/auth/refresh";
pub const PROFILE_PATH: &str = "/api/auth/profile";
