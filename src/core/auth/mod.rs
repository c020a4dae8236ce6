//! Authentication module for authkeep
//!
//! This module provides authentication functionality including:
//! - Access/refresh token issuance and verification
//! - User registration, login and profile management
//! - An access guard middleware for protected routes
//! - REST API endpoints for auth operations

pub mod api;
pub mod guard;
pub mod jwt;
pub mod service;

pub use api::{AuthApiState, auth_api_router};
pub use guard::{AuthUser, extract_bearer_token, require_access};
pub use jwt::{Claims, TokenClass, TokenConfig, TokenError, TokenPair, TokenService};
pub use service::{AuthError, AuthService};
