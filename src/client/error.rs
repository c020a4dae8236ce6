use reqwest::StatusCode;
use thiserror::Error;

use crate::client::storage::StorageError;
use crate::core::models::ApiError;

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Unauthorized: {message}")]
    Unauthorized { code: String, message: String },

    #[error("Request rejected ({status}): {message}")]
    Rejected {
        status: u16,
        code: String,
        message: String,
    },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Token storage error: {0}")]
    Storage(#[from] StorageError),
}

impl ClientError {
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            return body.to_string();
        }
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
    }

    /// Build an error from a non-success response, reading the `{error, code}` body when present
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let (code, message) = match serde_json::from_str::<ApiError>(body) {
            Ok(api_error) => (api_error.code, api_error.error),
            Err(_) => (String::new(), Self::truncate_body(body)),
        };

        if status == StatusCode::UNAUTHORIZED {
            ClientError::Unauthorized { code, message }
        } else {
            ClientError::Rejected {
                status: status.as_u16(),
                code,
                message,
            }
        }
    }

    /// Authorization failure reported by the server (HTTP 401)
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ClientError::Unauthorized { .. })
    }

    /// Stable error code from the server, if any
    pub fn code(&self) -> Option<&str> {
        match self {
            ClientError::Unauthorized { code, .. } | ClientError::Rejected { code, .. }
                if !code.is_empty() =>
            {
                Some(code)
            }
            _ => None,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Unauthorized { .. } => Some(401),
            ClientError::Rejected { status, .. } => Some(*status),
            ClientError::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_parses_api_error_body() {
        let err = ClientError::from_status(
            StatusCode::BAD_REQUEST,
            r#"{"error":"User already exists","code":"DUPLICATE_EMAIL"}"#,
        );

        match &err {
            ClientError::Rejected {
                status,
                code,
                message,
            } => {
                assert_eq!(*status, 400);
                assert_eq!(code, "DUPLICATE_EMAIL");
                assert_eq!(message, "User already exists");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(err.code(), Some("DUPLICATE_EMAIL"));
        assert!(!err.is_unauthorized());
    }

    #[test]
    fn test_from_status_unauthorized() {
        let err = ClientError::from_status(
            StatusCode::UNAUTHORIZED,
            r#"{"error":"Token is not valid","code":"INVALID_ACCESS_TOKEN"}"#,
        );

        assert!(err.is_unauthorized());
        assert_eq!(err.status(), Some(401));
        assert_eq!(err.code(), Some("INVALID_ACCESS_TOKEN"));
    }

    #[test]
    fn test_from_status_plain_body() {
        let err = ClientError::from_status(StatusCode::BAD_GATEWAY, "upstream down");

        assert_eq!(err.status(), Some(502));
        assert_eq!(err.code(), None);
        assert!(err.to_string().contains("upstream down"));
    }

    #[test]
    fn test_truncate_long_body() {
        let body = "é".repeat(MAX_ERROR_BODY_LENGTH);
        let truncated = ClientError::truncate_body(&body);

        assert!(truncated.contains("truncated"));
        assert!(truncated.len() < body.len());
    }
}
