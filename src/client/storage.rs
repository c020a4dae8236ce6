//! Durable client-side copy of the token pair
//!
//! `MemoryTokenStore` keeps tokens for the lifetime of the process,
//! `FileTokenStore` persists them as JSON so a restarted client can resume.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};

/// Token file name when a directory is given
const TOKEN_FILE: &str = "tokens.json";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Failed to access token file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse token file: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredTokens {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl StoredTokens {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: Some(access_token.into()),
            refresh_token: Some(refresh_token.into()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none()
    }
}

/// Where the client keeps its tokens
pub trait TokenStore: Send + Sync {
    fn load(&self) -> Result<StoredTokens, StorageError>;

    fn save(&self, tokens: &StoredTokens) -> Result<(), StorageError>;

    fn clear(&self) -> Result<(), StorageError>;

    fn access_token(&self) -> Result<Option<String>, StorageError> {
        Ok(self.load()?.access_token)
    }

    fn refresh_token(&self) -> Result<Option<String>, StorageError> {
        Ok(self.load()?.refresh_token)
    }

    /// Replace the access token, keeping the refresh token
    fn set_access_token(&self, token: String) -> Result<(), StorageError> {
        let mut tokens = self.load()?;
        tokens.access_token = Some(token);
        self.save(&tokens)
    }
}

#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    tokens: Mutex<StoredTokens>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tokens(tokens: StoredTokens) -> Self {
        Self {
            tokens: Mutex::new(tokens),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Result<StoredTokens, StorageError> {
        Ok(self.tokens.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }

    fn save(&self, tokens: &StoredTokens) -> Result<(), StorageError> {
        *self.tokens.lock().unwrap_or_else(PoisonError::into_inner) = tokens.clone();
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        self.save(&StoredTokens::default())
    }
}

/// JSON token file
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store tokens as `tokens.json` inside `dir`
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join(TOKEN_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Result<StoredTokens, StorageError> {
        if !self.path.exists() {
            return Ok(StoredTokens::default());
        }
        let contents = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    fn save(&self, tokens: &StoredTokens) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(tokens)?;
        std::fs::write(&self.path, contents)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}
