//! Token persistence for diagnostics runs
//!
//! The file store keeps `{ "accessToken": "...", "refreshToken": "..." }` on
//! disk so consecutive runs of the CLI share their tokens, the way a browser
//! keeps the access token in local storage and the refresh token in a cookie.
//! Refresh tokens rotate on every use, so the latest one must survive the run.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::DiagnosticsError;

/// Where the tokens live between requests
pub trait TokenStore: Send + Sync {
    fn get(&self) -> Option<String>;
    fn set(&self, token: &str) -> Result<(), DiagnosticsError>;
    /// Forget the access token; a stored refresh token is kept
    fn remove(&self) -> Result<(), DiagnosticsError>;

    fn get_refresh(&self) -> Option<String>;
    fn set_refresh(&self, token: &str) -> Result<(), DiagnosticsError>;
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredTokens {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
}

impl StoredTokens {
    fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none()
    }
}

fn non_empty(token: Option<&String>) -> Option<String> {
    token.filter(|t| !t.is_empty()).cloned()
}

/// Tokens held for the lifetime of the process
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    tokens: Mutex<StoredTokens>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            tokens: Mutex::new(StoredTokens {
                access_token: Some(token.into()),
                refresh_token: None,
            }),
        }
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, StoredTokens> {
        // A panic while holding the lock cannot leave the tokens half-written
        self.tokens.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self) -> Option<String> {
        self.slot().access_token.clone()
    }

    fn set(&self, token: &str) -> Result<(), DiagnosticsError> {
        self.slot().access_token = Some(token.to_string());
        Ok(())
    }

    fn remove(&self) -> Result<(), DiagnosticsError> {
        self.slot().access_token = None;
        Ok(())
    }

    fn get_refresh(&self) -> Option<String> {
        self.slot().refresh_token.clone()
    }

    fn set_refresh(&self, token: &str) -> Result<(), DiagnosticsError> {
        self.slot().refresh_token = Some(token.to_string());
        Ok(())
    }
}

/// Tokens kept in a JSON file
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing or unreadable files count as empty
    fn load(&self) -> StoredTokens {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return StoredTokens::default(),
            Err(e) => {
                tracing::warn!("Cannot read token file {}: {}", self.path.display(), e);
                return StoredTokens::default();
            }
        };

        serde_json::from_str(&content).unwrap_or_else(|e| {
            tracing::warn!("Ignoring unreadable token file {}: {}", self.path.display(), e);
            StoredTokens::default()
        })
    }

    /// Write the tokens, or delete the file once nothing is left in it
    fn save(&self, tokens: &StoredTokens) -> Result<(), DiagnosticsError> {
        if tokens.is_empty() {
            return match fs::remove_file(&self.path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e.into()),
            };
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(tokens)?)?;
        Ok(())
    }
}

impl TokenStore for FileTokenStore {
    fn get(&self) -> Option<String> {
        non_empty(self.load().access_token.as_ref())
    }

    fn set(&self, token: &str) -> Result<(), DiagnosticsError> {
        let mut tokens = self.load();
        tokens.access_token = Some(token.to_string());
        self.save(&tokens)
    }

    fn remove(&self) -> Result<(), DiagnosticsError> {
        let mut tokens = self.load();
        tokens.access_token = None;
        self.save(&tokens)
    }

    fn get_refresh(&self) -> Option<String> {
        non_empty(self.load().refresh_token.as_ref())
    }

    fn set_refresh(&self, token: &str) -> Result<(), DiagnosticsError> {
        let mut tokens = self.load();
        tokens.refresh_token = Some(token.to_string());
        self.save(&tokens)
    }
}
