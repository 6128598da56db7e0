//! Remembered logins.
//!
//! The only thing written to disk is the credential and the username it
//! belongs to, so a later run can resume the session without a password.

use crate::credential::Credential;
use crate::session::Session;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tokio::fs;

/// Errors from persistence operations.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
}

/// Current file version.
const SAVE_VERSION: u32 = 1;

/// A remembered login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedCredential {
    /// Format version for compatibility checking.
    pub version: u32,

    pub username: String,

    pub credential: Credential,

    pub saved_at: DateTime<Utc>,
}

impl SavedCredential {
    pub fn new(username: impl Into<String>, credential: Credential) -> Self {
        Self {
            version: SAVE_VERSION,
            username: username.into(),
            credential,
            saved_at: Utc::now(),
        }
    }

    /// Capture the session's login, or `None` when nobody is logged in.
    pub fn from_session(session: &Session) -> Option<Self> {
        let username = session.username()?;
        let credential = session.credential()?;
        Some(Self::new(username, credential))
    }

    /// Save to a JSON file.
    pub async fn save_json(&self, path: impl AsRef<Path>) -> Result<(), PersistError> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).await?;
        Ok(())
    }

    /// Load from a JSON file.
    pub async fn load_json(path: impl AsRef<Path>) -> Result<Self, PersistError> {
        let content = fs::read_to_string(path).await?;
        let saved: Self = serde_json::from_str(&content)?;

        if saved.version != SAVE_VERSION {
            return Err(PersistError::VersionMismatch {
                expected: SAVE_VERSION,
                found: saved.version,
            });
        }

        Ok(saved)
    }

    /// Load a remembered login if one exists.
    ///
    /// A missing file is not an error; anything else unreadable is.
    pub async fn load_if_present(path: impl AsRef<Path>) -> Result<Option<Self>, PersistError> {
        match Self::load_json(path).await {
            Ok(saved) => Ok(Some(saved)),
            Err(PersistError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Forget a remembered login. Clearing a missing file succeeds.
    pub async fn clear(path: impl AsRef<Path>) -> Result<(), PersistError> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
