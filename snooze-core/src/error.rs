//! Error taxonomy shared by the collection and the session.

use crate::story::StoryId;
use thiserror::Error;

/// Errors surfaced by the data layer.
///
/// The first five variants come from the remote store; the rest are raised
/// locally before any network call is made.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Not authorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Not logged in")]
    NotAuthenticated,

    #[error("Authentication already in progress")]
    AuthenticationInProgress,

    #[error("A favorite change for story {0} is already in flight")]
    ToggleInFlight(StoryId),

    #[error("Session changed while the request was in flight")]
    Superseded,

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Network or server trouble. Nothing changed locally; retrying by hand is safe.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::ServiceUnavailable(_))
    }

    /// The credential was rejected and the user has to log in again.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Error::Unauthorized(_))
    }
}

impl From<snooze::Error> for Error {
    fn from(err: snooze::Error) -> Self {
        use snooze::ErrorKind;

        let kind = err.kind();
        let message = match err {
            snooze::Error::Config(message) => return Error::Config(message),
            snooze::Error::Api { message, .. } => message,
            other => other.to_string(),
        };
        match kind {
            ErrorKind::Validation => Error::Validation(message),
            ErrorKind::Unauthorized => Error::Unauthorized(message),
            ErrorKind::NotFound => Error::NotFound(message),
            ErrorKind::Conflict => Error::Conflict(message),
            ErrorKind::ServiceUnavailable => Error::ServiceUnavailable(message),
        }
    }
}
