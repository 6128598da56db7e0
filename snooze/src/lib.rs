//! Minimal Hack-or-Snooze story API client.
//!
//! This crate provides a focused client for the story service with:
//! - Story listing, creation and deletion
//! - Account signup, login and token-based profile lookup
//! - Favorite marking and unmarking
//! - Classification of every failure into an [`ErrorKind`]
//!
//! The token is sent in the JSON body (or the query string for profile
//! lookups) and never as a path segment.

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;
use thiserror::Error;

pub use reqwest::Url;

/// Base endpoint of the public story service.
pub const DEFAULT_BASE_URL: &str = "https://hack-or-snooze-v3.herokuapp.com";

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Errors that can occur when talking to the story service.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Coarse classification of a failed call, as seen by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The request was rejected as malformed.
    Validation,
    /// The token is missing, invalid or expired, or the login was wrong.
    Unauthorized,
    /// The target does not exist.
    NotFound,
    /// The request clashes with existing state (e.g. a taken username).
    Conflict,
    /// Network failure, server failure, or an unreadable response.
    ServiceUnavailable,
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Api { status, .. } => classify_status(*status),
            Error::Network(_) | Error::Parse(_) | Error::Config(_) => ErrorKind::ServiceUnavailable,
        }
    }
}

fn classify_status(status: u16) -> ErrorKind {
    match status {
        400 | 422 => ErrorKind::Validation,
        401 | 403 => ErrorKind::Unauthorized,
        404 => ErrorKind::NotFound,
        409 => ErrorKind::Conflict,
        _ => ErrorKind::ServiceUnavailable,
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Connection settings for [`Client`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }
}

impl ClientConfig {
    /// Create a configuration pointing at the given base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Build a configuration from `SNOOZE_BASE_URL` and `SNOOZE_TIMEOUT_SECS`.
    ///
    /// Unset variables fall back to the defaults.
    pub fn from_env() -> Result<Self, Error> {
        let mut config = Self::default();
        if let Ok(base_url) = std::env::var("SNOOZE_BASE_URL") {
            config.base_url = base_url;
        }
        if let Ok(secs) = std::env::var("SNOOZE_TIMEOUT_SECS") {
            let secs: u64 = secs
                .parse()
                .map_err(|e| Error::Config(format!("SNOOZE_TIMEOUT_SECS: {e}")))?;
            config.timeout = Duration::from_secs(secs);
        }
        Ok(config)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

// ============================================================================
// Client
// ============================================================================

/// Story service API client.
#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    base_url: Url,
}

impl Client {
    /// Create a new client from the given configuration.
    pub fn new(config: ClientConfig) -> Result<Self, Error> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| Error::Config(format!("Invalid base URL {}: {e}", config.base_url)))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::Config(format!(
                "Base URL cannot carry a path: {}",
                config.base_url
            )));
        }

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self { http, base_url })
    }

    /// Create a client from environment configuration.
    pub fn from_env() -> Result<Self, Error> {
        Self::new(ClientConfig::from_env()?)
    }

    /// The base endpoint every request is resolved against.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Fetch every story, newest first.
    pub async fn list_stories(&self) -> Result<Vec<StoryRecord>, Error> {
        let url = self.endpoint(&["stories"])?;
        let response: StoriesResponse = self.send(Method::GET, url, None::<&()>).await?;
        Ok(response.stories)
    }

    /// Submit a new story on behalf of the token's owner.
    pub async fn create_story(&self, token: &str, story: &NewStoryRecord) -> Result<StoryRecord, Error> {
        let url = self.endpoint(&["stories"])?;
        let body = CreateStoryBody { token, story };
        let response: StoryResponse = self.send(Method::POST, url, Some(&body)).await?;
        Ok(response.story)
    }

    /// Delete a story. The service lets any authenticated user delete any story.
    pub async fn delete_story(&self, token: &str, story_id: &str) -> Result<(), Error> {
        let url = self.endpoint(&["stories", story_id])?;
        let _: serde_json::Value = self
            .send(Method::DELETE, url, Some(&TokenBody { token }))
            .await?;
        Ok(())
    }

    /// Register a new account.
    pub async fn signup(&self, username: &str, password: &str, name: &str) -> Result<AuthResponse, Error> {
        let url = self.endpoint(&["signup"])?;
        let body = SignupBody {
            user: SignupUser {
                username,
                password,
                name,
            },
        };
        self.send(Method::POST, url, Some(&body)).await
    }

    /// Log in with a username and password.
    pub async fn login(&self, username: &str, password: &str) -> Result<AuthResponse, Error> {
        let url = self.endpoint(&["login"])?;
        let body = LoginBody {
            user: LoginUser { username, password },
        };
        self.send(Method::POST, url, Some(&body)).await
    }

    /// Look up a user's profile with a previously issued token.
    pub async fn get_user(&self, token: &str, username: &str) -> Result<UserRecord, Error> {
        let mut url = self.endpoint(&["users", username])?;
        url.query_pairs_mut().append_pair("token", token);
        let response: UserResponse = self.send(Method::GET, url, None::<&()>).await?;
        Ok(response.user)
    }

    /// Mark (`desired = true`) or unmark a story as one of the user's favorites.
    pub async fn set_favorite(
        &self,
        token: &str,
        username: &str,
        story_id: &str,
        desired: bool,
    ) -> Result<(), Error> {
        let url = self.endpoint(&["users", username, "favorites", story_id])?;
        let method = if desired { Method::POST } else { Method::DELETE };
        let _: serde_json::Value = self.send(method, url, Some(&TokenBody { token })).await?;
        Ok(())
    }

    /// Resolve path segments against the base URL, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, Error> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Config(format!("Base URL cannot carry a path: {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send<B, T>(&self, method: Method, url: Url, body: Option<&B>) -> Result<T, Error>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        tracing::debug!(%method, path = url.path(), "story api request");

        let mut request = self.http.request(method.clone(), url.clone());
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Network(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::debug!(%method, path = url.path(), status = status.as_u16(), "story api error");
            return Err(Error::Api {
                status: status.as_u16(),
                message: error_message(status, &body),
            });
        }

        response.json().await.map_err(|e| Error::Parse(e.to_string()))
    }
}

/// Pull the human-readable message out of an error body.
///
/// The service answers `{"error": {"status": .., "title": .., "message": ..}}`;
/// anything else is returned verbatim.
fn error_message(status: StatusCode, body: &str) -> String {
    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(parsed) => parsed.error.message,
        Err(_) if body.is_empty() => status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string(),
        Err(_) => body.to_string(),
    }
}

// ============================================================================
// Public types
// ============================================================================

/// A story exactly as the service returns it.
///
/// Every field defaults to empty, whether missing or `null`, so one malformed
/// entry does not sink a whole listing; callers decide what to do with
/// incomplete records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoryRecord {
    #[serde(deserialize_with = "null_as_default")]
    pub story_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(deserialize_with = "null_as_default")]
    pub author: String,
    #[serde(deserialize_with = "null_as_default")]
    pub url: String,
    #[serde(deserialize_with = "null_as_default")]
    pub username: String,
    #[serde(deserialize_with = "null_as_default")]
    pub created_at: String,
}

/// Fields a client supplies when submitting a story.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewStoryRecord {
    pub title: String,
    pub author: String,
    pub url: String,
}

/// A user profile as returned by signup, login and profile lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserRecord {
    #[serde(deserialize_with = "null_as_default")]
    pub username: String,
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub created_at: String,
    #[serde(deserialize_with = "null_as_default")]
    pub favorites: Vec<StoryRecord>,
    #[serde(deserialize_with = "null_as_default")]
    pub stories: Vec<StoryRecord>,
}

/// Result of signup or login: the profile plus a freshly issued token.
#[derive(Clone, Deserialize)]
pub struct AuthResponse {
    pub user: UserRecord,
    pub token: String,
}

impl std::fmt::Debug for AuthResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthResponse")
            .field("user", &self.user)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Read `null` as the type's default, the same as a missing key.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// ============================================================================
// Internal API types
// ============================================================================

#[derive(Debug, Deserialize)]
struct StoriesResponse {
    stories: Vec<StoryRecord>,
}

#[derive(Debug, Deserialize)]
struct StoryResponse {
    story: StoryRecord,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    user: UserRecord,
}

#[derive(Serialize)]
struct TokenBody<'a> {
    token: &'a str,
}

#[derive(Serialize)]
struct CreateStoryBody<'a> {
    token: &'a str,
    story: &'a NewStoryRecord,
}

#[derive(Serialize)]
struct SignupBody<'a> {
    user: SignupUser<'a>,
}

#[derive(Serialize)]
struct SignupUser<'a> {
    username: &'a str,
    password: &'a str,
    name: &'a str,
}

#[derive(Serialize)]
struct LoginBody<'a> {
    user: LoginUser<'a>,
}

#[derive(Serialize)]
struct LoginUser<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}
