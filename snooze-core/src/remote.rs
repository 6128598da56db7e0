//! Remote services: the seams between the data layer and the network.
//!
//! Each operation is a single call with no local state. Implementations
//! classify failures into [`Error`] and never swallow them.

use crate::credential::Credential;
use crate::error::Error;
use crate::story::{stories_from_records, NewStory, Story, StoryId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use snooze::{AuthResponse, UserRecord};

/// Stateless access to the story list.
#[async_trait]
pub trait StoryService: Send + Sync {
    /// Every story, newest first. No authorization.
    async fn list_all(&self) -> Result<Vec<Story>, Error>;

    /// Submit a story. The server assigns its id and timestamp.
    async fn create(&self, credential: &Credential, story: &NewStory) -> Result<Story, Error>;

    /// Delete any story, not just the caller's own.
    async fn remove(&self, credential: &Credential, story_id: &StoryId) -> Result<(), Error>;
}

/// Stateless access to accounts and favorites.
#[async_trait]
pub trait UserService: Send + Sync {
    async fn register(
        &self,
        username: &str,
        password: &str,
        display_name: &str,
    ) -> Result<AuthenticatedUser, Error>;

    async fn authenticate(&self, username: &str, password: &str)
        -> Result<AuthenticatedUser, Error>;

    /// Re-establish a profile from a previously issued credential.
    async fn resume(&self, credential: &Credential, username: &str) -> Result<UserProfile, Error>;

    /// Mark (`desired = true`) or unmark a favorite.
    ///
    /// May answer `Conflict` when the story is already in the desired state.
    async fn set_favorite(
        &self,
        credential: &Credential,
        username: &str,
        story_id: &StoryId,
        desired: bool,
    ) -> Result<(), Error>;
}

/// A user's profile as reported by the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    pub username: String,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
    pub favorites: Vec<Story>,
    pub own_stories: Vec<Story>,
}

impl UserProfile {
    /// Map a raw profile record, dropping malformed story entries.
    pub fn from_record(record: UserRecord) -> Result<Self, Error> {
        if record.username.is_empty() {
            return Err(Error::ServiceUnavailable(
                "profile in response has no username".into(),
            ));
        }
        let created_at = DateTime::parse_from_rfc3339(&record.created_at)
            .map_err(|_| {
                Error::ServiceUnavailable(format!(
                    "profile {} has an unreadable timestamp",
                    record.username
                ))
            })?
            .with_timezone(&Utc);

        Ok(Self {
            username: record.username,
            display_name: record.name,
            created_at,
            favorites: stories_from_records(record.favorites),
            own_stories: stories_from_records(record.stories),
        })
    }
}

/// Outcome of signup or login.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub profile: UserProfile,
    pub credential: Credential,
}

impl TryFrom<AuthResponse> for AuthenticatedUser {
    type Error = Error;

    fn try_from(response: AuthResponse) -> Result<Self, Error> {
        Ok(Self {
            profile: UserProfile::from_record(response.user)?,
            credential: Credential::new(response.token),
        })
    }
}

// ============================================================================
// HTTP implementations
// ============================================================================

/// [`StoryService`] over the HTTP API.
#[derive(Clone)]
pub struct HttpStoryService {
    client: snooze::Client,
}

impl HttpStoryService {
    pub fn new(client: snooze::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StoryService for HttpStoryService {
    async fn list_all(&self) -> Result<Vec<Story>, Error> {
        let records = self.client.list_stories().await?;
        let total = records.len();
        let stories = stories_from_records(records);
        tracing::debug!(total, kept = stories.len(), "fetched stories");
        Ok(stories)
    }

    async fn create(&self, credential: &Credential, story: &NewStory) -> Result<Story, Error> {
        let record = self
            .client
            .create_story(credential.expose(), &story.to_record())
            .await?;
        let story = Story::from_record(record).map_err(|e| {
            Error::ServiceUnavailable(format!("created story in response is malformed: {e}"))
        })?;
        tracing::debug!(story_id = %story.id(), "created story");
        Ok(story)
    }

    async fn remove(&self, credential: &Credential, story_id: &StoryId) -> Result<(), Error> {
        self.client
            .delete_story(credential.expose(), story_id.as_str())
            .await?;
        tracing::debug!(%story_id, "deleted story");
        Ok(())
    }
}

/// [`UserService`] over the HTTP API.
#[derive(Clone)]
pub struct HttpUserService {
    client: snooze::Client,
}

impl HttpUserService {
    pub fn new(client: snooze::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl UserService for HttpUserService {
    async fn register(
        &self,
        username: &str,
        password: &str,
        display_name: &str,
    ) -> Result<AuthenticatedUser, Error> {
        let response = self.client.signup(username, password, display_name).await?;
        AuthenticatedUser::try_from(response)
    }

    async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<AuthenticatedUser, Error> {
        let response = self.client.login(username, password).await?;
        AuthenticatedUser::try_from(response)
    }

    async fn resume(&self, credential: &Credential, username: &str) -> Result<UserProfile, Error> {
        let record = self.client.get_user(credential.expose(), username).await?;
        UserProfile::from_record(record)
    }

    async fn set_favorite(
        &self,
        credential: &Credential,
        username: &str,
        story_id: &StoryId,
        desired: bool,
    ) -> Result<(), Error> {
        self.client
            .set_favorite(credential.expose(), username, story_id.as_str(), desired)
            .await?;
        tracing::debug!(%story_id, desired, "updated favorite");
        Ok(())
    }
}
