//! The explicit context a front end holds: one collection, one session.

use crate::collection::StoryCollection;
use crate::error::Error;
use crate::persist::SavedCredential;
use crate::remote::{HttpStoryService, HttpUserService, StoryService, UserService};
use crate::session::{Session, SessionConfig, SessionState};
use crate::story::{Story, StoryId};
use std::sync::Arc;

/// A story prepared for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoryListing {
    pub story: Story,
    pub hostname: Option<String>,
    /// Favorite flag, or `None` when nobody is logged in.
    pub favorite: Option<bool>,
    /// Whether the logged-in user submitted this story.
    pub own: bool,
}

/// Everything a front end needs, wired together.
pub struct StoryClient {
    stories: StoryCollection,
    session: Session,
}

impl StoryClient {
    pub fn new(
        story_service: Arc<dyn StoryService>,
        user_service: Arc<dyn UserService>,
        config: SessionConfig,
    ) -> Self {
        Self {
            stories: StoryCollection::new(story_service),
            session: Session::with_config(user_service, config),
        }
    }

    /// Build a client that talks to the HTTP API.
    pub fn connect(
        client_config: snooze::ClientConfig,
        session_config: SessionConfig,
    ) -> Result<Self, Error> {
        let http = snooze::Client::new(client_config)?;
        Ok(Self::new(
            Arc::new(HttpStoryService::new(http.clone())),
            Arc::new(HttpUserService::new(http)),
            session_config,
        ))
    }

    /// Build an HTTP client from `SNOOZE_*` environment variables.
    pub fn from_env(session_config: SessionConfig) -> Result<Self, Error> {
        Self::connect(snooze::ClientConfig::from_env()?, session_config)
    }

    /// Load the story list and, if a login was remembered, resume it.
    ///
    /// Both happen at once. A remembered login that no longer works leaves
    /// the session anonymous. A resume that could not even begin (another
    /// authentication is running) takes precedence over a failed story fetch
    /// as the returned error.
    pub async fn start(&self, saved: Option<&SavedCredential>) -> Result<SessionState, Error> {
        let resume = async {
            match saved {
                Some(saved) => {
                    self.session
                        .resume_from(saved.credential.clone(), &saved.username)
                        .await
                }
                None => Ok(self.session.state()),
            }
        };
        let (state, refreshed) = futures::join!(resume, self.stories.refresh());
        let state = state?;
        refreshed?;
        tracing::info!(stories = self.stories.len(), ?state, "client started");
        Ok(state)
    }

    pub fn stories(&self) -> &StoryCollection {
        &self.stories
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// The current login, ready to be saved.
    pub fn saved_credential(&self) -> Option<SavedCredential> {
        SavedCredential::from_session(&self.session)
    }

    pub async fn submit_story(&self, title: &str, author: &str, url: &str) -> Result<Story, Error> {
        self.stories.submit(&self.session, title, author, url).await
    }

    pub async fn remove_story(&self, story_id: &StoryId) -> Result<(), Error> {
        self.stories.remove(&self.session, story_id).await
    }

    /// Toggle a favorite by id, looking the story up wherever it is held.
    pub async fn toggle_favorite(&self, story_id: &StoryId) -> Result<bool, Error> {
        let story = self
            .find_story(story_id)
            .ok_or_else(|| Error::NotFound(format!("story {story_id} is not loaded")))?;
        self.session.toggle_favorite(&story).await
    }

    fn find_story(&self, story_id: &StoryId) -> Option<Story> {
        self.stories.get(story_id).or_else(|| {
            self.session
                .favorites()
                .into_iter()
                .chain(self.session.own_stories())
                .find(|story| story.id() == story_id)
        })
    }

    // ========================================================================
    // Render snapshots
    // ========================================================================

    /// Every story, newest first.
    pub fn listings(&self) -> Vec<StoryListing> {
        self.annotate(self.stories.stories())
    }

    /// The logged-in user's favorites. Empty when anonymous.
    pub fn favorite_listings(&self) -> Vec<StoryListing> {
        self.annotate(self.session.favorites())
    }

    /// The logged-in user's own stories. Empty when anonymous.
    pub fn own_listings(&self) -> Vec<StoryListing> {
        self.annotate(self.session.own_stories())
    }

    fn annotate(&self, stories: Vec<Story>) -> Vec<StoryListing> {
        let authenticated = self.session.is_authenticated();
        stories
            .into_iter()
            .map(|story| StoryListing {
                hostname: story.hostname(),
                favorite: authenticated.then(|| self.session.is_favorite(&story)),
                own: self.session.is_own_story(&story),
                story,
            })
            .collect()
    }
}
