//! Testing utilities.
//!
//! [`MockServer`] is an in-memory stand-in for the remote store. It
//! implements both [`StoryService`] and [`UserService`], so collections,
//! sessions and whole [`StoryClient`]s can be exercised without a network:
//! - scripted failures per operation with [`MockServer::fail_next`]
//! - gates that park calls until released, for in-flight scenarios
//! - a call log and direct access to the server-side state

use crate::client::StoryClient;
use crate::collection::StoryCollection;
use crate::credential::Credential;
use crate::error::Error;
use crate::remote::{AuthenticatedUser, StoryService, UserProfile, UserService};
use crate::session::{Session, SessionConfig};
use crate::story::{remove_by_id, NewStory, Story, StoryId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Semaphore;
use uuid::Uuid;

/// A remote call, as seen by the mock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    ListAll,
    Create,
    Remove,
    Register,
    Authenticate,
    Resume,
    SetFavorite,
}

struct MockUser {
    password: String,
    display_name: String,
    created_at: DateTime<Utc>,
    favorites: Vec<StoryId>,
}

#[derive(Default)]
struct ServerState {
    /// Newest first.
    stories: Vec<Story>,
    users: HashMap<String, MockUser>,
    /// Token to username.
    tokens: HashMap<String, String>,
    failures: VecDeque<(Operation, Error)>,
    gates: HashMap<Operation, Arc<Semaphore>>,
    calls: Vec<Operation>,
}

impl ServerState {
    fn user_for(&self, credential: &Credential) -> Result<String, Error> {
        self.tokens
            .get(credential.expose())
            .cloned()
            .ok_or_else(|| Error::Unauthorized("invalid token".into()))
    }

    fn issue(&mut self, username: &str) -> Credential {
        let token = format!("token-{}", Uuid::new_v4());
        self.tokens.insert(token.clone(), username.to_string());
        Credential::new(token)
    }

    fn profile(&self, username: &str) -> Result<UserProfile, Error> {
        let user = self
            .users
            .get(username)
            .ok_or_else(|| Error::NotFound(format!("no user named {username}")))?;
        let favorites = user
            .favorites
            .iter()
            .filter_map(|id| self.stories.iter().find(|s| s.id() == id).cloned())
            .collect();
        let own_stories = self
            .stories
            .iter()
            .filter(|s| s.submitter() == username)
            .cloned()
            .collect();

        Ok(UserProfile {
            username: username.to_string(),
            display_name: user.display_name.clone(),
            created_at: user.created_at,
            favorites,
            own_stories,
        })
    }
}

/// An in-memory story service.
///
/// Clones share the same state, so a test can keep one handle while the
/// code under test owns another.
#[derive(Clone, Default)]
pub struct MockServer {
    state: Arc<Mutex<ServerState>>,
}

impl MockServer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add an account.
    pub fn with_user(self, username: &str, password: &str, display_name: &str) -> Self {
        self.add_user(username, password, display_name);
        self
    }

    pub fn add_user(&self, username: &str, password: &str, display_name: &str) {
        self.lock().users.insert(
            username.to_string(),
            MockUser {
                password: password.to_string(),
                display_name: display_name.to_string(),
                created_at: Utc::now(),
                favorites: Vec::new(),
            },
        );
    }

    /// Create a story on the server, as if submitted by `submitter`.
    pub fn seed_story(&self, title: &str, author: &str, url: &str, submitter: &str) -> Story {
        let story = Story::new(
            Uuid::new_v4().to_string(),
            title,
            author,
            url,
            submitter,
            Utc::now(),
        );
        self.lock().stories.insert(0, story.clone());
        story
    }

    /// Put a prebuilt story at the front of the list, duplicate ids included.
    pub fn seed_existing(&self, story: Story) {
        self.lock().stories.insert(0, story);
    }

    /// Favorite a story server-side, bypassing any client.
    pub fn mark_favorite(&self, username: &str, story_id: &StoryId) {
        if let Some(user) = self.lock().users.get_mut(username) {
            if !user.favorites.contains(story_id) {
                user.favorites.push(story_id.clone());
            }
        }
    }

    /// Issue a fresh credential for an existing user.
    pub fn issue_credential(&self, username: &str) -> Credential {
        self.lock().issue(username)
    }

    /// Invalidate every credential issued to `username`.
    pub fn revoke_credentials(&self, username: &str) {
        self.lock().tokens.retain(|_, owner| owner != username);
    }

    /// Make the next call of `operation` fail with `error`.
    pub fn fail_next(&self, operation: Operation, error: Error) {
        self.lock().failures.push_back((operation, error));
    }

    /// Park every call of `operation` until [`release`](Self::release)d.
    pub fn hold(&self, operation: Operation) {
        self.lock()
            .gates
            .insert(operation, Arc::new(Semaphore::new(0)));
    }

    /// Let `count` parked (or future) calls of `operation` through.
    pub fn release(&self, operation: Operation, count: usize) {
        if let Some(gate) = self.lock().gates.get(&operation) {
            gate.add_permits(count);
        }
    }

    /// Every call that reached the server, in order.
    pub fn calls(&self) -> Vec<Operation> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self, operation: Operation) -> usize {
        self.lock().calls.iter().filter(|op| **op == operation).count()
    }

    /// Ids of the stories on the server, newest first.
    pub fn story_ids(&self) -> Vec<StoryId> {
        self.lock().stories.iter().map(|s| s.id().clone()).collect()
    }

    /// Server-side favorites of `username`.
    pub fn favorite_ids(&self, username: &str) -> Vec<StoryId> {
        self.lock()
            .users
            .get(username)
            .map(|user| user.favorites.clone())
            .unwrap_or_default()
    }

    /// An anonymous session backed by this server.
    pub fn session(&self) -> Session {
        Session::new(Arc::new(self.clone()))
    }

    /// An empty collection backed by this server.
    pub fn collection(&self) -> StoryCollection {
        StoryCollection::new(Arc::new(self.clone()))
    }

    /// A client backed by this server.
    pub fn client(&self) -> StoryClient {
        self.client_with_config(SessionConfig::default())
    }

    pub fn client_with_config(&self, config: SessionConfig) -> StoryClient {
        StoryClient::new(Arc::new(self.clone()), Arc::new(self.clone()), config)
    }

    /// Wait at the operation's gate, log the call, then apply any scripted failure.
    async fn enter(&self, operation: Operation) -> Result<(), Error> {
        let gate = self.lock().gates.get(&operation).cloned();
        if let Some(gate) = gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        let mut state = self.lock();
        state.calls.push(operation);
        if let Some(index) = state.failures.iter().position(|(op, _)| *op == operation) {
            if let Some((_, error)) = state.failures.remove(index) {
                return Err(error);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl StoryService for MockServer {
    async fn list_all(&self) -> Result<Vec<Story>, Error> {
        self.enter(Operation::ListAll).await?;
        Ok(self.lock().stories.clone())
    }

    async fn create(&self, credential: &Credential, story: &NewStory) -> Result<Story, Error> {
        self.enter(Operation::Create).await?;
        let mut state = self.lock();
        let username = state.user_for(credential)?;
        let story = Story::new(
            Uuid::new_v4().to_string(),
            story.title(),
            story.author(),
            story.url(),
            username,
            Utc::now(),
        );
        state.stories.insert(0, story.clone());
        Ok(story)
    }

    async fn remove(&self, credential: &Credential, story_id: &StoryId) -> Result<(), Error> {
        self.enter(Operation::Remove).await?;
        let mut state = self.lock();
        state.user_for(credential)?;
        remove_by_id(&mut state.stories, story_id)
            .ok_or_else(|| Error::NotFound(format!("no story with id {story_id}")))?;
        for user in state.users.values_mut() {
            user.favorites.retain(|id| id != story_id);
        }
        Ok(())
    }
}

#[async_trait]
impl UserService for MockServer {
    async fn register(
        &self,
        username: &str,
        password: &str,
        display_name: &str,
    ) -> Result<AuthenticatedUser, Error> {
        self.enter(Operation::Register).await?;
        if username.trim().is_empty() || password.is_empty() {
            return Err(Error::Validation("username and password are required".into()));
        }
        let mut state = self.lock();
        if state.users.contains_key(username) {
            return Err(Error::Conflict(format!("username {username} is taken")));
        }
        state.users.insert(
            username.to_string(),
            MockUser {
                password: password.to_string(),
                display_name: display_name.to_string(),
                created_at: Utc::now(),
                favorites: Vec::new(),
            },
        );
        let credential = state.issue(username);
        let profile = state.profile(username)?;
        Ok(AuthenticatedUser {
            profile,
            credential,
        })
    }

    async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<AuthenticatedUser, Error> {
        self.enter(Operation::Authenticate).await?;
        let mut state = self.lock();
        let valid = state
            .users
            .get(username)
            .is_some_and(|user| user.password == password);
        if !valid {
            return Err(Error::Unauthorized("invalid username or password".into()));
        }
        let credential = state.issue(username);
        let profile = state.profile(username)?;
        Ok(AuthenticatedUser {
            profile,
            credential,
        })
    }

    async fn resume(&self, credential: &Credential, username: &str) -> Result<UserProfile, Error> {
        self.enter(Operation::Resume).await?;
        let state = self.lock();
        if state.user_for(credential)? != username {
            return Err(Error::Unauthorized("token does not belong to this user".into()));
        }
        state.profile(username)
    }

    async fn set_favorite(
        &self,
        credential: &Credential,
        username: &str,
        story_id: &StoryId,
        desired: bool,
    ) -> Result<(), Error> {
        self.enter(Operation::SetFavorite).await?;
        let mut state = self.lock();
        if state.user_for(credential)? != username {
            return Err(Error::Unauthorized("token does not belong to this user".into()));
        }
        if !state.stories.iter().any(|s| s.id() == story_id) {
            return Err(Error::NotFound(format!("no story with id {story_id}")));
        }
        let user = state
            .users
            .get_mut(username)
            .ok_or_else(|| Error::NotFound(format!("no user named {username}")))?;

        let present = user.favorites.contains(story_id);
        match (desired, present) {
            (true, true) => Err(Error::Conflict("story is already a favorite".into())),
            (false, false) => Err(Error::Conflict("story is not a favorite".into())),
            (true, false) => {
                user.favorites.push(story_id.clone());
                Ok(())
            }
            (false, true) => {
                user.favorites.retain(|id| id != story_id);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_failure_hits_only_its_operation() {
        let server = MockServer::new();
        server.fail_next(Operation::Create, Error::ServiceUnavailable("down".into()));

        assert!(server.list_all().await.is_ok());
        let err = server
            .create(
                &Credential::new("nope"),
                &NewStory::new("t", "a", "https://a.example").unwrap(),
            )
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert_eq!(server.calls(), vec![Operation::ListAll, Operation::Create]);
    }

    #[tokio::test]
    async fn test_remove_cascades_to_favorites() {
        let server = MockServer::new().with_user("alice", "pw", "Alice");
        let story = server.seed_story("t", "a", "https://a.example", "bob");
        server.mark_favorite("alice", story.id());
        let credential = server.issue_credential("alice");

        server.remove(&credential, story.id()).await.unwrap();
        assert!(server.favorite_ids("alice").is_empty());
        let err = server.remove(&credential, story.id()).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_redundant_favorite_is_a_conflict() {
        let server = MockServer::new().with_user("alice", "pw", "Alice");
        let story = server.seed_story("t", "a", "https://a.example", "bob");
        let credential = server.issue_credential("alice");

        server
            .set_favorite(&credential, "alice", story.id(), true)
            .await
            .unwrap();
        let err = server
            .set_favorite(&credential, "alice", story.id(), true)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn test_credentials_are_per_user() {
        let server = MockServer::new()
            .with_user("alice", "pw", "Alice")
            .with_user("bob", "pw", "Bob");
        let credential = server.issue_credential("alice");

        assert!(server.resume(&credential, "alice").await.is_ok());
        assert!(server
            .resume(&credential, "bob")
            .await
            .unwrap_err()
            .is_unauthorized());

        server.revoke_credentials("alice");
        assert!(server
            .resume(&credential, "alice")
            .await
            .unwrap_err()
            .is_unauthorized());
    }
}
