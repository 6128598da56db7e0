//! Session - the current user and everything tied to their credential.
//!
//! A session is either anonymous (read-only browsing), authenticating (a
//! signup, login or resume call is in flight) or authenticated. While
//! authenticated it holds the user's identity, credential, favorites and own
//! stories, and keeps them consistent with the service across favorite
//! toggles and story deletions.
//!
//! State lives in a `RefCell` and is only borrowed between network calls,
//! never across one, so concurrent operations on one thread cannot observe
//! a half-applied mutation. A generation counter is bumped on every identity
//! change; a call that completes after its session was logged out or replaced
//! leaves the new state alone.

use crate::credential::Credential;
use crate::error::Error;
use crate::remote::{UserProfile, UserService};
use crate::story::{insert_unique, remove_by_id, Story, StoryId};
use chrono::{DateTime, Utc};
use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::sync::Arc;

/// Configuration for a [`Session`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Drop back to anonymous when the service rejects the credential.
    pub expire_on_unauthorized: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            expire_on_unauthorized: true,
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set whether an `Unauthorized` answer logs the session out.
    pub fn with_expire_on_unauthorized(mut self, expire: bool) -> Self {
        self.expire_on_unauthorized = expire;
        self
    }
}

/// Observable lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Anonymous,
    Authenticating,
    Authenticated,
}

struct Account {
    username: String,
    display_name: String,
    created_at: DateTime<Utc>,
    credential: Credential,
    favorites: Vec<Story>,
    own_stories: Vec<Story>,
    /// Deleted stories whose toggle is still in flight; its rollback must not
    /// bring them back.
    deleted: HashSet<StoryId>,
}

impl Account {
    fn new(profile: UserProfile, credential: Credential) -> Self {
        Self {
            username: profile.username,
            display_name: profile.display_name,
            created_at: profile.created_at,
            credential,
            favorites: dedup(profile.favorites),
            own_stories: dedup(profile.own_stories),
            deleted: HashSet::new(),
        }
    }
}

fn dedup(stories: Vec<Story>) -> Vec<Story> {
    let mut unique = Vec::with_capacity(stories.len());
    for story in stories {
        insert_unique(&mut unique, story);
    }
    unique
}

enum State {
    Anonymous,
    Authenticating,
    Authenticated(Account),
}

/// What an authorized call needs, captured before it suspends.
pub(crate) struct Authorization {
    pub generation: u64,
    pub credential: Credential,
    pub username: String,
}

/// The current user, or its absence.
pub struct Session {
    users: Arc<dyn UserService>,
    config: SessionConfig,
    state: RefCell<State>,
    generation: Cell<u64>,
    toggles_in_flight: RefCell<HashSet<(u64, StoryId)>>,
}

/// Releases a story's in-flight toggle slot when dropped.
struct ToggleGuard<'a> {
    in_flight: &'a RefCell<HashSet<(u64, StoryId)>>,
    key: (u64, StoryId),
}

impl Drop for ToggleGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.borrow_mut().remove(&self.key);
    }
}

impl Session {
    /// Create an anonymous session backed by the given user service.
    pub fn new(users: Arc<dyn UserService>) -> Self {
        Self::with_config(users, SessionConfig::default())
    }

    pub fn with_config(users: Arc<dyn UserService>, config: SessionConfig) -> Self {
        Self {
            users,
            config,
            state: RefCell::new(State::Anonymous),
            generation: Cell::new(0),
            toggles_in_flight: RefCell::new(HashSet::new()),
        }
    }

    // ========================================================================
    // Authentication
    // ========================================================================

    /// Register a new account and become authenticated as it.
    pub async fn signup(
        &self,
        username: &str,
        password: &str,
        display_name: &str,
    ) -> Result<(), Error> {
        let generation = self.begin_authentication()?;
        let result = self
            .users
            .register(username, password, display_name)
            .await
            .map(|user| (user.profile, user.credential));
        self.finish_authentication(generation, result)
    }

    /// Log in with a username and password.
    pub async fn login(&self, username: &str, password: &str) -> Result<(), Error> {
        let generation = self.begin_authentication()?;
        let result = self
            .users
            .authenticate(username, password)
            .await
            .map(|user| (user.profile, user.credential));
        self.finish_authentication(generation, result)
    }

    /// Re-establish a session from a remembered credential.
    ///
    /// A rejected or expired credential is an expected outcome, not an error:
    /// the session simply stays anonymous. Only a local conflict (another
    /// authentication already running) is returned as `Err`.
    pub async fn resume_from(
        &self,
        credential: Credential,
        username: &str,
    ) -> Result<SessionState, Error> {
        let generation = self.begin_authentication()?;
        let result = self
            .users
            .resume(&credential, username)
            .await
            .map(|profile| (profile, credential));
        if let Err(e) = self.finish_authentication(generation, result) {
            tracing::info!(username, error = %e, "stored session could not be resumed");
        }
        Ok(self.state())
    }

    /// Re-read the profile from the service, replacing favorites and own
    /// stories with the server's view.
    ///
    /// Stories with a favorite toggle still in flight keep their local
    /// membership; the toggle settles them when it completes.
    pub async fn reload(&self) -> Result<(), Error> {
        let auth = self.authorization()?;
        match self.users.resume(&auth.credential, &auth.username).await {
            Ok(profile) => {
                let pending = self.toggles_pending(auth.generation);
                self.with_account(auth.generation, |account| {
                    let mut favorites: Vec<Story> = dedup(profile.favorites)
                        .into_iter()
                        .filter(|story| !pending.contains(story.id()))
                        .collect();
                    for story in account.favorites.drain(..) {
                        if pending.contains(story.id()) {
                            insert_unique(&mut favorites, story);
                        }
                    }
                    account.display_name = profile.display_name;
                    account.favorites = favorites;
                    account.own_stories = dedup(profile.own_stories);
                    account.deleted.retain(|id| pending.contains(id));
                })
                .ok_or(Error::Superseded)
            }
            Err(e) => {
                self.handle_failure(auth.generation, &e);
                Err(e)
            }
        }
    }

    /// Discard the credential and forget the user's favorites and stories.
    pub fn logout(&self) {
        self.bump_generation();
        let previous = self.state.replace(State::Anonymous);
        if let State::Authenticated(account) = previous {
            tracing::info!(username = %account.username, "logged out");
        }
    }

    fn begin_authentication(&self) -> Result<u64, Error> {
        if matches!(*self.state.borrow(), State::Authenticating) {
            return Err(Error::AuthenticationInProgress);
        }
        let generation = self.bump_generation();
        *self.state.borrow_mut() = State::Authenticating;
        Ok(generation)
    }

    fn finish_authentication(
        &self,
        generation: u64,
        result: Result<(UserProfile, Credential), Error>,
    ) -> Result<(), Error> {
        if self.generation.get() != generation {
            return Err(Error::Superseded);
        }
        match result {
            Ok((profile, credential)) => {
                let account = Account::new(profile, credential);
                tracing::info!(
                    username = %account.username,
                    favorites = account.favorites.len(),
                    own_stories = account.own_stories.len(),
                    "session authenticated"
                );
                *self.state.borrow_mut() = State::Authenticated(account);
                Ok(())
            }
            Err(e) => {
                *self.state.borrow_mut() = State::Anonymous;
                Err(e)
            }
        }
    }

    fn bump_generation(&self) -> u64 {
        let next = self.generation.get().wrapping_add(1);
        self.generation.set(next);
        next
    }

    // ========================================================================
    // Favorites
    // ========================================================================

    /// Flip a story's favorite status. Returns whether it is now a favorite.
    ///
    /// The local set changes immediately and is rolled back if the service
    /// refuses. A `Conflict` answer means the server already agrees and counts
    /// as success. While a toggle for a story is in flight, further toggles of
    /// that same story fail with [`Error::ToggleInFlight`].
    pub async fn toggle_favorite(&self, story: &Story) -> Result<bool, Error> {
        let auth = self.authorization()?;
        let _in_flight = self.claim_toggle(auth.generation, story.id())?;

        let desired = !self.is_favorite(story);
        let removed = self
            .with_account(auth.generation, |account| {
                if desired {
                    insert_unique(&mut account.favorites, story.clone());
                    None
                } else {
                    remove_by_id(&mut account.favorites, story.id())
                }
            })
            .flatten();

        let result = self
            .users
            .set_favorite(&auth.credential, &auth.username, story.id(), desired)
            .await;

        let outcome = match result {
            Ok(()) => Ok(desired),
            Err(Error::Conflict(message)) => {
                tracing::debug!(story_id = %story.id(), desired, %message, "favorite already in requested state");
                Ok(desired)
            }
            Err(e) => {
                tracing::warn!(story_id = %story.id(), desired, error = %e, "favorite change failed, rolling back");
                self.with_account(auth.generation, |account| {
                    if desired {
                        remove_by_id(&mut account.favorites, story.id());
                    } else if let Some((index, previous)) = removed {
                        let restorable = !account.deleted.contains(previous.id())
                            && !account.favorites.iter().any(|s| s.id() == previous.id());
                        if restorable {
                            let index = index.min(account.favorites.len());
                            account.favorites.insert(index, previous);
                        }
                    }
                });
                Err(e)
            }
        };

        // The tombstone only guards this toggle's rollback.
        self.with_account(auth.generation, |account| {
            account.deleted.remove(story.id());
        });
        if let Err(e) = &outcome {
            self.handle_failure(auth.generation, e);
        }
        outcome
    }

    fn claim_toggle(&self, generation: u64, story_id: &StoryId) -> Result<ToggleGuard<'_>, Error> {
        let key = (generation, story_id.clone());
        if !self.toggles_in_flight.borrow_mut().insert(key.clone()) {
            return Err(Error::ToggleInFlight(story_id.clone()));
        }
        Ok(ToggleGuard {
            in_flight: &self.toggles_in_flight,
            key,
        })
    }

    /// Whether a favorite toggle for this story is currently awaiting the service.
    pub fn is_toggle_in_flight(&self, story_id: &StoryId) -> bool {
        self.toggles_in_flight
            .borrow()
            .contains(&(self.generation.get(), story_id.clone()))
    }

    fn toggles_pending(&self, generation: u64) -> HashSet<StoryId> {
        self.toggles_in_flight
            .borrow()
            .iter()
            .filter(|(g, _)| *g == generation)
            .map(|(_, id)| id.clone())
            .collect()
    }

    // ========================================================================
    // Consistency hooks
    // ========================================================================

    /// Forget a story that no longer exists, wherever the session holds it.
    pub fn notify_story_deleted(&self, story_id: &StoryId) {
        let toggle_pending = self.is_toggle_in_flight(story_id);
        if let State::Authenticated(account) = &mut *self.state.borrow_mut() {
            let was_favorite = remove_by_id(&mut account.favorites, story_id).is_some();
            let was_own = remove_by_id(&mut account.own_stories, story_id).is_some();
            if toggle_pending {
                account.deleted.insert(story_id.clone());
            }
            if was_favorite || was_own {
                tracing::debug!(%story_id, was_favorite, was_own, "pruned deleted story");
            }
        }
    }

    pub(crate) fn authorization(&self) -> Result<Authorization, Error> {
        match &*self.state.borrow() {
            State::Authenticated(account) => Ok(Authorization {
                generation: self.generation.get(),
                credential: account.credential.clone(),
                username: account.username.clone(),
            }),
            _ => Err(Error::NotAuthenticated),
        }
    }

    /// Record a story this session's user just created.
    pub(crate) fn record_created_story(&self, generation: u64, story: Story) {
        self.with_account(generation, |account| {
            insert_unique(&mut account.own_stories, story);
        });
    }

    /// React to a failed authorized call made under `generation`.
    pub(crate) fn handle_failure(&self, generation: u64, err: &Error) {
        if !err.is_unauthorized() || !self.config.expire_on_unauthorized {
            return;
        }
        if self.generation.get() != generation {
            return;
        }
        self.bump_generation();
        let previous = self.state.replace(State::Anonymous);
        if let State::Authenticated(account) = previous {
            tracing::info!(username = %account.username, "credential rejected, session expired");
        }
    }

    fn with_account<R>(&self, generation: u64, f: impl FnOnce(&mut Account) -> R) -> Option<R> {
        if self.generation.get() != generation {
            return None;
        }
        match &mut *self.state.borrow_mut() {
            State::Authenticated(account) => Some(f(account)),
            _ => None,
        }
    }

    fn read_account<R>(&self, f: impl FnOnce(&Account) -> R) -> Option<R> {
        match &*self.state.borrow() {
            State::Authenticated(account) => Some(f(account)),
            _ => None,
        }
    }

    // ========================================================================
    // Read-only snapshots
    // ========================================================================

    pub fn state(&self) -> SessionState {
        match &*self.state.borrow() {
            State::Anonymous => SessionState::Anonymous,
            State::Authenticating => SessionState::Authenticating,
            State::Authenticated(_) => SessionState::Authenticated,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.state() == SessionState::Authenticated
    }

    pub fn username(&self) -> Option<String> {
        self.read_account(|a| a.username.clone())
    }

    pub fn display_name(&self) -> Option<String> {
        self.read_account(|a| a.display_name.clone())
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.read_account(|a| a.created_at)
    }

    /// The credential, for remembering the login. Never render or log it.
    pub fn credential(&self) -> Option<Credential> {
        self.read_account(|a| a.credential.clone())
    }

    pub fn favorites(&self) -> Vec<Story> {
        self.read_account(|a| a.favorites.clone()).unwrap_or_default()
    }

    pub fn own_stories(&self) -> Vec<Story> {
        self.read_account(|a| a.own_stories.clone()).unwrap_or_default()
    }

    pub fn is_favorite(&self, story: &Story) -> bool {
        self.read_account(|a| a.favorites.iter().any(|s| s.id() == story.id()))
            .unwrap_or(false)
    }

    pub fn is_own_story(&self, story: &Story) -> bool {
        self.read_account(|a| a.own_stories.iter().any(|s| s.id() == story.id()))
            .unwrap_or(false)
    }
}
