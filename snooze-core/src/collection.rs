//! The locally held list of all stories.

use crate::error::Error;
use crate::remote::StoryService;
use crate::session::Session;
use crate::story::{remove_by_id, NewStory, Story, StoryId};
use std::cell::RefCell;
use std::collections::HashSet;
use std::sync::Arc;

/// Every story the service knows about, newest first.
///
/// Starts empty. A failed refresh leaves the previous contents in place;
/// submits and removals update the list only once the service has confirmed
/// them. Ids are unique within the list.
pub struct StoryCollection {
    service: Arc<dyn StoryService>,
    stories: RefCell<Vec<Story>>,
}

impl StoryCollection {
    pub fn new(service: Arc<dyn StoryService>) -> Self {
        Self {
            service,
            stories: RefCell::new(Vec::new()),
        }
    }

    /// Replace the contents with the service's current list.
    ///
    /// Duplicate ids in the response keep their first occurrence.
    pub async fn refresh(&self) -> Result<(), Error> {
        let fetched = self.service.list_all().await.map_err(|e| {
            tracing::warn!(error = %e, "story refresh failed, keeping previous list");
            e
        })?;

        let total = fetched.len();
        let mut seen = HashSet::with_capacity(total);
        let stories: Vec<Story> = fetched
            .into_iter()
            .filter(|story| seen.insert(story.id().clone()))
            .collect();
        if stories.len() != total {
            tracing::warn!(
                duplicates = total - stories.len(),
                "story list contained duplicate ids"
            );
        }
        tracing::debug!(count = stories.len(), "story list refreshed");
        *self.stories.borrow_mut() = stories;
        Ok(())
    }

    /// Submit a new story on behalf of the session's user.
    ///
    /// Input is validated before anything is sent. On success the story is
    /// placed at the front of the list and recorded as one of the user's own.
    pub async fn submit(
        &self,
        session: &Session,
        title: &str,
        author: &str,
        url: &str,
    ) -> Result<Story, Error> {
        let new_story = NewStory::new(title, author, url)?;
        let auth = session.authorization()?;

        let story = match self.service.create(&auth.credential, &new_story).await {
            Ok(story) => story,
            Err(e) => {
                tracing::warn!(error = %e, "story submission failed");
                session.handle_failure(auth.generation, &e);
                return Err(e);
            }
        };

        {
            let mut stories = self.stories.borrow_mut();
            remove_by_id(&mut stories, story.id());
            stories.insert(0, story.clone());
        }
        session.record_created_story(auth.generation, story.clone());
        tracing::info!(story_id = %story.id(), username = %auth.username, "story submitted");
        Ok(story)
    }

    /// Delete a story everywhere.
    ///
    /// A story the service no longer knows counts as deleted. Any
    /// authenticated user may delete any story.
    pub async fn remove(&self, session: &Session, story_id: &StoryId) -> Result<(), Error> {
        let auth = session.authorization()?;

        match self.service.remove(&auth.credential, story_id).await {
            Ok(()) => {}
            Err(Error::NotFound(message)) => {
                tracing::debug!(%story_id, %message, "story was already gone");
            }
            Err(e) => {
                tracing::warn!(%story_id, error = %e, "story removal failed");
                session.handle_failure(auth.generation, &e);
                return Err(e);
            }
        }

        remove_by_id(&mut self.stories.borrow_mut(), story_id);
        session.notify_story_deleted(story_id);
        tracing::info!(%story_id, "story removed");
        Ok(())
    }

    /// Snapshot of the current list.
    pub fn stories(&self) -> Vec<Story> {
        self.stories.borrow().clone()
    }

    pub fn get(&self, story_id: &StoryId) -> Option<Story> {
        self.stories
            .borrow()
            .iter()
            .find(|story| story.id() == story_id)
            .cloned()
    }

    pub fn contains(&self, story_id: &StoryId) -> bool {
        self.stories.borrow().iter().any(|story| story.id() == story_id)
    }

    pub fn len(&self) -> usize {
        self.stories.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.stories.borrow().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionState;
    use crate::testing::{MockServer, Operation};
    use chrono::Utc;

    fn server() -> MockServer {
        MockServer::new().with_user("alice", "hunter2", "Alice")
    }

    #[tokio::test]
    async fn test_starts_empty_and_refreshes() {
        let server = server();
        server.seed_story("Old", "A", "https://a.example", "bob");
        server.seed_story("New", "B", "https://b.example", "bob");

        let stories = server.collection();
        assert!(stories.is_empty());
        stories.refresh().await.unwrap();
        let titles: Vec<_> = stories.stories().iter().map(|s| s.title().to_string()).collect();
        assert_eq!(titles, vec!["New", "Old"]);
    }

    #[tokio::test]
    async fn test_refresh_failure_keeps_previous_list() {
        let server = server();
        server.seed_story("T", "A", "https://a.example", "bob");
        let stories = server.collection();
        stories.refresh().await.unwrap();
        let before = stories.stories();

        server.fail_next(Operation::ListAll, Error::ServiceUnavailable("down".into()));
        assert!(stories.refresh().await.unwrap_err().is_transient());
        assert_eq!(stories.stories(), before);
    }

    #[tokio::test]
    async fn test_refresh_drops_duplicate_ids() {
        let server = server();
        let story = server.seed_story("T", "A", "https://a.example", "bob");
        server.seed_existing(Story::new(
            story.id().clone(),
            "Copy",
            "A",
            "https://a.example",
            "bob",
            Utc::now(),
        ));

        let stories = server.collection();
        stories.refresh().await.unwrap();
        assert_eq!(stories.len(), 1);
        assert_eq!(stories.stories()[0].title(), "Copy");
    }

    #[tokio::test]
    async fn test_submit_prepends_and_records_ownership() {
        let server = server();
        server.seed_story("Existing", "A", "https://a.example", "bob");
        let stories = server.collection();
        stories.refresh().await.unwrap();
        let session = server.session();
        session.login("alice", "hunter2").await.unwrap();

        let story = stories
            .submit(&session, "Rust", "Ferris", "https://rust-lang.org")
            .await
            .unwrap();
        assert_eq!(story.submitter(), "alice");
        assert_eq!(stories.stories()[0].id(), story.id());
        assert_eq!(stories.len(), 2);
        assert!(session.is_own_story(&story));
        assert!(server.story_ids().contains(story.id()));
    }

    #[tokio::test]
    async fn test_submit_rejects_bad_input_without_calling_service() {
        let server = server();
        let stories = server.collection();
        let session = server.session();
        session.login("alice", "hunter2").await.unwrap();

        let err = stories
            .submit(&session, "Rust", "Ferris", "not a url")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(server.call_count(Operation::Create), 0);
        assert!(stories.is_empty());
    }

    #[tokio::test]
    async fn test_submit_requires_login() {
        let server = server();
        let stories = server.collection();
        let session = server.session();
        let err = stories
            .submit(&session, "Rust", "Ferris", "https://rust-lang.org")
            .await
            .unwrap_err();
        assert_eq!(err, Error::NotAuthenticated);
    }

    #[tokio::test]
    async fn test_failed_submit_changes_nothing() {
        let server = server();
        let stories = server.collection();
        let session = server.session();
        session.login("alice", "hunter2").await.unwrap();

        server.fail_next(Operation::Create, Error::ServiceUnavailable("down".into()));
        stories
            .submit(&session, "Rust", "Ferris", "https://rust-lang.org")
            .await
            .unwrap_err();
        assert!(stories.is_empty());
        assert!(session.own_stories().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_submit_keeps_error_kind() {
        let server = server();
        server.seed_story("Existing", "A", "https://a.example", "bob");
        let stories = server.collection();
        stories.refresh().await.unwrap();
        let before = stories.stories();
        let session = server.session();
        session.login("alice", "hunter2").await.unwrap();

        server.fail_next(Operation::Create, Error::Validation("url rejected".into()));
        let err = stories
            .submit(&session, "Rust", "Ferris", "https://rust-lang.org")
            .await
            .unwrap_err();
        assert_eq!(err, Error::Validation("url rejected".into()));
        assert_eq!(stories.stories(), before);
        assert!(session.own_stories().is_empty());
        assert_eq!(session.state(), SessionState::Authenticated);

        server.fail_next(Operation::Create, Error::Unauthorized("token expired".into()));
        let err = stories
            .submit(&session, "Rust", "Ferris", "https://rust-lang.org")
            .await
            .unwrap_err();
        assert_eq!(err, Error::Unauthorized("token expired".into()));
        assert_eq!(stories.stories(), before);
        assert!(session.own_stories().is_empty());
        assert_eq!(session.state(), SessionState::Anonymous);
        assert_eq!(server.story_ids().len(), 1);
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let server = server();
        let story = server.seed_story("T", "A", "https://a.example", "alice");
        server.mark_favorite("alice", story.id());
        let stories = server.collection();
        stories.refresh().await.unwrap();
        let session = server.session();
        session.login("alice", "hunter2").await.unwrap();

        stories.remove(&session, story.id()).await.unwrap();
        assert!(!stories.contains(story.id()));
        assert!(!session.is_favorite(&story));
        assert!(!session.is_own_story(&story));

        stories.remove(&session, story.id()).await.unwrap();
        assert!(stories.is_empty());
    }

    #[tokio::test]
    async fn test_failed_remove_keeps_story() {
        let server = server();
        let story = server.seed_story("T", "A", "https://a.example", "bob");
        let stories = server.collection();
        stories.refresh().await.unwrap();
        let session = server.session();
        session.login("alice", "hunter2").await.unwrap();

        server.fail_next(Operation::Remove, Error::ServiceUnavailable("down".into()));
        stories.remove(&session, story.id()).await.unwrap_err();
        assert!(stories.contains(story.id()));
    }

    #[tokio::test]
    async fn test_rejected_credential_on_remove_expires_session() {
        let server = server();
        let story = server.seed_story("T", "A", "https://a.example", "bob");
        let stories = server.collection();
        stories.refresh().await.unwrap();
        let session = server.session();
        session.login("alice", "hunter2").await.unwrap();
        server.revoke_credentials("alice");

        let err = stories.remove(&session, story.id()).await.unwrap_err();
        assert!(err.is_unauthorized());
        assert_eq!(session.state(), SessionState::Anonymous);
        assert!(stories.contains(story.id()));
    }
}
