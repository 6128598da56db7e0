//! End-to-end consistency scenarios against the in-memory server.
//!
//! Each test drives a `StoryClient` the way a front end would and checks the
//! collection, the session and the server agree afterwards.
//! Run with: `cargo test -p snooze-core --test consistency`

use snooze_core::testing::{MockServer, Operation};
use snooze_core::{Error, SavedCredential, SessionState, StoryClient, StoryId};
use std::collections::HashSet;
use tempfile::TempDir;

fn server() -> MockServer {
    MockServer::new()
        .with_user("alice", "hunter2", "Alice")
        .with_user("bob", "builder", "Bob")
}

async fn started_as(server: &MockServer, username: &str, password: &str) -> StoryClient {
    let client = server.client();
    client.start(None).await.expect("start should succeed");
    client
        .session()
        .login(username, password)
        .await
        .expect("login should succeed");
    client
}

fn ids(client: &StoryClient) -> Vec<StoryId> {
    client.stories().stories().iter().map(|s| s.id().clone()).collect()
}

fn assert_unique(ids: &[StoryId]) {
    let unique: HashSet<_> = ids.iter().collect();
    assert_eq!(unique.len(), ids.len(), "duplicate ids in {ids:?}");
}

// =============================================================================
// Create and delete
// =============================================================================

#[tokio::test]
async fn test_created_story_is_first_everywhere() {
    let server = server();
    server.seed_story("Older", "Someone", "https://old.example", "bob");
    let client = started_as(&server, "alice", "hunter2").await;

    let story = client
        .submit_story("Fresh", "Alice", "https://fresh.example/post")
        .await
        .unwrap();

    assert_eq!(ids(&client)[0], *story.id());
    assert_eq!(client.session().own_stories()[0].id(), story.id());
    assert_eq!(server.story_ids()[0], *story.id());
    assert_eq!(client.listings()[0].hostname.as_deref(), Some("fresh.example"));
}

#[tokio::test]
async fn test_delete_is_idempotent() {
    let server = server();
    let story = server.seed_story("T", "A", "https://a.example", "alice");
    let client = started_as(&server, "alice", "hunter2").await;

    client.remove_story(story.id()).await.unwrap();
    let after_first = ids(&client);
    client.remove_story(story.id()).await.unwrap();

    assert_eq!(ids(&client), after_first);
    assert!(!after_first.contains(story.id()));
}

#[tokio::test]
async fn test_delete_is_consistent_across_containers() {
    let server = server();
    let story = server.seed_story("T", "A", "https://a.example", "alice");
    server.mark_favorite("alice", story.id());
    let client = started_as(&server, "alice", "hunter2").await;
    assert!(client.session().is_favorite(&story));
    assert!(client.session().is_own_story(&story));

    client.remove_story(story.id()).await.unwrap();

    assert!(!client.stories().contains(story.id()));
    assert!(!client.session().is_favorite(&story));
    assert!(!client.session().is_own_story(&story));
}

#[tokio::test]
async fn test_any_user_may_delete_any_story() {
    let server = server();
    let story = server.seed_story("Alice's", "A", "https://a.example", "alice");
    let client = started_as(&server, "bob", "builder").await;
    assert!(!client.session().is_own_story(&story));

    client.remove_story(story.id()).await.unwrap();
    assert!(!client.stories().contains(story.id()));
    assert!(server.story_ids().is_empty());
}

#[tokio::test]
async fn test_deleted_favorite_of_another_user_disappears_on_reload() {
    let server = server();
    let story = server.seed_story("T", "A", "https://a.example", "bob");
    server.mark_favorite("alice", story.id());
    let alice = started_as(&server, "alice", "hunter2").await;
    let bob = started_as(&server, "bob", "builder").await;

    bob.remove_story(story.id()).await.unwrap();
    alice.session().reload().await.unwrap();
    alice.stories().refresh().await.unwrap();

    assert!(alice.favorite_listings().is_empty());
    assert!(alice.listings().is_empty());
}

#[tokio::test]
async fn test_no_duplicates_across_submit_and_refresh() {
    let server = server();
    server.seed_story("Seed", "A", "https://a.example", "bob");
    let client = started_as(&server, "alice", "hunter2").await;

    for i in 0..3 {
        client
            .submit_story(&format!("Story {i}"), "Alice", "https://a.example")
            .await
            .unwrap();
        assert_unique(&ids(&client));
        client.stories().refresh().await.unwrap();
        assert_unique(&ids(&client));
    }
    assert_eq!(client.stories().len(), 4);
    assert_unique(
        &client
            .session()
            .own_stories()
            .iter()
            .map(|s| s.id().clone())
            .collect::<Vec<_>>(),
    );
}

// =============================================================================
// Favorites
// =============================================================================

#[tokio::test]
async fn test_toggle_twice_restores_server_and_client() {
    let server = server();
    let story = server.seed_story("T", "A", "https://a.example", "bob");
    let client = started_as(&server, "alice", "hunter2").await;

    assert!(client.toggle_favorite(story.id()).await.unwrap());
    assert!(!client.toggle_favorite(story.id()).await.unwrap());

    assert!(!client.session().is_favorite(&story));
    assert!(server.favorite_ids("alice").is_empty());
}

#[tokio::test]
async fn test_rollback_leaves_favorites_exactly_as_before() {
    let server = server();
    let story = server.seed_story("T", "A", "https://a.example", "bob");
    let client = started_as(&server, "alice", "hunter2").await;
    let before = client.session().favorites();

    server.fail_next(Operation::SetFavorite, Error::ServiceUnavailable("timeout".into()));
    let err = client.toggle_favorite(story.id()).await.unwrap_err();

    assert!(err.is_transient());
    assert_eq!(client.session().favorites(), before);
    assert_eq!(client.session().state(), SessionState::Authenticated);
}

#[tokio::test]
async fn test_double_click_sends_one_request() {
    let server = server();
    let story = server.seed_story("T", "A", "https://a.example", "bob");
    let client = started_as(&server, "alice", "hunter2").await;
    server.hold(Operation::SetFavorite);

    let (first, second, _) = futures::join!(
        client.toggle_favorite(story.id()),
        client.toggle_favorite(story.id()),
        async { server.release(Operation::SetFavorite, 1) },
    );

    assert!(first.unwrap());
    assert!(matches!(second, Err(Error::ToggleInFlight(_))));
    assert_eq!(server.call_count(Operation::SetFavorite), 1);
    assert_eq!(server.favorite_ids("alice"), vec![story.id().clone()]);
}

#[tokio::test]
async fn test_expired_login_drops_to_anonymous() {
    let server = server();
    let story = server.seed_story("T", "A", "https://a.example", "bob");
    let client = started_as(&server, "alice", "hunter2").await;
    server.revoke_credentials("alice");

    let err = client.toggle_favorite(story.id()).await.unwrap_err();
    assert!(err.is_unauthorized());
    assert_eq!(client.session().state(), SessionState::Anonymous);
    assert!(client.listings().iter().all(|l| l.favorite.is_none()));
    assert_eq!(
        client.submit_story("T", "A", "https://a.example").await.unwrap_err(),
        Error::NotAuthenticated
    );
}

// =============================================================================
// Remembered login
// =============================================================================

#[tokio::test]
async fn test_remembered_login_survives_restart() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = temp_dir.path().join("login.json");
    let server = server();
    let story = server.seed_story("T", "A", "https://a.example", "bob");

    {
        let client = started_as(&server, "alice", "hunter2").await;
        client.toggle_favorite(story.id()).await.unwrap();
        client
            .saved_credential()
            .expect("logged in")
            .save_json(&path)
            .await
            .unwrap();
    }

    let saved = SavedCredential::load_if_present(&path).await.unwrap();
    let client = server.client();
    let state = client.start(saved.as_ref()).await.unwrap();

    assert_eq!(state, SessionState::Authenticated);
    assert_eq!(client.session().username().as_deref(), Some("alice"));
    assert_eq!(client.favorite_listings()[0].story.id(), story.id());
}

#[tokio::test]
async fn test_revoked_remembered_login_starts_anonymous() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = temp_dir.path().join("login.json");
    let server = server();

    SavedCredential::new("alice", server.issue_credential("alice"))
        .save_json(&path)
        .await
        .unwrap();
    server.revoke_credentials("alice");

    let saved = SavedCredential::load_if_present(&path).await.unwrap();
    let client = server.client();
    assert_eq!(
        client.start(saved.as_ref()).await.unwrap(),
        SessionState::Anonymous
    );
}
