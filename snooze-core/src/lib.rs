//! Client-side data layer for the Hack-or-Snooze story service.
//!
//! This crate provides:
//! - [`StoryCollection`], the shared newest-first list of every known story
//! - [`Session`], the current user with their favorites and own stories
//! - [`StoryService`] / [`UserService`], the remote seams, with HTTP
//!   implementations over the `snooze` client
//! - [`StoryClient`], an explicit context that wires the two together
//! - Remembered-login persistence and in-memory mocks for tests
//!
//! Both containers are mutated only through their operations and are
//! consistent with the remote store after every confirmed call. Everything
//! runs on a single cooperative thread: state lives in `RefCell`s and no
//! borrow is ever held across a network call.
//!
//! # Quick Start
//!
//! ```ignore
//! use snooze_core::{SessionConfig, StoryClient};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = StoryClient::from_env(SessionConfig::default())?;
//!     client.start(None).await?;
//!
//!     client.session().login("alice", "hunter2").await?;
//!     let story = client
//!         .submit_story("Rust 2024", "The Rust Team", "https://blog.rust-lang.org/")
//!         .await?;
//!     client.toggle_favorite(story.id()).await?;
//!
//!     for listing in client.listings() {
//!         println!("{} ({:?})", listing.story.title(), listing.hostname);
//!     }
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod collection;
pub mod credential;
pub mod error;
pub mod persist;
pub mod remote;
pub mod session;
pub mod story;
pub mod testing;

// Primary public API
pub use client::{StoryClient, StoryListing};
pub use collection::StoryCollection;
pub use credential::Credential;
pub use error::Error;
pub use persist::{PersistError, SavedCredential};
pub use remote::{
    AuthenticatedUser, HttpStoryService, HttpUserService, StoryService, UserProfile, UserService,
};
pub use session::{Session, SessionConfig, SessionState};
pub use story::{NewStory, Story, StoryId};
pub use testing::MockServer;
