//! Browse the live story list, logging in if credentials are configured.
//!
//! Run with: `RUST_LOG=snooze_core=debug cargo run -p snooze-core --example browse`

use snooze_core::{SavedCredential, SessionConfig, SessionState, StoryClient};
use tracing_subscriber::EnvFilter;

const LOGIN_FILE: &str = "snooze-login.json";

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let client = StoryClient::from_env(SessionConfig::default())?;
    let saved = SavedCredential::load_if_present(LOGIN_FILE).await?;
    let mut state = client.start(saved.as_ref()).await?;

    if state == SessionState::Anonymous {
        if let (Ok(username), Ok(password)) = (
            std::env::var("SNOOZE_USERNAME"),
            std::env::var("SNOOZE_PASSWORD"),
        ) {
            client.session().login(&username, &password).await?;
            if let Some(saved) = client.saved_credential() {
                saved.save_json(LOGIN_FILE).await?;
            }
            state = client.session().state();
        }
    }

    match client.session().display_name() {
        Some(name) => println!("=== Logged in as {name} ===\n"),
        None => println!("=== Browsing anonymously ({state:?}) ===\n"),
    }

    for listing in client.listings().iter().take(20) {
        let marker = match listing.favorite {
            Some(true) => "★",
            Some(false) => "☆",
            None => " ",
        };
        let host = listing.hostname.as_deref().unwrap_or("?");
        let own = if listing.own { " [yours]" } else { "" };
        println!(
            "{marker} {} ({host}) by {}, posted by {}{own}",
            listing.story.title(),
            listing.story.author(),
            listing.story.submitter(),
        );
    }

    let favorites = client.favorite_listings();
    if !favorites.is_empty() {
        println!("\n{} favorites", favorites.len());
    }
    Ok(())
}
