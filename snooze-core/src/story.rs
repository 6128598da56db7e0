//! Story values and the boundary that builds them from transport records.

use crate::error::Error;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use snooze::{NewStoryRecord, StoryRecord, Url};
use std::fmt;
use thiserror::Error;

/// Server-assigned story identifier. Opaque; compared by value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoryId(String);

impl StoryId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StoryId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for StoryId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Why a transport record was rejected at the boundary.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("record has no story id")]
    MissingId,

    #[error("record {id} has an unreadable timestamp {value:?}")]
    BadTimestamp { id: String, value: String },
}

/// One shared bookmark. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Story {
    id: StoryId,
    title: String,
    author: String,
    url: String,
    submitter: String,
    created_at: DateTime<Utc>,
}

impl Story {
    /// Build a story from already-validated parts.
    pub fn new(
        id: impl Into<StoryId>,
        title: impl Into<String>,
        author: impl Into<String>,
        url: impl Into<String>,
        submitter: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            author: author.into(),
            url: url.into(),
            submitter: submitter.into(),
            created_at,
        }
    }

    /// Map a raw service record into a story.
    ///
    /// The id and timestamp must be present and readable. The URL is kept
    /// verbatim: a malformed one only shows up as a missing hostname.
    pub fn from_record(record: StoryRecord) -> Result<Self, RecordError> {
        if record.story_id.trim().is_empty() {
            return Err(RecordError::MissingId);
        }
        let created_at = DateTime::parse_from_rfc3339(&record.created_at)
            .map_err(|_| RecordError::BadTimestamp {
                id: record.story_id.clone(),
                value: record.created_at.clone(),
            })?
            .with_timezone(&Utc);

        Ok(Self {
            id: StoryId(record.story_id),
            title: record.title,
            author: record.author,
            url: record.url,
            submitter: record.username,
            created_at,
        })
    }

    pub fn id(&self) -> &StoryId {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Username of the account that submitted the story.
    pub fn submitter(&self) -> &str {
        &self.submitter
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Hostname of the story's URL, for display next to the title.
    ///
    /// `None` when the URL does not parse or has no host.
    pub fn hostname(&self) -> Option<String> {
        Url::parse(&self.url)
            .ok()
            .and_then(|url| url.host_str().map(str::to_owned))
    }
}

/// Map a batch of records, dropping (and logging) the ones that fail.
pub(crate) fn stories_from_records(records: Vec<StoryRecord>) -> Vec<Story> {
    records
        .into_iter()
        .filter_map(|record| match Story::from_record(record) {
            Ok(story) => Some(story),
            Err(e) => {
                tracing::warn!(error = %e, "skipping malformed story record");
                None
            }
        })
        .collect()
}

/// A story about to be submitted. Validated on construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewStory {
    title: String,
    author: String,
    url: String,
}

impl NewStory {
    /// Check the fields a user typed in.
    ///
    /// Title and author must be non-blank; the URL must be absolute http(s).
    pub fn new(
        title: impl Into<String>,
        author: impl Into<String>,
        url: impl Into<String>,
    ) -> Result<Self, Error> {
        let title = title.into().trim().to_string();
        let author = author.into().trim().to_string();
        let url = url.into().trim().to_string();

        if title.is_empty() {
            return Err(Error::Validation("title is required".into()));
        }
        if author.is_empty() {
            return Err(Error::Validation("author is required".into()));
        }
        let parsed = Url::parse(&url)
            .map_err(|e| Error::Validation(format!("url {url:?} is not valid: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
            return Err(Error::Validation(format!(
                "url {url:?} must be an absolute http(s) address"
            )));
        }

        Ok(Self { title, author, url })
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub(crate) fn to_record(&self) -> NewStoryRecord {
        NewStoryRecord {
            title: self.title.clone(),
            author: self.author.clone(),
            url: self.url.clone(),
        }
    }
}

/// Insert `story` unless a story with the same id is already present.
///
/// Returns whether anything was inserted.
pub(crate) fn insert_unique(stories: &mut Vec<Story>, story: Story) -> bool {
    if stories.iter().any(|s| s.id == story.id) {
        return false;
    }
    stories.push(story);
    true
}

/// Remove the story with `id`, returning its position and value.
pub(crate) fn remove_by_id(stories: &mut Vec<Story>, id: &StoryId) -> Option<(usize, Story)> {
    let index = stories.iter().position(|s| &s.id == id)?;
    Some((index, stories.remove(index)))
}
