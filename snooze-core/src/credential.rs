//! The opaque bearer token that authorizes a session's calls.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque bearer token issued at signup or login.
///
/// `Debug` is redacted and there is no `Display`, so a credential cannot end
/// up in logs or rendered output by accident. Serialization exists only so a
/// remembered login can be written to disk.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token, for placing into a request body.
    pub(crate) fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}
