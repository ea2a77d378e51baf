//! Generic component identifier.
//!
//! The `tally` crate specializes this as `ProfileKey`: one key per
//! isolated store namespace and endpoint.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier for a configured component.
///
/// Keys double as directory names inside the store root, so anything
/// that is not alphanumeric, `-` or `_` is replaced when building paths.
#[derive(Debug, Clone, Eq, Hash, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentKey(String);

impl ComponentKey {
    /// Create a new component key from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the underlying identifier string.
    pub fn id(&self) -> &str {
        &self.0
    }

    /// A filesystem- and object-key-safe rendering of the identifier.
    ///
    /// ```
    /// use tally_common::config::ComponentKey;
    ///
    /// assert_eq!(ComponentKey::new("class 4b/quiz").path_segment(), "class_4b_quiz");
    /// assert_eq!(ComponentKey::new("").path_segment(), "default");
    /// ```
    pub fn path_segment(&self) -> String {
        if self.0.is_empty() {
            return "default".to_string();
        }
        self.0
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }
}

impl fmt::Display for ComponentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ComponentKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ComponentKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}
