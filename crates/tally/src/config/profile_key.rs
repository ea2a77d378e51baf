//! Profile identifier.

use serde::{Deserialize, Serialize};
use std::fmt;
use tally_common::ComponentKey;

/// Identifier for a delivery profile.
///
/// A profile is one isolated store namespace plus its endpoint, the way a
/// browser profile isolates a web client's local storage.
///
/// ```
/// use tally::config::ProfileKey;
///
/// let key = ProfileKey::new("year 4");
/// assert_eq!(key.id(), "year 4");
/// assert_eq!(key.path_segment(), "year_4");
/// ```
#[derive(Debug, Clone, Eq, Hash, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProfileKey(ComponentKey);

impl ProfileKey {
    pub fn new(id: impl Into<String>) -> Self {
        Self(ComponentKey::new(id))
    }

    pub fn id(&self) -> &str {
        self.0.id()
    }

    /// Directory name of this profile's entries inside the store root.
    pub fn path_segment(&self) -> String {
        self.0.path_segment()
    }
}

impl fmt::Display for ProfileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ProfileKey {
    fn as_ref(&self) -> &str {
        self.0.as_ref()
    }
}

impl From<&str> for ProfileKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserializes_from_plain_string() {
        let key: ProfileKey = serde_yaml::from_str("classroom").unwrap();
        assert_eq!(key, ProfileKey::new("classroom"));
    }

    #[test]
    fn test_path_segment_is_sanitized() {
        assert_eq!(ProfileKey::new("a/b").path_segment(), "a_b");
    }
}
