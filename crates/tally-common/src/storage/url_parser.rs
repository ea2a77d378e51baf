//! URL parsing for storage backends.
//!
//! Maps a configured store location to a backend:
//! - `memory://` (optionally followed by a label) - process-local, lost on exit
//! - `file:///abs/path`, `file:rel/path` - local filesystem
//! - any other string - treated as a local filesystem path

use regex::Regex;
use std::sync::LazyLock;

use crate::error::{InvalidUrlSnafu, StorageError};

use super::LocalConfig;

const MEMORY_URL: &str = r"^memory://(?P<label>[\w\-\.]*)$";
const FILE_URI: &str = r"^file://(?P<path>/.*)$";
const FILE_URL: &str = r"^file:(?P<path>[^/].*)$";

static MEMORY: LazyLock<Regex> = LazyLock::new(|| Regex::new(MEMORY_URL).expect("valid regex"));
static FILE: LazyLock<[Regex; 2]> = LazyLock::new(|| {
    [
        Regex::new(FILE_URI).expect("valid regex"),
        Regex::new(FILE_URL).expect("valid regex"),
    ]
});

/// Backend selected for a storage URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendConfig {
    Local(LocalConfig),
    Memory { label: String },
}

impl BackendConfig {
    /// Parse a storage URL into a backend configuration.
    pub fn parse_url(url: &str) -> Result<Self, StorageError> {
        let url = url.trim();
        if url.is_empty() {
            return InvalidUrlSnafu { url }.fail();
        }

        if let Some(caps) = MEMORY.captures(url) {
            return Ok(BackendConfig::Memory {
                label: caps["label"].to_string(),
            });
        }
        if url.starts_with("memory:") {
            return InvalidUrlSnafu { url }.fail();
        }

        let path = FILE
            .iter()
            .find_map(|re| re.captures(url).map(|caps| caps["path"].to_string()));

        match path {
            Some(path) if !path.is_empty() => Ok(BackendConfig::Local(LocalConfig { path })),
            Some(_) => InvalidUrlSnafu { url }.fail(),
            None if url.starts_with("file:") => InvalidUrlSnafu { url }.fail(),
            None => Ok(BackendConfig::Local(LocalConfig {
                path: url.to_string(),
            })),
        }
    }
}
