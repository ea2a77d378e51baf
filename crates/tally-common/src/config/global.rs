//! Process-wide configuration shared by every profile.

use serde::{Deserialize, Serialize};

/// Options that apply to every component running in the same process.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct GlobalConfig {
    /// Maximum random jitter, in seconds, applied to component start times
    /// and to periodic wait intervals.
    ///
    /// Staggers many profiles that would otherwise hit the same endpoint
    /// at the same instant after a restart.
    #[serde(default)]
    pub poll_jitter_secs: u64,
}

impl GlobalConfig {
    /// Merge values from another GlobalConfig (last non-default wins).
    pub fn merge_from(&mut self, other: Self) {
        if other.poll_jitter_secs != 0 {
            self.poll_jitter_secs = other.poll_jitter_secs;
        }
    }
}
