//! Configuration for the tally delivery host.

mod profile_key;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use profile_key::ProfileKey;
pub use tally_common::config::{
    ConfigPath, GlobalConfig, Mergeable, MetricsConfig, interpolate, load_from_paths,
};

use crate::store::DEFAULT_DEAD_LETTER_LIMIT;
use tally_common::error::ConfigError;

fn default_timeout_secs() -> u64 {
    30
}

fn default_idempotency_header() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    5
}

fn default_cooldown_secs() -> u64 {
    60
}

fn default_inter_record_delay_ms() -> u64 {
    500
}

fn default_dead_letter_limit() -> usize {
    DEFAULT_DEAD_LETTER_LIMIT
}

fn default_settle_delay_ms() -> u64 {
    2000
}

/// Submission endpoint for a profile.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct EndpointConfig {
    /// URL results are POSTed to.
    pub url: String,
    /// Bearer token. An empty string means no credential.
    #[serde(default)]
    pub auth_token: Option<String>,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Send `clientResultId` as an `Idempotency-Key` header as well as in the body.
    #[serde(default = "default_idempotency_header")]
    pub idempotency_header: bool,
}

impl EndpointConfig {
    /// The configured token, ignoring empty values from unset variables.
    pub fn bearer_token(&self) -> Option<&str> {
        self.auth_token.as_deref().filter(|token| !token.is_empty())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Where a profile's entries are persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Local path, `file://` URL or `memory://label`.
    pub path: String,
}

/// Retry policy for a profile.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct DeliveryConfig {
    /// Attempts after which a failing record is evicted.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Minimum seconds between attempts at the same record.
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
    /// Pause between submissions within one drain.
    #[serde(default = "default_inter_record_delay_ms")]
    pub inter_record_delay_ms: u64,
    /// Evicted records retained for inspection.
    #[serde(default = "default_dead_letter_limit")]
    pub dead_letter_limit: usize,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            cooldown_secs: default_cooldown_secs(),
            inter_record_delay_ms: default_inter_record_delay_ms(),
            dead_letter_limit: default_dead_letter_limit(),
        }
    }
}

/// When the host drains a profile.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TriggerConfig {
    /// Wait after startup before the initial drain.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    /// Periodic drain interval. No periodic drain when unset.
    #[serde(default)]
    pub poll_interval_secs: Option<u64>,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: default_settle_delay_ms(),
            poll_interval_secs: None,
        }
    }
}

impl TriggerConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn poll_interval(&self) -> Option<Duration> {
        self.poll_interval_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

/// One isolated store namespace plus its endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ProfileConfig {
    pub endpoint: EndpointConfig,
    pub store: StoreConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub trigger: TriggerConfig,
}

/// Main configuration for tally.
///
/// # Example
///
/// ```yaml
/// profiles:
///   classroom:
///     endpoint:
///       url: https://api.example.com/results
///       auth_token: ${TALLY_TOKEN:-}
///     store:
///       path: /var/lib/tally
///     trigger:
///       poll_interval_secs: 300
///
/// metrics:
///   address: 0.0.0.0:9090
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Named delivery profiles.
    #[serde(default)]
    pub profiles: IndexMap<ProfileKey, ProfileConfig>,
    /// Global configuration options.
    #[serde(default)]
    pub global: GlobalConfig,
    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Mergeable for Config {
    type Key = ProfileKey;
    type Component = ProfileConfig;

    fn components_mut(&mut self) -> &mut IndexMap<Self::Key, Self::Component> {
        &mut self.profiles
    }

    fn global_mut(&mut self) -> &mut GlobalConfig {
        &mut self.global
    }

    fn metrics_mut(&mut self) -> &mut MetricsConfig {
        &mut self.metrics
    }

    fn parse_yaml(contents: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(contents).map_err(|source| ConfigError::YamlParse { source })
    }
}

impl Config {
    /// Load configuration from multiple paths (files or directories).
    pub fn from_paths(paths: &[ConfigPath]) -> Result<Self, ConfigError> {
        let config: Self = load_from_paths(paths)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string.
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let result = interpolate(contents);
        if !result.is_ok() {
            return Err(ConfigError::EnvInterpolation {
                message: result.errors.join("\n"),
            });
        }

        let config = Self::parse_yaml(&result.text)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration, reporting every broken profile at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.profiles.is_empty() {
            return Err(ConfigError::NoProfiles);
        }

        let mut errors = Vec::new();
        for (key, profile) in &self.profiles {
            let name = key.id().to_string();
            if profile.endpoint.url.trim().is_empty() {
                errors.push(ConfigError::EmptyEndpoint {
                    profile: name.clone(),
                });
            }
            if profile.store.path.trim().is_empty() {
                errors.push(ConfigError::EmptyStorePath {
                    profile: name.clone(),
                });
            }
            if profile.delivery.max_attempts == 0 {
                errors.push(ConfigError::ZeroMaxAttempts { profile: name });
            }
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ConfigError::MultipleErrors {
                errors: errors.iter().map(ToString::to_string).collect(),
            }),
        }
    }

    /// Look up one profile by name.
    pub fn profile(&self, name: &str) -> Result<(&ProfileKey, &ProfileConfig), ConfigError> {
        self.profiles
            .get_key_value(&ProfileKey::new(name))
            .ok_or_else(|| ConfigError::UnknownProfile {
                profile: name.to_string(),
            })
    }

    /// The named profile, or every profile when `name` is `None`.
    pub fn select(
        &self,
        name: Option<&str>,
    ) -> Result<Vec<(&ProfileKey, &ProfileConfig)>, ConfigError> {
        match name {
            Some(name) => Ok(vec![self.profile(name)?]),
            None => Ok(self.profiles.iter().collect()),
        }
    }

    pub fn profile_count(&self) -> usize {
        self.profiles.len()
    }
}
