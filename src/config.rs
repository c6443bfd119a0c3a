//! Runtime configuration.
//!
//! Settings are read from an optional YAML file. Every key has a default,
//! so an empty file (or no file) yields a working configuration:
//!
//! ```yaml
//! fetch:
//!   page_timeout_secs: 120
//!   connect_timeout_secs: 120
//!   user_agent: "Mozilla/5.0 (compatible; article_harvest)"
//!   search_endpoint: "https://news.google.com/rss/search"
//!   search_locale: "hl=en-CA&gl=CA&ceid=CA:en"
//! retry:
//!   max_passes: 3
//!   base_delay_ms: 1000
//!   max_delay_ms: 30000
//!   jitter_ms: 250
//! instructions_path: ./rules.yaml
//! sites:
//!   www.reuters.co.uk: Reuters
//! ```

use crate::error::ConfigError;
use crate::fetch::RetryPolicy;
use crate::models::Publisher;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, instrument};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    pub fetch: FetchConfig,
    pub retry: RetryConfig,
    /// Instruction table replacing the builtin one.
    pub instructions_path: Option<PathBuf>,
    /// Extra domain → publisher mappings.
    pub sites: BTreeMap<String, Publisher>,
}

/// Document source settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Upper bound for a page to finish loading.
    pub page_timeout_secs: u64,
    /// Upper bound for a connection to be established.
    pub connect_timeout_secs: u64,
    pub user_agent: String,
    pub search_endpoint: String,
    pub search_locale: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        FetchConfig {
            page_timeout_secs: 120,
            connect_timeout_secs: 120,
            user_agent: "Mozilla/5.0 (compatible; article_harvest)".to_string(),
            search_endpoint: "https://news.google.com/rss/search".to_string(),
            search_locale: "hl=en-CA&gl=CA&ceid=CA:en".to_string(),
        }
    }
}

impl FetchConfig {
    pub fn page_timeout(&self) -> Duration {
        Duration::from_secs(self.page_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Retry pass settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total passes over a batch, the initial walk included.
    pub max_passes: usize,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_passes: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            jitter_ms: 250,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_passes: self.max_passes,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            jitter: Duration::from_millis(self.jitter_ms),
        }
    }
}

impl HarvestConfig {
    /// Load from `path`, or return defaults when no path is given.
    #[instrument(level = "info", skip_all)]
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            info!("No config file given; using defaults");
            return Ok(Self::default());
        };
        let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_yaml_str(&yaml).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, serde_yaml::Error> {
        // an empty document deserializes as unit, not as an empty map
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.max_passes == 0 {
            return Err(ConfigError::NoPasses);
        }
        Ok(())
    }
}
