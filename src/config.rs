//! Configuration types for lendfetch

use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

use crate::error::{Error, Result};

/// Lending service endpoint configuration
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Base URL of the lending service (default: "https://archive.org")
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Timeout applied to every service request (default: 30 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout: default_request_timeout(),
        }
    }
}

/// Page-fetch behavior configuration (concurrency, quality, timeouts)
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Number of concurrent page-fetch workers (default: 16)
    ///
    /// Workers pull pages from a shared queue, so a slow page never stalls
    /// the rest of the pool. Must be between 1 and 200.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Image quality selector, 0 = best quality, 10 = smallest (default: 3)
    #[serde(default = "default_quality")]
    pub quality: u8,

    /// Timeout applied to each individual page-fetch attempt (default: 60 seconds)
    ///
    /// An attempt that times out counts as a transient failure and is retried
    /// under the retry policy.
    #[serde(default = "default_page_timeout", with = "duration_serde")]
    pub page_timeout: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            quality: default_quality(),
            page_timeout: default_page_timeout(),
        }
    }
}

/// Output artifact configuration
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory artifacts are written to (default: "./downloads")
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Artifact shape: one composite document or a directory of page files
    #[serde(default)]
    pub mode: OutputMode,

    /// Whether assembly requires every page or accepts gaps
    #[serde(default)]
    pub assembly: AssemblyMode,

    /// Write the title's service metadata as a JSON sidecar (default: false)
    #[serde(default)]
    pub save_metadata: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            mode: OutputMode::default(),
            assembly: AssemblyMode::default(),
            save_metadata: false,
        }
    }
}

/// Artifact shape produced by the assembler
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    /// Single composite document embedding all pages in index order (default)
    #[default]
    Document,
    /// Directory of page files named by zero-padded index
    Pages,
}

/// Completeness requirement for assembly
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssemblyMode {
    /// Require every page; fail with the missing indices otherwise (default)
    #[default]
    Strict,
    /// Assemble the pages that succeeded and report the gaps
    Partial,
}

/// Retry configuration for transient page-fetch failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the first try (default: 2)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 30 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Main configuration for the downloader
///
/// Fields are organized into logical sub-configs:
/// - [`service`](ServiceConfig) — lending service endpoint
/// - [`fetch`](FetchConfig) — worker count, quality, per-page timeout
/// - [`output`](OutputConfig) — artifact shape and destination
/// - [`retry`](RetryConfig) — backoff policy for transient page failures
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Lending service endpoint settings
    #[serde(default)]
    pub service: ServiceConfig,

    /// Page-fetch behavior settings
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Output artifact settings
    #[serde(default)]
    pub output: OutputConfig,

    /// Retry policy for transient page failures
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Config {
    /// Validate the configuration, returning the first offending setting.
    pub fn validate(&self) -> Result<()> {
        if self.fetch.workers == 0 {
            return Err(Error::Config {
                message: "worker count must be at least 1".to_string(),
                key: Some("fetch.workers".to_string()),
            });
        }
        if self.fetch.workers > MAX_WORKERS {
            return Err(Error::Config {
                message: format!(
                    "worker count must be at most {}, got {}",
                    MAX_WORKERS, self.fetch.workers
                ),
                key: Some("fetch.workers".to_string()),
            });
        }
        if self.fetch.quality > MAX_QUALITY {
            return Err(Error::Config {
                message: format!(
                    "quality must be between 0 and {}, got {}",
                    MAX_QUALITY, self.fetch.quality
                ),
                key: Some("fetch.quality".to_string()),
            });
        }
        if self.service.base_url.is_empty() {
            return Err(Error::Config {
                message: "service base URL must not be empty".to_string(),
                key: Some("service.base_url".to_string()),
            });
        }
        Ok(())
    }
}

/// Upper bound on the fetch worker pool
pub const MAX_WORKERS: usize = 200;

/// Lowest-quality (smallest) image selector accepted by the service
pub const MAX_QUALITY: u8 = 10;

fn default_base_url() -> String {
    "https://archive.org".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_workers() -> usize {
    16
}

fn default_quality() -> u8 {
    3
}

fn default_page_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./downloads")
}

fn default_max_attempts() -> u32 {
    2
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.fetch.workers, 16);
        assert_eq!(config.fetch.quality, 3);
        assert_eq!(config.output.mode, OutputMode::Document);
        assert_eq!(config.output.assembly, AssemblyMode::Strict);
    }

    #[test]
    fn zero_workers_is_rejected() {
        let mut config = Config::default();
        config.fetch.workers = 0;
        let err = config.validate().unwrap_err();
        match err {
            Error::Config { key, .. } => assert_eq!(key.as_deref(), Some("fetch.workers")),
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn excessive_workers_are_rejected() {
        let mut config = Config::default();
        config.fetch.workers = MAX_WORKERS + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn out_of_range_quality_is_rejected() {
        let mut config = Config::default();
        config.fetch.quality = 11;
        let err = config.validate().unwrap_err();
        match err {
            Error::Config { key, .. } => assert_eq!(key.as_deref(), Some("fetch.quality")),
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn config_roundtrips_through_json() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(back.fetch.workers, config.fetch.workers);
        assert_eq!(back.retry.max_attempts, config.retry.max_attempts);
        assert_eq!(back.retry.initial_delay, config.retry.initial_delay);
    }

    #[test]
    fn empty_json_yields_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.fetch.workers, 16);
        assert_eq!(config.service.base_url, "https://archive.org");
        assert_eq!(config.retry.max_attempts, 2);
    }
}
