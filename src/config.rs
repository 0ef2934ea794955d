//! Configuration types for docset-dl

use crate::error::{Error, Result};
use crate::types::DatasetBoundary;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Fetch engine configuration (remote store, storage, concurrency)
///
/// Used as a flattened sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Remote store root; datasets live under `{base_url}/DataSet {N}/`
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Directory artifacts are written to (default: "./downloads")
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Number of parallel fetch workers (default: 8)
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Extension used for identifiers listed without one (default: "pdf")
    ///
    /// Only artifacts with this extension are inspected for composite ranges.
    #[serde(default = "default_extension")]
    pub default_extension: String,

    /// Per-request timeout (default: 60 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// Seed the completed set from artifacts already in `output_dir` (default: true)
    #[serde(default = "default_true")]
    pub seed_from_output: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            output_dir: default_output_dir(),
            concurrency: default_concurrency(),
            default_extension: default_extension(),
            request_timeout: default_request_timeout(),
            seed_from_output: true,
        }
    }
}

/// Retry configuration for transient fetch failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the first request (default: 2)
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
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// How the expected identifier universe is built during reconciliation
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UniverseMode {
    /// Union of the closed intervals defined by the dataset boundaries
    #[default]
    IntervalsOnly,
    /// Every identifier from 1 to the largest configured or observed identifier
    Exhaustive,
}

/// Reconciliation configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Expected-universe construction mode
    #[serde(default)]
    pub universe: UniverseMode,
}

/// Main configuration
///
/// Fetch settings are flattened for a compact JSON form; retry and
/// reconciliation settings are nested objects.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Fetch behavior settings
    #[serde(flatten)]
    pub fetch: FetchConfig,

    /// Retry policy for transient network failures
    #[serde(default)]
    pub retry: RetryConfig,

    /// Reconciliation settings
    #[serde(default)]
    pub reconcile: ReconcileConfig,

    /// Dataset partition table, ascending by first identifier
    #[serde(default = "crate::dataset::default_boundaries")]
    pub datasets: Vec<DatasetBoundary>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fetch: FetchConfig::default(),
            retry: RetryConfig::default(),
            reconcile: ReconcileConfig::default(),
            datasets: crate::dataset::default_boundaries(),
        }
    }
}

impl Config {
    /// Load a configuration from a JSON file; missing fields take defaults
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check settings that cannot be expressed in the type system
    ///
    /// The dataset table is validated separately when the
    /// [`DatasetIndex`](crate::dataset::DatasetIndex) is built from it.
    pub fn validate(&self) -> Result<()> {
        if self.fetch.concurrency == 0 {
            return Err(Error::config(
                "concurrency",
                "number of fetch workers must be positive",
            ));
        }
        if !crate::types::is_valid_extension(&self.fetch.default_extension) {
            return Err(Error::config(
                "default_extension",
                format!(
                    "extension must be non-empty ASCII alphanumerics without a dot: '{}'",
                    self.fetch.default_extension
                ),
            ));
        }
        if url::Url::parse(&self.fetch.base_url).is_err() {
            return Err(Error::config(
                "base_url",
                format!("not a valid URL: '{}'", self.fetch.base_url),
            ));
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(Error::config(
                "backoff_multiplier",
                "backoff multiplier must be at least 1.0",
            ));
        }
        Ok(())
    }
}

fn default_base_url() -> String {
    "https://www.justice.gov/epstein/files".to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./downloads")
}

fn default_concurrency() -> usize {
    8
}

fn default_extension() -> String {
    "pdf".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_true() -> bool {
    true
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

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.fetch.concurrency, 8);
        assert_eq!(config.fetch.default_extension, "pdf");
        assert_eq!(config.reconcile.universe, UniverseMode::IntervalsOnly);
        assert_eq!(config.datasets.len(), 12);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_takes_defaults() {
        let json = r#"{
            "output_dir": "/data/efta",
            "concurrency": 4,
            "request_timeout": 15,
            "reconcile": { "universe": "exhaustive" }
        }"#;
        let config: Config = serde_json::from_str(json).expect("deserialize failed");

        assert_eq!(config.fetch.output_dir, PathBuf::from("/data/efta"));
        assert_eq!(config.fetch.concurrency, 4);
        assert_eq!(config.fetch.request_timeout, Duration::from_secs(15));
        assert_eq!(config.reconcile.universe, UniverseMode::Exhaustive);
        assert_eq!(config.retry.max_attempts, 2);
        assert_eq!(config.datasets.len(), 12);
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let mut config = Config::default();
        config.fetch.concurrency = 0;
        match config.validate() {
            Err(Error::Config { key, .. }) => assert_eq!(key.as_deref(), Some("concurrency")),
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_rejects_dotted_extension_and_bad_url() {
        let mut config = Config::default();
        config.fetch.default_extension = ".pdf".to_string();
        assert!(config.validate().is_err());
        config.fetch.default_extension = "pdf/../x".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.fetch.base_url = "not a url".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "concurrency": 2, "retry": { "max_attempts": 0 } }"#)
            .unwrap();

        let config = Config::from_json_file(&path).unwrap();
        assert_eq!(config.fetch.concurrency, 2);
        assert_eq!(config.retry.max_attempts, 0);
    }
}
