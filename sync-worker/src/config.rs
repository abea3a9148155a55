//! Configuration loading for casesync-worker.
//!
//! Configuration is loaded from a TOML file (default: `casesync.toml`).
//! Every section and field is optional.

use casesync_client::{
    CleanerConfig, EngineConfig, HttpRemoteConfig, PullConfig, PushConfig, DEFAULT_BATCH_CEILING,
};
use casesync_core::Backoff;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration for casesync-worker.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Remote document store configuration.
    pub remote: RemoteConfig,
    /// Push pipeline configuration.
    pub push: PushSection,
    /// Pull pipeline configuration.
    pub pull: PullSection,
    /// Scheduler configuration.
    pub schedule: ScheduleConfig,
    /// Retention cleaner configuration.
    pub cleanup: CleanupConfig,
    /// Connectivity check configuration.
    pub network: NetworkConfig,
    /// HTTP endpoints configuration.
    pub http: HttpConfig,
}

/// Storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database holding records and the task queue.
    #[serde(default = "default_database_path")]
    pub database: PathBuf,
}

/// Remote document store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
    /// Base URL of the document service.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Bearer token (optional).
    pub api_token: Option<String>,
    /// Request timeout in seconds (default: 30).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Maximum ops per atomic batch (default: 500).
    #[serde(default = "default_batch_ceiling")]
    pub batch_ceiling: usize,
}

/// Push pipeline configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PushSection {
    /// Records per batch (default: 450).
    #[serde(default = "default_push_batch_size")]
    pub batch_size: usize,
    /// Batches per run (default: 20).
    #[serde(default = "default_max_batches_per_run")]
    pub max_batches_per_run: u32,
    /// Rejected pushes before a record is quarantined (default: 5).
    #[serde(default = "default_max_push_failures")]
    pub max_push_failures: u32,
}

/// Pull pipeline configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PullSection {
    /// Records per page (default: 500).
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Pages per run (default: 50).
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
}

/// Scheduler configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    /// Interval of the periodic per-entity sync in seconds (default: 900).
    #[serde(default = "default_periodic_interval")]
    pub periodic_interval_secs: u64,
    /// Register periodic sync for every entity type on startup (default: true).
    #[serde(default = "default_true")]
    pub periodic_enabled: bool,
    /// Queue poll interval in milliseconds (default: 1000).
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// First retry delay in milliseconds (default: 2000).
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    /// Retry delay cap in milliseconds (default: 300000).
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
    /// Attempts before a retrying task counts as failed (default: 10).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

/// Retention cleaner configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CleanupConfig {
    /// Enable the periodic cleanup task (default: true).
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Tombstone retention in days (default: 30).
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    /// Cleanup interval in seconds (default: 86400 = 1 day).
    #[serde(default = "default_cleanup_interval")]
    pub interval_secs: u64,
}

/// Connectivity check configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    /// Seconds between remote health checks (default: 30).
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,
    /// Assume connectivity before the first check (default: false).
    #[serde(default)]
    pub assume_online: bool,
}

/// HTTP endpoints configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Enable the HTTP control surface (default: true).
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Bind address for HTTP server (default: 127.0.0.1:8686).
    #[serde(default = "default_http_bind")]
    pub bind_address: String,
}

// Default value functions
fn default_database_path() -> PathBuf {
    PathBuf::from("casesync.db")
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_batch_ceiling() -> usize {
    DEFAULT_BATCH_CEILING
}

fn default_push_batch_size() -> usize {
    450
}

fn default_max_batches_per_run() -> u32 {
    20
}

fn default_max_push_failures() -> u32 {
    5
}

fn default_page_size() -> usize {
    500
}

fn default_max_pages() -> u32 {
    50
}

fn default_periodic_interval() -> u64 {
    15 * 60
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_backoff_base_ms() -> u64 {
    2_000
}

fn default_backoff_max_ms() -> u64 {
    5 * 60 * 1000
}

fn default_max_attempts() -> u32 {
    10
}

fn default_retention_days() -> u32 {
    30
}

fn default_cleanup_interval() -> u64 {
    24 * 60 * 60
}

fn default_check_interval() -> u64 {
    30
}

fn default_http_bind() -> String {
    "127.0.0.1:8686".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: default_database_path(),
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_token: None,
            timeout_secs: default_timeout_secs(),
            batch_ceiling: default_batch_ceiling(),
        }
    }
}

impl Default for PushSection {
    fn default() -> Self {
        Self {
            batch_size: default_push_batch_size(),
            max_batches_per_run: default_max_batches_per_run(),
            max_push_failures: default_max_push_failures(),
        }
    }
}

impl Default for PullSection {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            max_pages: default_max_pages(),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            periodic_interval_secs: default_periodic_interval(),
            periodic_enabled: true,
            poll_interval_ms: default_poll_interval_ms(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            retention_days: default_retention_days(),
            interval_secs: default_cleanup_interval(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: default_check_interval(),
            assume_online: false,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: default_http_bind(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file and validate it.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or holds
    /// inconsistent values.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that would make the pipelines misbehave.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.push.batch_size == 0 {
            return Err(ConfigError::invalid("push.batch_size", "must be greater than 0"));
        }
        if self.push.batch_size > self.remote.batch_ceiling {
            return Err(ConfigError::invalid(
                "push.batch_size",
                format!(
                    "{} exceeds remote.batch_ceiling {}",
                    self.push.batch_size, self.remote.batch_ceiling
                ),
            ));
        }
        if self.push.max_push_failures == 0 {
            return Err(ConfigError::invalid("push.max_push_failures", "must be greater than 0"));
        }
        if self.pull.page_size == 0 {
            return Err(ConfigError::invalid("pull.page_size", "must be greater than 0"));
        }
        if self.pull.max_pages == 0 {
            return Err(ConfigError::invalid("pull.max_pages", "must be greater than 0"));
        }
        if self.cleanup.retention_days == 0 {
            return Err(ConfigError::invalid("cleanup.retention_days", "must be greater than 0"));
        }
        if self.schedule.periodic_interval_secs == 0 {
            return Err(ConfigError::invalid(
                "schedule.periodic_interval_secs",
                "must be greater than 0",
            ));
        }
        if self.schedule.max_attempts == 0 {
            return Err(ConfigError::invalid("schedule.max_attempts", "must be greater than 0"));
        }
        Ok(())
    }

    /// Pipeline settings.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            push: PushConfig {
                batch_size: self.push.batch_size,
                max_batches_per_run: self.push.max_batches_per_run,
                max_push_failures: self.push.max_push_failures,
            },
            pull: PullConfig {
                page_size: self.pull.page_size,
                max_pages: self.pull.max_pages,
                retention_days: self.cleanup.retention_days,
            },
            cleaner: CleanerConfig {
                retention_days: self.cleanup.retention_days,
            },
        }
    }

    /// Remote client settings.
    pub fn remote_config(&self) -> HttpRemoteConfig {
        HttpRemoteConfig {
            base_url: self.remote.base_url.clone(),
            api_token: self.remote.api_token.clone(),
            timeout: Duration::from_secs(self.remote.timeout_secs),
            batch_ceiling: self.remote.batch_ceiling,
        }
    }

    /// Retry policy.
    pub fn backoff(&self) -> Backoff {
        Backoff::new(
            Duration::from_millis(self.schedule.backoff_base_ms),
            Duration::from_millis(self.schedule.backoff_max_ms),
        )
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
    /// A value is out of range.
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Dotted field name.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}
