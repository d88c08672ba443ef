//! Configuration module for MirrorSync.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::limits::{BUFFER_THRESHOLD, LARGE_FILE_THRESHOLD, PART_SIZE};
use crate::domain::{Provider, SyncLimits};

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for MirrorSync.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub database: DatabaseConfig,
    pub sync: SyncConfig,
    pub providers: ProvidersConfig,
    pub replication: ReplicationConfig,
    pub logging: LoggingConfig,
}

/// Which manifest store implementation to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Blobs under `store.root` on the local filesystem.
    #[default]
    Filesystem,
    /// Process-local memory; lost on exit.
    Memory,
}

/// Blob cache settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Root directory for the filesystem backend.
    pub root: PathBuf,
    /// Store backend.
    pub backend: StoreBackend,
}

/// Mirror record database settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    pub path: PathBuf,
}

/// Sync pass settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Files at or above this size are skipped as large.
    pub large_file_threshold_bytes: u64,
    /// Content up to this size is written with a single put.
    pub buffer_threshold_bytes: u64,
    /// Multipart part size.
    pub part_size_bytes: u64,
    /// Check that reused blobs still exist before trusting the manifest.
    pub verify_cached_blobs: bool,
    /// Seconds before an abandoned pass lease may be taken over.
    pub lease_ttl_secs: u64,
}

impl SyncConfig {
    /// Effective thresholds.
    pub fn limits(&self) -> SyncLimits {
        SyncLimits {
            large_file_threshold: self.large_file_threshold_bytes,
            buffer_threshold: self.buffer_threshold_bytes,
            part_size: self.part_size_bytes,
        }
    }
}

/// Endpoint and credential source for one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderEndpointConfig {
    /// API base URL.
    pub base_url: String,
    /// Separate content host, for providers that have one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_base_url: Option<String>,
    /// Environment variable holding the bearer token.
    pub token_env: String,
}

/// Per-provider endpoint settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub google_drive: ProviderEndpointConfig,
    pub onedrive: ProviderEndpointConfig,
    pub dropbox: ProviderEndpointConfig,
    pub github: ProviderEndpointConfig,
}

impl ProvidersConfig {
    /// Settings for `provider`.
    pub fn get(&self, provider: Provider) -> &ProviderEndpointConfig {
        match provider {
            Provider::GoogleDrive => &self.google_drive,
            Provider::OneDrive => &self.onedrive,
            Provider::Dropbox => &self.dropbox,
            Provider::GitHub => &self.github,
        }
    }
}

/// Downstream workspace service settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicationConfig {
    /// Base URL of the workspace service. `None` disables the pull signal.
    pub endpoint: Option<String>,
    /// Environment variable holding the service token.
    pub token_env: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/mirrorsync/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("mirrorsync")
            .join("config.yaml")
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("~/.local/share"))
        .join("mirrorsync")
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: data_dir().join("store"),
            backend: StoreBackend::Filesystem,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: data_dir().join("mirrorsync.db"),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            large_file_threshold_bytes: LARGE_FILE_THRESHOLD,
            buffer_threshold_bytes: BUFFER_THRESHOLD,
            part_size_bytes: PART_SIZE,
            verify_cached_blobs: true,
            lease_ttl_secs: 3600,
        }
    }
}

impl ProviderEndpointConfig {
    fn new(base_url: &str, content_base_url: Option<&str>, token_env: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            content_base_url: content_base_url.map(str::to_string),
            token_env: token_env.to_string(),
        }
    }
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            google_drive: ProviderEndpointConfig::new(
                "https://www.googleapis.com",
                None,
                "MIRRORSYNC_GOOGLE_DRIVE_TOKEN",
            ),
            onedrive: ProviderEndpointConfig::new(
                "https://graph.microsoft.com/v1.0",
                None,
                "MIRRORSYNC_ONEDRIVE_TOKEN",
            ),
            dropbox: ProviderEndpointConfig::new(
                "https://api.dropboxapi.com",
                Some("https://content.dropboxapi.com"),
                "MIRRORSYNC_DROPBOX_TOKEN",
            ),
            github: ProviderEndpointConfig::new(
                "https://api.github.com",
                None,
                "MIRRORSYNC_GITHUB_TOKEN",
            ),
        }
    }
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            token_env: "MIRRORSYNC_WORKSPACE_TOKEN".to_string(),
            timeout_secs: 30,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"sync.part_size_bytes"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

fn check_url(errors: &mut Vec<ValidationError>, field: String, value: &str) {
    match url::Url::parse(value) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
        Ok(parsed) => errors.push(ValidationError {
            field,
            message: format!("unsupported URL scheme '{}'", parsed.scheme()),
        }),
        Err(e) => errors.push(ValidationError {
            field,
            message: format!("invalid URL '{value}': {e}"),
        }),
    }
}

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- sync ---
        for (field, value) in [
            ("sync.large_file_threshold_bytes", self.sync.large_file_threshold_bytes),
            ("sync.buffer_threshold_bytes", self.sync.buffer_threshold_bytes),
            ("sync.part_size_bytes", self.sync.part_size_bytes),
            ("sync.lease_ttl_secs", self.sync.lease_ttl_secs),
        ] {
            if value == 0 {
                errors.push(ValidationError {
                    field: field.into(),
                    message: "must be greater than 0".into(),
                });
            }
        }
        if self.sync.part_size_bytes > self.sync.buffer_threshold_bytes {
            errors.push(ValidationError {
                field: "sync.part_size_bytes".into(),
                message: format!(
                    "part_size_bytes ({}) must not exceed buffer_threshold_bytes ({})",
                    self.sync.part_size_bytes, self.sync.buffer_threshold_bytes
                ),
            });
        }
        if self.sync.buffer_threshold_bytes >= self.sync.large_file_threshold_bytes {
            errors.push(ValidationError {
                field: "sync.buffer_threshold_bytes".into(),
                message: format!(
                    "buffer_threshold_bytes ({}) must be below large_file_threshold_bytes ({})",
                    self.sync.buffer_threshold_bytes, self.sync.large_file_threshold_bytes
                ),
            });
        }

        // --- providers ---
        for provider in Provider::ALL {
            let endpoint = self.providers.get(provider);
            let name = provider.as_str();
            check_url(
                &mut errors,
                format!("providers.{name}.base_url"),
                &endpoint.base_url,
            );
            if let Some(content) = &endpoint.content_base_url {
                check_url(
                    &mut errors,
                    format!("providers.{name}.content_base_url"),
                    content,
                );
            }
            if endpoint.token_env.trim().is_empty() {
                errors.push(ValidationError {
                    field: format!("providers.{name}.token_env"),
                    message: "must not be empty".into(),
                });
            }
        }

        // --- replication ---
        if let Some(endpoint) = &self.replication.endpoint {
            check_url(&mut errors, "replication.endpoint".into(), endpoint);
        }
        if self.replication.timeout_secs == 0 {
            errors.push(ValidationError {
                field: "replication.timeout_secs".into(),
                message: "must be greater than 0".into(),
            });
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use mirrorsync_core::config::ConfigBuilder;
/// use std::path::PathBuf;
///
/// let config = ConfigBuilder::new()
///     .store_root(PathBuf::from("/var/lib/mirrorsync/store"))
///     .sync_part_size_bytes(16 * 1024 * 1024)
///     .logging_level("debug")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- store / database ---

    pub fn store_root(mut self, root: PathBuf) -> Self {
        self.config.store.root = root;
        self
    }

    pub fn store_backend(mut self, backend: StoreBackend) -> Self {
        self.config.store.backend = backend;
        self
    }

    pub fn database_path(mut self, path: PathBuf) -> Self {
        self.config.database.path = path;
        self
    }

    // --- sync ---

    pub fn sync_large_file_threshold_bytes(mut self, bytes: u64) -> Self {
        self.config.sync.large_file_threshold_bytes = bytes;
        self
    }

    pub fn sync_buffer_threshold_bytes(mut self, bytes: u64) -> Self {
        self.config.sync.buffer_threshold_bytes = bytes;
        self
    }

    pub fn sync_part_size_bytes(mut self, bytes: u64) -> Self {
        self.config.sync.part_size_bytes = bytes;
        self
    }

    pub fn sync_verify_cached_blobs(mut self, verify: bool) -> Self {
        self.config.sync.verify_cached_blobs = verify;
        self
    }

    pub fn sync_lease_ttl_secs(mut self, secs: u64) -> Self {
        self.config.sync.lease_ttl_secs = secs;
        self
    }

    // --- providers ---

    pub fn provider_base_url(mut self, provider: Provider, url: impl Into<String>) -> Self {
        self.endpoint_mut(provider).base_url = url.into();
        self
    }

    pub fn provider_content_base_url(mut self, provider: Provider, url: impl Into<String>) -> Self {
        self.endpoint_mut(provider).content_base_url = Some(url.into());
        self
    }

    pub fn provider_token_env(mut self, provider: Provider, var: impl Into<String>) -> Self {
        self.endpoint_mut(provider).token_env = var.into();
        self
    }

    fn endpoint_mut(&mut self, provider: Provider) -> &mut ProviderEndpointConfig {
        let providers = &mut self.config.providers;
        match provider {
            Provider::GoogleDrive => &mut providers.google_drive,
            Provider::OneDrive => &mut providers.onedrive,
            Provider::Dropbox => &mut providers.dropbox,
            Provider::GitHub => &mut providers.github,
        }
    }

    // --- replication ---

    pub fn replication_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.replication.endpoint = Some(endpoint.into());
        self
    }

    pub fn replication_timeout_secs(mut self, secs: u64) -> Self {
        self.config.replication.timeout_secs = secs;
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn logging_json(mut self, json: bool) -> Self {
        self.config.logging.json = json;
        self
    }

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
