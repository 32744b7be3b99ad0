//! Configuration module for docupload.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for docupload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub upload: UploadConfig,
    pub logging: LoggingConfig,
}

/// Remote document store settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Base URL of the document store API, e.g. `https://docs.example.com/api`.
    pub base_url: String,
    /// Workspace that documents are uploaded into. `None` until configured.
    pub workspace_id: Option<String>,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

/// Upload engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Maximum number of items transferring at the same time.
    pub concurrency: usize,
    /// Files of at least this size (in MiB) use a resumable session.
    pub session_threshold_mb: u64,
    /// Minimum milliseconds between two progress publications per item.
    pub progress_interval_ms: u64,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::debug!(error = %e, "Using default configuration");
                Self::default()
            }
        }
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/docupload/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("docupload")
            .join("config.yaml")
    }

    /// Session threshold in bytes.
    pub fn session_threshold_bytes(&self) -> u64 {
        self.upload.session_threshold_mb.saturating_mul(1024 * 1024)
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            workspace_id: None,
            request_timeout_secs: 60,
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            concurrency: 3,
            session_threshold_mb: 10,
            progress_interval_ms: 100,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"upload.concurrency"`.
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

/// Upper bound for `upload.concurrency`.
const MAX_CONCURRENCY: usize = 32;

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid. A missing
    /// `store.workspace_id` is not an error here; commands that upload
    /// require it separately.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- store ---
        let base_url = self.store.base_url.trim();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            errors.push(ValidationError {
                field: "store.base_url".into(),
                message: format!("must be an http(s) URL, got '{}'", self.store.base_url),
            });
        }
        if let Some(ws) = &self.store.workspace_id {
            if ws.trim().is_empty() || ws.contains('/') {
                errors.push(ValidationError {
                    field: "store.workspace_id".into(),
                    message: format!("invalid workspace id '{ws}'"),
                });
            }
        }
        if self.store.request_timeout_secs == 0 {
            errors.push(ValidationError {
                field: "store.request_timeout_secs".into(),
                message: "must be greater than 0".into(),
            });
        }

        // --- upload ---
        if self.upload.concurrency == 0 || self.upload.concurrency > MAX_CONCURRENCY {
            errors.push(ValidationError {
                field: "upload.concurrency".into(),
                message: format!("must be in range 1..={MAX_CONCURRENCY}"),
            });
        }
        if self.upload.session_threshold_mb == 0 {
            errors.push(ValidationError {
                field: "upload.session_threshold_mb".into(),
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
/// use docupload_core::config::ConfigBuilder;
///
/// let config = ConfigBuilder::new()
///     .store_base_url("https://docs.example.com/api")
///     .store_workspace_id("ws-42")
///     .upload_concurrency(4)
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

    // --- store ---

    pub fn store_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.store.base_url = url.into();
        self
    }

    pub fn store_workspace_id(mut self, id: impl Into<String>) -> Self {
        self.config.store.workspace_id = Some(id.into());
        self
    }

    pub fn store_request_timeout_secs(mut self, seconds: u64) -> Self {
        self.config.store.request_timeout_secs = seconds;
        self
    }

    // --- upload ---

    pub fn upload_concurrency(mut self, n: usize) -> Self {
        self.config.upload.concurrency = n;
        self
    }

    pub fn upload_session_threshold_mb(mut self, mb: u64) -> Self {
        self.config.upload.session_threshold_mb = mb;
        self
    }

    pub fn upload_progress_interval_ms(mut self, ms: u64) -> Self {
        self.config.upload.progress_interval_ms = ms;
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
