//! Shared configuration for the xray supervisor daemon.
//!
//! [`Config`] is assembled by `ortho_config` from, in increasing order of
//! precedence, built-in defaults, an optional configuration file
//! (`XRAYD_CONFIG_PATH` or `--config-path`), `XRAYD_*` environment variables
//! and command-line flags. The daemon consumes the resolved values through
//! typed accessors so timing windows are always handled as [`Duration`]s.

mod defaults;
mod logging;

use std::path::{Path, PathBuf};
use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

pub use defaults::{
    DEFAULT_CONFIG_DIR, DEFAULT_DEBOUNCE_MS, DEFAULT_EXECUTABLE, DEFAULT_EXTENSION,
    DEFAULT_GRACE_PERIOD_MS, DEFAULT_LOG_FILE_NAME, DEFAULT_LOG_FILTER, DEFAULT_LOG_MAX_BYTES,
    DEFAULT_REGISTRY_PATH, DEFAULT_SETTLE_MS, DEFAULT_STABILITY_WINDOW_MS, default_config_dir,
    default_debounce_ms, default_executable, default_extension, default_grace_period_ms,
    default_log_filter, default_log_filter_string, default_log_format, default_log_max_bytes,
    default_registry_path, default_settle_ms, default_stability_window_ms,
};
pub use logging::{LogFormat, LogFormatParseError};

/// Resolved supervisor configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "XRAYD")]
pub struct Config {
    /// Directory watched (non-recursively) for configuration files.
    #[serde(default = "default_config_dir")]
    #[ortho_config(default = default_config_dir())]
    pub config_dir: PathBuf,
    /// Extension, without the leading dot, that marks a configuration file.
    #[serde(default = "default_extension")]
    #[ortho_config(default = default_extension())]
    pub extension: String,
    /// Managed executable launched as `<executable> -config <path>`.
    #[serde(default = "default_executable")]
    #[ortho_config(default = default_executable())]
    pub executable: PathBuf,
    /// File recording `<pid> <identity>` for every managed process.
    #[serde(default = "default_registry_path")]
    #[ortho_config(default = default_registry_path())]
    pub registry_path: PathBuf,
    /// Supervisor log file; defaults to `logfile.log` inside `config_dir`.
    #[serde(default)]
    pub log_file: Option<PathBuf>,
    /// `tracing` filter expression.
    #[serde(default = "default_log_filter_string")]
    #[ortho_config(default = default_log_filter_string())]
    pub log_filter: String,
    /// Output format of the supervisor log.
    #[serde(default = "default_log_format")]
    #[ortho_config(default = default_log_format())]
    pub log_format: LogFormat,
    /// Size in bytes above which the supervisor log is rotated.
    #[serde(default = "default_log_max_bytes")]
    #[ortho_config(default = default_log_max_bytes())]
    pub log_max_bytes: u64,
    /// Debounce delay in milliseconds.
    #[serde(default = "default_debounce_ms")]
    #[ortho_config(default = default_debounce_ms())]
    pub debounce_ms: u64,
    /// Delay in milliseconds before a stability check takes its first sample.
    #[serde(default = "default_settle_ms")]
    #[ortho_config(default = default_settle_ms())]
    pub settle_ms: u64,
    /// Milliseconds between the two size samples of a stability check.
    #[serde(default = "default_stability_window_ms")]
    #[ortho_config(default = default_stability_window_ms())]
    pub stability_window_ms: u64,
    /// Milliseconds a launched process must survive before it is registered.
    #[serde(default = "default_grace_period_ms")]
    #[ortho_config(default = default_grace_period_ms())]
    pub grace_period_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_dir: default_config_dir(),
            extension: default_extension(),
            executable: default_executable(),
            registry_path: default_registry_path(),
            log_file: None,
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
            log_max_bytes: default_log_max_bytes(),
            debounce_ms: default_debounce_ms(),
            settle_ms: default_settle_ms(),
            stability_window_ms: default_stability_window_ms(),
            grace_period_ms: default_grace_period_ms(),
        }
    }
}

impl Config {
    /// Directory holding the managed configuration files.
    #[must_use]
    pub fn config_dir(&self) -> &Path {
        self.config_dir.as_path()
    }

    /// Recognised configuration extension, without a leading dot.
    #[must_use]
    pub fn extension(&self) -> &str {
        self.extension.trim_start_matches('.')
    }

    /// Managed executable path.
    #[must_use]
    pub fn executable(&self) -> &Path {
        self.executable.as_path()
    }

    /// PID registry path.
    #[must_use]
    pub fn registry_path(&self) -> &Path {
        self.registry_path.as_path()
    }

    /// Supervisor log file, falling back to `logfile.log` in the config directory.
    #[must_use]
    pub fn log_file(&self) -> PathBuf {
        match &self.log_file {
            Some(path) => path.clone(),
            None => self.config_dir.join(DEFAULT_LOG_FILE_NAME),
        }
    }

    /// `tracing` filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Output format of the supervisor log.
    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Rotation threshold for the supervisor log.
    #[must_use]
    pub fn log_max_bytes(&self) -> u64 {
        self.log_max_bytes
    }

    /// Quiet period required before a debounced event is dispatched.
    #[must_use]
    pub fn debounce_delay(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Pause before the first size sample of a stability check.
    #[must_use]
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    /// Window between the two size samples of a stability check.
    #[must_use]
    pub fn stability_window(&self) -> Duration {
        Duration::from_millis(self.stability_window_ms)
    }

    /// Time a launched process must survive before it is registered.
    #[must_use]
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }
}
