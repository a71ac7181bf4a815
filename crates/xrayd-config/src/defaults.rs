use std::path::PathBuf;

/// Default directory scanned and watched for configuration files.
pub const DEFAULT_CONFIG_DIR: &str = "./config";

/// Default extension (without the leading dot) identifying configuration files.
pub const DEFAULT_EXTENSION: &str = "json";

/// Default managed executable.
pub const DEFAULT_EXECUTABLE: &str = "./xray-x";

/// Default location of the PID registry.
pub const DEFAULT_REGISTRY_PATH: &str = "./xray.pid";

/// Log file name used inside the configuration directory when none is set.
pub const DEFAULT_LOG_FILE_NAME: &str = "logfile.log";

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Size above which the supervisor log is rotated (1 MiB).
pub const DEFAULT_LOG_MAX_BYTES: u64 = 1024 * 1024;

/// Quiet period collapsing bursts of filesystem events.
pub const DEFAULT_DEBOUNCE_MS: u64 = 1_000;

/// Pause before the first size sample of a stability check.
pub const DEFAULT_SETTLE_MS: u64 = 100;

/// Window between the two size samples of a stability check.
pub const DEFAULT_STABILITY_WINDOW_MS: u64 = 1_000;

/// Time a freshly launched process must survive before it is registered.
pub const DEFAULT_GRACE_PERIOD_MS: u64 = 2_000;

/// Default log filter expression used by the binaries.
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the binaries.
pub fn default_log_format() -> crate::logging::LogFormat {
    crate::logging::LogFormat::Json
}

/// Default configuration directory.
pub fn default_config_dir() -> PathBuf {
    PathBuf::from(DEFAULT_CONFIG_DIR)
}

/// Default configuration extension.
pub fn default_extension() -> String {
    DEFAULT_EXTENSION.to_owned()
}

/// Default managed executable path.
pub fn default_executable() -> PathBuf {
    PathBuf::from(DEFAULT_EXECUTABLE)
}

/// Default PID registry path.
pub fn default_registry_path() -> PathBuf {
    PathBuf::from(DEFAULT_REGISTRY_PATH)
}

/// Default rotation threshold for the supervisor log.
pub fn default_log_max_bytes() -> u64 {
    DEFAULT_LOG_MAX_BYTES
}

/// Default debounce delay in milliseconds.
pub fn default_debounce_ms() -> u64 {
    DEFAULT_DEBOUNCE_MS
}

/// Default settle delay in milliseconds.
pub fn default_settle_ms() -> u64 {
    DEFAULT_SETTLE_MS
}

/// Default stability window in milliseconds.
pub fn default_stability_window_ms() -> u64 {
    DEFAULT_STABILITY_WINDOW_MS
}

/// Default launch grace period in milliseconds.
pub fn default_grace_period_ms() -> u64 {
    DEFAULT_GRACE_PERIOD_MS
}
