//! Structured telemetry initialisation for the supervisor.
//!
//! Records are written to the supervisor log file through a [`LogSink`] so
//! the [`LogRotator`] can move the file aside without reinstalling the
//! subscriber.

mod rotate;
mod sink;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use tracing::{Subscriber, subscriber::SetGlobalDefaultError};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;

use xrayd_config::{Config, LogFormat};

pub use rotate::{LogRotator, Rotation};
pub use sink::{LogSink, LogSinkWriter, rotated_path};

pub(crate) const TELEMETRY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::telemetry");

static TELEMETRY_SINK: OnceCell<LogSink> = OnceCell::new();

/// Handle returned when telemetry has been initialised.
#[derive(Debug, Clone)]
pub struct TelemetryHandle {
    sink: LogSink,
}

impl TelemetryHandle {
    /// Log sink the subscriber writes to.
    #[must_use]
    pub fn sink(&self) -> &LogSink {
        &self.sink
    }

    /// Builds a rotator for the active log file.
    #[must_use]
    pub fn rotator(&self, max_bytes: u64) -> LogRotator {
        LogRotator::new(self.sink.clone(), max_bytes)
    }
}

/// Errors encountered while configuring telemetry.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// Failed to parse the configured log filter expression.
    #[error("invalid log filter: {0}")]
    Filter(String),
    /// Failed to open the supervisor log file.
    #[error("failed to open log file '{path}': {source}")]
    LogFile {
        /// Log file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Failed to install the tracing subscriber.
    #[error("failed to install telemetry subscriber: {0}")]
    Subscriber(SetGlobalDefaultError),
}

/// Configures the global tracing subscriber when invoked for the first time.
///
/// Repeated calls are idempotent: the first invocation opens the log file and
/// installs the global subscriber. Later invocations return a handle to the
/// same sink without touching global state again.
pub fn initialise(config: &Config) -> Result<TelemetryHandle, TelemetryError> {
    TELEMETRY_SINK
        .get_or_try_init(|| install_subscriber(config))
        .map(|sink| TelemetryHandle { sink: sink.clone() })
}

fn install_subscriber(config: &Config) -> Result<LogSink, TelemetryError> {
    let filter = EnvFilter::try_new(config.log_filter())
        .map_err(|error| TelemetryError::Filter(error.to_string()))?;
    let path = config.log_file();
    // The default log lives in the watched directory, which is never created here.
    if config.log_file.is_some() {
        create_parent(&path).map_err(|source| TelemetryError::LogFile {
            path: path.clone(),
            source,
        })?;
    }
    let sink = LogSink::open(&path).map_err(|source| TelemetryError::LogFile { path, source })?;

    let builder = |filter: EnvFilter, sink: LogSink| {
        fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .with_level(true)
            .with_thread_ids(false)
            .with_thread_names(true)
            .with_writer(sink)
            .with_ansi(false)
            .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
    };

    let subscriber: Box<dyn Subscriber + Send + Sync> = match config.log_format() {
        LogFormat::Json => Box::new(
            builder(filter, sink.clone())
                .json()
                .flatten_event(true)
                .finish(),
        ),
        LogFormat::Compact => Box::new(builder(filter, sink.clone()).compact().finish()),
    };

    tracing::subscriber::set_global_default(subscriber).map_err(TelemetryError::Subscriber)?;
    Ok(sink)
}

fn create_parent(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
        _ => Ok(()),
    }
}
