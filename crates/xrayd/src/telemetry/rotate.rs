use std::io;

use tracing::info;

use super::TELEMETRY_TARGET;
use super::sink::{LogSink, rotated_path};

/// Outcome of a rotation check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    /// The log exceeded the threshold and was moved aside.
    Rotated,
    /// The log is below the threshold, or no file sink is configured.
    Skipped,
}

/// Caps the supervisor log at a fixed size.
#[derive(Debug, Clone)]
pub struct LogRotator {
    sink: Option<LogSink>,
    max_bytes: u64,
}

impl LogRotator {
    /// Rotates `sink` whenever it grows beyond `max_bytes`.
    #[must_use]
    pub fn new(sink: LogSink, max_bytes: u64) -> Self {
        Self {
            sink: Some(sink),
            max_bytes,
        }
    }

    /// Rotator that never rotates, used when logs are not file-backed.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            sink: None,
            max_bytes: u64::MAX,
        }
    }

    /// Rotates the log if it exceeds the threshold.
    pub fn rotate_if_needed(&self) -> io::Result<Rotation> {
        let Some(sink) = &self.sink else {
            return Ok(Rotation::Skipped);
        };
        if !sink.rotate_if_larger(self.max_bytes)? {
            return Ok(Rotation::Skipped);
        }
        let path = sink.path();
        info!(
            target: TELEMETRY_TARGET,
            rotated = %rotated_path(&path).display(),
            "log file rotated"
        );
        Ok(Rotation::Rotated)
    }
}
