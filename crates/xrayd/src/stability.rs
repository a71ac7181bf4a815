//! Detects whether a configuration file has finished being written.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

const STABILITY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::stability");

/// Outcome of a stability check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stability {
    /// The size did not change across the sampling window.
    Stable,
    /// The size changed, so a writer is most likely still active.
    Unstable {
        /// Size at the first sample.
        before: u64,
        /// Size at the second sample.
        after: u64,
    },
}

/// Errors raised while sampling a file.
#[derive(Debug, Error)]
#[error("failed to sample size of '{path}': {source}")]
pub struct StabilityError {
    /// File being sampled.
    pub path: PathBuf,
    /// Underlying IO error.
    #[source]
    pub source: io::Error,
}

/// Gate consulted before a configuration file is used to launch a process.
pub trait StabilityCheck: Send + Sync {
    /// Decides whether `path` has stopped changing.
    fn check(&self, path: &Path) -> Result<Stability, StabilityError>;
}

/// Samples a file's size twice across a fixed window.
#[derive(Debug, Clone, Copy)]
pub struct SizeStabilityChecker {
    settle: Duration,
    window: Duration,
}

impl SizeStabilityChecker {
    /// Builds a checker that waits `settle`, samples, waits `window`, and samples again.
    #[must_use]
    pub fn new(settle: Duration, window: Duration) -> Self {
        Self { settle, window }
    }
}

impl StabilityCheck for SizeStabilityChecker {
    fn check(&self, path: &Path) -> Result<Stability, StabilityError> {
        thread::sleep(self.settle);
        let before = sample(path)?;
        thread::sleep(self.window);
        let after = sample(path)?;
        debug!(
            target: STABILITY_TARGET,
            path = %path.display(),
            before,
            after,
            "sampled configuration size"
        );
        if before == after {
            Ok(Stability::Stable)
        } else {
            Ok(Stability::Unstable { before, after })
        }
    }
}

fn sample(path: &Path) -> Result<u64, StabilityError> {
    fs::metadata(path)
        .map(|metadata| metadata.len())
        .map_err(|source| StabilityError {
            path: path.to_path_buf(),
            source,
        })
}
