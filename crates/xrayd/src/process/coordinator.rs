//! Terminates every registered process when the supervisor shuts down.

use std::sync::Arc;

use tracing::{info, warn};

use crate::lifecycle::{Signaller, Termination, log_termination};
use crate::registry::{self, ManagedProcess, RegistryError, SharedRegistry};

use super::PROCESS_TARGET;

/// Summary of a completed shutdown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Entries whose process received a termination signal.
    pub terminated: Vec<ManagedProcess>,
    /// Entries whose process had already exited.
    pub missing: Vec<ManagedProcess>,
    /// Entries that could not be signalled.
    pub failed: Vec<ManagedProcess>,
}

/// One-shot owner of the registry during shutdown.
pub struct ShutdownCoordinator {
    registry: SharedRegistry,
    signaller: Arc<dyn Signaller>,
}

impl ShutdownCoordinator {
    /// Builds a coordinator draining `registry`.
    #[must_use]
    pub fn new(registry: SharedRegistry, signaller: Arc<dyn Signaller>) -> Self {
        Self {
            registry,
            signaller,
        }
    }

    /// Signals every registered process, then deletes and closes the registry.
    pub fn run(self) -> Result<ShutdownReport, RegistryError> {
        let mut registry = registry::lock(&self.registry);
        let entries = registry.load()?;
        info!(
            target: PROCESS_TARGET,
            registered = entries.len(),
            "stopping managed processes"
        );
        let mut report = ShutdownReport::default();
        for entry in entries {
            match self.signaller.terminate(entry.pid()) {
                Ok(termination) => {
                    log_termination(&entry, termination);
                    match termination {
                        Termination::Delivered => report.terminated.push(entry),
                        Termination::NotFound => report.missing.push(entry),
                    }
                }
                Err(error) => {
                    warn!(
                        target: PROCESS_TARGET,
                        pid = entry.pid(),
                        identity = entry.identity(),
                        error = %error,
                        "failed to signal managed process"
                    );
                    report.failed.push(entry);
                }
            }
        }
        registry.close()?;
        Ok(report)
    }
}
