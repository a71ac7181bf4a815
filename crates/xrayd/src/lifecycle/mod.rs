//! Starts, stops, and restarts one managed process per configuration file.
//!
//! The [`LifecycleManager`] is the only writer of the process registry apart
//! from the shutdown coordinator. Blocking waits (the stability window and
//! the launch grace period) live behind this type and the
//! [`StabilityCheck`] seam so the rest of the supervisor never sleeps.

mod launcher;
mod signaller;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracing::{error, info, warn};

use crate::debounce::{Action, ActionHandler};
use crate::registry::{self, ManagedProcess, RegistryError, SharedRegistry};
use crate::stability::{Stability, StabilityCheck, StabilityError};
use crate::telemetry::LogRotator;

pub use launcher::{ChildState, CommandLauncher, Launcher, ManagedChild};
pub use signaller::{SignalError, Signaller, SystemSignaller, Termination};

pub(crate) const LIFECYCLE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::lifecycle");

/// Derives the configuration identity (file basename) of `path`.
#[must_use]
pub fn config_identity(path: &Path) -> Option<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
}

/// Errors that abort a lifecycle operation.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// The path has no file name to derive an identity from.
    #[error("'{path}' does not name a configuration file")]
    InvalidPath {
        /// Offending path.
        path: PathBuf,
    },
    /// Sampling the configuration file failed.
    #[error(transparent)]
    Stability(#[from] StabilityError),
    /// The managed executable could not be spawned.
    #[error("failed to launch managed process for '{path}': {source}")]
    Spawn {
        /// Configuration file being served.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Polling the freshly launched child failed.
    #[error("failed to probe managed process {pid}: {source}")]
    Probe {
        /// Child pid.
        pid: u32,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Reading or rewriting the registry failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),
    /// Signalling a registered process failed.
    #[error(transparent)]
    Signal(#[from] SignalError),
}

/// Result of a `start` request that did not fail outright.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// The process survived the grace period and was registered.
    Started {
        /// Registered pid.
        pid: u32,
    },
    /// The file was still being written; nothing was launched.
    Unstable,
    /// The process exited within the grace period; nothing was registered.
    Exited {
        /// Child pid.
        pid: u32,
        /// Exit code, if any.
        code: Option<i32>,
    },
    /// The registry closed while the process was starting, so it was terminated.
    Abandoned {
        /// Child pid.
        pid: u32,
    },
}

/// Result of a `stop` request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StopOutcome {
    /// Every registry entry removed together with the signal outcome.
    pub stopped: Vec<(ManagedProcess, Termination)>,
}

/// Collaborators that touch the operating system.
pub struct Collaborators {
    /// Spawns the managed executable.
    pub launcher: Box<dyn Launcher>,
    /// Sends termination signals.
    pub signaller: Arc<dyn Signaller>,
    /// Pre-launch stability gate.
    pub stability: Box<dyn StabilityCheck>,
}

/// Manages the processes serving each configuration identity.
pub struct LifecycleManager {
    launcher: Box<dyn Launcher>,
    signaller: Arc<dyn Signaller>,
    stability: Box<dyn StabilityCheck>,
    registry: SharedRegistry,
    rotator: LogRotator,
    grace_period: Duration,
}

impl LifecycleManager {
    /// Builds a manager writing to `registry`.
    #[must_use]
    pub fn new(
        collaborators: Collaborators,
        registry: SharedRegistry,
        rotator: LogRotator,
        grace_period: Duration,
    ) -> Self {
        let Collaborators {
            launcher,
            signaller,
            stability,
        } = collaborators;
        Self {
            launcher,
            signaller,
            stability,
            registry,
            rotator,
            grace_period,
        }
    }

    /// Registry shared with the shutdown coordinator.
    #[must_use]
    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    /// Signaller shared with the shutdown coordinator.
    #[must_use]
    pub fn signaller(&self) -> &Arc<dyn Signaller> {
        &self.signaller
    }

    /// Launches a process for `path` once the file is stable.
    ///
    /// Any process already registered for the same identity is stopped
    /// before the new one is launched.
    pub fn start(&self, path: &Path) -> Result<StartOutcome, LifecycleError> {
        let outcome = self.start_inner(path);
        self.rotate_log();
        outcome
    }

    /// Terminates every process registered for `identity` and forgets it.
    pub fn stop(&self, identity: &str) -> Result<StopOutcome, LifecycleError> {
        let outcome = self.stop_inner(identity);
        self.rotate_log();
        outcome
    }

    /// Stops the process serving `path` and starts a fresh one.
    ///
    /// The start performs its own stability check.
    pub fn restart(&self, path: &Path) -> Result<StartOutcome, LifecycleError> {
        let identity = identity_of(path)?;
        self.stop(&identity)?;
        self.start(path)
    }

    /// Drops registry entries whose process no longer exists.
    pub fn forget_exited(&self) -> Result<Vec<ManagedProcess>, LifecycleError> {
        let mut registry = registry::lock(&self.registry);
        let mut probe_error = None;
        let removed = registry.remove_where(|entry| match self.signaller.is_alive(entry.pid()) {
            Ok(alive) => !alive,
            Err(error) => {
                probe_error.get_or_insert(error);
                false
            }
        })?;
        for entry in &removed {
            info!(
                target: LIFECYCLE_TARGET,
                pid = entry.pid(),
                identity = entry.identity(),
                "forgot registry entry for exited process"
            );
        }
        match probe_error {
            Some(error) => Err(error.into()),
            None => Ok(removed),
        }
    }

    fn start_inner(&self, path: &Path) -> Result<StartOutcome, LifecycleError> {
        let identity = identity_of(path)?;
        info!(
            target: LIFECYCLE_TARGET,
            path = %path.display(),
            "starting managed process"
        );
        if let Stability::Unstable { before, after } = self.stability.check(path)? {
            info!(
                target: LIFECYCLE_TARGET,
                path = %path.display(),
                before,
                after,
                "configuration still being written; start skipped"
            );
            return Ok(StartOutcome::Unstable);
        }

        if registry::lock(&self.registry).contains_identity(&identity)? {
            self.stop_inner(&identity)?;
        }

        let mut child = self
            .launcher
            .launch(path)
            .map_err(|source| LifecycleError::Spawn {
                path: path.to_path_buf(),
                source,
            })?;
        let pid = child.id();
        thread::sleep(self.grace_period);

        match child.poll() {
            Ok(ChildState::Running) => self.register(child, ManagedProcess::new(pid, identity)),
            Ok(ChildState::Exited { code }) => {
                warn!(
                    target: LIFECYCLE_TARGET,
                    path = %path.display(),
                    pid,
                    code = ?code,
                    "managed process exited during grace period"
                );
                Ok(StartOutcome::Exited { pid, code })
            }
            Err(source) => {
                self.abandon(child);
                Err(LifecycleError::Probe { pid, source })
            }
        }
    }

    fn register(
        &self,
        child: Box<dyn ManagedChild>,
        entry: ManagedProcess,
    ) -> Result<StartOutcome, LifecycleError> {
        let pid = entry.pid();
        let identity = entry.identity().to_owned();
        let appended = registry::lock(&self.registry).append(entry);
        match appended {
            Ok(()) => {
                info!(
                    target: LIFECYCLE_TARGET,
                    pid,
                    identity = %identity,
                    "managed process started"
                );
                child.detach();
                Ok(StartOutcome::Started { pid })
            }
            Err(RegistryError::Closed { .. }) => {
                info!(
                    target: LIFECYCLE_TARGET,
                    pid,
                    identity = %identity,
                    "registry closed during start; terminating managed process"
                );
                self.abandon(child);
                Ok(StartOutcome::Abandoned { pid })
            }
            Err(error) => {
                self.abandon(child);
                Err(error.into())
            }
        }
    }

    fn abandon(&self, child: Box<dyn ManagedChild>) {
        let pid = child.id();
        if let Err(error) = self.signaller.terminate(pid) {
            warn!(
                target: LIFECYCLE_TARGET,
                pid,
                error = %error,
                "failed to terminate untracked process"
            );
        }
        child.detach();
    }

    fn stop_inner(&self, identity: &str) -> Result<StopOutcome, LifecycleError> {
        let mut registry = registry::lock(&self.registry);
        let targets: Vec<ManagedProcess> = registry
            .load()?
            .into_iter()
            .filter(|entry| entry.identity() == identity)
            .collect();
        if targets.is_empty() {
            info!(
                target: LIFECYCLE_TARGET,
                identity,
                "no registered process to stop"
            );
            return Ok(StopOutcome::default());
        }

        let mut stopped = Vec::with_capacity(targets.len());
        let mut signal_error = None;
        for entry in targets {
            match self.signaller.terminate(entry.pid()) {
                Ok(termination) => {
                    log_termination(&entry, termination);
                    stopped.push((entry, termination));
                }
                Err(error) => {
                    warn!(
                        target: LIFECYCLE_TARGET,
                        pid = entry.pid(),
                        identity,
                        error = %error,
                        "failed to signal managed process"
                    );
                    signal_error.get_or_insert(error);
                }
            }
        }
        // Entries are dropped even when signalling failed.
        registry.remove_where(|entry| entry.identity() == identity)?;
        match signal_error {
            Some(error) => Err(error.into()),
            None => Ok(StopOutcome { stopped }),
        }
    }

    fn rotate_log(&self) {
        if let Err(error) = self.rotator.rotate_if_needed() {
            warn!(
                target: LIFECYCLE_TARGET,
                error = %error,
                "log rotation failed"
            );
        }
    }
}

pub(crate) fn log_termination(entry: &ManagedProcess, termination: Termination) {
    match termination {
        Termination::Delivered => info!(
            target: LIFECYCLE_TARGET,
            pid = entry.pid(),
            identity = entry.identity(),
            "managed process stopped"
        ),
        Termination::NotFound => info!(
            target: LIFECYCLE_TARGET,
            pid = entry.pid(),
            identity = entry.identity(),
            "managed process already gone"
        ),
    }
}

fn identity_of(path: &Path) -> Result<String, LifecycleError> {
    config_identity(path).ok_or_else(|| LifecycleError::InvalidPath {
        path: path.to_path_buf(),
    })
}

impl ActionHandler for LifecycleManager {
    fn handle(&self, action: Action) {
        let result = match &action {
            Action::Start(path) => {
                info!(target: LIFECYCLE_TARGET, path = %path.display(), "configuration created");
                self.start(path).map(drop)
            }
            Action::Restart(path) => {
                info!(target: LIFECYCLE_TARGET, path = %path.display(), "configuration modified");
                self.restart(path).map(drop)
            }
            Action::Stop(path) => {
                info!(target: LIFECYCLE_TARGET, path = %path.display(), "configuration deleted");
                identity_of(path).and_then(|identity| self.stop(&identity).map(drop))
            }
        };
        if let Err(error) = result {
            error!(
                target: LIFECYCLE_TARGET,
                action = ?action,
                error = %error,
                "lifecycle action failed"
            );
        }
    }
}
