//! Defines the unified error surface for supervisor launch and shutdown.

use std::io;
use std::sync::Arc;

use ortho_config::OrthoError;
use thiserror::Error;

use crate::lifecycle::LifecycleError;
use crate::registry::RegistryError;
use crate::telemetry::TelemetryError;
use crate::watcher::WatchError;

use super::shutdown::ShutdownError;

/// Errors surfaced while launching or running the supervisor.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Config {
        /// Underlying loader error.
        #[source]
        source: Arc<OrthoError>,
    },
    /// Telemetry could not be initialised.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
    /// The process registry could not be opened or drained.
    #[error("process registry failed: {source}")]
    Registry {
        /// Underlying registry error.
        #[source]
        source: RegistryError,
    },
    /// Pruning exited processes from the registry failed.
    #[error("failed to reconcile process registry: {source}")]
    Reconcile {
        /// Underlying lifecycle error.
        #[source]
        source: LifecycleError,
    },
    /// The configuration directory could not be scanned or watched.
    #[error("failed to watch configuration directory: {source}")]
    Watch {
        /// Underlying watcher error.
        #[source]
        source: WatchError,
    },
    /// The debounce worker thread could not be spawned.
    #[error("failed to spawn debounce worker: {source}")]
    Worker {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Waiting for shutdown failed.
    #[error("failed to await shutdown signal: {source}")]
    Shutdown {
        /// Underlying shutdown error.
        #[source]
        source: ShutdownError,
    },
}

impl From<Arc<OrthoError>> for LaunchError {
    fn from(source: Arc<OrthoError>) -> Self {
        Self::Config { source }
    }
}

impl From<TelemetryError> for LaunchError {
    fn from(source: TelemetryError) -> Self {
        Self::Telemetry { source }
    }
}

impl From<RegistryError> for LaunchError {
    fn from(source: RegistryError) -> Self {
        Self::Registry { source }
    }
}

impl From<LifecycleError> for LaunchError {
    fn from(source: LifecycleError) -> Self {
        Self::Reconcile { source }
    }
}

impl From<WatchError> for LaunchError {
    fn from(source: WatchError) -> Self {
        Self::Watch { source }
    }
}

impl From<ShutdownError> for LaunchError {
    fn from(source: ShutdownError) -> Self {
        Self::Shutdown { source }
    }
}
