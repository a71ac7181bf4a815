//! Supervisor keeping one managed xray process per configuration file.
//!
//! The daemon watches a configuration directory and reacts to files being
//! created, modified, or deleted by starting, restarting, or stopping the
//! managed executable serving each file. The moving parts are:
//!
//! - [`watcher`]: non-recursive directory subscription filtered by extension.
//! - [`debounce`]: per-path coalescing of event bursts into one [`Action`].
//! - [`stability`]: pre-launch check that a file has stopped growing.
//! - [`lifecycle`]: start/stop/restart of managed processes.
//! - [`registry`]: the persisted `<pid> <identity>` process registry.
//! - [`telemetry`]: structured logging into a size-capped log file.
//!
//! On `SIGTERM` or `SIGINT` the [`ShutdownCoordinator`] terminates every
//! registered process and deletes the registry before the supervisor exits.

pub mod debounce;
pub mod lifecycle;
mod process;
pub mod registry;
pub mod stability;
pub mod telemetry;
pub mod watcher;

pub use debounce::{Action, ActionHandler, DebounceHandle, Debouncer, FsEvent, FsEventKind};
pub use lifecycle::{
    Collaborators, LifecycleError, LifecycleManager, StartOutcome, StopOutcome, Termination,
};
pub use process::{
    LaunchError, ShutdownCoordinator, ShutdownError, ShutdownReport, ShutdownSignal,
    SupervisorPlan, SystemShutdownSignal, run_supervisor, run_supervisor_with,
};
pub use registry::{ManagedProcess, ProcessRegistry, RegistryError, SharedRegistry};
pub use telemetry::{LogRotator, TelemetryError, TelemetryHandle};

#[cfg(test)]
mod tests;
