pub(crate) mod coordinator;
mod errors;
pub(crate) mod launch;
pub(crate) mod shutdown;

pub use coordinator::{ShutdownCoordinator, ShutdownReport};
pub use errors::LaunchError;
pub use launch::{SupervisorPlan, run_supervisor, run_supervisor_with};
pub use shutdown::{ShutdownError, ShutdownSignal, SystemShutdownSignal};

pub(crate) const PROCESS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::process");
