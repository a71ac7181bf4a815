//! Delivers termination signals to managed processes.

use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use thiserror::Error;

/// Result of asking a process to terminate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The signal was delivered.
    Delivered,
    /// No process with that id exists any more.
    NotFound,
}

/// Errors raised while signalling a process.
#[derive(Debug, Error)]
pub enum SignalError {
    /// The pid cannot address a single process.
    #[error("pid {pid} does not identify a single process")]
    InvalidPid {
        /// Offending pid.
        pid: u32,
    },
    /// The kernel rejected the signal.
    #[error("failed to signal process {pid}: {source}")]
    Os {
        /// Target pid.
        pid: u32,
        /// Underlying OS error.
        source: Errno,
    },
}

/// Sends signals to processes recorded in the registry.
pub trait Signaller: Send + Sync {
    /// Sends a termination request to `pid`.
    fn terminate(&self, pid: u32) -> Result<Termination, SignalError>;

    /// Reports whether `pid` still exists.
    fn is_alive(&self, pid: u32) -> Result<bool, SignalError>;
}

/// Signaller backed by `kill(2)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemSignaller;

impl SystemSignaller {
    /// Builds a system signaller.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Signaller for SystemSignaller {
    fn terminate(&self, pid: u32) -> Result<Termination, SignalError> {
        match kill(target(pid)?, Signal::SIGTERM) {
            Ok(()) => Ok(Termination::Delivered),
            Err(Errno::ESRCH) => Ok(Termination::NotFound),
            Err(source) => Err(SignalError::Os { pid, source }),
        }
    }

    fn is_alive(&self, pid: u32) -> Result<bool, SignalError> {
        match kill(target(pid)?, None) {
            Ok(()) | Err(Errno::EPERM) => Ok(true),
            Err(Errno::ESRCH) => Ok(false),
            Err(source) => Err(SignalError::Os { pid, source }),
        }
    }
}

fn target(pid: u32) -> Result<Pid, SignalError> {
    match i32::try_from(pid) {
        Ok(raw) if raw > 0 => Ok(Pid::from_raw(raw)),
        _ => Err(SignalError::InvalidPid { pid }),
    }
}
