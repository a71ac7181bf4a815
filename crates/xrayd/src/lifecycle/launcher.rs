//! Spawns the managed executable and tracks the resulting child.

use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;

use tracing::{debug, info, warn};

use super::LIFECYCLE_TARGET;

/// Observed state of a launched child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildState {
    /// The child has not exited.
    Running,
    /// The child exited; `code` is `None` when it was killed by a signal.
    Exited {
        /// Exit code, if any.
        code: Option<i32>,
    },
}

/// Handle to a child started by a [`Launcher`].
pub trait ManagedChild: Send {
    /// Operating system process id.
    fn id(&self) -> u32;

    /// Polls the child without blocking.
    fn poll(&mut self) -> io::Result<ChildState>;

    /// Releases the handle, reaping the child in the background once it exits.
    fn detach(self: Box<Self>);
}

/// Starts one managed process for a configuration file.
pub trait Launcher: Send + Sync {
    /// Launches the managed executable against `config`.
    fn launch(&self, config: &Path) -> io::Result<Box<dyn ManagedChild>>;
}

/// Launcher running `<executable> -config <path>` with captured output.
#[derive(Debug, Clone)]
pub struct CommandLauncher {
    executable: PathBuf,
}

impl CommandLauncher {
    /// Builds a launcher for `executable`.
    #[must_use]
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
        }
    }

    /// Managed executable path.
    #[must_use]
    pub fn executable(&self) -> &Path {
        self.executable.as_path()
    }
}

impl Launcher for CommandLauncher {
    fn launch(&self, config: &Path) -> io::Result<Box<dyn ManagedChild>> {
        let mut child = Command::new(&self.executable)
            .arg("-config")
            .arg(config)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;
        // Captured output is never surfaced but must be drained so the child
        // cannot block on a full pipe.
        if let Some(stdout) = child.stdout.take() {
            drain(stdout, "stdout")?;
        }
        if let Some(stderr) = child.stderr.take() {
            drain(stderr, "stderr")?;
        }
        Ok(Box::new(SpawnedChild { child }))
    }
}

fn drain<R>(mut reader: R, stream: &'static str) -> io::Result<()>
where
    R: Read + Send + 'static,
{
    thread::Builder::new()
        .name(format!("xrayd-{stream}"))
        .spawn(move || {
            if let Err(error) = io::copy(&mut reader, &mut io::sink()) {
                debug!(
                    target: LIFECYCLE_TARGET,
                    stream,
                    error = %error,
                    "stopped draining managed process output"
                );
            }
        })
        .map(drop)
}

#[derive(Debug)]
struct SpawnedChild {
    child: Child,
}

impl ManagedChild for SpawnedChild {
    fn id(&self) -> u32 {
        self.child.id()
    }

    fn poll(&mut self) -> io::Result<ChildState> {
        Ok(match self.child.try_wait()? {
            Some(status) => ChildState::Exited {
                code: status.code(),
            },
            None => ChildState::Running,
        })
    }

    fn detach(self: Box<Self>) {
        let mut child = self.child;
        let pid = child.id();
        let reaper = thread::Builder::new()
            .name(format!("xrayd-reap-{pid}"))
            .spawn(move || match child.wait() {
                Ok(status) => info!(
                    target: LIFECYCLE_TARGET,
                    pid,
                    code = ?status.code(),
                    "managed process exited"
                ),
                Err(error) => warn!(
                    target: LIFECYCLE_TARGET,
                    pid,
                    error = %error,
                    "failed to reap managed process"
                ),
            });
        if let Err(error) = reaper {
            warn!(
                target: LIFECYCLE_TARGET,
                pid,
                error = %error,
                "failed to spawn reaper thread"
            );
        }
    }
}
