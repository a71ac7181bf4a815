//! Test doubles for the operating-system seams of the lifecycle manager.

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use crate::lifecycle::{ChildState, Launcher, ManagedChild, SignalError, Signaller, Termination};
use crate::process::{ShutdownError, ShutdownSignal};
use crate::stability::{Stability, StabilityCheck, StabilityError};

/// First pid handed out by [`RecordingLauncher`].
pub const FIRST_PID: u32 = 4000;

/// How launched fake children behave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchBehaviour {
    /// The child keeps running.
    Survives,
    /// The child exits with the given code before the grace period ends.
    ExitsWith(i32),
    /// Spawning fails.
    FailsToSpawn,
}

#[derive(Debug)]
struct LauncherState {
    behaviour: LaunchBehaviour,
    next_pid: u32,
    launched: Vec<(PathBuf, u32)>,
    detached: Vec<u32>,
}

/// Launcher that records requests and hands out sequential pids.
#[derive(Debug, Clone)]
pub struct RecordingLauncher {
    state: Arc<Mutex<LauncherState>>,
}

impl Default for RecordingLauncher {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(LauncherState {
                behaviour: LaunchBehaviour::Survives,
                next_pid: FIRST_PID,
                launched: Vec::new(),
                detached: Vec::new(),
            })),
        }
    }
}

impl RecordingLauncher {
    pub fn set_behaviour(&self, behaviour: LaunchBehaviour) {
        self.state.lock().expect("launcher mutex poisoned").behaviour = behaviour;
    }

    /// Every launch as `(config path, pid)`.
    pub fn launched(&self) -> Vec<(PathBuf, u32)> {
        self.state
            .lock()
            .expect("launcher mutex poisoned")
            .launched
            .clone()
    }

    pub fn launches_for(&self, identity: &str) -> usize {
        self.launched()
            .iter()
            .filter(|(path, _)| path.file_name().is_some_and(|name| name == identity))
            .count()
    }

    pub fn detached(&self) -> Vec<u32> {
        self.state
            .lock()
            .expect("launcher mutex poisoned")
            .detached
            .clone()
    }
}

impl Launcher for RecordingLauncher {
    fn launch(&self, config: &Path) -> io::Result<Box<dyn ManagedChild>> {
        let mut state = self.state.lock().expect("launcher mutex poisoned");
        let child_state = match state.behaviour {
            LaunchBehaviour::FailsToSpawn => {
                return Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    "managed executable missing",
                ));
            }
            LaunchBehaviour::Survives => ChildState::Running,
            LaunchBehaviour::ExitsWith(code) => ChildState::Exited { code: Some(code) },
        };
        let pid = state.next_pid;
        state.next_pid += 1;
        state.launched.push((config.to_path_buf(), pid));
        Ok(Box::new(FakeChild {
            pid,
            state: child_state,
            launcher: Arc::clone(&self.state),
        }))
    }
}

struct FakeChild {
    pid: u32,
    state: ChildState,
    launcher: Arc<Mutex<LauncherState>>,
}

impl ManagedChild for FakeChild {
    fn id(&self) -> u32 {
        self.pid
    }

    fn poll(&mut self) -> io::Result<ChildState> {
        Ok(self.state)
    }

    fn detach(self: Box<Self>) {
        self.launcher
            .lock()
            .expect("launcher mutex poisoned")
            .detached
            .push(self.pid);
    }
}

/// Signaller recording every termination request.
#[derive(Debug, Clone, Default)]
pub struct RecordingSignaller {
    terminated: Arc<Mutex<Vec<u32>>>,
    exited: Arc<Mutex<HashSet<u32>>>,
}

impl RecordingSignaller {
    /// Marks `pid` as no longer existing.
    pub fn mark_exited(&self, pid: u32) {
        self.exited
            .lock()
            .expect("signaller mutex poisoned")
            .insert(pid);
    }

    pub fn terminated(&self) -> Vec<u32> {
        self.terminated
            .lock()
            .expect("signaller mutex poisoned")
            .clone()
    }
}

impl Signaller for RecordingSignaller {
    fn terminate(&self, pid: u32) -> Result<Termination, SignalError> {
        self.terminated
            .lock()
            .expect("signaller mutex poisoned")
            .push(pid);
        if self
            .exited
            .lock()
            .expect("signaller mutex poisoned")
            .contains(&pid)
        {
            Ok(Termination::NotFound)
        } else {
            Ok(Termination::Delivered)
        }
    }

    fn is_alive(&self, pid: u32) -> Result<bool, SignalError> {
        Ok(!self
            .exited
            .lock()
            .expect("signaller mutex poisoned")
            .contains(&pid))
    }
}

/// Stability gate with a switchable verdict that counts its invocations.
#[derive(Debug, Clone, Default)]
pub struct StubStability {
    unstable: Arc<AtomicBool>,
    checks: Arc<AtomicUsize>,
}

impl StubStability {
    pub fn set_unstable(&self, unstable: bool) {
        self.unstable.store(unstable, Ordering::SeqCst);
    }

    pub fn checks(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }
}

impl StabilityCheck for StubStability {
    fn check(&self, _path: &Path) -> Result<Stability, StabilityError> {
        self.checks.fetch_add(1, Ordering::SeqCst);
        if self.unstable.load(Ordering::SeqCst) {
            Ok(Stability::Unstable {
                before: 1,
                after: 2,
            })
        } else {
            Ok(Stability::Stable)
        }
    }
}

/// Shutdown signal triggered explicitly by a test.
#[derive(Clone)]
pub struct TestShutdownSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl TestShutdownSignal {
    pub fn new() -> Self {
        Self {
            inner: Arc::new((Mutex::new(false), Condvar::new())),
        }
    }

    pub fn trigger(&self) {
        let (lock, cvar) = &*self.inner;
        let mut triggered = lock.lock().expect("shutdown mutex poisoned");
        *triggered = true;
        cvar.notify_all();
    }
}

impl ShutdownSignal for TestShutdownSignal {
    fn wait(&self) -> Result<(), ShutdownError> {
        let (lock, cvar) = &*self.inner;
        let mut triggered = lock.lock().expect("shutdown mutex poisoned");
        while !*triggered {
            triggered = cvar
                .wait(triggered)
                .expect("shutdown mutex poisoned during wait");
        }
        Ok(())
    }
}
