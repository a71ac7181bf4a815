//! Collapses bursts of filesystem events into one lifecycle action per path.
//!
//! Each path owns at most one pending entry. Scheduling a new event for a
//! path replaces the pending one under the same lock the worker uses to
//! collect expired entries, so cancel-and-replace is atomic with respect to
//! dispatch. A single worker thread dispatches expired entries in order,
//! which also guarantees two actions for the same path never overlap.

use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

const DEBOUNCE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::debounce");

/// Kind of a qualifying filesystem event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FsEventKind {
    /// A configuration file appeared.
    Created,
    /// A configuration file was written.
    Modified,
    /// A configuration file disappeared.
    Deleted,
}

/// Raw filesystem event forwarded by the directory watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsEvent {
    /// What happened.
    pub kind: FsEventKind,
    /// Affected configuration file.
    pub path: PathBuf,
}

impl FsEvent {
    /// Builds an event.
    #[must_use]
    pub fn new(kind: FsEventKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }
}

/// Lifecycle action produced once an event has settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Launch a process for the file.
    Start(PathBuf),
    /// Replace the process serving the file.
    Restart(PathBuf),
    /// Stop the process serving the file.
    Stop(PathBuf),
}

/// Receives settled actions from the debouncer worker.
pub trait ActionHandler: Send + Sync {
    /// Executes `action`; failures are the handler's to report.
    fn handle(&self, action: Action);
}

impl<F> ActionHandler for F
where
    F: Fn(Action) + Send + Sync,
{
    fn handle(&self, action: Action) {
        self(action);
    }
}

#[derive(Debug, Clone, Copy)]
struct Pending {
    kind: FsEventKind,
    deadline: Instant,
}

#[derive(Debug, Default)]
struct State {
    pending: HashMap<PathBuf, Pending>,
    just_created: HashSet<PathBuf>,
    stopped: bool,
}

impl State {
    fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|pending| pending.deadline).min()
    }

    fn take_expired(&mut self, now: Instant) -> Vec<Action> {
        let mut expired: Vec<(PathBuf, Pending)> = Vec::new();
        self.pending.retain(|path, pending| {
            if pending.deadline <= now {
                expired.push((path.clone(), *pending));
                false
            } else {
                true
            }
        });
        expired.sort_by_key(|(_, pending)| pending.deadline);
        expired
            .into_iter()
            .map(|(path, pending)| decide(pending.kind, path, &mut self.just_created))
            .collect()
    }
}

/// Maps a settled event onto a lifecycle action.
///
/// A creation, or a modification of a path created but not yet started,
/// starts a process and clears the creation marker.
fn decide(kind: FsEventKind, path: PathBuf, just_created: &mut HashSet<PathBuf>) -> Action {
    match kind {
        FsEventKind::Created => {
            just_created.remove(&path);
            Action::Start(path)
        }
        FsEventKind::Modified if just_created.remove(&path) => Action::Start(path),
        FsEventKind::Modified => Action::Restart(path),
        FsEventKind::Deleted => Action::Stop(path),
    }
}

struct Shared {
    state: Mutex<State>,
    wakeup: Condvar,
    delay: Duration,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Cloneable handle used to feed events into a [`Debouncer`].
#[derive(Clone)]
pub struct DebounceHandle {
    shared: Arc<Shared>,
}

impl DebounceHandle {
    /// Schedules `event`, superseding any pending event for the same path.
    pub fn schedule(&self, event: FsEvent) {
        self.schedule_after(event, self.shared.delay);
    }

    /// Schedules `event` to settle after `delay` instead of the configured delay.
    pub fn schedule_after(&self, event: FsEvent, delay: Duration) {
        let mut state = self.shared.lock();
        if state.stopped {
            return;
        }
        if event.kind == FsEventKind::Created {
            state.just_created.insert(event.path.clone());
        }
        let replaced = state.pending.insert(
            event.path.clone(),
            Pending {
                kind: event.kind,
                deadline: Instant::now() + delay,
            },
        );
        debug!(
            target: DEBOUNCE_TARGET,
            path = %event.path.display(),
            kind = ?event.kind,
            superseded = replaced.is_some(),
            "event scheduled"
        );
        drop(state);
        self.shared.wakeup.notify_all();
    }

    /// Number of paths waiting for their quiet period to elapse.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.shared.lock().pending.len()
    }

    /// Whether `path` has a pending event.
    #[must_use]
    pub fn is_pending(&self, path: &Path) -> bool {
        self.shared.lock().pending.contains_key(path)
    }
}

/// Owns the worker thread that dispatches settled events.
pub struct Debouncer {
    handle: DebounceHandle,
    worker: Option<JoinHandle<()>>,
}

impl Debouncer {
    /// Spawns the worker dispatching settled actions to `handler`.
    pub fn spawn(delay: Duration, handler: Arc<dyn ActionHandler>) -> io::Result<Self> {
        let shared = Arc::new(Shared {
            state: Mutex::new(State::default()),
            wakeup: Condvar::new(),
            delay,
        });
        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name("xrayd-debounce".to_owned())
            .spawn(move || run_worker(&worker_shared, handler.as_ref()))?;
        Ok(Self {
            handle: DebounceHandle { shared },
            worker: Some(worker),
        })
    }

    /// Returns a handle for scheduling events.
    #[must_use]
    pub fn handle(&self) -> DebounceHandle {
        self.handle.clone()
    }

    /// Discards pending events and stops accepting new ones.
    ///
    /// An action already being dispatched runs to completion; use
    /// [`join`](Self::join) to wait for it.
    pub fn stop(&self) {
        let mut state = self.handle.shared.lock();
        state.stopped = true;
        let discarded = state.pending.len();
        state.pending.clear();
        drop(state);
        self.handle.shared.wakeup.notify_all();
        debug!(target: DEBOUNCE_TARGET, discarded, "debouncer stopped");
    }

    /// Stops the debouncer and waits for the worker to exit.
    pub fn join(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop();
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            warn!(target: DEBOUNCE_TARGET, "debounce worker panicked");
        }
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(shared: &Shared, handler: &dyn ActionHandler) {
    loop {
        let mut state = shared.lock();
        let actions = loop {
            if state.stopped {
                return;
            }
            let now = Instant::now();
            match state.next_deadline() {
                None => {
                    state = shared
                        .wakeup
                        .wait(state)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                Some(deadline) if deadline <= now => break state.take_expired(now),
                Some(deadline) => {
                    state = shared
                        .wakeup
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0;
                }
            }
        };
        drop(state);
        for action in actions {
            debug!(target: DEBOUNCE_TARGET, action = ?action, "dispatching action");
            handler.handle(action);
        }
    }
}
