//! Persisted registry of managed processes.
//!
//! The registry is a flat text file holding one `<pid> <identity>` line per
//! running child. It outlives the supervisor so a restarted supervisor can
//! tell which configurations are already served. Every mutation rewrites the
//! whole file atomically; callers serialise access through [`SharedRegistry`].

mod files;

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tracing::{debug, info};

use self::files::atomic_write;

pub(crate) const REGISTRY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::registry");

/// One registered child process and the configuration it serves.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ManagedProcess {
    pid: u32,
    identity: String,
}

impl ManagedProcess {
    /// Builds a registry entry.
    #[must_use]
    pub fn new(pid: u32, identity: impl Into<String>) -> Self {
        Self {
            pid,
            identity: identity.into(),
        }
    }

    /// Process id of the managed child.
    #[must_use]
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Configuration identity (file basename) served by the child.
    #[must_use]
    pub fn identity(&self) -> &str {
        &self.identity
    }

    fn parse(line: &str) -> Option<Self> {
        let (pid, identity) = line.trim().split_once(char::is_whitespace)?;
        let pid = pid.parse::<u32>().ok().filter(|pid| *pid != 0)?;
        let identity = identity.trim();
        if identity.is_empty() {
            return None;
        }
        Some(Self::new(pid, identity))
    }
}

impl fmt::Display for ManagedProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.pid, self.identity)
    }
}

/// Errors raised while reading or rewriting the registry file.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Reading, writing, or removing the backing file failed.
    #[error("registry I/O failed for '{path}': {source}")]
    Io {
        /// Registry file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// A line did not follow the `<pid> <identity>` format.
    #[error("malformed registry line {line} in '{path}'")]
    Malformed {
        /// Registry file path.
        path: PathBuf,
        /// One-based line number.
        line: usize,
    },
    /// The registry was drained during shutdown and accepts no further use.
    #[error("registry '{path}' is closed")]
    Closed {
        /// Registry file path.
        path: PathBuf,
    },
}

/// Registry handle shared between the lifecycle manager and shutdown path.
pub type SharedRegistry = Arc<Mutex<ProcessRegistry>>;

/// Locks a shared registry, recovering the guard if a holder panicked.
pub(crate) fn lock(registry: &SharedRegistry) -> MutexGuard<'_, ProcessRegistry> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// File-backed process registry.
#[derive(Debug)]
pub struct ProcessRegistry {
    path: PathBuf,
    closed: bool,
}

impl ProcessRegistry {
    /// Opens the registry at `path`, creating an empty file when absent.
    ///
    /// Existing entries are preserved so tracking survives a supervisor
    /// restart.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, RegistryError> {
        let path = path.into();
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| RegistryError::Io {
                path: path.clone(),
                source,
            })?;
        info!(
            target: REGISTRY_TARGET,
            file = %path.display(),
            "process registry opened"
        );
        Ok(Self {
            path,
            closed: false,
        })
    }

    /// Wraps the registry for shared, serialised access.
    #[must_use]
    pub fn into_shared(self) -> SharedRegistry {
        Arc::new(Mutex::new(self))
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// Whether [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Returns every entry in file order.
    pub fn load(&self) -> Result<Vec<ManagedProcess>, RegistryError> {
        self.ensure_open()?;
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(RegistryError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        contents
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(index, line)| {
                ManagedProcess::parse(line).ok_or_else(|| RegistryError::Malformed {
                    path: self.path.clone(),
                    line: index + 1,
                })
            })
            .collect()
    }

    /// Reports whether any entry serves `identity`.
    pub fn contains_identity(&self, identity: &str) -> Result<bool, RegistryError> {
        Ok(self
            .load()?
            .iter()
            .any(|entry| entry.identity() == identity))
    }

    /// Records `entry`, replacing any stale line carrying the same pid.
    pub fn append(&mut self, entry: ManagedProcess) -> Result<(), RegistryError> {
        let mut entries = self.load()?;
        entries.retain(|existing| existing.pid() != entry.pid());
        debug!(
            target: REGISTRY_TARGET,
            pid = entry.pid(),
            identity = entry.identity(),
            "registry entry appended"
        );
        entries.push(entry);
        self.persist(&entries)
    }

    /// Removes every entry matching `predicate` and returns the removed ones.
    pub fn remove_where<F>(&mut self, mut predicate: F) -> Result<Vec<ManagedProcess>, RegistryError>
    where
        F: FnMut(&ManagedProcess) -> bool,
    {
        let (removed, kept): (Vec<_>, Vec<_>) =
            self.load()?.into_iter().partition(|entry| predicate(entry));
        self.persist(&kept)?;
        debug!(
            target: REGISTRY_TARGET,
            removed = removed.len(),
            remaining = kept.len(),
            "registry entries removed"
        );
        Ok(removed)
    }

    /// Deletes the backing file and rejects any further use.
    pub fn close(&mut self) -> Result<(), RegistryError> {
        self.ensure_open()?;
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(error) if error.kind() == io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(RegistryError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        }
        self.closed = true;
        info!(
            target: REGISTRY_TARGET,
            file = %self.path.display(),
            "process registry removed"
        );
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), RegistryError> {
        if self.closed {
            return Err(RegistryError::Closed {
                path: self.path.clone(),
            });
        }
        Ok(())
    }

    fn persist(&self, entries: &[ManagedProcess]) -> Result<(), RegistryError> {
        let contents: String = entries.iter().map(|entry| format!("{entry}\n")).collect();
        atomic_write(&self.path, contents.as_bytes()).map_err(|source| RegistryError::Io {
            path: self.path.clone(),
            source,
        })
    }
}
