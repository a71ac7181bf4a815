//! Non-recursive directory watcher feeding the debouncer.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use thiserror::Error;
use tracing::{info, warn};

use crate::debounce::{DebounceHandle, FsEvent, FsEventKind};

const WATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::watcher");

/// Errors raised while preparing the configuration directory watch.
#[derive(Debug, Error)]
pub enum WatchError {
    /// The directory could not be read.
    #[error("configuration directory '{path}' is not accessible: {source}")]
    Inaccessible {
        /// Watched directory.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Subscribing to notifications failed.
    #[error("failed to watch '{path}': {source}")]
    Subscribe {
        /// Watched directory.
        path: PathBuf,
        /// Underlying notify error.
        #[source]
        source: notify::Error,
    },
}

/// Lists configuration files directly inside `dir`, sorted by name.
pub fn list_config_files(dir: &Path, extension: &str) -> Result<Vec<PathBuf>, WatchError> {
    let inaccessible = |source| WatchError::Inaccessible {
        path: dir.to_path_buf(),
        source,
    };
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(inaccessible)? {
        let entry = entry.map_err(inaccessible)?;
        let path = entry.path();
        if has_extension(&path, extension) && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Fails unless `dir` exists and can be listed.
pub fn ensure_accessible(dir: &Path) -> Result<(), WatchError> {
    fs::read_dir(dir)
        .map(drop)
        .map_err(|source| WatchError::Inaccessible {
            path: dir.to_path_buf(),
            source,
        })
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .is_some_and(|candidate| candidate == extension)
}

/// Translates a notify event into the qualifying configuration events.
///
/// Directory events and paths without the recognised extension are dropped.
/// Renames are reported as a deletion of the old name and a creation of the
/// new one. When the backend does not say which side of a rename a path is,
/// the side is inferred from whether the path still exists.
#[must_use]
pub fn classify(event: &Event, extension: &str) -> Vec<FsEvent> {
    let kinds: Vec<(FsEventKind, &PathBuf)> = match event.kind {
        EventKind::Create(CreateKind::Folder) | EventKind::Remove(RemoveKind::Folder) => {
            Vec::new()
        }
        EventKind::Create(_) => tag(FsEventKind::Created, &event.paths),
        EventKind::Remove(_) => tag(FsEventKind::Deleted, &event.paths),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            tag(FsEventKind::Deleted, &event.paths)
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            tag(FsEventKind::Created, &event.paths)
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => match event.paths.as_slice() {
            [from, to] => vec![(FsEventKind::Deleted, from), (FsEventKind::Created, to)],
            _ => Vec::new(),
        },
        EventKind::Modify(ModifyKind::Name(_)) => event
            .paths
            .iter()
            .map(|path| {
                let kind = if path.exists() {
                    FsEventKind::Created
                } else {
                    FsEventKind::Deleted
                };
                (kind, path)
            })
            .collect(),
        EventKind::Modify(_) => tag(FsEventKind::Modified, &event.paths),
        EventKind::Access(_) | EventKind::Any | EventKind::Other => Vec::new(),
    };
    kinds
        .into_iter()
        .filter(|(kind, path)| {
            has_extension(path, extension) && (*kind == FsEventKind::Deleted || !path.is_dir())
        })
        .map(|(kind, path)| FsEvent::new(kind, path.clone()))
        .collect()
}

fn tag(kind: FsEventKind, paths: &[PathBuf]) -> Vec<(FsEventKind, &PathBuf)> {
    paths.iter().map(|path| (kind, path)).collect()
}

/// Keeps a directory subscription alive; dropping it stops the watch.
pub struct DirectoryWatcher {
    _watcher: RecommendedWatcher,
    dir: PathBuf,
}

impl DirectoryWatcher {
    /// Watches `dir` and forwards qualifying events to `sink`.
    pub fn start(dir: &Path, extension: &str, sink: DebounceHandle) -> Result<Self, WatchError> {
        ensure_accessible(dir)?;
        let extension = extension.to_owned();
        let subscribe = |source| WatchError::Subscribe {
            path: dir.to_path_buf(),
            source,
        };
        let mut watcher =
            notify::recommended_watcher(move |result: notify::Result<Event>| match result {
                Ok(event) => {
                    for qualifying in classify(&event, &extension) {
                        sink.schedule(qualifying);
                    }
                }
                Err(error) => warn!(
                    target: WATCH_TARGET,
                    error = %error,
                    "filesystem watch reported an error"
                ),
            })
            .map_err(subscribe)?;
        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(subscribe)?;
        info!(
            target: WATCH_TARGET,
            dir = %dir.display(),
            "watching configuration directory"
        );
        Ok(Self {
            _watcher: watcher,
            dir: dir.to_path_buf(),
        })
    }

    /// Watched directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        self.dir.as_path()
    }
}
