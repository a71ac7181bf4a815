//! Reopenable log file shared by the tracing subscriber and the rotator.

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing_subscriber::fmt::MakeWriter;

#[derive(Debug)]
struct OpenLog {
    path: PathBuf,
    file: File,
}

/// Log file handle that can be swapped for a fresh file while in use.
#[derive(Debug, Clone)]
pub struct LogSink {
    inner: Arc<Mutex<OpenLog>>,
}

impl LogSink {
    /// Opens `path` for appending. The parent directory must already exist.
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let file = append_to(&path)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(OpenLog { path, file })),
        })
    }

    /// Path of the active log file.
    #[must_use]
    pub fn path(&self) -> PathBuf {
        self.lock().path.clone()
    }

    /// Renames the file to `<path>.old` and starts a fresh one once it
    /// exceeds `max_bytes`. Returns whether a rotation happened.
    pub(super) fn rotate_if_larger(&self, max_bytes: u64) -> io::Result<bool> {
        let mut log = self.lock();
        let size = match fs::metadata(&log.path) {
            Ok(metadata) => metadata.len(),
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(error) => return Err(error),
        };
        if size <= max_bytes {
            return Ok(false);
        }
        log.file.flush()?;
        fs::rename(&log.path, rotated_path(&log.path))?;
        let fresh = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&log.path)?;
        log.file = fresh;
        Ok(true)
    }

    fn lock(&self) -> MutexGuard<'_, OpenLog> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Path a rotated log is moved to.
#[must_use]
pub fn rotated_path(path: &Path) -> PathBuf {
    let mut rotated = OsString::from(path.as_os_str());
    rotated.push(".old");
    PathBuf::from(rotated)
}

fn append_to(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Writer handed to the subscriber for a single record.
pub struct LogSinkWriter<'a> {
    log: MutexGuard<'a, OpenLog>,
}

impl Write for LogSinkWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.log.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.log.file.flush()
    }
}

impl<'a> MakeWriter<'a> for LogSink {
    type Writer = LogSinkWriter<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        LogSinkWriter { log: self.lock() }
    }
}
