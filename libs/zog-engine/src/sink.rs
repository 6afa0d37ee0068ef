use std::collections::HashMap;
use std::fs::{File, Metadata, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::SinkError;
use crate::topic::Topic;

// ═══════════════════════════════════════════════════════════════
//  WatchedFile: append-only file that follows external rotation
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileIdentity {
    dev: u64,
    ino: u64,
}

#[cfg(unix)]
fn identity(meta: &Metadata) -> Option<FileIdentity> {
    use std::os::unix::fs::MetadataExt;
    Some(FileIdentity {
        dev: meta.dev(),
        ino: meta.ino(),
    })
}

#[cfg(not(unix))]
fn identity(_meta: &Metadata) -> Option<FileIdentity> {
    None
}

/// Append-mode log file.
///
/// Before every write the path is checked: if the file was removed or
/// replaced (logrotate `create`, `mv` + new file) the descriptor is reopened,
/// so lines keep landing in the file that currently lives at `path`.
#[derive(Debug)]
pub struct WatchedFile {
    path: PathBuf,
    file: File,
    identity: Option<FileIdentity>,
}

impl WatchedFile {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SinkError> {
        let path = path.into();
        let (file, identity) = open_append(&path)?;
        Ok(Self {
            path,
            file,
            identity,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `line` plus a newline in a single write call.
    pub fn append(&mut self, line: &str) -> Result<(), SinkError> {
        self.reopen_if_rotated()?;

        let mut record = String::with_capacity(line.len() + 1);
        record.push_str(line);
        record.push('\n');

        self.file
            .write_all(record.as_bytes())
            .and_then(|()| self.file.flush())
            .map_err(|source| SinkError::File {
                path: self.path.clone(),
                source,
            })
    }

    fn reopen_if_rotated(&mut self) -> Result<(), SinkError> {
        let rotated = match std::fs::metadata(&self.path) {
            Ok(meta) => identity(&meta) != self.identity,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
            Err(source) => {
                return Err(SinkError::File {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        if rotated {
            let (file, identity) = open_append(&self.path)?;
            tracing::debug!(path = %self.path.display(), "log file rotated, reopened");
            self.file = file;
            self.identity = identity;
        }
        Ok(())
    }
}

fn open_append(path: &Path) -> Result<(File, Option<FileIdentity>), SinkError> {
    let file_err = |source| SinkError::File {
        path: path.to_path_buf(),
        source,
    };
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(file_err)?;
    let meta = file.metadata().map_err(file_err)?;
    Ok((file, identity(&meta)))
}

/// Create `dir` if needed and make it world-writable (0777).
fn prepare_dir(dir: &Path) -> Result<(), SinkError> {
    std::fs::create_dir_all(dir).map_err(|source| SinkError::Dir {
        path: dir.to_path_buf(),
        source,
    })?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o777)) {
            tracing::warn!(dir = %dir.display(), error = %e, "cannot make log dir world-writable");
        }
    }
    Ok(())
}

/// Open the appender for `topic` under `base_dir`: `<base_dir>/<topic>.log`.
pub fn open_appender(topic: &Topic, base_dir: &Path) -> Result<WatchedFile, SinkError> {
    prepare_dir(base_dir)?;
    WatchedFile::open(base_dir.join(topic.file_name()))
}

// ═══════════════════════════════════════════════════════════════
//  LogHandle / LogSink
// ═══════════════════════════════════════════════════════════════

/// The open log of one topic. Lives until the sink is dropped.
#[derive(Debug)]
pub struct LogHandle {
    topic: Topic,
    file: Mutex<WatchedFile>,
}

impl LogHandle {
    fn new(topic: Topic, file: WatchedFile) -> Self {
        Self {
            topic,
            file: Mutex::new(file),
        }
    }

    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    pub fn path(&self) -> PathBuf {
        self.lock().path().to_path_buf()
    }

    pub fn append(&self, line: &str) -> Result<(), SinkError> {
        self.lock().append(line)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, WatchedFile> {
        self.file.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Per-topic log files under one directory, opened lazily and memoized.
///
/// A receiver is the only writer of its sink; the background-thread strategy
/// writes from a spawned task, hence the mutex.
#[derive(Debug)]
pub struct LogSink {
    base_dir: PathBuf,
    handles: Mutex<HashMap<Topic, Arc<LogHandle>>>,
}

impl LogSink {
    pub fn new(base_dir: impl Into<PathBuf>) -> Result<Self, SinkError> {
        let base_dir = base_dir.into();
        prepare_dir(&base_dir)?;
        Ok(Self {
            base_dir,
            handles: Mutex::new(HashMap::new()),
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Handle for `topic`, opening `<base_dir>/<topic>.log` on first use.
    pub fn writer(&self, topic: &Topic) -> Result<Arc<LogHandle>, SinkError> {
        let mut handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = handles.get(topic) {
            return Ok(Arc::clone(handle));
        }

        let file = open_appender(topic, &self.base_dir)?;
        tracing::info!(topic = %topic, path = %file.path().display(), "opened topic log");
        let handle = Arc::new(LogHandle::new(topic.clone(), file));
        handles.insert(topic.clone(), Arc::clone(&handle));
        Ok(handle)
    }

    pub fn append(&self, topic: &Topic, line: &str) -> Result<(), SinkError> {
        self.writer(topic)?.append(line)
    }

    /// Topics with an open log, sorted.
    pub fn topics(&self) -> Vec<Topic> {
        let handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
        let mut topics: Vec<Topic> = handles.keys().cloned().collect();
        topics.sort();
        topics
    }
}
