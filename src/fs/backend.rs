use std::fs::{self, File};
use std::io::{self, Read};
use std::path::Path;

use thiserror::Error;

use crate::fs::path::FsPath;

/// Failure of a backend list/read operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("not a directory: {0}")]
    NotADirectory(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{path}: {reason}")]
    Io { path: String, reason: String },
}

impl BackendError {
    /// Map an I/O error on `path` into the backend taxonomy.
    pub fn from_io(path: &str, err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => BackendError::NotFound(path.to_string()),
            _ => BackendError::Io {
                path: path.to_string(),
                reason: err.to_string(),
            },
        }
    }
}

/// The leading bytes of a file plus the file's full length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHead {
    pub bytes: Vec<u8>,
    pub total_len: u64,
}

impl FileHead {
    pub fn is_truncated(&self) -> bool {
        (self.bytes.len() as u64) < self.total_len
    }
}

/// The operations every storage backend supplies.
///
/// Implementations are shared between worker threads, so they must be
/// `Send + Sync`. Calls may block.
pub trait Backend: Send + Sync {
    /// List the direct children of a directory.
    fn list(&self, directory: &FsPath) -> Result<Vec<FsPath>, BackendError>;

    /// Read a whole file into memory.
    fn read_file(&self, path: &FsPath) -> Result<Vec<u8>, BackendError>;

    /// Read at most `limit` bytes from the start of a file.
    fn read_head(&self, path: &FsPath, limit: u64) -> Result<FileHead, BackendError>;
}

/// Backend over the local disk.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalBackend;

impl LocalBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Backend for LocalBackend {
    /// Unreadable entries (permission denied, broken symlinks) are skipped.
    fn list(&self, directory: &FsPath) -> Result<Vec<FsPath>, BackendError> {
        if !directory.is_directory() {
            return Err(BackendError::NotADirectory(directory.path().to_string()));
        }
        let dir = Path::new(directory.path());
        let entries = fs::read_dir(dir).map_err(|e| BackendError::from_io(directory.path(), &e))?;

        let mut children = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(e) => e,
                Err(_) => continue,
            };
            let path = entry.path();
            // Follows symlinks so a link to a directory stays expandable.
            let is_dir = match fs::metadata(&path) {
                Ok(meta) => meta.is_dir(),
                Err(_) => continue,
            };
            children.push(FsPath::from_local(&path, is_dir));
        }
        Ok(children)
    }

    fn read_file(&self, path: &FsPath) -> Result<Vec<u8>, BackendError> {
        if path.path().is_empty() {
            return Err(BackendError::NotFound("<empty path>".into()));
        }
        fs::read(path.path()).map_err(|e| BackendError::from_io(path.path(), &e))
    }

    fn read_head(&self, path: &FsPath, limit: u64) -> Result<FileHead, BackendError> {
        if path.path().is_empty() {
            return Err(BackendError::NotFound("<empty path>".into()));
        }
        let io_failed = |e: io::Error| BackendError::from_io(path.path(), &e);
        let file = File::open(path.path()).map_err(io_failed)?;
        let total_len = file.metadata().map_err(io_failed)?.len();
        let mut bytes = Vec::new();
        file.take(limit).read_to_end(&mut bytes).map_err(io_failed)?;
        Ok(FileHead { bytes, total_len })
    }
}
