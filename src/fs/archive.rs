//! Archive virtualization: a per-archive cache of parsed entry tables plus
//! lazy extraction of nested archives into a scratch directory.
//!
//! Top-level archives live in some backend and are always read through it.
//! A nested archive is extracted once into the scratch cache and from then on
//! opened straight from the local disk, so one zip parser serves every depth.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use moka::sync::Cache;
use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::fs::backend::{Backend, FileHead};
use crate::fs::path::{ArchiveEntryPath, FsPath, TargetKind};
use crate::fs::zip_reader::{self, EntryInfo, EntryTable, OpenZip};

/// Default name prefix of the scratch cache directory.
pub const DEFAULT_CACHE_PREFIX: &str = "ArchiveCache";
const SUB_ARCHIVE_PREFIX: &str = "SubArchive";

/// Archive store failures.
///
/// Cloneable so one failed open can be handed to every waiting caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArchiveError {
    #[error("not a zip archive: {0}")]
    NotAnArchive(String),

    #[error("failed to open archive {path}: {reason}")]
    Open { path: String, reason: String },

    #[error("archive is not open: {0}")]
    NotOpened(String),

    #[error("not a directory inside archive: {0}")]
    NotADirectory(String),

    #[error("zip entry not found - {0}")]
    EntryNotFound(String),

    #[error("failed to extract {entry}: {reason}")]
    Extraction { entry: String, reason: String },

    #[error("failed to read {entry}: {reason}")]
    Read { entry: String, reason: String },
}

impl ArchiveError {
    /// Missing entries are an expected outcome, not a fault.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ArchiveError::EntryNotFound(_))
    }
}

/// A parsed archive.
#[derive(Debug)]
pub struct ArchiveHandle {
    archive_path: FsPath,
    is_top_level: bool,
    table: EntryTable,
}

impl ArchiveHandle {
    pub fn archive_path(&self) -> &FsPath {
        &self.archive_path
    }

    /// True if the archive must be read through its backend; false if it was
    /// extracted into the local scratch cache.
    pub fn is_top_level(&self) -> bool {
        self.is_top_level
    }

    pub fn entry(&self, entry_path: &str) -> Option<&EntryInfo> {
        self.table.get(entry_path)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Direct children of the archive root.
    pub fn list_root(&self) -> Vec<ArchiveEntryPath> {
        self.children_of("")
    }

    /// Direct children of a directory entry.
    pub fn list_children(&self, entry: &ArchiveEntryPath) -> Result<Vec<ArchiveEntryPath>, ArchiveError> {
        if entry.target_kind() != TargetKind::Directory {
            return Err(ArchiveError::NotADirectory(entry.to_string()));
        }
        match self.table.get(entry.entry_path()) {
            Some(info) if info.kind == TargetKind::Directory => Ok(self.children_of(entry.entry_path())),
            Some(_) => Err(ArchiveError::NotADirectory(entry.to_string())),
            None => Err(ArchiveError::EntryNotFound(entry.to_string())),
        }
    }

    fn children_of(&self, prefix: &str) -> Vec<ArchiveEntryPath> {
        self.table
            .iter()
            .filter(|(name, _)| zip_reader::parent_of(name) == prefix)
            .map(|(name, info)| ArchiveEntryPath::from_entry(self.archive_path.clone(), name, info.kind))
            .collect()
    }
}

/// Cache of opened archives keyed by archive path, plus the scratch directory
/// holding extracted sub-archives.
///
/// Opening and extraction are single-flight: concurrent requests for the same
/// key run one computation and share its outcome.
pub struct ArchiveStore {
    archives: Cache<FsPath, Arc<ArchiveHandle>>,
    extracted: Cache<ArchiveEntryPath, FsPath>,
    cache_dir: PathBuf,
    scratch: Mutex<Option<TempDir>>,
    next_extraction: AtomicU64,
}

impl ArchiveStore {
    /// Create the store and its scratch directory under the system temp dir.
    pub fn new(cache_prefix: &str) -> std::io::Result<Self> {
        let scratch = tempfile::Builder::new().prefix(cache_prefix).tempdir()?;
        let cache_dir = scratch.path().to_path_buf();
        debug!(cache_dir = %cache_dir.display(), "created archive cache directory");
        Ok(Self {
            archives: Cache::builder().build(),
            extracted: Cache::builder().build(),
            cache_dir,
            scratch: Mutex::new(Some(scratch)),
            next_extraction: AtomicU64::new(0),
        })
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// The already opened archive at `archive_path`, if any.
    pub fn handle(&self, archive_path: &FsPath) -> Option<Arc<ArchiveHandle>> {
        self.archives.get(archive_path)
    }

    /// Return the cached handle for a top-level archive, opening it through
    /// `backend` on first use.
    pub fn open_or_get(&self, archive_path: &FsPath, backend: &dyn Backend) -> Result<Arc<ArchiveHandle>, ArchiveError> {
        if archive_path.target_kind() != TargetKind::Archive {
            return Err(ArchiveError::NotAnArchive(archive_path.to_string()));
        }
        self.open_with(archive_path, true, backend)
    }

    /// Open (or reuse) a top-level archive and list its root.
    pub fn list_archive(&self, archive_path: &FsPath, backend: &dyn Backend) -> Result<Vec<ArchiveEntryPath>, ArchiveError> {
        let handle = self.open_or_get(archive_path, backend)?;
        Ok(self.list_root(&handle))
    }

    /// Direct children of an opened archive's root.
    pub fn list_root(&self, handle: &ArchiveHandle) -> Vec<ArchiveEntryPath> {
        handle.list_root()
    }

    pub fn list_children(&self, handle: &ArchiveHandle, entry: &ArchiveEntryPath) -> Result<Vec<ArchiveEntryPath>, ArchiveError> {
        handle.list_children(entry)
    }

    /// List a directory-like entry of an already opened archive: a directory
    /// is listed in place, a nested archive is extracted and opened.
    pub fn list_entry(&self, entry: &ArchiveEntryPath, backend: &dyn Backend) -> Result<Vec<ArchiveEntryPath>, ArchiveError> {
        match entry.target_kind() {
            TargetKind::Directory => {
                let handle = self
                    .handle(entry.archive_path())
                    .ok_or_else(|| ArchiveError::NotOpened(entry.archive_path().to_string()))?;
                self.list_children(&handle, entry)
            }
            TargetKind::Archive => self.list_nested_archive(entry, backend),
            TargetKind::File => Err(ArchiveError::NotADirectory(entry.to_string())),
        }
    }

    /// Extract a nested archive into the scratch cache (once per entry), open
    /// it as a local archive and list its root.
    pub fn list_nested_archive(&self, entry: &ArchiveEntryPath, backend: &dyn Backend) -> Result<Vec<ArchiveEntryPath>, ArchiveError> {
        if entry.target_kind() != TargetKind::Archive {
            return Err(ArchiveError::NotAnArchive(entry.to_string()));
        }
        let parent = self
            .handle(entry.archive_path())
            .ok_or_else(|| ArchiveError::NotOpened(entry.archive_path().to_string()))?;

        let sub_archive = self
            .extracted
            .try_get_with(entry.clone(), || self.extract_sub_archive(&parent, entry, backend))
            .map_err(|e| (*e).clone())?;
        let handle = self.open_with(&sub_archive, false, backend)?;
        Ok(self.list_root(&handle))
    }

    /// At most `limit` decompressed bytes of a file entry.
    ///
    /// Missing entries yield [`ArchiveError::EntryNotFound`]; everything else
    /// is an I/O or format failure. The reported total length only falls back
    /// to the header's size when the read was cut off at `limit`.
    pub fn read_entry(&self, entry: &ArchiveEntryPath, backend: &dyn Backend, limit: u64) -> Result<FileHead, ArchiveError> {
        let handle = self
            .handle(entry.archive_path())
            .ok_or_else(|| ArchiveError::NotOpened(entry.archive_path().to_string()))?;
        let (zip_name, header_size) = match handle.entry(entry.entry_path()) {
            Some(EntryInfo {
                kind: TargetKind::File | TargetKind::Archive,
                zip_name: Some(name),
                size,
                ..
            }) => (name.clone(), *size),
            _ => return Err(ArchiveError::EntryNotFound(entry.to_string())),
        };

        let mut zip = self.reopen(&handle, backend)?;
        let read_failed = |reason: String| ArchiveError::Read {
            entry: entry.to_string(),
            reason,
        };
        match zip_reader::read_entry(&mut zip, &zip_name, limit) {
            Ok(Some(bytes)) => {
                let read = bytes.len() as u64;
                let total_len = if read < limit { read } else { header_size.max(read) };
                Ok(FileHead { bytes, total_len })
            }
            Ok(None) => Err(ArchiveError::EntryNotFound(entry.to_string())),
            Err(e) => {
                error!(entry = %entry, error = %e, "failed to read zip entry");
                Err(read_failed(e.to_string()))
            }
        }
    }

    /// Forget every opened archive and delete the scratch cache.
    ///
    /// Cleanup is best effort; failures are logged and otherwise ignored.
    pub fn dispose(&self) {
        self.archives.invalidate_all();
        self.extracted.invalidate_all();
        let scratch = match self.scratch.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(dir) = scratch {
            if let Err(e) = dir.close() {
                warn!(cache_dir = %self.cache_dir.display(), error = %e, "failed to clear archive cache");
            }
        }
    }

    fn open_with(&self, archive_path: &FsPath, is_top_level: bool, backend: &dyn Backend) -> Result<Arc<ArchiveHandle>, ArchiveError> {
        self.archives
            .try_get_with(archive_path.clone(), || {
                self.make_handle(archive_path, is_top_level, backend).map(Arc::new)
            })
            .map_err(|e| (*e).clone())
    }

    fn make_handle(&self, archive_path: &FsPath, is_top_level: bool, backend: &dyn Backend) -> Result<ArchiveHandle, ArchiveError> {
        let open_failed = |reason: String| ArchiveError::Open {
            path: archive_path.to_string(),
            reason,
        };
        let mut zip = if is_top_level {
            // Only the backend knows where a top-level archive lives.
            let bytes = backend
                .read_file(archive_path)
                .map_err(|e| open_failed(e.to_string()))?;
            zip_reader::open_bytes(bytes)
        } else {
            zip_reader::open_local(Path::new(archive_path.path()))
        }
        .map_err(|e| open_failed(e.to_string()))?;

        let table = zip_reader::read_table(&mut zip).map_err(|e| open_failed(e.to_string()))?;
        info!(
            archive = %archive_path,
            entries = table.len(),
            top_level = is_top_level,
            "opened archive"
        );
        Ok(ArchiveHandle {
            archive_path: archive_path.clone(),
            is_top_level,
            table,
        })
    }

    fn reopen(&self, handle: &ArchiveHandle, backend: &dyn Backend) -> Result<OpenZip, ArchiveError> {
        let path = handle.archive_path();
        let open_failed = |reason: String| ArchiveError::Open {
            path: path.to_string(),
            reason,
        };
        if handle.is_top_level() {
            let bytes = backend.read_file(path).map_err(|e| open_failed(e.to_string()))?;
            zip_reader::open_bytes(bytes).map_err(|e| open_failed(e.to_string()))
        } else {
            zip_reader::open_local(Path::new(path.path())).map_err(|e| open_failed(e.to_string()))
        }
    }

    fn extract_sub_archive(&self, parent: &ArchiveHandle, entry: &ArchiveEntryPath, backend: &dyn Backend) -> Result<FsPath, ArchiveError> {
        let extraction_failed = |reason: String| ArchiveError::Extraction {
            entry: entry.to_string(),
            reason,
        };
        let zip_name = parent
            .entry(entry.entry_path())
            .and_then(|info| info.zip_name.clone())
            .ok_or_else(|| ArchiveError::EntryNotFound(entry.to_string()))?;

        let seq = self.next_extraction.fetch_add(1, Ordering::Relaxed);
        let directory = self.cache_dir.join(format!("{SUB_ARCHIVE_PREFIX}{seq}"));
        // Fails once the cache directory is gone, i.e. after dispose.
        fs::create_dir(&directory).map_err(|e| extraction_failed(e.to_string()))?;

        let file_name = match entry.last_component() {
            "" | "." | ".." => "archive.zip",
            name => name,
        };
        let destination = directory.join(file_name);

        let mut zip = self.reopen(parent, backend)?;
        let found = zip_reader::extract_entry(&mut zip, &zip_name, &destination).map_err(|e| {
            error!(entry = %entry, error = %e, "failed to extract nested archive");
            extraction_failed(e.to_string())
        })?;
        if !found {
            return Err(ArchiveError::EntryNotFound(entry.to_string()));
        }
        debug!(entry = %entry, destination = %destination.display(), "extracted nested archive");
        Ok(FsPath::from_local(&destination, false))
    }
}
