use std::fmt;
use std::path::Path;

/// File extensions treated as zip archives, compared case-insensitively.
///
/// The same rule applies to backend files and to entries inside archives.
/// Content is validated later when the archive is opened.
pub const ARCHIVE_EXTENSIONS: &[&str] = &["zip", "jar"];

/// What a path points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKind {
    File,
    Directory,
    /// Expandable, but must be opened by the archive store before listing.
    Archive,
}

impl TargetKind {
    /// Whether nodes of this kind can be expanded in the tree.
    pub fn is_directory_like(self) -> bool {
        matches!(self, TargetKind::Directory | TargetKind::Archive)
    }

    /// Classify a non-directory name by its extension.
    pub fn for_file_name(name: &str) -> Self {
        if has_archive_extension(name) {
            TargetKind::Archive
        } else {
            TargetKind::File
        }
    }
}

fn has_archive_extension(name: &str) -> bool {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => ARCHIVE_EXTENSIONS
            .iter()
            .any(|known| known.eq_ignore_ascii_case(ext)),
        _ => false,
    }
}

/// A backend-local path (local disk or remote store).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FsPath {
    path: String,
    is_directory: bool,
    last_component: String,
}

impl FsPath {
    pub fn new(path: impl Into<String>, is_directory: bool, last_component: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            is_directory,
            last_component: last_component.into(),
        }
    }

    /// Build a path for a file or directory on the local disk.
    pub fn from_local(path: &Path, is_directory: bool) -> Self {
        let last_component = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        Self::new(path.to_string_lossy().to_string(), is_directory, last_component)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_directory(&self) -> bool {
        self.is_directory
    }

    pub fn last_component(&self) -> &str {
        &self.last_component
    }

    pub fn target_kind(&self) -> TargetKind {
        if self.is_directory {
            TargetKind::Directory
        } else {
            TargetKind::for_file_name(&self.last_component)
        }
    }
}

impl fmt::Display for FsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

/// An entry inside a zip archive.
///
/// `entry_path` is the slash-separated name inside the archive without a
/// trailing slash, e.g. `dir/b.zip`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArchiveEntryPath {
    archive_path: FsPath,
    entry_path: String,
    target_kind: TargetKind,
    last_component: String,
}

impl ArchiveEntryPath {
    pub fn new(
        archive_path: FsPath,
        entry_path: impl Into<String>,
        target_kind: TargetKind,
        last_component: impl Into<String>,
    ) -> Self {
        Self {
            archive_path,
            entry_path: entry_path.into(),
            target_kind,
            last_component: last_component.into(),
        }
    }

    /// Build an entry path, deriving the last component from the entry name.
    pub fn from_entry(archive_path: FsPath, entry_path: &str, target_kind: TargetKind) -> Self {
        let trimmed = entry_path.trim_end_matches('/');
        let last = trimmed.rsplit('/').next().unwrap_or(trimmed);
        Self::new(archive_path, trimmed, target_kind, last)
    }

    pub fn archive_path(&self) -> &FsPath {
        &self.archive_path
    }

    pub fn entry_path(&self) -> &str {
        &self.entry_path
    }

    pub fn target_kind(&self) -> TargetKind {
        self.target_kind
    }

    pub fn last_component(&self) -> &str {
        &self.last_component
    }
}

impl fmt::Display for ArchiveEntryPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}!/{}", self.archive_path, self.entry_path)
    }
}

/// Any addressable location: a backend path or an entry inside an archive.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VfsPath {
    Fs(FsPath),
    ArchiveEntry(ArchiveEntryPath),
}

impl VfsPath {
    pub fn target_kind(&self) -> TargetKind {
        match self {
            VfsPath::Fs(p) => p.target_kind(),
            VfsPath::ArchiveEntry(p) => p.target_kind(),
        }
    }

    pub fn last_component(&self) -> &str {
        match self {
            VfsPath::Fs(p) => p.last_component(),
            VfsPath::ArchiveEntry(p) => p.last_component(),
        }
    }
}

impl From<FsPath> for VfsPath {
    fn from(path: FsPath) -> Self {
        VfsPath::Fs(path)
    }
}

impl From<ArchiveEntryPath> for VfsPath {
    fn from(path: ArchiveEntryPath) -> Self {
        VfsPath::ArchiveEntry(path)
    }
}

impl fmt::Display for VfsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VfsPath::Fs(p) => p.fmt(f),
            VfsPath::ArchiveEntry(p) => p.fmt(f),
        }
    }
}
