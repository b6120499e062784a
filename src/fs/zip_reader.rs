use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufReader, Cursor, Read, Seek};
use std::path::Path;

use zip::result::{ZipError, ZipResult};
use zip::ZipArchive;

use crate::fs::path::TargetKind;

/// Anything a zip archive can be parsed from.
pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

/// A zip archive opened over either in-memory bytes or a local file.
pub type OpenZip = ZipArchive<Box<dyn ReadSeek>>;

/// One row of an archive's entry table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    pub kind: TargetKind,
    pub size: u64,
    pub compressed_size: u64,
    /// Name as stored in the central directory. `None` for directories that
    /// only exist implicitly as a prefix of other entries.
    pub zip_name: Option<String>,
}

/// Normalized entry name (no trailing slash) → entry info, in name order.
pub type EntryTable = BTreeMap<String, EntryInfo>;

/// Parse an archive held in memory.
pub fn open_bytes(bytes: Vec<u8>) -> ZipResult<OpenZip> {
    let reader: Box<dyn ReadSeek> = Box::new(Cursor::new(bytes));
    ZipArchive::new(reader)
}

/// Parse an archive stored on the local disk.
pub fn open_local(path: &Path) -> ZipResult<OpenZip> {
    let file = File::open(path)?;
    let reader: Box<dyn ReadSeek> = Box::new(BufReader::new(file));
    ZipArchive::new(reader)
}

/// Strip `./`, leading slashes and trailing slashes; unify separators.
fn normalize_name(raw: &str) -> String {
    let unified = raw.replace('\\', "/");
    unified
        .trim_start_matches("./")
        .trim_start_matches('/')
        .trim_end_matches('/')
        .to_string()
}

fn last_component(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

/// Parent of a normalized entry name; the archive root is `""`.
pub fn parent_of(name: &str) -> &str {
    match name.rfind('/') {
        Some(idx) => &name[..idx],
        None => "",
    }
}

/// Read the central directory into an entry table.
///
/// Directories that appear only as prefixes of other entries are added so
/// every entry's parent chain is listable.
pub fn read_table<R: Read + Seek>(zip: &mut ZipArchive<R>) -> ZipResult<EntryTable> {
    let mut table = EntryTable::new();
    for i in 0..zip.len() {
        let file = zip.by_index_raw(i)?;
        let raw_name = file.name().to_string();
        let is_dir = file.is_dir() || raw_name.ends_with('/');
        let name = normalize_name(&raw_name);
        if name.is_empty() || name.split('/').any(|c| c.is_empty() || c == "..") {
            continue;
        }

        let kind = if is_dir {
            TargetKind::Directory
        } else {
            TargetKind::for_file_name(last_component(&name))
        };
        let info = EntryInfo {
            kind,
            size: if is_dir { 0 } else { file.size() },
            compressed_size: if is_dir { 0 } else { file.compressed_size() },
            zip_name: Some(raw_name),
        };

        let mut parent = parent_of(&name);
        while !parent.is_empty() {
            table.entry(parent.to_string()).or_insert(EntryInfo {
                kind: TargetKind::Directory,
                size: 0,
                compressed_size: 0,
                zip_name: None,
            });
            parent = parent_of(parent);
        }
        table.insert(name, info);
    }
    Ok(table)
}

/// Decompress at most `limit` bytes of one entry into memory.
/// `Ok(None)` if there is no such entry.
///
/// The buffer grows with the bytes actually produced; the size recorded in
/// the entry header is never trusted for allocation.
pub fn read_entry<R: Read + Seek>(zip: &mut ZipArchive<R>, zip_name: &str, limit: u64) -> ZipResult<Option<Vec<u8>>> {
    let mut file = match zip.by_name(zip_name) {
        Ok(f) => f,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e),
    };
    let mut data = Vec::new();
    file.by_ref().take(limit).read_to_end(&mut data)?;
    Ok(Some(data))
}

/// Stream one entry into `destination`. `Ok(false)` if there is no such entry.
///
/// A partially written file is removed on failure.
pub fn extract_entry<R: Read + Seek>(
    zip: &mut ZipArchive<R>,
    zip_name: &str,
    destination: &Path,
) -> ZipResult<bool> {
    let mut file = match zip.by_name(zip_name) {
        Ok(f) => f,
        Err(ZipError::FileNotFound) => return Ok(false),
        Err(e) => return Err(e),
    };
    let mut out = File::create(destination)?;
    if let Err(e) = io::copy(&mut file, &mut out) {
        drop(out);
        let _ = fs::remove_file(destination);
        return Err(e.into());
    }
    Ok(true)
}
