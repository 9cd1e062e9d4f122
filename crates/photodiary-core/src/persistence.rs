//! File-backed entry store.
//!
//! `FileStore` keeps every entry in memory and writes a full snapshot to a
//! single file after each mutation. The on-disk format is designed for:
//!
//! - Versioning: Format changes are detected and reported as unusable
//! - Atomic writes: Prevent corruption on crash
//! - Integrity: A checksum over the body detects corruption
//!
//! ## Store File Format
//!
//! ```text
//! [Header: 32 bytes]
//!   - Magic: "PDRY" (4 bytes)
//!   - Version: u32 (4 bytes)
//!   - Flags: u32 (4 bytes) - compression
//!   - Entry count: u64 (8 bytes)
//!   - Reserved: 12 bytes
//!
//! [Body: variable]
//!   - bincode Vec<DiaryEntry>, LZ4 compressed when flagged
//!
//! [Footer: 8 bytes]
//!   - CRC32 checksum of the body: u32
//!   - Magic: "YRDP" (4 bytes)
//! ```

use crate::error::{DiaryError, Result};
use crate::store::EntryStore;
use crate::types::{DiaryEntry, EntryId};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Magic bytes at the start of store files
pub const MAGIC_HEADER: &[u8; 4] = b"PDRY";
/// Magic bytes at the end of store files (reversed)
pub const MAGIC_FOOTER: &[u8; 4] = b"YRDP";
/// Current store format version
pub const STORE_VERSION: u32 = 1;

const HEADER_LEN: usize = 32;
const FOOTER_LEN: usize = 8;
const STORE_FILE: &str = "diary.pdb";

/// Flags for store file format
#[derive(Debug, Clone, Copy)]
struct StoreFlags(u32);

impl StoreFlags {
    const NONE: Self = StoreFlags(0);
    const COMPRESSED_LZ4: Self = StoreFlags(1);

    fn is_compressed(&self) -> bool {
        self.0 & 1 != 0
    }
}

/// Header structure for the store file
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoreHeader {
    magic: [u8; 4],
    version: u32,
    flags: u32,
    entry_count: u64,
    reserved: [u8; 12],
}

impl StoreHeader {
    fn new(entry_count: u64, flags: StoreFlags) -> Self {
        StoreHeader {
            magic: *MAGIC_HEADER,
            version: STORE_VERSION,
            flags: flags.0,
            entry_count,
            reserved: [0; 12],
        }
    }

    fn validate(&self) -> Result<()> {
        if self.magic != *MAGIC_HEADER {
            return Err(DiaryError::StoreCorrupted {
                reason: "Invalid magic bytes in header".to_string(),
            });
        }
        if self.version != STORE_VERSION {
            return Err(DiaryError::StoreVersionMismatch {
                found: self.version,
                expected: STORE_VERSION,
            });
        }
        Ok(())
    }
}

/// Persisted entry store backed by a single snapshot file.
///
/// ## Example
///
/// ```rust,no_run
/// use photodiary_core::{EntryStore, FileStore};
///
/// let store = FileStore::open("./data")?;
/// println!("{} entries", store.count()?);
/// # Ok::<(), photodiary_core::DiaryError>(())
/// ```
pub struct FileStore {
    /// Directory holding the store file
    base_dir: PathBuf,

    /// Whether to compress the body when saving
    use_compression: bool,

    /// Live contents, mirrored to disk on every mutation
    entries: RwLock<HashMap<EntryId, DiaryEntry>>,
}

impl FileStore {
    /// Open the store in `base_dir`, loading the existing file if present.
    ///
    /// A missing file opens an empty store; the file is created on first write.
    pub fn open(base_dir: impl AsRef<Path>) -> Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        let path = base_dir.join(STORE_FILE);

        let entries = if path.exists() {
            load_entries(&path)?
        } else {
            debug!(path = %path.display(), "Store file not found, starting empty");
            HashMap::new()
        };

        info!(
            path = %path.display(),
            entries = entries.len(),
            "Entry store opened"
        );

        Ok(FileStore {
            base_dir,
            use_compression: true,
            entries: RwLock::new(entries),
        })
    }

    /// Open the store, moving an unusable file aside and starting empty.
    ///
    /// Only errors whose `requires_recreate()` is true trigger recreation;
    /// anything else is returned unchanged.
    pub fn open_or_recreate(base_dir: impl AsRef<Path>) -> Result<Self> {
        let base_dir = base_dir.as_ref();
        match Self::open(base_dir) {
            Ok(store) => Ok(store),
            Err(e) if e.requires_recreate() => {
                let path = base_dir.join(STORE_FILE);
                let backup = backup_path_for(&path);
                warn!(
                    error = %e,
                    backup = %backup.display(),
                    "Store unusable, moving it aside and recreating"
                );
                let _ = fs::remove_file(&backup);
                fs::rename(&path, &backup).map_err(|err| DiaryError::storage("recreate", err))?;
                Self::open(base_dir)
            }
            Err(e) => Err(e),
        }
    }

    /// Set whether to use compression when saving.
    pub fn with_compression(mut self, compress: bool) -> Self {
        self.use_compression = compress;
        self
    }

    /// Get the path to the store file.
    pub fn store_path(&self) -> PathBuf {
        self.base_dir.join(STORE_FILE)
    }

    /// Get the path a broken store file is moved to by `open_or_recreate`.
    pub fn backup_path(&self) -> PathBuf {
        backup_path_for(&self.store_path())
    }

    /// Get the path to a temporary file during save.
    fn temp_path(&self) -> PathBuf {
        self.base_dir.join(format!("{}.tmp", STORE_FILE))
    }

    /// Check if a store file exists on disk.
    pub fn exists(&self) -> bool {
        self.store_path().exists()
    }

    /// Delete all stored data, on disk and in memory.
    pub fn clear(&self) -> Result<()> {
        let mut entries = self.entries.write();
        for path in [self.store_path(), self.backup_path(), self.temp_path()] {
            if path.exists() {
                fs::remove_file(&path).map_err(|e| DiaryError::storage("clear", e))?;
            }
        }
        entries.clear();
        Ok(())
    }

    /// Write a full snapshot of `entries`.
    ///
    /// Uses atomic write (write to temp, then rename) to prevent corruption.
    fn save(&self, entries: &HashMap<EntryId, DiaryEntry>) -> Result<()> {
        fs::create_dir_all(&self.base_dir).map_err(|e| DiaryError::storage("save", e))?;

        let records: Vec<&DiaryEntry> = entries.values().collect();
        let body = bincode::serialize(&records)
            .map_err(|e| DiaryError::storage("encode", e))?;
        let (flags, body) = if self.use_compression {
            (
                StoreFlags::COMPRESSED_LZ4,
                lz4_flex::compress_prepend_size(&body),
            )
        } else {
            (StoreFlags::NONE, body)
        };

        let header = StoreHeader::new(records.len() as u64, flags);
        let header_bytes =
            bincode::serialize(&header).map_err(|e| DiaryError::storage("encode", e))?;
        let checksum = crc32fast::hash(&body);

        let temp_path = self.temp_path();
        let write = || -> std::io::Result<()> {
            let file = File::create(&temp_path)?;
            let mut writer = BufWriter::new(file);
            writer.write_all(&header_bytes)?;
            writer.write_all(&body)?;
            writer.write_all(&checksum.to_le_bytes())?;
            writer.write_all(MAGIC_FOOTER)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
            Ok(())
        };
        write().map_err(|e| DiaryError::storage("save", e))?;

        fs::rename(&temp_path, self.store_path()).map_err(|e| DiaryError::storage("save", e))?;

        debug!(
            entries = records.len(),
            compressed = flags.is_compressed(),
            "Store saved"
        );
        Ok(())
    }
}

impl EntryStore for FileStore {
    fn get(&self, id: &EntryId) -> Result<Option<DiaryEntry>> {
        Ok(self.entries.read().get(id).cloned())
    }

    fn put(&self, id: &EntryId, entry: &DiaryEntry) -> Result<()> {
        let mut entries = self.entries.write();
        let previous = entries.insert(*id, entry.clone());
        if let Err(e) = self.save(&entries) {
            // Keep memory in step with the last good snapshot
            match previous {
                Some(prev) => entries.insert(*id, prev),
                None => entries.remove(id),
            };
            return Err(e);
        }
        Ok(())
    }

    fn delete(&self, id: &EntryId) -> Result<()> {
        let mut entries = self.entries.write();
        let Some(previous) = entries.remove(id) else {
            return Ok(());
        };
        if let Err(e) = self.save(&entries) {
            entries.insert(*id, previous);
            return Err(e);
        }
        Ok(())
    }

    fn values(&self) -> Result<Vec<DiaryEntry>> {
        Ok(self.entries.read().values().cloned().collect())
    }

    fn count(&self) -> Result<usize> {
        Ok(self.entries.read().len())
    }

    fn name(&self) -> &'static str {
        "file"
    }
}

impl std::fmt::Debug for FileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStore")
            .field("path", &self.store_path())
            .field("entries", &self.entries.read().len())
            .finish()
    }
}

fn backup_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".bak");
    PathBuf::from(name)
}

/// Read and validate a store file.
fn load_entries(path: &Path) -> Result<HashMap<EntryId, DiaryEntry>> {
    info!(path = %path.display(), "Loading entry store");

    let data = fs::read(path).map_err(|e| DiaryError::storage("load", e))?;
    if data.len() < HEADER_LEN + FOOTER_LEN {
        return Err(DiaryError::StoreCorrupted {
            reason: format!("File too short: {} bytes", data.len()),
        });
    }

    let header: StoreHeader =
        bincode::deserialize(&data[..HEADER_LEN]).map_err(|e| DiaryError::StoreCorrupted {
            reason: format!("Unreadable header: {}", e),
        })?;
    header.validate()?;
    let flags = StoreFlags(header.flags);

    let body = &data[HEADER_LEN..data.len() - FOOTER_LEN];
    let footer = &data[data.len() - FOOTER_LEN..];

    if &footer[4..8] != MAGIC_FOOTER {
        return Err(DiaryError::StoreCorrupted {
            reason: "Invalid footer magic bytes".to_string(),
        });
    }

    let stored_checksum = u32::from_le_bytes([footer[0], footer[1], footer[2], footer[3]]);
    let computed_checksum = crc32fast::hash(body);
    if stored_checksum != computed_checksum {
        return Err(DiaryError::StoreCorrupted {
            reason: format!(
                "Checksum mismatch: expected {:08x}, got {:08x}",
                stored_checksum, computed_checksum
            ),
        });
    }

    let decompressed;
    let body = if flags.is_compressed() {
        decompressed =
            lz4_flex::decompress_size_prepended(body).map_err(|e| DiaryError::StoreUnusable {
                reason: format!("Decompression failed: {}", e),
            })?;
        &decompressed[..]
    } else {
        body
    };

    let records: Vec<DiaryEntry> =
        bincode::deserialize(body).map_err(|e| DiaryError::StoreUnusable {
            reason: format!("Deserialization failed: {}", e),
        })?;

    if records.len() as u64 != header.entry_count {
        return Err(DiaryError::StoreUnusable {
            reason: format!(
                "Entry count mismatch: header says {}, body has {}",
                header.entry_count,
                records.len()
            ),
        });
    }

    Ok(records.into_iter().map(|e| (e.id, e)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::test_support::*;
    use tempfile::TempDir;

    #[test]
    fn test_save_and_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let entry = make_entry(at(2024, 3, 1), "first");

        {
            let store = FileStore::open(temp_dir.path()).unwrap();
            assert!(!store.exists());
            store.put(&entry.id, &entry).unwrap();
            assert!(store.exists());
        }

        let reopened = FileStore::open(temp_dir.path()).unwrap();
        assert_eq!(reopened.count().unwrap(), 1);
        assert_eq!(reopened.get(&entry.id).unwrap(), Some(entry));
    }

    #[test]
    fn test_save_and_reopen_uncompressed() {
        let temp_dir = TempDir::new().unwrap();
        let entry = make_entry(at(2024, 3, 1), "plain");

        let store = FileStore::open(temp_dir.path())
            .unwrap()
            .with_compression(false);
        store.put(&entry.id, &entry).unwrap();

        let reopened = FileStore::open(temp_dir.path()).unwrap();
        assert_eq!(reopened.get(&entry.id).unwrap(), Some(entry));
    }

    #[test]
    fn test_delete_persists() {
        let temp_dir = TempDir::new().unwrap();
        let a = make_entry(at(2024, 3, 1), "a");
        let b = make_entry(at(2024, 3, 2), "b");

        let store = FileStore::open(temp_dir.path()).unwrap();
        store.put(&a.id, &a).unwrap();
        store.put(&b.id, &b).unwrap();
        store.delete(&a.id).unwrap();

        let reopened = FileStore::open(temp_dir.path()).unwrap();
        assert_eq!(reopened.count().unwrap(), 1);
        assert!(reopened.get(&a.id).unwrap().is_none());
    }

    #[test]
    fn test_corrupted_store() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join(STORE_FILE), b"not a valid store file at all, really").unwrap();

        let err = FileStore::open(temp_dir.path()).unwrap_err();
        assert!(err.requires_recreate());
    }

    #[test]
    fn test_checksum_mismatch_detected() {
        let temp_dir = TempDir::new().unwrap();
        let entry = make_entry(at(2024, 3, 1), "checksum");
        FileStore::open(temp_dir.path())
            .unwrap()
            .put(&entry.id, &entry)
            .unwrap();

        let path = temp_dir.path().join(STORE_FILE);
        let mut bytes = fs::read(&path).unwrap();
        bytes[HEADER_LEN] ^= 0xff;
        fs::write(&path, bytes).unwrap();

        let err = FileStore::open(temp_dir.path()).unwrap_err();
        assert!(matches!(err, DiaryError::StoreCorrupted { .. }));
    }

    #[test]
    fn test_version_mismatch_requires_recreate() {
        let temp_dir = TempDir::new().unwrap();
        let entry = make_entry(at(2024, 3, 1), "old");
        FileStore::open(temp_dir.path())
            .unwrap()
            .put(&entry.id, &entry)
            .unwrap();

        let path = temp_dir.path().join(STORE_FILE);
        let mut bytes = fs::read(&path).unwrap();
        bytes[4..8].copy_from_slice(&(STORE_VERSION + 1).to_le_bytes());
        fs::write(&path, bytes).unwrap();

        let err = FileStore::open(temp_dir.path()).unwrap_err();
        assert!(matches!(err, DiaryError::StoreVersionMismatch { .. }));
        assert!(err.requires_recreate());
    }

    #[test]
    fn test_open_or_recreate_moves_bad_file_aside() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(STORE_FILE);
        fs::write(&path, vec![0u8; 64]).unwrap();

        let store = FileStore::open_or_recreate(temp_dir.path()).unwrap();
        assert_eq!(store.count().unwrap(), 0);
        assert!(!path.exists());
        assert!(backup_path_for(&path).exists());
    }

    #[test]
    fn test_clear() {
        let temp_dir = TempDir::new().unwrap();
        let entry = make_entry(at(2024, 3, 1), "gone");
        let store = FileStore::open(temp_dir.path()).unwrap();
        store.put(&entry.id, &entry).unwrap();

        store.clear().unwrap();
        assert!(!store.exists());
        assert_eq!(store.count().unwrap(), 0);
    }
}
