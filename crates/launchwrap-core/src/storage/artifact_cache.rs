//! # redb-backed Artifact Container
//!
//! The persistent container behind the unit cache: one redb database file
//! holding content-addressed blobs plus a small metadata table.
//!
//! redb provides:
//! - Crash safety (copy-on-write B-trees): a crash loses uncommitted entries,
//!   never the container
//! - MVCC: concurrent readers, serialized writers, so `put_if_absent` is a
//!   single write transaction with no extra locking
//!
//! ## Layout
//!
//! - `blobs`: fixed-width hex checksum → transformed unit bytes
//! - `metadata`: record name → encoded record (the cache index)

use crate::{Checksum, LoaderError};
use redb::{
    Database, DatabaseError, ReadableDatabase, ReadableTable, ReadableTableMetadata,
    TableDefinition,
};
use std::fmt::Display;
use std::path::{Path, PathBuf};

/// Table for blobs: hex checksum -> bytes
const BLOBS: TableDefinition<&str, &[u8]> = TableDefinition::new("blobs");

/// Table for metadata: record name -> encoded record
const METADATA: TableDefinition<&str, &[u8]> = TableDefinition::new("metadata");

fn storage_err(e: impl Display) -> LoaderError {
    LoaderError::IoError(e.to_string())
}

/// A persistent, content-addressed, first-writer-wins blob store.
pub struct ArtifactCache {
    /// The redb database handle.
    db: Database,
    /// Location of the container file.
    path: PathBuf,
}

impl std::fmt::Debug for ArtifactCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactCache")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl ArtifactCache {
    /// Open or create a container at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LoaderError> {
        let path = path.as_ref().to_path_buf();
        let db = Database::create(&path).map_err(|e| match e {
            DatabaseError::DatabaseAlreadyOpen => storage_err(e),
            other => LoaderError::CacheCorrupt(other.to_string()),
        })?;

        // Initialize tables if they don't exist
        {
            let write_txn = db.begin_write().map_err(storage_err)?;
            let _ = write_txn.open_table(BLOBS).map_err(storage_err)?;
            let _ = write_txn.open_table(METADATA).map_err(storage_err)?;
            write_txn.commit().map_err(storage_err)?;
        }

        Ok(Self { db, path })
    }

    /// Open the container, destroying and recreating it if it is unreadable.
    ///
    /// Only a `CacheCorrupt` open failure triggers recreation; a container
    /// already held open elsewhere in the process is reported as-is.
    pub fn open_or_recreate(path: impl AsRef<Path>) -> Result<Self, LoaderError> {
        let path = path.as_ref();
        match Self::open(path) {
            Ok(cache) => Ok(cache),
            Err(LoaderError::CacheCorrupt(reason)) => {
                tracing::warn!(
                    "Failed to read unit cache {}: {}; recreating it empty",
                    path.display(),
                    reason
                );
                std::fs::remove_file(path).map_err(|e| {
                    LoaderError::IoError(format!(
                        "Could not delete corrupt cache {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                Self::open(path)
            }
            Err(e) => Err(e),
        }
    }

    /// Location of the container file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the blob stored under `key`.
    pub fn get(&self, key: Checksum) -> Result<Option<Vec<u8>>, LoaderError> {
        let read_txn = self.db.begin_read().map_err(storage_err)?;
        let table = read_txn.open_table(BLOBS).map_err(storage_err)?;
        let value = table
            .get(key.to_hex().as_str())
            .map_err(storage_err)?
            .map(|guard| guard.value().to_vec());
        Ok(value)
    }

    /// Whether a blob is stored under `key`.
    pub fn contains(&self, key: Checksum) -> Result<bool, LoaderError> {
        let read_txn = self.db.begin_read().map_err(storage_err)?;
        let table = read_txn.open_table(BLOBS).map_err(storage_err)?;
        Ok(table.get(key.to_hex().as_str()).map_err(storage_err)?.is_some())
    }

    /// Store `bytes` under `key` unless something is already stored there.
    ///
    /// Returns `true` if this call wrote the blob. An existing blob is never
    /// overwritten.
    pub fn put_if_absent(&self, key: Checksum, bytes: &[u8]) -> Result<bool, LoaderError> {
        let hex = key.to_hex();
        let write_txn = self.db.begin_write().map_err(storage_err)?;
        let written = {
            let mut table = write_txn.open_table(BLOBS).map_err(storage_err)?;
            if table.get(hex.as_str()).map_err(storage_err)?.is_some() {
                false
            } else {
                table.insert(hex.as_str(), bytes).map_err(storage_err)?;
                true
            }
        };
        if written {
            write_txn.commit().map_err(storage_err)?;
        } else {
            write_txn.abort().map_err(storage_err)?;
        }
        Ok(written)
    }

    /// Number of stored blobs.
    pub fn blob_count(&self) -> Result<u64, LoaderError> {
        let read_txn = self.db.begin_read().map_err(storage_err)?;
        let table = read_txn.open_table(BLOBS).map_err(storage_err)?;
        table.len().map_err(storage_err)
    }

    /// Read a metadata record.
    pub fn read_metadata(&self, key: &str) -> Result<Option<Vec<u8>>, LoaderError> {
        let read_txn = self.db.begin_read().map_err(storage_err)?;
        let table = read_txn.open_table(METADATA).map_err(storage_err)?;
        let value = table
            .get(key)
            .map_err(storage_err)?
            .map(|guard| guard.value().to_vec());
        Ok(value)
    }

    /// Replace a metadata record in a single transaction.
    pub fn write_metadata(&self, key: &str, bytes: &[u8]) -> Result<(), LoaderError> {
        let write_txn = self.db.begin_write().map_err(storage_err)?;
        {
            let mut table = write_txn.open_table(METADATA).map_err(storage_err)?;
            table.insert(key, bytes).map_err(storage_err)?;
        }
        write_txn.commit().map_err(storage_err)?;
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn put_then_get() {
        let temp = tempdir().expect("temp dir");
        let cache = ArtifactCache::open(temp.path().join("cache.redb")).expect("open");

        let key = Checksum::of(&[1, 2, 3]);
        assert!(cache.put_if_absent(key, &[1, 2, 3]).expect("put"));
        assert_eq!(cache.get(key).expect("get"), Some(vec![1, 2, 3]));
        assert!(cache.contains(key).expect("contains"));
        assert_eq!(cache.blob_count().expect("count"), 1);
    }

    #[test]
    fn first_writer_wins() {
        let temp = tempdir().expect("temp dir");
        let cache = ArtifactCache::open(temp.path().join("cache.redb")).expect("open");

        let key = Checksum(42);
        assert!(cache.put_if_absent(key, b"first").expect("put"));
        assert!(!cache.put_if_absent(key, b"second").expect("put"));
        assert_eq!(cache.get(key).expect("get"), Some(b"first".to_vec()));
    }

    #[test]
    fn missing_key_is_none() {
        let temp = tempdir().expect("temp dir");
        let cache = ArtifactCache::open(temp.path().join("cache.redb")).expect("open");
        assert_eq!(cache.get(Checksum(9)).expect("get"), None);
        assert_eq!(cache.read_metadata("nothing").expect("meta"), None);
    }

    #[test]
    fn blobs_and_metadata_survive_reopen() {
        let temp = tempdir().expect("temp dir");
        let path = temp.path().join("cache.redb");

        {
            let cache = ArtifactCache::open(&path).expect("open");
            cache.put_if_absent(Checksum(5), b"blob").expect("put");
            cache.write_metadata("record", b"meta").expect("meta");
        }

        {
            let cache = ArtifactCache::open(&path).expect("reopen");
            assert_eq!(cache.get(Checksum(5)).expect("get"), Some(b"blob".to_vec()));
            assert_eq!(
                cache.read_metadata("record").expect("meta"),
                Some(b"meta".to_vec())
            );
        }
    }

    #[test]
    fn corrupt_container_is_recreated() {
        let temp = tempdir().expect("temp dir");
        let path = temp.path().join("cache.redb");
        std::fs::write(&path, vec![0x5Au8; 8192]).expect("write garbage");

        let cache = ArtifactCache::open_or_recreate(&path).expect("recreate");
        assert_eq!(cache.blob_count().expect("count"), 0);
        assert!(cache.put_if_absent(Checksum(1), b"x").expect("put"));
    }

    #[test]
    fn concurrent_writers_store_one_value() {
        let temp = tempdir().expect("temp dir");
        let cache =
            std::sync::Arc::new(ArtifactCache::open(temp.path().join("c.redb")).expect("open"));

        let handles: Vec<_> = (0..8u8)
            .map(|i| {
                let cache = std::sync::Arc::clone(&cache);
                std::thread::spawn(move || cache.put_if_absent(Checksum(77), &[i]).expect("put"))
            })
            .collect();
        let wins = handles
            .into_iter()
            .map(|h| h.join().expect("join"))
            .filter(|won| *won)
            .count();

        assert_eq!(wins, 1);
        assert_eq!(cache.get(Checksum(77)).expect("get").map(|v| v.len()), Some(1));
    }
}
