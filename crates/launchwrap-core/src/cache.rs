//! # Unit Cache
//!
//! The persistent transform cache: an [`ArtifactCache`] container plus the
//! in-memory [`CacheIndex`] mapping original-content checksums to
//! transformed-content checksums.
//!
//! ## Lifecycle
//!
//! 1. `UnitCache::open` opens (or recreates) the container and loads the index
//!    record. A record whose generation fingerprint differs from the current
//!    one is discarded; the blobs it referenced stay in the container.
//! 2. Loads consult and extend the index concurrently.
//! 3. `UnitCache::flush` writes the index back exactly once, at shutdown.
//!    [`ShutdownFlush`] ties that to a scope.

use crate::checksum::Adler32;
use crate::formats::{IndexRecord, index_from_bytes, index_to_bytes};
use crate::primitives::INDEX_RECORD_KEY;
use crate::storage::ArtifactCache;
use crate::{Checksum, LoaderError};
use dashmap::DashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

// =============================================================================
// CACHE INDEX
// =============================================================================

/// Concurrent original → transformed checksum mapping.
///
/// Entries are first-writer-wins: a key, once recorded, keeps its value.
#[derive(Debug, Default)]
pub struct CacheIndex {
    generation: Checksum,
    entries: DashMap<Checksum, Checksum>,
}

impl CacheIndex {
    /// An empty index for the given generation.
    #[must_use]
    pub fn new(generation: Checksum) -> Self {
        Self {
            generation,
            entries: DashMap::new(),
        }
    }

    /// Rebuild from a persisted record, discarding it when the generation
    /// does not match.
    #[must_use]
    pub fn from_record(record: IndexRecord, generation: Checksum) -> Self {
        if record.generation != generation {
            tracing::info!(
                "Cache generation changed, creating new cache index: {} != {}",
                generation,
                record.generation
            );
            return Self::new(generation);
        }
        let index = Self::new(generation);
        for (original, transformed) in record.transformed {
            index.entries.insert(original, transformed);
        }
        index
    }

    /// The generation fingerprint this index belongs to.
    #[must_use]
    pub fn generation(&self) -> Checksum {
        self.generation
    }

    /// Transformed checksum recorded for `original`.
    #[must_use]
    pub fn get(&self, original: Checksum) -> Option<Checksum> {
        self.entries.get(&original).map(|entry| *entry.value())
    }

    /// Record a mapping unless one already exists. Returns `true` if recorded.
    pub fn record(&self, original: Checksum, transformed: Checksum) -> bool {
        let mut inserted = false;
        self.entries.entry(original).or_insert_with(|| {
            inserted = true;
            transformed
        });
        inserted
    }

    /// Number of recorded mappings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no mappings are recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot into the persisted form.
    #[must_use]
    pub fn to_record(&self) -> IndexRecord {
        let mut record = IndexRecord::empty(self.generation);
        for entry in &self.entries {
            record.transformed.insert(*entry.key(), *entry.value());
        }
        record
    }
}

// =============================================================================
// GENERATION FINGERPRINT
// =============================================================================

/// Fingerprint the files directly inside `dir`.
///
/// Files are visited in file-name order and their contents fed to one rolling
/// checksum. A missing directory fingerprints to [`Checksum::EMPTY`].
pub fn generation_fingerprint(dir: &Path) -> Result<Checksum, LoaderError> {
    if !dir.is_dir() {
        return Ok(Checksum::EMPTY);
    }

    let mut files = Vec::new();
    let entries = std::fs::read_dir(dir).map_err(|e| {
        LoaderError::IoError(format!("Cannot list {}: {}", dir.display(), e))
    })?;
    for entry in entries {
        let entry = entry.map_err(|e| LoaderError::IoError(e.to_string()))?;
        let path = entry.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();

    let mut adler = Adler32::new();
    for file in &files {
        let bytes = std::fs::read(file).map_err(|e| {
            LoaderError::IoError(format!("Cannot read {}: {}", file.display(), e))
        })?;
        adler.update(&bytes);
    }
    Ok(adler.finish())
}

// =============================================================================
// UNIT CACHE
// =============================================================================

/// Summary counters of a unit cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Generation fingerprint of the live index.
    pub generation: Checksum,
    /// Number of index mappings.
    pub index_entries: usize,
    /// Number of blobs in the container (including leaked ones).
    pub stored_blobs: u64,
}

/// Persistent container + index, shared by every loader thread.
#[derive(Debug)]
pub struct UnitCache {
    container: ArtifactCache,
    index: CacheIndex,
    flushed: AtomicBool,
}

impl UnitCache {
    /// Open the cache at `path` for the given generation fingerprint.
    ///
    /// An unreadable container is recreated empty; an unreadable index record
    /// is treated as an empty index. Both are logged.
    pub fn open(path: impl AsRef<Path>, generation: Checksum) -> Result<Self, LoaderError> {
        let started = std::time::Instant::now();
        let container = ArtifactCache::open_or_recreate(path)?;

        let index = match container.read_metadata(INDEX_RECORD_KEY) {
            Ok(Some(bytes)) => match index_from_bytes(&bytes) {
                Ok(record) => CacheIndex::from_record(record, generation),
                Err(e) => {
                    tracing::warn!("Failed to read cache index, starting empty: {}", e);
                    CacheIndex::new(generation)
                }
            },
            Ok(None) => CacheIndex::new(generation),
            Err(e) => {
                tracing::warn!("Failed to read cache index, starting empty: {}", e);
                CacheIndex::new(generation)
            }
        };

        tracing::info!(
            "Initialized unit cache at {} ({} entries) in {:?}",
            container.path().display(),
            index.len(),
            started.elapsed()
        );

        Ok(Self {
            container,
            index,
            flushed: AtomicBool::new(false),
        })
    }

    /// The live index.
    #[must_use]
    pub fn index(&self) -> &CacheIndex {
        &self.index
    }

    /// Transformed checksum recorded for `original`.
    #[must_use]
    pub fn lookup(&self, original: Checksum) -> Option<Checksum> {
        self.index.get(original)
    }

    /// Read transformed bytes stored under `transformed`.
    pub fn fetch(&self, transformed: Checksum) -> Result<Option<Vec<u8>>, LoaderError> {
        self.container.get(transformed)
    }

    /// Record a transform outcome.
    ///
    /// The blob is only written when the transform changed the bytes; the
    /// mapping is recorded either way so identity transforms also short-circuit.
    pub fn store(
        &self,
        original: Checksum,
        transformed: Checksum,
        bytes: &[u8],
    ) -> Result<(), LoaderError> {
        if transformed != original {
            self.container.put_if_absent(transformed, bytes)?;
        }
        self.index.record(original, transformed);
        Ok(())
    }

    /// Counters for logging and diagnostics.
    pub fn stats(&self) -> Result<CacheStats, LoaderError> {
        Ok(CacheStats {
            generation: self.index.generation(),
            index_entries: self.index.len(),
            stored_blobs: self.container.blob_count()?,
        })
    }

    /// Persist the index. Only the first call writes; later calls are no-ops.
    pub fn flush(&self) -> Result<(), LoaderError> {
        if self.flushed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let bytes = index_to_bytes(&self.index.to_record())?;
        self.container.write_metadata(INDEX_RECORD_KEY, &bytes)?;
        Ok(())
    }

    /// [`flush`](Self::flush) for shutdown paths: the outcome is logged,
    /// never returned.
    pub fn save(&self) {
        match self.flush() {
            Ok(()) => match self.stats() {
                Ok(stats) => tracing::info!(
                    "Saved caches successfully ({} index entries, {} blobs)",
                    stats.index_entries,
                    stats.stored_blobs
                ),
                Err(_) => tracing::info!("Saved caches successfully"),
            },
            Err(e) => tracing::error!("Failed to save caches: {}", e),
        }
    }
}

/// Flushes a [`UnitCache`] when dropped.
///
/// Hold one for the lifetime of the process; failures are logged, never
/// retried.
#[derive(Debug)]
pub struct ShutdownFlush {
    cache: Arc<UnitCache>,
}

impl ShutdownFlush {
    /// Guard the given cache.
    #[must_use]
    pub fn new(cache: Arc<UnitCache>) -> Self {
        Self { cache }
    }
}

impl Drop for ShutdownFlush {
    fn drop(&mut self) {
        self.cache.save();
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
    fn index_is_first_writer_wins() {
        let index = CacheIndex::new(Checksum(1));
        assert!(index.record(Checksum(10), Checksum(20)));
        assert!(!index.record(Checksum(10), Checksum(30)));
        assert_eq!(index.get(Checksum(10)), Some(Checksum(20)));
    }

    #[test]
    fn stale_generation_discards_record() {
        let mut record = IndexRecord::empty(Checksum(1));
        record.transformed.insert(Checksum(10), Checksum(20));

        let same = CacheIndex::from_record(record.clone(), Checksum(1));
        assert_eq!(same.len(), 1);

        let changed = CacheIndex::from_record(record, Checksum(2));
        assert!(changed.is_empty());
        assert_eq!(changed.generation(), Checksum(2));
    }

    #[test]
    fn index_survives_flush_and_reopen() {
        let temp = tempdir().expect("temp dir");
        let path = temp.path().join("unit_cache.redb");

        {
            let cache = UnitCache::open(&path, Checksum(3)).expect("open");
            cache
                .store(Checksum(10), Checksum(20), b"transformed")
                .expect("store");
            cache.store(Checksum(11), Checksum(11), b"same").expect("store");
            cache.flush().expect("flush");
        }

        let cache = UnitCache::open(&path, Checksum(3)).expect("reopen");
        assert_eq!(cache.lookup(Checksum(10)), Some(Checksum(20)));
        assert_eq!(cache.lookup(Checksum(11)), Some(Checksum(11)));
        assert_eq!(
            cache.fetch(Checksum(20)).expect("fetch"),
            Some(b"transformed".to_vec())
        );
        // identity transforms store no blob
        assert_eq!(cache.fetch(Checksum(11)).expect("fetch"), None);
    }

    #[test]
    fn unflushed_entries_are_lost_but_blobs_remain() {
        let temp = tempdir().expect("temp dir");
        let path = temp.path().join("unit_cache.redb");

        {
            let cache = UnitCache::open(&path, Checksum(3)).expect("open");
            cache.store(Checksum(10), Checksum(20), b"t").expect("store");
        }

        let cache = UnitCache::open(&path, Checksum(3)).expect("reopen");
        assert_eq!(cache.lookup(Checksum(10)), None);
        assert_eq!(cache.stats().expect("stats").stored_blobs, 1);
    }

    #[test]
    fn flush_writes_only_once() {
        let temp = tempdir().expect("temp dir");
        let path = temp.path().join("unit_cache.redb");

        {
            let cache = UnitCache::open(&path, Checksum(3)).expect("open");
            cache.store(Checksum(1), Checksum(2), b"a").expect("store");
            cache.flush().expect("flush");
            cache.store(Checksum(4), Checksum(5), b"b").expect("store");
            cache.flush().expect("second flush is a no-op");
        }

        let cache = UnitCache::open(&path, Checksum(3)).expect("reopen");
        assert_eq!(cache.lookup(Checksum(1)), Some(Checksum(2)));
        assert_eq!(cache.lookup(Checksum(4)), None);
    }

    #[test]
    fn shutdown_guard_flushes_on_drop() {
        let temp = tempdir().expect("temp dir");
        let path = temp.path().join("unit_cache.redb");

        {
            let cache = Arc::new(UnitCache::open(&path, Checksum(8)).expect("open"));
            let _guard = ShutdownFlush::new(Arc::clone(&cache));
            cache.store(Checksum(1), Checksum(2), b"a").expect("store");
        }

        let cache = UnitCache::open(&path, Checksum(8)).expect("reopen");
        assert_eq!(cache.lookup(Checksum(1)), Some(Checksum(2)));
    }

    #[test]
    fn fingerprint_tracks_watched_files() {
        let temp = tempdir().expect("temp dir");
        let watched = temp.path().join("bundles");

        assert_eq!(
            generation_fingerprint(&watched).expect("missing dir"),
            Checksum::EMPTY
        );

        std::fs::create_dir(&watched).expect("mkdir");
        std::fs::write(watched.join("a.bundle"), b"alpha").expect("write");
        let first = generation_fingerprint(&watched).expect("fingerprint");
        assert_eq!(first, generation_fingerprint(&watched).expect("again"));

        std::fs::write(watched.join("b.bundle"), b"beta").expect("write");
        let second = generation_fingerprint(&watched).expect("fingerprint");
        assert_ne!(first, second);
    }
}
