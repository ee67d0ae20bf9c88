//! # Byte Source
//!
//! Where raw unit and resource bytes come from: an ordered list of
//! [`Origin`]s (the search path), searched first-to-last, with positive and
//! negative caches for unit bytes.
//!
//! ## Reserved Names
//!
//! Un-namespaced units whose names collide with host device names (`CON`,
//! `AUX`, `LPT1`, ...) cannot exist as files everywhere. For those, the
//! `_`-prefixed alias is tried first and its bytes are cached under the
//! requested name.

use crate::primitives::{RESERVED_ALIAS_PREFIX, RESERVED_NAMES};
use crate::{CodeSource, LoaderError, UnitName};
use dashmap::{DashMap, DashSet};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

// =============================================================================
// ORIGINS
// =============================================================================

/// One entry of the search path.
pub trait Origin: Send + Sync + std::fmt::Debug {
    /// Human-readable location, reported as provenance.
    fn location(&self) -> &str;

    /// Read the entry at the slash-separated `path`, if present.
    fn read(&self, path: &str) -> Result<Option<Vec<u8>>, LoaderError>;

    /// Signer identities for the entry at `path`.
    fn signers(&self, _path: &str) -> Vec<String> {
        Vec::new()
    }
}

/// A directory on the host filesystem.
#[derive(Debug, Clone)]
pub struct DirectoryOrigin {
    root: PathBuf,
    location: String,
}

impl DirectoryOrigin {
    /// Serve entries below `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let location = root.display().to_string();
        Self { root, location }
    }

    /// The directory served.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Only plain relative components; anything that could escape the root is
/// treated as absent.
fn is_contained(path: &str) -> bool {
    !path.is_empty()
        && Path::new(path)
            .components()
            .all(|component| matches!(component, Component::Normal(_)))
}

impl Origin for DirectoryOrigin {
    fn location(&self) -> &str {
        &self.location
    }

    fn read(&self, path: &str) -> Result<Option<Vec<u8>>, LoaderError> {
        if !is_contained(path) {
            return Ok(None);
        }
        let full = self.root.join(path);
        if !full.is_file() {
            return Ok(None);
        }
        std::fs::read(&full)
            .map(Some)
            .map_err(|e| LoaderError::IoError(format!("Cannot read {}: {}", full.display(), e)))
    }
}

/// An in-process origin holding entries in memory.
///
/// Used for units generated at startup and for tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryOrigin {
    location: String,
    entries: BTreeMap<String, Vec<u8>>,
    signers: Vec<String>,
}

impl MemoryOrigin {
    /// An empty origin reported under `location`.
    #[must_use]
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            ..Self::default()
        }
    }

    /// Add an entry at `path`.
    #[must_use]
    pub fn with_entry(mut self, path: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.entries.insert(path.into(), bytes.into());
        self
    }

    /// Add the backing entry of a unit.
    #[must_use]
    pub fn with_unit(self, name: &str, bytes: impl Into<Vec<u8>>) -> Self {
        let path = UnitName::new(name).to_resource_path();
        self.with_entry(path, bytes)
    }

    /// Report `signer` for every entry.
    #[must_use]
    pub fn signed_by(mut self, signer: impl Into<String>) -> Self {
        self.signers.push(signer.into());
        self
    }
}

impl Origin for MemoryOrigin {
    fn location(&self) -> &str {
        &self.location
    }

    fn read(&self, path: &str) -> Result<Option<Vec<u8>>, LoaderError> {
        Ok(self.entries.get(path).cloned())
    }

    fn signers(&self, path: &str) -> Vec<String> {
        if self.entries.contains_key(path) {
            self.signers.clone()
        } else {
            Vec::new()
        }
    }
}

// =============================================================================
// LOCATED BYTES
// =============================================================================

/// Bytes found in the search path, with the origin that provided them.
#[derive(Debug, Clone)]
pub struct Located {
    /// The entry contents.
    pub bytes: Arc<[u8]>,
    /// The origin the entry was read from.
    pub origin: Arc<dyn Origin>,
    /// The entry path inside the origin.
    pub path: String,
}

impl Located {
    /// Provenance of these bytes.
    #[must_use]
    pub fn code_source(&self) -> CodeSource {
        CodeSource {
            location: self.origin.location().to_string(),
            signers: self.origin.signers(&self.path),
        }
    }
}

// =============================================================================
// BYTE SOURCE
// =============================================================================

/// The search path plus unit byte caches.
#[derive(Debug, Default)]
pub struct ByteSource {
    origins: RwLock<Vec<Arc<dyn Origin>>>,
    positive: DashMap<String, Located>,
    negative: DashSet<String>,
    trace: bool,
}

impl ByteSource {
    /// A byte source searching `origins` in order.
    #[must_use]
    pub fn new(origins: Vec<Arc<dyn Origin>>) -> Self {
        Self {
            origins: RwLock::new(origins),
            ..Self::default()
        }
    }

    /// Log every lookup at trace level.
    #[must_use]
    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    /// Append an origin to the end of the search path.
    pub fn add_origin(&self, origin: Arc<dyn Origin>) {
        tracing::debug!("Added origin {}", origin.location());
        self.origins.write().push(origin);
    }

    /// Locations of the search path, in order.
    #[must_use]
    pub fn locations(&self) -> Vec<String> {
        self.origins
            .read()
            .iter()
            .map(|o| o.location().to_string())
            .collect()
    }

    /// Find the first origin holding `path`.
    ///
    /// Origins that fail to read are logged and skipped.
    pub fn find(&self, path: &str) -> Option<Located> {
        let origins = self.origins.read().clone();
        for origin in origins {
            match origin.read(path) {
                Ok(Some(bytes)) => {
                    return Some(Located {
                        bytes: Arc::from(bytes),
                        origin,
                        path: path.to_string(),
                    });
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!("Problem reading {} from {}: {}", path, origin.location(), e);
                }
            }
        }
        None
    }

    /// Raw bytes backing the unit `name`, cached positively and negatively.
    pub fn unit_bytes(&self, name: &str) -> Option<Located> {
        if self.negative.contains(name) {
            return None;
        }
        if let Some(hit) = self.positive.get(name) {
            return Some(hit.value().clone());
        }

        let unit = UnitName::new(name);
        if !unit.is_namespaced() && is_reserved(name) {
            let alias = format!("{}{}", RESERVED_ALIAS_PREFIX, name);
            if let Some(found) = self.unit_bytes(&alias) {
                self.positive.insert(name.to_string(), found.clone());
                return Some(found);
            }
        }

        let path = unit.to_resource_path();
        match self.find(&path) {
            Some(found) => {
                if self.trace {
                    tracing::trace!("Loading unit {} from origin {}", name, found.origin.location());
                }
                self.positive.insert(name.to_string(), found.clone());
                Some(found)
            }
            None => {
                if self.trace {
                    tracing::trace!("Failed to find unit resource {}", path);
                }
                self.negative.insert(name.to_string());
                None
            }
        }
    }

    /// Raw resource bytes at `path` (uncached).
    pub fn resource_bytes(&self, path: &str) -> Option<Vec<u8>> {
        self.find(path).map(|found| found.bytes.to_vec())
    }

    /// Whether `name` is negatively cached.
    #[must_use]
    pub fn is_negative(&self, name: &str) -> bool {
        self.negative.contains(name)
    }

    /// Forget negative results for the given names.
    pub fn clear_negative<'a, I>(&self, names: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        for name in names {
            self.negative.remove(name);
        }
    }
}

fn is_reserved(name: &str) -> bool {
    let upper = name.to_uppercase();
    RESERVED_NAMES
        .iter()
        .any(|reserved| upper.starts_with(reserved))
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    #[derive(Debug)]
    struct CountingOrigin {
        inner: MemoryOrigin,
        reads: AtomicUsize,
    }

    impl Origin for CountingOrigin {
        fn location(&self) -> &str {
            self.inner.location()
        }

        fn read(&self, path: &str) -> Result<Option<Vec<u8>>, LoaderError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.read(path)
        }
    }

    #[test]
    fn first_origin_wins() {
        let source = ByteSource::new(vec![
            Arc::new(MemoryOrigin::new("first").with_unit("pkg.Foo", vec![1])),
            Arc::new(MemoryOrigin::new("second").with_unit("pkg.Foo", vec![2])),
        ]);
        let found = source.unit_bytes("pkg.Foo").expect("found");
        assert_eq!(&*found.bytes, &[1]);
        assert_eq!(found.code_source().location, "first");
    }

    #[test]
    fn negative_cache_skips_origins() {
        let origin = Arc::new(CountingOrigin {
            inner: MemoryOrigin::new("mem"),
            reads: AtomicUsize::new(0),
        });
        let source = ByteSource::new(vec![origin.clone()]);

        assert!(source.unit_bytes("pkg.Missing").is_none());
        assert!(source.unit_bytes("pkg.Missing").is_none());
        assert_eq!(origin.reads.load(Ordering::SeqCst), 1);

        source.clear_negative(["pkg.Missing"]);
        assert!(!source.is_negative("pkg.Missing"));
        assert!(source.unit_bytes("pkg.Missing").is_none());
        assert_eq!(origin.reads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn reserved_name_uses_alias() {
        let source = ByteSource::new(vec![Arc::new(
            MemoryOrigin::new("mem").with_unit("_Con", vec![7]),
        )]);
        let found = source.unit_bytes("Con").expect("alias found");
        assert_eq!(&*found.bytes, &[7]);
    }

    #[test]
    fn signers_are_reported() {
        let source = ByteSource::new(vec![Arc::new(
            MemoryOrigin::new("signed.jar")
                .with_unit("pkg.Foo", vec![1])
                .signed_by("CN=Build"),
        )]);
        let found = source.unit_bytes("pkg.Foo").expect("found");
        let code_source = found.code_source();
        assert!(code_source.is_signed());
        assert_eq!(code_source.signers, vec!["CN=Build".to_string()]);
    }

    #[test]
    fn directory_origin_reads_files_and_refuses_escape() {
        let temp = tempdir().expect("temp dir");
        std::fs::create_dir_all(temp.path().join("root/pkg")).expect("mkdir");
        std::fs::write(temp.path().join("root/pkg/Foo.unit"), b"foo").expect("write");
        std::fs::write(temp.path().join("secret.txt"), b"secret").expect("write");

        let origin = DirectoryOrigin::new(temp.path().join("root"));
        assert_eq!(
            origin.read("pkg/Foo.unit").expect("read"),
            Some(b"foo".to_vec())
        );
        assert_eq!(origin.read("../secret.txt").expect("read"), None);
        assert_eq!(origin.read("pkg/Missing.unit").expect("read"), None);
    }

    #[test]
    fn late_origin_is_searched() {
        let source = ByteSource::new(Vec::new());
        assert!(source.resource_bytes("a.txt").is_none());
        source.add_origin(Arc::new(MemoryOrigin::new("late").with_entry("a.txt", "x")));
        assert_eq!(source.resource_bytes("a.txt"), Some(b"x".to_vec()));
        assert_eq!(source.locations(), vec!["late".to_string()]);
    }
}
