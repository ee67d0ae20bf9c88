//! # Loaded Units
//!
//! A [`Unit`] is the instantiated result of a resolution: final bytes, their
//! checksum, where they came from, and the entry function bound to the unit's
//! name in the registry (if any).
//!
//! Units are handed out as `Arc<Unit>`; two resolutions of the same name
//! return pointer-equal handles.

use crate::{Checksum, CodeSource, LoaderError};
use std::sync::Arc;

/// Entry function of a launchable unit, invoked with the final argument list.
pub type EntryFn = Arc<dyn Fn(&Unit, &[String]) -> Result<(), LoaderError> + Send + Sync>;

/// An instantiated unit.
pub struct Unit {
    name: String,
    bytes: Arc<[u8]>,
    checksum: Checksum,
    provenance: Option<CodeSource>,
    entry: Option<EntryFn>,
}

impl std::fmt::Debug for Unit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Unit")
            .field("name", &self.name)
            .field("len", &self.bytes.len())
            .field("checksum", &self.checksum)
            .field("provenance", &self.provenance)
            .field("has_entry", &self.entry.is_some())
            .finish()
    }
}

impl Unit {
    /// Assemble a unit. The checksum is computed from `bytes`.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        bytes: impl Into<Arc<[u8]>>,
        provenance: Option<CodeSource>,
        entry: Option<EntryFn>,
    ) -> Self {
        let bytes = bytes.into();
        Self {
            name: name.into(),
            checksum: Checksum::of(&bytes),
            bytes,
            provenance,
            entry,
        }
    }

    /// The name the unit is defined under.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Final (transformed) bytes.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Checksum of the final bytes.
    #[must_use]
    pub fn checksum(&self) -> Checksum {
        self.checksum
    }

    /// Origin and signers of the backing bytes, when known.
    #[must_use]
    pub fn provenance(&self) -> Option<&CodeSource> {
        self.provenance.as_ref()
    }

    /// Whether the unit can be launched.
    #[must_use]
    pub fn has_entry(&self) -> bool {
        self.entry.is_some()
    }

    /// Call the unit's entry function.
    pub fn invoke(&self, args: &[String]) -> Result<(), LoaderError> {
        match &self.entry {
            Some(entry) => entry(self, args),
            None => Err(LoaderError::NoEntryPoint(self.name.clone())),
        }
    }
}
