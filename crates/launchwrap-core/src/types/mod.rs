//! # Core Type Definitions
//!
//! This module contains the shared vocabulary of the loader:
//! - Unit naming (`UnitName`)
//! - Provenance of loaded bytes (`CodeSource`)
//! - Error types (`LoaderError`)
//!
//! ## Naming Rules
//!
//! Unit names are dotted hierarchical identifiers (`pkg.sub.Unit`).
//! The backing bytes of a unit live at the slash-separated path of its
//! segments with the unit extension appended (`pkg/sub/Unit.unit`).

use crate::primitives::{NAMESPACE_SEPARATOR, UNIT_EXTENSION};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// =============================================================================
// UNIT NAME
// =============================================================================

/// A dotted hierarchical unit identifier.
///
/// The same syntactic name always resolves to a single unit instance for the
/// lifetime of a loader.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UnitName(pub String);

impl UnitName {
    /// Create a new unit name from a string.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The containing namespace: everything before the last separator.
    ///
    /// Returns `None` for names without a namespace (`Main`).
    #[must_use]
    pub fn namespace(&self) -> Option<&str> {
        self.0
            .rfind(NAMESPACE_SEPARATOR)
            .map(|index| &self.0[..index])
    }

    /// Whether the name lives inside a namespace.
    #[must_use]
    pub fn is_namespaced(&self) -> bool {
        self.0.contains(NAMESPACE_SEPARATOR)
    }

    /// The byte-source path that backs this unit (`pkg/Foo.unit`).
    #[must_use]
    pub fn to_resource_path(&self) -> String {
        let mut path = self.0.replace(NAMESPACE_SEPARATOR, "/");
        path.push('.');
        path.push_str(UNIT_EXTENSION);
        path
    }
}

impl fmt::Display for UnitName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UnitName {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

// =============================================================================
// CODE SOURCE
// =============================================================================

/// Where the bytes of a unit came from.
///
/// Exposed so that consumers can enforce a provenance policy; the loader
/// itself never acts on it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CodeSource {
    /// Location of the origin (directory, archive, or an in-memory label).
    pub location: String,
    /// Signer identities reported by the origin for the unit's entry.
    pub signers: Vec<String>,
}

impl CodeSource {
    /// Create a code source without signers.
    #[must_use]
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            signers: Vec::new(),
        }
    }

    /// Whether any signer identity was reported.
    #[must_use]
    pub fn is_signed(&self) -> bool {
        !self.signers.is_empty()
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the loader.
///
/// - `NotFound` is the expected failure and is always negative-cached
/// - Cache errors are recovered inside the loader and never reach a caller
/// - After bootstrap the loader never panics; every failure is a value
#[derive(Debug, Error)]
pub enum LoaderError {
    /// No bytes could be produced for the unit and no delegation succeeded.
    #[error("Unit not found: {name}")]
    NotFound {
        /// The requested unit name.
        name: String,
        /// The failure that made the unit unloadable, if any.
        #[source]
        cause: Option<Box<LoaderError>>,
    },

    /// The persistent cache container or its index could not be read.
    #[error("Cache corrupt: {0}")]
    CacheCorrupt(String),

    /// A transformer, resource transformer or bundle callback failed.
    #[error("Plugin {plugin} failed: {message}")]
    PluginFailure {
        /// Name of the failing plugin.
        plugin: String,
        /// Failure description reported by the plugin.
        message: String,
    },

    /// Bootstrap could not complete. Always fatal.
    #[error("Could not start: {0}")]
    StartupFailure(#[source] Box<LoaderError>),

    /// A name was not present in the registry's factory tables.
    #[error("Unknown {kind}: {name}")]
    UnknownSymbol {
        /// Which factory table was consulted.
        kind: &'static str,
        /// The missing name.
        name: String,
    },

    /// The resolved launch target exposes no entry function.
    #[error("Unit {0} has no entry function")]
    NoEntryPoint(String),

    /// Every origin discovery strategy failed.
    #[error("Could not discover the unit search path (all {0} strategies failed)")]
    ClasspathUnavailable(usize),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(String),

    /// A serialization or deserialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl LoaderError {
    /// A bare `NotFound` for the given name.
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound {
            name: name.into(),
            cause: None,
        }
    }

    /// A `PluginFailure` attributed to the named plugin.
    pub fn plugin(plugin: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::PluginFailure {
            plugin: plugin.into(),
            message: message.to_string(),
        }
    }

    /// Whether this is a `NotFound`.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_name_namespace() {
        assert_eq!(UnitName::new("pkg.sub.Foo").namespace(), Some("pkg.sub"));
        assert_eq!(UnitName::new("Foo").namespace(), None);
        assert!(!UnitName::new("Foo").is_namespaced());
    }

    #[test]
    fn unit_name_resource_path() {
        assert_eq!(
            UnitName::new("pkg.sub.Foo").to_resource_path(),
            "pkg/sub/Foo.unit"
        );
        assert_eq!(UnitName::new("Main").to_resource_path(), "Main.unit");
    }

    #[test]
    fn not_found_chain_keeps_cause() {
        let err = LoaderError::NotFound {
            name: "pkg.Foo".to_string(),
            cause: Some(Box::new(LoaderError::plugin("upper", "boom"))),
        };
        let source = std::error::Error::source(&err).expect("cause");
        assert_eq!(source.to_string(), "Plugin upper failed: boom");
        assert!(err.is_not_found());
    }

    #[test]
    fn startup_failure_message() {
        let err = LoaderError::StartupFailure(Box::new(LoaderError::NoEntryPoint(
            "pkg.Main".to_string(),
        )));
        assert_eq!(
            err.to_string(),
            "Could not start: Unit pkg.Main has no entry function"
        );
    }
}
