//! # Exclusion Rules
//!
//! Name-prefix rule sets consulted before every resolution. Any matching
//! prefix short-circuits; order is irrelevant.

use parking_lot::RwLock;
use std::collections::BTreeSet;

/// A concurrent, grow-only set of name prefixes.
#[derive(Debug, Default)]
pub struct ExclusionSet {
    prefixes: RwLock<BTreeSet<String>>,
}

impl ExclusionSet {
    /// An empty rule set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A rule set seeded with the given prefixes.
    #[must_use]
    pub fn with_prefixes<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set = Self::new();
        for prefix in prefixes {
            set.add(prefix);
        }
        set
    }

    /// Add a prefix. Returns `false` if it was already present.
    pub fn add(&self, prefix: impl Into<String>) -> bool {
        self.prefixes.write().insert(prefix.into())
    }

    /// Whether any prefix matches `name`.
    #[must_use]
    pub fn matches(&self, name: &str) -> bool {
        self.prefixes
            .read()
            .iter()
            .any(|prefix| name.starts_with(prefix.as_str()))
    }

    /// Sorted copy of the current prefixes.
    #[must_use]
    pub fn snapshot(&self) -> Vec<String> {
        self.prefixes.read().iter().cloned().collect()
    }

    /// Number of prefixes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.prefixes.read().len()
    }

    /// Whether the set holds no prefixes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.prefixes.read().is_empty()
    }
}
