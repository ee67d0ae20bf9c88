//! # Loader Primitives
//!
//! Hardcoded constants shared by the loader, the cache and the bootstrap loop.
//!
//! These are compiled into the binary and are immutable at runtime.
//! Configuration may extend the exclusion sets but never shrink them.

/// Separator between the segments of a unit name.
pub const NAMESPACE_SEPARATOR: char = '.';

/// File extension of unit entries in the byte source.
pub const UNIT_EXTENSION: &str = "unit";

// =============================================================================
// PERSISTENT CACHE FORMAT
// =============================================================================

/// Magic bytes for the cache index record header.
///
/// - Record = Magic Bytes ("LWCI") + Version (u8) before payload.
pub const MAGIC_BYTES: &[u8; 4] = b"LWCI";

/// Current index record format version.
///
/// Increment this when making breaking changes to the index record.
pub const FORMAT_VERSION: u8 = 1;

/// Default file name of the cache container, relative to the working directory.
pub const CACHE_FILE_NAME: &str = "unit_cache.redb";

/// Key under which the index record is stored in the metadata table.
pub const INDEX_RECORD_KEY: &str = "unit_index";

/// Default directory watched by the generation fingerprint.
pub const WATCHED_DIR_NAME: &str = "bundles";

/// Width of a checksum rendered as a blob key.
pub const CHECKSUM_HEX_WIDTH: usize = 8;

// =============================================================================
// BYTE SOURCE
// =============================================================================

/// Host device names that cannot be used as file names on every platform.
///
/// Un-namespaced units whose upper-cased name starts with one of these are
/// first looked up under the `_`-prefixed alias.
pub const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Prefix used for the sanitized alias of a reserved name.
pub const RESERVED_ALIAS_PREFIX: &str = "_";

/// Environment variable consulted by the origin discovery chain.
pub const CLASSPATH_ENV: &str = "LAUNCHWRAP_CLASSPATH";

// =============================================================================
// EXCLUSIONS
// =============================================================================

/// Prefixes always routed to the fallback resolver.
pub const DEFAULT_DELEGATION_EXCLUSIONS: &[&str] =
    &["std.", "core.", "alloc.", "proc_macro.", "launchwrap."];

/// Prefixes always loaded without running the transform pipeline.
pub const DEFAULT_BYPASS_EXCLUSIONS: &[&str] = &[
    "std.",
    "core.",
    "alloc.",
    "serde.",
    "postcard.",
    "redb.",
    "tracing.",
];

// =============================================================================
// BOOTSTRAP
// =============================================================================

/// Bundle used when no `--tweakClass` option is given.
pub const DEFAULT_TWEAKER: &str = "launchwrap.tweak.DefaultTweaker";

/// Name of the directory family used by the transformed-unit dump.
pub const DUMP_DIR_NAME: &str = "UNIT_DUMP";

/// Number of numbered dump directories tried before giving up.
pub const MAX_DUMP_DIRS: usize = 10;

/// Blackboard keys seeded by the bootstrap loop.
pub mod blackboard_keys {
    /// Pending bundle descriptors (`Vec<TweakerDescriptor>`).
    pub const TWEAK_CLASSES: &str = "TweakClasses";
    /// Accumulating entry-point argument list (`Vec<String>`).
    pub const ARGUMENT_LIST: &str = "ArgumentList";
    /// Names of bundles already visited, in visit order (`Vec<String>`).
    pub const TWEAKS: &str = "Tweaks";
    /// Launch target read by the default bundle (`String`).
    pub const LAUNCH_TARGET: &str = "LaunchTarget";
    /// Persistent unit cache, when one is open (`Arc<UnitCache>`).
    pub const UNIT_CACHE: &str = "UnitCache";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magic_bytes_correct() {
        assert_eq!(MAGIC_BYTES, b"LWCI");
    }

    #[test]
    fn default_tweaker_is_delegated() {
        assert!(
            DEFAULT_DELEGATION_EXCLUSIONS
                .iter()
                .any(|prefix| DEFAULT_TWEAKER.starts_with(prefix))
        );
    }
}
