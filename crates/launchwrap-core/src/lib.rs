//! # launchwrap-core
//!
//! A pluggable module-loading substrate.
//!
//! Named units are resolved through exclusion rules, an in-memory unit cache,
//! a negative cache, a persistent content-addressed artifact cache and an
//! ordered chain of byte transformers. A bootstrap loop discovers plugin
//! bundles to a fixpoint before handing control to the launch target.
//!
//! ## Layout
//!
//! - `checksum`, `formats`, `storage`, `cache`: the persistent transform cache
//! - `pipeline`, `resources`: transformer chains for units and resources
//! - `source`, `classpath`: where raw bytes come from
//! - `registry`, `unit`, `loader`: name-keyed factories and resolution
//! - `blackboard`, `bootstrap`: startup
//!
//! ## Constraints
//!
//! - Synchronous and thread-safe: no async runtime, any thread may resolve
//! - After bootstrap, failures are values; the loader never panics the process
//! - The persistent cache is an optimization only and recovers from corruption

// =============================================================================
// MODULES
// =============================================================================

pub mod blackboard;
pub mod bootstrap;
pub mod cache;
pub mod checksum;
pub mod classpath;
pub mod exclusion;
pub mod formats;
pub mod loader;
pub mod pipeline;
pub mod primitives;
pub mod registry;
pub mod resources;
pub mod source;
pub mod storage;
pub mod types;
pub mod unit;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use checksum::{Adler32, Checksum};
pub use types::{CodeSource, LoaderError, UnitName};

// =============================================================================
// RE-EXPORTS: Loading
// =============================================================================

pub use cache::{CacheIndex, CacheStats, ShutdownFlush, UnitCache, generation_fingerprint};
pub use exclusion::ExclusionSet;
pub use loader::{LoaderSettings, ModuleLoader, allocate_dump_dir};
pub use pipeline::{NameRewriter, TransformPipeline, Transformer};
pub use registry::{FallbackResolver, HostResolver, NoFallback, Registry};
pub use resources::{ResourcePipeline, ResourceTransformer};
pub use source::{ByteSource, DirectoryOrigin, Located, MemoryOrigin, Origin};
pub use storage::ArtifactCache;
pub use unit::{EntryFn, Unit};

// =============================================================================
// RE-EXPORTS: Bootstrap
// =============================================================================

pub use blackboard::Blackboard;
pub use bootstrap::{
    ArgumentRewriter, Context, DefaultTweaker, Launch, LaunchOptions, LaunchReport, Tweaker,
    TweakerDescriptor,
};
pub use classpath::{DiscoveryStrategy, EnvPathList, ExecutableDir, ExplicitPaths};

// =============================================================================
// RE-EXPORTS: Formats (from formats module)
// =============================================================================

pub use formats::{IndexRecord, index_from_bytes, index_to_bytes};
