//! # Module Loader
//!
//! The resolution entry point. `resolve(name)` consults, in order:
//!
//! 1. the negative cache
//! 2. the delegation exclusions (hand off to the fallback resolver)
//! 3. the resolved-unit cache
//! 4. the bypass exclusions (define raw bytes, no pipeline)
//! 5. the byte source, under the rewriter's storage name
//! 6. the persistent unit cache, keyed by the checksum of the raw bytes
//! 7. the transform pipeline
//!
//! and installs the result under the rewriter's target name.
//!
//! ## Failure Policy
//!
//! Every failure after delegation negative-caches the requested name and
//! surfaces as `NotFound`, with the underlying failure attached as its cause.
//! Cache problems are logged and never reach the caller.
//!
//! ## Concurrency
//!
//! All state is in concurrent maps. Two threads racing on the same name may
//! both run the pipeline; only the first install is kept, and both callers get
//! that instance back.

use crate::cache::UnitCache;
use crate::exclusion::ExclusionSet;
use crate::pipeline::{TransformPipeline, Transformer};
use crate::primitives::{
    DEFAULT_BYPASS_EXCLUSIONS, DEFAULT_DELEGATION_EXCLUSIONS, DUMP_DIR_NAME, MAX_DUMP_DIRS,
};
use crate::registry::{FallbackResolver, HostResolver, Registry};
use crate::resources::{ResourcePipeline, ResourceTransformer};
use crate::source::{ByteSource, Located, Origin};
use crate::unit::Unit;
use crate::{Checksum, CodeSource, LoaderError, UnitName};
use dashmap::{DashMap, DashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Diagnostic switches of the loader.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoaderSettings {
    /// Trace every lookup and definition.
    pub trace_loading: bool,
    /// Trace buffer sizes around every transformer.
    pub trace_transformers: bool,
}

/// The module loader.
pub struct ModuleLoader {
    registry: Arc<Registry>,
    source: ByteSource,
    pipeline: TransformPipeline,
    resources: ResourcePipeline,
    delegation: ExclusionSet,
    bypass: ExclusionSet,
    resolved: DashMap<String, Arc<Unit>>,
    invalid: DashSet<String>,
    remapped: DashMap<String, String>,
    unmapped: DashMap<String, String>,
    cache: Option<Arc<UnitCache>>,
    fallback: Arc<dyn FallbackResolver>,
    settings: LoaderSettings,
    dump_dir: Option<PathBuf>,
}

impl std::fmt::Debug for ModuleLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleLoader")
            .field("origins", &self.source.locations())
            .field("pipeline", &self.pipeline)
            .field("resources", &self.resources)
            .field("delegation", &self.delegation.snapshot())
            .field("bypass", &self.bypass.snapshot())
            .field("resolved", &self.resolved.len())
            .field("invalid", &self.invalid.len())
            .field("cache", &self.cache.is_some())
            .field("settings", &self.settings)
            .field("dump_dir", &self.dump_dir)
            .finish()
    }
}

impl ModuleLoader {
    /// A loader over `source`, with the default exclusion sets and the
    /// registry's host units as fallback.
    #[must_use]
    pub fn new(registry: Arc<Registry>, source: ByteSource) -> Self {
        let fallback: Arc<dyn FallbackResolver> = Arc::new(HostResolver::new(Arc::clone(&registry)));
        Self {
            registry,
            source,
            pipeline: TransformPipeline::default(),
            resources: ResourcePipeline::new(),
            delegation: ExclusionSet::with_prefixes(DEFAULT_DELEGATION_EXCLUSIONS.iter().copied()),
            bypass: ExclusionSet::with_prefixes(DEFAULT_BYPASS_EXCLUSIONS.iter().copied()),
            resolved: DashMap::new(),
            invalid: DashSet::new(),
            remapped: DashMap::new(),
            unmapped: DashMap::new(),
            cache: None,
            fallback,
            settings: LoaderSettings::default(),
            dump_dir: None,
        }
    }

    /// Use a persistent unit cache.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<UnitCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Replace the fallback resolver used for delegated names.
    #[must_use]
    pub fn with_fallback(mut self, fallback: Arc<dyn FallbackResolver>) -> Self {
        self.fallback = fallback;
        self
    }

    /// Apply diagnostic switches.
    #[must_use]
    pub fn with_settings(mut self, settings: LoaderSettings) -> Self {
        self.settings = settings;
        self.pipeline.set_trace(settings.trace_transformers);
        self.source = std::mem::take(&mut self.source).with_trace(settings.trace_loading);
        self
    }

    /// Write every transformed unit below `dir`.
    #[must_use]
    pub fn with_dump_dir(mut self, dir: Option<PathBuf>) -> Self {
        if let Some(dir) = &dir {
            tracing::info!("Dumping transformed units to {}", dir.display());
        }
        self.dump_dir = dir;
        self
    }

    // =========================================================================
    // REGISTRATION SURFACE
    // =========================================================================

    /// Append a transformer to the pipeline.
    pub fn register_transformer(&self, transformer: Arc<dyn Transformer>) {
        if self.pipeline.register(transformer) {
            self.remapped.clear();
            self.unmapped.clear();
        }
    }

    /// Instantiate a transformer by registry name and append it.
    pub fn register_transformer_named(&self, name: &str) -> Result<(), LoaderError> {
        let transformer = self.registry.instantiate_transformer(name)?;
        self.register_transformer(transformer);
        Ok(())
    }

    /// Append a resource transformer.
    pub fn register_resource_transformer(&self, transformer: Arc<dyn ResourceTransformer>) {
        self.resources.register(transformer);
    }

    /// Instantiate a resource transformer by registry name and append it.
    pub fn register_resource_transformer_named(&self, name: &str) -> Result<(), LoaderError> {
        let transformer = self.registry.instantiate_resource_transformer(name)?;
        self.resources.register(transformer);
        Ok(())
    }

    /// Route names starting with `prefix` to the fallback resolver.
    pub fn add_delegation_exclusion(&self, prefix: impl Into<String>) {
        self.delegation.add(prefix);
    }

    /// Define names starting with `prefix` without running the pipeline.
    pub fn add_bypass_exclusion(&self, prefix: impl Into<String>) {
        self.bypass.add(prefix);
    }

    /// Current delegation prefixes, sorted.
    #[must_use]
    pub fn delegation_exclusions(&self) -> Vec<String> {
        self.delegation.snapshot()
    }

    /// Current bypass prefixes, sorted.
    #[must_use]
    pub fn bypass_exclusions(&self) -> Vec<String> {
        self.bypass.snapshot()
    }

    /// Read-only snapshot of the registered transformers, in order.
    #[must_use]
    pub fn transformers(&self) -> Vec<Arc<dyn Transformer>> {
        self.pipeline.transformers()
    }

    /// Read-only snapshot of the registered resource transformers, in order.
    #[must_use]
    pub fn resource_transformers(&self) -> Vec<Arc<dyn ResourceTransformer>> {
        self.resources.transformers()
    }

    /// Append an origin to the end of the search path.
    pub fn add_origin(&self, origin: Arc<dyn Origin>) {
        self.source.add_origin(origin);
    }

    /// Locations of the search path, in order.
    #[must_use]
    pub fn origins(&self) -> Vec<String> {
        self.source.locations()
    }

    /// The registry units are defined against.
    #[must_use]
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// The persistent unit cache, if one is attached.
    #[must_use]
    pub fn cache(&self) -> Option<&Arc<UnitCache>> {
        self.cache.as_ref()
    }

    // =========================================================================
    // NAME MAPPING
    // =========================================================================

    /// Name `name` is defined under.
    #[must_use]
    pub fn remap(&self, name: &str) -> String {
        if !self.pipeline.has_rewriter() {
            return name.to_string();
        }
        if let Some(hit) = self.remapped.get(name) {
            return hit.value().clone();
        }
        let mapped = self.pipeline.remap(name);
        self.remapped.insert(name.to_string(), mapped.clone());
        mapped
    }

    /// Name the bytes of `name` are stored under.
    #[must_use]
    pub fn unmap(&self, name: &str) -> String {
        if !self.pipeline.has_rewriter() {
            return name.to_string();
        }
        if let Some(hit) = self.unmapped.get(name) {
            return hit.value().clone();
        }
        let mapped = self.pipeline.unmap(name);
        self.unmapped.insert(name.to_string(), mapped.clone());
        mapped
    }

    // =========================================================================
    // RESOLUTION
    // =========================================================================

    /// Resolve `name` to its single unit instance.
    pub fn resolve(&self, name: &str) -> Result<Arc<Unit>, LoaderError> {
        if self.invalid.contains(name) {
            return Err(LoaderError::not_found(name));
        }

        if self.delegation.matches(name) {
            return self.fallback.resolve(name);
        }

        if let Some(unit) = self.resolved.get(name) {
            return Ok(Arc::clone(unit.value()));
        }

        let outcome = if self.bypass.matches(name) {
            self.load_untransformed(name)
        } else {
            self.load_transformed(name)
        };

        outcome.map_err(|e| {
            self.invalid.insert(name.to_string());
            if e.is_not_found() {
                e
            } else {
                tracing::warn!("Failed to load unit {}: {}", name, e);
                LoaderError::NotFound {
                    name: name.to_string(),
                    cause: Some(Box::new(e)),
                }
            }
        })
    }

    fn load_untransformed(&self, name: &str) -> Result<Arc<Unit>, LoaderError> {
        let located = self
            .source
            .unit_bytes(name)
            .ok_or_else(|| LoaderError::not_found(name))?;
        let provenance = located.code_source();
        let unit = self.registry.define(name, located.bytes, Some(provenance));
        Ok(self.install(name, unit))
    }

    fn load_transformed(&self, name: &str) -> Result<Arc<Unit>, LoaderError> {
        let target = self.remap(name);
        let storage = self.unmap(name);

        if let Some(unit) = self.resolved.get(&target) {
            return Ok(Arc::clone(unit.value()));
        }

        let located = self.source.unit_bytes(&storage);
        let raw = located.as_ref().map(|found| Arc::clone(&found.bytes));
        let original = raw.as_deref().map_or(Checksum::EMPTY, Checksum::of);

        let bytes = match self.cached_transform(original, raw.as_ref()) {
            Some(bytes) => {
                if self.settings.trace_loading {
                    tracing::trace!("Loaded {} from cache ({})", target, original);
                }
                self.pipeline.notify_cache_hit();
                bytes
            }
            None => self.run_pipeline(name, &storage, &target, original, raw)?,
        };

        let provenance = located.as_ref().map(Located::code_source);
        let unit = self.registry.define(&target, bytes, provenance);
        Ok(self.install(&target, unit))
    }

    fn cached_transform(&self, original: Checksum, raw: Option<&Arc<[u8]>>) -> Option<Arc<[u8]>> {
        let cache = self.cache.as_ref()?;
        if original.is_empty() {
            return None;
        }
        let transformed = cache.lookup(original)?;
        if transformed == original {
            return raw.cloned();
        }
        match cache.fetch(transformed) {
            Ok(Some(bytes)) if Checksum::of(&bytes) == transformed => Some(Arc::from(bytes)),
            Ok(Some(_)) => {
                tracing::warn!("Cached blob {} failed verification, retransforming", transformed);
                None
            }
            Ok(None) => {
                tracing::debug!("Cached blob {} is missing, retransforming", transformed);
                None
            }
            Err(e) => {
                tracing::warn!("Failed to read cached blob {}: {}", transformed, e);
                None
            }
        }
    }

    fn run_pipeline(
        &self,
        name: &str,
        storage: &str,
        target: &str,
        original: Checksum,
        raw: Option<Arc<[u8]>>,
    ) -> Result<Arc<[u8]>, LoaderError> {
        let transformed = self
            .pipeline
            .run(storage, target, raw.map(|bytes| bytes.to_vec()))?;
        let transformed = match transformed {
            Some(bytes) if !bytes.is_empty() => bytes,
            _ => return Err(LoaderError::not_found(name)),
        };

        if let Some(cache) = &self.cache {
            if !original.is_empty() {
                let checksum = Checksum::of(&transformed);
                if let Err(e) = cache.store(original, checksum, &transformed) {
                    tracing::warn!("Failed to cache transformed unit {}: {}", target, e);
                }
            }
        }

        self.dump(target, &transformed);
        Ok(Arc::from(transformed))
    }

    /// Keep the first instance installed under `name`.
    fn install(&self, name: &str, unit: Unit) -> Arc<Unit> {
        if self.settings.trace_loading {
            tracing::trace!("Defining unit {} ({} bytes)", name, unit.bytes().len());
        }
        let entry = self
            .resolved
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(unit));
        Arc::clone(entry.value())
    }

    fn dump(&self, target: &str, bytes: &[u8]) {
        let Some(dir) = &self.dump_dir else {
            return;
        };
        let path = dir.join(UnitName::new(target).to_resource_path());
        let written = path
            .parent()
            .map_or(Ok(()), std::fs::create_dir_all)
            .and_then(|()| std::fs::write(&path, bytes));
        if let Err(e) = written {
            tracing::warn!("Could not dump unit {} to {}: {}", target, path.display(), e);
        }
    }

    // =========================================================================
    // RESOURCES & PROVENANCE
    // =========================================================================

    /// The resource at `path`, through the resource pipeline.
    ///
    /// Transformer failures are logged and reported as a missing resource.
    #[must_use]
    pub fn resource(&self, path: &str) -> Option<Arc<[u8]>> {
        match self
            .resources
            .fetch(path, || self.source.resource_bytes(path))
        {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!("Failed to load resource {}: {}", path, e);
                None
            }
        }
    }

    /// Provenance of the unit `name`, if it resolved from the search path.
    #[must_use]
    pub fn origin_of(&self, name: &str) -> Option<CodeSource> {
        let unit = self
            .resolved
            .get(name)
            .or_else(|| self.resolved.get(&self.remap(name)))?;
        unit.value().provenance().cloned()
    }

    /// Whether `name` is negatively cached.
    #[must_use]
    pub fn is_negative(&self, name: &str) -> bool {
        self.invalid.contains(name)
    }

    /// Number of resolved units.
    #[must_use]
    pub fn resolved_len(&self) -> usize {
        self.resolved.len()
    }

    /// Forget negative results for `names`, in the loader and the byte source.
    pub fn clear_negative_entries<'a, I>(&self, names: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        let names: Vec<&str> = names.into_iter().collect();
        for name in &names {
            self.invalid.remove(*name);
        }
        self.source.clear_negative(names);
    }
}

/// Pick the first free dump directory below `base`.
///
/// Tries `UNIT_DUMP`, then `UNIT_DUMP1` up to `UNIT_DUMP10`. Returns `None`
/// when all exist or the directory cannot be created.
pub fn allocate_dump_dir(base: &Path) -> Option<PathBuf> {
    for n in 0..=MAX_DUMP_DIRS {
        let name = if n == 0 {
            DUMP_DIR_NAME.to_string()
        } else {
            format!("{}{}", DUMP_DIR_NAME, n)
        };
        let candidate = base.join(name);
        if candidate.exists() {
            continue;
        }
        return match std::fs::create_dir_all(&candidate) {
            Ok(()) => Some(candidate),
            Err(e) => {
                tracing::warn!("Cannot create dump directory {}: {}", candidate.display(), e);
                None
            }
        };
    }
    tracing::info!(
        "Not dumping units: {} dump directories already exist in {}",
        MAX_DUMP_DIRS + 1,
        base.display()
    );
    None
}

// =============================================================================
// TESTS
// =============================================================================
