//! # Registry
//!
//! The symbol table of the process: factory functions for bundles,
//! transformers and resource transformers, and the entry functions of
//! launchable units, all keyed by name.
//!
//! Instantiating something "by name" always goes through here. The registry
//! is filled before the loader is built and is read-only afterwards.
//!
//! The [`HostResolver`] is the default fallback resolver: names delegated
//! away from the loader resolve to host units built straight from the entry
//! table, with no bytes and no transformation.

use crate::bootstrap::{DefaultTweaker, Tweaker};
use crate::pipeline::Transformer;
use crate::primitives::DEFAULT_TWEAKER;
use crate::resources::ResourceTransformer;
use crate::unit::{EntryFn, Unit};
use crate::{CodeSource, LoaderError};
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Builds a bundle from its constructor arguments.
pub type BundleFactory =
    Arc<dyn Fn(&[String]) -> Result<Box<dyn Tweaker>, LoaderError> + Send + Sync>;

/// Builds a transformer.
pub type TransformerFactory = Arc<dyn Fn() -> Arc<dyn Transformer> + Send + Sync>;

/// Builds a resource transformer.
pub type ResourceTransformerFactory = Arc<dyn Fn() -> Arc<dyn ResourceTransformer> + Send + Sync>;

/// Name-keyed factory and entry tables.
#[derive(Clone, Default)]
pub struct Registry {
    bundles: BTreeMap<String, BundleFactory>,
    transformers: BTreeMap<String, TransformerFactory>,
    resource_transformers: BTreeMap<String, ResourceTransformerFactory>,
    entries: BTreeMap<String, EntryFn>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("bundles", &self.bundles.keys().collect::<Vec<_>>())
            .field("transformers", &self.transformers.keys().collect::<Vec<_>>())
            .field(
                "resource_transformers",
                &self.resource_transformers.keys().collect::<Vec<_>>(),
            )
            .field("entries", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Registry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in default bundle.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register_bundle(DEFAULT_TWEAKER, |_args| {
            Ok(Box::new(DefaultTweaker::new()) as Box<dyn Tweaker>)
        });
        registry
    }

    /// Register a bundle factory.
    pub fn register_bundle<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&[String]) -> Result<Box<dyn Tweaker>, LoaderError> + Send + Sync + 'static,
    {
        self.bundles.insert(name.into(), Arc::new(factory));
        self
    }

    /// Register a transformer factory.
    pub fn register_transformer<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> Arc<dyn Transformer> + Send + Sync + 'static,
    {
        self.transformers.insert(name.into(), Arc::new(factory));
        self
    }

    /// Register a resource transformer factory.
    pub fn register_resource_transformer<F>(
        &mut self,
        name: impl Into<String>,
        factory: F,
    ) -> &mut Self
    where
        F: Fn() -> Arc<dyn ResourceTransformer> + Send + Sync + 'static,
    {
        self.resource_transformers
            .insert(name.into(), Arc::new(factory));
        self
    }

    /// Bind an entry function to a unit name.
    pub fn register_entry<F>(&mut self, name: impl Into<String>, entry: F) -> &mut Self
    where
        F: Fn(&Unit, &[String]) -> Result<(), LoaderError> + Send + Sync + 'static,
    {
        self.entries.insert(name.into(), Arc::new(entry));
        self
    }

    /// Whether a bundle factory is registered under `name`.
    #[must_use]
    pub fn has_bundle(&self, name: &str) -> bool {
        self.bundles.contains_key(name)
    }

    /// Whether an entry function is bound to `name`.
    #[must_use]
    pub fn has_entry(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Build the bundle registered under `name`.
    pub fn instantiate_bundle(
        &self,
        name: &str,
        args: &[String],
    ) -> Result<Box<dyn Tweaker>, LoaderError> {
        let factory = self
            .bundles
            .get(name)
            .ok_or_else(|| LoaderError::UnknownSymbol {
                kind: "bundle",
                name: name.to_string(),
            })?;
        factory(args)
    }

    /// Build the transformer registered under `name`.
    pub fn instantiate_transformer(&self, name: &str) -> Result<Arc<dyn Transformer>, LoaderError> {
        self.transformers
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| LoaderError::UnknownSymbol {
                kind: "transformer",
                name: name.to_string(),
            })
    }

    /// Build the resource transformer registered under `name`.
    pub fn instantiate_resource_transformer(
        &self,
        name: &str,
    ) -> Result<Arc<dyn ResourceTransformer>, LoaderError> {
        self.resource_transformers
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| LoaderError::UnknownSymbol {
                kind: "resource transformer",
                name: name.to_string(),
            })
    }

    /// Instantiate a unit from final bytes, binding its entry function.
    #[must_use]
    pub fn define(
        &self,
        name: &str,
        bytes: impl Into<Arc<[u8]>>,
        provenance: Option<CodeSource>,
    ) -> Unit {
        Unit::new(name, bytes, provenance, self.entries.get(name).cloned())
    }
}

// =============================================================================
// FALLBACK RESOLUTION
// =============================================================================

/// Resolves names the loader delegates away.
pub trait FallbackResolver: Send + Sync {
    /// Resolve `name`, or fail with `NotFound`.
    fn resolve(&self, name: &str) -> Result<Arc<Unit>, LoaderError>;
}

/// Serves host units: names bound in the registry's entry table.
#[derive(Debug)]
pub struct HostResolver {
    registry: Arc<Registry>,
    units: DashMap<String, Arc<Unit>>,
}

impl HostResolver {
    #[must_use]
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            units: DashMap::new(),
        }
    }
}

impl FallbackResolver for HostResolver {
    fn resolve(&self, name: &str) -> Result<Arc<Unit>, LoaderError> {
        if let Some(unit) = self.units.get(name) {
            return Ok(Arc::clone(unit.value()));
        }
        if !self.registry.has_entry(name) {
            return Err(LoaderError::not_found(name));
        }
        let unit = Arc::new(self.registry.define(
            name,
            Vec::<u8>::new(),
            Some(CodeSource::new("host")),
        ));
        Ok(Arc::clone(
            self.units.entry(name.to_string()).or_insert(unit).value(),
        ))
    }
}

/// Resolves nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFallback;

impl FallbackResolver for NoFallback {
    fn resolve(&self, name: &str) -> Result<Arc<Unit>, LoaderError> {
        Err(LoaderError::not_found(name))
    }
}

// =============================================================================
// TESTS
// =============================================================================
