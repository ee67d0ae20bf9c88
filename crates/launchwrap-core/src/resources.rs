//! # Resource Pipeline
//!
//! The transformer chain for plain resources, addressed by path rather than
//! unit name. Same ordering and failure rules as the unit pipeline, no name
//! rewriting, and successful results are cached in memory for the life of
//! the loader.

use crate::LoaderError;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

/// A resource byte transformer.
pub trait ResourceTransformer: Send + Sync {
    /// Diagnostic name used in logs and failure reports.
    fn name(&self) -> &str;

    /// Rewrite the resource at `path`. `None` in means no backing resource.
    fn transform(&self, path: &str, bytes: Option<Vec<u8>>)
    -> Result<Option<Vec<u8>>, LoaderError>;
}

/// Ordered resource transformer chain with an in-memory result cache.
#[derive(Default)]
pub struct ResourcePipeline {
    transformers: RwLock<Vec<Arc<dyn ResourceTransformer>>>,
    cache: DashMap<String, Arc<[u8]>>,
}

impl std::fmt::Debug for ResourcePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourcePipeline")
            .field("transformers", &self.transformers.read().len())
            .field("cached", &self.cache.len())
            .finish()
    }
}

impl ResourcePipeline {
    /// An empty pipeline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a resource transformer.
    pub fn register(&self, transformer: Arc<dyn ResourceTransformer>) {
        tracing::debug!("Registered resource transformer {}", transformer.name());
        self.transformers.write().push(transformer);
    }

    /// Read-only snapshot of the registered transformers, in order.
    #[must_use]
    pub fn transformers(&self) -> Vec<Arc<dyn ResourceTransformer>> {
        self.transformers.read().clone()
    }

    /// Number of cached transformed resources.
    #[must_use]
    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }

    /// Produce the resource at `path`.
    ///
    /// `original` is only called on a cache miss. With no transformers the
    /// original bytes are returned uncached. A chain that yields nothing
    /// falls back to the original bytes.
    pub fn fetch<F>(&self, path: &str, original: F) -> Result<Option<Arc<[u8]>>, LoaderError>
    where
        F: FnOnce() -> Option<Vec<u8>>,
    {
        if let Some(hit) = self.cache.get(path) {
            return Ok(Some(Arc::clone(hit.value())));
        }

        let raw = original();
        let chain = self.transformers();
        if chain.is_empty() {
            return Ok(raw.map(Arc::from));
        }

        let mut current = raw.clone();
        for transformer in &chain {
            let input = current.take();
            let outcome = catch_unwind(AssertUnwindSafe(|| transformer.transform(path, input)));
            current = match outcome {
                Ok(Ok(next)) => next,
                Ok(Err(e @ LoaderError::PluginFailure { .. })) => return Err(e),
                Ok(Err(e)) => return Err(LoaderError::plugin(transformer.name(), e)),
                Err(_) => {
                    return Err(LoaderError::plugin(
                        transformer.name(),
                        format!("panicked while transforming {}", path),
                    ));
                }
            };
        }

        match current {
            Some(transformed) => {
                let stored = self
                    .cache
                    .entry(path.to_string())
                    .or_insert_with(|| Arc::from(transformed))
                    .value()
                    .clone();
                Ok(Some(stored))
            }
            None => Ok(raw.map(Arc::from)),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
