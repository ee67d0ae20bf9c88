//! # Transform Pipeline
//!
//! An ordered, append-only chain of byte transformers plus at most one active
//! name rewriter.
//!
//! Every registered transformer sees every unit, in registration order, with
//! the buffer produced by the previous one. A transformer receiving `None`
//! may synthesize a unit from nothing.
//!
//! ## Failure Policy
//!
//! The first transformer that fails (returns an error or panics) aborts the
//! chain. No partial result is returned; the loader turns the failure into
//! `NotFound` for the requested unit. Transformers that want to tolerate their
//! own problems must do so internally and return the bytes unchanged.

use crate::LoaderError;
use parking_lot::RwLock;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

// =============================================================================
// PLUGIN TRAITS
// =============================================================================

/// Decouples the name a unit is requested under from the name its bytes are
/// stored under.
pub trait NameRewriter: Send + Sync {
    /// Name the unit is defined under, given the requested name.
    fn remap(&self, name: &str) -> String;

    /// Name the backing bytes are stored under, given the requested name.
    fn unmap(&self, name: &str) -> String;
}

/// A unit byte transformer.
///
/// Implementations must be `Send + Sync`: the same instance is shared by
/// every loading thread.
pub trait Transformer: Send + Sync {
    /// Diagnostic name used in logs and failure reports.
    fn name(&self) -> &str;

    /// Rewrite the bytes of `original` (to be defined as `target`).
    ///
    /// `None` in means the unit has no backing bytes; `None` out erases it.
    fn transform(
        &self,
        original: &str,
        target: &str,
        bytes: Option<Vec<u8>>,
    ) -> Result<Option<Vec<u8>>, LoaderError>;

    /// Called after the loader served a unit from the persistent cache
    /// without running the pipeline. Stateful transformers use this to stay
    /// consistent with units they never saw.
    fn on_cache_hit(&self) {}

    /// The name rewriting capability of this transformer, if it has one.
    fn name_rewriter(&self) -> Option<&dyn NameRewriter> {
        None
    }
}

// =============================================================================
// PIPELINE
// =============================================================================

/// Ordered transformer chain shared by all loading threads.
pub struct TransformPipeline {
    transformers: RwLock<Vec<Arc<dyn Transformer>>>,
    rewriter: RwLock<Option<Arc<dyn Transformer>>>,
    trace: bool,
}

impl std::fmt::Debug for TransformPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformPipeline")
            .field("transformers", &self.names())
            .field("has_rewriter", &self.has_rewriter())
            .finish()
    }
}

impl Default for TransformPipeline {
    fn default() -> Self {
        Self::new(false)
    }
}

impl TransformPipeline {
    /// An empty pipeline. `trace` logs buffer sizes around every transformer.
    #[must_use]
    pub fn new(trace: bool) -> Self {
        Self {
            transformers: RwLock::new(Vec::new()),
            rewriter: RwLock::new(None),
            trace,
        }
    }

    /// Switch buffer-size tracing on or off. Registered transformers stay.
    pub fn set_trace(&mut self, trace: bool) {
        self.trace = trace;
    }

    /// Append a transformer.
    ///
    /// A transformer with a name rewriting capability replaces the active
    /// rewriter; returns `true` when that happened.
    pub fn register(&self, transformer: Arc<dyn Transformer>) -> bool {
        let rewrites = transformer.name_rewriter().is_some();
        if rewrites {
            let mut slot = self.rewriter.write();
            if let Some(previous) = slot.as_ref() {
                tracing::warn!(
                    "Name rewriter {} replaces {}",
                    transformer.name(),
                    previous.name()
                );
            }
            *slot = Some(Arc::clone(&transformer));
        }
        tracing::debug!("Registered transformer {}", transformer.name());
        self.transformers.write().push(transformer);
        rewrites
    }

    /// Read-only snapshot of the registered transformers, in order.
    #[must_use]
    pub fn transformers(&self) -> Vec<Arc<dyn Transformer>> {
        self.transformers.read().clone()
    }

    /// Names of the registered transformers, in order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.transformers
            .read()
            .iter()
            .map(|t| t.name().to_string())
            .collect()
    }

    /// Number of registered transformers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.transformers.read().len()
    }

    /// Whether no transformer is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.transformers.read().is_empty()
    }

    /// Whether a name rewriter is active.
    #[must_use]
    pub fn has_rewriter(&self) -> bool {
        self.rewriter.read().is_some()
    }

    /// Definition name for `name` (identity without a rewriter).
    #[must_use]
    pub fn remap(&self, name: &str) -> String {
        match self.rewriter.read().as_ref() {
            Some(t) => t
                .name_rewriter()
                .map(|r| r.remap(name))
                .unwrap_or_else(|| name.to_string()),
            None => name.to_string(),
        }
    }

    /// Storage name for `name` (identity without a rewriter).
    #[must_use]
    pub fn unmap(&self, name: &str) -> String {
        match self.rewriter.read().as_ref() {
            Some(t) => t
                .name_rewriter()
                .map(|r| r.unmap(name))
                .unwrap_or_else(|| name.to_string()),
            None => name.to_string(),
        }
    }

    /// Thread `bytes` through every transformer in registration order.
    pub fn run(
        &self,
        original: &str,
        target: &str,
        bytes: Option<Vec<u8>>,
    ) -> Result<Option<Vec<u8>>, LoaderError> {
        let chain = self.transformers();
        if self.trace {
            tracing::trace!(
                "Beginning transform of {} ({}) Start Length: {}",
                original,
                target,
                bytes.as_ref().map_or(0, Vec::len)
            );
        }

        let mut current = bytes;
        for transformer in &chain {
            let input = current.take();
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                transformer.transform(original, target, input)
            }));
            current = match outcome {
                Ok(Ok(next)) => next,
                Ok(Err(e @ LoaderError::PluginFailure { .. })) => return Err(e),
                Ok(Err(e)) => return Err(LoaderError::plugin(transformer.name(), e)),
                Err(_) => {
                    return Err(LoaderError::plugin(
                        transformer.name(),
                        format!("panicked while transforming {}", original),
                    ));
                }
            };
            if self.trace {
                tracing::trace!(
                    "After transformer {} ({}) {}: {}",
                    original,
                    target,
                    transformer.name(),
                    current.as_ref().map_or(0, Vec::len)
                );
            }
        }
        Ok(current)
    }

    /// Tell every transformer that a unit was served from the cache.
    pub fn notify_cache_hit(&self) {
        for transformer in self.transformers() {
            transformer.on_cache_hit();
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Append(u8);

    impl Transformer for Append {
        fn name(&self) -> &str {
            "append"
        }

        fn transform(
            &self,
            _original: &str,
            _target: &str,
            bytes: Option<Vec<u8>>,
        ) -> Result<Option<Vec<u8>>, LoaderError> {
            Ok(bytes.map(|mut b| {
                b.push(self.0);
                b
            }))
        }
    }

    struct Synthesize;

    impl Transformer for Synthesize {
        fn name(&self) -> &str {
            "synthesize"
        }

        fn transform(
            &self,
            original: &str,
            _target: &str,
            bytes: Option<Vec<u8>>,
        ) -> Result<Option<Vec<u8>>, LoaderError> {
            Ok(bytes.or_else(|| Some(original.as_bytes().to_vec())))
        }
    }

    struct Failing;

    impl Transformer for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn transform(
            &self,
            _original: &str,
            _target: &str,
            _bytes: Option<Vec<u8>>,
        ) -> Result<Option<Vec<u8>>, LoaderError> {
            Err(LoaderError::IoError("disk gone".to_string()))
        }
    }

    struct Prefixing;

    impl NameRewriter for Prefixing {
        fn remap(&self, name: &str) -> String {
            format!("mapped.{}", name)
        }

        fn unmap(&self, name: &str) -> String {
            name.trim_start_matches("mapped.").to_string()
        }
    }

    struct Renamer;

    impl Transformer for Renamer {
        fn name(&self) -> &str {
            "renamer"
        }

        fn transform(
            &self,
            _original: &str,
            _target: &str,
            bytes: Option<Vec<u8>>,
        ) -> Result<Option<Vec<u8>>, LoaderError> {
            Ok(bytes)
        }

        fn name_rewriter(&self) -> Option<&dyn NameRewriter> {
            Some(&Prefixing)
        }
    }

    struct HitCounter(AtomicUsize);

    impl Transformer for HitCounter {
        fn name(&self) -> &str {
            "hits"
        }

        fn transform(
            &self,
            _original: &str,
            _target: &str,
            bytes: Option<Vec<u8>>,
        ) -> Result<Option<Vec<u8>>, LoaderError> {
            Ok(bytes)
        }

        fn on_cache_hit(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn runs_in_registration_order() {
        let pipeline = TransformPipeline::default();
        pipeline.register(Arc::new(Append(1)));
        pipeline.register(Arc::new(Append(2)));

        let out = pipeline.run("a.B", "a.B", Some(vec![0])).expect("run");
        assert_eq!(out, Some(vec![0, 1, 2]));
        assert_eq!(pipeline.names(), vec!["append", "append"]);
    }

    #[test]
    fn empty_input_can_be_synthesized() {
        let pipeline = TransformPipeline::default();
        pipeline.register(Arc::new(Append(9)));
        pipeline.register(Arc::new(Synthesize));

        let out = pipeline.run("gen.X", "gen.X", None).expect("run");
        assert_eq!(out, Some(b"gen.X".to_vec()));
    }

    #[test]
    fn failure_aborts_chain() {
        let pipeline = TransformPipeline::default();
        pipeline.register(Arc::new(Failing));
        pipeline.register(Arc::new(Append(1)));

        let err = pipeline.run("a.B", "a.B", Some(vec![0])).expect_err("fails");
        assert!(matches!(
            err,
            LoaderError::PluginFailure { ref plugin, .. } if plugin == "failing"
        ));
    }

    #[test]
    fn rewriter_is_identity_until_registered() {
        let pipeline = TransformPipeline::default();
        assert_eq!(pipeline.remap("a.B"), "a.B");

        assert!(pipeline.register(Arc::new(Renamer)));
        assert!(pipeline.has_rewriter());
        assert_eq!(pipeline.remap("a.B"), "mapped.a.B");
        assert_eq!(pipeline.unmap("mapped.a.B"), "a.B");
    }

    #[test]
    fn cache_hit_reaches_every_transformer() {
        let pipeline = TransformPipeline::default();
        let counter = Arc::new(HitCounter(AtomicUsize::new(0)));
        pipeline.register(counter.clone());
        pipeline.notify_cache_hit();
        pipeline.notify_cache_hit();
        assert_eq!(counter.0.load(Ordering::SeqCst), 2);
    }
}
