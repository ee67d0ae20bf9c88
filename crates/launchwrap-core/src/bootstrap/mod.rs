//! # Bootstrap Loop
//!
//! Runs once at process start, before any concurrent resolution:
//!
//! - **Discover**: drain the pending bundle list from the blackboard. Names
//!   already visited are skipped with a warning. Each new bundle gets a
//!   delegation exclusion for its own namespace and is instantiated from the
//!   registry. The first bundle instantiated is the primary bundle.
//! - **Activate**: call `accept_options` then `inject` on each new bundle, in
//!   discovery order. `inject` may append more bundles to the pending list.
//! - Repeat until the pending list stays empty.
//! - **Finalize**: gather every bundle's launch arguments in activation order,
//!   let argument rewriters edit the assembled list, resolve the primary
//!   bundle's launch target and invoke its entry function.
//!
//! Every failure is fatal and surfaces as `StartupFailure`. A bundle that keeps
//! adding new distinct names never reaches the fixpoint.

mod default_tweaker;
mod tweaker;

pub use default_tweaker::DefaultTweaker;
pub use tweaker::{ArgumentRewriter, Tweaker, TweakerDescriptor};

use crate::blackboard::Blackboard;
use crate::loader::ModuleLoader;
use crate::primitives::blackboard_keys::{ARGUMENT_LIST, TWEAK_CLASSES, TWEAKS};
use crate::{LoaderError, UnitName};
use std::collections::BTreeSet;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::sync::Arc;

// =============================================================================
// CONTEXT
// =============================================================================

/// State shared with every bundle callback.
#[derive(Debug)]
pub struct Context {
    /// The loader bundles register transformers and exclusions with.
    pub loader: Arc<ModuleLoader>,
    /// Shared coordination store.
    pub blackboard: Blackboard,
    /// Working directory override.
    pub game_dir: Option<PathBuf>,
    /// Assets directory override.
    pub assets_dir: Option<PathBuf>,
    /// Informational profile label.
    pub profile: Option<String>,
}

impl Context {
    #[must_use]
    pub fn new(loader: Arc<ModuleLoader>, blackboard: Blackboard) -> Self {
        Self {
            loader,
            blackboard,
            game_dir: None,
            assets_dir: None,
            profile: None,
        }
    }

    /// Queue another bundle for discovery.
    pub fn add_tweaker(&mut self, descriptor: impl Into<TweakerDescriptor>) {
        self.blackboard
            .append(TWEAK_CLASSES, descriptor.into());
    }

    /// Names of the bundles visited so far, in discovery order.
    #[must_use]
    pub fn visited(&self) -> Vec<String> {
        self.blackboard
            .get::<Vec<String>>(TWEAKS)
            .cloned()
            .unwrap_or_default()
    }
}

// =============================================================================
// LAUNCH
// =============================================================================

/// Inputs of one bootstrap run.
#[derive(Debug, Clone, Default)]
pub struct LaunchOptions {
    /// Initial pending bundles.
    pub tweakers: Vec<TweakerDescriptor>,
    /// Unrecognized command-line tokens, passed to every bundle.
    pub leftovers: Vec<String>,
    pub game_dir: Option<PathBuf>,
    pub assets_dir: Option<PathBuf>,
    pub profile: Option<String>,
}

/// What a completed bootstrap launched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchReport {
    /// Bundle names in activation order.
    pub bundles: Vec<String>,
    /// The launched unit.
    pub target: String,
    /// Final argument list handed to the entry function.
    pub arguments: Vec<String>,
}

/// The bootstrap state machine.
#[derive(Debug)]
pub struct Launch {
    ctx: Context,
}

struct Activated {
    name: String,
    tweaker: Box<dyn Tweaker>,
}

impl Launch {
    /// Bootstrap against `loader`, with a blackboard the caller may have
    /// seeded (e.g. with a `LaunchTarget`).
    #[must_use]
    pub fn new(loader: Arc<ModuleLoader>, blackboard: Blackboard) -> Self {
        Self {
            ctx: Context::new(loader, blackboard),
        }
    }

    /// The shared context, as left by the last run.
    #[must_use]
    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// Run Discover/Activate to a fixpoint, then Finalize.
    pub fn run(&mut self, options: LaunchOptions) -> Result<LaunchReport, LoaderError> {
        self.bootstrap(options).map_err(|e| {
            tracing::error!("Unable to launch: {}", e);
            LoaderError::StartupFailure(Box::new(e))
        })
    }

    fn bootstrap(&mut self, options: LaunchOptions) -> Result<LaunchReport, LoaderError> {
        let LaunchOptions {
            tweakers,
            leftovers,
            game_dir,
            assets_dir,
            profile,
        } = options;

        self.ctx.game_dir = game_dir;
        self.ctx.assets_dir = assets_dir;
        self.ctx.profile = profile;
        self.ctx.blackboard.insert(TWEAK_CLASSES, tweakers);
        if !self.ctx.blackboard.contains(ARGUMENT_LIST) {
            self.ctx.blackboard.insert(ARGUMENT_LIST, Vec::<String>::new());
        }
        self.ctx.blackboard.insert(TWEAKS, Vec::<String>::new());

        let mut visited = BTreeSet::new();
        let mut activated: Vec<Activated> = Vec::new();

        loop {
            let pending = self
                .ctx
                .blackboard
                .remove::<Vec<TweakerDescriptor>>(TWEAK_CLASSES)
                .unwrap_or_default();
            self.ctx
                .blackboard
                .insert(TWEAK_CLASSES, Vec::<TweakerDescriptor>::new());
            if pending.is_empty() {
                break;
            }

            let fresh = self.discover(pending, &mut visited)?;
            for mut bundle in fresh {
                self.activate(&mut bundle, &leftovers)?;
                activated.push(bundle);
            }
        }

        self.finalize(activated)
    }

    fn discover(
        &mut self,
        pending: Vec<TweakerDescriptor>,
        visited: &mut BTreeSet<String>,
    ) -> Result<Vec<Activated>, LoaderError> {
        let mut fresh = Vec::with_capacity(pending.len());
        for descriptor in pending {
            if !visited.insert(descriptor.name.clone()) {
                tracing::warn!(
                    "Tweak class name {} has already been visited -- skipping",
                    descriptor.name
                );
                continue;
            }
            tracing::info!("Loading tweak class name {}", descriptor.name);

            if let Some(namespace) = UnitName::new(descriptor.name.as_str()).namespace() {
                self.ctx.loader.add_delegation_exclusion(namespace);
            }

            let tweaker = self
                .ctx
                .loader
                .registry()
                .instantiate_bundle(&descriptor.name, &descriptor.args)?;
            if visited.len() == 1 {
                tracing::info!("Using primary tweak class name {}", descriptor.name);
            }
            self.ctx.blackboard.append(TWEAKS, descriptor.name.clone());
            fresh.push(Activated {
                name: descriptor.name,
                tweaker,
            });
        }
        Ok(fresh)
    }

    fn activate(&mut self, bundle: &mut Activated, leftovers: &[String]) -> Result<(), LoaderError> {
        tracing::info!("Calling tweak class {}", bundle.name);
        let ctx = &mut self.ctx;
        guarded(&bundle.name, || {
            bundle.tweaker.accept_options(
                leftovers,
                ctx.game_dir.as_deref(),
                ctx.assets_dir.as_deref(),
                ctx.profile.as_deref(),
            )?;
            bundle.tweaker.inject(ctx)
        })
    }

    fn finalize(&mut self, mut activated: Vec<Activated>) -> Result<LaunchReport, LoaderError> {
        let mut arguments = self
            .ctx
            .blackboard
            .remove::<Vec<String>>(ARGUMENT_LIST)
            .unwrap_or_default();
        for bundle in &activated {
            arguments.extend(bundle.tweaker.launch_arguments());
        }
        for bundle in &mut activated {
            if let Some(rewriter) = bundle.tweaker.argument_rewriter() {
                guarded(&bundle.name, || {
                    rewriter.modify_arguments(&mut arguments);
                    Ok(())
                })?;
            }
        }
        self.ctx.blackboard.insert(ARGUMENT_LIST, arguments.clone());

        let primary = activated
            .first()
            .ok_or_else(|| LoaderError::plugin("bootstrap", "no tweak class was activated"))?;
        let target = primary.tweaker.launch_target()?;
        let unit = self.ctx.loader.resolve(&target)?;

        tracing::info!("Launching wrapped unit {{{}}}", target);
        guarded(&target, || unit.invoke(&arguments))?;

        Ok(LaunchReport {
            bundles: activated.into_iter().map(|bundle| bundle.name).collect(),
            target,
            arguments,
        })
    }
}

/// Run a bundle callback, turning a panic into a `PluginFailure`.
fn guarded<F>(name: &str, f: F) -> Result<(), LoaderError>
where
    F: FnOnce() -> Result<(), LoaderError>,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(_) => Err(LoaderError::plugin(name, "panicked")),
    }
}
