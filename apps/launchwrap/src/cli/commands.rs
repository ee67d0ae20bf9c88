//! # Launch Flow
//!
//! Wires configuration, origin discovery, the unit cache and the loader
//! together, then runs the bootstrap loop.

use super::Cli;
use crate::builtin::standard_registry;
use crate::config::Config;
use crate::shutdown::ExitHook;
use launchwrap_core::classpath::{directory_origins, discover};
use launchwrap_core::primitives::blackboard_keys::{LAUNCH_TARGET, UNIT_CACHE};
use launchwrap_core::{
    Blackboard, ByteSource, DiscoveryStrategy, EnvPathList, ExecutableDir, ExplicitPaths, Launch,
    LaunchOptions, LaunchReport, LoaderError, ModuleLoader, UnitCache,
    allocate_dump_dir, generation_fingerprint,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the launcher with parsed arguments.
pub fn execute(cli: Cli) -> Result<(), LoaderError> {
    let report = cmd_launch(cli)?;
    tracing::debug!(
        "Launched {} via {} bundle(s) with {} argument(s)",
        report.target,
        report.bundles.len(),
        report.arguments.len()
    );
    Ok(())
}

/// Bootstrap and launch.
///
/// The unit cache index is saved when this returns, on a termination signal,
/// or when launched code ends the process through [`crate::shutdown::exit`].
pub fn cmd_launch(cli: Cli) -> Result<LaunchReport, LoaderError> {
    let game_dir = cli.game_dir.clone().unwrap_or_else(|| PathBuf::from("."));
    let config = Config::load(cli.config.as_deref(), &game_dir)?;

    let source = ByteSource::new(directory_origins(&discover_origins(&config)?));
    let cache = open_cache(&config, &game_dir);
    let _exit_hook = cache.clone().map(ExitHook::install);

    let dump_dir = if config.debug.dump_units {
        allocate_dump_dir(&game_dir)
    } else {
        None
    };

    let mut loader = ModuleLoader::new(Arc::new(standard_registry()), source)
        .with_settings(config.debug.loader_settings())
        .with_dump_dir(dump_dir);
    if let Some(cache) = &cache {
        loader = loader.with_cache(Arc::clone(cache));
    }
    for prefix in &config.exclusions.delegation {
        loader.add_delegation_exclusion(prefix.as_str());
    }
    for prefix in &config.exclusions.bypass {
        loader.add_bypass_exclusion(prefix.as_str());
    }

    let mut blackboard = Blackboard::new();
    blackboard.insert(LAUNCH_TARGET, config.launch_target.clone());
    if let Some(cache) = &cache {
        blackboard.insert(UNIT_CACHE, Arc::clone(cache));
    }

    let options = LaunchOptions {
        tweakers: cli.tweakers(),
        leftovers: cli.leftovers,
        game_dir: cli.game_dir,
        assets_dir: cli.assets_dir,
        profile: cli.profile,
    };
    Launch::new(Arc::new(loader), blackboard).run(options)
}

// =============================================================================
// HELPERS
// =============================================================================

/// Run the origin discovery chain: configured paths, then the environment
/// variable, then the executable's directory.
pub fn discover_origins(config: &Config) -> Result<Vec<PathBuf>, LoaderError> {
    let chain: Vec<Box<dyn DiscoveryStrategy>> = vec![
        Box::new(ExplicitPaths(config.classpath.origins.clone())),
        Box::new(EnvPathList::new(config.classpath.env.as_str())),
        Box::new(ExecutableDir),
    ];
    let paths = discover(&chain)?;
    tracing::info!("Unit search path has {} origin(s)", paths.len());
    Ok(paths)
}

/// Open the persistent unit cache, or run without one.
///
/// The cache is an optimization: every failure here is logged and the
/// launch continues uncached.
pub fn open_cache(config: &Config, game_dir: &Path) -> Option<Arc<UnitCache>> {
    if !config.cache.enabled {
        tracing::info!("Unit cache disabled");
        return None;
    }

    let watch_dir = game_dir.join(&config.cache.watch_dir);
    let generation = match generation_fingerprint(&watch_dir) {
        Ok(generation) => generation,
        Err(e) => {
            tracing::warn!("Cannot fingerprint {}, running uncached: {}", watch_dir.display(), e);
            return None;
        }
    };

    match UnitCache::open(game_dir.join(&config.cache.file), generation) {
        Ok(cache) => Some(Arc::new(cache)),
        Err(e) => {
            tracing::warn!("Cannot open unit cache, running uncached: {}", e);
            None
        }
    }
}
