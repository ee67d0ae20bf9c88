//! # launchwrap CLI Module
//!
//! The command-line surface of the launcher.
//!
//! ## Recognized Options
//!
//! - `--version <profile>` - Profile label (informational, passed to bundles)
//! - `--gameDir <dir>` - Working directory override
//! - `--assetsDir <dir>` - Assets directory override
//! - `--tweakClass <name>` - Bundle to load (repeatable)
//! - `--config <file>` - Configuration file
//!
//! Every other token is kept, in order, and handed to bundles as leftovers.

mod commands;

use clap::Parser;
use launchwrap_core::TweakerDescriptor;
use launchwrap_core::primitives::DEFAULT_TWEAKER;
use std::path::PathBuf;

pub use commands::*;

/// Options that take a value and are parsed by the launcher itself.
const VALUE_OPTIONS: &[&str] = &[
    "--version",
    "--gameDir",
    "--assetsDir",
    "--tweakClass",
    "--config",
];

/// Flags parsed by the launcher itself.
const FLAG_OPTIONS: &[&str] = &["-h", "--help"];

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// launchwrap - Module Launcher
///
/// Discovers plugin bundles, lets them register unit transformers, and
/// launches the configured entry point with the assembled arguments.
#[derive(Parser, Debug, Default, PartialEq, Eq)]
#[command(name = "launchwrap")]
#[command(about, long_about = None, disable_version_flag = true)]
pub struct Cli {
    /// The version we launched with
    #[arg(long = "version", value_name = "PROFILE")]
    pub profile: Option<String>,

    /// Alternative game directory
    #[arg(long = "gameDir", value_name = "DIR")]
    pub game_dir: Option<PathBuf>,

    /// Assets directory
    #[arg(long = "assetsDir", value_name = "DIR")]
    pub assets_dir: Option<PathBuf>,

    /// Tweak class(es) to load
    #[arg(long = "tweakClass", value_name = "NAME")]
    pub tweak_class: Vec<String>,

    /// Configuration file (default: launchwrap.toml in the game directory)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Unrecognized tokens, in order
    #[arg(skip)]
    pub leftovers: Vec<String>,
}

impl Cli {
    /// Parse a full argument vector (program name first).
    pub fn parse_args<I>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = String>,
    {
        let (known, leftovers) = split_arguments(args);
        let mut cli = Self::try_parse_from(known)?;
        cli.leftovers = leftovers;
        Ok(cli)
    }

    /// Bundles to seed the pending list with.
    #[must_use]
    pub fn tweakers(&self) -> Vec<TweakerDescriptor> {
        if self.tweak_class.is_empty() {
            return vec![TweakerDescriptor::new(DEFAULT_TWEAKER)];
        }
        self.tweak_class
            .iter()
            .map(|name| TweakerDescriptor::new(name.as_str()))
            .collect()
    }
}

/// Split `args` into launcher options and leftovers.
///
/// The first token (program name) always goes to the launcher side. Known
/// options are accepted as `--opt value` or `--opt=value`. After `--`, every
/// token is a leftover.
pub fn split_arguments<I>(args: I) -> (Vec<String>, Vec<String>)
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    let mut known: Vec<String> = args.next().into_iter().collect();
    let mut leftovers = Vec::new();

    while let Some(arg) = args.next() {
        if arg == "--" {
            leftovers.extend(args.by_ref());
            break;
        }
        let option = arg.split_once('=').map_or(arg.as_str(), |(name, _)| name);
        if VALUE_OPTIONS.contains(&option) {
            let inline = option.len() != arg.len();
            known.push(arg);
            if !inline {
                known.extend(args.next());
            }
        } else if FLAG_OPTIONS.contains(&arg.as_str()) {
            known.push(arg);
        } else {
            leftovers.push(arg);
        }
    }

    (known, leftovers)
}
