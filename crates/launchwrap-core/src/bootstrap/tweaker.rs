//! Bundle contracts: what a tweaker must implement and how one is named.

use super::Context;
use crate::LoaderError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A bundle name plus its constructor arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TweakerDescriptor {
    /// Registry name of the bundle.
    pub name: String,
    /// Arguments handed to the bundle factory.
    #[serde(default)]
    pub args: Vec<String>,
}

impl TweakerDescriptor {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }
}

impl From<&str> for TweakerDescriptor {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for TweakerDescriptor {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

/// A plugin bundle activated during bootstrap.
///
/// Callbacks run on the bootstrap thread, once each, in this order:
/// `accept_options`, `inject`, then (for every activated bundle, after the
/// fixpoint) `launch_arguments`. Only the primary bundle is asked for
/// `launch_target`.
pub trait Tweaker: Send {
    /// Receive the leftover command-line tokens and resolved directories.
    fn accept_options(
        &mut self,
        args: &[String],
        game_dir: Option<&Path>,
        assets_dir: Option<&Path>,
        profile: Option<&str>,
    ) -> Result<(), LoaderError>;

    /// Register transformers, exclusions and further bundles.
    fn inject(&mut self, ctx: &mut Context) -> Result<(), LoaderError>;

    /// Fully qualified name of the unit to launch.
    fn launch_target(&self) -> Result<String, LoaderError>;

    /// Tokens this bundle contributes to the entry point's arguments.
    fn launch_arguments(&self) -> Vec<String>;

    /// The argument rewriting capability of this bundle, if it has one.
    fn argument_rewriter(&mut self) -> Option<&mut dyn ArgumentRewriter> {
        None
    }
}

/// Rewrites the fully assembled argument list before launch.
pub trait ArgumentRewriter {
    fn modify_arguments(&mut self, args: &mut Vec<String>);
}
