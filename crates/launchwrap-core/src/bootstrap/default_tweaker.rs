//! The built-in bundle used when no `--tweakClass` is given.
//!
//! Reads the launch target from the blackboard and passes the profile,
//! directories and leftover tokens through to the entry point.

use super::{Context, Tweaker};
use crate::LoaderError;
use crate::primitives::{DEFAULT_TWEAKER, blackboard_keys};
use std::path::{Path, PathBuf};

#[derive(Debug, Default)]
pub struct DefaultTweaker {
    args: Vec<String>,
    game_dir: Option<PathBuf>,
    assets_dir: Option<PathBuf>,
    profile: Option<String>,
    target: Option<String>,
}

impl DefaultTweaker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Tweaker for DefaultTweaker {
    fn accept_options(
        &mut self,
        args: &[String],
        game_dir: Option<&Path>,
        assets_dir: Option<&Path>,
        profile: Option<&str>,
    ) -> Result<(), LoaderError> {
        self.args = args.to_vec();
        self.game_dir = game_dir.map(Path::to_path_buf);
        self.assets_dir = assets_dir.map(Path::to_path_buf);
        self.profile = profile.map(str::to_string);
        Ok(())
    }

    fn inject(&mut self, ctx: &mut Context) -> Result<(), LoaderError> {
        self.target = ctx
            .blackboard
            .get::<String>(blackboard_keys::LAUNCH_TARGET)
            .cloned();
        Ok(())
    }

    fn launch_target(&self) -> Result<String, LoaderError> {
        self.target.clone().ok_or_else(|| {
            LoaderError::plugin(
                DEFAULT_TWEAKER,
                format!("no {} on the blackboard", blackboard_keys::LAUNCH_TARGET),
            )
        })
    }

    fn launch_arguments(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(self.args.len() + 6);
        if let Some(profile) = &self.profile {
            out.push("--version".to_string());
            out.push(profile.clone());
        }
        if let Some(dir) = &self.game_dir {
            out.push("--gameDir".to_string());
            out.push(dir.display().to_string());
        }
        if let Some(dir) = &self.assets_dir {
            out.push("--assetsDir".to_string());
            out.push(dir.display().to_string());
        }
        out.extend(self.args.iter().cloned());
        out
    }
}
