//! # Launcher Configuration
//!
//! Read from `launchwrap.toml` in the game directory, or from `--config`.
//! Every field has a default, so an absent file is a valid configuration.
//!
//! ```toml
//! launch_target = "launchwrap.main.Inspect"
//!
//! [classpath]
//! origins = ["classes", "libs/extra"]
//!
//! [exclusions]
//! delegation = ["host.api."]
//! bypass = ["assets."]
//!
//! [cache]
//! enabled = true
//! file = "unit_cache.redb"
//! watch_dir = "bundles"
//!
//! [debug]
//! dump_units = false
//! trace_loading = false
//! trace_transformers = false
//! ```

use crate::builtin::INSPECT_ENTRY;
use launchwrap_core::primitives::{CACHE_FILE_NAME, CLASSPATH_ENV, WATCHED_DIR_NAME};
use launchwrap_core::{LoaderError, LoaderSettings};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default configuration file name, looked up in the game directory.
pub const CONFIG_FILE_NAME: &str = "launchwrap.toml";

/// Maximum configuration file size (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

/// Launcher configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Unit the default bundle launches.
    pub launch_target: String,
    pub classpath: ClasspathConfig,
    pub exclusions: ExclusionConfig,
    pub cache: CacheConfig,
    pub debug: DebugConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            launch_target: INSPECT_ENTRY.to_string(),
            classpath: ClasspathConfig::default(),
            exclusions: ExclusionConfig::default(),
            cache: CacheConfig::default(),
            debug: DebugConfig::default(),
        }
    }
}

/// Inputs of the origin discovery chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClasspathConfig {
    /// Explicit origin directories, searched in order.
    pub origins: Vec<PathBuf>,
    /// Environment variable holding a path list, tried when `origins` is empty.
    pub env: String,
}

impl Default for ClasspathConfig {
    fn default() -> Self {
        Self {
            origins: Vec::new(),
            env: CLASSPATH_ENV.to_string(),
        }
    }
}

/// Extra exclusion prefixes on top of the built-in ones.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExclusionConfig {
    pub delegation: Vec<String>,
    pub bypass: Vec<String>,
}

/// Persistent unit cache settings. Paths are relative to the game directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub file: PathBuf,
    /// Directory whose files make up the generation fingerprint.
    pub watch_dir: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            file: PathBuf::from(CACHE_FILE_NAME),
            watch_dir: PathBuf::from(WATCHED_DIR_NAME),
        }
    }
}

/// Diagnostic switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    /// Write every transformed unit to a `UNIT_DUMP` directory.
    pub dump_units: bool,
    pub trace_loading: bool,
    pub trace_transformers: bool,
}

impl DebugConfig {
    #[must_use]
    pub fn loader_settings(&self) -> LoaderSettings {
        LoaderSettings {
            trace_loading: self.trace_loading,
            trace_transformers: self.trace_transformers,
        }
    }
}

impl Config {
    /// Load `explicit`, or `launchwrap.toml` in `game_dir` if present.
    ///
    /// An explicit file must exist; the implicit one is optional.
    pub fn load(explicit: Option<&Path>, game_dir: &Path) -> Result<Self, LoaderError> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => {
                let path = game_dir.join(CONFIG_FILE_NAME);
                if path.is_file() {
                    Self::from_file(&path)
                } else {
                    tracing::debug!("No {} in {}, using defaults", CONFIG_FILE_NAME, game_dir.display());
                    Ok(Self::default())
                }
            }
        }
    }

    /// Read and parse a configuration file.
    pub fn from_file(path: &Path) -> Result<Self, LoaderError> {
        let metadata = std::fs::metadata(path).map_err(|e| {
            LoaderError::IoError(format!("Cannot read config {}: {}", path.display(), e))
        })?;
        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(LoaderError::SerializationError(format!(
                "Config file size {} bytes exceeds maximum allowed {} bytes",
                metadata.len(),
                MAX_CONFIG_FILE_SIZE
            )));
        }
        let text = std::fs::read_to_string(path).map_err(|e| {
            LoaderError::IoError(format!("Cannot read config {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml_str(&text)?;
        tracing::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parse configuration text.
    pub fn from_toml_str(text: &str) -> Result<Self, LoaderError> {
        toml::from_str(text)
            .map_err(|e| LoaderError::SerializationError(format!("Invalid config: {}", e)))
    }
}
