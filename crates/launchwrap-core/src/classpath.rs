//! # Origin Discovery
//!
//! Finds the search path the byte source draws from. Discovery is a ranked
//! fallback chain: each strategy either produces a list of locations or fails
//! recoverably, and the first success wins.

use crate::LoaderError;
use crate::source::{DirectoryOrigin, Origin};
use std::path::PathBuf;
use std::sync::Arc;

/// One way of discovering the search path.
pub trait DiscoveryStrategy: Send + Sync {
    /// Strategy name for logs.
    fn name(&self) -> &'static str;

    /// Discovered locations, or an error if this strategy does not apply.
    fn discover(&self) -> Result<Vec<PathBuf>, LoaderError>;
}

/// A fixed list of locations (from configuration).
#[derive(Debug, Clone, Default)]
pub struct ExplicitPaths(pub Vec<PathBuf>);

impl DiscoveryStrategy for ExplicitPaths {
    fn name(&self) -> &'static str {
        "explicit"
    }

    fn discover(&self) -> Result<Vec<PathBuf>, LoaderError> {
        if self.0.is_empty() {
            return Err(LoaderError::IoError(
                "No explicit origins configured".to_string(),
            ));
        }
        Ok(self.0.clone())
    }
}

/// A platform path list read from an environment variable.
#[derive(Debug, Clone)]
pub struct EnvPathList {
    pub variable: String,
}

impl EnvPathList {
    #[must_use]
    pub fn new(variable: impl Into<String>) -> Self {
        Self {
            variable: variable.into(),
        }
    }
}

impl DiscoveryStrategy for EnvPathList {
    fn name(&self) -> &'static str {
        "environment"
    }

    fn discover(&self) -> Result<Vec<PathBuf>, LoaderError> {
        let value = std::env::var_os(&self.variable).ok_or_else(|| {
            LoaderError::IoError(format!("{} is not set", self.variable))
        })?;
        let paths: Vec<PathBuf> = std::env::split_paths(&value)
            .filter(|p| !p.as_os_str().is_empty())
            .collect();
        if paths.is_empty() {
            return Err(LoaderError::IoError(format!("{} is empty", self.variable)));
        }
        Ok(paths)
    }
}

/// The directory containing the running executable.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecutableDir;

impl DiscoveryStrategy for ExecutableDir {
    fn name(&self) -> &'static str {
        "executable-dir"
    }

    fn discover(&self) -> Result<Vec<PathBuf>, LoaderError> {
        let exe = std::env::current_exe().map_err(|e| LoaderError::IoError(e.to_string()))?;
        let dir = exe.parent().ok_or_else(|| {
            LoaderError::IoError(format!("{} has no parent directory", exe.display()))
        })?;
        Ok(vec![dir.to_path_buf()])
    }
}

/// Try each strategy in order; the first success wins.
pub fn discover(chain: &[Box<dyn DiscoveryStrategy>]) -> Result<Vec<PathBuf>, LoaderError> {
    for strategy in chain {
        match strategy.discover() {
            Ok(paths) => {
                tracing::debug!(
                    "Discovered {} origins with the {} strategy",
                    paths.len(),
                    strategy.name()
                );
                return Ok(paths);
            }
            Err(e) => {
                tracing::debug!("Origin discovery strategy {} failed: {}", strategy.name(), e);
            }
        }
    }
    Err(LoaderError::ClasspathUnavailable(chain.len()))
}

/// Directory origins for the discovered locations that exist.
pub fn directory_origins(paths: &[PathBuf]) -> Vec<Arc<dyn Origin>> {
    let mut origins: Vec<Arc<dyn Origin>> = Vec::with_capacity(paths.len());
    for path in paths {
        if path.is_dir() {
            origins.push(Arc::new(DirectoryOrigin::new(path.clone())));
        } else {
            tracing::warn!("Skipping origin {}: not a directory", path.display());
        }
    }
    origins
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Failing;

    impl DiscoveryStrategy for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn discover(&self) -> Result<Vec<PathBuf>, LoaderError> {
            Err(LoaderError::IoError("nope".to_string()))
        }
    }

    #[test]
    fn first_success_wins() {
        let chain: Vec<Box<dyn DiscoveryStrategy>> = vec![
            Box::new(Failing),
            Box::new(ExplicitPaths(vec![PathBuf::from("a")])),
            Box::new(ExplicitPaths(vec![PathBuf::from("b")])),
        ];
        assert_eq!(discover(&chain).expect("discover"), vec![PathBuf::from("a")]);
    }

    #[test]
    fn all_failing_is_unavailable() {
        let chain: Vec<Box<dyn DiscoveryStrategy>> =
            vec![Box::new(Failing), Box::new(ExplicitPaths::default())];
        assert!(matches!(
            discover(&chain),
            Err(LoaderError::ClasspathUnavailable(2))
        ));
    }

    #[test]
    fn executable_dir_resolves() {
        let paths = ExecutableDir.discover().expect("exe dir");
        assert_eq!(paths.len(), 1);
    }

    #[test]
    fn missing_directories_are_skipped() {
        let temp = tempfile::tempdir().expect("temp dir");
        let origins = directory_origins(&[
            temp.path().to_path_buf(),
            temp.path().join("does-not-exist"),
        ]);
        assert_eq!(origins.len(), 1);
    }
}
