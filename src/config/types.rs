//! Configuration types.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::gpg::{ProcessLauncher, RejectMatcher, RejectPattern, GLOBAL_ARGS, GPG_BINARY};

use super::ConfigError;

/// Configuration for the gpg shim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShimConfig {
    /// gpg binary to spawn.
    #[serde(default = "default_binary")]
    pub binary: String,
    /// Flags prepended to every invocation.
    #[serde(default = "default_global_args")]
    pub global_args: Vec<String>,
    /// Working directory for spawned processes.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    /// Stderr phrases treated as failures in streaming mode.
    #[serde(default = "RejectMatcher::default_patterns", rename = "reject")]
    pub reject_patterns: Vec<RejectPattern>,
}

fn default_binary() -> String {
    GPG_BINARY.to_string()
}

fn default_global_args() -> Vec<String> {
    GLOBAL_ARGS.iter().map(|s| (*s).to_string()).collect()
}

impl ShimConfig {
    /// Build a process launcher from this configuration.
    #[must_use]
    pub fn launcher(&self) -> ProcessLauncher {
        let launcher =
            ProcessLauncher::with_binary(&self.binary).global_args(self.global_args.clone());
        match &self.working_dir {
            Some(dir) => launcher.working_dir(dir),
            None => launcher,
        }
    }

    /// Check values that parse but cannot work, such as an empty reject
    /// needle, which would match every line gpg writes to stderr.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::EmptyRejectNeedle` naming `path` and the
    /// offending pattern index.
    pub fn validate(&self, path: &Path) -> Result<(), ConfigError> {
        match self.reject_patterns.iter().position(|p| p.needle.is_empty()) {
            Some(index) => Err(ConfigError::EmptyRejectNeedle {
                path: path.to_path_buf(),
                index,
            }),
            None => Ok(()),
        }
    }

    /// Build the stderr reject matcher from this configuration.
    #[must_use]
    pub fn reject_matcher(&self) -> RejectMatcher {
        RejectMatcher::new(self.reject_patterns.clone())
    }
}

impl Default for ShimConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            global_args: default_global_args(),
            working_dir: None,
            reject_patterns: RejectMatcher::default_patterns(),
        }
    }
}
