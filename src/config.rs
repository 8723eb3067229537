//! Broker configuration.
//!
//! # Example scanbridge.yaml
//!
//! ```yaml
//! search_paths:
//!   - ~/.scanbridge/sources
//!   - /opt/vendor/sources
//!
//! use_default_paths: true
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::BrokerResult;

/// Configuration for a broker instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Directories scanned recursively for source modules, in order.
    /// Supports `~` for the home directory.
    pub search_paths: Vec<PathBuf>,

    /// Append the per-platform default locations to the scan.
    pub use_default_paths: bool,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            search_paths: Vec::new(),
            use_default_paths: true,
        }
    }
}

impl BrokerConfig {
    /// Configuration scanning exactly one directory, defaults disabled.
    /// Convenient for tests and embedded hosts.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            search_paths: vec![root.into()],
            use_default_paths: false,
        }
    }

    pub fn from_yaml_str(s: &str) -> BrokerResult<Self> {
        Ok(serde_yaml::from_str(s)?)
    }

    /// All scan roots in order, `~` expanded, duplicates removed.
    pub fn scan_roots(&self) -> Vec<PathBuf> {
        let mut roots = Vec::new();
        for path in &self.search_paths {
            let expanded = expand_home(path);
            if !roots.contains(&expanded) {
                roots.push(expanded);
            }
        }
        if self.use_default_paths {
            for path in default_paths() {
                if !roots.contains(&path) {
                    roots.push(path);
                }
            }
        }
        roots
    }
}

/// Per-platform default source-module locations, user paths first.
fn default_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".scanbridge").join("sources"));
    }

    #[cfg(unix)]
    {
        paths.push(PathBuf::from("/usr/local/lib/scanbridge/sources"));
        paths.push(PathBuf::from("/usr/lib/scanbridge/sources"));
    }

    #[cfg(windows)]
    {
        if let Some(program_data) = std::env::var_os("ProgramData") {
            paths.push(
                PathBuf::from(program_data)
                    .join("scanbridge")
                    .join("sources"),
            );
        }
    }

    paths
}

fn expand_home(path: &Path) -> PathBuf {
    if let Some(path_str) = path.to_str() {
        if let Some(rest) = path_str.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(rest);
            }
        }
    }
    path.to_path_buf()
}
