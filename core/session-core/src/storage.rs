//! On-disk locations for membership client data.
//!
//! Production code uses [`StorageConfig::from_home`] which points at
//! `~/.membership/`. Tests use [`StorageConfig::with_root`] for isolation.

use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct StorageConfig {
    root: PathBuf,
}

impl StorageConfig {
    /// `~/.membership`, or `None` when no home directory can be found.
    pub fn from_home() -> Option<Self> {
        dirs::home_dir().map(|home| Self {
            root: home.join(".membership"),
        })
    }

    /// Used for testing with temp directories.
    pub fn with_root(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path to store.json (persisted key-value entries).
    pub fn store_file(&self) -> PathBuf {
        self.root.join("store.json")
    }

    /// Path to config.json (sync budgets).
    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.json")
    }
}
