//! File-backed key-value store.
//!
//! # File Format
//!
//! ```json
//! {
//!   "version": 1,
//!   "entries": {
//!     "sb-project-auth-token": "{\"access_token\": ...}"
//!   }
//! }
//! ```
//!
//! Empty files, corrupt JSON and unknown versions load as an empty store.
//! Every mutation rewrites the whole file through a temp file + rename.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use fs_err as fs;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use super::KeyValueStore;
use crate::error::{Result, SyncError};

const STORE_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    entries: BTreeMap<String, String>,
}

pub struct FileStore {
    entries: Mutex<BTreeMap<String, String>>,
    file_path: PathBuf,
}

impl FileStore {
    /// Opens the store at `file_path`. A missing file is an empty store.
    pub fn open(file_path: &Path) -> Result<Self> {
        let entries = if file_path.exists() {
            load_entries(file_path)?
        } else {
            BTreeMap::new()
        };
        Ok(FileStore {
            entries: Mutex::new(entries),
            file_path: file_path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Applies `change` to a copy and only adopts it once the file is
    /// written, so a failed write leaves memory matching disk.
    fn update<F>(&self, change: F) -> Result<()>
    where
        F: FnOnce(&mut BTreeMap<String, String>) -> bool,
    {
        let mut entries = self.lock();
        let mut next = entries.clone();
        if !change(&mut next) {
            return Ok(());
        }
        self.persist(&next)?;
        *entries = next;
        Ok(())
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        let store_file = StoreFile {
            version: STORE_VERSION,
            entries: entries.clone(),
        };
        let content = serde_json::to_string_pretty(&store_file).map_err(|source| {
            SyncError::Json {
                context: "serializing store".to_string(),
                source,
            }
        })?;

        let parent_dir = self.file_path.parent().ok_or_else(|| SyncError::Store {
            context: self.file_path.display().to_string(),
            details: "store path has no parent directory".to_string(),
        })?;
        fs::create_dir_all(parent_dir).map_err(|source| SyncError::Io {
            context: format!("creating {}", parent_dir.display()),
            source,
        })?;

        let mut temp_file = NamedTempFile::new_in(parent_dir).map_err(|source| SyncError::Io {
            context: "creating temp store file".to_string(),
            source,
        })?;
        temp_file
            .write_all(content.as_bytes())
            .and_then(|_| temp_file.flush())
            .map_err(|source| SyncError::Io {
                context: "writing temp store file".to_string(),
                source,
            })?;
        temp_file
            .persist(&self.file_path)
            .map_err(|err| SyncError::Io {
                context: format!("replacing {}", self.file_path.display()),
                source: err.error,
            })?;
        Ok(())
    }
}

fn load_entries(file_path: &Path) -> Result<BTreeMap<String, String>> {
    let content = fs::read_to_string(file_path).map_err(|source| SyncError::Io {
        context: format!("reading {}", file_path.display()),
        source,
    })?;

    if content.trim().is_empty() {
        tracing::warn!(path = %file_path.display(), "Empty store file, starting empty");
        return Ok(BTreeMap::new());
    }

    match serde_json::from_str::<StoreFile>(&content) {
        Ok(store_file) if store_file.version == STORE_VERSION => Ok(store_file.entries),
        Ok(store_file) => {
            tracing::warn!(
                path = %file_path.display(),
                version = store_file.version,
                expected = STORE_VERSION,
                "Unsupported store file version, starting empty"
            );
            Ok(BTreeMap::new())
        }
        Err(err) => {
            tracing::warn!(
                path = %file_path.display(),
                error = %err,
                "Failed to parse store file, starting empty"
            );
            Ok(BTreeMap::new())
        }
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.update(|entries| {
            entries.insert(key.to_string(), value.to_string());
            true
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.update(|entries| entries.remove(key).is_some())
    }

    fn clear_all(&self) -> Result<()> {
        self.update(|entries| {
            entries.clear();
            true
        })
    }

    fn keys(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }
}
