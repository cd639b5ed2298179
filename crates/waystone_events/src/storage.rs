//! Durable storage for plugin documents.
//!
//! A document is addressed by a relative path such as
//! `Waystone/overworld/PlayerData.json` and is always read and written
//! whole. Stores are synchronous: the plugin calls them inline from a
//! command handler.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::io::{Error as IoError, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tracing::{debug, error, info};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Invalid document path {0}")]
    InvalidPath(String),

    #[error("Failed to read file {0}: {1}")]
    FileRead(PathBuf, IoError),

    #[error("Failed to create directory {0}: {1}")]
    DirectoryCreate(PathBuf, IoError),

    #[error("Failed to create file {0}: {1}")]
    FileCreate(PathBuf, IoError),

    #[error("Failed to write to file {0}: {1}")]
    FileWrite(PathBuf, IoError),

    #[error("Failed to sync file {0}: {1}")]
    FileSync(PathBuf, IoError),

    #[error("Failed to rename file from {0} to {1}: {2}")]
    FileRename(PathBuf, PathBuf, IoError),

    #[error("Store rejected write to {0}")]
    Rejected(String),
}

/// Where plugin documents live.
pub trait ConfigStore: Send + Sync + std::fmt::Debug {
    /// Returns the stored document, or `None` if nothing was ever stored.
    fn load_raw(&self, path: &str) -> Result<Option<String>, StorageError>;

    /// Replaces the stored document. Either the new contents or the previous
    /// ones are visible afterwards, never a mix.
    fn store_raw(&self, path: &str, contents: &str) -> Result<(), StorageError>;
}

/// Documents as files under a root directory.
#[derive(Debug)]
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        if !root.exists() {
            if let Err(e) = fs::create_dir_all(&root) {
                error!("Failed to create data directory {}: {}", root.display(), e);
            }
        }

        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves `path` below the root, refusing anything that would escape it.
    fn resolve(&self, path: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(path);
        let escapes = relative.components().any(|c| {
            matches!(
                c,
                Component::ParentDir | Component::RootDir | Component::Prefix(_)
            )
        });
        if path.is_empty() || escapes {
            return Err(StorageError::InvalidPath(path.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

impl ConfigStore for JsonFileStore {
    fn load_raw(&self, path: &str) -> Result<Option<String>, StorageError> {
        let file_path = self.resolve(path)?;
        match fs::read_to_string(&file_path) {
            Ok(contents) => {
                debug!("Loaded {}", file_path.display());
                Ok(Some(contents))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::FileRead(file_path, e)),
        }
    }

    fn store_raw(&self, path: &str, contents: &str) -> Result<(), StorageError> {
        let file_path = self.resolve(path)?;
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| StorageError::DirectoryCreate(parent.to_path_buf(), e))?;
        }

        let temp_path = file_path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path)
            .map_err(|e| StorageError::FileCreate(temp_path.clone(), e))?;

        file.write_all(contents.as_bytes())
            .map_err(|e| StorageError::FileWrite(temp_path.clone(), e))?;

        file.sync_all()
            .map_err(|e| StorageError::FileSync(temp_path.clone(), e))?;

        // atomic rename
        fs::rename(&temp_path, &file_path)
            .map_err(|e| StorageError::FileRename(temp_path, file_path.clone(), e))?;

        info!("Saved {}", file_path.display());
        Ok(())
    }
}

/// In-memory store, mostly for tests. Writes can be switched to fail.
#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: Mutex<HashMap<String, String>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn get(&self, path: &str) -> Option<String> {
        self.documents.lock().get(path).cloned()
    }

    pub fn insert(&self, path: &str, contents: &str) {
        self.documents
            .lock()
            .insert(path.to_string(), contents.to_string());
    }

    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.documents.lock().keys().cloned().collect();
        paths.sort();
        paths
    }
}

impl ConfigStore for MemoryStore {
    fn load_raw(&self, path: &str) -> Result<Option<String>, StorageError> {
        Ok(self.get(path))
    }

    fn store_raw(&self, path: &str, contents: &str) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Rejected(path.to_string()));
        }
        self.insert(path, contents);
        Ok(())
    }
}
