//! Storage targets
//!
//! A target is where a payload ends up: a file, a platform store, a remote
//! service. Targets only move bytes; they never see the entity. Every method
//! is blocking and is only ever called from an executor's worker, one call at
//! a time per manager.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use super::types::SaveError;

/// Destination for persisted bytes
pub trait StorageTarget: Send + Sync {
    /// Human readable identity, used in logs
    fn name(&self) -> &str;

    fn read(&self) -> Result<Vec<u8>, SaveError>;

    fn write(&self, data: &[u8]) -> Result<(), SaveError>;

    fn delete(&self) -> Result<(), SaveError>;
}

/// File under an application-private directory
#[derive(Debug, Clone)]
pub struct FileTarget {
    name: String,
    path: PathBuf,
}

impl FileTarget {
    /// Creates a target for `root/name`.
    ///
    /// `name` may contain `/` to place the file in a subdirectory; it must be
    /// relative and must not climb out of `root`. Nothing is touched on disk
    /// until the first write.
    pub fn new(root: impl AsRef<Path>, name: &str) -> Result<Self, SaveError> {
        let relative = Path::new(name);
        if name.trim().is_empty() {
            return Err(SaveError::InvalidTarget("empty file name".to_string()));
        }
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(SaveError::InvalidTarget(format!(
                "{:?} must be a relative path inside the save directory",
                name
            )));
        }

        Ok(FileTarget {
            name: name.to_string(),
            path: root.as_ref().join(relative),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut file_name = self.path.file_name().unwrap_or_default().to_os_string();
        file_name.push(".tmp");
        self.path.with_file_name(file_name)
    }
}

impl StorageTarget for FileTarget {
    fn name(&self) -> &str {
        &self.name
    }

    fn read(&self) -> Result<Vec<u8>, SaveError> {
        Ok(fs::read(&self.path)?)
    }

    fn write(&self, data: &[u8]) -> Result<(), SaveError> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }

        // Write next to the destination, then swap it in
        let tmp = self.temp_path();
        fs::write(&tmp, data)?;
        if let Err(e) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }

    fn delete(&self) -> Result<(), SaveError> {
        Ok(fs::remove_file(&self.path)?)
    }
}

/// In-process keyed byte store.
///
/// Stands in for platform storage (console save data, cloud slots) and is
/// handy in tests. Cloning shares the same underlying map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.entries.read().get(key).cloned()
    }

    pub fn insert(&self, key: &str, data: Vec<u8>) {
        self.entries.write().insert(key.to_string(), data);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

/// One key inside a `MemoryStore`
#[derive(Debug, Clone)]
pub struct MemoryTarget {
    store: MemoryStore,
    key: String,
}

impl MemoryTarget {
    pub fn new(store: &MemoryStore, key: &str) -> Self {
        Self {
            store: store.clone(),
            key: key.to_string(),
        }
    }

    fn missing(&self) -> SaveError {
        SaveError::Io(io::Error::new(
            io::ErrorKind::NotFound,
            format!("no entry named {}", self.key),
        ))
    }
}

impl StorageTarget for MemoryTarget {
    fn name(&self) -> &str {
        &self.key
    }

    fn read(&self) -> Result<Vec<u8>, SaveError> {
        self.store.get(&self.key).ok_or_else(|| self.missing())
    }

    fn write(&self, data: &[u8]) -> Result<(), SaveError> {
        self.store.insert(&self.key, data.to_vec());
        Ok(())
    }

    fn delete(&self) -> Result<(), SaveError> {
        match self.store.entries.write().remove(&self.key) {
            Some(_) => Ok(()),
            None => Err(self.missing()),
        }
    }
}
