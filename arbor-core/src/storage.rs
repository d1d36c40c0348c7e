//! File-backed extension storage
//!
//! Each extension's record is one JSON document at
//! `<storage_root>/<name>.json`. Every operation performs a full
//! read-modify-write of that document under a provider-wide lock, so
//! concurrent hook callbacks cannot interleave partial updates. Backend
//! failures are logged and degrade to empty reads or dropped writes;
//! the [`ExtensionStore`] surface extensions see never errors.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde_json::{Map, Value};
use tracing::warn;

use arbor_extension_api::ExtensionStore;

use crate::error::StorageError;

/// Provider managing one storage directory for all extensions
pub struct StorageProvider {
    root: PathBuf,
    io: Mutex<()>,
}

impl StorageProvider {
    /// Create a provider rooted at a directory.
    ///
    /// The directory is created lazily on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            io: Mutex::new(()),
        }
    }

    /// The storage root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Hand out a store scoped to one extension's record
    pub fn scope(self: &Arc<Self>, extension: &str) -> ScopedStore {
        ScopedStore {
            provider: Arc::clone(self),
            extension: extension.to_string(),
        }
    }

    fn record_path(&self, extension: &str) -> PathBuf {
        self.root.join(format!("{extension}.json"))
    }

    /// Read an extension's document, treating unreadable or corrupt
    /// records as empty
    fn read_document(&self, extension: &str) -> Map<String, Value> {
        let path = self.record_path(extension);
        if !path.exists() {
            return Map::new();
        }
        match self.try_read(&path) {
            Ok(document) => document,
            Err(e) => {
                warn!(
                    extension = %extension,
                    error = %e,
                    "unreadable storage record, starting from empty"
                );
                Map::new()
            }
        }
    }

    fn try_read(&self, path: &Path) -> Result<Map<String, Value>, StorageError> {
        let content = fs::read_to_string(path).map_err(|source| StorageError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        match serde_json::from_str::<Value>(&content) {
            Ok(Value::Object(document)) => Ok(document),
            Ok(_) => Err(StorageError::Corrupt {
                path: path.to_path_buf(),
                reason: "top-level value is not a JSON object".to_string(),
            }),
            Err(e) => Err(StorageError::Corrupt {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }),
        }
    }

    fn write_document(
        &self,
        extension: &str,
        document: &Map<String, Value>,
    ) -> Result<(), StorageError> {
        fs::create_dir_all(&self.root).map_err(|source| StorageError::Io {
            path: self.root.clone(),
            source,
        })?;

        let path = self.record_path(extension);
        let content =
            serde_json::to_string_pretty(document).map_err(|e| StorageError::Corrupt {
                path: path.clone(),
                reason: e.to_string(),
            })?;
        fs::write(&path, content).map_err(|source| StorageError::Io { path, source })
    }

    fn remove_document(&self, extension: &str) -> Result<(), StorageError> {
        let path = self.record_path(extension);
        if path.exists() {
            fs::remove_file(&path).map_err(|source| StorageError::Io { path, source })?;
        }
        Ok(())
    }
}

/// [`ExtensionStore`] view over one extension's record.
///
/// Cheap to clone-by-construction: holds the provider behind an `Arc`,
/// so hook callbacks can capture one and use it from any task.
pub struct ScopedStore {
    provider: Arc<StorageProvider>,
    extension: String,
}

impl ScopedStore {
    fn warn_write_failed(&self, e: &StorageError) {
        warn!(
            extension = %self.extension,
            error = %e,
            "storage write failed, update dropped"
        );
    }
}

impl ExtensionStore for ScopedStore {
    fn get(&self, key: &str) -> Option<Value> {
        let _guard = self.provider.io.lock().unwrap();
        self.provider.read_document(&self.extension).remove(key)
    }

    fn get_all(&self) -> Map<String, Value> {
        let _guard = self.provider.io.lock().unwrap();
        self.provider.read_document(&self.extension)
    }

    fn set(&self, key: &str, value: Value) {
        let _guard = self.provider.io.lock().unwrap();
        let mut document = self.provider.read_document(&self.extension);
        document.insert(key.to_string(), value);
        if let Err(e) = self.provider.write_document(&self.extension, &document) {
            self.warn_write_failed(&e);
        }
    }

    fn merge(&self, values: Map<String, Value>) {
        if values.is_empty() {
            return;
        }
        let _guard = self.provider.io.lock().unwrap();
        let mut document = self.provider.read_document(&self.extension);
        for (key, value) in values {
            document.insert(key, value);
        }
        if let Err(e) = self.provider.write_document(&self.extension, &document) {
            self.warn_write_failed(&e);
        }
    }

    fn delete(&self, key: &str) -> bool {
        let _guard = self.provider.io.lock().unwrap();
        let mut document = self.provider.read_document(&self.extension);
        let existed = document.remove(key).is_some();
        if existed
            && let Err(e) = self.provider.write_document(&self.extension, &document)
        {
            self.warn_write_failed(&e);
        }
        existed
    }

    fn clear(&self) {
        let _guard = self.provider.io.lock().unwrap();
        if let Err(e) = self.provider.remove_document(&self.extension) {
            warn!(
                extension = %self.extension,
                error = %e,
                "failed to remove storage record"
            );
        }
    }

    fn keys(&self) -> Vec<String> {
        let _guard = self.provider.io.lock().unwrap();
        self.provider
            .read_document(&self.extension)
            .keys()
            .cloned()
            .collect()
    }
}
