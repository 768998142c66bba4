//! `MetaStore`: an opaque JSON side-store for caller-supplied metadata,
//! keyed by `RecordId`. No schema, no query surface.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde_json::Value;

use crate::errors::StoreError;
use crate::pattern::RecordId;

pub struct MetaStore {
    path: PathBuf,
    entries: RwLock<HashMap<RecordId, Value>>,
    dirty: RwLock<bool>,
}

impl MetaStore {
    /// Loads the store at `path`, or starts empty if it doesn't exist yet.
    ///
    /// # Errors
    /// Returns `StoreError::Json` on malformed content and
    /// `StoreError::SegmentIoError` on I/O failure.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let entries = if path.exists() {
            let raw = fs::read(&path)?;
            serde_json::from_slice(&raw)?
        } else {
            HashMap::new()
        };
        Ok(Self { path, entries: RwLock::new(entries), dirty: RwLock::new(false) })
    }

    pub fn put(&self, id: RecordId, meta: Value) {
        self.entries.write().insert(id, meta);
        *self.dirty.write() = true;
    }

    #[must_use]
    pub fn get(&self, id: &RecordId) -> Option<Value> {
        self.entries.read().get(id).cloned()
    }

    pub fn remove(&self, id: &RecordId) -> Option<Value> {
        let prev = self.entries.write().remove(id);
        if prev.is_some() {
            *self.dirty.write() = true;
        }
        prev
    }

    /// Persists the store via write-temp-then-rename.
    ///
    /// # Errors
    /// Returns `StoreError::SegmentIoError` on I/O failure and
    /// `StoreError::Json` if serialization fails.
    pub fn flush(&self) -> Result<(), StoreError> {
        if !*self.dirty.read() {
            return Ok(());
        }
        let json = serde_json::to_vec_pretty(&*self.entries.read())?;
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, &json)?;
        fs::rename(&tmp_path, &self.path)?;
        *self.dirty.write() = false;
        Ok(())
    }
}
