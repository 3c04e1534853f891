//! Shared, reference-counted file channels keyed by path.
//!
//! Two stores that happen to share a backing file (the common case for a
//! schema's entity/column/index stores, which all live under one data
//! directory) reuse the same open `File` handle. The last `Arc` dropped
//! closes the handle.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Weak};

use crate::core::common::OxidbError;

#[derive(Default)]
pub struct FileChannelRegistry {
    open: Mutex<HashMap<PathBuf, Weak<Mutex<File>>>>,
}

impl FileChannelRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens (or reuses) a read/write, create-if-missing channel to `path`.
    ///
    /// # Errors
    /// Returns `Io` if the file cannot be opened.
    pub fn open(&self, path: &Path) -> Result<Arc<Mutex<File>>, OxidbError> {
        let mut open = self.open.lock().map_err(|_| OxidbError::Other("file registry poisoned".to_string()))?;
        if let Some(existing) = open.get(path).and_then(Weak::upgrade) {
            return Ok(existing);
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().read(true).write(true).create(true).open(path)?;
        let handle = Arc::new(Mutex::new(file));
        open.insert(path.to_path_buf(), Arc::downgrade(&handle));
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn reopening_the_same_path_shares_the_handle() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.db");
        let registry = FileChannelRegistry::new();
        let a = registry.open(&path).unwrap();
        let b = registry.open(&path).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn dropping_all_references_allows_reopen_as_fresh_handle() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.db");
        let registry = FileChannelRegistry::new();
        {
            let _a = registry.open(&path).unwrap();
        }
        let b = registry.open(&path).unwrap();
        assert_eq!(Arc::strong_count(&b), 1);
    }
}
