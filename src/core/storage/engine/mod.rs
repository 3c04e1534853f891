//! The Page/Store layer: persistent named key→value stores inside a
//! transactional environment, plus a dedicated sequence store.

pub mod file_channel;
pub mod sequence;
pub mod store;
pub mod transaction;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use crate::core::common::types::TransactionId;
use crate::core::common::OxidbError;
use file_channel::FileChannelRegistry;
use sequence::SequenceStore;
use store::{DuplicateMode, NamedStore};
pub use transaction::StorageTransaction;

/// Owns every named store opened under one data directory, the shared file
/// channel registry, and the monotonic transaction-id counter.
pub struct StorageEngine {
    base_path: PathBuf,
    registry: FileChannelRegistry,
    stores: RwLock<HashMap<String, NamedStore>>,
    sequences: SequenceStore,
    next_tx_id: AtomicU64,
}

impl StorageEngine {
    /// Opens (creating if necessary) the engine rooted at `base_path`.
    ///
    /// # Errors
    /// Returns `Io` if `base_path` cannot be created, or `StoreMissing` if
    /// the sequence store's backing file cannot be opened.
    pub fn open(base_path: &Path) -> Result<Self, OxidbError> {
        std::fs::create_dir_all(base_path)?;
        let registry = FileChannelRegistry::new();
        let sequences = SequenceStore::open(&registry, &base_path.join("_sequences.db"))?;
        Ok(Self {
            base_path: base_path.to_path_buf(),
            registry,
            stores: RwLock::new(HashMap::new()),
            sequences,
            next_tx_id: AtomicU64::new(1),
        })
    }

    /// Opens a named store once; later calls with the same name are no-ops.
    ///
    /// # Errors
    /// Returns `Io`/`StoreMissing` if the backing file cannot be opened.
    pub fn open_store(&self, name: &str, mode: DuplicateMode) -> Result<(), OxidbError> {
        let mut stores = self.write_stores()?;
        if stores.contains_key(name) {
            return Ok(());
        }
        let path = self.base_path.join(format!("{name}.store"));
        let store = NamedStore::open(&self.registry, &path, mode)?;
        stores.insert(name.to_string(), store);
        Ok(())
    }

    /// Removes a named store and its backing file entirely.
    ///
    /// # Errors
    /// Returns `Io` if the backing file cannot be removed.
    pub fn drop_store(&self, name: &str) -> Result<(), OxidbError> {
        let mut stores = self.write_stores()?;
        if let Some(store) = stores.remove(name) {
            let path = store.path().to_path_buf();
            drop(store);
            if path.exists() {
                std::fs::remove_file(path)?;
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn sequences(&self) -> &SequenceStore {
        &self.sequences
    }

    /// Begins a new transaction scoped to `&self`.
    #[must_use]
    pub fn begin(&self) -> StorageTransaction<'_> {
        let id = TransactionId(self.next_tx_id.fetch_add(1, Ordering::SeqCst));
        StorageTransaction::new(self, id)
    }

    pub(crate) fn ensure_store_exists(&self, name: &str) -> Result<(), OxidbError> {
        if self.read_stores()?.contains_key(name) {
            Ok(())
        } else {
            Err(OxidbError::StoreMissing(name.to_string()))
        }
    }

    pub(crate) fn get_committed(&self, name: &str, key: &[u8]) -> Result<Option<Vec<u8>>, OxidbError> {
        let stores = self.read_stores()?;
        let store = stores.get(name).ok_or_else(|| OxidbError::StoreMissing(name.to_string()))?;
        Ok(store.get(key).and_then(|values| values.first().cloned()))
    }

    pub(crate) fn apply_put(&self, name: &str, key: Vec<u8>, value: Vec<u8>) -> Result<(), OxidbError> {
        let mut stores = self.write_stores()?;
        let store = stores.get_mut(name).ok_or_else(|| OxidbError::StoreMissing(name.to_string()))?;
        store.put(key, value);
        Ok(())
    }

    pub(crate) fn apply_delete(&self, name: &str, key: &[u8]) -> Result<(), OxidbError> {
        let mut stores = self.write_stores()?;
        let store = stores.get_mut(name).ok_or_else(|| OxidbError::StoreMissing(name.to_string()))?;
        store.delete(key);
        Ok(())
    }

    pub(crate) fn flush_store(&self, name: &str) -> Result<(), OxidbError> {
        let stores = self.read_stores()?;
        let store = stores.get(name).ok_or_else(|| OxidbError::StoreMissing(name.to_string()))?;
        store.flush()
    }

    /// Returns the number of entries a store currently holds (used by
    /// catalogue `count()` delegation).
    ///
    /// # Errors
    /// Returns `StoreMissing` if `name` has not been opened.
    pub fn store_count(&self, name: &str) -> Result<usize, OxidbError> {
        Ok(self
            .read_stores()?
            .get(name)
            .ok_or_else(|| OxidbError::StoreMissing(name.to_string()))?
            .count())
    }

    /// Applies `f` to the store's entries in ascending key order, without
    /// going through a transaction (used by read-only cursors).
    ///
    /// # Errors
    /// Returns `StoreMissing` if `name` has not been opened.
    pub fn with_store_entries<R>(
        &self,
        name: &str,
        f: impl FnOnce(&mut dyn Iterator<Item = (&Vec<u8>, &Vec<Vec<u8>>)>) -> R,
    ) -> Result<R, OxidbError> {
        let stores = self.read_stores()?;
        let store = stores.get(name).ok_or_else(|| OxidbError::StoreMissing(name.to_string()))?;
        let mut iter = store.iter();
        Ok(f(&mut iter))
    }

    fn read_stores(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, HashMap<String, NamedStore>>, OxidbError> {
        self.stores.read().map_err(|_| OxidbError::Other("store table poisoned".to_string()))
    }

    fn write_stores(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<String, NamedStore>>, OxidbError> {
        self.stores.write().map_err(|_| OxidbError::Other("store table poisoned".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_store_is_idempotent() {
        let dir = tempdir().unwrap();
        let engine = StorageEngine::open(dir.path()).unwrap();
        engine.open_store("main.features", DuplicateMode::Unique).unwrap();
        engine.open_store("main.features", DuplicateMode::Unique).unwrap();
        assert_eq!(engine.store_count("main.features").unwrap(), 0);
    }

    #[test]
    fn committed_writes_are_visible_to_new_transactions() {
        let dir = tempdir().unwrap();
        let engine = StorageEngine::open(dir.path()).unwrap();
        engine.open_store("main.features", DuplicateMode::Unique).unwrap();
        let mut tx = engine.begin();
        tx.put("main.features", b"k".to_vec(), b"v".to_vec()).unwrap();
        tx.commit().unwrap();

        let tx2 = engine.begin();
        assert_eq!(tx2.get("main.features", b"k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn unopened_store_is_store_missing() {
        let dir = tempdir().unwrap();
        let engine = StorageEngine::open(dir.path()).unwrap();
        assert!(matches!(engine.store_count("ghost"), Err(OxidbError::StoreMissing(_))));
    }
}
