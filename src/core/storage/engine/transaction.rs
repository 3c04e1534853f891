//! Scoped transaction handles over the engine's named stores.
//!
//! A `StorageTransaction` buffers writes in memory (read-your-own-writes);
//! `commit` applies the buffer to the underlying stores and flushes them,
//! `rollback` simply discards it.

use std::collections::HashMap;

use crate::core::common::types::TransactionId;
use crate::core::common::OxidbError;
use crate::core::storage::engine::StorageEngine;

#[derive(Debug, Clone)]
enum PendingOp {
    Put(Vec<u8>),
    Delete,
}

/// An in-flight transaction against a `StorageEngine`.
pub struct StorageTransaction<'engine> {
    engine: &'engine StorageEngine,
    id: TransactionId,
    pending: HashMap<String, HashMap<Vec<u8>, PendingOp>>,
    active: bool,
}

impl<'engine> StorageTransaction<'engine> {
    pub(crate) fn new(engine: &'engine StorageEngine, id: TransactionId) -> Self {
        Self { engine, id, pending: HashMap::new(), active: true }
    }

    #[must_use]
    pub const fn id(&self) -> TransactionId {
        self.id
    }

    /// Reads `key` from `store`, preferring this transaction's own
    /// uncommitted writes over the committed value.
    ///
    /// # Errors
    /// Returns `StoreMissing` if `store` has not been opened.
    pub fn get(&self, store: &str, key: &[u8]) -> Result<Option<Vec<u8>>, OxidbError> {
        if let Some(overlay) = self.pending.get(store) {
            if let Some(op) = overlay.get(key) {
                return Ok(match op {
                    PendingOp::Put(v) => Some(v.clone()),
                    PendingOp::Delete => None,
                });
            }
        }
        self.engine.get_committed(store, key)
    }

    /// Buffers `put`, visible to subsequent reads on this transaction but
    /// not to other transactions until `commit`.
    ///
    /// # Errors
    /// Returns `StoreMissing` if `store` has not been opened.
    pub fn put(&mut self, store: &str, key: Vec<u8>, value: Vec<u8>) -> Result<(), OxidbError> {
        self.engine.ensure_store_exists(store)?;
        self.pending.entry(store.to_string()).or_default().insert(key, PendingOp::Put(value));
        Ok(())
    }

    /// # Errors
    /// Returns `StoreMissing` if `store` has not been opened.
    pub fn delete(&mut self, store: &str, key: &[u8]) -> Result<(), OxidbError> {
        self.engine.ensure_store_exists(store)?;
        self.pending.entry(store.to_string()).or_default().insert(key.to_vec(), PendingOp::Delete);
        Ok(())
    }

    /// Applies every buffered write to its store and flushes the affected
    /// stores to disk.
    ///
    /// # Errors
    /// Returns `ClosedDbo` if the transaction was already finished, or an
    /// I/O error if a flush fails.
    pub fn commit(mut self) -> Result<(), OxidbError> {
        if !self.active {
            return Err(OxidbError::ClosedDbo(format!("transaction {}", self.id.0)));
        }
        self.active = false;
        for (store, ops) in self.pending.drain() {
            for (key, op) in ops {
                match op {
                    PendingOp::Put(value) => self.engine.apply_put(&store, key, value)?,
                    PendingOp::Delete => self.engine.apply_delete(&store, &key)?,
                }
            }
            self.engine.flush_store(&store)?;
        }
        Ok(())
    }

    /// Every `(key, value)` visible to this transaction in `store`: committed
    /// entries overlaid with this transaction's own pending writes, in
    /// ascending key order. Used by composite cursors (entity scans,
    /// `optimize()`) that must see their own uncommitted writes.
    ///
    /// # Errors
    /// Returns `StoreMissing` if `store` has not been opened.
    pub fn scan(&self, store: &str) -> Result<Vec<(Vec<u8>, Vec<u8>)>, OxidbError> {
        let mut merged: std::collections::BTreeMap<Vec<u8>, Vec<u8>> =
            self.engine.with_store_entries(store, |entries| {
                entries.filter_map(|(k, vs)| vs.first().map(|v| (k.clone(), v.clone()))).collect()
            })?;
        if let Some(overlay) = self.pending.get(store) {
            for (key, op) in overlay {
                match op {
                    PendingOp::Put(value) => {
                        merged.insert(key.clone(), value.clone());
                    }
                    PendingOp::Delete => {
                        merged.remove(key);
                    }
                }
            }
        }
        Ok(merged.into_iter().collect())
    }

    /// Discards every buffered write.
    ///
    /// # Errors
    /// Returns `ClosedDbo` if the transaction was already finished.
    pub fn rollback(mut self) -> Result<(), OxidbError> {
        if !self.active {
            return Err(OxidbError::ClosedDbo(format!("transaction {}", self.id.0)));
        }
        self.active = false;
        self.pending.clear();
        Ok(())
    }
}

impl Drop for StorageTransaction<'_> {
    fn drop(&mut self) {
        // An unfinished transaction (panic unwind, forgotten handle) rolls
        // back rather than silently committing partial state.
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::storage::engine::store::DuplicateMode;
    use tempfile::tempdir;

    #[test]
    fn reads_see_own_uncommitted_writes() {
        let dir = tempdir().unwrap();
        let engine = StorageEngine::open(dir.path()).unwrap();
        engine.open_store("main.features", DuplicateMode::Unique).unwrap();
        let mut tx = engine.begin();
        tx.put("main.features", b"k".to_vec(), b"v".to_vec()).unwrap();
        assert_eq!(tx.get("main.features", b"k").unwrap(), Some(b"v".to_vec()));
        tx.commit().unwrap();
    }

    #[test]
    fn rollback_discards_writes() {
        let dir = tempdir().unwrap();
        let engine = StorageEngine::open(dir.path()).unwrap();
        engine.open_store("main.features", DuplicateMode::Unique).unwrap();
        let mut tx = engine.begin();
        tx.put("main.features", b"k".to_vec(), b"v".to_vec()).unwrap();
        tx.rollback().unwrap();
        let tx2 = engine.begin();
        assert_eq!(tx2.get("main.features", b"k").unwrap(), None);
    }
}
