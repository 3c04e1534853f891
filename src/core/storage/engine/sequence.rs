//! The sequence store: dedicated 8-byte big-endian signed-long counters,
//! one per entity, advanced atomically within a transaction.

use std::path::Path;
use std::sync::Mutex;

use crate::core::common::OxidbError;
use crate::core::storage::engine::file_channel::FileChannelRegistry;
use crate::core::storage::engine::store::{DuplicateMode, NamedStore};

pub struct SequenceStore {
    store: Mutex<NamedStore>,
}

impl SequenceStore {
    /// # Errors
    /// Returns `Io`/`StoreMissing` if the backing file cannot be opened.
    pub fn open(registry: &FileChannelRegistry, path: &Path) -> Result<Self, OxidbError> {
        Ok(Self { store: Mutex::new(NamedStore::open(registry, path, DuplicateMode::Unique)?) })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, NamedStore>, OxidbError> {
        self.store.lock().map_err(|_| OxidbError::Other("sequence store poisoned".to_string()))
    }

    /// Reads the current value of `name`'s sequence, 0 if never initialized.
    ///
    /// # Errors
    /// Returns `DataCorruption` if the stored value is not 8 bytes.
    pub fn current(&self, name: &str) -> Result<i64, OxidbError> {
        let store = self.lock()?;
        match store.get(name.as_bytes()) {
            None => Ok(0),
            Some(values) => decode(values.first().ok_or_else(|| {
                OxidbError::DataCorruption(format!("empty sequence entry for {name}"))
            })?),
        }
    }

    /// Atomically advances `name`'s sequence and returns the new value.
    ///
    /// # Errors
    /// Returns `DataCorruption` if the existing stored value is malformed.
    pub fn next(&self, name: &str) -> Result<i64, OxidbError> {
        let mut store = self.lock()?;
        let current = match store.get(name.as_bytes()) {
            None => 0,
            Some(values) => decode(values.first().ok_or_else(|| {
                OxidbError::DataCorruption(format!("empty sequence entry for {name}"))
            })?)?,
        };
        let next = current + 1;
        store.put(name.as_bytes().to_vec(), encode(next));
        Ok(next)
    }

    pub fn initialize(&self, name: &str) -> Result<(), OxidbError> {
        let mut store = self.lock()?;
        store.put(name.as_bytes().to_vec(), encode(0));
        Ok(())
    }

    pub fn remove(&self, name: &str) -> Result<(), OxidbError> {
        let mut store = self.lock()?;
        store.delete(name.as_bytes());
        Ok(())
    }

    /// # Errors
    /// Returns `Io` if the write fails.
    pub fn flush(&self) -> Result<(), OxidbError> {
        self.lock()?.flush()
    }
}

fn encode(value: i64) -> Vec<u8> {
    value.to_be_bytes().to_vec()
}

fn decode(bytes: &[u8]) -> Result<i64, OxidbError> {
    let arr: [u8; 8] = bytes
        .try_into()
        .map_err(|_| OxidbError::DataCorruption("sequence value is not 8 bytes".to_string()))?;
    Ok(i64::from_be_bytes(arr))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn sequence_counts_up_from_zero_and_never_decreases() {
        let dir = tempdir().unwrap();
        let registry = FileChannelRegistry::new();
        let seq = SequenceStore::open(&registry, &dir.path().join("seq.db")).unwrap();
        seq.initialize("main.features").unwrap();
        assert_eq!(seq.current("main.features").unwrap(), 0);
        assert_eq!(seq.next("main.features").unwrap(), 1);
        assert_eq!(seq.next("main.features").unwrap(), 2);
        assert_eq!(seq.current("main.features").unwrap(), 2);
    }
}
