//! Named key→value stores, opened under one of three duplicate modes.

use std::collections::BTreeMap;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::core::common::OxidbError;
use crate::core::storage::engine::file_channel::FileChannelRegistry;

/// How a named store handles repeated keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateMode {
    /// `put` replaces the existing value for a key.
    Unique,
    /// Like `Unique`, but keys are additionally namespaced by a caller-given
    /// prefix (e.g. per-column stores sharing one entity's data file).
    UniquePrefixed,
    /// `put` appends a new value; `get` returns all values for the key in
    /// insertion order (used by inverted/secondary index postings).
    WithDuplicatesPrefixed,
}

/// An in-memory key→value map, snapshot-persisted to a single backing file.
///
/// Values are stored as `Vec<Vec<u8>>` uniformly; `Unique`/`UniquePrefixed`
/// stores simply never hold more than one value per key.
pub struct NamedStore {
    path: PathBuf,
    mode: DuplicateMode,
    data: BTreeMap<Vec<u8>, Vec<Vec<u8>>>,
    channel: Arc<Mutex<std::fs::File>>,
}

impl NamedStore {
    /// Opens `path` under `mode`, loading any existing snapshot.
    ///
    /// # Errors
    /// Returns `StoreMissing`/`Io` if the file cannot be opened, or
    /// `DataCorruption` if the on-disk snapshot is malformed.
    pub fn open(
        registry: &FileChannelRegistry,
        path: &Path,
        mode: DuplicateMode,
    ) -> Result<Self, OxidbError> {
        let channel = registry.open(path)?;
        let data = Self::load(&channel)?;
        Ok(Self { path: path.to_path_buf(), mode, data, channel })
    }

    fn load(channel: &Arc<Mutex<std::fs::File>>) -> Result<BTreeMap<Vec<u8>, Vec<Vec<u8>>>, OxidbError> {
        let mut file = channel.lock().map_err(|_| OxidbError::Other("store lock poisoned".to_string()))?;
        file.seek(SeekFrom::Start(0))?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;
        if bytes.is_empty() {
            return Ok(BTreeMap::new());
        }
        decode_snapshot(&bytes)
    }

    /// Writes the current in-memory contents back to the backing file.
    ///
    /// # Errors
    /// Returns `Io` if the write or sync fails.
    pub fn flush(&self) -> Result<(), OxidbError> {
        let bytes = encode_snapshot(&self.data);
        let mut file = self
            .channel
            .lock()
            .map_err(|_| OxidbError::Other("store lock poisoned".to_string()))?;
        file.seek(SeekFrom::Start(0))?;
        file.set_len(0)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        Ok(())
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn mode(&self) -> DuplicateMode {
        self.mode
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn get(&self, key: &[u8]) -> Option<&[Vec<u8>]> {
        self.data.get(key).map(Vec::as_slice)
    }

    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        match self.mode {
            DuplicateMode::WithDuplicatesPrefixed => {
                self.data.entry(key).or_default().push(value);
            }
            DuplicateMode::Unique | DuplicateMode::UniquePrefixed => {
                self.data.insert(key, vec![value]);
            }
        }
    }

    /// Replaces the value for `key` only if its current value equals
    /// `expected`, returning whether the swap happened.
    #[must_use]
    pub fn compare_and_put(&mut self, key: &[u8], new: Vec<u8>, expected: Option<&[u8]>) -> bool {
        let current = self.data.get(key).and_then(|v| v.first());
        if current.map(Vec::as_slice) != expected {
            return false;
        }
        self.data.insert(key.to_vec(), vec![new]);
        true
    }

    pub fn delete(&mut self, key: &[u8]) -> Option<Vec<Vec<u8>>> {
        self.data.remove(key)
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Iterates entries in ascending key order within `[start, end)`.
    pub fn range(&self, start: &[u8], end: &[u8]) -> impl Iterator<Item = (&Vec<u8>, &Vec<Vec<u8>>)> {
        self.data.range(start.to_vec()..end.to_vec())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Vec<u8>, &Vec<Vec<u8>>)> {
        self.data.iter()
    }
}

fn encode_snapshot(data: &BTreeMap<Vec<u8>, Vec<Vec<u8>>>) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&(data.len() as u32).to_be_bytes());
    for (key, values) in data {
        buf.extend_from_slice(&(key.len() as u32).to_be_bytes());
        buf.extend_from_slice(key);
        buf.extend_from_slice(&(values.len() as u32).to_be_bytes());
        for v in values {
            buf.extend_from_slice(&(v.len() as u32).to_be_bytes());
            buf.extend_from_slice(v);
        }
    }
    buf
}

fn decode_snapshot(bytes: &[u8]) -> Result<BTreeMap<Vec<u8>, Vec<Vec<u8>>>, OxidbError> {
    let mut pos = 0usize;
    let mut map = BTreeMap::new();
    let entries = read_u32(bytes, &mut pos)?;
    for _ in 0..entries {
        let key_len = read_u32(bytes, &mut pos)? as usize;
        let key = read_bytes(bytes, &mut pos, key_len)?.to_vec();
        let value_count = read_u32(bytes, &mut pos)?;
        let mut values = Vec::with_capacity(value_count as usize);
        for _ in 0..value_count {
            let value_len = read_u32(bytes, &mut pos)? as usize;
            values.push(read_bytes(bytes, &mut pos, value_len)?.to_vec());
        }
        map.insert(key, values);
    }
    Ok(map)
}

fn read_u32(bytes: &[u8], pos: &mut usize) -> Result<u32, OxidbError> {
    let slice = read_bytes(bytes, pos, 4)?;
    Ok(u32::from_be_bytes(slice.try_into().unwrap()))
}

fn read_bytes<'a>(bytes: &'a [u8], pos: &mut usize, n: usize) -> Result<&'a [u8], OxidbError> {
    let slice = bytes
        .get(*pos..*pos + n)
        .ok_or_else(|| OxidbError::DataCorruption("truncated store snapshot".to_string()))?;
    *pos += n;
    Ok(slice)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn unique_put_replaces_existing_value() {
        let dir = tempdir().unwrap();
        let registry = FileChannelRegistry::new();
        let mut store = NamedStore::open(&registry, &dir.path().join("s.db"), DuplicateMode::Unique).unwrap();
        store.put(b"k".to_vec(), b"v1".to_vec());
        store.put(b"k".to_vec(), b"v2".to_vec());
        assert_eq!(store.get(b"k"), Some(&[b"v2".to_vec()][..]));
    }

    #[test]
    fn with_duplicates_accumulates_values() {
        let dir = tempdir().unwrap();
        let registry = FileChannelRegistry::new();
        let mut store = NamedStore::open(&registry, &dir.path().join("s.db"), DuplicateMode::WithDuplicatesPrefixed).unwrap();
        store.put(b"k".to_vec(), b"v1".to_vec());
        store.put(b"k".to_vec(), b"v2".to_vec());
        assert_eq!(store.get(b"k").unwrap().len(), 2);
    }

    #[test]
    fn flush_then_reopen_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("s.db");
        let registry = FileChannelRegistry::new();
        {
            let mut store = NamedStore::open(&registry, &path, DuplicateMode::Unique).unwrap();
            store.put(b"k".to_vec(), b"v".to_vec());
            store.flush().unwrap();
        }
        let registry2 = FileChannelRegistry::new();
        let reopened = NamedStore::open(&registry2, &path, DuplicateMode::Unique).unwrap();
        assert_eq!(reopened.get(b"k"), Some(&[b"v".to_vec()][..]));
    }

    #[test]
    fn compare_and_put_rejects_stale_expected_value() {
        let dir = tempdir().unwrap();
        let registry = FileChannelRegistry::new();
        let mut store = NamedStore::open(&registry, &dir.path().join("s.db"), DuplicateMode::Unique).unwrap();
        store.put(b"k".to_vec(), b"v1".to_vec());
        assert!(!store.compare_and_put(b"k", b"v2".to_vec(), Some(b"wrong")));
        assert!(store.compare_and_put(b"k", b"v2".to_vec(), Some(b"v1")));
        assert_eq!(store.get(b"k"), Some(&[b"v2".to_vec()][..]));
    }
}
