//! Read-only access to a column's committed values, used by indexes that
//! scan or re-fetch exact vectors independent of any in-flight transaction
//! (VAF/PQ rebuild, and exact re-ranking during a query).

use std::sync::Arc;

use crate::core::common::serialization::deserialize_value;
use crate::core::common::types::{DataType, TupleId, Value};
use crate::core::common::OxidbError;
use crate::core::storage::engine::StorageEngine;

pub struct ColumnSource {
    engine: Arc<StorageEngine>,
    store: String,
    data_type: DataType,
}

impl ColumnSource {
    #[must_use]
    pub fn new(engine: Arc<StorageEngine>, store: String, data_type: DataType) -> Self {
        Self { engine, store, data_type }
    }

    /// Every `(tupleId, value)` pair currently stored for this column, in
    /// ascending key order.
    ///
    /// # Errors
    /// Returns `StoreMissing` if the column's store is not open, or
    /// `DataCorruption` if a stored entry cannot be decoded.
    pub fn scan(&self) -> Result<Vec<(TupleId, Value)>, OxidbError> {
        self.engine.with_store_entries(&self.store, |entries| {
            entries
                .map(|(key, values)| {
                    let tuple_id = decode_tuple_id(key)?;
                    let bytes = values.first().ok_or_else(|| {
                        OxidbError::DataCorruption(format!(
                            "empty column entry for tuple {}",
                            tuple_id.0
                        ))
                    })?;
                    let value = deserialize_value(self.data_type, bytes)?;
                    Ok((tuple_id, value))
                })
                .collect::<Result<Vec<_>, OxidbError>>()
        })?
    }

    /// # Errors
    /// Returns `StoreMissing` or `DataCorruption`.
    pub fn get(&self, tuple_id: TupleId) -> Result<Option<Value>, OxidbError> {
        let key = tuple_id.0.to_be_bytes().to_vec();
        let raw = self.engine.get_committed(&self.store, &key)?;
        raw.map(|bytes| deserialize_value(self.data_type, &bytes)).transpose()
    }
}

fn decode_tuple_id(bytes: &[u8]) -> Result<TupleId, OxidbError> {
    let arr: [u8; 8] = bytes
        .try_into()
        .map_err(|_| OxidbError::DataCorruption("column key is not 8 bytes".to_string()))?;
    Ok(TupleId(u64::from_be_bytes(arr)))
}
