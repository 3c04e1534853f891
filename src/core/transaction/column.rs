//! A column transaction: `count`/`get`/`put`/`compareAndPut`/`delete` against
//! one column's store. Every write stages its updated statistics into the
//! same `StorageTransaction` the value write goes into, so both are part of
//! one commit; the caller (an `EntityTransaction`) applies the returned
//! statistics to the catalogue's cache only once that transaction has
//! actually committed, keeping the statistics and value writes atomic.

use crate::core::catalogue::{Catalogue, ValueStatistics};
use crate::core::common::types::{ColumnDef, TupleId, Value};
use crate::core::common::serialization::{deserialize_value, serialize_value};
use crate::core::common::OxidbError;
use crate::core::storage::engine::StorageTransaction;

pub struct ColumnTransaction<'a> {
    catalogue: &'a Catalogue,
    schema: &'a str,
    entity: &'a str,
    column: &'a ColumnDef,
    store: String,
}

impl<'a> ColumnTransaction<'a> {
    #[must_use]
    pub fn new(catalogue: &'a Catalogue, schema: &'a str, entity: &'a str, column: &'a ColumnDef) -> Self {
        let store = catalogue.column_store(schema, entity, &column.name);
        Self { catalogue, schema, entity, column, store }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.column.name
    }

    /// The number of values currently stored (per the catalogue's tracked
    /// statistics, refreshed on every write).
    #[must_use]
    pub fn count(&self) -> u64 {
        self.statistics().count
    }

    fn statistics(&self) -> ValueStatistics {
        self.catalogue
            .get_statistics(self.schema, self.entity, &self.column.name)
            .unwrap_or_else(ValueStatistics::empty)
    }

    fn key(tuple_id: TupleId) -> Vec<u8> {
        tuple_id.0.to_be_bytes().to_vec()
    }

    /// # Errors
    /// Returns `StoreMissing` or `DataCorruption`.
    pub fn get(&self, stx: &StorageTransaction, tuple_id: TupleId) -> Result<Option<Value>, OxidbError> {
        let raw = stx.get(&self.store, &Self::key(tuple_id))?;
        raw.map(|bytes| deserialize_value(self.column.data_type, &bytes)).transpose()
    }

    /// Writes `value`, rejecting `Value::Null` into a non-nullable column,
    /// and stages the resulting column statistics into `stx` alongside the
    /// value write. Returns the staged statistics; the caller must apply
    /// them to the catalogue's cache (`Catalogue::apply_statistics`) once
    /// `stx` has committed.
    ///
    /// # Errors
    /// Returns `PolicyViolation` for a null write to a non-nullable column,
    /// or propagates the storage/statistics error otherwise.
    pub fn put(&self, stx: &mut StorageTransaction, tuple_id: TupleId, value: Value) -> Result<ValueStatistics, OxidbError> {
        if matches!(value, Value::Null) && !self.column.is_nullable {
            return Err(OxidbError::PolicyViolation(format!(
                "warren.{}.{}.{} does not accept null",
                self.schema, self.entity, self.column.name
            )));
        }
        let old = self.get(stx, tuple_id)?;
        let mut stats = self.statistics();
        match &old {
            Some(old_value) => stats.update(old_value, &value),
            None => stats.insert(&value),
        }
        self.catalogue.stage_statistics(stx, self.schema, self.entity, &self.column.name, &stats)?;
        stx.put(&self.store, Self::key(tuple_id), serialize_value(&value))?;
        Ok(stats)
    }

    /// Writes `new` only if the current value equals `expected`.
    ///
    /// # Errors
    /// Propagates any `get`/`put` error.
    pub fn compare_and_put(
        &self,
        stx: &mut StorageTransaction,
        tuple_id: TupleId,
        new: Value,
        expected: Option<&Value>,
    ) -> Result<bool, OxidbError> {
        let current = self.get(stx, tuple_id)?;
        if current.as_ref() != expected {
            return Ok(false);
        }
        self.put(stx, tuple_id, new)?;
        Ok(true)
    }

    /// Reads and removes the value at `tuple_id`, delegating the removal to
    /// statistics when a value was present. Returns the updated statistics
    /// alongside the removed value so the caller can defer cache visibility
    /// until its own transaction commits.
    ///
    /// # Errors
    /// Propagates any storage/statistics error.
    pub fn delete(
        &self,
        stx: &mut StorageTransaction,
        tuple_id: TupleId,
    ) -> Result<(Option<Value>, Option<ValueStatistics>), OxidbError> {
        let old = self.get(stx, tuple_id)?;
        let stats = if let Some(old_value) = &old {
            let mut stats = self.statistics();
            stats.delete(old_value);
            self.catalogue.stage_statistics(stx, self.schema, self.entity, &self.column.name, &stats)?;
            stx.delete(&self.store, &Self::key(tuple_id))?;
            Some(stats)
        } else {
            None
        };
        Ok((old, stats))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::common::types::DataType;
    use crate::core::storage::engine::store::DuplicateMode;
    use tempfile::tempdir;

    fn setup() -> (tempfile::TempDir, Catalogue, ColumnDef) {
        let dir = tempdir().unwrap();
        let cat = Catalogue::open(dir.path()).unwrap();
        cat.create_schema("main").unwrap();
        let column = ColumnDef::new("label".to_string(), DataType::String, true, false);
        cat.create_entity("main", "features", vec![column.clone()]).unwrap();
        (dir, cat, column)
    }

    #[test]
    fn put_then_get_round_trips_and_updates_statistics() {
        let (_dir, cat, column) = setup();
        let col_tx = ColumnTransaction::new(&cat, "main", "features", &column);
        let mut stx = cat.engine().begin();
        let stats = col_tx.put(&mut stx, TupleId(1), Value::String("a".to_string())).unwrap();
        assert_eq!(col_tx.get(&stx, TupleId(1)).unwrap(), Some(Value::String("a".to_string())));
        // Staged but not yet visible: the owning transaction hasn't committed.
        assert_eq!(col_tx.count(), 0);
        stx.commit().unwrap();
        cat.apply_statistics("main", "features", column.name.as_str(), stats).unwrap();
        assert_eq!(col_tx.count(), 1);
    }

    #[test]
    fn null_into_non_nullable_column_is_rejected() {
        let dir = tempdir().unwrap();
        let cat = Catalogue::open(dir.path()).unwrap();
        cat.create_schema("main").unwrap();
        let column = ColumnDef::new("id".to_string(), DataType::Long, false, true);
        cat.create_entity("main", "features", vec![column.clone()]).unwrap();
        let col_tx = ColumnTransaction::new(&cat, "main", "features", &column);
        let mut stx = cat.engine().begin();
        let result = col_tx.put(&mut stx, TupleId(1), Value::Null);
        assert!(matches!(result, Err(OxidbError::PolicyViolation(_))));
    }

    #[test]
    fn compare_and_put_fails_on_stale_expectation() {
        let (_dir, cat, column) = setup();
        let col_tx = ColumnTransaction::new(&cat, "main", "features", &column);
        let mut stx = cat.engine().begin();
        col_tx.put(&mut stx, TupleId(1), Value::String("a".to_string())).unwrap();
        let applied = col_tx
            .compare_and_put(&mut stx, TupleId(1), Value::String("b".to_string()), Some(&Value::String("wrong".to_string())))
            .unwrap();
        assert!(!applied);
        assert_eq!(col_tx.get(&stx, TupleId(1)).unwrap(), Some(Value::String("a".to_string())));
    }

    #[test]
    fn delete_removes_the_value_and_updates_statistics() {
        let (_dir, cat, column) = setup();
        let col_tx = ColumnTransaction::new(&cat, "main", "features", &column);
        let mut stx = cat.engine().begin();
        col_tx.put(&mut stx, TupleId(1), Value::String("a".to_string())).unwrap();
        let (removed, stats) = col_tx.delete(&mut stx, TupleId(1)).unwrap();
        assert_eq!(removed, Some(Value::String("a".to_string())));
        assert!(stats.is_some());
        assert_eq!(col_tx.get(&stx, TupleId(1)).unwrap(), None);
    }
}
