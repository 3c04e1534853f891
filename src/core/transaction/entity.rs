//! An entity transaction: one `ColumnTransaction` per column plus the
//! entity's live indexes, wrapped around a single `StorageTransaction` so
//! every column/index write for one logical operation commits or rolls
//! back together. Column statistics staged during the transaction are
//! collected in `pending_statistics` and applied to the catalogue's cache
//! only after `stx` itself has committed, so a later column's failure never
//! leaves an earlier column's statistics durably visible without its value.

use crate::core::catalogue::{Catalogue, ValueStatistics};
use crate::core::common::types::{TupleId, Value};
use crate::core::common::OxidbError;
use crate::core::indexing::traits::DataChangeEvent;
use crate::core::indexing::IndexManager;
use crate::core::storage::engine::StorageTransaction;
use crate::core::transaction::column::ColumnTransaction;
use crate::core::transaction::lock_manager::{LockManager, LockMode};

pub struct EntityTransaction<'a> {
    id: crate::core::common::types::TransactionId,
    catalogue: &'a Catalogue,
    indexes: &'a IndexManager,
    locks: &'a LockManager,
    schema: String,
    entity: String,
    stx: StorageTransaction<'a>,
    /// Statistics staged by column writes, applied to the catalogue's cache
    /// only once `stx` has actually committed (see `ColumnTransaction`).
    pending_statistics: Vec<(String, ValueStatistics)>,
}

impl<'a> EntityTransaction<'a> {
    /// Begins a transaction against `schema.entity`, acquiring a SHARED lock
    /// on the entity's qualified name for the transaction's lifetime.
    ///
    /// # Errors
    /// Returns `EntityMissing` if `schema.entity` is not registered, or
    /// `Deadlock` if the lock cannot be granted.
    pub fn begin(
        catalogue: &'a Catalogue,
        indexes: &'a IndexManager,
        locks: &'a LockManager,
        schema: &str,
        entity: &str,
    ) -> Result<Self, OxidbError> {
        if catalogue.get_entity(schema, entity).is_none() {
            return Err(OxidbError::EntityMissing(format!("warren.{schema}.{entity}")));
        }
        let stx = catalogue.engine().begin();
        let id = stx.id();
        locks.acquire(id, &object_name(schema, entity), LockMode::Shared)?;
        Ok(Self {
            id,
            catalogue,
            indexes,
            locks,
            schema: schema.to_string(),
            entity: entity.to_string(),
            stx,
            pending_statistics: Vec::new(),
        })
    }

    #[must_use]
    pub const fn id(&self) -> crate::core::common::types::TransactionId {
        self.id
    }

    fn entry(&self) -> Result<crate::core::catalogue::EntityEntry, OxidbError> {
        self.catalogue
            .get_entity(&self.schema, &self.entity)
            .ok_or_else(|| OxidbError::EntityMissing(format!("warren.{}.{}", self.schema, self.entity)))
    }

    fn column_transaction<'b>(
        &'b self,
        entry: &'b crate::core::catalogue::EntityEntry,
        column: &str,
    ) -> Result<ColumnTransaction<'b>, OxidbError> {
        let def = entry
            .columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(column))
            .ok_or_else(|| OxidbError::ColumnMissing(format!("warren.{}.{}.{column}", self.schema, self.entity)))?;
        Ok(ColumnTransaction::new(self.catalogue, &self.schema, &self.entity, def))
    }

    /// Reads the requested columns (in order) for one tuple.
    ///
    /// # Errors
    /// Returns `ColumnMissing` for an unknown column name.
    pub fn read(&self, tuple_id: TupleId, columns: &[String]) -> Result<Vec<(String, Value)>, OxidbError> {
        let entry = self.entry()?;
        columns
            .iter()
            .map(|name| {
                let col_tx = self.column_transaction(&entry, name)?;
                let value = col_tx.get(&self.stx, tuple_id)?.unwrap_or(Value::Null);
                Ok((name.clone(), value))
            })
            .collect()
    }

    /// Allocates the next `TupleId`, writes every column, and publishes an
    /// insert event to every live index on the entity.
    ///
    /// # Errors
    /// Returns `PolicyViolation` for a null write into a non-nullable
    /// column, or propagates a storage/statistics error.
    pub fn insert(&mut self, values: Vec<(String, Value)>) -> Result<TupleId, OxidbError> {
        let entry = self.entry()?;
        let sequence_name = self.catalogue.sequence_name(&self.schema, &self.entity);
        #[allow(clippy::cast_sign_loss)]
        let tuple_id = TupleId(self.catalogue.engine().sequences().next(&sequence_name)? as u64);
        for (name, value) in &values {
            let col_tx = self.column_transaction(&entry, name)?;
            let stats = col_tx.put(&mut self.stx, tuple_id, value.clone())?;
            self.pending_statistics.push((name.clone(), stats));
        }
        self.indexes.publish(
            self.catalogue,
            &self.schema,
            &self.entity,
            &DataChangeEvent::Insert { tuple_id, values },
        )?;
        Ok(tuple_id)
    }

    /// Writes the given columns for an existing tuple and publishes an
    /// update event to every live index.
    ///
    /// # Errors
    /// Returns `PolicyViolation` for a null write into a non-nullable
    /// column, or propagates a storage/statistics error.
    pub fn update(&mut self, tuple_id: TupleId, values: Vec<(String, Value)>) -> Result<(), OxidbError> {
        let entry = self.entry()?;
        for (name, value) in &values {
            let col_tx = self.column_transaction(&entry, name)?;
            let stats = col_tx.put(&mut self.stx, tuple_id, value.clone())?;
            self.pending_statistics.push((name.clone(), stats));
        }
        self.indexes.publish(
            self.catalogue,
            &self.schema,
            &self.entity,
            &DataChangeEvent::Update { tuple_id, values },
        )
    }

    /// Reads-and-deletes every column for `tuple_id`, publishing a delete
    /// event to every live index.
    ///
    /// # Errors
    /// Propagates a storage/statistics error.
    pub fn delete(&mut self, tuple_id: TupleId) -> Result<(), OxidbError> {
        let entry = self.entry()?;
        for column in &entry.columns {
            let col_tx = self.column_transaction(&entry, &column.name)?;
            let (_, stats) = col_tx.delete(&mut self.stx, tuple_id)?;
            if let Some(stats) = stats {
                self.pending_statistics.push((column.name.clone(), stats));
            }
        }
        self.indexes.publish(self.catalogue, &self.schema, &self.entity, &DataChangeEvent::Delete { tuple_id })
    }

    /// Resets every column's statistics and re-feeds each stored value
    /// through `ValueStatistics::insert`, via a full composite scan.
    ///
    /// # Errors
    /// Propagates a storage/statistics error.
    pub fn optimize(&mut self) -> Result<(), OxidbError> {
        let entry = self.entry()?;
        for column in &entry.columns {
            let store = self.catalogue.column_store(&self.schema, &self.entity, &column.name);
            let mut stats = crate::core::catalogue::ValueStatistics::empty();
            for (_, bytes) in self.stx.scan(&store)? {
                let value = crate::core::common::serialization::deserialize_value(column.data_type, &bytes)?;
                stats.insert(&value);
            }
            self.catalogue.stage_statistics(&mut self.stx, &self.schema, &self.entity, &column.name, &stats)?;
            self.pending_statistics.push((column.name.clone(), stats));
        }
        Ok(())
    }

    /// Yields records across the partitioned `TupleId` range
    /// `[p*floor(max/P)+1, min((p+1)*floor(max/P)+1, max)]`, ordered
    /// ascending by `TupleId`.
    ///
    /// # Errors
    /// Returns `ColumnMissing` for an unknown column name.
    pub fn cursor(
        &self,
        columns: &[String],
        partition_index: usize,
        partitions: usize,
    ) -> Result<Vec<(TupleId, Vec<(String, Value)>)>, OxidbError> {
        let entry = self.entry()?;
        let sequence_name = self.catalogue.sequence_name(&self.schema, &self.entity);
        #[allow(clippy::cast_sign_loss)]
        let max = self.catalogue.engine().sequences().current(&sequence_name)? as u64;
        let (lower, upper) = partition_bounds(max, partition_index, partitions);

        let first_column = entry
            .columns
            .first()
            .ok_or_else(|| OxidbError::PolicyViolation(format!("warren.{}.{} has no columns", self.schema, self.entity)))?;
        let driver_store = self.catalogue.column_store(&self.schema, &self.entity, &first_column.name);
        let mut tuple_ids: Vec<TupleId> = self
            .stx
            .scan(&driver_store)?
            .into_iter()
            .filter_map(|(key, _)| decode_tuple_id(&key))
            .filter(|t| t.0 >= lower && t.0 <= upper)
            .collect();
        tuple_ids.sort_unstable();

        tuple_ids.into_iter().map(|tuple_id| Ok((tuple_id, self.read(tuple_id, columns)?))).collect()
    }

    /// # Errors
    /// Returns `ClosedDbo` if already finished.
    pub fn commit(self) -> Result<(), OxidbError> {
        self.stx.commit()?;
        for (column, stats) in self.pending_statistics {
            self.catalogue.apply_statistics(&self.schema, &self.entity, &column, stats)?;
        }
        self.locks.release_all(self.id);
        Ok(())
    }

    /// # Errors
    /// Returns `ClosedDbo` if already finished.
    pub fn rollback(self) -> Result<(), OxidbError> {
        self.stx.rollback()?;
        self.locks.release_all(self.id);
        Ok(())
    }
}

fn object_name(schema: &str, entity: &str) -> String {
    format!("warren.{schema}.{entity}")
}

fn decode_tuple_id(bytes: &[u8]) -> Option<TupleId> {
    let arr: [u8; 8] = bytes.try_into().ok()?;
    Some(TupleId(u64::from_be_bytes(arr)))
}

/// `[p*floor(max/P)+1, min((p+1)*floor(max/P)+1, max)]`, clamped so a
/// single-partition call covers the whole range.
fn partition_bounds(max: u64, partition_index: usize, partitions: usize) -> (u64, u64) {
    if partitions <= 1 || max == 0 {
        return (1, max);
    }
    let span = max / partitions as u64;
    let lower = partition_index as u64 * span + 1;
    let upper = ((partition_index as u64 + 1) * span + 1).min(max);
    (lower, upper)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::common::types::{ColumnDef, DataType};
    use tempfile::tempdir;

    fn setup() -> (tempfile::TempDir, Catalogue, IndexManager, LockManager) {
        let dir = tempdir().unwrap();
        let cat = Catalogue::open(dir.path()).unwrap();
        cat.create_schema("main").unwrap();
        cat.create_entity(
            "main",
            "features",
            vec![
                ColumnDef::new("id".to_string(), DataType::Long, false, true),
                ColumnDef::new("label".to_string(), DataType::String, true, false),
            ],
        )
        .unwrap();
        (dir, cat, IndexManager::new(), LockManager::new())
    }

    #[test]
    fn insert_then_read_round_trips() {
        let (_dir, cat, indexes, locks) = setup();
        let mut tx = EntityTransaction::begin(&cat, &indexes, &locks, "main", "features").unwrap();
        let tuple_id = tx
            .insert(vec![
                ("id".to_string(), Value::Long(1)),
                ("label".to_string(), Value::String("a".to_string())),
            ])
            .unwrap();
        let record = tx.read(tuple_id, &["label".to_string()]).unwrap();
        assert_eq!(record, vec![("label".to_string(), Value::String("a".to_string()))]);
        tx.commit().unwrap();
    }

    #[test]
    fn delete_then_read_yields_null() {
        let (_dir, cat, indexes, locks) = setup();
        let mut tx = EntityTransaction::begin(&cat, &indexes, &locks, "main", "features").unwrap();
        let tuple_id = tx.insert(vec![("id".to_string(), Value::Long(1))]).unwrap();
        tx.delete(tuple_id).unwrap();
        let record = tx.read(tuple_id, &["id".to_string()]).unwrap();
        assert_eq!(record, vec![("id".to_string(), Value::Null)]);
        tx.commit().unwrap();
    }

    #[test]
    fn cursor_orders_by_ascending_tuple_id_and_respects_partitions() {
        let (_dir, cat, indexes, locks) = setup();
        let mut tx = EntityTransaction::begin(&cat, &indexes, &locks, "main", "features").unwrap();
        for i in 1..=10i64 {
            tx.insert(vec![("id".to_string(), Value::Long(i))]).unwrap();
        }
        let all = tx.cursor(&["id".to_string()], 0, 1).unwrap();
        assert_eq!(all.len(), 10);
        assert!(all.windows(2).all(|w| w[0].0 .0 < w[1].0 .0));

        let first_half = tx.cursor(&["id".to_string()], 0, 2).unwrap();
        let second_half = tx.cursor(&["id".to_string()], 1, 2).unwrap();
        assert_eq!(first_half.len() + second_half.len(), 10);
        tx.commit().unwrap();
    }

    #[test]
    fn a_failed_insert_leaves_no_statistics_for_earlier_columns() {
        let (_dir, cat, indexes, locks) = setup();
        let mut tx = EntityTransaction::begin(&cat, &indexes, &locks, "main", "features").unwrap();
        let result = tx.insert(vec![
            ("label".to_string(), Value::String("x".to_string())),
            ("id".to_string(), Value::Null),
        ]);
        assert!(matches!(result, Err(OxidbError::PolicyViolation(_))));
        drop(tx);
        assert_eq!(cat.get_statistics("main", "features", "label"), None);
    }

    #[test]
    fn optimize_rebuilds_statistics_from_a_full_scan() {
        let (_dir, cat, indexes, locks) = setup();
        let mut tx = EntityTransaction::begin(&cat, &indexes, &locks, "main", "features").unwrap();
        tx.insert(vec![("id".to_string(), Value::Long(5))]).unwrap();
        tx.insert(vec![("id".to_string(), Value::Long(1))]).unwrap();
        tx.optimize().unwrap();
        tx.commit().unwrap();
        let stats = cat.get_statistics("main", "features", "id").unwrap();
        assert_eq!(stats.count, 2);
        assert_eq!(stats.min, Some(Value::Long(1)));
        assert_eq!(stats.max, Some(Value::Long(5)));
    }
}
