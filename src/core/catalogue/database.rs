//! The engine's client surface (spec §6.1): a thin struct over a
//! `Catalogue`, mirroring the teacher's `api::Oxidb` (`src/api/db.rs`)
//! facade — one method per DDL/DML/DQL/Admin operation, each a complete,
//! self-contained transaction.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::core::catalogue::{Catalogue, EntityEntry, IndexEntry};
use crate::core::common::types::{ColumnDef, TupleId, Value};
use crate::core::common::OxidbError;
use crate::core::config::Config;
use crate::core::execution::operators;
use crate::core::execution::Record;
use crate::core::indexing::IndexManager;
use crate::core::optimizer::{self, PlanCache};
use crate::core::query::plan::PlanNode;
use crate::core::storage::engine::store::DuplicateMode;
use crate::core::transaction::{EntityTransaction, LockManager};

struct ActiveTransaction {
    schema: String,
    entity: String,
    started: Instant,
    cancelled: Arc<AtomicBool>,
}

/// Embedded database handle: one `Catalogue`, one `IndexManager`, one
/// `LockManager`, a shared plan cache, and a registry of in-flight
/// transactions for the admin surface.
pub struct Database {
    catalogue: Catalogue,
    indexes: IndexManager,
    locks: LockManager,
    config: Config,
    plan_cache: Mutex<PlanCache>,
    registry: Mutex<HashMap<u64, ActiveTransaction>>,
    next_handle: AtomicU64,
}

fn status(message: &str) -> Record {
    vec![("status".to_string(), Value::String(message.to_string()))]
}

fn timed(f: impl FnOnce() -> Result<Record, OxidbError>) -> Result<Record, OxidbError> {
    let start = Instant::now();
    let mut record = f()?;
    record.push(("durationMs".to_string(), Value::Double(start.elapsed().as_secs_f64() * 1000.0)));
    Ok(record)
}

impl Database {
    /// Opens (creating if necessary) a database rooted at `base_path` with
    /// default policy variables.
    ///
    /// # Errors
    /// Propagates whatever error the catalogue raises opening its stores.
    pub fn open(base_path: &Path) -> Result<Self, OxidbError> {
        Self::open_with_config(base_path, Config::default())
    }

    /// As [`Self::open`], with caller-supplied cost weights / plan-cache
    /// capacity / PQ and VAF build parameters.
    ///
    /// # Errors
    /// Propagates whatever error the catalogue raises opening its stores.
    pub fn open_with_config(base_path: &Path, config: Config) -> Result<Self, OxidbError> {
        let catalogue = Catalogue::open(base_path)?;
        let plan_cache = Mutex::new(PlanCache::new(config.plan_cache_capacity));
        Ok(Self {
            catalogue,
            indexes: IndexManager::new(),
            locks: LockManager::new(),
            config,
            plan_cache,
            registry: Mutex::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
        })
    }

    fn begin(&self, schema: &str, entity: &str) -> Result<(u64, EntityTransaction<'_>), OxidbError> {
        self.indexes.ensure_loaded(&self.catalogue, schema, entity, self.config.vaf, self.config.pq.clone())?;
        let tx = EntityTransaction::begin(&self.catalogue, &self.indexes, &self.locks, schema, entity)?;
        let handle = self.next_handle.fetch_add(1, Ordering::SeqCst);
        let cancelled = Arc::new(AtomicBool::new(false));
        self.registry.lock().map_err(|_| OxidbError::Other("transaction registry poisoned".to_string()))?.insert(
            handle,
            ActiveTransaction { schema: schema.to_string(), entity: entity.to_string(), started: Instant::now(), cancelled },
        );
        Ok((handle, tx))
    }

    fn check_cancelled(&self, handle: u64) -> Result<(), OxidbError> {
        let cancelled = self
            .registry
            .lock()
            .map_err(|_| OxidbError::Other("transaction registry poisoned".to_string()))?
            .get(&handle)
            .map(|active| active.cancelled.load(Ordering::SeqCst));
        if cancelled == Some(true) {
            return Err(OxidbError::Cancelled(format!("transaction {handle}")));
        }
        Ok(())
    }

    fn finish(&self, handle: u64) {
        if let Ok(mut registry) = self.registry.lock() {
            registry.remove(&handle);
        }
    }

    // ---- DDL ----

    /// # Errors
    /// Returns `SchemaExists` if `name` is already registered.
    pub fn create_schema(&self, name: &str) -> Result<Record, OxidbError> {
        timed(|| {
            self.catalogue.create_schema(name)?;
            Ok(status("created"))
        })
    }

    /// # Errors
    /// Returns `SchemaMissing` if `name` is not registered.
    pub fn drop_schema(&self, name: &str) -> Result<Record, OxidbError> {
        timed(|| {
            self.catalogue.drop_schema(name)?;
            Ok(status("dropped"))
        })
    }

    /// # Errors
    /// Returns `SchemaMissing`, `EntityExists`, or `DuplicateColumn`.
    pub fn create_entity(&self, schema: &str, name: &str, columns: Vec<ColumnDef>) -> Result<Record, OxidbError> {
        timed(|| {
            self.catalogue.create_entity(schema, name, columns)?;
            Ok(status("created"))
        })
    }

    /// # Errors
    /// Returns `EntityMissing` if `schema.name` is not registered.
    pub fn drop_entity(&self, schema: &str, name: &str) -> Result<Record, OxidbError> {
        timed(|| {
            self.catalogue.drop_entity(schema, name)?;
            Ok(status("dropped"))
        })
    }

    /// # Errors
    /// Returns `EntityMissing`, `IndexExists`, or `ColumnMissing`.
    #[allow(clippy::too_many_arguments)]
    pub fn create_index(
        &self,
        schema: &str,
        entity: &str,
        name: &str,
        index_type: &str,
        columns: Vec<String>,
        duplicate_mode: DuplicateMode,
    ) -> Result<Record, OxidbError> {
        timed(|| operators::create_index(&self.catalogue, schema, entity, name, index_type, columns, duplicate_mode))
    }

    /// # Errors
    /// Returns `IndexMissing` if the index is not registered.
    pub fn drop_index(&self, schema: &str, entity: &str, name: &str) -> Result<Record, OxidbError> {
        timed(|| {
            self.catalogue.drop_index(schema, entity, name)?;
            self.indexes.unload(schema, entity, name);
            Ok(status("dropped"))
        })
    }

    /// # Errors
    /// Propagates an `EntityMissing` or storage error.
    pub fn truncate_entity(&self, schema: &str, entity: &str) -> Result<Record, OxidbError> {
        timed(|| {
            let (handle, mut tx) = self.begin(schema, entity)?;
            let entry = self.entity_entry(schema, entity)?;
            let columns: Vec<String> = entry.columns.iter().map(|c| c.name.clone()).collect();
            let result = operators::truncate_entity(&mut tx, &columns);
            self.finish(handle);
            let record = result?;
            tx.commit()?;
            Ok(record)
        })
    }

    /// # Errors
    /// Propagates an `EntityMissing` or storage error.
    pub fn optimize_entity(&self, schema: &str, entity: &str) -> Result<Record, OxidbError> {
        timed(|| {
            let (handle, mut tx) = self.begin(schema, entity)?;
            let result = tx.optimize();
            self.finish(handle);
            result?;
            tx.commit()?;
            Ok(status("optimized"))
        })
    }

    // ---- DML ----

    /// # Errors
    /// Returns `PolicyViolation` for a null write into a non-nullable
    /// column, or propagates a storage/statistics error.
    pub fn insert_row(&self, schema: &str, entity: &str, values: Record) -> Result<Record, OxidbError> {
        timed(|| {
            let (handle, mut tx) = self.begin(schema, entity)?;
            self.check_cancelled(handle)?;
            let result = operators::insert(&mut tx, values);
            self.finish(handle);
            let record = result?;
            tx.commit()?;
            Ok(record)
        })
    }

    /// # Errors
    /// Returns `PolicyViolation` for a null write into a non-nullable
    /// column, or propagates a storage/statistics error.
    pub fn update_row(&self, schema: &str, entity: &str, tuple_id: TupleId, values: Record) -> Result<Record, OxidbError> {
        timed(|| {
            let (handle, mut tx) = self.begin(schema, entity)?;
            self.check_cancelled(handle)?;
            let result = operators::update(&mut tx, tuple_id, values);
            self.finish(handle);
            let record = result?;
            tx.commit()?;
            Ok(record)
        })
    }

    /// # Errors
    /// Propagates a storage error.
    pub fn delete_row(&self, schema: &str, entity: &str, tuple_id: TupleId) -> Result<Record, OxidbError> {
        timed(|| {
            let (handle, mut tx) = self.begin(schema, entity)?;
            self.check_cancelled(handle)?;
            let result = operators::delete(&mut tx, tuple_id);
            self.finish(handle);
            let record = result?;
            tx.commit()?;
            Ok(record)
        })
    }

    // ---- DQL ----

    #[must_use]
    pub fn list_schemas(&self) -> Vec<Record> {
        self.catalogue.list_schemas().into_iter().map(|name| vec![("name".to_string(), Value::String(name))]).collect()
    }

    #[must_use]
    pub fn list_entities(&self, schema: &str) -> Vec<Record> {
        self.catalogue
            .list_entities(schema)
            .into_iter()
            .map(|entry| vec![("name".to_string(), Value::String(entry.name))])
            .collect()
    }

    fn entity_entry(&self, schema: &str, entity: &str) -> Result<EntityEntry, OxidbError> {
        self.catalogue.get_entity(schema, entity).ok_or_else(|| OxidbError::EntityMissing(format!("warren.{schema}.{entity}")))
    }

    /// # Errors
    /// Returns `EntityMissing` if `schema.entity` is not registered.
    pub fn list_columns(&self, schema: &str, entity: &str) -> Result<Vec<Record>, OxidbError> {
        Ok(self
            .entity_entry(schema, entity)?
            .columns
            .into_iter()
            .map(|col| {
                vec![
                    ("name".to_string(), Value::String(col.name)),
                    ("dataType".to_string(), Value::String(format!("{:?}", col.data_type))),
                    ("nullable".to_string(), Value::Boolean(col.is_nullable)),
                    ("primaryKey".to_string(), Value::Boolean(col.is_primary_key)),
                ]
            })
            .collect())
    }

    #[must_use]
    pub fn list_indexes(&self, schema: &str, entity: &str) -> Vec<Record> {
        self.catalogue
            .list_indexes(schema, entity)
            .into_iter()
            .map(|entry: IndexEntry| {
                vec![
                    ("name".to_string(), Value::String(entry.name)),
                    ("indexType".to_string(), Value::String(entry.index_type)),
                    ("columns".to_string(), Value::String(entry.columns.join(","))),
                    ("state".to_string(), Value::String(format!("{:?}", entry.state))),
                ]
            })
            .collect()
    }

    /// # Errors
    /// Propagates an `EntityMissing` or storage error.
    pub fn sample_entity(&self, schema: &str, entity: &str, columns: &[String], size: usize) -> Result<Vec<Record>, OxidbError> {
        let (handle, tx) = self.begin(schema, entity)?;
        let result = operators::entity_sample(&tx, columns, size);
        self.finish(handle);
        let rows = result?;
        tx.commit()?;
        Ok(rows)
    }

    /// # Errors
    /// Returns `EntityMissing` if `schema.entity` is not registered.
    pub fn count_entity(&self, schema: &str, entity: &str) -> Result<Record, OxidbError> {
        operators::entity_count(&self.catalogue, schema, entity)
    }

    /// # Errors
    /// Propagates an `EntityMissing` or storage error.
    pub fn scan_entity(&self, schema: &str, entity: &str, columns: &[String]) -> Result<Vec<Record>, OxidbError> {
        let (handle, tx) = self.begin(schema, entity)?;
        let result = operators::entity_scan(&tx, columns);
        self.finish(handle);
        let rows = result?;
        tx.commit()?;
        Ok(rows)
    }

    /// Optimizes and runs a read-only composite plan (filter, distance
    /// projection, sort, limit, select) rooted at `logical_plan`, against
    /// `schema.entity`.
    ///
    /// # Errors
    /// Propagates an `EntityMissing` error, or `UnsupportedPredicate` if the
    /// plan contains a DML node (those carry no row values to execute here;
    /// use `insert_row`/`update_row`/`delete_row` instead).
    pub fn execute_plan(&self, schema: &str, entity: &str, logical_plan: &PlanNode) -> Result<Vec<Record>, OxidbError> {
        let physical = {
            let mut cache = self.plan_cache.lock().map_err(|_| OxidbError::Other("plan cache poisoned".to_string()))?;
            optimizer::optimize(&mut cache, logical_plan, &self.catalogue, &self.indexes, &self.config)
        };
        let (handle, mut tx) = self.begin(schema, entity)?;
        let result = run_operator(&physical, &mut tx, &self.indexes, &self.catalogue);
        self.finish(handle);
        let rows = result?;
        tx.commit()?;
        Ok(rows)
    }

    // ---- Admin ----

    /// Snapshot of every transaction currently open through this facade.
    #[must_use]
    pub fn ongoing_transactions(&self) -> Vec<Record> {
        let Ok(registry) = self.registry.lock() else { return Vec::new() };
        registry
            .iter()
            .map(|(id, active)| {
                #[allow(clippy::cast_possible_wrap)]
                vec![
                    ("id".to_string(), Value::Long(*id as i64)),
                    ("schema".to_string(), Value::String(active.schema.clone())),
                    ("entity".to_string(), Value::String(active.entity.clone())),
                    ("elapsedMs".to_string(), Value::Double(active.started.elapsed().as_secs_f64() * 1000.0)),
                ]
            })
            .collect()
    }

    /// Cooperatively cancels the transaction identified by `handle`: the
    /// in-flight call checks this flag once before performing its work and
    /// aborts with `Cancelled` if it is set. There are no finer-grained
    /// suspension points inside a single DML/DQL call to interrupt mid-flight.
    ///
    /// # Errors
    /// Returns `Other` if no transaction with `handle` is currently open.
    pub fn cancel_transaction(&self, handle: u64) -> Result<(), OxidbError> {
        let registry = self.registry.lock().map_err(|_| OxidbError::Other("transaction registry poisoned".to_string()))?;
        let active = registry.get(&handle).ok_or_else(|| OxidbError::Other(format!("no active transaction {handle}")))?;
        active.cancelled.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Interprets a physically-enumerated plan tree against one entity
/// transaction. Leaf/source operators call straight into
/// `execution::operators`; stream-shaped operators materialize their input
/// eagerly (the sources already do, via `EntityTransaction::cursor`) and
/// compose over `RecordStream` for uniformity with the spec's pull-based
/// operator model.
fn run_operator(
    node: &PlanNode,
    tx: &mut EntityTransaction<'_>,
    indexes: &IndexManager,
    catalogue: &Catalogue,
) -> Result<Vec<Record>, OxidbError> {
    use crate::core::query::plan::Operator;

    match &node.operator {
        Operator::EntityScan { columns, .. } => operators::entity_scan(tx, columns),
        Operator::RangedEntityScan { columns, partition_index, partitions, .. } => {
            operators::ranged_entity_scan(tx, columns, *partition_index, *partitions)
        }
        Operator::IndexScan { schema, entity, index, predicate } => {
            operators::index_scan(indexes, tx, schema, entity, index, predicate, &node.columns)
        }
        Operator::EntitySample { size, .. } => operators::entity_sample(tx, &node.columns, *size),
        Operator::EntityCount { schema, entity } => operators::entity_count(catalogue, schema, entity).map(|r| vec![r]),
        Operator::Filter { predicate } => {
            let input = run_operator(child(node)?, tx, indexes, catalogue)?;
            operators::filter(Box::new(input.into_iter().map(Ok)), predicate.clone()).collect()
        }
        Operator::FunctionProjection { function, args, output_column } => {
            let input = run_operator(child(node)?, tx, indexes, catalogue)?;
            operators::function_projection(Box::new(input.into_iter().map(Ok)), function.clone(), args.clone(), output_column.clone())
                .collect()
        }
        Operator::HeapSort { keys, limit } => {
            let input = run_operator(child(node)?, tx, indexes, catalogue)?;
            operators::heap_sort(Box::new(input.into_iter().map(Ok)), keys.clone(), *limit)
        }
        Operator::MergeLimitingHeapSort { keys, limit } => {
            let partitions = node
                .inputs
                .iter()
                .map(|input| run_operator(input, tx, indexes, catalogue))
                .collect::<Result<Vec<_>, _>>()?;
            operators::merge_limiting_heap_sort(partitions, keys.clone(), *limit)
        }
        Operator::Limit { count } => {
            let input = run_operator(child(node)?, tx, indexes, catalogue)?;
            operators::limit(Box::new(input.into_iter().map(Ok)), *count).collect()
        }
        Operator::Skip { count } => {
            let input = run_operator(child(node)?, tx, indexes, catalogue)?;
            operators::skip(Box::new(input.into_iter().map(Ok)), *count).collect()
        }
        Operator::CountProjection => {
            let input = run_operator(child(node)?, tx, indexes, catalogue)?;
            operators::count_projection(Box::new(input.into_iter().map(Ok))).map(|r| vec![r])
        }
        Operator::SelectProjection { columns } => {
            let input = run_operator(child(node)?, tx, indexes, catalogue)?;
            operators::select_projection(Box::new(input.into_iter().map(Ok)), columns.clone()).collect()
        }
        Operator::SelectDistinctProjection { columns } => {
            let input = run_operator(child(node)?, tx, indexes, catalogue)?;
            operators::select_distinct_projection(Box::new(input.into_iter().map(Ok)), columns.clone()).collect()
        }
        Operator::Insert { .. }
        | Operator::Update { .. }
        | Operator::Delete { .. }
        | Operator::CreateIndex { .. }
        | Operator::TruncateEntity { .. } => Err(OxidbError::UnsupportedPredicate(
            "DML plan nodes carry no row values; use Database::insert_row/update_row/delete_row".to_string(),
        )),
    }
}

fn child(node: &PlanNode) -> Result<&PlanNode, OxidbError> {
    node.inputs.first().ok_or_else(|| OxidbError::PolicyViolation("operator node missing its required input".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::common::types::DataType;
    use tempfile::tempdir;

    fn setup() -> (tempfile::TempDir, Database) {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path()).unwrap();
        db.create_schema("main").unwrap();
        db.create_entity(
            "main",
            "features",
            vec![
                ColumnDef::new("id".to_string(), DataType::Long, false, true),
                ColumnDef::new("label".to_string(), DataType::String, true, false),
            ],
        )
        .unwrap();
        (dir, db)
    }

    #[test]
    fn insert_then_scan_round_trips_through_the_facade() {
        let (_dir, db) = setup();
        db.insert_row("main", "features", vec![("id".to_string(), Value::Long(1)), ("label".to_string(), Value::String("a".to_string()))]).unwrap();
        let rows = db.scan_entity("main", "features", &["id".to_string(), "label".to_string()]).unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn ddl_status_records_carry_a_duration_field() {
        let (_dir, db) = setup();
        let record = db.create_schema("other").unwrap();
        assert!(record.iter().any(|(k, _)| k == "durationMs"));
    }

    #[test]
    fn listing_reflects_created_schema_entity_and_columns() {
        let (_dir, db) = setup();
        assert!(db.list_schemas().iter().any(|r| r.contains(&("name".to_string(), Value::String("main".to_string())))));
        assert_eq!(db.list_entities("main").len(), 1);
        assert_eq!(db.list_columns("main", "features").unwrap().len(), 2);
    }

    #[test]
    fn cancelling_an_unknown_transaction_errors() {
        let (_dir, db) = setup();
        assert!(db.cancel_transaction(999).is_err());
    }
}
