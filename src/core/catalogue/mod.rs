//! The catalogue: the engine's single owner of all schema, entity, column,
//! and index metadata, plus the shared page store they are backed by.
//!
//! Five logical catalogs live here: entity, column, index, sequence, and
//! statistics. Metadata is small relative to entity data, so each catalog is
//! held fully in memory behind a `RwLock` and write-through persisted as
//! JSON-encoded rows in a dedicated named store.

pub mod database;
pub mod entries;
pub mod statistics;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::core::common::types::ColumnDef;
use crate::core::common::OxidbError;
use crate::core::storage::engine::store::DuplicateMode;
use crate::core::storage::engine::{StorageEngine, StorageTransaction};

pub use database::Database;
pub use entries::{EntityEntry, IndexEntry, SchemaEntry};
pub use statistics::{IndexState, ValueStatistics};

const SCHEMAS_STORE: &str = "__catalogue.schemas";
const ENTITIES_STORE: &str = "__catalogue.entities";
const INDEXES_STORE: &str = "__catalogue.indexes";
const STATISTICS_STORE: &str = "__catalogue.statistics";

fn entity_key(schema: &str, entity: &str) -> String {
    format!("{}.{}", schema.to_ascii_lowercase(), entity.to_ascii_lowercase())
}

fn index_key(schema: &str, entity: &str, index: &str) -> String {
    format!(
        "{}.{}.{}",
        schema.to_ascii_lowercase(),
        entity.to_ascii_lowercase(),
        index.to_ascii_lowercase()
    )
}

fn statistics_key(schema: &str, entity: &str, column: &str) -> String {
    format!(
        "{}.{}.{}",
        schema.to_ascii_lowercase(),
        entity.to_ascii_lowercase(),
        column.to_ascii_lowercase()
    )
}

fn column_store_name(schema: &str, entity: &str, column: &str) -> String {
    format!("col.{}", statistics_key(schema, entity, column))
}

fn sequence_key(schema: &str, entity: &str) -> String {
    format!("seq.{}", entity_key(schema, entity))
}

pub struct Catalogue {
    engine: Arc<StorageEngine>,
    schemas: std::sync::RwLock<HashMap<String, SchemaEntry>>,
    entities: std::sync::RwLock<HashMap<String, EntityEntry>>,
    indexes: std::sync::RwLock<HashMap<String, IndexEntry>>,
    statistics: std::sync::RwLock<HashMap<String, ValueStatistics>>,
}

impl Catalogue {
    /// Opens the catalogue rooted at `base_path`, loading any existing
    /// metadata from its four catalog stores.
    ///
    /// # Errors
    /// Returns `Io`/`StoreMissing` if the metadata stores cannot be opened,
    /// or `DataCorruption` if a persisted entry cannot be decoded.
    pub fn open(base_path: &Path) -> Result<Self, OxidbError> {
        let engine = Arc::new(StorageEngine::open(base_path)?);
        engine.open_store(SCHEMAS_STORE, DuplicateMode::Unique)?;
        engine.open_store(ENTITIES_STORE, DuplicateMode::Unique)?;
        engine.open_store(INDEXES_STORE, DuplicateMode::Unique)?;
        engine.open_store(STATISTICS_STORE, DuplicateMode::Unique)?;

        let schemas = load_store(&engine, SCHEMAS_STORE)?;
        let entities = load_store(&engine, ENTITIES_STORE)?;
        let indexes = load_store(&engine, INDEXES_STORE)?;
        let statistics = load_store(&engine, STATISTICS_STORE)?;

        Ok(Self {
            engine,
            schemas: std::sync::RwLock::new(schemas),
            entities: std::sync::RwLock::new(entities),
            indexes: std::sync::RwLock::new(indexes),
            statistics: std::sync::RwLock::new(statistics),
        })
    }

    #[must_use]
    pub fn engine(&self) -> &StorageEngine {
        &self.engine
    }

    /// A cloned handle to the shared storage engine, for components (the
    /// index manager, transactions) that must outlive a borrow of `&self`.
    #[must_use]
    pub(crate) fn engine_handle(&self) -> Arc<StorageEngine> {
        Arc::clone(&self.engine)
    }

    /// # Errors
    /// Returns `SchemaExists` if `name` is already registered.
    pub fn create_schema(&self, name: &str) -> Result<(), OxidbError> {
        let mut schemas = self.write_lock(&self.schemas)?;
        let key = name.to_ascii_lowercase();
        if schemas.contains_key(&key) {
            return Err(OxidbError::SchemaExists(format!("warren.{name}")));
        }
        let entry = SchemaEntry { name: name.to_string() };
        self.persist(SCHEMAS_STORE, &key, &entry)?;
        schemas.insert(key, entry);
        Ok(())
    }

    /// # Errors
    /// Returns `SchemaMissing` if `name` is not registered.
    pub fn drop_schema(&self, name: &str) -> Result<(), OxidbError> {
        let mut schemas = self.write_lock(&self.schemas)?;
        let key = name.to_ascii_lowercase();
        if schemas.remove(&key).is_none() {
            return Err(OxidbError::SchemaMissing(format!("warren.{name}")));
        }
        self.delete(SCHEMAS_STORE, &key)
    }

    /// Creates an entity with its column list: verifies name/column
    /// uniqueness, allocates a store per column, initializes the tuple-id
    /// sequence to zero, and initializes empty statistics for every column.
    ///
    /// # Errors
    /// Returns `SchemaMissing`, `EntityExists`, or `DuplicateColumn`.
    pub fn create_entity(
        &self,
        schema: &str,
        name: &str,
        columns: Vec<ColumnDef>,
    ) -> Result<(), OxidbError> {
        if !self.read_lock(&self.schemas)?.contains_key(&schema.to_ascii_lowercase()) {
            return Err(OxidbError::SchemaMissing(format!("warren.{schema}")));
        }
        let mut seen = std::collections::HashSet::new();
        for col in &columns {
            if !seen.insert(col.name.to_ascii_lowercase()) {
                return Err(OxidbError::DuplicateColumn(format!(
                    "warren.{schema}.{name}.{}",
                    col.name
                )));
            }
        }

        let mut entities = self.write_lock(&self.entities)?;
        let key = entity_key(schema, name);
        if entities.contains_key(&key) {
            return Err(OxidbError::EntityExists(format!("warren.{schema}.{name}")));
        }

        for col in &columns {
            self.engine.open_store(&column_store_name(schema, name, &col.name), DuplicateMode::Unique)?;
        }
        self.engine.sequences().initialize(&sequence_key(schema, name))?;

        let mut statistics = self.write_lock(&self.statistics)?;
        for col in &columns {
            let stat_key = statistics_key(schema, name, &col.name);
            let stats = ValueStatistics::empty();
            self.persist(STATISTICS_STORE, &stat_key, &stats)?;
            statistics.insert(stat_key, stats);
        }

        let entry = EntityEntry {
            schema: schema.to_string(),
            name: name.to_string(),
            columns,
            indexes: Vec::new(),
        };
        self.persist(ENTITIES_STORE, &key, &entry)?;
        entities.insert(key, entry);
        Ok(())
    }

    /// Drops every index on the entity, then its columns/statistics, then
    /// the entity and sequence entries themselves.
    ///
    /// # Errors
    /// Returns `EntityMissing` if `schema.name` is not registered.
    pub fn drop_entity(&self, schema: &str, name: &str) -> Result<(), OxidbError> {
        let key = entity_key(schema, name);
        let entry = {
            let entities = self.read_lock(&self.entities)?;
            entities.get(&key).cloned().ok_or_else(|| {
                OxidbError::EntityMissing(format!("warren.{schema}.{name}"))
            })?
        };

        for index_name in entry.indexes.clone() {
            self.drop_index(schema, name, &index_name)?;
        }

        let mut statistics = self.write_lock(&self.statistics)?;
        for col in &entry.columns {
            self.engine.drop_store(&column_store_name(schema, name, &col.name))?;
            let stat_key = statistics_key(schema, name, &col.name);
            statistics.remove(&stat_key);
            self.delete(STATISTICS_STORE, &stat_key)?;
        }
        drop(statistics);

        self.engine.sequences().remove(&sequence_key(schema, name))?;
        self.write_lock(&self.entities)?.remove(&key);
        self.delete(ENTITIES_STORE, &key)
    }

    #[must_use]
    pub fn get_entity(&self, schema: &str, name: &str) -> Option<EntityEntry> {
        self.entities.read().ok()?.get(&entity_key(schema, name)).cloned()
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
        params: serde_json::Value,
        duplicate_mode: DuplicateMode,
    ) -> Result<(), OxidbError> {
        let mut entities = self.write_lock(&self.entities)?;
        let entity_key_str = entity_key(schema, entity);
        let entity_entry = entities
            .get_mut(&entity_key_str)
            .ok_or_else(|| OxidbError::EntityMissing(format!("warren.{schema}.{entity}")))?;

        for col in &columns {
            if entity_entry.columns.iter().all(|c| !c.name.eq_ignore_ascii_case(col)) {
                return Err(OxidbError::ColumnMissing(format!(
                    "warren.{schema}.{entity}.{col}"
                )));
            }
        }

        let mut indexes = self.write_lock(&self.indexes)?;
        let key = index_key(schema, entity, name);
        if indexes.contains_key(&key) {
            return Err(OxidbError::IndexExists(format!("warren.{schema}.{entity}.{name}")));
        }

        self.engine.open_store(&format!("idx.{key}"), duplicate_mode)?;

        let entry = IndexEntry {
            schema: schema.to_string(),
            entity: entity.to_string(),
            name: name.to_string(),
            index_type: index_type.to_string(),
            columns,
            params,
            state: IndexState::Dirty,
        };
        self.persist(INDEXES_STORE, &key, &entry)?;
        indexes.insert(key.clone(), entry);
        entity_entry.indexes.push(name.to_string());
        self.persist(ENTITIES_STORE, &entity_key_str, entity_entry)?;
        Ok(())
    }

    /// # Errors
    /// Returns `IndexMissing` if `schema.entity.name` is not registered.
    pub fn drop_index(&self, schema: &str, entity: &str, name: &str) -> Result<(), OxidbError> {
        let key = index_key(schema, entity, name);
        let mut indexes = self.write_lock(&self.indexes)?;
        if indexes.remove(&key).is_none() {
            return Err(OxidbError::IndexMissing(format!("warren.{schema}.{entity}.{name}")));
        }
        self.delete(INDEXES_STORE, &key)?;
        self.engine.drop_store(&format!("idx.{key}"))?;

        if let Some(entity_entry) = self.write_lock(&self.entities)?.get_mut(&entity_key(schema, entity)) {
            entity_entry.indexes.retain(|n| !n.eq_ignore_ascii_case(name));
            self.persist(ENTITIES_STORE, &entity_key(schema, entity), entity_entry)?;
        }
        Ok(())
    }

    #[must_use]
    pub fn get_index(&self, schema: &str, entity: &str, name: &str) -> Option<IndexEntry> {
        self.indexes.read().ok()?.get(&index_key(schema, entity, name)).cloned()
    }

    /// Every registered schema name, in no particular order.
    #[must_use]
    pub fn list_schemas(&self) -> Vec<String> {
        self.schemas.read().map(|s| s.values().map(|e| e.name.clone()).collect()).unwrap_or_default()
    }

    /// Every entity registered under `schema`, in no particular order.
    #[must_use]
    pub fn list_entities(&self, schema: &str) -> Vec<EntityEntry> {
        let prefix = format!("{}.", schema.to_ascii_lowercase());
        self.entities.read().map_or_else(
            |_| Vec::new(),
            |entities| entities.iter().filter(|(k, _)| k.starts_with(&prefix)).map(|(_, v)| v.clone()).collect(),
        )
    }

    /// Every index registered on `schema.entity`.
    #[must_use]
    pub fn list_indexes(&self, schema: &str, entity: &str) -> Vec<IndexEntry> {
        self.get_entity(schema, entity)
            .map(|entry| entry.indexes.iter().filter_map(|name| self.get_index(schema, entity, name)).collect())
            .unwrap_or_default()
    }

    /// # Errors
    /// Returns `IndexMissing` if the index is not registered.
    pub fn set_index_state(
        &self,
        schema: &str,
        entity: &str,
        name: &str,
        state: IndexState,
    ) -> Result<(), OxidbError> {
        let key = index_key(schema, entity, name);
        let mut indexes = self.write_lock(&self.indexes)?;
        let entry = indexes
            .get_mut(&key)
            .ok_or_else(|| OxidbError::IndexMissing(format!("warren.{schema}.{entity}.{name}")))?;
        entry.state = state;
        self.persist(INDEXES_STORE, &key, entry)
    }

    #[must_use]
    pub fn get_statistics(&self, schema: &str, entity: &str, column: &str) -> Option<ValueStatistics> {
        self.statistics.read().ok()?.get(&statistics_key(schema, entity, column)).cloned()
    }

    /// Buffers a statistics update inside `tx`, alongside the column value
    /// write it accompanies, so both become durable on the same `commit`.
    /// Does not touch the in-memory cache `get_statistics` reads — call
    /// [`Self::apply_statistics`] with the same arguments once `tx` has
    /// actually committed, per spec §4.4's atomicity requirement between a
    /// column's value and statistics writes.
    ///
    /// # Errors
    /// Returns a serialization or store error.
    pub fn stage_statistics(
        &self,
        tx: &mut StorageTransaction<'_>,
        schema: &str,
        entity: &str,
        column: &str,
        stats: &ValueStatistics,
    ) -> Result<(), OxidbError> {
        let key = statistics_key(schema, entity, column);
        let bytes = serde_json::to_vec(stats)?;
        tx.put(STATISTICS_STORE, key.as_bytes().to_vec(), bytes)
    }

    /// Makes a statistics update staged via [`Self::stage_statistics`]
    /// visible to `get_statistics`. Must only be called after the
    /// `StorageTransaction` it was staged into has committed, otherwise the
    /// cache would show a count for a row that never durably landed.
    ///
    /// # Errors
    /// Returns an error if the in-memory table lock is poisoned.
    pub fn apply_statistics(
        &self,
        schema: &str,
        entity: &str,
        column: &str,
        stats: ValueStatistics,
    ) -> Result<(), OxidbError> {
        let key = statistics_key(schema, entity, column);
        self.write_lock(&self.statistics)?.insert(key, stats);
        Ok(())
    }

    #[must_use]
    pub(crate) fn column_store(&self, schema: &str, entity: &str, column: &str) -> String {
        column_store_name(schema, entity, column)
    }

    #[must_use]
    pub(crate) fn sequence_name(&self, schema: &str, entity: &str) -> String {
        sequence_key(schema, entity)
    }

    #[must_use]
    pub(crate) fn index_store(&self, schema: &str, entity: &str, name: &str) -> String {
        format!("idx.{}", index_key(schema, entity, name))
    }

    fn persist<T: serde::Serialize>(&self, store: &str, key: &str, value: &T) -> Result<(), OxidbError> {
        let bytes = serde_json::to_vec(value)?;
        let mut tx = self.engine.begin();
        tx.put(store, key.as_bytes().to_vec(), bytes)?;
        tx.commit()
    }

    fn delete(&self, store: &str, key: &str) -> Result<(), OxidbError> {
        let mut tx = self.engine.begin();
        tx.delete(store, key.as_bytes())?;
        tx.commit()
    }

    fn read_lock<'a, T>(
        &self,
        lock: &'a std::sync::RwLock<T>,
    ) -> Result<std::sync::RwLockReadGuard<'a, T>, OxidbError> {
        lock.read().map_err(|_| OxidbError::Other("catalogue table poisoned".to_string()))
    }

    fn write_lock<'a, T>(
        &self,
        lock: &'a std::sync::RwLock<T>,
    ) -> Result<std::sync::RwLockWriteGuard<'a, T>, OxidbError> {
        lock.write().map_err(|_| OxidbError::Other("catalogue table poisoned".to_string()))
    }
}

fn load_store<T>(engine: &StorageEngine, store: &str) -> Result<HashMap<String, T>, OxidbError>
where
    T: serde::de::DeserializeOwned,
{
    engine.with_store_entries(store, |entries| {
        entries
            .map(|(key, values)| {
                let key = String::from_utf8(key.clone())
                    .map_err(|e| OxidbError::DataCorruption(e.to_string()))?;
                let bytes = values.first().ok_or_else(|| {
                    OxidbError::DataCorruption(format!("empty catalogue entry for {key}"))
                })?;
                let value: T = serde_json::from_slice(bytes)?;
                Ok((key, value))
            })
            .collect::<Result<HashMap<_, _>, OxidbError>>()
    })?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::common::types::DataType;
    use tempfile::tempdir;

    fn columns() -> Vec<ColumnDef> {
        vec![
            ColumnDef::new("id".to_string(), DataType::Long, false, true),
            ColumnDef::new("embed".to_string(), DataType::FloatVector(4), false, false),
        ]
    }

    #[test]
    fn create_entity_initializes_statistics_and_sequence() {
        let dir = tempdir().unwrap();
        let cat = Catalogue::open(dir.path()).unwrap();
        cat.create_schema("main").unwrap();
        cat.create_entity("main", "features", columns()).unwrap();

        assert!(cat.get_entity("main", "features").is_some());
        assert_eq!(cat.get_statistics("main", "features", "id").unwrap().count, 0);
        assert_eq!(cat.engine().sequences().current("seq.main.features").unwrap(), 0);
    }

    #[test]
    fn duplicate_column_names_are_rejected() {
        let dir = tempdir().unwrap();
        let cat = Catalogue::open(dir.path()).unwrap();
        cat.create_schema("main").unwrap();
        let cols = vec![
            ColumnDef::new("id".to_string(), DataType::Long, false, true),
            ColumnDef::new("ID".to_string(), DataType::Long, false, false),
        ];
        assert!(matches!(
            cat.create_entity("main", "features", cols),
            Err(OxidbError::DuplicateColumn(_))
        ));
    }

    #[test]
    fn drop_entity_cascades_to_indexes_and_columns() {
        let dir = tempdir().unwrap();
        let cat = Catalogue::open(dir.path()).unwrap();
        cat.create_schema("main").unwrap();
        cat.create_entity("main", "features", columns()).unwrap();
        cat.create_index(
            "main",
            "features",
            "by_id",
            "hash",
            vec!["id".to_string()],
            serde_json::Value::Null,
            DuplicateMode::WithDuplicatesPrefixed,
        )
        .unwrap();

        cat.drop_entity("main", "features").unwrap();
        assert!(cat.get_entity("main", "features").is_none());
        assert!(cat.get_index("main", "features", "by_id").is_none());
    }

    #[test]
    fn create_index_rejects_unknown_column() {
        let dir = tempdir().unwrap();
        let cat = Catalogue::open(dir.path()).unwrap();
        cat.create_schema("main").unwrap();
        cat.create_entity("main", "features", columns()).unwrap();
        let result = cat.create_index(
            "main",
            "features",
            "ghost",
            "hash",
            vec!["nope".to_string()],
            serde_json::Value::Null,
            DuplicateMode::Unique,
        );
        assert!(matches!(result, Err(OxidbError::ColumnMissing(_))));
    }

    #[test]
    fn reopening_the_catalogue_restores_metadata() {
        let dir = tempdir().unwrap();
        {
            let cat = Catalogue::open(dir.path()).unwrap();
            cat.create_schema("main").unwrap();
            cat.create_entity("main", "features", columns()).unwrap();
        }
        let reopened = Catalogue::open(dir.path()).unwrap();
        assert!(reopened.get_entity("main", "features").is_some());
    }
}
