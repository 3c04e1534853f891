//! The index manager: an in-memory registry of live index instances, keyed
//! by `schema.entity.index`, that loads/rebuilds them from the catalogue and
//! dispatches predicates and data-change events to them.
//!
//! Index contents never persist beyond process lifetime here: loading an
//! index means rebuilding it from its backing column(s), not deserializing
//! a prior in-memory snapshot. The catalogue's `idx.*` store still exists
//! and is tracked for bookkeeping/state purposes, but this manager is the
//! one source of truth for what an index currently contains.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::core::catalogue::{Catalogue, IndexState};
use crate::core::common::types::DataType;
use crate::core::common::OxidbError;
use crate::core::config::{PqConfig, VafConfig};
use crate::core::indexing::column_source::ColumnSource;
use crate::core::indexing::hash::HashIndex;
use crate::core::indexing::pq::PqIndex;
use crate::core::indexing::traits::{DataChangeEvent, Index, IndexCost, IndexRecord, Predicate};
use crate::core::indexing::vaf::VafIndex;

fn key(schema: &str, entity: &str, name: &str) -> String {
    format!("{}.{}.{}", schema.to_ascii_lowercase(), entity.to_ascii_lowercase(), name.to_ascii_lowercase())
}

pub struct IndexManager {
    indexes: RwLock<HashMap<String, Box<dyn Index>>>,
}

impl Default for IndexManager {
    fn default() -> Self {
        Self::new()
    }
}

impl IndexManager {
    #[must_use]
    pub fn new() -> Self {
        Self { indexes: RwLock::new(HashMap::new()) }
    }

    fn vector_dimension(data_type: DataType, column: &str) -> Result<usize, OxidbError> {
        match data_type {
            DataType::FloatVector(d) => Ok(d as usize),
            other => Err(OxidbError::TypeMismatch(format!(
                "index column {column} has type {other:?}, expected a vector type"
            ))),
        }
    }

    fn build(
        catalogue: &Catalogue,
        schema: &str,
        entity: &str,
        name: &str,
        vaf_config: VafConfig,
        pq_config: PqConfig,
    ) -> Result<Box<dyn Index>, OxidbError> {
        let index_entry = catalogue
            .get_index(schema, entity, name)
            .ok_or_else(|| OxidbError::IndexMissing(format!("warren.{schema}.{entity}.{name}")))?;
        let entity_entry = catalogue
            .get_entity(schema, entity)
            .ok_or_else(|| OxidbError::EntityMissing(format!("warren.{schema}.{entity}")))?;
        let column_name = index_entry
            .columns
            .first()
            .ok_or_else(|| OxidbError::PolicyViolation(format!("index {name} has no columns")))?
            .clone();
        let column_def = entity_entry
            .columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(&column_name))
            .ok_or_else(|| OxidbError::ColumnMissing(format!("warren.{schema}.{entity}.{column_name}")))?;

        let store = catalogue.column_store(schema, entity, &column_name);
        let source = ColumnSource::new(catalogue.engine_handle(), store, column_def.data_type);

        let mut index: Box<dyn Index> = match index_entry.index_type.as_str() {
            "hash" => {
                let mut hash = HashIndex::new(column_name);
                for (tuple_id, value) in source.scan()? {
                    hash.update(&DataChangeEvent::Insert {
                        tuple_id,
                        values: vec![(hash.columns()[0].clone(), value)],
                    })?;
                }
                Box::new(hash)
            }
            "vaf" => {
                let dimension = Self::vector_dimension(column_def.data_type, &column_name)?;
                Box::new(VafIndex::new(column_name, dimension, vaf_config.marks_per_dimension, source))
            }
            "pq" => {
                let dimension = Self::vector_dimension(column_def.data_type, &column_name)?;
                Box::new(PqIndex::new(column_name, dimension, pq_config, source))
            }
            other => {
                return Err(OxidbError::IndexNotSupported(other.to_string()));
            }
        };
        index.rebuild()?;
        Ok(index)
    }

    /// Ensures every index registered on `schema.entity` is loaded (built
    /// from its column(s) and held in memory), and returns their names.
    ///
    /// # Errors
    /// Propagates any error the underlying index's `rebuild` raises.
    pub fn ensure_loaded(
        &self,
        catalogue: &Catalogue,
        schema: &str,
        entity: &str,
        vaf_config: VafConfig,
        pq_config: PqConfig,
    ) -> Result<Vec<String>, OxidbError> {
        let Some(entity_entry) = catalogue.get_entity(schema, entity) else {
            return Err(OxidbError::EntityMissing(format!("warren.{schema}.{entity}")));
        };
        for name in &entity_entry.indexes {
            let map_key = key(schema, entity, name);
            if self.indexes.read().map_err(poison)?.contains_key(&map_key) {
                continue;
            }
            let built = Self::build(catalogue, schema, entity, name, vaf_config, pq_config.clone())?;
            catalogue.set_index_state(schema, entity, name, IndexState::Clean)?;
            self.indexes.write().map_err(poison)?.insert(map_key, built);
        }
        Ok(entity_entry.indexes)
    }

    /// Forces a rebuild of one index, regardless of its current state.
    ///
    /// # Errors
    /// Propagates the catalogue/index error that caused the rebuild to fail.
    pub fn rebuild(
        &self,
        catalogue: &Catalogue,
        schema: &str,
        entity: &str,
        name: &str,
        vaf_config: VafConfig,
        pq_config: PqConfig,
    ) -> Result<(), OxidbError> {
        let built = Self::build(catalogue, schema, entity, name, vaf_config, pq_config)?;
        catalogue.set_index_state(schema, entity, name, IndexState::Clean)?;
        self.indexes.write().map_err(poison)?.insert(key(schema, entity, name), built);
        Ok(())
    }

    pub fn unload(&self, schema: &str, entity: &str, name: &str) {
        if let Ok(mut indexes) = self.indexes.write() {
            indexes.remove(&key(schema, entity, name));
        }
    }

    /// Broadcasts a write to every loaded index on `schema.entity`. Indexes
    /// that cannot incrementally update flip themselves Dirty/Stale instead;
    /// the catalogue's recorded state is updated to match.
    ///
    /// # Errors
    /// Propagates the first index-update error encountered.
    pub fn publish(
        &self,
        catalogue: &Catalogue,
        schema: &str,
        entity: &str,
        event: &DataChangeEvent,
    ) -> Result<(), OxidbError> {
        let Some(entity_entry) = catalogue.get_entity(schema, entity) else {
            return Ok(());
        };
        let mut indexes = self.indexes.write().map_err(poison)?;
        for name in &entity_entry.indexes {
            let map_key = key(schema, entity, name);
            if let Some(index) = indexes.get_mut(&map_key) {
                index.update(event)?;
                catalogue.set_index_state(schema, entity, name, index.state())?;
            }
        }
        Ok(())
    }

    /// Among the entity's loaded indexes that can process `predicate`,
    /// returns the name and cost of the cheapest one.
    #[must_use]
    pub fn best_candidate(
        &self,
        catalogue: &Catalogue,
        schema: &str,
        entity: &str,
        predicate: &Predicate,
    ) -> Option<(String, IndexCost)> {
        let entity_entry = catalogue.get_entity(schema, entity)?;
        let indexes = self.indexes.read().ok()?;
        entity_entry
            .indexes
            .iter()
            .filter_map(|name| {
                let index = indexes.get(&key(schema, entity, name))?;
                index.can_process(predicate).then(|| (name.clone(), index.cost(predicate)))
            })
            .min_by(|(_, a), (_, b)| {
                weighted(a).partial_cmp(&weighted(b)).unwrap_or(std::cmp::Ordering::Equal)
            })
    }

    /// # Errors
    /// Returns `IndexMissing` if `name` is not currently loaded, or
    /// propagates whatever error the index raises while filtering.
    pub fn filter(
        &self,
        schema: &str,
        entity: &str,
        name: &str,
        predicate: &Predicate,
    ) -> Result<Vec<IndexRecord>, OxidbError> {
        let indexes = self.indexes.read().map_err(poison)?;
        let index = indexes
            .get(&key(schema, entity, name))
            .ok_or_else(|| OxidbError::IndexMissing(format!("warren.{schema}.{entity}.{name}")))?;
        index.filter(predicate)
    }
}

fn weighted(cost: &IndexCost) -> f64 {
    cost.io + cost.cpu + cost.memory - cost.accuracy
}

fn poison<T>(_: std::sync::PoisonError<T>) -> OxidbError {
    OxidbError::Other("index manager lock poisoned".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::catalogue::Catalogue;
    use crate::core::common::types::{ColumnDef, TupleId, Value};
    use crate::core::indexing::traits::{BooleanPredicate, ProximityPredicate};
    use crate::core::storage::engine::store::DuplicateMode;
    use crate::core::vector::DistanceKind;
    use tempfile::tempdir;

    fn setup() -> (tempfile::TempDir, Catalogue) {
        let dir = tempdir().unwrap();
        let cat = Catalogue::open(dir.path()).unwrap();
        cat.create_schema("main").unwrap();
        cat.create_entity(
            "main",
            "features",
            vec![
                ColumnDef::new("id".to_string(), DataType::Long, false, true),
                ColumnDef::new("label".to_string(), DataType::String, false, false),
                ColumnDef::new("embed".to_string(), DataType::FloatVector(4), false, false),
            ],
        )
        .unwrap();
        (dir, cat)
    }

    fn seed_row(cat: &Catalogue, tuple_id: u64, label: &str, embed: Vec<f32>) {
        let mut tx = cat.engine().begin();
        let label_store = cat.column_store("main", "features", "label");
        let embed_store = cat.column_store("main", "features", "embed");
        tx.put(
            &label_store,
            tuple_id.to_be_bytes().to_vec(),
            crate::core::common::serialization::serialize_value(&Value::String(label.to_string())),
        )
        .unwrap();
        tx.put(
            &embed_store,
            tuple_id.to_be_bytes().to_vec(),
            crate::core::common::serialization::serialize_value(&Value::FloatVector(embed)),
        )
        .unwrap();
        tx.commit().unwrap();
    }

    #[test]
    fn hash_index_loads_existing_rows_and_answers_equals() {
        let (_dir, cat) = setup();
        cat.create_index(
            "main",
            "features",
            "by_label",
            "hash",
            vec!["label".to_string()],
            serde_json::Value::Null,
            DuplicateMode::WithDuplicatesPrefixed,
        )
        .unwrap();
        seed_row(&cat, 1, "a", vec![0.0, 0.0, 0.0, 0.0]);
        seed_row(&cat, 2, "b", vec![1.0, 1.0, 1.0, 1.0]);

        let manager = IndexManager::new();
        manager
            .ensure_loaded(&cat, "main", "features", VafConfig::default(), PqConfig::default())
            .unwrap();

        let predicate = Predicate::Boolean(BooleanPredicate::Equals {
            column: "label".to_string(),
            value: Value::String("a".to_string()),
        });
        let results = manager.filter("main", "features", "by_label", &predicate).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].tuple_id, TupleId(1));
    }

    #[test]
    fn publish_keeps_hash_index_in_sync_after_load() {
        let (_dir, cat) = setup();
        cat.create_index(
            "main",
            "features",
            "by_label",
            "hash",
            vec!["label".to_string()],
            serde_json::Value::Null,
            DuplicateMode::WithDuplicatesPrefixed,
        )
        .unwrap();
        seed_row(&cat, 1, "a", vec![0.0, 0.0, 0.0, 0.0]);

        let manager = IndexManager::new();
        manager
            .ensure_loaded(&cat, "main", "features", VafConfig::default(), PqConfig::default())
            .unwrap();
        manager
            .publish(
                &cat,
                "main",
                "features",
                &DataChangeEvent::Insert {
                    tuple_id: TupleId(2),
                    values: vec![("label".to_string(), Value::String("a".to_string()))],
                },
            )
            .unwrap();

        let predicate = Predicate::Boolean(BooleanPredicate::Equals {
            column: "label".to_string(),
            value: Value::String("a".to_string()),
        });
        let results = manager.filter("main", "features", "by_label", &predicate).unwrap();
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn best_candidate_picks_the_vaf_index_for_a_proximity_predicate() {
        let (_dir, cat) = setup();
        cat.create_index(
            "main",
            "features",
            "by_embed",
            "vaf",
            vec!["embed".to_string()],
            serde_json::Value::Null,
            DuplicateMode::Unique,
        )
        .unwrap();
        seed_row(&cat, 1, "a", vec![0.0, 0.0, 0.0, 0.0]);
        seed_row(&cat, 2, "b", vec![5.0, 5.0, 5.0, 5.0]);

        let manager = IndexManager::new();
        manager
            .ensure_loaded(&cat, "main", "features", VafConfig::default(), PqConfig::default())
            .unwrap();

        let predicate = Predicate::Proximity(ProximityPredicate {
            column: "embed".to_string(),
            k: 1,
            distance: DistanceKind::L2,
            query: vec![0.1, 0.1, 0.1, 0.1],
        });
        let (name, cost) = manager.best_candidate(&cat, "main", "features", &predicate).unwrap();
        assert_eq!(name, "by_embed");
        assert!(cost.accuracy > 0.0);
    }
}
