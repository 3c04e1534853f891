//! An in-memory hash index over one column, supporting exact-match lookups.
//! Incremental updates are O(1); it never needs a full rebuild on write.

use std::collections::HashMap;

use crate::core::catalogue::IndexState;
use crate::core::common::serialization::serialize_value;
use crate::core::common::types::{TupleId, Value};
use crate::core::common::OxidbError;

use super::traits::{BooleanPredicate, DataChangeEvent, Index, IndexCost, IndexRecord, Predicate};

pub struct HashIndex {
    column: String,
    state: IndexState,
    postings: HashMap<Vec<u8>, Vec<TupleId>>,
    keys_by_tuple: HashMap<TupleId, Vec<u8>>,
}

impl HashIndex {
    #[must_use]
    pub fn new(column: String) -> Self {
        Self {
            column,
            state: IndexState::Dirty,
            postings: HashMap::new(),
            keys_by_tuple: HashMap::new(),
        }
    }

    fn equals_target<'a>(&self, predicate: &'a Predicate) -> Option<&'a Value> {
        match predicate {
            Predicate::Boolean(BooleanPredicate::Equals { column, value })
                if column.eq_ignore_ascii_case(&self.column) =>
            {
                Some(value)
            }
            _ => None,
        }
    }

    fn remove_tuple(&mut self, tuple_id: TupleId) {
        if let Some(old_key) = self.keys_by_tuple.remove(&tuple_id) {
            if let Some(postings) = self.postings.get_mut(&old_key) {
                postings.retain(|t| *t != tuple_id);
                if postings.is_empty() {
                    self.postings.remove(&old_key);
                }
            }
        }
    }
}

impl Index for HashIndex {
    fn index_type(&self) -> &str {
        "hash"
    }

    fn columns(&self) -> &[String] {
        std::slice::from_ref(&self.column)
    }

    fn state(&self) -> IndexState {
        self.state
    }

    fn count(&self) -> usize {
        self.keys_by_tuple.len()
    }

    fn supports_incremental_update(&self) -> bool {
        true
    }

    fn supports_partitioning(&self) -> bool {
        false
    }

    fn can_process(&self, predicate: &Predicate) -> bool {
        self.equals_target(predicate).is_some()
    }

    fn cost(&self, predicate: &Predicate) -> IndexCost {
        if self.can_process(predicate) {
            IndexCost { io: 0.01, cpu: 0.01, memory: 0.0, accuracy: 1.0 }
        } else {
            IndexCost::unusable()
        }
    }

    fn filter_partition(
        &self,
        predicate: &Predicate,
        partition_index: usize,
        partitions: usize,
    ) -> Result<Vec<IndexRecord>, OxidbError> {
        let Some(target) = self.equals_target(predicate) else {
            return Err(OxidbError::UnsupportedPredicate(format!(
                "hash index on {} cannot serve {predicate:?}",
                self.column
            )));
        };
        let key = serialize_value(target);
        let tuple_ids = self.postings.get(&key).cloned().unwrap_or_default();
        Ok(tuple_ids
            .into_iter()
            .filter(|t| partitions <= 1 || (t.0 as usize) % partitions == partition_index)
            .map(|tuple_id| IndexRecord { tuple_id, computed: Vec::new() })
            .collect())
    }

    fn rebuild(&mut self) -> Result<(), OxidbError> {
        self.state = IndexState::Clean;
        Ok(())
    }

    fn update(&mut self, event: &DataChangeEvent) -> Result<(), OxidbError> {
        match event {
            DataChangeEvent::Insert { tuple_id, values } | DataChangeEvent::Update { tuple_id, values } => {
                self.remove_tuple(*tuple_id);
                if let Some((_, value)) = values.iter().find(|(c, _)| c.eq_ignore_ascii_case(&self.column)) {
                    let key = serialize_value(value);
                    self.postings.entry(key.clone()).or_default().push(*tuple_id);
                    self.keys_by_tuple.insert(*tuple_id, key);
                }
            }
            DataChangeEvent::Delete { tuple_id } => self.remove_tuple(*tuple_id),
        }
        Ok(())
    }

    fn clear(&mut self) {
        self.postings.clear();
        self.keys_by_tuple.clear();
        self.state = IndexState::Dirty;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn insert(index: &mut HashIndex, tuple_id: u64, value: Value) {
        index
            .update(&DataChangeEvent::Insert {
                tuple_id: TupleId(tuple_id),
                values: vec![("label".to_string(), value)],
            })
            .unwrap();
    }

    #[test]
    fn equals_predicate_returns_matching_tuples() {
        let mut index = HashIndex::new("label".to_string());
        insert(&mut index, 1, Value::String("a".to_string()));
        insert(&mut index, 2, Value::String("b".to_string()));
        insert(&mut index, 3, Value::String("a".to_string()));

        let predicate = Predicate::Boolean(BooleanPredicate::Equals {
            column: "label".to_string(),
            value: Value::String("a".to_string()),
        });
        let mut tuples: Vec<u64> = index.filter(&predicate).unwrap().into_iter().map(|r| r.tuple_id.0).collect();
        tuples.sort_unstable();
        assert_eq!(tuples, vec![1, 3]);
    }

    #[test]
    fn update_moves_tuple_to_new_bucket() {
        let mut index = HashIndex::new("label".to_string());
        insert(&mut index, 1, Value::String("a".to_string()));
        index
            .update(&DataChangeEvent::Update {
                tuple_id: TupleId(1),
                values: vec![("label".to_string(), Value::String("b".to_string()))],
            })
            .unwrap();

        let old_predicate = Predicate::Boolean(BooleanPredicate::Equals {
            column: "label".to_string(),
            value: Value::String("a".to_string()),
        });
        assert!(index.filter(&old_predicate).unwrap().is_empty());
    }

    #[test]
    fn delete_removes_tuple() {
        let mut index = HashIndex::new("label".to_string());
        insert(&mut index, 1, Value::String("a".to_string()));
        index.update(&DataChangeEvent::Delete { tuple_id: TupleId(1) }).unwrap();
        assert_eq!(index.count(), 0);
    }
}
