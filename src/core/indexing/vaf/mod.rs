//! The vector approximation file index: marks + per-tuple cell signatures,
//! bounding exact distances to prune a top-k scan under L1/L2/L2² distances.

pub mod builder;
pub mod search;

use crate::core::catalogue::IndexState;
use crate::core::common::types::{TupleId, Value};
use crate::core::common::OxidbError;
use crate::core::indexing::column_source::ColumnSource;
use crate::core::indexing::traits::{
    DataChangeEvent, Index, IndexCost, IndexRecord, Predicate, ProximityPredicate,
};
use crate::core::vector::DistanceKind;

use search::{Candidate, TopK};

pub struct VafIndex {
    column: String,
    dimension: usize,
    marks_per_dim: usize,
    marks: Vec<Vec<f32>>,
    signatures: Vec<(TupleId, Vec<u32>)>,
    state: IndexState,
    source: ColumnSource,
}

impl VafIndex {
    #[must_use]
    pub fn new(column: String, dimension: usize, marks_per_dim: usize, source: ColumnSource) -> Self {
        Self {
            column,
            dimension,
            marks_per_dim,
            marks: Vec::new(),
            signatures: Vec::new(),
            state: IndexState::Dirty,
            source,
        }
    }

    fn supported_distance(predicate: &ProximityPredicate) -> bool {
        matches!(predicate.distance, DistanceKind::L1 | DistanceKind::L2 | DistanceKind::L2Squared)
    }

    fn proximity_target<'a>(&self, predicate: &'a Predicate) -> Option<&'a ProximityPredicate> {
        match predicate {
            Predicate::Proximity(p)
                if p.column.eq_ignore_ascii_case(&self.column) && Self::supported_distance(p) =>
            {
                Some(p)
            }
            _ => None,
        }
    }
}

impl Index for VafIndex {
    fn index_type(&self) -> &str {
        "vaf"
    }

    fn columns(&self) -> &[String] {
        std::slice::from_ref(&self.column)
    }

    fn state(&self) -> IndexState {
        self.state
    }

    fn count(&self) -> usize {
        self.signatures.len()
    }

    fn supports_incremental_update(&self) -> bool {
        false
    }

    fn supports_partitioning(&self) -> bool {
        true
    }

    fn can_process(&self, predicate: &Predicate) -> bool {
        self.proximity_target(predicate).is_some()
    }

    fn cost(&self, predicate: &Predicate) -> IndexCost {
        if self.can_process(predicate) {
            IndexCost { io: 0.2, cpu: 0.3, memory: 0.1, accuracy: 0.95 }
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
        let Some(proximity) = self.proximity_target(predicate) else {
            return Err(OxidbError::UnsupportedPredicate(format!(
                "vaf index on {} cannot serve {predicate:?}",
                self.column
            )));
        };
        if proximity.query.len() != self.dimension {
            return Err(OxidbError::TypeMismatch(format!(
                "query vector has dimension {}, expected {}",
                proximity.query.len(),
                self.dimension
            )));
        }

        let mut top_k = TopK::new(proximity.k);
        for (tuple_id, cells) in &self.signatures {
            if partitions > 1 && (tuple_id.0 as usize) % partitions != partition_index {
                continue;
            }
            let (lower, _upper) = search::bounds_for(proximity.distance, &proximity.query, &self.marks, cells);
            let should_fetch = !top_k.is_full() || top_k.threshold().is_some_and(|t| lower < t);
            if !should_fetch {
                continue;
            }
            let Some(value) = self.source.get(*tuple_id)? else { continue };
            let vector = value.as_float_vector()?;
            let distance = proximity.distance.compute(&proximity.query, vector)?;
            top_k.offer(Candidate { tuple_id: *tuple_id, distance });
        }

        Ok(top_k
            .into_sorted()
            .into_iter()
            .map(|c| IndexRecord { tuple_id: c.tuple_id, computed: vec![("distance".to_string(), Value::Float(c.distance))] })
            .collect())
    }

    fn rebuild(&mut self) -> Result<(), OxidbError> {
        let rows = self.source.scan()?;
        let bounds = builder::dimension_bounds(&rows, self.dimension)?;
        self.marks = bounds
            .into_iter()
            .map(|(min, max)| builder::equidistant_marks(min, max, self.marks_per_dim))
            .collect();

        self.signatures.clear();
        for (tuple_id, value) in &rows {
            let signature = builder::signature_for(value, &self.marks, self.marks_per_dim)?;
            self.signatures.push((*tuple_id, signature));
        }
        self.state = IndexState::Clean;
        Ok(())
    }

    fn update(&mut self, _event: &DataChangeEvent) -> Result<(), OxidbError> {
        self.state = IndexState::Dirty;
        Ok(())
    }

    fn clear(&mut self) {
        self.marks.clear();
        self.signatures.clear();
        self.state = IndexState::Dirty;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::storage::engine::store::DuplicateMode;
    use crate::core::storage::engine::StorageEngine;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn seeded_source(dir: &std::path::Path) -> ColumnSource {
        let engine = Arc::new(StorageEngine::open(dir).unwrap());
        engine.open_store("embed", DuplicateMode::Unique).unwrap();
        let mut tx = engine.begin();
        for i in 0..200u64 {
            let v = Value::FloatVector(vec![(i % 7) as f32, (i % 11) as f32, (i % 5) as f32, (i % 3) as f32]);
            let bytes = crate::core::common::serialization::serialize_value(&v);
            tx.put("embed", i.to_be_bytes().to_vec(), bytes).unwrap();
        }
        tx.commit().unwrap();
        ColumnSource::new(engine, "embed".to_string(), crate::core::common::types::DataType::FloatVector(4))
    }

    #[test]
    fn vaf_matches_brute_force_top_k() {
        let dir = tempdir().unwrap();
        let source = seeded_source(dir.path());
        let rows = source.scan().unwrap();

        let mut index = VafIndex::new("embed".to_string(), 4, 8, source);
        index.rebuild().unwrap();
        assert_eq!(index.state(), IndexState::Clean);

        let query = vec![1.0, 2.0, 3.0, 0.0];
        let predicate = Predicate::Proximity(ProximityPredicate {
            column: "embed".to_string(),
            k: 5,
            distance: DistanceKind::L2,
            query: query.clone(),
        });
        let vaf_results = index.filter(&predicate).unwrap();

        let mut brute: Vec<(TupleId, f32)> = rows
            .iter()
            .map(|(t, v)| (*t, DistanceKind::L2.compute(&query, v.as_float_vector().unwrap()).unwrap()))
            .collect();
        brute.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap().then(a.0.cmp(&b.0)));
        let brute_top: Vec<TupleId> = brute.into_iter().take(5).map(|(t, _)| t).collect();
        let vaf_top: Vec<TupleId> = vaf_results.into_iter().map(|r| r.tuple_id).collect();
        assert_eq!(vaf_top, brute_top);
    }
}
