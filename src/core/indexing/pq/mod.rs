//! Product quantization: per-sub-space codebooks compress each vector into a
//! short signature, letting a top-k query score candidates against lookup
//! tables before re-ranking a small shortlist against the real vectors.
//!
//! The sub-space count `M` is chosen by [`training::choose_num_subspaces`]
//! unless the caller's [`PqConfig`] pins one: the engine never specified a
//! concrete rule for M beyond "a divisor of d, bounded by a signed-byte
//! limit", so this picks the divisor giving the sub-vector length closest to
//! four components — a documented choice, not a derived one.

pub mod training;

use std::collections::HashMap;

use crate::core::catalogue::IndexState;
use crate::core::common::types::{TupleId, Value};
use crate::core::common::OxidbError;
use crate::core::config::PqConfig;
use crate::core::indexing::column_source::ColumnSource;
use crate::core::indexing::traits::{
    DataChangeEvent, Index, IndexCost, IndexRecord, Predicate, ProximityPredicate,
};
use crate::core::indexing::vaf::search::{Candidate, TopK};
use crate::core::vector::distance::l2_squared_f64;
use crate::core::vector::DistanceKind;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

pub struct PqIndex {
    column: String,
    dimension: usize,
    config: PqConfig,
    num_subspaces: usize,
    subspace_dim: usize,
    /// `centroids[subspace][centroid_index]`, in `f64` for training fidelity.
    centroids: Vec<Vec<Vec<f64>>>,
    /// Per-sub-space diagonal variance around each assigned centroid;
    /// retained as index statistics, not folded into query scoring.
    variance: Vec<Vec<f64>>,
    /// One entry per distinct signature observed during rebuild.
    signatures: HashMap<Vec<u16>, Vec<TupleId>>,
    state: IndexState,
    source: ColumnSource,
}

impl PqIndex {
    #[must_use]
    pub fn new(column: String, dimension: usize, config: PqConfig, source: ColumnSource) -> Self {
        Self {
            column,
            dimension,
            config,
            num_subspaces: 0,
            subspace_dim: 0,
            centroids: Vec::new(),
            variance: Vec::new(),
            signatures: HashMap::new(),
            state: IndexState::Dirty,
            source,
        }
    }

    fn proximity_target<'a>(&self, predicate: &'a Predicate) -> Option<&'a ProximityPredicate> {
        match predicate {
            Predicate::Proximity(p) if p.column.eq_ignore_ascii_case(&self.column) => Some(p),
            _ => None,
        }
    }

    fn signature_for(&self, vector: &[f32]) -> Vec<u16> {
        let doubled: Vec<f64> = vector.iter().map(|&c| f64::from(c)).collect();
        training::split(&doubled, self.num_subspaces)
            .into_iter()
            .enumerate()
            .map(|(s, sub)| training::quantize(sub, &self.centroids[s]))
            .collect()
    }

    /// Sum, over sub-spaces, of the squared Euclidean distance from `query`'s
    /// sub-vector to the centroid `signature` names in that sub-space. This
    /// is always squared-Euclidean regardless of the predicate's requested
    /// distance kind — a standard simplification for the approximate phase,
    /// with phase 2 re-ranking under the caller's actual distance kind.
    fn approx_distance(&self, lookup: &[Vec<f64>], signature: &[u16]) -> f64 {
        signature.iter().enumerate().map(|(s, &c)| lookup[s][c as usize]).sum()
    }

    fn lookup_table(&self, query: &[f32]) -> Vec<Vec<f64>> {
        let doubled: Vec<f64> = query.iter().map(|&c| f64::from(c)).collect();
        training::split(&doubled, self.num_subspaces)
            .into_iter()
            .enumerate()
            .map(|(s, sub)| self.centroids[s].iter().map(|c| l2_squared_f64(sub, c)).collect())
            .collect()
    }
}

impl Index for PqIndex {
    fn index_type(&self) -> &str {
        "pq"
    }

    fn columns(&self) -> &[String] {
        std::slice::from_ref(&self.column)
    }

    fn state(&self) -> IndexState {
        self.state
    }

    fn count(&self) -> usize {
        self.signatures.values().map(Vec::len).sum()
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
            IndexCost { io: 0.1, cpu: 0.4, memory: 0.3, accuracy: 0.85 }
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
                "pq index on {} cannot serve {predicate:?}",
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

        let lookup = self.lookup_table(&proximity.query);

        // Phase 1: score every distinct signature bucket against the lookup
        // table and keep the inflated shortlist. A full sort over buckets is
        // used here rather than a bounded heap, since the number of distinct
        // signatures is already bounded by numCentroids^numSubspaces and is
        // typically small relative to the row count.
        let mut buckets: Vec<(&Vec<u16>, &Vec<TupleId>, f64)> = self
            .signatures
            .iter()
            .filter(|(_, tuple_ids)| {
                partitions <= 1
                    || tuple_ids.iter().any(|t| (t.0 as usize) % partitions == partition_index)
            })
            .map(|(sig, tuple_ids)| (sig, tuple_ids, self.approx_distance(&lookup, sig)))
            .collect();
        buckets.sort_by(|a, b| a.2.partial_cmp(&b.2).unwrap_or(std::cmp::Ordering::Equal));

        let shortlist_len = ((proximity.k as f64) * self.config.candidate_inflation).ceil() as usize;
        let shortlist_len = shortlist_len.max(proximity.k);

        // Phase 2: exact re-rank of the shortlist under the requested distance.
        let mut top_k = TopK::new(proximity.k);
        let mut seen = 0usize;
        for (_, tuple_ids, _) in buckets {
            if seen >= shortlist_len {
                break;
            }
            for tuple_id in tuple_ids {
                if partitions > 1 && (tuple_id.0 as usize) % partitions != partition_index {
                    continue;
                }
                let Some(value) = self.source.get(*tuple_id)? else { continue };
                let vector = value.as_float_vector()?;
                let distance = proximity.distance.compute(&proximity.query, vector)?;
                top_k.offer(Candidate { tuple_id: *tuple_id, distance });
            }
            seen += 1;
        }

        Ok(top_k
            .into_sorted()
            .into_iter()
            .map(|c| IndexRecord {
                tuple_id: c.tuple_id,
                computed: vec![("distance".to_string(), Value::Float(c.distance))],
            })
            .collect())
    }

    fn rebuild(&mut self) -> Result<(), OxidbError> {
        let rows = self.source.scan()?;
        self.num_subspaces =
            self.config.num_subspaces.map_or_else(|| training::choose_num_subspaces(self.dimension), usize::from);
        if self.dimension % self.num_subspaces != 0 {
            return Err(OxidbError::PolicyViolation(format!(
                "pq sub-space count {} does not divide dimension {}",
                self.num_subspaces, self.dimension
            )));
        }
        self.subspace_dim = self.dimension / self.num_subspaces;

        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let sample_size = self.config.sample_size.min(rows.len());
        let sample: Vec<&(TupleId, Value)> = rows.choose_multiple(&mut rng, sample_size).collect();
        let doubled_sample: Vec<Vec<f64>> = sample
            .iter()
            .map(|(_, v)| v.as_float_vector().map(|s| s.iter().map(|&c| f64::from(c)).collect()))
            .collect::<Result<_, OxidbError>>()?;

        self.centroids.clear();
        self.variance.clear();
        for s in 0..self.num_subspaces {
            let sub_samples: Vec<Vec<f64>> = doubled_sample
                .iter()
                .map(|v| training::split(v, self.num_subspaces)[s].to_vec())
                .collect();
            let k = usize::from(self.config.num_centroids).min(sub_samples.len()).max(1);
            let centroids =
                training::kmeans_plus_plus(&sub_samples, k, self.config.max_iterations, self.config.seed)?;
            let variance = training::diagonal_variance(&sub_samples, &centroids);
            self.centroids.push(centroids);
            self.variance.push(variance);
        }

        self.signatures.clear();
        for (tuple_id, value) in &rows {
            let vector = value.as_float_vector()?;
            let signature = self.signature_for(vector);
            self.signatures.entry(signature).or_default().push(*tuple_id);
        }
        self.state = IndexState::Clean;
        Ok(())
    }

    fn update(&mut self, _event: &DataChangeEvent) -> Result<(), OxidbError> {
        self.state = IndexState::Dirty;
        Ok(())
    }

    fn clear(&mut self) {
        self.centroids.clear();
        self.variance.clear();
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
        for i in 0..300u64 {
            let base = (i % 20) as f32;
            let v = Value::FloatVector(vec![base, base * 2.0, -base, base + 1.0, base * 0.5, base - 3.0, base * 3.0, base / 2.0]);
            let bytes = crate::core::common::serialization::serialize_value(&v);
            tx.put("embed", i.to_be_bytes().to_vec(), bytes).unwrap();
        }
        tx.commit().unwrap();
        ColumnSource::new(engine, "embed".to_string(), crate::core::common::types::DataType::FloatVector(8))
    }

    #[test]
    fn rebuild_partitions_rows_into_signature_buckets() {
        let dir = tempdir().unwrap();
        let source = seeded_source(dir.path());
        let mut index = PqIndex::new("embed".to_string(), 8, PqConfig { num_centroids: 8, ..PqConfig::default() }, source);
        index.rebuild().unwrap();
        assert_eq!(index.state(), IndexState::Clean);
        assert_eq!(index.count(), 300);
        assert!(!index.signatures.is_empty());
    }

    #[test]
    fn approximate_search_has_reasonable_recall_against_brute_force() {
        let dir = tempdir().unwrap();
        let source = seeded_source(dir.path());
        let rows = source.scan().unwrap();

        let mut index = PqIndex::new(
            "embed".to_string(),
            8,
            PqConfig { num_centroids: 16, candidate_inflation: 3.0, ..PqConfig::default() },
            source,
        );
        index.rebuild().unwrap();

        let query = vec![5.0, 10.0, -5.0, 6.0, 2.5, 2.0, 15.0, 2.5];
        let predicate = Predicate::Proximity(ProximityPredicate {
            column: "embed".to_string(),
            k: 5,
            distance: DistanceKind::L2Squared,
            query: query.clone(),
        });
        let pq_results = index.filter(&predicate).unwrap();
        assert_eq!(pq_results.len(), 5);

        let mut brute: Vec<(TupleId, f32)> = rows
            .iter()
            .map(|(t, v)| (*t, DistanceKind::L2Squared.compute(&query, v.as_float_vector().unwrap()).unwrap()))
            .collect();
        brute.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap().then(a.0.cmp(&b.0)));
        let brute_top: std::collections::HashSet<TupleId> = brute.into_iter().take(5).map(|(t, _)| t).collect();
        let pq_top: std::collections::HashSet<TupleId> = pq_results.into_iter().map(|r| r.tuple_id).collect();
        let overlap = brute_top.intersection(&pq_top).count();
        assert!(overlap >= 3, "expected at least 3/5 overlap with brute force, got {overlap}");
    }
}
