//! The abstract index contract. Every concrete index type (hash, VAF, PQ)
//! implements `Index`; predicates are dispatched to it as `Predicate`
//! variants and data-change events keep incremental indexes in sync.

use crate::core::catalogue::IndexState;
use crate::core::common::types::{TupleId, Value};
use crate::core::common::OxidbError;
use crate::core::vector::DistanceKind;

/// An atomic comparison, composed with AND/OR/NOT, plus a LIKE/MATCH form.
#[derive(Debug, Clone)]
pub enum BooleanPredicate {
    Equals { column: String, value: Value },
    Less { column: String, value: Value },
    Greater { column: String, value: Value },
    Like { column: String, pattern: String },
    And(Box<BooleanPredicate>, Box<BooleanPredicate>),
    Or(Box<BooleanPredicate>, Box<BooleanPredicate>),
    Not(Box<BooleanPredicate>),
}

/// A bounded nearest-neighbor request against one vector column.
#[derive(Debug, Clone)]
pub struct ProximityPredicate {
    pub column: String,
    pub k: usize,
    pub distance: DistanceKind,
    pub query: Vec<f32>,
}

/// A predicate an index may be asked to evaluate.
#[derive(Debug, Clone)]
pub enum Predicate {
    Boolean(BooleanPredicate),
    Proximity(ProximityPredicate),
}

/// A write observed by an entity transaction, published to every index on
/// the entity so incremental indexes can update themselves in place.
#[derive(Debug, Clone)]
pub enum DataChangeEvent {
    Insert { tuple_id: TupleId, values: Vec<(String, Value)> },
    Update { tuple_id: TupleId, values: Vec<(String, Value)> },
    Delete { tuple_id: TupleId },
}

/// A record an index produced: the tuple it came from, plus any columns the
/// index itself computed (e.g. a distance column for proximity indexes).
#[derive(Debug, Clone)]
pub struct IndexRecord {
    pub tuple_id: TupleId,
    pub computed: Vec<(String, Value)>,
}

/// The 4-tuple cost estimate the planner uses to choose between an index
/// scan and a table scan.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndexCost {
    pub io: f64,
    pub cpu: f64,
    pub memory: f64,
    pub accuracy: f64,
}

impl IndexCost {
    #[must_use]
    pub const fn unusable() -> Self {
        Self { io: f64::INFINITY, cpu: f64::INFINITY, memory: f64::INFINITY, accuracy: 0.0 }
    }
}

pub trait Index: Send + Sync {
    fn index_type(&self) -> &str;
    fn columns(&self) -> &[String];
    fn state(&self) -> IndexState;
    fn count(&self) -> usize;
    fn supports_incremental_update(&self) -> bool;
    fn supports_partitioning(&self) -> bool;
    fn can_process(&self, predicate: &Predicate) -> bool;
    fn cost(&self, predicate: &Predicate) -> IndexCost;

    /// # Errors
    /// Returns `UnsupportedPredicate` if `can_process` would return false.
    fn filter(&self, predicate: &Predicate) -> Result<Vec<IndexRecord>, OxidbError> {
        self.filter_partition(predicate, 0, 1)
    }

    /// # Errors
    /// Returns `UnsupportedPredicate` if `can_process` would return false.
    fn filter_partition(
        &self,
        predicate: &Predicate,
        partition_index: usize,
        partitions: usize,
    ) -> Result<Vec<IndexRecord>, OxidbError>;

    /// # Errors
    /// Returns an I/O error if the rebuilt index fails to persist.
    fn rebuild(&mut self) -> Result<(), OxidbError>;

    /// Indexes that do not support incremental update should instead flip
    /// themselves Dirty here and require a `rebuild` before further use.
    ///
    /// # Errors
    /// Returns an I/O error if applying the event fails to persist.
    fn update(&mut self, event: &DataChangeEvent) -> Result<(), OxidbError>;

    fn clear(&mut self);
}
