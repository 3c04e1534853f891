//! The query plan tree: a closed set of operator kinds (spec §4.11) wrapped
//! in a node carrying group id, depth, column/requirement metadata, and,
//! once physically enumerated, cost and ordering attributes (spec §4.9).
//!
//! A fixed operator enum plays the role of the teacher's `dyn PlanNode`
//! trait hierarchy (`core/optimizer/planner.rs`): the node set is closed and
//! known ahead of time, so a single enum with inherent structural-clone
//! methods is the idiomatic Rust shape rather than a trait-object tree.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::core::common::OxidbError;
use crate::core::config::CostWeights;
use crate::core::indexing::traits::{BooleanPredicate, IndexCost, Predicate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Zero,
    One,
    Two,
    N,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
    pub column: String,
    pub ascending: bool,
}

/// The 4-tuple cost model (spec §4.9): bottom-up aggregation is plain
/// component-wise addition, weighting happens only at plan-selection time.
pub type Cost = IndexCost;

#[must_use]
pub fn weighted_score(cost: Cost, weights: CostWeights) -> f64 {
    weights.io * cost.io + weights.cpu * cost.cpu + weights.memory * cost.memory
        - weights.accuracy * cost.accuracy
}

fn add_cost(a: Cost, b: Cost) -> Cost {
    Cost { io: a.io + b.io, cpu: a.cpu + b.cpu, memory: a.memory + b.memory, accuracy: a.accuracy.max(b.accuracy) }
}

/// The closed operator set of spec §4.11. Node-specific parameters live on
/// the variant; the surrounding `PlanNode` carries everything common to all
/// operators (group id, depth, columns, requires, physical attributes).
#[derive(Debug, Clone)]
pub enum Operator {
    EntityScan { schema: String, entity: String, columns: Vec<String> },
    RangedEntityScan { schema: String, entity: String, columns: Vec<String>, partition_index: usize, partitions: usize },
    IndexScan { schema: String, entity: String, index: String, predicate: Predicate },
    Filter { predicate: BooleanPredicate },
    FunctionProjection { function: String, args: Vec<String>, output_column: String },
    HeapSort { keys: Vec<SortKey>, limit: usize },
    MergeLimitingHeapSort { keys: Vec<SortKey>, limit: usize },
    Limit { count: usize },
    Skip { count: usize },
    CountProjection,
    SelectProjection { columns: Vec<String> },
    SelectDistinctProjection { columns: Vec<String> },
    EntitySample { schema: String, entity: String, size: usize },
    EntityCount { schema: String, entity: String },
    Insert { schema: String, entity: String },
    Update { schema: String, entity: String, columns: Vec<String> },
    Delete { schema: String, entity: String },
    CreateIndex { schema: String, entity: String, name: String, index_type: String, columns: Vec<String> },
    TruncateEntity { schema: String, entity: String },
}

impl Operator {
    /// Source operators (zero inputs) and sink/DML operators are fixed by
    /// what they do; everything else is single-input. Joins do not appear
    /// in this operator set (spec §4.11 lists none), so `Two` is unused
    /// today but kept for `Arity`'s sake.
    #[must_use]
    pub const fn arity(&self) -> Arity {
        match self {
            Self::EntityScan { .. }
            | Self::RangedEntityScan { .. }
            | Self::IndexScan { .. }
            | Self::EntitySample { .. }
            | Self::EntityCount { .. }
            | Self::Insert { .. }
            | Self::CreateIndex { .. } => Arity::Zero,
            Self::MergeLimitingHeapSort { .. } => Arity::N,
            _ => Arity::One,
        }
    }
}

/// Physical attributes, present only once the physical-enumeration phase of
/// the planner (spec §4.10) has run over a node.
#[derive(Debug, Clone)]
pub struct PhysicalAttrs {
    pub output_size: u64,
    pub cost: Cost,
    pub can_be_partitioned: bool,
    pub sort_on: Vec<SortKey>,
}

#[derive(Debug, Clone)]
pub struct PlanNode {
    pub group_id: u64,
    pub depth: u32,
    pub columns: Vec<String>,
    pub requires: Vec<String>,
    pub operator: Operator,
    pub inputs: Vec<PlanNode>,
    pub physical: Option<PhysicalAttrs>,
}

impl PlanNode {
    #[must_use]
    pub fn leaf(group_id: u64, operator: Operator, columns: Vec<String>, requires: Vec<String>) -> Self {
        Self { group_id, depth: 0, columns, requires, operator, inputs: Vec::new(), physical: None }
    }

    #[must_use]
    pub fn with_input(group_id: u64, operator: Operator, input: Self, columns: Vec<String>, requires: Vec<String>) -> Self {
        let depth = input.depth + 1;
        Self { group_id, depth, columns, requires, operator, inputs: vec![input], physical: None }
    }

    #[must_use]
    pub fn arity(&self) -> Arity {
        match self.inputs.len() {
            0 => Arity::Zero,
            1 => Arity::One,
            2 => Arity::Two,
            _ => Arity::N,
        }
    }

    /// A structural+identity hash: the operator's `Debug` form (which
    /// captures every node-specific field), the group id, and every child's
    /// digest folded in order. Two trees with the same shape and the same
    /// operator parameters produce the same digest regardless of physical
    /// attributes, which is exactly the key the plan cache looks up by.
    #[must_use]
    pub fn digest(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        format!("{:?}", self.operator).hash(&mut hasher);
        self.group_id.hash(&mut hasher);
        for input in &self.inputs {
            input.digest().hash(&mut hasher);
        }
        hasher.finish()
    }

    /// Bottom-up cost aggregation (spec §4.9): a node with no physical
    /// attributes of its own (not yet enumerated) contributes only its
    /// children's cost.
    #[must_use]
    pub fn total_cost(&self) -> Cost {
        const ZERO: Cost = Cost { io: 0.0, cpu: 0.0, memory: 0.0, accuracy: 0.0 };
        let own = self.physical.as_ref().map_or(ZERO, |p| p.cost);
        self.inputs.iter().fold(own, |acc, input| add_cost(acc, input.total_cost()))
    }

    /// A coarse hint: more expensive subtrees are worth partitioning, scaled
    /// down past a small constant so trivial plans never request more than
    /// one worker.
    #[must_use]
    pub fn parallelism_hint(&self, weights: CostWeights) -> usize {
        let score = weighted_score(self.total_cost(), weights);
        (score / 1000.0).floor().max(1.0) as usize
    }

    #[must_use]
    pub fn copy(&self) -> Self {
        self.clone()
    }

    #[must_use]
    pub fn copy_with_inputs(&self, inputs: Vec<Self>) -> Self {
        let mut next = self.clone();
        next.depth = inputs.iter().map(|i| i.depth).max().unwrap_or(0) + 1;
        next.inputs = inputs;
        next
    }

    #[must_use]
    pub fn copy_with_group_inputs(&self, group_id: u64, inputs: Vec<Self>) -> Self {
        let mut next = self.copy_with_inputs(inputs);
        next.group_id = group_id;
        next
    }

    /// Wires `replacement` into input slot `slot`, erroring if that slot is
    /// already occupied by something other than the placeholder produced by
    /// [`Self::vacant`].
    ///
    /// # Errors
    /// Returns `PolicyViolation` if `slot` is out of range or already
    /// occupied.
    pub fn copy_with_output(&self, slot: usize, replacement: Self) -> Result<Self, OxidbError> {
        let mut next = self.clone();
        let Some(existing) = next.inputs.get_mut(slot) else {
            return Err(OxidbError::PolicyViolation(format!("plan node has no input slot {slot}")));
        };
        if !existing.is_vacant() {
            return Err(OxidbError::PolicyViolation(format!("plan node input slot {slot} is already occupied")));
        }
        *existing = replacement;
        Ok(next)
    }

    /// A placeholder input: a slot reserved during logical construction and
    /// filled in later by [`Self::copy_with_output`].
    #[must_use]
    pub fn vacant() -> Self {
        Self {
            group_id: 0,
            depth: 0,
            columns: Vec::new(),
            requires: Vec::new(),
            operator: Operator::CountProjection,
            inputs: Vec::new(),
            physical: None,
        }
    }

    fn is_vacant(&self) -> bool {
        self.group_id == 0 && self.inputs.is_empty() && matches!(self.operator, Operator::CountProjection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan() -> PlanNode {
        PlanNode::leaf(
            1,
            Operator::EntityScan { schema: "main".to_string(), entity: "features".to_string(), columns: vec!["id".to_string()] },
            vec!["id".to_string()],
            Vec::new(),
        )
    }

    #[test]
    fn digest_is_stable_across_clones_and_differs_on_structural_change() {
        let a = scan();
        let b = scan();
        assert_eq!(a.digest(), b.digest());

        let c = PlanNode::with_input(2, Operator::Limit { count: 10 }, a.clone(), a.columns.clone(), Vec::new());
        assert_ne!(a.digest(), c.digest());
    }

    #[test]
    fn total_cost_aggregates_bottom_up() {
        let mut leaf = scan();
        leaf.physical = Some(PhysicalAttrs {
            output_size: 100,
            cost: Cost { io: 1.0, cpu: 1.0, memory: 1.0, accuracy: 0.0 },
            can_be_partitioned: true,
            sort_on: Vec::new(),
        });
        let mut limited = PlanNode::with_input(2, Operator::Limit { count: 10 }, leaf, vec!["id".to_string()], Vec::new());
        limited.physical = Some(PhysicalAttrs {
            output_size: 10,
            cost: Cost { io: 0.0, cpu: 0.1, memory: 0.0, accuracy: 0.0 },
            can_be_partitioned: false,
            sort_on: Vec::new(),
        });
        let total = limited.total_cost();
        assert!((total.cpu - 1.1).abs() < 1e-9);
        assert!((total.io - 1.0).abs() < 1e-9);
    }

    #[test]
    fn copy_with_output_rejects_an_occupied_slot() {
        let base = PlanNode::with_input(1, Operator::Limit { count: 5 }, scan(), vec!["id".to_string()], Vec::new());
        let result = base.copy_with_output(0, scan());
        assert!(matches!(result, Err(OxidbError::PolicyViolation(_))));
    }

    #[test]
    fn copy_with_output_fills_a_vacant_slot() {
        let mut base = PlanNode::with_input(1, Operator::Limit { count: 5 }, PlanNode::vacant(), vec!["id".to_string()], Vec::new());
        base = base.copy_with_output(0, scan()).unwrap();
        assert!(matches!(base.inputs[0].operator, Operator::EntityScan { .. }));
    }
}
