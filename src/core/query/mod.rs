//! The query plan tree (spec §4.9): the operator set a planner assembles
//! and an executor walks.

pub mod plan;

pub use plan::{Arity, Cost, Operator, PhysicalAttrs, PlanNode, SortKey};
