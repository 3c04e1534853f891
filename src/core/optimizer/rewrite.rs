//! Logical rewrites (spec §4.10): decompose conjunctions into cascaded
//! filters, defer column fetches until first needed, push filters under
//! projections.

use std::collections::HashSet;

use crate::core::indexing::traits::BooleanPredicate;
use crate::core::query::plan::{Operator, PlanNode};

/// `Filter{And(a, b)}` becomes `Filter{b}` wrapping `Filter{a}` wrapping the
/// original input: two cheap single-predicate filters, either of which can
/// short-circuit the row before the other runs, instead of one filter that
/// always evaluates both halves.
#[must_use]
pub fn decompose_conjunctions(node: &PlanNode) -> PlanNode {
    let rewritten_inputs: Vec<PlanNode> = node.inputs.iter().map(decompose_conjunctions).collect();
    let mut next = node.copy_with_inputs(rewritten_inputs);

    if let Operator::Filter { predicate: BooleanPredicate::And(left, right) } = next.operator.clone() {
        let inner = PlanNode {
            operator: Operator::Filter { predicate: *left },
            depth: next.depth,
            ..next.clone()
        };
        next.operator = Operator::Filter { predicate: *right };
        next.depth = inner.depth + 1;
        next.inputs = vec![inner];
    }
    next
}

/// Swaps an outer `Filter` with an inner `SelectProjection`/`SelectDistinctProjection`
/// when every column the filter reads survives the projection, so rows are
/// dropped before the (potentially column-narrowing, and for distinct,
/// dedup-bookkeeping) projection work runs rather than after.
#[must_use]
pub fn push_filter_under_projection(node: &PlanNode) -> PlanNode {
    let rewritten_inputs: Vec<PlanNode> = node.inputs.iter().map(push_filter_under_projection).collect();
    let next = node.copy_with_inputs(rewritten_inputs);

    let Operator::Filter { predicate } = &next.operator else { return next };
    let Some(projection) = next.inputs.first() else { return next };
    let projected_columns: Option<&[String]> = match &projection.operator {
        Operator::SelectProjection { columns } | Operator::SelectDistinctProjection { columns } => Some(columns),
        _ => None,
    };
    let Some(columns) = projected_columns else { return next };
    if !predicate_columns(predicate).iter().all(|c| columns.iter().any(|p| p.eq_ignore_ascii_case(c))) {
        return next;
    }

    let Some(scan) = projection.inputs.first() else { return next };
    let swapped_filter = PlanNode {
        group_id: next.group_id,
        depth: scan.depth + 1,
        columns: scan.columns.clone(),
        requires: next.requires.clone(),
        operator: Operator::Filter { predicate: predicate.clone() },
        inputs: vec![scan.clone()],
        physical: None,
    };
    PlanNode {
        group_id: projection.group_id,
        depth: swapped_filter.depth + 1,
        columns: projection.columns.clone(),
        requires: projection.requires.clone(),
        operator: projection.operator.clone(),
        inputs: vec![swapped_filter],
        physical: None,
    }
}

fn predicate_columns(predicate: &BooleanPredicate) -> Vec<String> {
    match predicate {
        BooleanPredicate::Equals { column, .. }
        | BooleanPredicate::Less { column, .. }
        | BooleanPredicate::Greater { column, .. }
        | BooleanPredicate::Like { column, .. } => vec![column.clone()],
        BooleanPredicate::And(a, b) | BooleanPredicate::Or(a, b) => {
            let mut cols = predicate_columns(a);
            cols.extend(predicate_columns(b));
            cols
        }
        BooleanPredicate::Not(inner) => predicate_columns(inner),
    }
}

/// Narrows every `EntityScan`/`RangedEntityScan` leaf's requested columns to
/// the union of what the nodes above it actually read (`requires`, plus its
/// own `columns`), so a column only the final projection doesn't need is
/// never fetched from storage in the first place.
#[must_use]
pub fn defer_column_fetch(node: &PlanNode) -> PlanNode {
    defer_with_required(node, &node.requires.iter().chain(node.columns.iter()).cloned().collect())
}

fn defer_with_required(node: &PlanNode, required: &HashSet<String>) -> PlanNode {
    let mut needed: HashSet<String> = required.clone();
    needed.extend(node.requires.iter().cloned());
    needed.extend(node.columns.iter().cloned());

    let rewritten_inputs: Vec<PlanNode> = node.inputs.iter().map(|input| defer_with_required(input, &needed)).collect();
    let mut next = node.copy_with_inputs(rewritten_inputs);

    match &mut next.operator {
        Operator::EntityScan { columns, .. } | Operator::RangedEntityScan { columns, .. } => {
            columns.retain(|c| needed.contains(c));
        }
        _ => {}
    }
    next
}

/// Runs every logical rewrite in sequence; order matters: conjunctions are
/// decomposed first so the filter-pushdown rewrite sees single-predicate
/// filters, and column deferral runs last over the fully rewritten shape.
#[must_use]
pub fn rewrite_logical(node: &PlanNode) -> PlanNode {
    let node = decompose_conjunctions(node);
    let node = push_filter_under_projection(&node);
    defer_column_fetch(&node)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::common::types::Value;

    fn scan(columns: &[&str]) -> PlanNode {
        PlanNode::leaf(
            1,
            Operator::EntityScan {
                schema: "main".to_string(),
                entity: "features".to_string(),
                columns: columns.iter().map(|s| s.to_string()).collect(),
            },
            columns.iter().map(|s| s.to_string()).collect(),
            Vec::new(),
        )
    }

    #[test]
    fn decomposes_a_conjunction_into_two_cascaded_filters() {
        let predicate = BooleanPredicate::And(
            Box::new(BooleanPredicate::Equals { column: "a".to_string(), value: Value::Long(1) }),
            Box::new(BooleanPredicate::Equals { column: "b".to_string(), value: Value::Long(2) }),
        );
        let filter = PlanNode::with_input(1, Operator::Filter { predicate }, scan(&["a", "b"]), vec!["a".to_string(), "b".to_string()], Vec::new());
        let rewritten = decompose_conjunctions(&filter);
        assert!(matches!(rewritten.operator, Operator::Filter { predicate: BooleanPredicate::Equals { .. } }));
        assert!(matches!(rewritten.inputs[0].operator, Operator::Filter { predicate: BooleanPredicate::Equals { .. } }));
    }

    #[test]
    fn defer_column_fetch_drops_unused_scan_columns() {
        let node = PlanNode::with_input(
            1,
            Operator::SelectProjection { columns: vec!["a".to_string()] },
            scan(&["a", "b", "c"]),
            vec!["a".to_string()],
            Vec::new(),
        );
        let rewritten = defer_column_fetch(&node);
        let Operator::EntityScan { columns, .. } = &rewritten.inputs[0].operator else { panic!("expected scan") };
        assert_eq!(columns, &vec!["a".to_string()]);
    }

    #[test]
    fn pushes_a_filter_below_a_compatible_projection() {
        let predicate = BooleanPredicate::Equals { column: "a".to_string(), value: Value::Long(1) };
        let projection = PlanNode::with_input(
            1,
            Operator::SelectProjection { columns: vec!["a".to_string()] },
            scan(&["a"]),
            vec!["a".to_string()],
            Vec::new(),
        );
        let filter = PlanNode::with_input(2, Operator::Filter { predicate }, projection, vec!["a".to_string()], Vec::new());
        let rewritten = push_filter_under_projection(&filter);
        assert!(matches!(rewritten.operator, Operator::SelectProjection { .. }));
        assert!(matches!(rewritten.inputs[0].operator, Operator::Filter { .. }));
    }
}
