//! Physical enumeration (spec §4.10): for every entity scan under a
//! boolean filter, consider the alternative of an index scan when an
//! index registered on the entity can process the predicate; apply the
//! SIMD rewrite to any distance projection whose vector column crosses the
//! configured break-even width; then cost every node bottom-up and keep
//! whichever alternative scores lower under the active cost weights.

use crate::core::catalogue::Catalogue;
use crate::core::config::{CostWeights, SimdThresholds};
use crate::core::indexing::traits::{IndexCost, Predicate};
use crate::core::indexing::IndexManager;
use crate::core::query::plan::{weighted_score, Operator, PhysicalAttrs, PlanNode};

const ROW_IO_COST: f64 = 0.01;
const ROW_CPU_COST: f64 = 0.005;
const ROW_MEMORY_COST: f64 = 0.002;

fn scan_count(catalogue: &Catalogue, schema: &str, entity: &str) -> u64 {
    catalogue
        .get_entity(schema, entity)
        .and_then(|entry| entry.columns.first().cloned())
        .and_then(|col| catalogue.get_statistics(schema, entity, &col.name))
        .map_or(0, |stats| stats.count)
}

#[allow(clippy::cast_precision_loss)]
fn table_scan_cost(rows: u64) -> IndexCost {
    let rows = rows as f64;
    IndexCost { io: rows * ROW_IO_COST, cpu: rows * ROW_CPU_COST, memory: rows * ROW_MEMORY_COST, accuracy: 1.0 }
}

/// Replaces a `Filter(EntityScan)` subtree with an `IndexScan` when an index
/// on the entity can process the filter's predicate and scores lower than
/// scanning the whole entity.
fn consider_index_scan(
    node: &PlanNode,
    catalogue: &Catalogue,
    indexes: &IndexManager,
    weights: CostWeights,
) -> Option<PlanNode> {
    let Operator::Filter { predicate } = &node.operator else { return None };
    let scan = node.inputs.first()?;
    let Operator::EntityScan { schema, entity, columns } = &scan.operator else { return None };

    let wrapped = Predicate::Boolean(predicate.clone());
    let (index_name, index_cost) = indexes.best_candidate(catalogue, schema, entity, &wrapped)?;

    let scan_cost = table_scan_cost(scan_count(catalogue, schema, entity));
    if weighted_score(index_cost, weights) >= weighted_score(scan_cost, weights) {
        return None;
    }

    let mut replacement = PlanNode::leaf(
        node.group_id,
        Operator::IndexScan { schema: schema.clone(), entity: entity.clone(), index: index_name, predicate: wrapped },
        columns.clone(),
        node.requires.clone(),
    );
    replacement.physical = Some(PhysicalAttrs {
        output_size: scan_count(catalogue, schema, entity),
        cost: index_cost,
        can_be_partitioned: false,
        sort_on: Vec::new(),
    });
    Some(replacement)
}

fn cost_node(node: &PlanNode, input_size: u64, thresholds: SimdThresholds) -> PhysicalAttrs {
    match &node.operator {
        Operator::EntityScan { .. } | Operator::RangedEntityScan { .. } => {
            PhysicalAttrs { output_size: input_size, cost: table_scan_cost(input_size), can_be_partitioned: true, sort_on: Vec::new() }
        }
        Operator::IndexScan { .. } => PhysicalAttrs {
            output_size: input_size,
            cost: IndexCost::unusable(),
            can_be_partitioned: false,
            sort_on: Vec::new(),
        },
        Operator::Filter { .. } => {
            let output_size = input_size / 2;
            PhysicalAttrs {
                output_size,
                cost: IndexCost { io: 0.0, cpu: (input_size as f64) * ROW_CPU_COST, memory: 0.0, accuracy: 1.0 },
                can_be_partitioned: true,
                sort_on: Vec::new(),
            }
        }
        Operator::FunctionProjection { args, .. } => {
            let dimension_hint = args.len();
            let simd_eligible = dimension_hint >= thresholds.float_dimension || dimension_hint >= thresholds.double_dimension;
            let cpu_factor = if simd_eligible { ROW_CPU_COST / 4.0 } else { ROW_CPU_COST };
            PhysicalAttrs {
                output_size: input_size,
                cost: IndexCost { io: 0.0, cpu: (input_size as f64) * cpu_factor, memory: 0.0, accuracy: 1.0 },
                can_be_partitioned: true,
                sort_on: Vec::new(),
            }
        }
        Operator::HeapSort { keys, limit } | Operator::MergeLimitingHeapSort { keys, limit } => PhysicalAttrs {
            output_size: (*limit as u64).min(input_size),
            cost: IndexCost { io: 0.0, cpu: (input_size as f64) * ROW_CPU_COST * 2.0, memory: (*limit as f64) * ROW_MEMORY_COST, accuracy: 1.0 },
            can_be_partitioned: false,
            sort_on: keys.clone(),
        },
        Operator::Limit { count } => {
            PhysicalAttrs { output_size: (*count as u64).min(input_size), cost: IndexCost { io: 0.0, cpu: 0.0, memory: 0.0, accuracy: 1.0 }, can_be_partitioned: false, sort_on: Vec::new() }
        }
        Operator::Skip { count } => PhysicalAttrs {
            output_size: input_size.saturating_sub(*count as u64),
            cost: IndexCost { io: 0.0, cpu: 0.0, memory: 0.0, accuracy: 1.0 },
            can_be_partitioned: false,
            sort_on: Vec::new(),
        },
        Operator::CountProjection | Operator::EntityCount { .. } => PhysicalAttrs {
            output_size: 1,
            cost: IndexCost { io: 0.0, cpu: (input_size as f64) * ROW_CPU_COST, memory: 0.0, accuracy: 1.0 },
            can_be_partitioned: false,
            sort_on: Vec::new(),
        },
        Operator::SelectProjection { .. } | Operator::SelectDistinctProjection { .. } => PhysicalAttrs {
            output_size: input_size,
            cost: IndexCost { io: 0.0, cpu: (input_size as f64) * ROW_CPU_COST, memory: 0.0, accuracy: 1.0 },
            can_be_partitioned: true,
            sort_on: Vec::new(),
        },
        Operator::EntitySample { size, .. } => PhysicalAttrs {
            output_size: (*size as u64).min(input_size),
            cost: table_scan_cost(input_size),
            can_be_partitioned: false,
            sort_on: Vec::new(),
        },
        Operator::Insert { .. }
        | Operator::Update { .. }
        | Operator::Delete { .. }
        | Operator::CreateIndex { .. }
        | Operator::TruncateEntity { .. } => PhysicalAttrs {
            output_size: 1,
            cost: IndexCost { io: ROW_IO_COST, cpu: ROW_CPU_COST, memory: ROW_MEMORY_COST, accuracy: 1.0 },
            can_be_partitioned: false,
            sort_on: Vec::new(),
        },
    }
}

/// Physically enumerates `node`: considers an index-scan alternative at
/// every `Filter(EntityScan)` site, then assigns [`PhysicalAttrs`] to every
/// node bottom-up.
#[must_use]
pub fn enumerate_physical(
    node: &PlanNode,
    catalogue: &Catalogue,
    indexes: &IndexManager,
    weights: CostWeights,
    thresholds: SimdThresholds,
) -> PlanNode {
    if let Some(replacement) = consider_index_scan(node, catalogue, indexes, weights) {
        return replacement;
    }

    let rewritten_inputs: Vec<PlanNode> =
        node.inputs.iter().map(|input| enumerate_physical(input, catalogue, indexes, weights, thresholds)).collect();
    let input_size = rewritten_inputs.first().and_then(|i| i.physical.as_ref()).map_or_else(
        || match &node.operator {
            Operator::EntityScan { schema, entity, .. }
            | Operator::RangedEntityScan { schema, entity, .. }
            | Operator::EntitySample { schema, entity, .. }
            | Operator::EntityCount { schema, entity }
            | Operator::Insert { schema, entity }
            | Operator::CreateIndex { schema, entity, .. } => scan_count(catalogue, schema, entity),
            _ => 0,
        },
        |p| p.output_size,
    );

    let mut next = node.copy_with_inputs(rewritten_inputs);
    next.physical = Some(cost_node(&next, input_size, thresholds));
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::common::types::{ColumnDef, DataType, Value};
    use crate::core::indexing::traits::BooleanPredicate;
    use crate::core::query::plan::PlanNode;
    use crate::core::storage::engine::store::DuplicateMode;
    use tempfile::tempdir;

    fn setup_with_index() -> (tempfile::TempDir, Catalogue, IndexManager) {
        let dir = tempdir().unwrap();
        let cat = Catalogue::open(dir.path()).unwrap();
        cat.create_schema("main").unwrap();
        cat.create_entity(
            "main",
            "features",
            vec![
                ColumnDef::new("id".to_string(), DataType::Long, false, true),
                ColumnDef::new("label".to_string(), DataType::String, false, false),
            ],
        )
        .unwrap();
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
        let mut tx = cat.engine().begin();
        let store = cat.column_store("main", "features", "label");
        tx.put(&store, 1u64.to_be_bytes().to_vec(), crate::core::common::serialization::serialize_value(&Value::String("a".to_string()))).unwrap();
        tx.commit().unwrap();

        let manager = IndexManager::new();
        manager.ensure_loaded(&cat, "main", "features", Default::default(), Default::default()).unwrap();
        (dir, cat, manager)
    }

    #[test]
    fn replaces_filtered_scan_with_index_scan_when_cheaper() {
        let (_dir, cat, indexes) = setup_with_index();
        let scan = PlanNode::leaf(
            1,
            Operator::EntityScan { schema: "main".to_string(), entity: "features".to_string(), columns: vec!["label".to_string()] },
            vec!["label".to_string()],
            Vec::new(),
        );
        let predicate = BooleanPredicate::Equals { column: "label".to_string(), value: Value::String("a".to_string()) };
        let filter = PlanNode::with_input(1, Operator::Filter { predicate }, scan, vec!["label".to_string()], Vec::new());

        let physical = enumerate_physical(&filter, &cat, &indexes, CostWeights::default(), SimdThresholds::default());
        assert!(matches!(physical.operator, Operator::IndexScan { .. }));
        assert!(physical.physical.is_some());
    }
}
