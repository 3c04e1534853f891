//! The operator executor (spec §4.11): composable, single-input/single-output
//! streaming stages, turning a physical [`PlanNode`](crate::core::query::PlanNode)
//! into a pull-based stream of records. Grounded on the teacher's
//! `execution/operators/{table_scan,filter,project}.rs`: there, each operator
//! wraps a boxed upstream `ExecutionOperator` and exposes one `execute()` that
//! returns a boxed iterator. Here the same shape is expressed as free
//! functions over `Box<dyn Iterator<Item = Result<Record, OxidbError>>>`,
//! since most of this operator set (filter, sort, limit, projection) is a
//! pure stream transform with no state worth wrapping in a struct.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::core::catalogue::Catalogue;
use crate::core::common::types::{TupleId, Value};
use crate::core::common::OxidbError;
use crate::core::indexing::traits::{BooleanPredicate, DataChangeEvent, Predicate};
use crate::core::indexing::IndexManager;
use crate::core::query::plan::SortKey;
use crate::core::transaction::EntityTransaction;

pub type Record = Vec<(String, Value)>;
pub type RecordStream<'a> = Box<dyn Iterator<Item = Result<Record, OxidbError>> + 'a>;

fn column<'a>(record: &'a Record, name: &str) -> Option<&'a Value> {
    record.iter().find(|(n, _)| n.eq_ignore_ascii_case(name)).map(|(_, v)| v)
}

/// **FilterOperator**: evaluates a boolean predicate against each incoming
/// record; passes or drops.
///
/// # Errors
/// Surfaces the first predicate-evaluation error and aborts the stream.
pub fn evaluate_boolean(predicate: &BooleanPredicate, record: &Record) -> Result<bool, OxidbError> {
    match predicate {
        BooleanPredicate::Equals { column: name, value } => {
            Ok(column(record, name).is_some_and(|v| v == value))
        }
        BooleanPredicate::Less { column: name, value } => {
            Ok(column(record, name).is_some_and(|v| matches!(v.compare(value), Ok(Ordering::Less))))
        }
        BooleanPredicate::Greater { column: name, value } => {
            Ok(column(record, name).is_some_and(|v| matches!(v.compare(value), Ok(Ordering::Greater))))
        }
        BooleanPredicate::Like { column: name, pattern } => match column(record, name) {
            Some(Value::String(s)) => Ok(like_matches(s, pattern)),
            _ => Ok(false),
        },
        BooleanPredicate::And(a, b) => Ok(evaluate_boolean(a, record)? && evaluate_boolean(b, record)?),
        BooleanPredicate::Or(a, b) => Ok(evaluate_boolean(a, record)? || evaluate_boolean(b, record)?),
        BooleanPredicate::Not(inner) => Ok(!evaluate_boolean(inner, record)?),
    }
}

/// `%` matches any run of characters, `_` matches exactly one; no escaping.
fn like_matches(value: &str, pattern: &str) -> bool {
    fn go(value: &[u8], pattern: &[u8]) -> bool {
        match pattern.split_first() {
            None => value.is_empty(),
            Some((b'%', rest)) => (0..=value.len()).any(|i| go(&value[i..], rest)),
            Some((b'_', rest)) => !value.is_empty() && go(&value[1..], rest),
            Some((c, rest)) => value.first() == Some(c) && go(&value[1..], rest),
        }
    }
    go(value.as_bytes(), pattern.as_bytes())
}

pub fn filter<'a>(input: RecordStream<'a>, predicate: BooleanPredicate) -> RecordStream<'a> {
    Box::new(input.filter_map(move |record| match record {
        Ok(record) => match evaluate_boolean(&predicate, &record) {
            Ok(true) => Some(Ok(record)),
            Ok(false) => None,
            Err(e) => Some(Err(e)),
        },
        Err(e) => Some(Err(e)),
    }))
}

/// **FunctionProjectionOperator**: evaluates a function and augments the
/// record with its result under `output_column`. Only `distance` is
/// implemented today (spec's distance-augmented proximity results); any
/// other name is a `Query::UnsupportedPredicate`-shaped error surfaced as
/// `TypeMismatch` since it is a planning bug rather than a user predicate.
pub fn function_projection<'a>(
    input: RecordStream<'a>,
    function: String,
    args: Vec<String>,
    output_column: String,
) -> RecordStream<'a> {
    Box::new(input.map(move |record| {
        let mut record = record?;
        let value = match function.as_str() {
            "distance" => {
                let (Some(a), Some(b)) = (args.first(), args.get(1)) else {
                    return Err(OxidbError::TypeMismatch("distance requires two columns".to_string()));
                };
                let (Some(Value::FloatVector(lhs)), Some(Value::FloatVector(rhs))) =
                    (column(&record, a).cloned(), column(&record, b).cloned())
                else {
                    return Err(OxidbError::TypeMismatch("distance requires two float-vector columns".to_string()));
                };
                Value::Double(crate::core::vector::l2_squared_f64(
                    &lhs.iter().map(|f| f64::from(*f)).collect::<Vec<_>>(),
                    &rhs.iter().map(|f| f64::from(*f)).collect::<Vec<_>>(),
                ))
            }
            other => return Err(OxidbError::TypeMismatch(format!("unknown projection function {other}"))),
        };
        record.push((output_column.clone(), value));
        Ok(record)
    }))
}

fn sort_key_value(record: &Record, keys: &[SortKey]) -> Vec<Option<Value>> {
    keys.iter().map(|k| column(record, &k.column).cloned()).collect()
}

fn compare_by_keys(a: &[Option<Value>], b: &[Option<Value>], keys: &[SortKey]) -> Ordering {
    for ((av, bv), key) in a.iter().zip(b.iter()).zip(keys.iter()) {
        let ord = match (av, bv) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(a), Some(b)) => a.compare(b).unwrap_or(Ordering::Equal),
        };
        let ord = if key.ascending { ord } else { ord.reverse() };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

struct HeapEntry {
    keys: Vec<Option<Value>>,
    sort_keys: Vec<SortKey>,
    record: Record,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        compare_by_keys(&self.keys, &other.keys, &self.sort_keys) == Ordering::Equal
    }
}
impl Eq for HeapEntry {}
impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // A max-heap keyed on the *reverse* of the requested order keeps the
        // worst-of-the-best-k at the top, so it is the one evicted.
        compare_by_keys(&self.keys, &other.keys, &self.sort_keys).reverse()
    }
}

/// **HeapSortOperator**: bounded top-k heap sort by one or more
/// `(column, order)` keys; nulls ordered last regardless of direction.
///
/// # Errors
/// Propagates the first upstream error.
pub fn heap_sort(input: RecordStream<'_>, keys: Vec<SortKey>, limit: usize) -> Result<Vec<Record>, OxidbError> {
    let mut heap: BinaryHeap<HeapEntry> = BinaryHeap::with_capacity(limit.saturating_add(1));
    for record in input {
        let record = record?;
        let entry = HeapEntry { keys: sort_key_value(&record, &keys), sort_keys: keys.clone(), record };
        heap.push(entry);
        if heap.len() > limit {
            heap.pop();
        }
    }
    let mut sorted: Vec<HeapEntry> = heap.into_sorted_vec();
    sorted.reverse();
    Ok(sorted.into_iter().map(|e| e.record).collect())
}

/// **MergeLimitingHeapSortOperator**: merges several already `limit`-bounded,
/// sorted sub-streams (one per partition) back into one globally-sorted,
/// `limit`-bounded stream.
///
/// # Errors
/// Propagates the first error from any partition's stream.
pub fn merge_limiting_heap_sort(
    partitions: Vec<Vec<Record>>,
    keys: Vec<SortKey>,
    limit: usize,
) -> Result<Vec<Record>, OxidbError> {
    let merged = partitions.into_iter().flatten();
    heap_sort(Box::new(merged.map(Ok)), keys, limit)
}

/// **LimitOperator**.
pub fn limit<'a>(input: RecordStream<'a>, count: usize) -> RecordStream<'a> {
    Box::new(input.take(count))
}

/// **SkipOperator**.
pub fn skip<'a>(input: RecordStream<'a>, count: usize) -> RecordStream<'a> {
    Box::new(input.skip(count))
}

/// **CountProjectionOperator**: collapses the stream to a single record
/// holding the row count under `count`.
///
/// # Errors
/// Propagates the first upstream error.
pub fn count_projection(input: RecordStream<'_>) -> Result<Record, OxidbError> {
    let mut total: i64 = 0;
    for record in input {
        record?;
        total += 1;
    }
    Ok(vec![("count".to_string(), Value::Long(total))])
}

/// **SelectProjectionOperator**: narrows each record to the requested
/// columns, in the requested order.
pub fn select_projection<'a>(input: RecordStream<'a>, columns: Vec<String>) -> RecordStream<'a> {
    Box::new(input.map(move |record| {
        let record = record?;
        Ok(columns
            .iter()
            .map(|name| (name.clone(), column(&record, name).cloned().unwrap_or(Value::Null)))
            .collect())
    }))
}

/// **SelectDistinctProjectionOperator**: as [`select_projection`], then drops
/// rows whose projected values repeat an earlier row's. Order-preserving;
/// materializes only the distinct keys seen so far, not the whole stream.
///
/// # Errors
/// Propagates the first upstream error.
pub fn select_distinct_projection<'a>(input: RecordStream<'a>, columns: Vec<String>) -> RecordStream<'a> {
    let mut seen: std::collections::HashSet<String> = std::collections::HashSet::new();
    let projected = select_projection(input, columns);
    Box::new(projected.filter_map(move |record| match record {
        Ok(record) => {
            let fingerprint = format!("{record:?}");
            seen.insert(fingerprint).then_some(Ok(record))
        }
        Err(e) => Some(Err(e)),
    }))
}

/// **EntityScanOperator**: all tuples with the requested columns, ordered
/// ascending by `TupleId` (the entity's composite cursor order).
///
/// # Errors
/// Propagates a catalogue/storage error.
pub fn entity_scan(tx: &EntityTransaction<'_>, columns: &[String]) -> Result<Vec<Record>, OxidbError> {
    Ok(tx.cursor(columns, 0, 1)?.into_iter().map(|(_, record)| record).collect())
}

/// **RangedEntityScanOperator**: as [`entity_scan`], restricted to one
/// partition of the entity's `TupleId` range.
///
/// # Errors
/// Propagates a catalogue/storage error.
pub fn ranged_entity_scan(
    tx: &EntityTransaction<'_>,
    columns: &[String],
    partition_index: usize,
    partitions: usize,
) -> Result<Vec<Record>, OxidbError> {
    Ok(tx.cursor(columns, partition_index, partitions)?.into_iter().map(|(_, record)| record).collect())
}

/// **IndexScanOperator**: delegates to the named index's `filter`,
/// preserving whatever order the index guarantees (distance-ascending for
/// proximity indexes), then fetches the requested columns for each hit.
///
/// # Errors
/// Returns `IndexMissing` if `index` is not currently loaded, or propagates
/// a storage error while fetching columns.
pub fn index_scan(
    indexes: &IndexManager,
    tx: &EntityTransaction<'_>,
    schema: &str,
    entity: &str,
    index: &str,
    predicate: &Predicate,
    columns: &[String],
) -> Result<Vec<Record>, OxidbError> {
    let hits = indexes.filter(schema, entity, index, predicate)?;
    hits.into_iter()
        .map(|hit| {
            let mut record = tx.read(hit.tuple_id, columns)?;
            record.extend(hit.computed);
            Ok(record)
        })
        .collect()
}

/// **EntitySampleOperator**: the first `size` tuples in ascending-`TupleId`
/// order. A true random sample is future work; deterministic head-sampling
/// is what the engine ships today.
///
/// # Errors
/// Propagates a catalogue/storage error.
pub fn entity_sample(tx: &EntityTransaction<'_>, columns: &[String], size: usize) -> Result<Vec<Record>, OxidbError> {
    Ok(entity_scan(tx, columns)?.into_iter().take(size).collect())
}

/// **EntityCountOperator**.
///
/// # Errors
/// Propagates a catalogue/storage error.
pub fn entity_count(catalogue: &Catalogue, schema: &str, entity: &str) -> Result<Record, OxidbError> {
    let entry = catalogue
        .get_entity(schema, entity)
        .ok_or_else(|| OxidbError::EntityMissing(format!("warren.{schema}.{entity}")))?;
    let count = entry
        .columns
        .first()
        .map(|col| catalogue.get_statistics(schema, entity, &col.name).map(|s| s.count).unwrap_or(0))
        .unwrap_or(0);
    #[allow(clippy::cast_possible_wrap)]
    Ok(vec![("count".to_string(), Value::Long(count as i64))])
}

/// **InsertOperator**: inserts one row, returns the allocated `TupleId` as
/// a status record.
///
/// # Errors
/// Propagates a validation or storage error.
pub fn insert(tx: &mut EntityTransaction<'_>, values: Record) -> Result<Record, OxidbError> {
    let tuple_id = tx.insert(values)?;
    #[allow(clippy::cast_possible_wrap)]
    Ok(vec![("tupleId".to_string(), Value::Long(tuple_id.0 as i64))])
}

/// **UpdateOperator**.
///
/// # Errors
/// Propagates a validation or storage error.
pub fn update(tx: &mut EntityTransaction<'_>, tuple_id: TupleId, values: Record) -> Result<Record, OxidbError> {
    tx.update(tuple_id, values)?;
    Ok(vec![("status".to_string(), Value::String("updated".to_string()))])
}

/// **DeleteOperator**.
///
/// # Errors
/// Propagates a storage error.
pub fn delete(tx: &mut EntityTransaction<'_>, tuple_id: TupleId) -> Result<Record, OxidbError> {
    tx.delete(tuple_id)?;
    Ok(vec![("status".to_string(), Value::String("deleted".to_string()))])
}

/// **CreateIndexOperator**.
///
/// # Errors
/// Propagates a catalogue error (e.g. `IndexExists`).
#[allow(clippy::too_many_arguments)]
pub fn create_index(
    catalogue: &Catalogue,
    schema: &str,
    entity: &str,
    name: &str,
    index_type: &str,
    columns: Vec<String>,
    duplicate_mode: crate::core::storage::engine::store::DuplicateMode,
) -> Result<Record, OxidbError> {
    catalogue.create_index(schema, entity, name, index_type, columns, serde_json::Value::Null, duplicate_mode)?;
    Ok(vec![("status".to_string(), Value::String("created".to_string()))])
}

/// **TruncateEntityOperator**: deletes every row (publishing a `Delete`
/// event per row so loaded indexes stay in sync) without dropping the
/// entity or its columns.
///
/// # Errors
/// Propagates a storage error.
pub fn truncate_entity(tx: &mut EntityTransaction<'_>, columns: &[String]) -> Result<Record, OxidbError> {
    let rows = tx.cursor(columns, 0, 1)?;
    let deleted = rows.len();
    for (tuple_id, _) in rows {
        tx.delete(tuple_id)?;
    }
    #[allow(clippy::cast_possible_wrap)]
    Ok(vec![("deleted".to_string(), Value::Long(deleted as i64))])
}

/// Re-publishes an already-applied event; exists so tests and the planner
/// share one entry point for the "a write changed this entity" notification
/// without re-deriving it from `insert`/`update`/`delete`'s own publishing.
pub fn notify(
    indexes: &IndexManager,
    catalogue: &Catalogue,
    schema: &str,
    entity: &str,
    event: &DataChangeEvent,
) -> Result<(), OxidbError> {
    indexes.publish(catalogue, schema, entity, event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::common::types::{ColumnDef, DataType};
    use crate::core::transaction::LockManager;
    use tempfile::tempdir;

    fn setup() -> (tempfile::TempDir, Catalogue, IndexManager, LockManager) {
        let dir = tempdir().unwrap();
        let cat = Catalogue::open(dir.path()).unwrap();
        cat.create_schema("main").unwrap();
        cat.create_entity(
            "main",
            "features",
            vec![
                ColumnDef::new("id".to_string(), DataType::Long, false, true),
                ColumnDef::new("label".to_string(), DataType::String, true, false),
            ],
        )
        .unwrap();
        (dir, cat, IndexManager::new(), LockManager::new())
    }

    #[test]
    fn filter_keeps_matching_rows_only() {
        let (_dir, cat, indexes, locks) = setup();
        let mut tx = EntityTransaction::begin(&cat, &indexes, &locks, "main", "features").unwrap();
        tx.insert(vec![("id".to_string(), Value::Long(1)), ("label".to_string(), Value::String("a".to_string()))]).unwrap();
        tx.insert(vec![("id".to_string(), Value::Long(2)), ("label".to_string(), Value::String("b".to_string()))]).unwrap();
        let rows = entity_scan(&tx, &["id".to_string(), "label".to_string()]).unwrap();
        let predicate = BooleanPredicate::Equals { column: "label".to_string(), value: Value::String("a".to_string()) };
        let filtered: Vec<Record> = filter(Box::new(rows.into_iter().map(Ok)), predicate).collect::<Result<_, _>>().unwrap();
        assert_eq!(filtered.len(), 1);
        tx.commit().unwrap();
    }

    #[test]
    fn heap_sort_orders_ascending_and_bounds_to_limit() {
        let records: Vec<Record> =
            vec![3, 1, 2].into_iter().map(|n| vec![("n".to_string(), Value::Long(n))]).collect();
        let sorted = heap_sort(
            Box::new(records.into_iter().map(Ok)),
            vec![SortKey { column: "n".to_string(), ascending: true }],
            2,
        )
        .unwrap();
        let values: Vec<i64> = sorted.iter().map(|r| match &r[0].1 { Value::Long(n) => *n, _ => unreachable!() }).collect();
        assert_eq!(values, vec![1, 2]);
    }

    #[test]
    fn heap_sort_orders_nulls_last() {
        let records: Vec<Record> = vec![
            vec![("n".to_string(), Value::Null)],
            vec![("n".to_string(), Value::Long(5))],
        ];
        let sorted = heap_sort(
            Box::new(records.into_iter().map(Ok)),
            vec![SortKey { column: "n".to_string(), ascending: true }],
            2,
        )
        .unwrap();
        assert_eq!(sorted[0][0].1, Value::Long(5));
        assert_eq!(sorted[1][0].1, Value::Null);
    }

    #[test]
    fn select_distinct_projection_drops_repeats() {
        let records: Vec<Record> = vec![
            vec![("label".to_string(), Value::String("a".to_string()))],
            vec![("label".to_string(), Value::String("a".to_string()))],
            vec![("label".to_string(), Value::String("b".to_string()))],
        ];
        let distinct: Vec<Record> =
            select_distinct_projection(Box::new(records.into_iter().map(Ok)), vec!["label".to_string()])
                .collect::<Result<_, _>>()
                .unwrap();
        assert_eq!(distinct.len(), 2);
    }

    #[test]
    fn insert_then_count_reflects_the_new_row() {
        let (_dir, cat, indexes, locks) = setup();
        let mut tx = EntityTransaction::begin(&cat, &indexes, &locks, "main", "features").unwrap();
        insert(&mut tx, vec![("id".to_string(), Value::Long(1))]).unwrap();
        tx.commit().unwrap();
        let count = entity_count(&cat, "main", "features").unwrap();
        assert_eq!(count[0].1, Value::Long(1));
    }

    #[test]
    fn truncate_entity_removes_every_row() {
        let (_dir, cat, indexes, locks) = setup();
        let mut tx = EntityTransaction::begin(&cat, &indexes, &locks, "main", "features").unwrap();
        tx.insert(vec![("id".to_string(), Value::Long(1))]).unwrap();
        tx.insert(vec![("id".to_string(), Value::Long(2))]).unwrap();
        let result = truncate_entity(&mut tx, &["id".to_string()]).unwrap();
        assert_eq!(result[0].1, Value::Long(2));
        assert!(entity_scan(&tx, &["id".to_string()]).unwrap().is_empty());
        tx.commit().unwrap();
    }
}
