//! A record tuple: an ordered list of column values.

use super::ids::TupleId;
use super::value::Value;

/// One row as returned by a column/entity read, tagged with its `TupleId`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Row {
    pub tuple_id: TupleId,
    pub values: Vec<Value>,
}

impl Row {
    #[must_use]
    pub const fn new(tuple_id: TupleId, values: Vec<Value>) -> Self {
        Self { tuple_id, values }
    }
}
