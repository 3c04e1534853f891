//! Persisted catalogue records.

use crate::core::common::types::ColumnDef;
use serde::{Deserialize, Serialize};

use super::statistics::IndexState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaEntry {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityEntry {
    pub schema: String,
    pub name: String,
    pub columns: Vec<ColumnDef>,
    pub indexes: Vec<String>,
}

impl EntityEntry {
    #[must_use]
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub schema: String,
    pub entity: String,
    pub name: String,
    pub index_type: String,
    pub columns: Vec<String>,
    pub params: serde_json::Value,
    pub state: IndexState,
}

impl IndexEntry {
    #[must_use]
    pub fn qualified_name(&self) -> String {
        format!("{}.{}.{}", self.schema, self.entity, self.name)
    }
}
