//! Column definitions and the ordered column list owned by an entity.

use super::data_type::DataType;

/// An immutable column definition: `(name, type, nullable, primary)`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: DataType,
    pub is_nullable: bool,
    pub is_primary_key: bool,
}

impl ColumnDef {
    #[must_use]
    pub const fn new(name: String, data_type: DataType, is_nullable: bool, is_primary_key: bool) -> Self {
        Self { name, data_type, is_nullable, is_primary_key }
    }
}

/// The ordered set of columns an entity owns.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Schema {
    pub columns: Vec<ColumnDef>,
}

impl Schema {
    #[must_use]
    pub fn get_column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|col| col.name.eq_ignore_ascii_case(name))
    }

    #[must_use]
    pub fn get_column(&self, name: &str) -> Option<&ColumnDef> {
        self.get_column_index(name).map(|i| &self.columns[i])
    }
}
