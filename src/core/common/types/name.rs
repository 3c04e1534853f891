//! Structured, hierarchical object names.
//!
//! A `Name` always carries the engine's fixed root token plus a `NameKind`
//! and an ordered list of components (schema, then entity, then column or
//! index). Component comparison is case-insensitive, matching the
//! catalogue's lookup semantics.

use std::fmt;

/// Root token shared by every name in the engine.
pub const ROOT: &str = "warren";

/// The kind of catalogue object a `Name` refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NameKind {
    Schema,
    Entity,
    Column,
    Index,
    Function,
}

/// A hierarchical, case-insensitive identifier.
#[derive(Debug, Clone)]
pub struct Name {
    root: &'static str,
    kind: NameKind,
    components: Vec<String>,
}

impl Name {
    fn new(kind: NameKind, components: Vec<String>) -> Self {
        Self { root: ROOT, kind, components }
    }

    pub fn schema(schema: impl Into<String>) -> Self {
        Self::new(NameKind::Schema, vec![schema.into()])
    }

    pub fn entity(schema: impl Into<String>, entity: impl Into<String>) -> Self {
        Self::new(NameKind::Entity, vec![schema.into(), entity.into()])
    }

    pub fn column(
        schema: impl Into<String>,
        entity: impl Into<String>,
        column: impl Into<String>,
    ) -> Self {
        Self::new(NameKind::Column, vec![schema.into(), entity.into(), column.into()])
    }

    pub fn index(
        schema: impl Into<String>,
        entity: impl Into<String>,
        index: impl Into<String>,
    ) -> Self {
        Self::new(NameKind::Index, vec![schema.into(), entity.into(), index.into()])
    }

    #[must_use]
    pub fn kind(&self) -> NameKind {
        self.kind
    }

    #[must_use]
    pub fn components(&self) -> &[String] {
        &self.components
    }

    #[must_use]
    pub fn root(&self) -> &str {
        self.root
    }

    /// True if this name's last component matches `candidate`, honoring a
    /// trailing `*` wildcard on the component (used by bulk column drops
    /// and by index column-set matching).
    #[must_use]
    pub fn matches_last(&self, candidate: &str) -> bool {
        let Some(last) = self.components.last() else { return false };
        if let Some(prefix) = last.strip_suffix('*') {
            candidate.to_ascii_lowercase().starts_with(&prefix.to_ascii_lowercase())
        } else {
            last.eq_ignore_ascii_case(candidate)
        }
    }
}

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.components.len() == other.components.len()
            && self
                .components
                .iter()
                .zip(other.components.iter())
                .all(|(a, b)| a.eq_ignore_ascii_case(b))
    }
}

impl Eq for Name {}

impl std::hash::Hash for Name {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
        for c in &self.components {
            c.to_ascii_lowercase().hash(state);
        }
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.root, self.components.join("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_is_case_insensitive() {
        let a = Name::entity("Main", "Features");
        let b = Name::entity("main", "features");
        assert_eq!(a, b);
    }

    #[test]
    fn wildcard_column_matches_prefix() {
        let n = Name::column("main", "features", "embed_*");
        assert!(n.matches_last("embed_vec"));
        assert!(!n.matches_last("label"));
    }

    #[test]
    fn display_includes_root() {
        let n = Name::schema("main");
        assert_eq!(n.to_string(), "warren.main");
    }
}
