//! The transaction layer: per-column writes (`column`), per-entity writes
//! that fan out to every column and every live index (`entity`), and the
//! lock manager that serializes concurrent access to both.

pub mod column;
pub mod entity;
pub mod lock_manager;

pub use column::ColumnTransaction;
pub use entity::EntityTransaction;
pub use lock_manager::{LockManager, LockMode};
