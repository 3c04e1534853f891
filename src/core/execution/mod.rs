//! The operator executor: turns a physical plan into a pull-based stream of
//! records over one entity transaction.

pub mod operators;

pub use operators::{Record, RecordStream};
