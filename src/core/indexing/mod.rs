//! The index framework: the abstract `Index` contract plus the three
//! concrete index types (hash, VAF, PQ) and the read-only column accessor
//! they all rebuild from.

pub mod column_source;
pub mod hash;
pub mod manager;
pub mod pq;
pub mod traits;
pub mod vaf;

pub use column_source::ColumnSource;
pub use hash::HashIndex;
pub use manager::IndexManager;
pub use pq::PqIndex;
pub use traits::{
    BooleanPredicate, DataChangeEvent, Index, IndexCost, IndexRecord, Predicate, ProximityPredicate,
};
pub use vaf::VafIndex;
