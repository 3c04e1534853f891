//! Vector distance kernels shared by the VAF and PQ indexes.

pub mod distance;

pub use distance::{l2_squared_f64, DistanceKind};
