//! Typed scalar and vector values.

use super::data_type::DataType;
use crate::core::common::OxidbError;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// A complex number backed by two `f32`s (real, imaginary).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Complex32 {
    pub re: f32,
    pub im: f32,
}

/// A complex number backed by two `f64`s (real, imaginary).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Complex64 {
    pub re: f64,
    pub im: f64,
}

/// An instance of one of the engine's closed set of types.
///
/// Vector variants carry a contiguous backing array; complex vectors carry
/// one `Complex32`/`Complex64` per element (interleaved real/imag on disk).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Boolean(bool),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Complex32(Complex32),
    Complex64(Complex64),
    Date(i64),
    String(String),
    BooleanVector(Vec<bool>),
    IntVector(Vec<i32>),
    LongVector(Vec<i64>),
    FloatVector(Vec<f32>),
    DoubleVector(Vec<f64>),
    Complex32Vector(Vec<Complex32>),
    Complex64Vector(Vec<Complex64>),
    Null,
}

impl Value {
    #[must_use]
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Self::Boolean(_) => Some(DataType::Boolean),
            Self::Byte(_) => Some(DataType::Byte),
            Self::Short(_) => Some(DataType::Short),
            Self::Int(_) => Some(DataType::Int),
            Self::Long(_) => Some(DataType::Long),
            Self::Float(_) => Some(DataType::Float),
            Self::Double(_) => Some(DataType::Double),
            Self::Complex32(_) => Some(DataType::Complex32),
            Self::Complex64(_) => Some(DataType::Complex64),
            Self::Date(_) => Some(DataType::Date),
            Self::String(_) => Some(DataType::String),
            Self::BooleanVector(v) => Some(DataType::BooleanVector(v.len() as u32)),
            Self::IntVector(v) => Some(DataType::IntVector(v.len() as u32)),
            Self::LongVector(v) => Some(DataType::LongVector(v.len() as u32)),
            Self::FloatVector(v) => Some(DataType::FloatVector(v.len() as u32)),
            Self::DoubleVector(v) => Some(DataType::DoubleVector(v.len() as u32)),
            Self::Complex32Vector(v) => Some(DataType::Complex32Vector(v.len() as u32)),
            Self::Complex64Vector(v) => Some(DataType::Complex64Vector(v.len() as u32)),
            Self::Null => None,
        }
    }

    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Unwraps a `FloatVector`, the shape used by the VAF/PQ indexes.
    ///
    /// # Errors
    /// Returns `TypeMismatch` if `self` is not a `FloatVector`.
    pub fn as_float_vector(&self) -> Result<&[f32], OxidbError> {
        match self {
            Self::FloatVector(v) => Ok(v),
            other => Err(OxidbError::TypeMismatch(format!(
                "expected FloatVector, found {other:?}"
            ))),
        }
    }

    /// Total ordering within a type; cross-type comparison is a `TypeMismatch`.
    ///
    /// # Errors
    /// Returns `TypeMismatch` if `self` and `other` are different, non-null
    /// variants, or if the variant has no total order (vectors, complex).
    pub fn compare(&self, other: &Self) -> Result<std::cmp::Ordering, OxidbError> {
        match (self, other) {
            (Self::Boolean(a), Self::Boolean(b)) => Ok(a.cmp(b)),
            (Self::Byte(a), Self::Byte(b)) => Ok(a.cmp(b)),
            (Self::Short(a), Self::Short(b)) => Ok(a.cmp(b)),
            (Self::Int(a), Self::Int(b)) => Ok(a.cmp(b)),
            (Self::Long(a), Self::Long(b)) => Ok(a.cmp(b)),
            (Self::Date(a), Self::Date(b)) => Ok(a.cmp(b)),
            (Self::String(a), Self::String(b)) => Ok(a.cmp(b)),
            (Self::Float(a), Self::Float(b)) => a
                .partial_cmp(b)
                .ok_or_else(|| OxidbError::TypeMismatch("NaN is unordered".to_string())),
            (Self::Double(a), Self::Double(b)) => a
                .partial_cmp(b)
                .ok_or_else(|| OxidbError::TypeMismatch("NaN is unordered".to_string())),
            _ => Err(OxidbError::TypeMismatch(format!(
                "cannot order {self:?} against {other:?}"
            ))),
        }
    }

    /// Generates a random value of the given type, used by tests and by the
    /// PQ/VAF index benches for synthetic data.
    pub fn random(data_type: DataType, rng: &mut impl Rng) -> Self {
        match data_type {
            DataType::Boolean => Self::Boolean(rng.gen()),
            DataType::Byte => Self::Byte(rng.gen()),
            DataType::Short => Self::Short(rng.gen()),
            DataType::Int => Self::Int(rng.gen()),
            DataType::Long => Self::Long(rng.gen()),
            DataType::Float => Self::Float(rng.gen_range(-1.0..1.0)),
            DataType::Double => Self::Double(rng.gen_range(-1.0..1.0)),
            DataType::Complex32 => Self::Complex32(Complex32 {
                re: rng.gen_range(-1.0..1.0),
                im: rng.gen_range(-1.0..1.0),
            }),
            DataType::Complex64 => Self::Complex64(Complex64 {
                re: rng.gen_range(-1.0..1.0),
                im: rng.gen_range(-1.0..1.0),
            }),
            DataType::Date => Self::Date(rng.gen_range(0..1_000_000_000)),
            DataType::String => Self::String(format!("s{}", rng.gen::<u32>())),
            DataType::BooleanVector(d) => {
                Self::BooleanVector((0..d).map(|_| rng.gen()).collect())
            }
            DataType::IntVector(d) => Self::IntVector((0..d).map(|_| rng.gen()).collect()),
            DataType::LongVector(d) => Self::LongVector((0..d).map(|_| rng.gen()).collect()),
            DataType::FloatVector(d) => {
                Self::FloatVector((0..d).map(|_| rng.gen_range(-1.0..1.0)).collect())
            }
            DataType::DoubleVector(d) => {
                Self::DoubleVector((0..d).map(|_| rng.gen_range(-1.0..1.0)).collect())
            }
            DataType::Complex32Vector(d) => Self::Complex32Vector(
                (0..d)
                    .map(|_| Complex32 { re: rng.gen_range(-1.0..1.0), im: rng.gen_range(-1.0..1.0) })
                    .collect(),
            ),
            DataType::Complex64Vector(d) => Self::Complex64Vector(
                (0..d)
                    .map(|_| Complex64 { re: rng.gen_range(-1.0..1.0), im: rng.gen_range(-1.0..1.0) })
                    .collect(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn data_type_reports_vector_dimension() {
        let v = Value::FloatVector(vec![1.0, 2.0, 3.0]);
        assert_eq!(v.data_type(), Some(DataType::FloatVector(3)));
    }

    #[test]
    fn cross_type_comparison_is_type_mismatch() {
        let a = Value::Int(1);
        let b = Value::String("1".to_string());
        assert!(matches!(a.compare(&b), Err(OxidbError::TypeMismatch(_))));
    }

    #[test]
    fn random_generates_requested_dimension() {
        let mut rng = StdRng::seed_from_u64(7);
        let v = Value::random(DataType::DoubleVector(16), &mut rng);
        assert_eq!(v.data_type(), Some(DataType::DoubleVector(16)));
    }
}
