//! The closed set of value types the engine understands.

use serde::{Deserialize, Serialize};

/// A scalar or vector type. Vector variants carry their dimensionality `d`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Boolean,
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
    Complex32,
    Complex64,
    Date,
    String,
    BooleanVector(u32),
    IntVector(u32),
    LongVector(u32),
    FloatVector(u32),
    DoubleVector(u32),
    Complex32Vector(u32),
    Complex64Vector(u32),
}

impl DataType {
    /// Element count: 1 for scalars, `d` for vectors.
    #[must_use]
    pub const fn logical_size(self) -> u32 {
        match self {
            Self::BooleanVector(d)
            | Self::IntVector(d)
            | Self::LongVector(d)
            | Self::FloatVector(d)
            | Self::DoubleVector(d)
            | Self::Complex32Vector(d)
            | Self::Complex64Vector(d) => d,
            _ => 1,
        }
    }

    /// Size in bytes of the type's compact on-disk representation.
    /// Strings are variable-length and length-prefixed, so they report 0.
    #[must_use]
    pub const fn physical_size(self) -> usize {
        match self {
            Self::Boolean | Self::Byte => 1,
            Self::Short => 2,
            Self::Int | Self::Float => 4,
            Self::Long | Self::Double | Self::Date => 8,
            Self::Complex32 => 8,
            Self::Complex64 => 16,
            Self::String => 0,
            Self::BooleanVector(d) => d as usize,
            Self::IntVector(d) | Self::FloatVector(d) => d as usize * 4,
            Self::LongVector(d) | Self::DoubleVector(d) => d as usize * 8,
            Self::Complex32Vector(d) => d as usize * 8,
            Self::Complex64Vector(d) => d as usize * 16,
        }
    }

    /// True for the seven vector variants.
    #[must_use]
    pub const fn is_vector(self) -> bool {
        matches!(
            self,
            Self::BooleanVector(_)
                | Self::IntVector(_)
                | Self::LongVector(_)
                | Self::FloatVector(_)
                | Self::DoubleVector(_)
                | Self::Complex32Vector(_)
                | Self::Complex64Vector(_)
        )
    }

    /// True for `Complex32`/`Complex64` and their vector forms.
    #[must_use]
    pub const fn is_complex(self) -> bool {
        matches!(
            self,
            Self::Complex32 | Self::Complex64 | Self::Complex32Vector(_) | Self::Complex64Vector(_)
        )
    }

    /// The scalar element type backing a vector type, if `self` is one.
    #[must_use]
    pub const fn element_type(self) -> Option<Self> {
        match self {
            Self::BooleanVector(_) => Some(Self::Boolean),
            Self::IntVector(_) => Some(Self::Int),
            Self::LongVector(_) => Some(Self::Long),
            Self::FloatVector(_) => Some(Self::Float),
            Self::DoubleVector(_) => Some(Self::Double),
            Self::Complex32Vector(_) => Some(Self::Complex32),
            Self::Complex64Vector(_) => Some(Self::Complex64),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_logical_size_is_one() {
        assert_eq!(DataType::Long.logical_size(), 1);
    }

    #[test]
    fn vector_logical_size_is_dimension() {
        assert_eq!(DataType::FloatVector(128).logical_size(), 128);
    }

    #[test]
    fn vector_physical_size_scales_with_dimension() {
        assert_eq!(DataType::DoubleVector(4).physical_size(), 32);
        assert_eq!(DataType::Complex64Vector(4).physical_size(), 64);
    }

    #[test]
    fn element_type_round_trips_for_vectors() {
        assert_eq!(DataType::FloatVector(8).element_type(), Some(DataType::Float));
        assert_eq!(DataType::Boolean.element_type(), None);
    }
}
