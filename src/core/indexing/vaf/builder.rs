//! VAF rebuild: per-dimension bounds, equidistant marks, and cell signatures.

use crate::core::common::types::{TupleId, Value};
use crate::core::common::OxidbError;

/// Per-dimension `[min, max]` from a brute-force scan of the column.
///
/// # Errors
/// Returns `TypeMismatch` if any value is not a `FloatVector` of `dimension`.
pub fn dimension_bounds(
    rows: &[(TupleId, Value)],
    dimension: usize,
) -> Result<Vec<(f32, f32)>, OxidbError> {
    let mut bounds = vec![(f32::INFINITY, f32::NEG_INFINITY); dimension];
    for (_, value) in rows {
        let vector = value.as_float_vector()?;
        if vector.len() != dimension {
            return Err(OxidbError::TypeMismatch(format!(
                "expected FloatVector({dimension}), found length {}",
                vector.len()
            )));
        }
        for (j, &component) in vector.iter().enumerate() {
            bounds[j].0 = bounds[j].0.min(component);
            bounds[j].1 = bounds[j].1.max(component);
        }
    }
    Ok(bounds)
}

/// `marksPerDim + 1` equidistant boundaries covering `[min, max]`.
#[must_use]
pub fn equidistant_marks(min: f32, max: f32, marks_per_dim: usize) -> Vec<f32> {
    let span = max - min;
    (0..=marks_per_dim)
        .map(|i| {
            if span <= 0.0 {
                min
            } else {
                min + (i as f32) * span / (marks_per_dim as f32)
            }
        })
        .collect()
}

/// The cell index of `value` within `boundaries`: the index of the first
/// boundary `>= value`, shifted left by one bucket and clamped to
/// `[0, marksPerDim - 1]`.
#[must_use]
pub fn cell_index(boundaries: &[f32], value: f32, marks_per_dim: usize) -> u32 {
    let first_ge = boundaries.iter().position(|&b| b >= value).unwrap_or(boundaries.len() - 1);
    first_ge.saturating_sub(1).min(marks_per_dim.saturating_sub(1)) as u32
}

/// Computes the fixed-length cell-index vector for one row's vector.
///
/// # Errors
/// Returns `TypeMismatch` if `value` is not a `FloatVector` of `dimension`.
pub fn signature_for(
    value: &Value,
    marks: &[Vec<f32>],
    marks_per_dim: usize,
) -> Result<Vec<u32>, OxidbError> {
    let vector = value.as_float_vector()?;
    Ok(vector
        .iter()
        .enumerate()
        .map(|(j, &component)| cell_index(&marks[j], component, marks_per_dim))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marks_cover_min_to_max() {
        let marks = equidistant_marks(0.0, 10.0, 5);
        assert_eq!(marks, vec![0.0, 2.0, 4.0, 6.0, 8.0, 10.0]);
    }

    #[test]
    fn cell_index_is_clamped_to_range() {
        let marks = equidistant_marks(0.0, 10.0, 5);
        assert_eq!(cell_index(&marks, -5.0, 5), 0);
        assert_eq!(cell_index(&marks, 10.0, 5), 4);
        assert_eq!(cell_index(&marks, 5.0, 5), 2);
    }
}
