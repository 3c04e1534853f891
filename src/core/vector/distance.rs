//! Scalar and vectorized distance kernels used by the VAF and PQ indexes.
//!
//! Each kernel is implemented once over `f32` (the engine's native vector
//! element type) and once over `f64` (used by PQ codebook training, which
//! runs in double precision). `DistanceKind::compute` dispatches the
//! straightforward scalar form; `DistanceKind::compute_vectorized` dispatches
//! a `chunks_exact`-unrolled form of the same kernel over 8-wide lanes, which
//! the optimizer's SIMD cost rewrite assumes is in use once a vector crosses
//! `SimdThresholds`. Both forms must agree within floating-point tolerance —
//! the lane accumulation only changes summation order, not the result.

use crate::core::common::OxidbError;

const LANES: usize = 8;

/// The distance kinds a `ProximityPredicate` may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DistanceKind {
    L1,
    L2,
    L2Squared,
    Cosine,
    InnerProduct,
    ChiSquared,
    Hamming,
    Haversine,
}

impl DistanceKind {
    /// True if smaller values mean "closer" (all kinds here except
    /// `InnerProduct`/`Cosine`, which rank by larger-is-closer similarity
    /// and are negated by callers that need a distance ordering).
    #[must_use]
    pub const fn lower_is_closer(self) -> bool {
        !matches!(self, Self::InnerProduct | Self::Cosine)
    }

    /// Computes the distance between `a` and `b`.
    ///
    /// # Errors
    /// Returns `TypeMismatch` if the slices have different lengths, or if
    /// `Haversine` is requested on a vector whose length is not 2.
    pub fn compute(self, a: &[f32], b: &[f32]) -> Result<f32, OxidbError> {
        require_same_len(a, b)?;
        Ok(match self {
            Self::L1 => l1(a, b),
            Self::L2 => l2_squared(a, b).sqrt(),
            Self::L2Squared => l2_squared(a, b),
            Self::Cosine => cosine(a, b)?,
            Self::InnerProduct => inner_product(a, b),
            Self::ChiSquared => chi_squared(a, b),
            Self::Hamming => hamming(a, b),
            Self::Haversine => {
                if a.len() != 2 {
                    return Err(OxidbError::TypeMismatch(
                        "haversine distance requires 2-dimensional (lat, lon) vectors".to_string(),
                    ));
                }
                haversine(a[0], a[1], b[0], b[1])
            }
        })
    }

    /// Vectorized counterpart of [`Self::compute`], operating on `LANES`-wide
    /// chunks so the compiler can pack the inner loop into SIMD instructions.
    /// Kinds with no chunked form (`Haversine`, always 2-dimensional) fall
    /// back to the scalar kernel.
    ///
    /// # Errors
    /// Same as [`Self::compute`].
    pub fn compute_vectorized(self, a: &[f32], b: &[f32]) -> Result<f32, OxidbError> {
        require_same_len(a, b)?;
        Ok(match self {
            Self::L1 => l1_vectorized(a, b),
            Self::L2 => l2_squared_vectorized(a, b).sqrt(),
            Self::L2Squared => l2_squared_vectorized(a, b),
            Self::Cosine => cosine_vectorized(a, b)?,
            Self::InnerProduct => inner_product_vectorized(a, b),
            Self::ChiSquared => chi_squared_vectorized(a, b),
            Self::Hamming => hamming_vectorized(a, b),
            Self::Haversine => {
                if a.len() != 2 {
                    return Err(OxidbError::TypeMismatch(
                        "haversine distance requires 2-dimensional (lat, lon) vectors".to_string(),
                    ));
                }
                haversine(a[0], a[1], b[0], b[1])
            }
        })
    }
}

/// Sums `f(x, y)` over `a`/`b` in `LANES`-wide chunks, accumulating each lane
/// independently before folding the lanes together. Any tail shorter than
/// `LANES` is folded in with the scalar form.
fn sum_lanes(a: &[f32], b: &[f32], f: impl Fn(f32, f32) -> f32) -> f32 {
    let mut acc = [0f32; LANES];
    let a_chunks = a.chunks_exact(LANES);
    let b_chunks = b.chunks_exact(LANES);
    let a_rem = a_chunks.remainder();
    let b_rem = b_chunks.remainder();
    for (ca, cb) in a_chunks.zip(b_chunks) {
        for lane in 0..LANES {
            acc[lane] += f(ca[lane], cb[lane]);
        }
    }
    let mut total: f32 = acc.iter().sum();
    for (x, y) in a_rem.iter().zip(b_rem) {
        total += f(*x, *y);
    }
    total
}

fn require_same_len(a: &[f32], b: &[f32]) -> Result<(), OxidbError> {
    if a.len() != b.len() {
        return Err(OxidbError::TypeMismatch(format!(
            "vector dimension mismatch: {} vs {}",
            a.len(),
            b.len()
        )));
    }
    Ok(())
}

#[must_use]
pub fn l1(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum()
}

#[must_use]
pub fn l2_squared(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

#[must_use]
pub fn l2(a: &[f32], b: &[f32]) -> f32 {
    l2_squared(a, b).sqrt()
}

#[must_use]
pub fn inner_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn cosine(a: &[f32], b: &[f32]) -> Result<f32, OxidbError> {
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        return Err(OxidbError::TypeMismatch("cosine distance undefined for zero vector".to_string()));
    }
    Ok(1.0 - inner_product(a, b) / (na * nb))
}

#[must_use]
pub fn chi_squared(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let denom = x + y;
            if denom.abs() < f32::EPSILON {
                0.0
            } else {
                (x - y) * (x - y) / denom
            }
        })
        .sum()
}

#[must_use]
pub fn hamming(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).filter(|(x, y)| (*x - *y).abs() > f32::EPSILON).count() as f32
}

#[must_use]
pub fn l1_vectorized(a: &[f32], b: &[f32]) -> f32 {
    sum_lanes(a, b, |x, y| (x - y).abs())
}

#[must_use]
pub fn l2_squared_vectorized(a: &[f32], b: &[f32]) -> f32 {
    sum_lanes(a, b, |x, y| (x - y) * (x - y))
}

#[must_use]
pub fn inner_product_vectorized(a: &[f32], b: &[f32]) -> f32 {
    sum_lanes(a, b, |x, y| x * y)
}

fn cosine_vectorized(a: &[f32], b: &[f32]) -> Result<f32, OxidbError> {
    let na = sum_lanes(a, a, |x, _| x * x).sqrt();
    let nb = sum_lanes(b, b, |x, _| x * x).sqrt();
    if na == 0.0 || nb == 0.0 {
        return Err(OxidbError::TypeMismatch("cosine distance undefined for zero vector".to_string()));
    }
    Ok(1.0 - inner_product_vectorized(a, b) / (na * nb))
}

#[must_use]
pub fn chi_squared_vectorized(a: &[f32], b: &[f32]) -> f32 {
    sum_lanes(a, b, |x, y| {
        let denom = x + y;
        if denom.abs() < f32::EPSILON {
            0.0
        } else {
            (x - y) * (x - y) / denom
        }
    })
}

#[must_use]
pub fn hamming_vectorized(a: &[f32], b: &[f32]) -> f32 {
    sum_lanes(a, b, |x, y| if (x - y).abs() > f32::EPSILON { 1.0 } else { 0.0 })
}

const EARTH_RADIUS_KM: f32 = 6371.0;

#[must_use]
pub fn haversine(lat1: f32, lon1: f32, lat2: f32, lon2: f32) -> f32 {
    let (lat1, lon1, lat2, lon2) =
        (lat1.to_radians(), lon1.to_radians(), lat2.to_radians(), lon2.to_radians());
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

/// Double-precision L2² used by PQ's k-means++ training and Mahalanobis-style
/// per-sub-space covariance scoring.
#[must_use]
pub fn l2_squared_f64(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn l1_distance_of_identical_vectors_is_zero() {
        let v = [1.0, 2.0, 3.0];
        assert_relative_eq!(l1(&v, &v), 0.0, epsilon = 1e-6);
    }

    #[test]
    fn l2_matches_known_3_4_5_triangle() {
        let a = [0.0, 0.0];
        let b = [3.0, 4.0];
        assert_relative_eq!(l2(&a, &b), 5.0, epsilon = 1e-6);
    }

    #[test]
    fn l2_squared_is_l2_squared() {
        let a = [0.0, 0.0];
        let b = [3.0, 4.0];
        assert_relative_eq!(l2_squared(&a, &b), 25.0, epsilon = 1e-6);
    }

    #[test]
    fn cosine_distance_of_orthogonal_vectors_is_one() {
        let a = [1.0, 0.0];
        let b = [0.0, 1.0];
        assert_relative_eq!(DistanceKind::Cosine.compute(&a, &b).unwrap(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn dimension_mismatch_is_type_mismatch() {
        let a = [1.0, 2.0];
        let b = [1.0, 2.0, 3.0];
        assert!(matches!(DistanceKind::L2.compute(&a, &b), Err(OxidbError::TypeMismatch(_))));
    }

    #[test]
    fn haversine_same_point_is_zero() {
        let a = [40.0, -73.0];
        assert_relative_eq!(DistanceKind::Haversine.compute(&a, &a).unwrap(), 0.0, epsilon = 1e-3);
    }

    #[test]
    fn scalar_and_vectorized_kernels_agree_within_tolerance() {
        let a: Vec<f32> = (0..37).map(|i| (i as f32) * 0.37 - 4.0).collect();
        let b: Vec<f32> = (0..37).map(|i| (i as f32) * -0.19 + 2.5).collect();
        for kind in [
            DistanceKind::L1,
            DistanceKind::L2,
            DistanceKind::L2Squared,
            DistanceKind::Cosine,
            DistanceKind::InnerProduct,
            DistanceKind::ChiSquared,
            DistanceKind::Hamming,
        ] {
            let scalar = kind.compute(&a, &b).unwrap();
            let vectorized = kind.compute_vectorized(&a, &b).unwrap();
            assert_relative_eq!(scalar, vectorized, epsilon = 1e-3);
        }
    }

    #[test]
    fn vectorized_kernel_handles_a_tail_shorter_than_a_lane() {
        let a = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0];
        let b = [9.0, 8.0, 7.0, 6.0, 5.0, 4.0, 3.0, 2.0, 1.0];
        assert_relative_eq!(l2_squared(&a, &b), l2_squared_vectorized(&a, &b), epsilon = 1e-3);
    }
}
