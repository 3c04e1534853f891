//! PQ codebook training: sub-space count selection and k-means++ in double
//! precision.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::core::common::OxidbError;
use crate::core::vector::distance::l2_squared_f64;

/// Chooses M, the number of sub-spaces, as the divisor of `dimension` whose
/// resulting sub-vector length is closest to 4, bounded by the signed-byte
/// centroid-index limit (`M` itself must fit a byte-sized sub-space count).
#[must_use]
pub fn choose_num_subspaces(dimension: usize) -> usize {
    const TARGET_SUBVECTOR_LEN: isize = 4;
    let mut best = 1usize;
    for m in 1..=dimension.min(127).max(1) {
        if dimension % m != 0 {
            continue;
        }
        let len = (dimension / m) as isize;
        let best_len = (dimension / best) as isize;
        if (len - TARGET_SUBVECTOR_LEN).abs() < (best_len - TARGET_SUBVECTOR_LEN).abs() {
            best = m;
        }
    }
    best
}

/// Splits a full vector into `num_subspaces` equal-length sub-vectors.
#[must_use]
pub fn split(vector: &[f64], num_subspaces: usize) -> Vec<&[f64]> {
    let subdim = vector.len() / num_subspaces;
    vector.chunks(subdim).collect()
}

fn nearest_index(sample: &[f64], centroids: &[Vec<f64>]) -> usize {
    centroids
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| {
            l2_squared_f64(sample, a).partial_cmp(&l2_squared_f64(sample, b)).unwrap()
        })
        .map_or(0, |(i, _)| i)
}

fn nearest_sq_dist(sample: &[f64], centroids: &[Vec<f64>]) -> f64 {
    centroids.iter().map(|c| l2_squared_f64(sample, c)).fold(f64::INFINITY, f64::min)
}

/// k-means++ seeding followed by Lloyd iteration, in double precision.
///
/// # Errors
/// Returns `PolicyViolation` if there are fewer samples than `k`.
pub fn kmeans_plus_plus(
    samples: &[Vec<f64>],
    k: usize,
    max_iterations: usize,
    seed: u64,
) -> Result<Vec<Vec<f64>>, OxidbError> {
    if samples.len() < k {
        return Err(OxidbError::PolicyViolation(format!(
            "cannot train {k} centroids from {} samples",
            samples.len()
        )));
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let dim = samples[0].len();

    let mut centroids = Vec::with_capacity(k);
    centroids.push(samples[rng.gen_range(0..samples.len())].clone());
    while centroids.len() < k {
        let weights: Vec<f64> = samples.iter().map(|s| nearest_sq_dist(s, &centroids)).collect();
        let total: f64 = weights.iter().sum();
        if total <= 0.0 {
            centroids.push(samples[rng.gen_range(0..samples.len())].clone());
            continue;
        }
        let mut threshold = rng.gen_range(0.0..total);
        let mut chosen = samples.len() - 1;
        for (i, w) in weights.iter().enumerate() {
            if threshold < *w {
                chosen = i;
                break;
            }
            threshold -= w;
        }
        centroids.push(samples[chosen].clone());
    }

    for _ in 0..max_iterations {
        let mut sums = vec![vec![0.0f64; dim]; k];
        let mut counts = vec![0usize; k];
        for sample in samples {
            let nearest = nearest_index(sample, &centroids);
            counts[nearest] += 1;
            for (acc, component) in sums[nearest].iter_mut().zip(sample) {
                *acc += component;
            }
        }
        for (i, centroid) in centroids.iter_mut().enumerate() {
            if counts[i] == 0 {
                continue;
            }
            for (component, sum) in centroid.iter_mut().zip(&sums[i]) {
                *component = sum / counts[i] as f64;
            }
        }
    }
    Ok(centroids)
}

/// Per-sub-space diagonal variance around each assigned centroid: a
/// tractable simplification of the full covariance matrix, kept as index
/// statistics rather than folded into the quantization distance.
#[must_use]
pub fn diagonal_variance(samples: &[Vec<f64>], centroids: &[Vec<f64>]) -> Vec<f64> {
    let dim = centroids.first().map_or(0, Vec::len);
    let mut variance = vec![0.0f64; dim];
    if samples.is_empty() {
        return variance;
    }
    for sample in samples {
        let nearest = nearest_index(sample, centroids);
        for (v, (s, c)) in variance.iter_mut().zip(sample.iter().zip(&centroids[nearest])) {
            *v += (s - c) * (s - c);
        }
    }
    for v in &mut variance {
        *v /= samples.len() as f64;
    }
    variance
}

/// The index of `sample`'s nearest centroid within one sub-space.
#[must_use]
pub fn quantize(sample: &[f64], centroids: &[Vec<f64>]) -> u16 {
    nearest_index(sample, centroids) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chooses_a_divisor_near_four_wide_subvectors() {
        assert_eq!(choose_num_subspaces(16), 4);
        assert_eq!(choose_num_subspaces(8), 2);
    }

    #[test]
    fn kmeans_converges_on_two_separated_clusters() {
        let samples: Vec<Vec<f64>> = (0..50)
            .map(|i| vec![if i % 2 == 0 { 0.0 } else { 10.0 }])
            .collect();
        let centroids = kmeans_plus_plus(&samples, 2, 10, 0).unwrap();
        let mut values: Vec<f64> = centroids.into_iter().map(|c| c[0]).collect();
        values.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert!((values[0] - 0.0).abs() < 1.0);
        assert!((values[1] - 10.0).abs() < 1.0);
    }
}
