//! Process-wide policy variables: cost weights, plan-cache capacity, and the
//! VAF/PQ index build parameters. There is no file/CLI loader; callers build
//! a `Config` in-process and pass it to the catalogue at open time.

/// Weights applied to a physical plan's 4-tuple cost when scoring it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostWeights {
    pub io: f64,
    pub cpu: f64,
    pub memory: f64,
    pub accuracy: f64,
}

impl Default for CostWeights {
    fn default() -> Self {
        Self { io: 0.6, cpu: 0.2, memory: 0.2, accuracy: 0.0 }
    }
}

/// Product-quantization training parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct PqConfig {
    /// Upper bound imposed by the signed-byte centroid index.
    pub num_centroids: u16,
    /// `None` selects the sub-space count automatically from dimensionality.
    pub num_subspaces: Option<u16>,
    pub sample_size: usize,
    pub seed: u64,
    pub max_iterations: usize,
    /// Phase-1 candidate inflation factor applied to k.
    pub candidate_inflation: f64,
}

impl Default for PqConfig {
    fn default() -> Self {
        Self {
            num_centroids: 256,
            num_subspaces: None,
            sample_size: 10_000,
            seed: 0,
            max_iterations: 25,
            candidate_inflation: 1.15,
        }
    }
}

/// Vector-approximation-file build parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VafConfig {
    pub marks_per_dimension: usize,
}

impl Default for VafConfig {
    fn default() -> Self {
        Self { marks_per_dimension: 50 }
    }
}

/// Break-even dimensionality thresholds past which a plan rewrite should
/// prefer a vectorized distance kernel over the scalar one. Conservative
/// defaults per an un-calibrated build, per the engine's own open question
/// on the SIMD rewrite threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimdThresholds {
    pub float_dimension: usize,
    pub double_dimension: usize,
}

impl Default for SimdThresholds {
    fn default() -> Self {
        Self { float_dimension: 64, double_dimension: 32 }
    }
}

/// Top-level, in-process configuration for one catalogue instance.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub cost_weights: CostWeights,
    pub plan_cache_capacity: usize,
    pub pq: PqConfig,
    pub vaf: VafConfig,
    pub simd_thresholds: SimdThresholds,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cost_weights: CostWeights::default(),
            plan_cache_capacity: 100,
            pq: PqConfig::default(),
            vaf: VafConfig::default(),
            simd_thresholds: SimdThresholds::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_cost_weights_match_policy() {
        let weights = CostWeights::default();
        assert_eq!((weights.io, weights.cpu, weights.memory, weights.accuracy), (0.6, 0.2, 0.2, 0.0));
    }

    #[test]
    fn default_config_has_documented_defaults() {
        let config = Config::default();
        assert_eq!(config.plan_cache_capacity, 100);
        assert_eq!(config.vaf.marks_per_dimension, 50);
        assert!((config.pq.candidate_inflation - 1.15).abs() < 1e-9);
    }
}
