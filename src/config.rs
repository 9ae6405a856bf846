//! Scoring configuration

/// Number of score levels used when nothing else is configured
pub const DEFAULT_CLUSTERS: usize = 5;

/// Seed for centroid initialization, fixed so repeated runs agree
pub const DEFAULT_SEED: u64 = 0;

/// Iteration cap for K-Means, generous for single-feature data
pub const MAX_ITERATIONS: u64 = 1000;

/// Inertia tolerance used to stop K-Means early
pub const DEFAULT_TOLERANCE: f64 = 1e-4;

/// Configuration for fitting and scoring one run
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringConfig {
    /// Number of clusters, and therefore the highest score
    pub n_clusters: usize,

    /// Random seed for k-means++ initialization
    pub seed: u64,

    /// Maximum iterations per K-Means run
    pub max_iters: u64,

    /// Convergence tolerance
    pub tolerance: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            n_clusters: DEFAULT_CLUSTERS,
            seed: DEFAULT_SEED,
            max_iters: MAX_ITERATIONS,
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

impl ScoringConfig {
    /// Create a configuration with `k` clusters and default fitter settings
    pub fn new(n_clusters: usize) -> Self {
        Self {
            n_clusters,
            ..Default::default()
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_max_iters(mut self, max_iters: u64) -> Self {
        self.max_iters = max_iters;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }
}
