//! Pipeline and engine configuration.
//!
//! Defaults mirror the values the visualization canvas was tuned against:
//! reducers train on at most [`DEFAULT_SAMPLE_SIZE`] records, and engines
//! receive the hyperparameters in [`ProjectionParams`] unless the host
//! overrides them. [`PipelineConfig::from_env`] applies `VECLOOM_*`
//! environment overrides on top of the defaults.

use serde::{Deserialize, Serialize};

/// Cap on how many records train a reducer in a single fit.
pub const DEFAULT_SAMPLE_SIZE: usize = 1500;

/// Distance metric hint handed to projection engines.
///
/// Linear engines ignore it; neighborhood-based engines use it to build
/// their distance graphs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    #[default]
    Euclidean,
    Cosine,
}

/// Hyperparameters handed to the projection engine at fit time.
///
/// These are persisted alongside every fitted reducer so a stored model can
/// be audited against the parameters that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionParams {
    /// Neighborhood size for graph-based engines.
    pub n_neighbors: usize,
    /// Minimum spacing between projected points.
    pub min_dist: f64,
    /// Target scale of the projected cloud.
    pub spread: f64,
    /// Output dimensionality.
    pub n_components: usize,
    pub metric: Metric,
}

impl Default for ProjectionParams {
    fn default() -> Self {
        Self {
            n_neighbors: 15,
            min_dist: 0.75,
            spread: 3.0,
            n_components: 2,
            metric: Metric::Euclidean,
        }
    }
}

impl ProjectionParams {
    #[must_use]
    pub fn with_n_neighbors(mut self, n_neighbors: usize) -> Self {
        self.n_neighbors = n_neighbors;
        self
    }

    #[must_use]
    pub fn with_min_dist(mut self, min_dist: f64) -> Self {
        self.min_dist = min_dist;
        self
    }

    #[must_use]
    pub fn with_spread(mut self, spread: f64) -> Self {
        self.spread = spread;
        self
    }

    #[must_use]
    pub fn with_n_components(mut self, n_components: usize) -> Self {
        self.n_components = n_components;
        self
    }

    #[must_use]
    pub fn with_metric(mut self, metric: Metric) -> Self {
        self.metric = metric;
        self
    }
}

/// Tuning knobs for [`crate::pipeline::ProjectionPipeline`].
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Fit-sample cap; candidate sets beyond this are split into a fit
    /// sample and a transformed remainder.
    pub sample_size: usize,
    /// Engine hyperparameters used for every fresh fit.
    pub params: ProjectionParams,
    /// Seed for the pre-split candidate shuffle. `None` draws from OS
    /// entropy; pin it for reproducible runs.
    pub shuffle_seed: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sample_size: DEFAULT_SAMPLE_SIZE,
            params: ProjectionParams::default(),
            shuffle_seed: None,
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_sample_size(mut self, sample_size: usize) -> Self {
        self.sample_size = sample_size;
        self
    }

    #[must_use]
    pub fn with_params(mut self, params: ProjectionParams) -> Self {
        self.params = params;
        self
    }

    #[must_use]
    pub fn with_shuffle_seed(mut self, seed: u64) -> Self {
        self.shuffle_seed = Some(seed);
        self
    }

    /// Defaults with environment overrides applied.
    ///
    /// Loads `.env` if present, then reads `VECLOOM_SAMPLE_SIZE` and
    /// `VECLOOM_SHUFFLE_SEED`. Unparseable or non-positive values fall back
    /// to the defaults.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let mut config = Self::default();
        if let Ok(raw) = std::env::var("VECLOOM_SAMPLE_SIZE") {
            if let Ok(sample_size) = raw.parse::<usize>() {
                if sample_size > 0 {
                    config.sample_size = sample_size;
                }
            }
        }
        if let Ok(raw) = std::env::var("VECLOOM_SHUFFLE_SEED") {
            if let Ok(seed) = raw.parse::<u64>() {
                config.shuffle_seed = Some(seed);
            }
        }
        config
    }
}
