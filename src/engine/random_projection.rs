//! Deterministic random-projection engine.
//!
//! The baseline [`ProjectionEngine`]: a seeded Rademacher matrix (entries
//! `±1/√d`) projects mean-centered embeddings down to `n_components`, and a
//! per-component scale stretches the result so each output axis has the
//! configured `spread` as its standard deviation over the fit sample.
//!
//! The whole fitted state (matrix, center, scale) serializes into the model
//! envelope, so transform runs replay the exact projection without access to
//! the original fit data. Fits with the same seed, parameters, and batch are
//! bit-identical.
//!
//! `n_neighbors` and `min_dist` are validated and recorded but do not
//! influence a linear projection; together with the `metric` hint they feed
//! neighborhood-based engines behind the same trait.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{RngExt, SeedableRng};
use serde::{Deserialize, Serialize};

use super::{
    EngineError, FitOutcome, MODEL_SCHEMA_VERSION, ProjectionEngine, ReducerModel, batch_width,
};
use crate::config::ProjectionParams;

/// Engine identifier written into model envelopes.
pub const ENGINE_NAME: &str = "random-projection";

/// Components with variance at or below this keep a unit scale instead of
/// dividing by (near) zero.
const MIN_COMPONENT_VARIANCE: f32 = 1e-12;

/// Fitted state stored inside the model envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ProjectionState {
    /// Row-major `output_dim x input_dim` Rademacher matrix.
    matrix: Vec<Vec<f32>>,
    /// Fit-sample mean, subtracted before projecting.
    center: Vec<f32>,
    /// Per-component scale mapping raw projections onto the spread.
    scale: Vec<f32>,
}

impl ProjectionState {
    fn check_dims(&self, input_dim: usize, output_dim: usize) -> Result<(), EngineError> {
        let rows_ok = self.matrix.iter().all(|row| row.len() == input_dim);
        if self.matrix.len() != output_dim
            || !rows_ok
            || self.center.len() != input_dim
            || self.scale.len() != output_dim
        {
            return Err(EngineError::Incompatible {
                reason: "model state does not match its envelope dimensions".to_string(),
            });
        }
        Ok(())
    }
}

fn project_raw(matrix: &[Vec<f32>], center: &[f32], vector: &[f32]) -> Vec<f32> {
    matrix
        .iter()
        .map(|row| {
            row.iter()
                .zip(vector.iter().zip(center))
                .map(|(m, (x, c))| m * (x - c))
                .sum()
        })
        .collect()
}

fn apply_scale(point: &mut [f32], scale: &[f32]) {
    for (value, s) in point.iter_mut().zip(scale) {
        *value *= s;
    }
}

fn validate_params(params: &ProjectionParams, input_dim: usize) -> Result<(), EngineError> {
    if params.n_components == 0 {
        return Err(EngineError::InvalidParams {
            reason: "n_components must be at least 1".to_string(),
        });
    }
    if params.n_components > input_dim {
        return Err(EngineError::InvalidParams {
            reason: format!(
                "n_components {} exceeds embedding width {input_dim}",
                params.n_components
            ),
        });
    }
    if !params.spread.is_finite() || params.spread <= 0.0 {
        return Err(EngineError::InvalidParams {
            reason: "spread must be finite and positive".to_string(),
        });
    }
    if !params.min_dist.is_finite() || params.min_dist < 0.0 {
        return Err(EngineError::InvalidParams {
            reason: "min_dist must be finite and non-negative".to_string(),
        });
    }
    if params.n_neighbors < 2 {
        return Err(EngineError::InvalidParams {
            reason: "n_neighbors must be at least 2".to_string(),
        });
    }
    Ok(())
}

/// Seeded random projection with centering and spread scaling.
#[derive(Debug, Clone)]
pub struct RandomProjectionEngine {
    seed: u64,
}

impl RandomProjectionEngine {
    /// Matrix seed used unless [`RandomProjectionEngine::with_seed`]
    /// overrides it.
    pub const DEFAULT_SEED: u64 = 0x5EED_CAFE;

    pub fn new() -> Self {
        Self {
            seed: Self::DEFAULT_SEED,
        }
    }

    /// Pin the projection matrix to a specific seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

impl Default for RandomProjectionEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProjectionEngine for RandomProjectionEngine {
    fn name(&self) -> &'static str {
        ENGINE_NAME
    }

    async fn fit_transform(
        &self,
        params: &ProjectionParams,
        vectors: &[Vec<f32>],
    ) -> Result<FitOutcome, EngineError> {
        let input_dim = batch_width(vectors)?;
        validate_params(params, input_dim)?;
        let output_dim = params.n_components;
        let samples = vectors.len() as f32;

        let mut rng = StdRng::seed_from_u64(self.seed);
        let unit = 1.0 / (input_dim as f32).sqrt();
        let matrix: Vec<Vec<f32>> = (0..output_dim)
            .map(|_| {
                (0..input_dim)
                    .map(|_| if rng.random_bool(0.5) { unit } else { -unit })
                    .collect()
            })
            .collect();

        let mut center = vec![0.0f32; input_dim];
        for vector in vectors {
            for (acc, x) in center.iter_mut().zip(vector) {
                *acc += x;
            }
        }
        for acc in &mut center {
            *acc /= samples;
        }

        let mut embedded: Vec<Vec<f32>> = vectors
            .iter()
            .map(|vector| project_raw(&matrix, &center, vector))
            .collect();

        let spread = params.spread as f32;
        let mut scale = vec![1.0f32; output_dim];
        for component in 0..output_dim {
            let mean = embedded.iter().map(|p| p[component]).sum::<f32>() / samples;
            let variance = embedded
                .iter()
                .map(|p| (p[component] - mean).powi(2))
                .sum::<f32>()
                / samples;
            if variance > MIN_COMPONENT_VARIANCE {
                scale[component] = spread / variance.sqrt();
            }
        }
        for point in &mut embedded {
            apply_scale(point, &scale);
        }

        let state = ProjectionState {
            matrix,
            center,
            scale,
        };
        let model = ReducerModel {
            schema_version: MODEL_SCHEMA_VERSION,
            engine: ENGINE_NAME.to_string(),
            input_dim,
            output_dim,
            state: serde_json::to_value(&state)?,
        };
        Ok(FitOutcome { model, embedded })
    }

    async fn transform(
        &self,
        model: &ReducerModel,
        vectors: &[Vec<f32>],
    ) -> Result<Vec<Vec<f32>>, EngineError> {
        model.ensure_compatible(ENGINE_NAME)?;
        let state: ProjectionState = serde_json::from_value(model.state.clone())?;
        state.check_dims(model.input_dim, model.output_dim)?;

        if vectors.is_empty() {
            return Ok(Vec::new());
        }
        let mut out = Vec::with_capacity(vectors.len());
        for vector in vectors {
            if vector.len() != model.input_dim {
                return Err(EngineError::DimensionMismatch {
                    expected: model.input_dim,
                    actual: vector.len(),
                });
            }
            let mut point = project_raw(&state.matrix, &state.center, vector);
            apply_scale(&mut point, &state.scale);
            out.push(point);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(count: usize, dim: usize) -> Vec<Vec<f32>> {
        (0..count)
            .map(|i| {
                (0..dim)
                    .map(|j| ((i * 31 + j * 17) % 23) as f32 * 0.5 - 5.0)
                    .collect()
            })
            .collect()
    }

    #[tokio::test]
    async fn fit_is_deterministic() {
        let engine = RandomProjectionEngine::new();
        let params = ProjectionParams::default();
        let vectors = batch(12, 8);

        let first = engine.fit_transform(&params, &vectors).await.expect("fit");
        let second = engine.fit_transform(&params, &vectors).await.expect("fit");
        assert_eq!(first.model, second.model);
        assert_eq!(first.embedded, second.embedded);
    }

    #[tokio::test]
    async fn different_seeds_give_different_projections() {
        let params = ProjectionParams::default();
        let vectors = batch(12, 8);

        let a = RandomProjectionEngine::new()
            .fit_transform(&params, &vectors)
            .await
            .expect("fit");
        let b = RandomProjectionEngine::new()
            .with_seed(99)
            .fit_transform(&params, &vectors)
            .await
            .expect("fit");
        assert_ne!(a.embedded, b.embedded);
    }

    #[tokio::test]
    async fn fit_draws_signed_unit_matrix_entries() {
        let engine = RandomProjectionEngine::new();
        let fit = engine
            .fit_transform(&ProjectionParams::default(), &batch(6, 16))
            .await
            .expect("fit");

        let state: ProjectionState =
            serde_json::from_value(fit.model.state.clone()).expect("state decodes");
        let unit = 1.0 / (16.0f32).sqrt();
        let entries: Vec<f32> = state.matrix.iter().flatten().copied().collect();
        assert!(entries.iter().all(|e| (e.abs() - unit).abs() < 1e-6));
        assert!(entries.iter().any(|e| *e > 0.0));
        assert!(entries.iter().any(|e| *e < 0.0));
    }

    #[tokio::test]
    async fn transform_replays_fit_projections() {
        let engine = RandomProjectionEngine::new();
        let params = ProjectionParams::default();
        let vectors = batch(10, 6);

        let fit = engine.fit_transform(&params, &vectors).await.expect("fit");
        let replayed = engine
            .transform(&fit.model, &vectors)
            .await
            .expect("transform");
        assert_eq!(fit.embedded, replayed);
    }

    #[tokio::test]
    async fn output_width_follows_n_components() {
        let engine = RandomProjectionEngine::new();
        let params = ProjectionParams::default().with_n_components(3);
        let fit = engine
            .fit_transform(&params, &batch(6, 10))
            .await
            .expect("fit");

        assert_eq!(fit.model.output_dim, 3);
        assert!(fit.embedded.iter().all(|p| p.len() == 3));
    }

    #[tokio::test]
    async fn spread_sets_component_deviation() {
        let engine = RandomProjectionEngine::new();
        let params = ProjectionParams::default().with_spread(3.0);
        let vectors = batch(40, 12);
        let fit = engine.fit_transform(&params, &vectors).await.expect("fit");

        let samples = fit.embedded.len() as f32;
        for component in 0..2 {
            let mean = fit.embedded.iter().map(|p| p[component]).sum::<f32>() / samples;
            let variance = fit
                .embedded
                .iter()
                .map(|p| (p[component] - mean).powi(2))
                .sum::<f32>()
                / samples;
            assert!(
                (variance.sqrt() - 3.0).abs() < 1e-2,
                "component {component} deviation {} should sit at the spread",
                variance.sqrt()
            );
        }
    }

    #[tokio::test]
    async fn transform_rejects_mismatched_width() {
        let engine = RandomProjectionEngine::new();
        let fit = engine
            .fit_transform(&ProjectionParams::default(), &batch(5, 6))
            .await
            .expect("fit");

        let err = engine
            .transform(&fit.model, &[vec![0.0; 4]])
            .await
            .expect_err("narrow vector must be rejected");
        assert!(matches!(
            err,
            EngineError::DimensionMismatch {
                expected: 6,
                actual: 4,
            }
        ));
    }

    #[tokio::test]
    async fn transform_of_empty_batch_is_noop() {
        let engine = RandomProjectionEngine::new();
        let fit = engine
            .fit_transform(&ProjectionParams::default(), &batch(5, 6))
            .await
            .expect("fit");
        let out = engine.transform(&fit.model, &[]).await.expect("transform");
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn empty_fit_is_rejected() {
        let engine = RandomProjectionEngine::new();
        let err = engine
            .fit_transform(&ProjectionParams::default(), &[])
            .await
            .expect_err("empty fit");
        assert!(matches!(err, EngineError::EmptyFit));
    }

    #[tokio::test]
    async fn components_cannot_exceed_embedding_width() {
        let engine = RandomProjectionEngine::new();
        let params = ProjectionParams::default().with_n_components(5);
        let err = engine
            .fit_transform(&params, &batch(4, 3))
            .await
            .expect_err("too many components");
        assert!(matches!(err, EngineError::InvalidParams { .. }));
    }

    #[tokio::test]
    async fn undersized_neighborhood_is_rejected() {
        let engine = RandomProjectionEngine::new();
        let params = ProjectionParams::default().with_n_neighbors(1);
        let err = engine
            .fit_transform(&params, &batch(4, 3))
            .await
            .expect_err("n_neighbors below 2");
        assert!(matches!(err, EngineError::InvalidParams { .. }));
    }

    #[tokio::test]
    async fn single_vector_projects_to_origin() {
        let engine = RandomProjectionEngine::new();
        let fit = engine
            .fit_transform(&ProjectionParams::default(), &[vec![1.0, 2.0, 3.0, 4.0]])
            .await
            .expect("fit");
        assert_eq!(fit.embedded, vec![vec![0.0, 0.0]]);
    }
}
