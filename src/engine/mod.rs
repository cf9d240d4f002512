/*!
Projection engine seam.

The pipeline treats dimensionality reduction as an opaque primitive with two
operations: fit a model on a batch and get that batch's projections back, or
push a batch through an existing model. Anything honoring that contract can
sit behind [`ProjectionEngine`]; the built-in
[`RandomProjectionEngine`] is a deterministic linear baseline, and
UMAP-class engines plug in the same way.

## Model envelope

Fitted state crosses the store boundary as a [`ReducerModel`]: a versioned
envelope (`schema_version`, `engine`, dimensions) around an engine-defined
JSON payload. Engines must refuse envelopes they did not produce; the
pipeline surfaces that refusal as a model-incompatibility error rather than
guessing.

## Contract

- `fit_transform` returns exactly one projection per input vector, in input
  order, each `n_components` wide.
- `transform` does the same against a stored model and must not mutate it.
- An empty `transform` batch is a no-op (`Ok(vec![])`); an empty fit batch
  is an error, because a model fitted on nothing is meaningless.
*/

use async_trait::async_trait;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ProjectionParams;

pub mod random_projection;

pub use random_projection::RandomProjectionEngine;

/// Schema version written into every persisted [`ReducerModel`].
pub const MODEL_SCHEMA_VERSION: u32 = 1;

// ============================================================================
// Model envelope
// ============================================================================

/// Serialized state of a fitted projection engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReducerModel {
    /// Envelope schema version, checked on load.
    pub schema_version: u32,
    /// Engine that produced this model, e.g. `"random-projection"`.
    pub engine: String,
    /// Embedding width the model was fitted on.
    pub input_dim: usize,
    /// Width of the projections it produces.
    pub output_dim: usize,
    /// Engine-defined fitted state.
    pub state: serde_json::Value,
}

impl ReducerModel {
    /// Envelope check before an engine replays the model.
    pub fn ensure_compatible(&self, engine: &str) -> Result<(), EngineError> {
        if self.schema_version != MODEL_SCHEMA_VERSION {
            return Err(EngineError::Incompatible {
                reason: format!(
                    "model schema v{} (supported: v{MODEL_SCHEMA_VERSION})",
                    self.schema_version
                ),
            });
        }
        if self.engine != engine {
            return Err(EngineError::Incompatible {
                reason: format!(
                    "model fitted by engine {:?}, loaded into {engine:?}",
                    self.engine
                ),
            });
        }
        Ok(())
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Errors produced by projection engines.
#[derive(Debug, Error, Diagnostic)]
pub enum EngineError {
    /// A vector's width does not match the model it is projected through.
    #[error("embedding is {actual} wide, model expects {expected}")]
    #[diagnostic(
        code(vecloom::engine::dimension_mismatch),
        help("Collections must keep one embedding width; refit after changing embedding models.")
    )]
    DimensionMismatch { expected: usize, actual: usize },

    /// The model envelope belongs to another engine or schema version.
    #[error("model incompatible: {reason}")]
    #[diagnostic(code(vecloom::engine::incompatible))]
    Incompatible { reason: String },

    /// Fitting was requested on an empty batch.
    #[error("cannot fit on an empty batch")]
    #[diagnostic(code(vecloom::engine::empty_fit))]
    EmptyFit,

    /// The batch mixes embedding widths.
    #[error("ragged input: vector {index} is {actual} wide, batch started at {expected}")]
    #[diagnostic(code(vecloom::engine::ragged_input))]
    RaggedInput {
        index: usize,
        expected: usize,
        actual: usize,
    },

    /// Hyperparameters the engine cannot honor.
    #[error("invalid parameters: {reason}")]
    #[diagnostic(code(vecloom::engine::params))]
    InvalidParams { reason: String },

    /// The model state payload failed to encode or decode.
    #[error("model state codec failed: {0}")]
    #[diagnostic(
        code(vecloom::engine::state_codec),
        help("The stored reducer predates this engine version; a full refit will replace it.")
    )]
    StateCodec(#[from] serde_json::Error),
}

// ============================================================================
// The trait
// ============================================================================

/// Output of a successful fit.
#[derive(Debug, Clone)]
pub struct FitOutcome {
    /// The fitted model, ready to persist.
    pub model: ReducerModel,
    /// Projections of the fit batch, one per input vector, in input order.
    pub embedded: Vec<Vec<f32>>,
}

/// A dimensionality-reduction engine.
#[async_trait]
pub trait ProjectionEngine: Send + Sync {
    /// Stable identifier persisted inside [`ReducerModel::engine`].
    fn name(&self) -> &'static str;

    /// Train a fresh model on `vectors` and return it with their projections.
    async fn fit_transform(
        &self,
        params: &ProjectionParams,
        vectors: &[Vec<f32>],
    ) -> Result<FitOutcome, EngineError>;

    /// Project `vectors` through an existing model without refitting it.
    async fn transform(
        &self,
        model: &ReducerModel,
        vectors: &[Vec<f32>],
    ) -> Result<Vec<Vec<f32>>, EngineError>;
}

/// Validate a fit batch is rectangular and non-empty, returning its width.
pub(crate) fn batch_width(vectors: &[Vec<f32>]) -> Result<usize, EngineError> {
    let expected = vectors.first().ok_or(EngineError::EmptyFit)?.len();
    if expected == 0 {
        return Err(EngineError::InvalidParams {
            reason: "zero-width embeddings".to_string(),
        });
    }
    for (index, vector) in vectors.iter().enumerate() {
        if vector.len() != expected {
            return Err(EngineError::RaggedInput {
                index,
                expected,
                actual: vector.len(),
            });
        }
    }
    Ok(expected)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(engine: &str, schema_version: u32) -> ReducerModel {
        ReducerModel {
            schema_version,
            engine: engine.to_string(),
            input_dim: 4,
            output_dim: 2,
            state: serde_json::Value::Null,
        }
    }

    #[test]
    fn envelope_rejects_foreign_engine() {
        let err = model("umap", MODEL_SCHEMA_VERSION)
            .ensure_compatible("random-projection")
            .expect_err("foreign engine must be rejected");
        assert!(matches!(err, EngineError::Incompatible { .. }));
    }

    #[test]
    fn envelope_rejects_unknown_schema() {
        let err = model("random-projection", MODEL_SCHEMA_VERSION + 1)
            .ensure_compatible("random-projection")
            .expect_err("unknown schema must be rejected");
        assert!(matches!(err, EngineError::Incompatible { .. }));
    }

    #[test]
    fn batch_width_flags_ragged_batches() {
        let err = batch_width(&[vec![1.0, 2.0], vec![1.0]]).expect_err("ragged");
        assert!(matches!(
            err,
            EngineError::RaggedInput {
                index: 1,
                expected: 2,
                actual: 1,
            }
        ));
        assert!(matches!(batch_width(&[]), Err(EngineError::EmptyFit)));
        assert_eq!(batch_width(&[vec![0.0; 3]]).expect("width"), 3);
    }
}
