//! Public failure taxonomy for pipeline runs.
//!
//! Layered errors ([`crate::stores::StoreError`], [`crate::engine::EngineError`])
//! fold into [`PipelineError`] through the `From` impls below, so every
//! failure a caller sees lands in one of four buckets:
//!
//! - [`PipelineError::InvalidInput`]: the request or the data it addressed
//!   is malformed. Fix the input; retrying unchanged will fail again.
//! - [`PipelineError::StoreUnavailable`]: a collaborator store could not
//!   serve the run. Safe to retry once the backend recovers.
//! - [`PipelineError::ModelIncompatible`]: the persisted reducer cannot
//!   serve this engine, schema, or embedding width. A full-batch refit
//!   replaces it.
//! - [`PipelineError::Cancelled`]: the run observed its cancellation token
//!   at a stage boundary. Nothing in the aborted stage was persisted.
//!
//! Runs never retry internally and never report partial success; the first
//! failure propagates.

use miette::Diagnostic;
use thiserror::Error;

use crate::engine::EngineError;
use crate::stores::StoreError;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, Error, Diagnostic)]
pub enum PipelineError {
    /// The request or the stored data it addressed is malformed.
    #[error("invalid input: {reason}")]
    #[diagnostic(
        code(vecloom::pipeline::invalid_input),
        help("Fix the collection name, memory id, or stored embeddings and re-run.")
    )]
    InvalidInput { reason: String },

    /// A collaborator store failed; the run stopped at the failing stage.
    #[error("store unavailable: {message}")]
    #[diagnostic(
        code(vecloom::pipeline::store_unavailable),
        help("Check that the database is reachable and migrated, then re-run.")
    )]
    StoreUnavailable { message: String },

    /// The persisted reducer cannot serve this run.
    #[error("model incompatible: {reason}")]
    #[diagnostic(
        code(vecloom::pipeline::model_incompatible),
        help("Run a full-batch refit for the collection to replace the stored reducer.")
    )]
    ModelIncompatible { reason: String },

    /// The cancellation token fired before the named stage began.
    #[error("run cancelled before {stage}")]
    #[diagnostic(code(vecloom::pipeline::cancelled))]
    Cancelled { stage: &'static str },
}

impl From<StoreError> for PipelineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Backend { message } => PipelineError::StoreUnavailable { message },
            StoreError::Codec(err) => PipelineError::InvalidInput {
                reason: format!("stored embedding: {err}"),
            },
            StoreError::CorruptReducer { collection, reason } => PipelineError::ModelIncompatible {
                reason: format!("stored reducer for {collection}: {reason}"),
            },
        }
    }
}

impl From<EngineError> for PipelineError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::DimensionMismatch { expected, actual } => {
                PipelineError::ModelIncompatible {
                    reason: format!(
                        "embedding width {actual} does not fit model width {expected}"
                    ),
                }
            }
            EngineError::Incompatible { reason } => PipelineError::ModelIncompatible { reason },
            EngineError::StateCodec(err) => PipelineError::ModelIncompatible {
                reason: format!("model state: {err}"),
            },
            EngineError::EmptyFit => PipelineError::InvalidInput {
                reason: "no vectors to fit".to_string(),
            },
            EngineError::RaggedInput {
                index,
                expected,
                actual,
            } => PipelineError::InvalidInput {
                reason: format!(
                    "ragged embeddings: vector {index} is {actual} wide, batch started at {expected}"
                ),
            },
            EngineError::InvalidParams { reason } => PipelineError::InvalidInput { reason },
        }
    }
}
