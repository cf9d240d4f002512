//! Storage collaborators of the projection pipeline.
//!
//! The pipeline core never talks to a database directly; it goes through
//! four narrow traits, and each backend implements all of them on one
//! handle:
//!
//! ```text
//!                  ┌──────────────────────┐
//!                  │  ProjectionPipeline  │
//!                  └──────────┬───────────┘
//!                             │
//!        ┌──────────────┬─────┴──────┬────────────────┐
//!        ▼              ▼            ▼                ▼
//!  VectorSource   ReducerStore  GraphPointSink  MembershipOracle
//!   (read rows)   (model CRUD)  (delete+insert)  (idempotence)
//!        │              │            │                │
//!        └──────────────┴─────┬──────┴────────────────┘
//!                             │
//!            ┌────────────────┼────────────────┐
//!            ▼                ▼                ▼
//!     InMemoryBackend   SqliteBackend   PostgresBackend
//!                      (feat. sqlite)  (feat. postgres)
//! ```
//!
//! Mixed deployments are possible too: the pipeline builder accepts each
//! trait object separately, so embeddings can live in one store and points
//! in another.
//!
//! # Atomicity
//!
//! [`GraphPointSink::replace_points`] is the only compound write: the
//! delete and the bulk insert must land together. SQL backends run both in
//! one transaction; the in-memory backend holds its write lock across both.
//!
//! # The reducer row
//!
//! A persisted [`Reducer`] is a full replace keyed by collection: the
//! model envelope, the fit-sample size it was trained on, the parameters in
//! effect at fit time, and the fit timestamp. Decode failures on load
//! surface as [`StoreError::CorruptReducer`], never a panic.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ProjectionParams;
use crate::engine::ReducerModel;
use crate::types::{CollectionName, EmbeddingRecord, GraphPoint, MemoryId};

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod vector_codec;

// Re-exports for convenience
pub use memory::InMemoryBackend;
#[cfg(feature = "postgres")]
pub use postgres::PostgresBackend;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteBackend;
pub use vector_codec::{VectorCodecError, decode_vector, encode_vector};

pub type Result<T> = std::result::Result<T, StoreError>;

// ============================================================================
// Persisted reducer
// ============================================================================

/// A fitted reducer as persisted per collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reducer {
    /// Versioned model envelope the engine replays.
    pub model: ReducerModel,
    /// Fit-sample size; transformed remainders never count.
    pub trained_on_count: usize,
    /// Parameters in effect when the model was fitted.
    pub params: ProjectionParams,
    pub fitted_at: DateTime<Utc>,
}

impl Reducer {
    pub fn new(model: ReducerModel, trained_on_count: usize, params: ProjectionParams) -> Self {
        Self {
            model,
            trained_on_count,
            params,
            fitted_at: Utc::now(),
        }
    }
}

// ============================================================================
// Replace semantics
// ============================================================================

/// Which prior points a [`GraphPointSink::replace_points`] call removes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplaceScope {
    /// Delete exactly these point ids.
    Ids(Vec<String>),
    /// Delete every point in the graph.
    All,
}

/// Row counts from a completed replace.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaceOutcome {
    pub deleted: u64,
    pub inserted: u64,
}

// ============================================================================
// Errors
// ============================================================================

/// Errors surfaced by storage backends.
#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("backend error: {message}")]
    #[diagnostic(
        code(vecloom::store::backend),
        help("Check that the database is reachable and migrated.")
    )]
    Backend { message: String },

    /// A stored embedding column failed to decode.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Codec(#[from] VectorCodecError),

    /// A stored reducer row failed to decode.
    #[error("corrupt persisted reducer for {collection}: {reason}")]
    #[diagnostic(
        code(vecloom::store::corrupt_reducer),
        help("Delete the stored reducer or run a full-batch refit to replace it.")
    )]
    CorruptReducer { collection: String, reason: String },
}

// ============================================================================
// Traits
// ============================================================================

/// Read access to the embedded records of a collection.
///
/// Sources return records in no particular order; the pipeline shuffles
/// before any split. Rows that have not been embedded yet are excluded.
#[async_trait]
pub trait VectorSource: Send + Sync {
    /// Every embedded record in the collection.
    async fn load_collection(&self, collection: &CollectionName) -> Result<Vec<EmbeddingRecord>>;

    /// Embedded records belonging to one memory within the collection.
    async fn load_memory(
        &self,
        collection: &CollectionName,
        memory_id: MemoryId,
    ) -> Result<Vec<EmbeddingRecord>>;
}

/// Durable storage for fitted reducers, keyed by collection.
#[async_trait]
pub trait ReducerStore: Send + Sync {
    async fn load_reducer(&self, collection: &CollectionName) -> Result<Option<Reducer>>;

    /// Full replace of the stored reducer.
    async fn save_reducer(&self, collection: &CollectionName, reducer: &Reducer) -> Result<()>;

    async fn delete_reducer(&self, collection: &CollectionName) -> Result<()>;
}

/// Bulk replacement sink for projected points.
#[async_trait]
pub trait GraphPointSink: Send + Sync {
    /// Delete by scope, then insert `points`, atomically.
    ///
    /// Afterwards every touched id holds exactly one point.
    async fn replace_points(
        &self,
        graph: &CollectionName,
        scope: ReplaceScope,
        points: &[GraphPoint],
    ) -> Result<ReplaceOutcome>;

    /// All points currently stored for `graph`, ordered by id.
    async fn list_points(&self, graph: &CollectionName) -> Result<Vec<GraphPoint>>;
}

/// Answers whether a memory already has projected points.
///
/// True iff some record of that memory currently owns a point in the
/// collection's graph. Full-batch runs never consult this.
#[async_trait]
pub trait MembershipOracle: Send + Sync {
    async fn already_processed(
        &self,
        collection: &CollectionName,
        memory_id: MemoryId,
    ) -> Result<bool>;
}
