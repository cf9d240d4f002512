//! Core domain types for the projection pipeline.
//!
//! Everything here is plain data: validated identifiers, the records the
//! pipeline reads, the points it writes, and the report it returns. The
//! traits that move these values live in [`crate::stores`] and
//! [`crate::pipeline`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PipelineError;

// ============================================================================
// Identifiers
// ============================================================================

/// Name of an embedding collection.
///
/// Doubles as the graph name in the point sink: one collection owns exactly
/// one graph of projected points.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollectionName(String);

impl CollectionName {
    /// Validate a raw collection name. Surrounding whitespace is trimmed;
    /// an empty result is rejected.
    pub fn parse(raw: impl Into<String>) -> Result<Self, PipelineError> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(PipelineError::InvalidInput {
                reason: "collection name is empty".to_string(),
            });
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CollectionName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<&str> for CollectionName {
    type Error = PipelineError;

    fn try_from(raw: &str) -> Result<Self, Self::Error> {
        Self::parse(raw)
    }
}

/// Identifier of one ingested unit (a "memory") inside a collection.
///
/// Always positive. Invalid ids are rejected up front rather than silently
/// treated as absent, so a malformed id can never demote a scoped run into
/// a full-collection one.
///
/// ```
/// use vecloom::types::MemoryId;
///
/// assert!(MemoryId::new(42).is_some());
/// assert!(MemoryId::new(0).is_none());
/// assert!(MemoryId::parse("17").is_ok());
/// assert!(MemoryId::parse("not-a-number").is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemoryId(i64);

impl MemoryId {
    /// Wrap an already-numeric id. Returns `None` for zero or negatives.
    pub fn new(raw: i64) -> Option<Self> {
        (raw > 0).then_some(Self(raw))
    }

    /// Parse an externally supplied id string.
    pub fn parse(raw: &str) -> Result<Self, PipelineError> {
        raw.trim()
            .parse::<i64>()
            .ok()
            .and_then(Self::new)
            .ok_or_else(|| PipelineError::InvalidInput {
                reason: format!("invalid memory id: {raw:?}"),
            })
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for MemoryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Records and points
// ============================================================================

/// One embedded row loaded from a vector source.
///
/// The vector arrives already coalesced: whichever embedding tier the source
/// stores, the record carries exactly one vector. An empty vector marks a row
/// that has not been embedded yet; sources exclude those from candidate sets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    /// Unique chunk id, stable across runs.
    pub id: String,
    /// Owning collection.
    pub collection: String,
    /// High-dimensional embedding.
    pub vector: Vec<f32>,
    /// Ingestion batch this chunk arrived in, if it came through one.
    pub memory_id: Option<MemoryId>,
}

impl EmbeddingRecord {
    pub fn new(id: impl Into<String>, collection: impl Into<String>, vector: Vec<f32>) -> Self {
        Self {
            id: id.into(),
            collection: collection.into(),
            vector,
            memory_id: None,
        }
    }

    /// Tag the record with the memory it was ingested under.
    #[must_use]
    pub fn with_memory_id(mut self, memory_id: MemoryId) -> Self {
        self.memory_id = Some(memory_id);
        self
    }
}

/// A projected point ready for the visualization canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphPoint {
    /// Id of the source record this point was projected from.
    pub id: String,
    /// Graph (collection) the point belongs to.
    pub graph_name: String,
    /// Low-dimensional coordinates, `n_components` wide.
    pub point: Vec<f32>,
}

// ============================================================================
// Run outcomes
// ============================================================================

/// How a run produced its points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitMode {
    /// The reducer was retrained on the whole collection.
    FullRefit,
    /// The stored reducer transformed only the new records.
    Incremental,
}

/// What a successful run did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// The requested memory already had points; nothing was touched.
    AlreadyProcessed,
    /// No candidate records carried an embedding; nothing was touched.
    NoCandidates,
    /// Points were projected and replaced in the sink.
    Projected {
        mode: FitMode,
        /// Points written this run.
        projected: usize,
        /// Prior points removed before the insert.
        deleted: usize,
        /// Fit-sample size of the reducer after this run.
        trained_on_count: usize,
    },
}

impl RunOutcome {
    /// True when the run finished without touching the reducer or the sink.
    pub fn is_noop(&self) -> bool {
        matches!(self, RunOutcome::AlreadyProcessed | RunOutcome::NoCandidates)
    }
}

/// Success report for one pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectionReport {
    /// Unique id of this run, also present in its tracing spans.
    pub run_id: Uuid,
    pub collection: CollectionName,
    pub memory_id: Option<MemoryId>,
    pub outcome: RunOutcome,
    pub elapsed_ms: u64,
    pub finished_at: DateTime<Utc>,
}
