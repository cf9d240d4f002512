//! # Vecloom: Incremental Embedding Projection
//!
//! Vecloom projects per-collection embedding vectors down to low-dimensional
//! points for visualization, keeping a persisted, reusable reducer per
//! collection and choosing between a full refit and an incremental transform
//! on every run.
//!
//! ## Core Concepts
//!
//! - **Records**: Embedded chunks loaded from a vector source
//! - **Reducer**: The fitted projection model persisted per collection
//! - **Fit plan**: Full refit vs incremental transform, decided per run
//! - **Graph points**: Projected coordinates, replaced atomically in the sink
//! - **Pipeline**: Serialized per-collection runs with cancel points
//!
//! ## Quick Start
//!
//! ### Working with Records
//!
//! Records carry the embedding and, when the chunk arrived through an
//! ingestion batch, its memory id:
//!
//! ```
//! use vecloom::types::{EmbeddingRecord, MemoryId};
//!
//! let memory = MemoryId::new(42).expect("positive id");
//! let record = EmbeddingRecord::new("chunk-1", "notes", vec![0.1, 0.2, 0.3])
//!     .with_memory_id(memory);
//!
//! assert_eq!(record.memory_id, Some(memory));
//! // An empty vector marks a chunk that has not been embedded yet.
//! assert!(EmbeddingRecord::new("chunk-2", "notes", vec![]).vector.is_empty());
//! ```
//!
//! ### Running a Projection
//!
//! ```no_run
//! use vecloom::pipeline::{ProjectionPipeline, ProjectionRequest};
//! use vecloom::stores::{GraphPointSink, InMemoryBackend};
//! use vecloom::types::{CollectionName, EmbeddingRecord};
//!
//! #[tokio::main]
//! async fn main() -> miette::Result<()> {
//!     let backend = InMemoryBackend::new();
//!     let records: Vec<EmbeddingRecord> = (0..64)
//!         .map(|i| {
//!             EmbeddingRecord::new(
//!                 format!("chunk-{i}"),
//!                 "notes",
//!                 vec![i as f32, 1.0, -0.5, 0.25],
//!             )
//!         })
//!         .collect();
//!     backend.insert_records(&records).await?;
//!
//!     let pipeline = ProjectionPipeline::builder()
//!         .with_backend(backend.clone())
//!         .build()?;
//!     let report = pipeline.run(ProjectionRequest::new("notes")).await?;
//!     println!("run {} finished: {:?}", report.run_id, report.outcome);
//!
//!     let collection: CollectionName = "notes".try_into()?;
//!     let points = backend.list_points(&collection).await?;
//!     assert_eq!(points.len(), 64);
//!     Ok(())
//! }
//! ```
//!
//! ### Tuning
//!
//! ```
//! use vecloom::config::{PipelineConfig, ProjectionParams};
//!
//! let config = PipelineConfig::new()
//!     .with_sample_size(500)
//!     .with_params(ProjectionParams::default().with_n_neighbors(30))
//!     .with_shuffle_seed(7);
//!
//! assert_eq!(config.sample_size, 500);
//! ```
//!
//! ## Error Handling
//!
//! Every fallible operation surfaces a [`error::PipelineError`] with a
//! diagnostic code and help text; store and engine errors are folded into
//! the same taxonomy at the pipeline boundary:
//!
//! ```
//! use vecloom::error::PipelineError;
//! use vecloom::types::MemoryId;
//!
//! let err = MemoryId::parse("zero-is-not-an-id").unwrap_err();
//! assert!(matches!(err, PipelineError::InvalidInput { .. }));
//! ```
//!
//! ## Module Guide
//!
//! - [`types`] - Collection names, memory ids, records, points, run reports
//! - [`config`] - Projection hyperparameters and pipeline tuning
//! - [`error`] - The pipeline error taxonomy
//! - [`engine`] - Dimensionality-reduction seam and the built-in engine
//! - [`stores`] - Store traits plus in-memory, SQLite, and Postgres backends
//! - [`pipeline`] - Run orchestration: strategy, serialization, the runner

pub mod config;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod stores;
pub mod types;
