/*!
Run orchestration

[`ProjectionPipeline`] wires an engine and four store seams into the run
sequence; [`ProjectionPipelineBuilder`] assembles it; [`ProjectionRequest`]
addresses one run.

## Run sequence

```text
acquire collection lock
        |
        v
membership probe ----------------> AlreadyProcessed (memory runs only)
        |
        v
load reducer, plan fit
        |
        v
load candidates -----------------> NoCandidates (nothing embedded)
        |
   [cancel point: "projection"]
        |
        v
fit/transform via the engine
        |
   [cancel point: "persistence"]
        |
        v
save reducer, replace points ----> Projected { .. }
```

Cancellation is honored between stages only; a stage that has started
runs to completion. The reducer save and the point replacement are two
separate store calls, so a crash between them leaves a newer reducer
alongside older points. The next full refit overwrites both; incremental
runs extend the newer reducer, which is the fresher of the two states.
*/

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::engine::{ProjectionEngine, RandomProjectionEngine};
use crate::error::{PipelineError, Result};
use crate::stores::{
    GraphPointSink, MembershipOracle, Reducer, ReducerStore, ReplaceScope, VectorSource,
};
use crate::types::{CollectionName, GraphPoint, MemoryId, ProjectionReport, RunOutcome};

use super::locks::CollectionLocks;
use super::strategy::{self, FitPlan};

// ============================================================================
// Request
// ============================================================================

/// One unit of work: a collection, optionally narrowed to a memory batch.
#[derive(Debug, Clone)]
pub struct ProjectionRequest {
    /// Raw collection name; validated at the start of the run.
    pub collection: String,
    /// Restrict the run to one ingestion batch.
    pub memory_id: Option<MemoryId>,
    /// Checked between stages; cancel to abandon the run early.
    pub cancellation: CancellationToken,
}

impl ProjectionRequest {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            memory_id: None,
            cancellation: CancellationToken::new(),
        }
    }

    /// Narrow the run to one memory batch.
    #[must_use]
    pub fn with_memory_id(mut self, memory_id: MemoryId) -> Self {
        self.memory_id = Some(memory_id);
        self
    }

    /// Attach an external cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Assembles a [`ProjectionPipeline`].
///
/// The engine defaults to [`RandomProjectionEngine`]; the four store seams
/// have no default and must be supplied, either all at once from one
/// backend via [`with_backend`](Self::with_backend) or individually.
#[derive(Default)]
pub struct ProjectionPipelineBuilder {
    engine: Option<Arc<dyn ProjectionEngine>>,
    source: Option<Arc<dyn VectorSource>>,
    reducers: Option<Arc<dyn ReducerStore>>,
    sink: Option<Arc<dyn GraphPointSink>>,
    oracle: Option<Arc<dyn MembershipOracle>>,
    config: PipelineConfig,
}

impl std::fmt::Debug for ProjectionPipelineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectionPipelineBuilder")
            .field("engine", &self.engine.as_ref().map(|e| e.name()))
            .field("source", &self.source.is_some())
            .field("reducers", &self.reducers.is_some())
            .field("sink", &self.sink.is_some())
            .field("oracle", &self.oracle.is_some())
            .field("config", &self.config)
            .finish()
    }
}

impl ProjectionPipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Swap in a different projection engine.
    #[must_use]
    pub fn with_engine(mut self, engine: Arc<dyn ProjectionEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Use one backend for all four store seams.
    #[must_use]
    pub fn with_backend<B>(mut self, backend: B) -> Self
    where
        B: VectorSource + ReducerStore + GraphPointSink + MembershipOracle + Clone + 'static,
    {
        self.source = Some(Arc::new(backend.clone()));
        self.reducers = Some(Arc::new(backend.clone()));
        self.sink = Some(Arc::new(backend.clone()));
        self.oracle = Some(Arc::new(backend));
        self
    }

    #[must_use]
    pub fn with_source(mut self, source: Arc<dyn VectorSource>) -> Self {
        self.source = Some(source);
        self
    }

    #[must_use]
    pub fn with_reducer_store(mut self, reducers: Arc<dyn ReducerStore>) -> Self {
        self.reducers = Some(reducers);
        self
    }

    #[must_use]
    pub fn with_point_sink(mut self, sink: Arc<dyn GraphPointSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    #[must_use]
    pub fn with_oracle(mut self, oracle: Arc<dyn MembershipOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Finish assembly. Fails with `InvalidInput` when a store seam is
    /// missing.
    pub fn build(self) -> Result<ProjectionPipeline> {
        let source = self.source.ok_or_else(|| missing("vector source"))?;
        let reducers = self.reducers.ok_or_else(|| missing("reducer store"))?;
        let sink = self.sink.ok_or_else(|| missing("graph point sink"))?;
        let oracle = self.oracle.ok_or_else(|| missing("membership oracle"))?;
        Ok(ProjectionPipeline {
            engine: self
                .engine
                .unwrap_or_else(|| Arc::new(RandomProjectionEngine::new())),
            source,
            reducers,
            sink,
            oracle,
            config: self.config,
            locks: CollectionLocks::default(),
        })
    }
}

fn missing(seam: &str) -> PipelineError {
    PipelineError::InvalidInput {
        reason: format!("pipeline needs a {seam} (with_backend, or the per-seam setter)"),
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// The projection runner. Cheap to share behind an `Arc`; one instance
/// serializes runs per collection across every caller that clones it.
pub struct ProjectionPipeline {
    engine: Arc<dyn ProjectionEngine>,
    source: Arc<dyn VectorSource>,
    reducers: Arc<dyn ReducerStore>,
    sink: Arc<dyn GraphPointSink>,
    oracle: Arc<dyn MembershipOracle>,
    config: PipelineConfig,
    locks: CollectionLocks,
}

impl std::fmt::Debug for ProjectionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectionPipeline")
            .field("engine", &self.engine.name())
            .field("config", &self.config)
            .finish()
    }
}

impl ProjectionPipeline {
    pub fn builder() -> ProjectionPipelineBuilder {
        ProjectionPipelineBuilder::new()
    }

    /// Whether a run on `collection` currently holds its lock.
    pub fn is_running(&self, collection: &CollectionName) -> bool {
        self.locks.is_locked(collection.as_str())
    }

    /// Execute one projection run. See the module docs for the stage
    /// sequence and cancel points.
    #[instrument(skip(self, request), fields(collection = %request.collection), err)]
    pub async fn run(&self, request: ProjectionRequest) -> Result<ProjectionReport> {
        if self.config.sample_size == 0 {
            return Err(PipelineError::InvalidInput {
                reason: "sample_size must be positive".to_string(),
            });
        }
        let started = Instant::now();
        let run_id = Uuid::new_v4();
        let collection = CollectionName::parse(request.collection.as_str())?;

        let _guard = self.locks.acquire(collection.as_str()).await;

        if let Some(memory_id) = request.memory_id {
            if self.oracle.already_processed(&collection, memory_id).await? {
                info!(%collection, %memory_id, "memory already projected, skipping");
                return Ok(self.report(
                    run_id,
                    &collection,
                    request.memory_id,
                    RunOutcome::AlreadyProcessed,
                    started,
                ));
            }
        }

        let stored = self.reducers.load_reducer(&collection).await?;
        let plan = strategy::plan_fit(stored, request.memory_id, self.config.sample_size);
        let mode = plan.mode();

        let records = match (&plan, request.memory_id) {
            (FitPlan::Incremental(_), Some(memory_id)) => {
                self.source.load_memory(&collection, memory_id).await?
            }
            _ => self.source.load_collection(&collection).await?,
        };
        if records.is_empty() {
            info!(%collection, "no embedded records, nothing to project");
            return Ok(self.report(
                run_id,
                &collection,
                request.memory_id,
                RunOutcome::NoCandidates,
                started,
            ));
        }

        if request.cancellation.is_cancelled() {
            return Err(PipelineError::Cancelled {
                stage: "projection",
            });
        }

        let (records, embedded, reducer, scope) = match plan {
            FitPlan::Incremental(reducer) => {
                let vectors: Vec<Vec<f32>> = records.iter().map(|r| r.vector.clone()).collect();
                let embedded = self.engine.transform(&reducer.model, &vectors).await?;
                let scope = ReplaceScope::Ids(records.iter().map(|r| r.id.clone()).collect());
                (records, embedded, reducer, scope)
            }
            FitPlan::FullRefit => {
                let mut records = records;
                strategy::shuffle_records(&mut records, self.config.shuffle_seed);
                let (sample, remainder) =
                    strategy::split_fit_sample(records, self.config.sample_size);
                let sample_vectors: Vec<Vec<f32>> =
                    sample.iter().map(|r| r.vector.clone()).collect();
                let fitted = self
                    .engine
                    .fit_transform(&self.config.params, &sample_vectors)
                    .await?;
                let mut embedded = fitted.embedded;
                if !remainder.is_empty() {
                    let rest_vectors: Vec<Vec<f32>> =
                        remainder.iter().map(|r| r.vector.clone()).collect();
                    embedded.extend(self.engine.transform(&fitted.model, &rest_vectors).await?);
                }
                let trained_on_count = sample.len();
                let mut records = sample;
                records.extend(remainder);
                let reducer =
                    Reducer::new(fitted.model, trained_on_count, self.config.params.clone());
                (records, embedded, reducer, ReplaceScope::All)
            }
        };

        // Trait-object boundary: a foreign engine could return a short batch.
        if embedded.len() != records.len() {
            return Err(PipelineError::ModelIncompatible {
                reason: format!(
                    "engine returned {} points for {} records",
                    embedded.len(),
                    records.len()
                ),
            });
        }

        if request.cancellation.is_cancelled() {
            return Err(PipelineError::Cancelled {
                stage: "persistence",
            });
        }

        let points: Vec<GraphPoint> = records
            .iter()
            .zip(embedded)
            .map(|(record, point)| GraphPoint {
                id: record.id.clone(),
                graph_name: collection.as_str().to_string(),
                point,
            })
            .collect();

        let trained_on_count = reducer.trained_on_count;
        self.reducers.save_reducer(&collection, &reducer).await?;
        let replaced = self.sink.replace_points(&collection, scope, &points).await?;

        #[cfg(feature = "metrics")]
        {
            let mode_label = match mode {
                crate::types::FitMode::FullRefit => "full_refit",
                crate::types::FitMode::Incremental => "incremental",
            };
            metrics::counter!("vecloom_runs_total", "mode" => mode_label).increment(1);
            metrics::counter!("vecloom_points_projected_total").increment(replaced.inserted);
        }

        info!(
            %collection,
            ?mode,
            projected = replaced.inserted,
            deleted = replaced.deleted,
            trained_on_count,
            "projection run finished"
        );

        Ok(self.report(
            run_id,
            &collection,
            request.memory_id,
            RunOutcome::Projected {
                mode,
                projected: replaced.inserted as usize,
                deleted: replaced.deleted as usize,
                trained_on_count,
            },
            started,
        ))
    }

    fn report(
        &self,
        run_id: Uuid,
        collection: &CollectionName,
        memory_id: Option<MemoryId>,
        outcome: RunOutcome,
        started: Instant,
    ) -> ProjectionReport {
        ProjectionReport {
            run_id,
            collection: collection.clone(),
            memory_id,
            outcome,
            elapsed_ms: started.elapsed().as_millis() as u64,
            finished_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::InMemoryBackend;

    #[test]
    fn build_without_stores_is_rejected() {
        let err = ProjectionPipelineBuilder::new()
            .build()
            .expect_err("must not build");
        assert!(matches!(err, PipelineError::InvalidInput { .. }));
    }

    #[test]
    fn build_with_one_backend_fills_every_seam() {
        let pipeline = ProjectionPipeline::builder()
            .with_backend(InMemoryBackend::new())
            .build()
            .expect("builds");
        let collection = CollectionName::parse("notes").expect("valid");
        assert!(!pipeline.is_running(&collection));
    }

    #[test]
    fn request_builders_compose() {
        let memory = MemoryId::new(9).expect("positive");
        let request = ProjectionRequest::new("notes").with_memory_id(memory);
        assert_eq!(request.collection, "notes");
        assert_eq!(request.memory_id, Some(memory));
        assert!(!request.cancellation.is_cancelled());
    }
}
