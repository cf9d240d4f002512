//! Quickstart: Projecting a Collection
//!
//! This demonstration walks the full projection lifecycle on the in-memory
//! backend. It covers seeding embedded chunks, a capped full refit, an
//! incremental memory batch, idempotent re-runs, and reading points back.
//!
//! What You'll Learn:
//! 1. Seeding: Inserting embedded records into a backend
//! 2. Full Refit: Fitting a fresh reducer over a shuffled, capped sample
//! 3. Incremental Runs: Extending a stable reducer with one memory batch
//! 4. Idempotence: Re-running a processed memory is a no-op
//! 5. Reading Back: Listing projected points for the canvas
//!
//! Running This Demo:
//! ```bash
//! cargo run --example quickstart
//! ```

use miette::Result;
use tracing::info;
use tracing_error::ErrorLayer;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use vecloom::config::PipelineConfig;
use vecloom::pipeline::{ProjectionPipeline, ProjectionRequest};
use vecloom::stores::{GraphPointSink, InMemoryBackend};
use vecloom::types::{CollectionName, EmbeddingRecord, MemoryId, RunOutcome};

/// Deterministic stand-in for a real embedding model.
fn synthetic_vector(index: usize, dim: usize) -> Vec<f32> {
    (0..dim)
        .map(|component| {
            let cell = (index * 31 + component * 7) % 97;
            (cell as f32) / 97.0 - 0.5
        })
        .collect()
}

fn seed_records(prefix: &str, count: usize) -> Vec<EmbeddingRecord> {
    (0..count)
        .map(|i| EmbeddingRecord::new(format!("{prefix}-{i}"), "notes", synthetic_vector(i, 8)))
        .collect()
}

fn init_tracing() {
    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_file(false)
        .with_line_number(false)
        // Log when spans are created/closed so we see instrumented async boundaries
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE);

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(ErrorLayer::default())
        .init();
}

fn init_miette() {
    // Pretty panic reports
    miette::set_panic_hook();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_miette();
    demo().await
}

async fn demo() -> Result<()> {
    info!("\n╔══════════════════════════════════════════════════════════╗");
    info!("║                    Vecloom Quickstart                    ║");
    info!("║           Projection Lifecycle on One Collection         ║");
    info!("╚══════════════════════════════════════════════════════════╝\n");

    info!("📦 Step 1: Seeding 64 embedded chunks into `notes`");
    let backend = InMemoryBackend::new();
    backend.insert_records(&seed_records("chunk", 64)).await?;
    info!("   ✓ 64 chunks inserted (8-dimensional synthetic embeddings)");

    info!("\n🗺️ Step 2: Full refit with a fit-sample cap of 48");
    let pipeline = ProjectionPipeline::builder()
        .with_backend(backend.clone())
        .with_config(
            PipelineConfig::new()
                .with_sample_size(48)
                .with_shuffle_seed(7),
        )
        .build()?;

    let report = pipeline.run(ProjectionRequest::new("notes")).await?;
    info!(
        "   ✓ Run {} finished in {}ms",
        report.run_id, report.elapsed_ms
    );
    if let RunOutcome::Projected {
        mode,
        projected,
        trained_on_count,
        ..
    } = &report.outcome
    {
        info!(
            "   ✓ Mode: {mode:?}, projected {projected} points, reducer trained on {trained_on_count}"
        );
    }

    info!("\n➕ Step 3: Ingesting memory batch 7 and extending incrementally");
    let memory = MemoryId::new(7).expect("positive id");
    let batch: Vec<EmbeddingRecord> = (64..72)
        .map(|i| {
            EmbeddingRecord::new(format!("chunk-{i}"), "notes", synthetic_vector(i, 8))
                .with_memory_id(memory)
        })
        .collect();
    backend.insert_records(&batch).await?;

    let report = pipeline
        .run(ProjectionRequest::new("notes").with_memory_id(memory))
        .await?;
    info!("   ✓ Outcome: {:?}", report.outcome);

    info!("\n🔁 Step 4: Re-running memory 7 (already projected)");
    let report = pipeline
        .run(ProjectionRequest::new("notes").with_memory_id(memory))
        .await?;
    assert_eq!(report.outcome, RunOutcome::AlreadyProcessed);
    info!(
        "   ✓ Outcome: {:?} (no-op: {})",
        report.outcome,
        report.outcome.is_noop()
    );

    info!("\n🖼️ Step 5: Reading projected points back for the canvas");
    let collection: CollectionName = "notes".try_into()?;
    let points = backend.list_points(&collection).await?;
    info!("   ✓ {} points stored", points.len());
    for point in points.iter().take(3) {
        info!(
            "   ✓ {} -> ({:.3}, {:.3})",
            point.id, point.point[0], point.point[1]
        );
    }

    info!("\n╔══════════════════════════════════════════════════════════╗");
    info!("║                   Quickstart Complete                    ║");
    info!("╚══════════════════════════════════════════════════════════╝");
    Ok(())
}
