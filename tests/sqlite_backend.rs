use tempfile::TempDir;
use vecloom::config::PipelineConfig;
use vecloom::pipeline::{ProjectionPipeline, ProjectionRequest};
use vecloom::stores::{
    GraphPointSink, MembershipOracle, Reducer, ReducerStore, ReplaceScope, SqliteBackend,
    VectorSource,
};
use vecloom::types::{EmbeddingRecord, FitMode, GraphPoint, RunOutcome};

mod common;
use common::*;

async fn temp_backend() -> (TempDir, SqliteBackend) {
    let dir = TempDir::new().expect("temp dir");
    let url = format!("sqlite://{}/vecloom.db?mode=rwc", dir.path().display());
    let backend = SqliteBackend::connect(&url).await.expect("connect sqlite");
    (dir, backend)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_chunk_roundtrip_excludes_unembedded() {
    let (_dir, backend) = temp_backend().await;
    let mut records = seed_records("notes", "chunk", 6, 8);
    records.push(EmbeddingRecord::new("pending-0", "notes", vec![]));
    backend.insert_records(&records).await.expect("insert");

    let loaded = backend.load_collection(&coll("notes")).await.expect("load");
    assert_eq!(loaded.len(), 6, "unembedded rows stay out of candidate sets");
    assert!(loaded.iter().all(|r| r.vector.len() == 8));

    let mut ids: Vec<_> = loaded.iter().map(|r| r.id.clone()).collect();
    ids.sort();
    assert_eq!(ids[0], "chunk-0");
    assert_eq!(loaded[0].collection, "notes");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shared_chunk_ids_stay_collection_scoped() {
    let (_dir, backend) = temp_backend().await;
    backend
        .insert_records(&seed_records("notes", "chunk", 6, 8))
        .await
        .expect("seed notes");
    backend
        .insert_records(&seed_records("drafts", "chunk", 6, 8))
        .await
        .expect("seed drafts");

    let notes = backend.load_collection(&coll("notes")).await.expect("load");
    let drafts = backend
        .load_collection(&coll("drafts"))
        .await
        .expect("load");
    assert_eq!(notes.len(), 6, "drafts seeding must not displace notes rows");
    assert_eq!(drafts.len(), 6);
    assert!(notes.iter().all(|r| r.collection == "notes"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_memory_scope_filters_rows() {
    let (_dir, backend) = temp_backend().await;
    backend
        .insert_records(&seed_records("notes", "base", 5, 8))
        .await
        .expect("insert base");
    backend
        .insert_records(&seed_memory_records("notes", "batch", 3, 8, memory(7)))
        .await
        .expect("insert batch");

    let batch = backend
        .load_memory(&coll("notes"), memory(7))
        .await
        .expect("load");
    assert_eq!(batch.len(), 3);
    assert!(batch.iter().all(|r| r.memory_id == Some(memory(7))));

    let whole = backend.load_collection(&coll("notes")).await.expect("load");
    assert_eq!(whole.len(), 8);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_reducer_roundtrip_and_delete() {
    let (_dir, backend) = temp_backend().await;
    assert!(
        backend
            .load_reducer(&coll("notes"))
            .await
            .expect("load")
            .is_none()
    );

    let pipeline = ProjectionPipeline::builder()
        .with_backend(backend.clone())
        .build()
        .expect("pipeline builds");
    backend
        .insert_records(&seed_records("notes", "chunk", 12, 8))
        .await
        .expect("insert");
    pipeline
        .run(ProjectionRequest::new("notes"))
        .await
        .expect("run");

    let saved: Reducer = backend
        .load_reducer(&coll("notes"))
        .await
        .expect("load")
        .expect("saved");
    assert_eq!(saved.trained_on_count, 12);
    assert_eq!(saved.model.output_dim, 2);

    // Text column round-trip keeps the reducer bit-identical.
    backend
        .save_reducer(&coll("notes"), &saved)
        .await
        .expect("re-save");
    let reloaded = backend
        .load_reducer(&coll("notes"))
        .await
        .expect("load")
        .expect("still saved");
    assert_eq!(reloaded, saved);

    backend.delete_reducer(&coll("notes")).await.expect("delete");
    assert!(
        backend
            .load_reducer(&coll("notes"))
            .await
            .expect("load")
            .is_none()
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_replace_scopes_and_ordering() {
    let (_dir, backend) = temp_backend().await;
    let points: Vec<GraphPoint> = (0..5)
        .map(|i| GraphPoint {
            id: format!("chunk-{i}"),
            graph_name: "notes".into(),
            point: vec![i as f32, -(i as f32)],
        })
        .collect();

    let outcome = backend
        .replace_points(&coll("notes"), ReplaceScope::All, &points)
        .await
        .expect("replace all");
    assert_eq!(outcome.deleted, 0);
    assert_eq!(outcome.inserted, 5);

    // Scoped replace touches only the named ids.
    let moved = vec![GraphPoint {
        id: "chunk-2".into(),
        graph_name: "notes".into(),
        point: vec![9.0, 9.0],
    }];
    let outcome = backend
        .replace_points(
            &coll("notes"),
            ReplaceScope::Ids(vec!["chunk-2".into()]),
            &moved,
        )
        .await
        .expect("replace ids");
    assert_eq!(outcome.deleted, 1);
    assert_eq!(outcome.inserted, 1);

    let listed = backend.list_points(&coll("notes")).await.expect("list");
    assert_eq!(listed.len(), 5);
    assert_eq!(point_ids(&listed), vec![
        "chunk-0", "chunk-1", "chunk-2", "chunk-3", "chunk-4"
    ]);
    assert_eq!(listed[2].point, vec![9.0, 9.0]);

    let outcome = backend
        .replace_points(&coll("notes"), ReplaceScope::All, &[])
        .await
        .expect("wipe");
    assert_eq!(outcome.deleted, 5);
    assert!(
        backend
            .list_points(&coll("notes"))
            .await
            .expect("list")
            .is_empty()
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_membership_joins_chunks_to_points() {
    let (_dir, backend) = temp_backend().await;
    backend
        .insert_records(&seed_memory_records("notes", "batch", 2, 8, memory(4)))
        .await
        .expect("insert");
    assert!(
        !backend
            .already_processed(&coll("notes"), memory(4))
            .await
            .expect("probe"),
        "no points yet"
    );

    let point = GraphPoint {
        id: "batch-0".into(),
        graph_name: "notes".into(),
        point: vec![0.5, -0.5],
    };
    backend
        .replace_points(&coll("notes"), ReplaceScope::All, &[point])
        .await
        .expect("insert point");

    assert!(
        backend
            .already_processed(&coll("notes"), memory(4))
            .await
            .expect("probe")
    );
    assert!(
        !backend
            .already_processed(&coll("notes"), memory(5))
            .await
            .expect("probe"),
        "other memories stay unprocessed"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_pipeline_end_to_end_on_sqlite() {
    let (_dir, backend) = temp_backend().await;
    backend
        .insert_records(&seed_records("notes", "base", 40, 8))
        .await
        .expect("seed");

    let pipeline = ProjectionPipeline::builder()
        .with_backend(backend.clone())
        .with_config(
            PipelineConfig::new()
                .with_sample_size(32)
                .with_shuffle_seed(7),
        )
        .build()
        .expect("pipeline builds");

    let report = pipeline
        .run(ProjectionRequest::new("notes"))
        .await
        .expect("full refit");
    match report.outcome {
        RunOutcome::Projected {
            mode,
            projected,
            trained_on_count,
            ..
        } => {
            assert_eq!(mode, FitMode::FullRefit);
            assert_eq!(projected, 40);
            assert_eq!(trained_on_count, 32);
        }
        other => panic!("expected Projected, got {other:?}"),
    }

    backend
        .insert_records(&seed_memory_records("notes", "batch", 6, 8, memory(3)))
        .await
        .expect("seed batch");
    let report = pipeline
        .run(ProjectionRequest::new("notes").with_memory_id(memory(3)))
        .await
        .expect("incremental");
    match report.outcome {
        RunOutcome::Projected {
            mode, projected, ..
        } => {
            assert_eq!(mode, FitMode::Incremental);
            assert_eq!(projected, 6);
        }
        other => panic!("expected Projected, got {other:?}"),
    }
    assert_eq!(
        backend.list_points(&coll("notes")).await.expect("list").len(),
        46
    );

    let report = pipeline
        .run(ProjectionRequest::new("notes").with_memory_id(memory(3)))
        .await
        .expect("rerun");
    assert_eq!(report.outcome, RunOutcome::AlreadyProcessed);
}
