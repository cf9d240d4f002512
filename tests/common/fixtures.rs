#![allow(dead_code)]

use vecloom::config::PipelineConfig;
use vecloom::pipeline::ProjectionPipeline;
use vecloom::stores::InMemoryBackend;
use vecloom::types::{CollectionName, EmbeddingRecord, GraphPoint, MemoryId};

pub fn coll(name: &str) -> CollectionName {
    CollectionName::parse(name).expect("valid collection name")
}

pub fn memory(raw: i64) -> MemoryId {
    MemoryId::new(raw).expect("positive memory id")
}

/// Deterministic pseudo-embedding for record `index`, `dim` components wide.
pub fn synthetic_vector(index: usize, dim: usize) -> Vec<f32> {
    (0..dim)
        .map(|component| {
            let cell = (index * 31 + component * 7) % 97;
            (cell as f32) / 97.0 - 0.5
        })
        .collect()
}

/// `count` embedded records named `"{prefix}-{i}"` in `collection`.
pub fn seed_records(
    collection: &str,
    prefix: &str,
    count: usize,
    dim: usize,
) -> Vec<EmbeddingRecord> {
    (0..count)
        .map(|i| {
            EmbeddingRecord::new(
                format!("{prefix}-{i}"),
                collection,
                synthetic_vector(i, dim),
            )
        })
        .collect()
}

/// Same as [`seed_records`], tagged with a memory id.
pub fn seed_memory_records(
    collection: &str,
    prefix: &str,
    count: usize,
    dim: usize,
    memory: MemoryId,
) -> Vec<EmbeddingRecord> {
    seed_records(collection, prefix, count, dim)
        .into_iter()
        .map(|record| record.with_memory_id(memory))
        .collect()
}

pub fn point_ids(points: &[GraphPoint]) -> Vec<String> {
    points.iter().map(|p| p.id.clone()).collect()
}

/// Pipeline over `backend` with a pinned shuffle and `sample_size` cap.
pub fn seeded_pipeline(backend: InMemoryBackend, sample_size: usize) -> ProjectionPipeline {
    ProjectionPipeline::builder()
        .with_backend(backend)
        .with_config(
            PipelineConfig::new()
                .with_sample_size(sample_size)
                .with_shuffle_seed(7),
        )
        .build()
        .expect("pipeline builds")
}
