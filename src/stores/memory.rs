//! In-memory backend.
//!
//! Implements all four store traits on hash tables behind one async
//! `RwLock`. Nothing survives a restart and nothing is visible to other
//! processes, so this backend suits tests and single-process hosts; shared
//! deployments want [`crate::stores::sqlite`] or
//! [`crate::stores::postgres`].
//!
//! Cloning is cheap and every clone shares the same tables.

use std::sync::Arc;

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use tokio::sync::RwLock;

use super::{
    GraphPointSink, MembershipOracle, Reducer, ReducerStore, ReplaceOutcome, ReplaceScope, Result,
    VectorSource,
};
use crate::types::{CollectionName, EmbeddingRecord, GraphPoint, MemoryId};

#[derive(Default)]
struct Tables {
    /// (collection, chunk id) -> record. Ids are only unique within their
    /// collection; the SQL schemas key chunks the same way.
    records: FxHashMap<(String, String), EmbeddingRecord>,
    /// Collection -> fitted reducer.
    reducers: FxHashMap<String, Reducer>,
    /// (graph, point id) -> point.
    points: FxHashMap<(String, String), GraphPoint>,
}

/// Volatile backend for tests and single-process hosts.
#[derive(Clone, Default)]
pub struct InMemoryBackend {
    inner: Arc<RwLock<Tables>>,
}

impl std::fmt::Debug for InMemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBackend").finish()
    }
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite embedded records (ingestion-side helper).
    ///
    /// A record with an empty vector counts as not yet embedded and is
    /// excluded from candidate loads.
    pub async fn insert_records(&self, records: &[EmbeddingRecord]) -> Result<()> {
        let mut tables = self.inner.write().await;
        for record in records {
            tables.records.insert(
                (record.collection.clone(), record.id.clone()),
                record.clone(),
            );
        }
        Ok(())
    }

    /// Drop every record of a collection. Points and the reducer stay.
    pub async fn clear_collection(&self, collection: &CollectionName) -> Result<()> {
        let mut tables = self.inner.write().await;
        tables
            .records
            .retain(|(owner, _), _| owner != collection.as_str());
        Ok(())
    }
}

#[async_trait]
impl VectorSource for InMemoryBackend {
    async fn load_collection(
        &self,
        collection: &CollectionName,
    ) -> Result<Vec<EmbeddingRecord>> {
        let tables = self.inner.read().await;
        Ok(tables
            .records
            .values()
            .filter(|record| {
                record.collection == collection.as_str() && !record.vector.is_empty()
            })
            .cloned()
            .collect())
    }

    async fn load_memory(
        &self,
        collection: &CollectionName,
        memory_id: MemoryId,
    ) -> Result<Vec<EmbeddingRecord>> {
        let tables = self.inner.read().await;
        Ok(tables
            .records
            .values()
            .filter(|record| {
                record.collection == collection.as_str()
                    && record.memory_id == Some(memory_id)
                    && !record.vector.is_empty()
            })
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ReducerStore for InMemoryBackend {
    async fn load_reducer(&self, collection: &CollectionName) -> Result<Option<Reducer>> {
        let tables = self.inner.read().await;
        Ok(tables.reducers.get(collection.as_str()).cloned())
    }

    async fn save_reducer(&self, collection: &CollectionName, reducer: &Reducer) -> Result<()> {
        let mut tables = self.inner.write().await;
        tables
            .reducers
            .insert(collection.as_str().to_string(), reducer.clone());
        Ok(())
    }

    async fn delete_reducer(&self, collection: &CollectionName) -> Result<()> {
        let mut tables = self.inner.write().await;
        tables.reducers.remove(collection.as_str());
        Ok(())
    }
}

#[async_trait]
impl GraphPointSink for InMemoryBackend {
    async fn replace_points(
        &self,
        graph: &CollectionName,
        scope: ReplaceScope,
        points: &[GraphPoint],
    ) -> Result<ReplaceOutcome> {
        // One write guard spans delete and insert.
        let mut tables = self.inner.write().await;
        let deleted = match scope {
            ReplaceScope::Ids(ids) => ids
                .iter()
                .filter(|id| {
                    tables
                        .points
                        .remove(&(graph.as_str().to_string(), (*id).clone()))
                        .is_some()
                })
                .count() as u64,
            ReplaceScope::All => {
                let before = tables.points.len();
                tables.points.retain(|(g, _), _| g != graph.as_str());
                (before - tables.points.len()) as u64
            }
        };
        for point in points {
            tables.points.insert(
                (graph.as_str().to_string(), point.id.clone()),
                point.clone(),
            );
        }
        Ok(ReplaceOutcome {
            deleted,
            inserted: points.len() as u64,
        })
    }

    async fn list_points(&self, graph: &CollectionName) -> Result<Vec<GraphPoint>> {
        let tables = self.inner.read().await;
        let mut points: Vec<GraphPoint> = tables
            .points
            .iter()
            .filter(|((g, _), _)| g == graph.as_str())
            .map(|(_, point)| point.clone())
            .collect();
        points.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(points)
    }
}

#[async_trait]
impl MembershipOracle for InMemoryBackend {
    async fn already_processed(
        &self,
        collection: &CollectionName,
        memory_id: MemoryId,
    ) -> Result<bool> {
        let tables = self.inner.read().await;
        Ok(tables.records.values().any(|record| {
            record.collection == collection.as_str()
                && record.memory_id == Some(memory_id)
                && tables
                    .points
                    .contains_key(&(collection.as_str().to_string(), record.id.clone()))
        }))
    }
}
