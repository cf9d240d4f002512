/*!
SQLite backend

Implements the four store traits on a shared `SqlitePool`. Suits single-node
deployments and CI; Postgres mirrors the same schema for shared ones.

## Behavior

- When the `sqlite-migrations` feature is enabled (default), embedded
  migrations (`sqlx::migrate!("./migrations")`) run on connect; disabling
  the feature assumes external migration orchestration.
- Point replacement executes delete and insert in one transaction, so
  readers never observe the gap between them.
- Embedding columns decode strictly through
  [`crate::stores::vector_codec`]; one malformed row fails the load.

## Database Schema

- `collection_chunks.(id, collection_name)` ← composite key; record ids are
  unique within their collection, not globally
- `collection_chunks.memory_id` ← nullable ingestion batch id
- `collection_chunks.embedding_{1536,768,384}` ← delimited-text vectors,
  one tier populated per row; loads take the widest present
  (`COALESCE(embedding_1536, embedding_768, embedding_384)`)
- `reducers.collection_name` ← one fitted reducer per collection
- `reducers.model_json` / `params_json` ← serialized envelope and params
- `graph_points.(id, graph_name)` ← composite key, one point per record
  per graph; `point_json` holds the projected coordinates
*/

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tracing::instrument;

use super::{
    GraphPointSink, MembershipOracle, Reducer, ReducerStore, ReplaceOutcome, ReplaceScope, Result,
    StoreError, VectorSource, decode_vector, encode_vector,
};
use crate::engine::ReducerModel;
use crate::types::{CollectionName, EmbeddingRecord, GraphPoint, MemoryId};

/// SQLite's default bind-parameter budget is ~1000; deletes chunk well
/// below it.
const DELETE_CHUNK: usize = 500;

/// SQLite-backed store for chunks, reducers, and graph points.
#[derive(Clone)]
pub struct SqliteBackend {
    /// Shared pool; clones reuse it.
    pool: Arc<SqlitePool>,
}

impl std::fmt::Debug for SqliteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteBackend").finish()
    }
}

impl SqliteBackend {
    /// Connect (or create) a SQLite database at `database_url`.
    /// Example URL: `"sqlite://vecloom.db?mode=rwc"`.
    #[must_use = "backend must be used to persist pipeline state"]
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(database_url)
            .await
            .map_err(|e| StoreError::Backend {
                message: format!("connect error: {e}"),
            })?;
        // Run embedded migrations only if the feature is enabled (idempotent).
        #[cfg(feature = "sqlite-migrations")]
        {
            if let Err(e) = sqlx::migrate!("./migrations").run(&pool).await {
                return Err(StoreError::Backend {
                    message: format!("migration failure: {e}"),
                });
            }
        }
        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    /// Insert or overwrite embedded records (ingestion-side helper).
    ///
    /// The vector lands in the tier column matching its width; widths off
    /// the tier grid use the narrowest column. Loads coalesce the tiers, so
    /// the column choice never changes read semantics. An empty vector
    /// stores NULL in every tier (row present, not yet embedded).
    #[instrument(skip(self, records), err)]
    pub async fn insert_records(&self, records: &[EmbeddingRecord]) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(|e| StoreError::Backend {
            message: format!("tx begin: {e}"),
        })?;

        for record in records {
            let (wide, mid, narrow) = tier_columns(&record.vector);
            sqlx::query(
                r#"
                INSERT OR REPLACE INTO collection_chunks
                    (id, collection_name, memory_id, embedding_1536, embedding_768, embedding_384)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            )
            .bind(&record.id)
            .bind(&record.collection)
            .bind(record.memory_id.map(MemoryId::get))
            .bind(&wide)
            .bind(&mid)
            .bind(&narrow)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Backend {
                message: format!("insert chunk: {e}"),
            })?;
        }

        tx.commit().await.map_err(|e| StoreError::Backend {
            message: format!("tx commit: {e}"),
        })?;
        Ok(())
    }

    async fn load_where(
        &self,
        collection: &CollectionName,
        memory_id: Option<MemoryId>,
    ) -> Result<Vec<EmbeddingRecord>> {
        let base = r#"
            SELECT
                id,
                collection_name,
                memory_id,
                COALESCE(embedding_1536, embedding_768, embedding_384) AS embedding
            FROM collection_chunks
            WHERE collection_name = ?1
              AND COALESCE(embedding_1536, embedding_768, embedding_384) IS NOT NULL
        "#;
        let rows = match memory_id {
            Some(memory_id) => {
                let sql = format!("{base} AND memory_id = ?2");
                sqlx::query(&sql)
                    .bind(collection.as_str())
                    .bind(memory_id.get())
                    .fetch_all(&*self.pool)
                    .await
            }
            None => {
                sqlx::query(base)
                    .bind(collection.as_str())
                    .fetch_all(&*self.pool)
                    .await
            }
        }
        .map_err(|e| StoreError::Backend {
            message: format!("select chunks: {e}"),
        })?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let embedding: String = row.get("embedding");
            let memory_raw: Option<i64> =
                row.try_get("memory_id").map_err(|e| StoreError::Backend {
                    message: format!("memory_id read: {e}"),
                })?;
            records.push(EmbeddingRecord {
                id: row.get("id"),
                collection: row.get("collection_name"),
                vector: decode_vector(&embedding)?,
                memory_id: memory_raw.and_then(MemoryId::new),
            });
        }
        Ok(records)
    }
}

/// Route a vector into its tier column: `(1536, 768, 384)`.
fn tier_columns(vector: &[f32]) -> (Option<String>, Option<String>, Option<String>) {
    if vector.is_empty() {
        return (None, None, None);
    }
    let encoded = encode_vector(vector);
    match vector.len() {
        1536 => (Some(encoded), None, None),
        768 => (None, Some(encoded), None),
        _ => (None, None, Some(encoded)),
    }
}

#[async_trait]
impl VectorSource for SqliteBackend {
    #[instrument(skip(self), err)]
    async fn load_collection(
        &self,
        collection: &CollectionName,
    ) -> Result<Vec<EmbeddingRecord>> {
        self.load_where(collection, None).await
    }

    #[instrument(skip(self), err)]
    async fn load_memory(
        &self,
        collection: &CollectionName,
        memory_id: MemoryId,
    ) -> Result<Vec<EmbeddingRecord>> {
        self.load_where(collection, Some(memory_id)).await
    }
}

#[async_trait]
impl ReducerStore for SqliteBackend {
    #[instrument(skip(self), err)]
    async fn load_reducer(&self, collection: &CollectionName) -> Result<Option<Reducer>> {
        let row_opt = sqlx::query(
            r#"
            SELECT model_json, trained_on_count, params_json, fitted_at
            FROM reducers
            WHERE collection_name = ?1
            "#,
        )
        .bind(collection.as_str())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| StoreError::Backend {
            message: format!("select reducer: {e}"),
        })?;

        let row = match row_opt {
            Some(row) => row,
            None => return Ok(None),
        };

        let model_json: String = row.get("model_json");
        let model: ReducerModel =
            serde_json::from_str(&model_json).map_err(|e| StoreError::CorruptReducer {
                collection: collection.as_str().to_string(),
                reason: format!("model_json: {e}"),
            })?;
        let params_json: String = row.get("params_json");
        let params =
            serde_json::from_str(&params_json).map_err(|e| StoreError::CorruptReducer {
                collection: collection.as_str().to_string(),
                reason: format!("params_json: {e}"),
            })?;
        let trained_on_count: i64 = row.get("trained_on_count");
        let fitted_at_raw: String = row.get("fitted_at");
        let fitted_at = DateTime::parse_from_rfc3339(&fitted_at_raw)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        Ok(Some(Reducer {
            model,
            trained_on_count: trained_on_count as usize,
            params,
            fitted_at,
        }))
    }

    #[instrument(skip(self, reducer), err)]
    async fn save_reducer(&self, collection: &CollectionName, reducer: &Reducer) -> Result<()> {
        let model_json =
            serde_json::to_string(&reducer.model).map_err(|e| StoreError::Backend {
                message: format!("model encode: {e}"),
            })?;
        let params_json =
            serde_json::to_string(&reducer.params).map_err(|e| StoreError::Backend {
                message: format!("params encode: {e}"),
            })?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO reducers
                (collection_name, model_json, trained_on_count, params_json, fitted_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(collection.as_str())
        .bind(&model_json)
        .bind(reducer.trained_on_count as i64)
        .bind(&params_json)
        .bind(reducer.fitted_at.to_rfc3339())
        .execute(&*self.pool)
        .await
        .map_err(|e| StoreError::Backend {
            message: format!("save reducer: {e}"),
        })?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn delete_reducer(&self, collection: &CollectionName) -> Result<()> {
        sqlx::query("DELETE FROM reducers WHERE collection_name = ?1")
            .bind(collection.as_str())
            .execute(&*self.pool)
            .await
            .map_err(|e| StoreError::Backend {
                message: format!("delete reducer: {e}"),
            })?;
        Ok(())
    }
}

#[async_trait]
impl GraphPointSink for SqliteBackend {
    #[instrument(skip(self, scope, points), err)]
    async fn replace_points(
        &self,
        graph: &CollectionName,
        scope: ReplaceScope,
        points: &[GraphPoint],
    ) -> Result<ReplaceOutcome> {
        let mut tx = self.pool.begin().await.map_err(|e| StoreError::Backend {
            message: format!("tx begin: {e}"),
        })?;

        let mut deleted = 0u64;
        match scope {
            ReplaceScope::All => {
                let result = sqlx::query("DELETE FROM graph_points WHERE graph_name = ?1")
                    .bind(graph.as_str())
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| StoreError::Backend {
                        message: format!("delete graph: {e}"),
                    })?;
                deleted = result.rows_affected();
            }
            ReplaceScope::Ids(ids) => {
                for chunk in ids.chunks(DELETE_CHUNK) {
                    let placeholders = vec!["?"; chunk.len()].join(", ");
                    let sql = format!(
                        "DELETE FROM graph_points WHERE graph_name = ? AND id IN ({placeholders})"
                    );
                    let mut query = sqlx::query(&sql).bind(graph.as_str());
                    for id in chunk {
                        query = query.bind(id);
                    }
                    let result =
                        query
                            .execute(&mut *tx)
                            .await
                            .map_err(|e| StoreError::Backend {
                                message: format!("delete points: {e}"),
                            })?;
                    deleted += result.rows_affected();
                }
            }
        }

        for point in points {
            sqlx::query(
                r#"
                INSERT OR REPLACE INTO graph_points (id, graph_name, point_json)
                VALUES (?1, ?2, ?3)
            "#,
            )
            .bind(&point.id)
            .bind(graph.as_str())
            .bind(encode_vector(&point.point))
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Backend {
                message: format!("insert point: {e}"),
            })?;
        }

        tx.commit().await.map_err(|e| StoreError::Backend {
            message: format!("tx commit: {e}"),
        })?;

        Ok(ReplaceOutcome {
            deleted,
            inserted: points.len() as u64,
        })
    }

    #[instrument(skip(self), err)]
    async fn list_points(&self, graph: &CollectionName) -> Result<Vec<GraphPoint>> {
        let rows = sqlx::query(
            r#"
            SELECT id, graph_name, point_json
            FROM graph_points
            WHERE graph_name = ?1
            ORDER BY id
            "#,
        )
        .bind(graph.as_str())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| StoreError::Backend {
            message: format!("select points: {e}"),
        })?;

        let mut points = Vec::with_capacity(rows.len());
        for row in rows {
            let point_json: String = row.get("point_json");
            points.push(GraphPoint {
                id: row.get("id"),
                graph_name: row.get("graph_name"),
                point: decode_vector(&point_json)?,
            });
        }
        Ok(points)
    }
}

#[async_trait]
impl MembershipOracle for SqliteBackend {
    #[instrument(skip(self), err)]
    async fn already_processed(
        &self,
        collection: &CollectionName,
        memory_id: MemoryId,
    ) -> Result<bool> {
        let exists: i64 = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1
                FROM collection_chunks c
                JOIN graph_points p
                  ON p.id = c.id AND p.graph_name = c.collection_name
                WHERE c.collection_name = ?1 AND c.memory_id = ?2
            )
            "#,
        )
        .bind(collection.as_str())
        .bind(memory_id.get())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| StoreError::Backend {
            message: format!("membership probe: {e}"),
        })?;
        Ok(exists != 0)
    }
}
