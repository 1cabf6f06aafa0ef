//! Metadata index
//!
//! Append-only audit trail of (type, timestamp, traffic light) triples that
//! reached storage. Registration is idempotent; rows are removed only by bulk
//! delete per traffic light.

use std::collections::BTreeMap;

use serde::Serialize;
use sqlx::SqlitePool;
use traffic_common::db::MetadataEntry;
use traffic_common::Result;

use crate::models::DataType;

/// Counts over the whole index
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetadataStats {
    pub total_entries: i64,
    pub data_entries: i64,
    pub optimization_entries: i64,
    pub batch_entries: i64,
    pub by_type: BTreeMap<String, i64>,
    pub unique_traffic_lights: i64,
}

#[derive(Clone)]
pub struct MetadataIndex {
    pool: SqlitePool,
}

impl MetadataIndex {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Record a triple; returns `false` when it was already present
    pub async fn register(&self, data_type: &str, timestamp: i64, traffic_light_id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO metadata_index (type, timestamp, traffic_light_id)
            SELECT ?1, ?2, ?3
            WHERE NOT EXISTS (
                SELECT 1 FROM metadata_index
                WHERE type = ?1 AND timestamp = ?2 AND traffic_light_id = ?3
            )
            "#,
        )
        .bind(data_type)
        .bind(timestamp)
        .bind(traffic_light_id)
        .execute(&self.pool)
        .await?;

        let inserted = result.rows_affected() > 0;
        if inserted {
            tracing::debug!(data_type, timestamp, traffic_light_id, "Registered metadata");
        } else {
            tracing::debug!(data_type, timestamp, traffic_light_id, "Metadata already registered");
        }
        Ok(inserted)
    }

    pub async fn list_by_traffic_light(&self, traffic_light_id: &str, limit: i64) -> Result<Vec<MetadataEntry>> {
        let entries = sqlx::query_as::<_, MetadataEntry>(
            r#"
            SELECT id, type, timestamp, traffic_light_id, created_at
            FROM metadata_index
            WHERE traffic_light_id = ?
            ORDER BY timestamp DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(traffic_light_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }

    pub async fn list_by_type(&self, data_type: &str, limit: i64) -> Result<Vec<MetadataEntry>> {
        let entries = sqlx::query_as::<_, MetadataEntry>(
            r#"
            SELECT id, type, timestamp, traffic_light_id, created_at
            FROM metadata_index
            WHERE type = ?
            ORDER BY timestamp DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(data_type)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }

    pub async fn list_recent(&self, limit: i64) -> Result<Vec<MetadataEntry>> {
        let entries = sqlx::query_as::<_, MetadataEntry>(
            r#"
            SELECT id, type, timestamp, traffic_light_id, created_at
            FROM metadata_index
            ORDER BY timestamp DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }

    /// Hard delete; returns the number of rows removed
    pub async fn delete_by_traffic_light(&self, traffic_light_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM metadata_index WHERE traffic_light_id = ?")
            .bind(traffic_light_id)
            .execute(&self.pool)
            .await?;

        let deleted = result.rows_affected();
        tracing::info!(traffic_light_id, deleted, "Deleted metadata entries");
        Ok(deleted)
    }

    pub async fn stats(&self) -> Result<MetadataStats> {
        let total_entries: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM metadata_index")
            .fetch_one(&self.pool)
            .await?;

        let unique_traffic_lights: i64 =
            sqlx::query_scalar("SELECT COUNT(DISTINCT traffic_light_id) FROM metadata_index")
                .fetch_one(&self.pool)
                .await?;

        let by_type: BTreeMap<String, i64> =
            sqlx::query_as::<_, (String, i64)>("SELECT type, COUNT(*) FROM metadata_index GROUP BY type")
                .fetch_all(&self.pool)
                .await?
                .into_iter()
                .collect();

        let count_of = |data_type: DataType| by_type.get(data_type.as_str()).copied().unwrap_or(0);

        Ok(MetadataStats {
            total_entries,
            data_entries: count_of(DataType::Data),
            optimization_entries: count_of(DataType::Optimization),
            batch_entries: count_of(DataType::BatchOptimization),
            unique_traffic_lights,
            by_type,
        })
    }
}
