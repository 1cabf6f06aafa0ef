//! Database models

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// One row of `metadata_index`
///
/// Records that a payload of `data_type` for `traffic_light_id` at
/// `timestamp` (Unix seconds) made it into storage. Never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct MetadataEntry {
    pub id: i64,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub data_type: String,
    pub timestamp: i64,
    pub traffic_light_id: String,
    pub created_at: Option<NaiveDateTime>,
}
