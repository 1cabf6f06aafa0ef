//! Optimization results returned by the optimization service
//!
//! The service may answer with a single result, a JSON list of results, or a
//! wrapper object holding an `optimizations` list. Storage always receives the
//! wrapper form ([`OptimizationBatch`]).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use traffic_common::{TimestampError, TimestampPolicy, TimestampValue};

use super::envelope::DataType;

/// Congestion level before/after optimization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CongestionCategory {
    None,
    Mild,
    Severe,
}

impl CongestionCategory {
    pub const NAMES: [&'static str; 3] = ["none", "mild", "severe"];
}

/// Suggested signal timing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimizationDetails {
    pub green_time_sec: u32,
    pub red_time_sec: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImpactDetails {
    pub original_congestion: i64,
    pub optimized_congestion: i64,
    pub original_category: CongestionCategory,
    pub optimized_category: CongestionCategory,
}

/// One traffic light's optimization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub version: String,
    #[serde(rename = "type")]
    pub data_type: DataType,
    pub timestamp: TimestampValue,
    pub traffic_light_id: String,
    pub optimization: OptimizationDetails,
    pub impact: ImpactDetails,
}

/// Batch-shaped optimization upload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationBatch {
    pub version: String,
    #[serde(rename = "type")]
    pub data_type: DataType,
    pub timestamp: TimestampValue,
    pub traffic_light_id: String,
    pub optimizations: Vec<OptimizationResult>,
}

impl OptimizationBatch {
    /// Copy with the top-level timestamp converted to Unix seconds
    pub fn for_storage(&self, policy: &TimestampPolicy) -> Result<OptimizationBatch, TimestampError> {
        let (_, unix) = policy.normalize(&self.timestamp)?;
        Ok(OptimizationBatch {
            timestamp: TimestampValue::Unix(unix),
            ..self.clone()
        })
    }
}

/// What the optimization service answered with
#[derive(Debug, Clone, PartialEq)]
pub enum OptimizationResponse {
    Single(OptimizationResult),
    List(Vec<OptimizationResult>),
    Wrapped {
        version: String,
        timestamp: TimestampValue,
        reference_id: String,
        optimizations: Vec<OptimizationResult>,
    },
}

impl OptimizationResponse {
    /// Deserialize an already-validated response
    ///
    /// Wrapper entries that omit `version`, `type` or `timestamp` inherit them
    /// from the wrapper.
    pub fn from_value(response: Value) -> Result<Self, serde_json::Error> {
        match response {
            Value::Array(_) => Ok(OptimizationResponse::List(serde_json::from_value(response)?)),
            Value::Object(mut object) if object.contains_key("optimizations") => {
                let version: String = take_field(&mut object, "version")?;
                let timestamp: TimestampValue = take_field(&mut object, "timestamp")?;
                let reference_id: String = match object.remove("traffic_light_id") {
                    Some(id) => serde_json::from_value(id)?,
                    None => take_field(&mut object, "reference_id")?,
                };

                let entries = match object.remove("optimizations") {
                    Some(Value::Array(entries)) => entries,
                    other => {
                        return Err(serde::de::Error::custom(format!(
                            "optimizations must be a list, got {:?}",
                            other
                        )))
                    }
                };
                let optimizations = entries
                    .into_iter()
                    .map(|entry| inherit_envelope_fields(entry, &version, &timestamp))
                    .map(serde_json::from_value)
                    .collect::<Result<Vec<OptimizationResult>, _>>()?;

                Ok(OptimizationResponse::Wrapped {
                    version,
                    timestamp,
                    reference_id,
                    optimizations,
                })
            }
            other => Ok(OptimizationResponse::Single(serde_json::from_value(other)?)),
        }
    }

    /// Batch-shaped upload form
    ///
    /// Singles and lists take version, timestamp and reference id from their
    /// first result; wrappers keep their own. `None` for an empty list.
    pub fn into_batch(self) -> Option<OptimizationBatch> {
        match self {
            OptimizationResponse::Single(result) => Some(batch_from_results(vec![result])),
            OptimizationResponse::List(results) if results.is_empty() => None,
            OptimizationResponse::List(results) => Some(batch_from_results(results)),
            OptimizationResponse::Wrapped {
                version,
                timestamp,
                reference_id,
                optimizations,
            } => Some(OptimizationBatch {
                version,
                data_type: DataType::Optimization,
                timestamp,
                traffic_light_id: reference_id,
                optimizations,
            }),
        }
    }
}

fn batch_from_results(results: Vec<OptimizationResult>) -> OptimizationBatch {
    let first = &results[0];
    OptimizationBatch {
        version: first.version.clone(),
        data_type: DataType::Optimization,
        timestamp: first.timestamp.clone(),
        traffic_light_id: first.traffic_light_id.clone(),
        optimizations: results,
    }
}

fn take_field<T: serde::de::DeserializeOwned>(
    object: &mut Map<String, Value>,
    name: &'static str,
) -> Result<T, serde_json::Error> {
    let value = object
        .remove(name)
        .ok_or_else(|| <serde_json::Error as serde::de::Error>::missing_field(name))?;
    serde_json::from_value(value)
}

fn inherit_envelope_fields(mut entry: Value, version: &str, timestamp: &TimestampValue) -> Value {
    if let Value::Object(fields) = &mut entry {
        fields
            .entry("version")
            .or_insert_with(|| Value::String(version.to_string()));
        fields
            .entry("type")
            .or_insert_with(|| Value::String(DataType::Optimization.as_str().to_string()));
        if !fields.contains_key("timestamp") {
            if let Ok(value) = serde_json::to_value(timestamp) {
                fields.insert("timestamp".to_string(), value);
            }
        }
    }
    entry
}
