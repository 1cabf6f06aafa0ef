//! Traffic data envelopes
//!
//! Two shapes arrive at the ingress boundary: the batch form carrying a
//! `sensors` list and the legacy form with one sensor's fields inline. Both
//! resolve into [`TrafficEnvelope`], which is always batch-shaped and carries a
//! canonical ISO timestamp.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use traffic_common::{TimestampError, TimestampPolicy, TimestampValue};

/// Version stamped on envelopes this service produces itself
pub const TARGET_VERSION: &str = "2.0";

/// Vehicle classes every canonical `vehicle_stats` block carries
pub const VEHICLE_CLASSES: [&str; 4] = ["motorcycle", "car", "bus", "truck"];

/// Inline fields that identify a legacy single-sensor payload
const LEGACY_SENSOR_FIELDS: [&str; 3] = ["controlled_edges", "metrics", "vehicle_stats"];

/// Envelope discriminant (`type` on the wire)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DataType {
    Data,
    Optimization,
    BatchOptimization,
}

impl DataType {
    pub const ALL: [DataType; 3] = [
        DataType::Data,
        DataType::Optimization,
        DataType::BatchOptimization,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Data => "data",
            DataType::Optimization => "optimization",
            DataType::BatchOptimization => "batch-optimization",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DataType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown data type '{}'", s))
    }
}

/// Per-sensor traffic metrics; density is always 0-1 in canonical form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficMetrics {
    pub vehicles_per_minute: u32,
    pub avg_speed_kmh: f64,
    pub avg_circulation_time_sec: f64,
    pub density: f64,
}

/// Vehicle counts by class
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleStats {
    pub motorcycle: u32,
    pub car: u32,
    pub bus: u32,
    pub truck: u32,
}

/// One sensor's reading inside a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub traffic_light_id: String,
    pub controlled_edges: Vec<String>,
    pub metrics: TrafficMetrics,
    pub vehicle_stats: VehicleStats,
}

/// Canonical envelope used inside the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficEnvelope {
    pub version: String,
    #[serde(rename = "type")]
    pub data_type: DataType,
    /// Canonical `YYYY-MM-DDTHH:MM:SSZ`
    pub timestamp: String,
    /// Reference id; always one of the sensor ids
    pub traffic_light_id: String,
    pub sensors: Vec<SensorReading>,
}

impl TrafficEnvelope {
    pub fn sensor_ids(&self) -> impl Iterator<Item = &str> {
        self.sensors.iter().map(|s| s.traffic_light_id.as_str())
    }

    /// Storage wire form with the timestamp as Unix seconds
    pub fn to_storage(&self, unix_timestamp: i64) -> StoredDataEnvelope {
        StoredDataEnvelope {
            version: self.version.clone(),
            data_type: self.data_type,
            timestamp: TimestampValue::Unix(unix_timestamp),
            traffic_light_id: self.traffic_light_id.clone(),
            sensors: self.sensors.clone(),
        }
    }
}

/// Batch envelope as exchanged with the storage service
///
/// Uploads always carry a Unix timestamp; downloads are read with either
/// representation tolerated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDataEnvelope {
    pub version: String,
    #[serde(rename = "type")]
    pub data_type: DataType,
    pub timestamp: TimestampValue,
    pub traffic_light_id: String,
    pub sensors: Vec<SensorReading>,
}

impl StoredDataEnvelope {
    pub fn into_canonical(self, policy: &TimestampPolicy) -> Result<TrafficEnvelope, TimestampError> {
        let (timestamp, _) = policy.normalize(&self.timestamp)?;
        Ok(TrafficEnvelope {
            version: self.version,
            data_type: self.data_type,
            timestamp,
            traffic_light_id: self.traffic_light_id,
            sensors: self.sensors,
        })
    }
}

/// Batch ingress form
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BatchEnvelope {
    pub version: String,
    #[serde(rename = "type")]
    pub data_type: DataType,
    pub timestamp: TimestampValue,
    pub traffic_light_id: String,
    pub sensors: Vec<SensorReading>,
}

/// Legacy single-sensor ingress form
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LegacyEnvelope {
    pub version: String,
    #[serde(rename = "type")]
    pub data_type: DataType,
    pub timestamp: TimestampValue,
    pub traffic_light_id: String,
    pub controlled_edges: Vec<String>,
    pub metrics: TrafficMetrics,
    pub vehicle_stats: VehicleStats,
}

impl LegacyEnvelope {
    /// Lift into a one-element batch whose only sensor is the reference
    pub fn into_batch(self) -> BatchEnvelope {
        let sensor = SensorReading {
            traffic_light_id: self.traffic_light_id.clone(),
            controlled_edges: self.controlled_edges,
            metrics: self.metrics,
            vehicle_stats: self.vehicle_stats,
        };
        BatchEnvelope {
            version: self.version,
            data_type: self.data_type,
            timestamp: self.timestamp,
            traffic_light_id: self.traffic_light_id,
            sensors: vec![sensor],
        }
    }
}

/// Which ingress shape a payload uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeShape {
    Batch,
    Legacy,
}

impl EnvelopeShape {
    /// `sensors` wins over inline fields; `None` when neither is present
    pub fn detect(payload: &Value) -> Option<Self> {
        let object = payload.as_object()?;
        if object.contains_key("sensors") {
            Some(EnvelopeShape::Batch)
        } else if LEGACY_SENSOR_FIELDS.iter().any(|f| object.contains_key(*f)) {
            Some(EnvelopeShape::Legacy)
        } else {
            None
        }
    }
}

/// A traffic payload resolved at the ingress boundary
#[derive(Debug, Clone, PartialEq)]
pub enum IncomingEnvelope {
    Batch(BatchEnvelope),
    Legacy(LegacyEnvelope),
}

impl IncomingEnvelope {
    /// Deserialize an already-validated payload into its shape
    pub fn from_value(shape: EnvelopeShape, payload: Value) -> Result<Self, serde_json::Error> {
        Ok(match shape {
            EnvelopeShape::Batch => IncomingEnvelope::Batch(serde_json::from_value(payload)?),
            EnvelopeShape::Legacy => IncomingEnvelope::Legacy(serde_json::from_value(payload)?),
        })
    }

    pub fn shape(&self) -> EnvelopeShape {
        match self {
            IncomingEnvelope::Batch(_) => EnvelopeShape::Batch,
            IncomingEnvelope::Legacy(_) => EnvelopeShape::Legacy,
        }
    }

    /// Lift to batch form and normalize the timestamp
    ///
    /// Returns the canonical envelope and its Unix timestamp.
    pub fn into_canonical(
        self,
        policy: &TimestampPolicy,
    ) -> Result<(TrafficEnvelope, i64), TimestampError> {
        let batch = match self {
            IncomingEnvelope::Batch(batch) => batch,
            IncomingEnvelope::Legacy(legacy) => legacy.into_batch(),
        };
        let (timestamp, unix) = policy.normalize(&batch.timestamp)?;
        let envelope = TrafficEnvelope {
            version: batch.version,
            data_type: batch.data_type,
            timestamp,
            traffic_light_id: batch.traffic_light_id,
            sensors: batch.sensors,
        };
        Ok((envelope, unix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sensor_json(id: &str) -> Value {
        json!({
            "traffic_light_id": id,
            "controlled_edges": ["E1", "E2"],
            "metrics": {
                "vehicles_per_minute": 12,
                "avg_speed_kmh": 38.5,
                "avg_circulation_time_sec": 30.0,
                "density": 0.4
            },
            "vehicle_stats": {"motorcycle": 1, "car": 9, "bus": 1, "truck": 1}
        })
    }

    #[test]
    fn test_data_type_wire_names() {
        assert_eq!(serde_json::to_value(DataType::BatchOptimization).unwrap(), json!("batch-optimization"));
        assert_eq!("optimization".parse::<DataType>().unwrap(), DataType::Optimization);
        assert!("data-batch".parse::<DataType>().is_err());
    }

    #[test]
    fn test_shape_detection() {
        assert_eq!(
            EnvelopeShape::detect(&json!({"sensors": [], "metrics": {}})),
            Some(EnvelopeShape::Batch)
        );
        assert_eq!(
            EnvelopeShape::detect(&json!({"metrics": {}})),
            Some(EnvelopeShape::Legacy)
        );
        assert_eq!(EnvelopeShape::detect(&json!({"version": "2.0"})), None);
        assert_eq!(EnvelopeShape::detect(&json!([1, 2])), None);
    }

    #[test]
    fn test_legacy_lifts_into_one_element_batch() {
        let mut legacy = sensor_json("5");
        legacy["version"] = json!("2.0");
        legacy["type"] = json!("data");
        legacy["timestamp"] = json!("2023-11-14T22:13:20Z");

        let incoming = IncomingEnvelope::from_value(EnvelopeShape::Legacy, legacy).unwrap();
        let (envelope, unix) = incoming.into_canonical(&TimestampPolicy::default()).unwrap();

        assert_eq!(unix, 1_700_000_000);
        assert_eq!(envelope.traffic_light_id, "5");
        assert_eq!(envelope.sensors.len(), 1);
        assert_eq!(envelope.sensors[0].traffic_light_id, "5");
        assert_eq!(envelope.sensors[0].controlled_edges, vec!["E1", "E2"]);
    }

    #[test]
    fn test_unix_timestamp_is_canonicalized() {
        let batch = json!({
            "version": "2.0",
            "type": "data",
            "timestamp": 1_700_000_000,
            "traffic_light_id": "6",
            "sensors": [sensor_json("5"), sensor_json("6")]
        });
        let incoming = IncomingEnvelope::from_value(EnvelopeShape::Batch, batch).unwrap();
        let (envelope, _) = incoming.into_canonical(&TimestampPolicy::default()).unwrap();

        assert_eq!(envelope.timestamp, "2023-11-14T22:13:20Z");
        assert_eq!(envelope.sensor_ids().collect::<Vec<_>>(), vec!["5", "6"]);

        let stored = serde_json::to_value(envelope.to_storage(1_700_000_000)).unwrap();
        assert_eq!(stored["timestamp"], json!(1_700_000_000));
        assert_eq!(stored["type"], json!("data"));
    }
}
