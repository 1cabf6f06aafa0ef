//! Raw simulation input, consumed once by the formatter

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Sensor metrics as the simulator emits them
///
/// Density is in vehicles per kilometre here and may exceed 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSensorMetrics {
    pub vehicles_per_minute: f64,
    pub avg_speed_kmh: f64,
    pub avg_circulation_time_sec: f64,
    pub density: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSensorData {
    /// Free-form id such as `"TL-0042"`
    pub traffic_light_id: String,
    pub controlled_edges: Vec<String>,
    pub metrics: RawSensorMetrics,
    /// May be missing, empty, or list only some vehicle classes
    #[serde(default)]
    pub vehicle_stats: Option<BTreeMap<String, u32>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSimulationPayload {
    pub timestamp: String,
    pub source_id: String,
    pub sensors: Vec<RawSensorData>,
}
