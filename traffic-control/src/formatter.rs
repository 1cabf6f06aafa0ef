//! Raw simulation output to canonical envelopes
//!
//! The simulator reports free-form ids like `"TL-0042"`, density in vehicles
//! per kilometre and sometimes partial vehicle counts. Formatting turns that
//! into a batch-shaped [`TrafficEnvelope`] the rest of the pipeline accepts.

use std::collections::BTreeMap;

use tracing::warn;
use traffic_common::TimestampValue;

use crate::models::{
    DataType, RawSensorData, RawSimulationPayload, SensorReading, TrafficEnvelope, TrafficMetrics,
    VehicleStats, TARGET_VERSION,
};
use crate::validator::{ValidationError, ValidationLimits, MAX_SPEED_KMH};

/// Density divisor for values given in vehicles per kilometre
const DENSITY_SCALE: f64 = 100.0;

/// Check a raw payload, then format it
#[derive(Debug, Clone, Copy, Default)]
pub struct DataFormatter {
    limits: ValidationLimits,
}

impl DataFormatter {
    pub fn new(limits: ValidationLimits) -> Self {
        Self { limits }
    }

    /// Minimal structural check before formatting
    pub fn check_raw(&self, raw: &RawSimulationPayload) -> Result<(), ValidationError> {
        let (min, max) = (self.limits.min_sensors, self.limits.max_sensors);
        if raw.sensors.len() < min || raw.sensors.len() > max {
            return Err(ValidationError::new(
                "sensors",
                format!("expected between {} and {} sensors, got {}", min, max, raw.sensors.len()),
            ));
        }

        if !is_strict_iso(&raw.timestamp) {
            return Err(ValidationError::new(
                "timestamp",
                format!(
                    "'{}' must be YYYY-MM-DDTHH:MM:SS ending with 'Z' or a ±HH:MM offset",
                    raw.timestamp
                ),
            ));
        }
        self.limits
            .timestamps
            .to_unix(&raw.timestamp)
            .map_err(|e| ValidationError::new("timestamp", e.to_string()))?;

        for (index, sensor) in raw.sensors.iter().enumerate() {
            let path = format!("sensors[{}]", index);
            if sensor.controlled_edges.is_empty() {
                return Err(ValidationError::new(
                    format!("{}.controlled_edges", path),
                    "must not be empty",
                ));
            }

            let metrics = &sensor.metrics;
            for (name, value) in [
                ("vehicles_per_minute", metrics.vehicles_per_minute),
                ("avg_speed_kmh", metrics.avg_speed_kmh),
                ("avg_circulation_time_sec", metrics.avg_circulation_time_sec),
                ("density", metrics.density),
            ] {
                if !value.is_finite() || value < 0.0 {
                    return Err(ValidationError::new(
                        format!("{}.metrics.{}", path, name),
                        format!("{} must be a non-negative number", value),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Build the canonical envelope
    ///
    /// The reference id is the normalized `source_id`. Whether it names one of
    /// the sensors is left to the schema validator.
    pub fn format(&self, raw: &RawSimulationPayload) -> Result<TrafficEnvelope, ValidationError> {
        let (timestamp, _) = self
            .limits
            .timestamps
            .normalize(&TimestampValue::from(raw.timestamp.as_str()))
            .map_err(|e| ValidationError::new("timestamp", e.to_string()))?;

        Ok(TrafficEnvelope {
            version: TARGET_VERSION.to_string(),
            data_type: DataType::Data,
            timestamp,
            traffic_light_id: normalize_id(&raw.source_id),
            sensors: raw.sensors.iter().map(format_sensor).collect(),
        })
    }
}

fn format_sensor(raw: &RawSensorData) -> SensorReading {
    let metrics = &raw.metrics;
    let vehicles_per_minute = metrics.vehicles_per_minute.round().min(f64::from(u32::MAX)) as u32;

    SensorReading {
        traffic_light_id: normalize_id(&raw.traffic_light_id),
        controlled_edges: raw.controlled_edges.clone(),
        metrics: TrafficMetrics {
            vehicles_per_minute,
            avg_speed_kmh: metrics.avg_speed_kmh.min(MAX_SPEED_KMH),
            avg_circulation_time_sec: metrics.avg_circulation_time_sec,
            density: normalize_density(metrics.density),
        },
        vehicle_stats: ensure_vehicle_stats(raw.vehicle_stats.as_ref(), vehicles_per_minute),
    }
}

/// First run of ASCII digits in the id, e.g. `"TL-0042-b7"` becomes `"0042"`
///
/// Ids without digits pass through unchanged.
pub fn normalize_id(raw_id: &str) -> String {
    let digits: String = raw_id
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();

    if digits.is_empty() {
        warn!(traffic_light_id = %raw_id, "Traffic light id has no digits, passing through");
        return raw_id.to_string();
    }
    digits
}

/// Bring density into 0-1, rounded to 3 decimals
///
/// Values up to and including 1.0 are taken as already normalized.
pub fn normalize_density(density: f64) -> f64 {
    let normalized = if density <= 1.0 {
        density
    } else {
        (density / DENSITY_SCALE).min(1.0)
    };
    (normalized * 1000.0).round() / 1000.0
}

/// Complete vehicle counts
///
/// Missing or empty stats attribute all of `fallback` to cars. Partial stats
/// get zeros for the missing classes. Unknown classes are ignored.
pub fn ensure_vehicle_stats(raw: Option<&BTreeMap<String, u32>>, fallback: u32) -> VehicleStats {
    match raw {
        Some(stats) if !stats.is_empty() => {
            let count = |class: &str| stats.get(class).copied().unwrap_or(0);
            VehicleStats {
                motorcycle: count("motorcycle"),
                car: count("car"),
                bus: count("bus"),
                truck: count("truck"),
            }
        }
        _ => VehicleStats {
            car: fallback,
            ..VehicleStats::default()
        },
    }
}

/// `YYYY-MM-DDTHH:MM:SS[.fff]` followed by `Z` or `±HH:MM`
fn is_strict_iso(timestamp: &str) -> bool {
    let bytes = timestamp.as_bytes();
    if bytes.len() < 20 || !matches_layout(&bytes[..19], b"dddd-dd-ddTdd:dd:dd") {
        return false;
    }

    let mut rest = &bytes[19..];
    if let Some(fraction) = rest.strip_prefix(b".") {
        let digits = fraction.iter().take_while(|b| b.is_ascii_digit()).count();
        if digits == 0 {
            return false;
        }
        rest = &fraction[digits..];
    }

    match rest {
        [b'Z'] => true,
        [b'+' | b'-', offset @ ..] => matches_layout(offset, b"dd:dd"),
        _ => false,
    }
}

/// `d` matches any ASCII digit, every other byte must match exactly
fn matches_layout(bytes: &[u8], layout: &[u8]) -> bool {
    bytes.len() == layout.len()
        && bytes.iter().zip(layout).all(|(b, l)| match l {
            b'd' => b.is_ascii_digit(),
            _ => b == l,
        })
}
