//! Schema validation for traffic and optimization payloads
//!
//! Validation runs on the untyped JSON value so missing fields and wrong types
//! can be reported by name. The first defect wins; the error carries the
//! offending field path, e.g. `sensors[2].metrics.density`.

use serde_json::{Map, Value};
use thiserror::Error;
use traffic_common::TimestampPolicy;

use crate::models::{CongestionCategory, DataType, VEHICLE_CLASSES};

/// Default sensor bounds for a batch
pub const DEFAULT_MIN_SENSORS: usize = 1;
pub const DEFAULT_MAX_SENSORS: usize = 10;

/// Highest accepted average speed in km/h
pub const MAX_SPEED_KMH: f64 = 200.0;

/// A payload defect, named by field path
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

type Check<T = ()> = Result<T, ValidationError>;

/// Tunable bounds applied during validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationLimits {
    pub min_sensors: usize,
    pub max_sensors: usize,
    pub timestamps: TimestampPolicy,
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self {
            min_sensors: DEFAULT_MIN_SENSORS,
            max_sensors: DEFAULT_MAX_SENSORS,
            timestamps: TimestampPolicy::default(),
        }
    }
}

/// Validator for every payload variant the pipeline handles
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaValidator {
    limits: ValidationLimits,
}

impl SchemaValidator {
    pub fn new(limits: ValidationLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &ValidationLimits {
        &self.limits
    }

    /// Validate an incoming traffic payload of any type
    ///
    /// `data` payloads with a `sensors` key are checked as batches; without it
    /// the sensor fields must be inline (legacy single-sensor form).
    pub fn validate(&self, payload: &Value) -> Check {
        let object = as_object(payload, "payload")?;
        let data_type = self.check_base(object, "")?;

        match data_type {
            DataType::Data if object.contains_key("sensors") => self.check_batch(object),
            DataType::Data => check_sensor(object, ""),
            DataType::Optimization => check_optimization_body(object, ""),
            DataType::BatchOptimization => self.check_batch_optimization(object),
        }
    }

    /// Narrow check on a downloaded envelope before it goes to optimization
    pub fn validate_sync_input(&self, payload: &Value) -> Check {
        let object = as_object(payload, "payload")?;

        let data_type = require_str(object, "", "type")?;
        if data_type != DataType::Data.as_str() {
            return Err(ValidationError::new(
                "type",
                format!("must be 'data' for optimization input, got '{}'", data_type),
            ));
        }

        let sensors = self.check_sensor_list(object, "sensors")?;
        for (index, sensor) in sensors.iter().enumerate() {
            let path = format!("sensors[{}]", index);
            let sensor = as_object(sensor, &path)?;
            require(sensor, &path, "traffic_light_id")?;

            let metrics_path = child(&path, "metrics");
            let metrics = as_object(require(sensor, &path, "metrics")?, &metrics_path)?;
            for name in ["vehicles_per_minute", "avg_speed_kmh", "density"] {
                if !require(metrics, &metrics_path, name)?.is_number() {
                    return Err(ValidationError::new(child(&metrics_path, name), "must be a number"));
                }
            }
        }
        Ok(())
    }

    /// Validate what the optimization service answered with
    ///
    /// Accepts a single result, a non-empty list of results, or a wrapper
    /// object holding an `optimizations` list.
    pub fn validate_optimization_response(&self, response: &Value) -> Check {
        match response {
            Value::Array(entries) => {
                self.check_entry_count(entries.len(), "response")?;
                for (index, entry) in entries.iter().enumerate() {
                    let path = format!("[{}]", index);
                    let entry = as_object(entry, &path)?;
                    self.check_optimization_result(entry, &path)?;
                }
                Ok(())
            }
            Value::Object(object) if object.contains_key("optimizations") => {
                let data_type = self.check_base(object, "")?;
                if data_type == DataType::Data {
                    return Err(ValidationError::new(
                        "type",
                        "must be 'optimization' or 'batch-optimization'",
                    ));
                }
                match (object.get("traffic_light_id"), object.get("reference_id")) {
                    (Some(_), _) => check_numeric_id(object, "", "traffic_light_id")?,
                    (None, Some(_)) => check_numeric_id(object, "", "reference_id")?,
                    (None, None) => {
                        return Err(ValidationError::new("reference_id", "is required"))
                    }
                };
                self.check_optimizations(object)
            }
            Value::Object(object) => self.check_optimization_result(object, ""),
            _ => Err(ValidationError::new(
                "response",
                "must be an optimization result, a list of them, or an optimizations wrapper",
            )),
        }
    }

    /// version, type and timestamp; returns the parsed type
    fn check_base(&self, object: &Map<String, Value>, prefix: &str) -> Check<DataType> {
        let version = require_str(object, prefix, "version")?;
        if !is_dotted_version(version) {
            return Err(ValidationError::new(
                child(prefix, "version"),
                format!("'{}' is not a dotted numeric version", version),
            ));
        }

        let data_type = require_str(object, prefix, "type")?;
        let data_type: DataType = data_type
            .parse()
            .map_err(|message: String| ValidationError::new(child(prefix, "type"), message))?;

        self.check_timestamp(require(object, prefix, "timestamp")?, &child(prefix, "timestamp"))?;
        Ok(data_type)
    }

    fn check_timestamp(&self, value: &Value, path: &str) -> Check {
        let policy = &self.limits.timestamps;
        let result = match value {
            Value::String(iso) => policy.to_unix(iso),
            Value::Number(number) => match number.as_i64() {
                Some(unix) => policy.check_range(unix),
                None => return Err(ValidationError::new(path, "must be an integer Unix timestamp")),
            },
            _ => {
                return Err(ValidationError::new(
                    path,
                    "must be an ISO-8601 string or a Unix integer",
                ))
            }
        };
        result
            .map(|_| ())
            .map_err(|e| ValidationError::new(path, e.to_string()))
    }

    fn check_batch(&self, object: &Map<String, Value>) -> Check {
        let reference = check_numeric_id(object, "", "traffic_light_id")?;
        let sensors = self.check_sensor_list(object, "sensors")?;

        let mut ids = Vec::with_capacity(sensors.len());
        for (index, sensor) in sensors.iter().enumerate() {
            let path = format!("sensors[{}]", index);
            let sensor = as_object(sensor, &path)?;
            check_sensor(sensor, &path)?;
            ids.push(sensor.get("traffic_light_id").and_then(Value::as_str));
        }

        if !ids.contains(&Some(reference)) {
            return Err(ValidationError::new(
                "traffic_light_id",
                format!("reference id '{}' is not among the sensor ids", reference),
            ));
        }
        Ok(())
    }

    fn check_batch_optimization(&self, object: &Map<String, Value>) -> Check {
        check_numeric_id(object, "", "reference_id")?;
        let sensor_count = require(object, "", "sensor_count")?;
        if sensor_count.as_u64().is_none() {
            return Err(ValidationError::new("sensor_count", "must be a non-negative integer"));
        }
        self.check_optimizations(object)
    }

    /// Non-empty, bounded `optimizations` list of per-light entries
    ///
    /// Entries may omit version, type and timestamp; present ones are checked.
    fn check_optimizations(&self, object: &Map<String, Value>) -> Check {
        let entries = require(object, "", "optimizations")?
            .as_array()
            .ok_or_else(|| ValidationError::new("optimizations", "must be a list"))?;
        self.check_entry_count(entries.len(), "optimizations")?;

        for (index, entry) in entries.iter().enumerate() {
            let path = format!("optimizations[{}]", index);
            let entry = as_object(entry, &path)?;

            if let Some(version) = entry.get("version") {
                let valid = version.as_str().map(is_dotted_version).unwrap_or(false);
                if !valid {
                    return Err(ValidationError::new(
                        child(&path, "version"),
                        "must be a dotted numeric version",
                    ));
                }
            }
            if entry.contains_key("type") {
                check_optimization_type(entry, &path)?;
            }
            if let Some(timestamp) = entry.get("timestamp") {
                self.check_timestamp(timestamp, &child(&path, "timestamp"))?;
            }
            check_optimization_body(entry, &path)?;
        }
        Ok(())
    }

    /// Full standalone optimization result with its own envelope fields
    fn check_optimization_result(&self, object: &Map<String, Value>, prefix: &str) -> Check {
        self.check_base(object, prefix)?;
        check_optimization_type(object, prefix)?;
        check_optimization_body(object, prefix)
    }

    fn check_sensor_list<'a>(&self, object: &'a Map<String, Value>, name: &str) -> Check<&'a Vec<Value>> {
        let sensors = require(object, "", name)?
            .as_array()
            .ok_or_else(|| ValidationError::new(name, "must be a list"))?;

        let (min, max) = (self.limits.min_sensors, self.limits.max_sensors);
        if sensors.len() < min || sensors.len() > max {
            return Err(ValidationError::new(
                name,
                format!("expected between {} and {} sensors, got {}", min, max, sensors.len()),
            ));
        }
        Ok(sensors)
    }

    fn check_entry_count(&self, count: usize, field: &str) -> Check {
        if count == 0 {
            return Err(ValidationError::new(field, "must not be empty"));
        }
        if count > self.limits.max_sensors {
            return Err(ValidationError::new(
                field,
                format!("at most {} entries allowed, got {}", self.limits.max_sensors, count),
            ));
        }
        Ok(())
    }
}

/// [`SchemaValidator::validate`] with default limits
pub fn validate(payload: &Value) -> Check {
    SchemaValidator::default().validate(payload)
}

/// [`SchemaValidator::validate_sync_input`] with default limits
pub fn validate_sync_input(payload: &Value) -> Check {
    SchemaValidator::default().validate_sync_input(payload)
}

/// [`SchemaValidator::validate_optimization_response`] with default limits
pub fn validate_optimization_response(response: &Value) -> Check {
    SchemaValidator::default().validate_optimization_response(response)
}

fn check_sensor(object: &Map<String, Value>, prefix: &str) -> Check {
    check_numeric_id(object, prefix, "traffic_light_id")?;

    let edges_path = child(prefix, "controlled_edges");
    let edges = require(object, prefix, "controlled_edges")?
        .as_array()
        .ok_or_else(|| ValidationError::new(&edges_path, "must be a list"))?;
    if edges.is_empty() {
        return Err(ValidationError::new(edges_path, "must not be empty"));
    }
    if let Some(index) = edges.iter().position(|edge| !edge.is_string()) {
        return Err(ValidationError::new(
            format!("{}[{}]", edges_path, index),
            "must be a string",
        ));
    }

    let metrics_path = child(prefix, "metrics");
    let metrics = as_object(require(object, prefix, "metrics")?, &metrics_path)?;
    require_count(metrics, &metrics_path, "vehicles_per_minute")?;
    require_in_range(metrics, &metrics_path, "avg_speed_kmh", 0.0, MAX_SPEED_KMH)?;
    require_in_range(metrics, &metrics_path, "avg_circulation_time_sec", 0.0, f64::INFINITY)?;
    require_in_range(metrics, &metrics_path, "density", 0.0, 1.0)?;

    let stats_path = child(prefix, "vehicle_stats");
    let stats = as_object(require(object, prefix, "vehicle_stats")?, &stats_path)?;
    for class in VEHICLE_CLASSES {
        require_count(stats, &stats_path, class)?;
    }
    Ok(())
}

fn check_optimization_type(object: &Map<String, Value>, prefix: &str) -> Check {
    let data_type = require_str(object, prefix, "type")?;
    if data_type != DataType::Optimization.as_str() {
        return Err(ValidationError::new(
            child(prefix, "type"),
            format!("must be 'optimization', got '{}'", data_type),
        ));
    }
    Ok(())
}

/// traffic_light_id, optimization timings and impact block
fn check_optimization_body(object: &Map<String, Value>, prefix: &str) -> Check {
    check_numeric_id(object, prefix, "traffic_light_id")?;

    let optimization_path = child(prefix, "optimization");
    let optimization = as_object(require(object, prefix, "optimization")?, &optimization_path)?;
    for name in ["green_time_sec", "red_time_sec"] {
        let value = require_count(optimization, &optimization_path, name)?;
        if value == 0 {
            return Err(ValidationError::new(child(&optimization_path, name), "must be positive"));
        }
    }

    let impact_path = child(prefix, "impact");
    let impact = as_object(require(object, prefix, "impact")?, &impact_path)?;
    for name in ["original_congestion", "optimized_congestion"] {
        if require(impact, &impact_path, name)?.as_i64().is_none() {
            return Err(ValidationError::new(child(&impact_path, name), "must be an integer"));
        }
    }
    for name in ["original_category", "optimized_category"] {
        let category = require_str(impact, &impact_path, name)?;
        if !CongestionCategory::NAMES.contains(&category) {
            return Err(ValidationError::new(
                child(&impact_path, name),
                format!(
                    "'{}' is not one of {}",
                    category,
                    CongestionCategory::NAMES.join(", ")
                ),
            ));
        }
    }
    Ok(())
}

fn check_numeric_id<'a>(object: &'a Map<String, Value>, prefix: &str, name: &str) -> Check<&'a str> {
    let id = require_str(object, prefix, name)?;
    if !is_numeric(id) {
        return Err(ValidationError::new(
            child(prefix, name),
            format!("'{}' must contain only digits", id),
        ));
    }
    Ok(id)
}

fn require<'a>(object: &'a Map<String, Value>, prefix: &str, name: &str) -> Check<&'a Value> {
    object
        .get(name)
        .ok_or_else(|| ValidationError::new(child(prefix, name), "is required"))
}

fn require_str<'a>(object: &'a Map<String, Value>, prefix: &str, name: &str) -> Check<&'a str> {
    require(object, prefix, name)?
        .as_str()
        .ok_or_else(|| ValidationError::new(child(prefix, name), "must be a string"))
}

/// Non-negative integer that fits a u32
fn require_count(object: &Map<String, Value>, prefix: &str, name: &str) -> Check<u64> {
    require(object, prefix, name)?
        .as_u64()
        .filter(|value| *value <= u64::from(u32::MAX))
        .ok_or_else(|| ValidationError::new(child(prefix, name), "must be a non-negative integer"))
}

fn require_in_range(object: &Map<String, Value>, prefix: &str, name: &str, min: f64, max: f64) -> Check {
    let value = require(object, prefix, name)?
        .as_f64()
        .ok_or_else(|| ValidationError::new(child(prefix, name), "must be a number"))?;
    if value < min || value > max {
        let message = if max.is_finite() {
            format!("{} is outside [{}, {}]", value, min, max)
        } else {
            format!("{} must be at least {}", value, min)
        };
        return Err(ValidationError::new(child(prefix, name), message));
    }
    Ok(())
}

fn as_object<'a>(value: &'a Value, path: &str) -> Check<&'a Map<String, Value>> {
    value
        .as_object()
        .ok_or_else(|| ValidationError::new(path, "must be an object"))
}

fn child(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}

fn is_numeric(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit())
}

fn is_dotted_version(version: &str) -> bool {
    version.split('.').all(is_numeric)
}
