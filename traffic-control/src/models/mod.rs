//! Wire models for traffic data and optimization results

pub mod envelope;
pub mod optimization;
pub mod raw;

pub use envelope::{
    BatchEnvelope, DataType, EnvelopeShape, IncomingEnvelope, LegacyEnvelope, SensorReading,
    StoredDataEnvelope, TrafficEnvelope, TrafficMetrics, VehicleStats, TARGET_VERSION,
    VEHICLE_CLASSES,
};
pub use optimization::{
    CongestionCategory, ImpactDetails, OptimizationBatch, OptimizationDetails,
    OptimizationResponse, OptimizationResult,
};
pub use raw::{RawSensorData, RawSensorMetrics, RawSimulationPayload};
