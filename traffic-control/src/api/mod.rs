//! HTTP API handlers for traffic-control

pub mod health;
pub mod metadata;
pub mod process;

pub use health::health_routes;
pub use metadata::metadata_routes;
pub use process::process_routes;

use chrono::Utc;

/// Current time as `YYYY-MM-DDTHH:MM:SSZ` for response bodies
pub fn now_iso() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}
