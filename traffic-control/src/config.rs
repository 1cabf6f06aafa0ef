//! Service configuration
//!
//! Every setting can come from the command line or the environment; the
//! environment names match what the deployment already uses.

use clap::Parser;
use traffic_common::time::{MAX_UNIX_TIMESTAMP, MIN_UNIX_TIMESTAMP};
use traffic_common::{Error, Result, TimestampPolicy};

use crate::validator::ValidationLimits;

#[derive(Parser, Debug, Clone)]
#[command(name = "traffic-control")]
#[command(about = "Traffic data validation and orchestration service")]
#[command(version)]
pub struct Settings {
    /// Storage service base URL
    #[arg(long, env = "STORAGE_API_URL", default_value = "http://localhost:8000")]
    pub storage_api_url: String,

    /// Optimization service base URL
    #[arg(long, env = "SYNC_API_URL", default_value = "http://localhost:8002")]
    pub sync_api_url: String,

    /// SQLite database for the metadata index
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://traffic_control.db")]
    pub database_url: String,

    #[arg(long, env = "MAX_SENSORS_PER_BATCH", default_value_t = 10)]
    pub max_sensors_per_batch: usize,

    #[arg(long, env = "MIN_SENSORS_PER_BATCH", default_value_t = 1)]
    pub min_sensors_per_batch: usize,

    /// Earliest accepted Unix timestamp
    #[arg(long, env = "MIN_TIMESTAMP", default_value_t = MIN_UNIX_TIMESTAMP)]
    pub min_timestamp: i64,

    /// Latest accepted Unix timestamp
    #[arg(long, env = "MAX_TIMESTAMP", default_value_t = MAX_UNIX_TIMESTAMP)]
    pub max_timestamp: i64,

    /// Tracing filter, e.g. `info` or `traffic_control=debug`
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[arg(long, env = "HOST", default_value = "127.0.0.1")]
    pub host: String,

    #[arg(short, long, env = "PORT", default_value_t = 8003)]
    pub port: u16,
}

impl Settings {
    /// Reject combinations that would make every request fail
    pub fn validate(&self) -> Result<()> {
        if self.min_sensors_per_batch == 0 {
            return Err(Error::Config("MIN_SENSORS_PER_BATCH must be at least 1".to_string()));
        }
        if self.max_sensors_per_batch < self.min_sensors_per_batch {
            return Err(Error::Config(format!(
                "MAX_SENSORS_PER_BATCH ({}) is below MIN_SENSORS_PER_BATCH ({})",
                self.max_sensors_per_batch, self.min_sensors_per_batch
            )));
        }
        if self.min_timestamp >= self.max_timestamp {
            return Err(Error::Config(format!(
                "MIN_TIMESTAMP ({}) must be below MAX_TIMESTAMP ({})",
                self.min_timestamp, self.max_timestamp
            )));
        }
        for (name, url) in [
            ("STORAGE_API_URL", &self.storage_api_url),
            ("SYNC_API_URL", &self.sync_api_url),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(Error::Config(format!("{} must be an http(s) URL, got '{}'", name, url)));
            }
        }
        Ok(())
    }

    pub fn validation_limits(&self) -> ValidationLimits {
        ValidationLimits {
            min_sensors: self.min_sensors_per_batch,
            max_sensors: self.max_sensors_per_batch,
            timestamps: TimestampPolicy::new(self.min_timestamp, self.max_timestamp),
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
