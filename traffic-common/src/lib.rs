//! # Traffic Common Library
//!
//! Shared code for the traffic control services:
//! - Error type and result alias
//! - Timestamp normalization (ISO-8601 <-> Unix seconds)
//! - SQLite initialization and the metadata row model

pub mod db;
pub mod error;
pub mod time;

pub use error::{Error, Result};
pub use time::{TimestampError, TimestampPolicy, TimestampValue};
