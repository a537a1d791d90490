//! Error taxonomy shared by the store, refresher and query layers

use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RateError {
    /// No record exists for the requested base currency.
    #[error("No exchange rates stored for base currency: {base}")]
    NotFound { base: String },

    #[error("Invalid time range: start {start} is after end {end}")]
    InvalidRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    /// Snapshot would move history backwards in time.
    #[error("Snapshot at {timestamp} for {base} is older than last update at {last_updated}")]
    StaleSnapshot {
        base: String,
        timestamp: DateTime<Utc>,
        last_updated: DateTime<Utc>,
    },

    #[error("Upstream rate provider failed: {0}")]
    Upstream(String),

    #[error("Storage failure: {0}")]
    Storage(String),
}

impl RateError {
    pub fn not_found(base: &str) -> Self {
        RateError::NotFound {
            base: base.to_string(),
        }
    }
}

impl From<fjall::Error> for RateError {
    fn from(e: fjall::Error) -> Self {
        RateError::Storage(e.to_string())
    }
}

impl From<fjall::LsmError> for RateError {
    fn from(e: fjall::LsmError) -> Self {
        RateError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for RateError {
    fn from(e: serde_json::Error) -> Self {
        RateError::Storage(format!("Corrupt record encoding: {e}"))
    }
}

impl From<std::io::Error> for RateError {
    fn from(e: std::io::Error) -> Self {
        RateError::Storage(e.to_string())
    }
}

pub type Result<T, E = RateError> = std::result::Result<T, E>;
