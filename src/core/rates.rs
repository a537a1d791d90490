//! Exchange rate records and snapshots

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Currency code to rate, expressed against a base currency.
pub type RateMap = BTreeMap<String, Decimal>;

/// One fetched set of rates at a single point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub timestamp: DateTime<Utc>,
    pub rates: RateMap,
}

impl Snapshot {
    pub fn new(timestamp: DateTime<Utc>, rates: RateMap) -> Self {
        Self { timestamp, rates }
    }

    pub fn rate(&self, currency: &str) -> Option<Decimal> {
        self.rates.get(currency).copied()
    }
}

/// Everything stored for one base currency.
///
/// `rates` always mirrors the newest entry of `history` and `last_updated`
/// its timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRateRecord {
    pub base_currency: String,
    pub last_updated: DateTime<Utc>,
    pub rates: RateMap,
    pub history: Vec<Snapshot>,
}

impl ExchangeRateRecord {
    pub fn new(base_currency: &str, snapshot: Snapshot) -> Self {
        Self {
            base_currency: base_currency.to_string(),
            last_updated: snapshot.timestamp,
            rates: snapshot.rates.clone(),
            history: vec![snapshot],
        }
    }

    /// Returns the target currency's rate from every snapshot within
    /// `start..=end`, oldest first. Snapshots without the target are skipped.
    pub fn range(
        &self,
        target: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<(DateTime<Utc>, Decimal)> {
        // history is sorted, so both bounds can be found by bisection
        let lo = self.history.partition_point(|s| s.timestamp < start);
        let hi = self.history.partition_point(|s| s.timestamp <= end);
        if lo >= hi {
            return Vec::new();
        }

        self.history[lo..hi]
            .iter()
            .filter_map(|s| s.rate(target).map(|rate| (s.timestamp, rate)))
            .collect()
    }
}
