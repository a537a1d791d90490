//! Storage abstraction for exchange rate records

use crate::core::error::Result;
use crate::core::rates::{ExchangeRateRecord, RateMap, Snapshot};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Durable, keyed storage of exchange rate snapshots.
///
/// Implementations must make `upsert` atomic with respect to readers: a
/// concurrent `get_current` or `get_range` sees the record either before or
/// after the write, never a mix. Upserts to the same base currency are
/// serialised; upserts to different base currencies must not wait on each
/// other.
#[async_trait]
pub trait RateStore: Send + Sync {
    /// Creates the record for `base` on first use, otherwise appends the
    /// snapshot to its history and makes it the current rates.
    async fn upsert(&self, base: &str, timestamp: DateTime<Utc>, rates: RateMap) -> Result<()>;

    /// Fails with `NotFound` if `base` has never been refreshed.
    async fn get_current(&self, base: &str) -> Result<ExchangeRateRecord>;

    /// The newest snapshot only. Backends that keep history apart from the
    /// current rates should answer this without touching the history.
    async fn current_snapshot(&self, base: &str) -> Result<Snapshot> {
        let record = self.get_current(base).await?;
        Ok(Snapshot::new(record.last_updated, record.rates))
    }

    /// Rates of `target` for snapshots with `start <= timestamp <= end`,
    /// oldest first. Empty when nothing matches; `NotFound` only when `base`
    /// itself is unknown.
    async fn get_range(
        &self,
        base: &str,
        target: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<(DateTime<Utc>, Decimal)>>;

    /// Base currencies with at least one snapshot.
    async fn bases(&self) -> Result<Vec<String>>;

    /// Flushes pending writes. The store must not be used afterwards.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
