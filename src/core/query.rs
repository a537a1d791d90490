//! Read-side operations over a [`RateStore`]

use crate::core::error::{RateError, Result};
use crate::core::rates::{ExchangeRateRecord, RateMap};
use crate::core::store::RateStore;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

#[derive(Clone)]
pub struct QueryService {
    store: Arc<dyn RateStore>,
}

impl QueryService {
    pub fn new(store: Arc<dyn RateStore>) -> Self {
        Self { store }
    }

    pub async fn current_rates(&self, base: &str) -> Result<RateMap> {
        let snapshot = self.store.current_snapshot(base).await?;
        debug!(base, count = snapshot.rates.len(), "Serving current rates");
        Ok(snapshot.rates)
    }

    pub async fn current_record(&self, base: &str) -> Result<ExchangeRateRecord> {
        self.store.get_current(base).await
    }

    pub async fn historical_rates(
        &self,
        base: &str,
        target: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<BTreeMap<DateTime<Utc>, Decimal>> {
        if start > end {
            return Err(RateError::InvalidRange { start, end });
        }

        let points = self.store.get_range(base, target, start, end).await?;
        debug!(base, target, count = points.len(), "Serving historical rates");

        // later points win on duplicate timestamps
        Ok(points.into_iter().collect())
    }

    pub async fn bases(&self) -> Result<Vec<String>> {
        self.store.bases().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rates::Snapshot;
    use crate::store::memory::MemoryRateStore;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn ts(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).unwrap()
    }

    fn rates(pairs: &[(&str, Decimal)]) -> RateMap {
        pairs.iter().map(|(c, r)| (c.to_string(), *r)).collect()
    }

    async fn seeded() -> QueryService {
        let store = Arc::new(MemoryRateStore::new());
        store
            .upsert("crypto", ts(1000), rates(&[("BTC", dec!(50000))]))
            .await
            .unwrap();
        store
            .upsert("crypto", ts(2000), rates(&[("BTC", dec!(51000))]))
            .await
            .unwrap();
        QueryService::new(store)
    }

    #[tokio::test]
    async fn test_current_rates_returns_latest_snapshot() {
        let store = Arc::new(MemoryRateStore::new());
        store
            .upsert(
                "crypto",
                ts(1000),
                rates(&[("BTC", dec!(50000)), ("ETH", dec!(3000))]),
            )
            .await
            .unwrap();
        let service = QueryService::new(store);

        let current = service.current_rates("crypto").await.unwrap();
        assert_eq!(current, rates(&[("BTC", dec!(50000)), ("ETH", dec!(3000))]));
    }

    /// Serves current snapshots but refuses full record reads.
    struct SnapshotOnlyStore(MemoryRateStore);

    #[async_trait]
    impl RateStore for SnapshotOnlyStore {
        async fn upsert(&self, base: &str, timestamp: DateTime<Utc>, rates: RateMap) -> Result<()> {
            self.0.upsert(base, timestamp, rates).await
        }

        async fn get_current(&self, _: &str) -> Result<ExchangeRateRecord> {
            Err(RateError::Storage("full record read".to_string()))
        }

        async fn current_snapshot(&self, base: &str) -> Result<Snapshot> {
            self.0.current_snapshot(base).await
        }

        async fn get_range(
            &self,
            base: &str,
            target: &str,
            start: DateTime<Utc>,
            end: DateTime<Utc>,
        ) -> Result<Vec<(DateTime<Utc>, Decimal)>> {
            self.0.get_range(base, target, start, end).await
        }

        async fn bases(&self) -> Result<Vec<String>> {
            self.0.bases().await
        }
    }

    #[tokio::test]
    async fn test_current_rates_skips_history() {
        let store = Arc::new(SnapshotOnlyStore(MemoryRateStore::new()));
        store
            .upsert("crypto", ts(1000), rates(&[("BTC", dec!(50000))]))
            .await
            .unwrap();
        let service = QueryService::new(store);

        let current = service.current_rates("crypto").await.unwrap();
        assert_eq!(current, rates(&[("BTC", dec!(50000))]));
        assert!(service.current_record("crypto").await.is_err());
    }

    #[tokio::test]
    async fn test_current_rates_unknown_base() {
        let service = seeded().await;
        let err = service.current_rates("unknown").await.unwrap_err();
        assert!(matches!(err, RateError::NotFound { base } if base == "unknown"));
    }

    #[tokio::test]
    async fn test_historical_rates_in_range() {
        let service = seeded().await;

        let history = service
            .historical_rates("crypto", "BTC", ts(1000), ts(2000))
            .await
            .unwrap();
        let expected: BTreeMap<_, _> = [(ts(1000), dec!(50000)), (ts(2000), dec!(51000))].into();
        assert_eq!(history, expected);
    }

    #[tokio::test]
    async fn test_historical_rates_empty_range_is_not_an_error() {
        let service = seeded().await;

        let history = service
            .historical_rates("crypto", "BTC", ts(1500), ts(1999))
            .await
            .unwrap();
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn test_historical_rates_rejects_inverted_range() {
        let service = seeded().await;

        let err = service
            .historical_rates("crypto", "BTC", ts(2000), ts(1000))
            .await
            .unwrap_err();
        assert!(matches!(err, RateError::InvalidRange { .. }));
    }

    #[tokio::test]
    async fn test_historical_rates_unknown_base() {
        let service = seeded().await;

        let err = service
            .historical_rates("fiat", "BTC", ts(0), ts(5000))
            .await
            .unwrap_err();
        assert!(matches!(err, RateError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_duplicate_timestamps_last_write_wins() {
        let store = Arc::new(MemoryRateStore::new());
        store
            .upsert("crypto", ts(1000), rates(&[("BTC", dec!(1))]))
            .await
            .unwrap();
        store
            .upsert("crypto", ts(1000), rates(&[("BTC", dec!(2))]))
            .await
            .unwrap();
        let service = QueryService::new(store);

        let history = service
            .historical_rates("crypto", "BTC", ts(0), ts(5000))
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[&ts(1000)], dec!(2));
    }
}
