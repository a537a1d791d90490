use crate::core::error::{RateError, Result};
use crate::core::rates::{ExchangeRateRecord, RateMap, Snapshot};
use crate::core::retention::{KeepAll, RetentionPolicy, effective_prune_count};
use crate::core::store::RateStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

type Slot = Arc<RwLock<Option<ExchangeRateRecord>>>;

/// In-memory store using one lock per base currency.
///
/// The outer map lock is only held long enough to find or create a slot, so
/// writers to one base never wait on readers or writers of another.
pub struct MemoryRateStore {
    slots: RwLock<HashMap<String, Slot>>,
    retention: Arc<dyn RetentionPolicy>,
}

impl MemoryRateStore {
    pub fn new() -> Self {
        Self::with_retention(Arc::new(KeepAll))
    }

    pub fn with_retention(retention: Arc<dyn RetentionPolicy>) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            retention,
        }
    }

    async fn slot(&self, base: &str) -> Option<Slot> {
        self.slots.read().await.get(base).cloned()
    }

    async fn slot_or_insert(&self, base: &str) -> Slot {
        if let Some(slot) = self.slot(base).await {
            return slot;
        }
        let mut slots = self.slots.write().await;
        Arc::clone(slots.entry(base.to_string()).or_default())
    }
}

impl Default for MemoryRateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RateStore for MemoryRateStore {
    async fn upsert(&self, base: &str, timestamp: DateTime<Utc>, rates: RateMap) -> Result<()> {
        let slot = self.slot_or_insert(base).await;
        let mut guard = slot.write().await;

        let snapshot = Snapshot::new(timestamp, rates);
        match guard.as_mut() {
            None => {
                debug!(base, %timestamp, "Creating exchange rate record");
                *guard = Some(ExchangeRateRecord::new(base, snapshot));
            }
            Some(record) => {
                if timestamp < record.last_updated {
                    return Err(RateError::StaleSnapshot {
                        base: base.to_string(),
                        timestamp,
                        last_updated: record.last_updated,
                    });
                }

                // readers are shut out by the write guard, so edit in place
                record.rates = snapshot.rates.clone();
                record.last_updated = timestamp;
                record.history.push(snapshot);

                let pruned = if self.retention.keeps_all() {
                    0
                } else {
                    let stamps: Vec<_> = record.history.iter().map(|s| s.timestamp).collect();
                    effective_prune_count(self.retention.as_ref(), &stamps, timestamp)
                };
                record.history.drain(..pruned);
                debug!(
                    base,
                    %timestamp,
                    pruned,
                    len = record.history.len(),
                    "Appended snapshot"
                );
            }
        }
        Ok(())
    }

    async fn get_current(&self, base: &str) -> Result<ExchangeRateRecord> {
        let slot = self.slot(base).await.ok_or_else(|| RateError::not_found(base))?;
        let guard = slot.read().await;
        guard.clone().ok_or_else(|| RateError::not_found(base))
    }

    async fn current_snapshot(&self, base: &str) -> Result<Snapshot> {
        let slot = self.slot(base).await.ok_or_else(|| RateError::not_found(base))?;
        let guard = slot.read().await;
        let record = guard.as_ref().ok_or_else(|| RateError::not_found(base))?;
        Ok(Snapshot::new(record.last_updated, record.rates.clone()))
    }

    async fn get_range(
        &self,
        base: &str,
        target: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<(DateTime<Utc>, Decimal)>> {
        let slot = self.slot(base).await.ok_or_else(|| RateError::not_found(base))?;
        let guard = slot.read().await;
        let record = guard.as_ref().ok_or_else(|| RateError::not_found(base))?;
        Ok(record.range(target, start, end))
    }

    async fn bases(&self) -> Result<Vec<String>> {
        let slots: Vec<(String, Slot)> = self
            .slots
            .read()
            .await
            .iter()
            .map(|(k, v)| (k.clone(), Arc::clone(v)))
            .collect();

        let mut bases = Vec::with_capacity(slots.len());
        for (base, slot) in slots {
            if slot.read().await.is_some() {
                bases.push(base);
            }
        }
        bases.sort();
        Ok(bases)
    }
}
