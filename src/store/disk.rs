use crate::core::error::{RateError, Result};
use crate::core::rates::{ExchangeRateRecord, RateMap, Snapshot};
use crate::core::retention::{KeepAll, RetentionPolicy, effective_prune_count};
use crate::core::store::RateStore;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle, PersistMode};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

const RECORDS_PARTITION: &str = "records";
const HISTORY_PARTITION: &str = "history";

/// Current state of a base currency, stored under the base's own key.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RecordHeader {
    base_currency: String,
    last_updated: DateTime<Utc>,
    rates: RateMap,
    history_len: u64,
    next_seq: u64,
}

/// History keys sort by base, then timestamp, then append order:
/// `len(base) u16 | base | millis (sign-flipped) u64 | seq u64`, all big-endian.
fn history_prefix(base: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(2 + base.len() + 16);
    key.extend_from_slice(&(base.len() as u16).to_be_bytes());
    key.extend_from_slice(base.as_bytes());
    key
}

fn encode_millis(ts: &DateTime<Utc>) -> [u8; 8] {
    ((ts.timestamp_millis() as u64) ^ (1 << 63)).to_be_bytes()
}

fn decode_millis(key: &[u8], prefix_len: usize) -> Result<DateTime<Utc>> {
    let bytes: [u8; 8] = key
        .get(prefix_len..prefix_len + 8)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| RateError::Storage(format!("Malformed history key: {key:?}")))?;
    let millis = (u64::from_be_bytes(bytes) ^ (1 << 63)) as i64;
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| RateError::Storage(format!("History key timestamp out of range: {millis}")))
}

fn history_key(base: &str, ts: &DateTime<Utc>, seq: u64) -> Vec<u8> {
    let mut key = history_prefix(base);
    key.extend_from_slice(&encode_millis(ts));
    key.extend_from_slice(&seq.to_be_bytes());
    key
}

/// Persistent store on top of a fjall keyspace.
///
/// Each upsert writes the header, the new history entry and any pruned
/// entries in a single batch, so readers observe all of it or none of it.
pub struct DiskRateStore {
    keyspace: Keyspace,
    records: PartitionHandle,
    history: PartitionHandle,
    writers: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    retention: Arc<dyn RetentionPolicy>,
}

impl DiskRateStore {
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_retention(path, Arc::new(KeepAll))
    }

    pub fn open_with_retention(path: &Path, retention: Arc<dyn RetentionPolicy>) -> Result<Self> {
        std::fs::create_dir_all(path)?;

        let keyspace = Config::new(path).open()?;
        let records = keyspace.open_partition(RECORDS_PARTITION, PartitionCreateOptions::default())?;
        let history = keyspace.open_partition(HISTORY_PARTITION, PartitionCreateOptions::default())?;
        info!(path = %path.display(), "Opened rate store");

        Ok(Self {
            keyspace,
            records,
            history,
            writers: Mutex::new(HashMap::new()),
            retention,
        })
    }

    async fn writer_lock(&self, base: &str) -> Arc<Mutex<()>> {
        let mut writers = self.writers.lock().await;
        Arc::clone(writers.entry(base.to_string()).or_default())
    }

    fn read_header(&self, base: &str) -> Result<Option<RecordHeader>> {
        match self.records.get(base.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Keys of every history entry for `base` with the timestamp they carry,
    /// oldest first. Values are never decoded.
    fn history_entries(&self, base: &str) -> Result<Vec<(Vec<u8>, DateTime<Utc>)>> {
        let prefix = history_prefix(base);
        let mut entries = Vec::new();
        for item in self.history.prefix(&prefix) {
            let (key, _) = item?;
            let ts = decode_millis(&key, prefix.len())?;
            entries.push((key.to_vec(), ts));
        }
        Ok(entries)
    }
}

#[async_trait]
impl RateStore for DiskRateStore {
    async fn upsert(&self, base: &str, timestamp: DateTime<Utc>, rates: RateMap) -> Result<()> {
        if base.len() > u16::MAX as usize {
            return Err(RateError::Storage(format!(
                "Base currency key too long: {} bytes",
                base.len()
            )));
        }

        let lock = self.writer_lock(base).await;
        let _guard = lock.lock().await;

        let header = self.read_header(base)?;
        if let Some(header) = &header {
            if timestamp < header.last_updated {
                return Err(RateError::StaleSnapshot {
                    base: base.to_string(),
                    timestamp,
                    last_updated: header.last_updated,
                });
            }
        }

        let seq = header.as_ref().map_or(0, |h| h.next_seq);
        let snapshot = Snapshot::new(timestamp, rates);
        let new_key = history_key(base, &timestamp, seq);

        let stored_len = header.as_ref().map_or(0, |h| h.history_len);

        // under keep-all nothing is pruned, so the history is never scanned
        let prunable = if header.is_some() && !self.retention.keeps_all() {
            let mut entries = self.history_entries(base)?;
            entries.push((new_key.clone(), timestamp));
            let stamps: Vec<_> = entries.iter().map(|(_, ts)| *ts).collect();
            let pruned = effective_prune_count(self.retention.as_ref(), &stamps, timestamp);
            entries.truncate(pruned);
            entries
        } else {
            Vec::new()
        };

        let next = RecordHeader {
            base_currency: base.to_string(),
            last_updated: timestamp,
            rates: snapshot.rates.clone(),
            history_len: (stored_len + 1).saturating_sub(prunable.len() as u64),
            next_seq: seq + 1,
        };

        let mut batch = self.keyspace.batch();
        batch.insert(&self.history, new_key, serde_json::to_vec(&snapshot)?);
        for (key, _) in &prunable {
            batch.remove(&self.history, key.clone());
        }
        batch.insert(&self.records, base.as_bytes(), serde_json::to_vec(&next)?);
        batch.commit()?;

        debug!(
            base,
            %timestamp,
            pruned = prunable.len(),
            len = next.history_len,
            "Committed snapshot"
        );
        Ok(())
    }

    async fn get_current(&self, base: &str) -> Result<ExchangeRateRecord> {
        let instant = self.keyspace.instant();
        let records = self.records.snapshot_at(instant);
        let history = self.history.snapshot_at(instant);

        let bytes = records
            .get(base.as_bytes())?
            .ok_or_else(|| RateError::not_found(base))?;
        let header: RecordHeader = serde_json::from_slice(&bytes)?;

        let mut snapshots = Vec::with_capacity(header.history_len as usize);
        for item in history.prefix(history_prefix(base)) {
            let (_, value) = item?;
            snapshots.push(serde_json::from_slice::<Snapshot>(&value)?);
        }

        Ok(ExchangeRateRecord {
            base_currency: header.base_currency,
            last_updated: header.last_updated,
            rates: header.rates,
            history: snapshots,
        })
    }

    async fn current_snapshot(&self, base: &str) -> Result<Snapshot> {
        let header = self.read_header(base)?.ok_or_else(|| RateError::not_found(base))?;
        Ok(Snapshot::new(header.last_updated, header.rates))
    }

    async fn get_range(
        &self,
        base: &str,
        target: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<(DateTime<Utc>, Decimal)>> {
        let instant = self.keyspace.instant();
        let records = self.records.snapshot_at(instant);
        let history = self.history.snapshot_at(instant);

        if !records.contains_key(base.as_bytes())? {
            return Err(RateError::not_found(base));
        }
        if start > end {
            return Ok(Vec::new());
        }

        // keys carry millisecond precision; exact bounds are checked per entry
        let lo = history_key(base, &start, 0);
        let hi = history_key(base, &end, u64::MAX);

        let mut points = Vec::new();
        for item in history.range(lo..=hi) {
            let (_, value) = item?;
            let snapshot: Snapshot = serde_json::from_slice(&value)?;
            if snapshot.timestamp < start || snapshot.timestamp > end {
                continue;
            }
            if let Some(rate) = snapshot.rate(target) {
                points.push((snapshot.timestamp, rate));
            }
        }
        Ok(points)
    }

    async fn bases(&self) -> Result<Vec<String>> {
        let mut bases = Vec::new();
        for item in self.records.iter() {
            let (key, _) = item?;
            bases.push(String::from_utf8_lossy(&key).into_owned());
        }
        Ok(bases)
    }

    async fn close(&self) -> Result<()> {
        self.keyspace.persist(PersistMode::SyncAll)?;
        info!("Rate store flushed");
        Ok(())
    }
}
