//! Scheduled synchronisation from the upstream provider into the store.
//!
//! Each tick fetches a snapshot without holding any store lock, then hands
//! it to [`RateStore::upsert`]. A failed or timed out fetch skips the tick
//! and leaves the store untouched; the loop itself only ends on shutdown.

use crate::core::config::RefreshConfig;
use crate::core::error::{RateError, Result};
use crate::core::provider::RateProvider;
use crate::core::store::RateStore;
use chrono::{DateTime, SubsecRound, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval, timeout};
use tracing::{debug, error, info, instrument};

/// Outcome of a successful tick.
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshStats {
    pub base_currency: String,
    pub timestamp: DateTime<Utc>,
    pub rates_stored: usize,
    pub duration: Duration,
}

pub struct Refresher {
    provider: Arc<dyn RateProvider>,
    store: Arc<dyn RateStore>,
    config: RefreshConfig,
}

impl Refresher {
    pub fn new(
        provider: Arc<dyn RateProvider>,
        store: Arc<dyn RateStore>,
        config: RefreshConfig,
    ) -> Self {
        Self {
            provider,
            store,
            config,
        }
    }

    /// Runs one fetch-and-merge cycle.
    #[instrument(name = "RefreshTick", skip(self), fields(base = %self.config.base_currency))]
    pub async fn tick(&self) -> Result<RefreshStats> {
        let started = Instant::now();

        let fetch = self.provider.fetch_rates(&self.config.source_currency);
        let rates = match timeout(self.config.timeout(), fetch).await {
            Ok(Ok(rates)) => rates,
            Ok(Err(e)) => return Err(RateError::Upstream(format!("{e:#}"))),
            Err(_) => {
                return Err(RateError::Upstream(format!(
                    "Fetch timed out after {}s",
                    self.config.timeout().as_secs()
                )));
            }
        };

        // millisecond precision, matching the epoch-ms query interface
        let timestamp = Utc::now().trunc_subsecs(3);
        let rates_stored = rates.len();
        self.store
            .upsert(&self.config.base_currency, timestamp, rates)
            .await?;

        Ok(RefreshStats {
            base_currency: self.config.base_currency.clone(),
            timestamp,
            rates_stored,
            duration: started.elapsed(),
        })
    }

    async fn run_tick(&self) {
        match self.tick().await {
            Ok(stats) => info!(
                base = %stats.base_currency,
                rates = stats.rates_stored,
                duration_ms = stats.duration.as_millis() as u64,
                "Exchange rates updated"
            ),
            Err(e) => error!(error = %e, "Failed to update exchange rates"),
        }
    }

    /// Starts the background refresh loop. The first tick runs immediately.
    pub fn spawn(self) -> RefreshHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let enabled = self.config.enabled;
        let period = self.config.interval();

        let task = tokio::spawn(async move {
            if !enabled {
                info!("Scheduled refresh is disabled, skipping");
                return;
            }
            info!(
                "Starting scheduled refresh with {}-second interval",
                period.as_secs()
            );

            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => self.run_tick().await,
                    changed = shutdown_rx.changed() => {
                        // a dropped sender also means shut down
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!("Refresh loop stopped");
        });

        RefreshHandle { shutdown_tx, task }
    }
}

/// Owns the background refresh task.
pub struct RefreshHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl RefreshHandle {
    /// Signals the loop to stop and waits for it. A tick already in flight
    /// finishes first, so no write is abandoned halfway.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.task.await {
            error!(error = %e, "Refresh task ended abnormally");
        }
    }
}
