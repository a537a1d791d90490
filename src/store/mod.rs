pub mod disk;
pub mod memory;

use crate::core::config::{AppConfig, StorageBackend};
use crate::core::store::RateStore;
use anyhow::{Context, Result};
use disk::DiskRateStore;
use memory::MemoryRateStore;
use std::sync::Arc;
use tracing::info;

/// Opens the store selected by the configuration.
pub fn open_store(config: &AppConfig) -> Result<Arc<dyn RateStore>> {
    let retention = config.retention.policy();
    info!(backend = ?config.storage.backend, ?retention, "Opening rate store");

    match config.storage.backend {
        StorageBackend::Memory => Ok(Arc::new(MemoryRateStore::with_retention(retention))),
        StorageBackend::Disk => {
            let path = config.default_data_path()?;
            let store = DiskRateStore::open_with_retention(&path, retention)
                .with_context(|| format!("Failed to open rate store at {}", path.display()))?;
            Ok(Arc::new(store))
        }
    }
}
