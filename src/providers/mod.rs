pub mod coinbase;

use crate::core::config::AppConfig;
use crate::core::provider::RateProvider;
use anyhow::{Context, Result};
use coinbase::CoinbaseProvider;
use std::sync::Arc;

/// Builds the upstream provider named in the configuration.
pub fn build_provider(config: &AppConfig) -> Result<Arc<dyn RateProvider>> {
    let coinbase = config
        .providers
        .coinbase
        .as_ref()
        .context("No rate provider configured")?;
    Ok(Arc::new(CoinbaseProvider::new(
        &coinbase.base_url,
        config.refresh.timeout(),
    )?))
}
