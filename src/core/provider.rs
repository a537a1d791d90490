//! Upstream exchange rate source

use crate::core::rates::RateMap;
use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
pub trait RateProvider: Send + Sync {
    /// Current rates against `currency`, validated and normalised.
    async fn fetch_rates(&self, currency: &str) -> Result<RateMap>;
}
