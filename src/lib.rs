pub mod cli;
pub mod core;
pub mod providers;
pub mod refresh;
pub mod server;
pub mod store;

use crate::core::config::AppConfig;
use crate::core::error::RateError;
use crate::core::query::QueryService;
use crate::refresh::Refresher;
use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;
use tracing::{debug, info};

pub enum AppCommand {
    Serve,
    Refresh,
    Rates {
        base: String,
    },
    History {
        base: String,
        target: String,
        start: i64,
        end: i64,
    },
}

fn load_config(config_path: Option<&str>) -> Result<AppConfig> {
    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");
    Ok(config)
}

fn millis_to_datetime(ms: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .with_context(|| format!("Timestamp out of range: {ms}"))
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    let config = load_config(config_path)?;

    match command {
        AppCommand::Serve => {
            let port = std::env::var("PORT").ok();
            serve(config.with_port_override(port.as_deref())?).await
        }
        AppCommand::Refresh => refresh_once(&config).await,
        AppCommand::Rates { base } => {
            let store = store::open_store(&config)?;
            let service = QueryService::new(Arc::clone(&store));
            let result = match service.current_record(&base).await {
                Err(RateError::NotFound { .. }) => {
                    let known = service.bases().await?;
                    Err(anyhow!(
                        "No exchange rates stored for {base}; known base currencies: [{}]",
                        known.join(", ")
                    ))
                }
                other => other.map_err(anyhow::Error::from),
            };
            store.close().await?;

            println!("{}", cli::rates::render_current(&result?));
            Ok(())
        }
        AppCommand::History {
            base,
            target,
            start,
            end,
        } => {
            let start = millis_to_datetime(start)?;
            let end = millis_to_datetime(end)?;

            let store = store::open_store(&config)?;
            let result = QueryService::new(Arc::clone(&store))
                .historical_rates(&base, &target, start, end)
                .await;
            store.close().await?;

            println!("{}", cli::rates::render_history(&base, &target, &result?));
            Ok(())
        }
    }
}

/// Runs the HTTP service with the background refresher until shutdown.
pub async fn serve(config: AppConfig) -> Result<()> {
    info!("Exchange rate service starting...");

    let store = store::open_store(&config)?;
    let provider = providers::build_provider(&config)?;
    let refresher = Refresher::new(provider, Arc::clone(&store), config.refresh.clone()).spawn();

    let served = server::run_server(config.server.bind, QueryService::new(Arc::clone(&store))).await;

    info!("Shutting down");
    refresher.shutdown().await;
    store.close().await.context("Failed to flush rate store")?;

    served.with_context(|| format!("HTTP server on {} failed", config.server.bind))
}

/// Performs a single refresh tick against the configured store.
pub async fn refresh_once(config: &AppConfig) -> Result<()> {
    let store = store::open_store(config)?;
    let provider = providers::build_provider(config)?;
    let refresher = Refresher::new(provider, Arc::clone(&store), config.refresh.clone());

    let result = refresher.tick().await;
    store.close().await?;

    let stats = result.context("Refresh failed")?;
    info!(
        base = %stats.base_currency,
        rates = stats.rates_stored,
        "Exchange rates updated"
    );
    println!(
        "Stored {} rates for {} at {}",
        stats.rates_stored, stats.base_currency, stats.timestamp
    );
    Ok(())
}
