use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::core::provider::RateProvider;
use crate::core::rates::RateMap;

/// Rates from the Coinbase `exchange-rates` endpoint.
pub struct CoinbaseProvider {
    base_url: String,
    client: reqwest::Client,
}

impl CoinbaseProvider {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("ratekeeper/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(CoinbaseProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[derive(Debug, Deserialize)]
struct CoinbaseResponse {
    data: CoinbaseRates,
}

#[derive(Debug, Deserialize)]
struct CoinbaseRates {
    currency: String,
    rates: HashMap<String, serde_json::Value>,
}

/// Accepts rates given as decimal strings or JSON numbers; anything that is
/// not a non-negative decimal is rejected.
fn parse_rate(value: &serde_json::Value) -> Option<Decimal> {
    let rate = match value {
        serde_json::Value::String(s) => Decimal::from_str(s.trim())
            .or_else(|_| Decimal::from_scientific(s.trim()))
            .ok()?,
        serde_json::Value::Number(n) => Decimal::from_str(&n.to_string())
            .or_else(|_| Decimal::from_scientific(&n.to_string()))
            .ok()?,
        _ => return None,
    };
    (!rate.is_sign_negative()).then_some(rate)
}

fn normalize_rates(raw: HashMap<String, serde_json::Value>) -> RateMap {
    let mut rates = RateMap::new();
    for (code, value) in raw {
        let code = code.trim().to_uppercase();
        if code.is_empty() {
            continue;
        }
        match parse_rate(&value) {
            Some(rate) => {
                rates.insert(code, rate);
            }
            None => warn!(%code, %value, "Dropping invalid rate"),
        }
    }
    rates
}

#[async_trait]
impl RateProvider for CoinbaseProvider {
    #[instrument(name = "CoinbaseRatesFetch", skip(self), fields(currency = %currency))]
    async fn fetch_rates(&self, currency: &str) -> Result<RateMap> {
        let url = format!("{}/v2/exchange-rates?currency={}", self.base_url, currency);
        debug!("Requesting exchange rates from {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| anyhow!("Request error: {} for currency: {} URL: {}", e, currency, url))?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "HTTP error: {} for currency: {}",
                response.status(),
                currency
            ));
        }

        let text = response.text().await?;
        let data: CoinbaseResponse = serde_json::from_str(&text).map_err(|e| {
            anyhow!(
                "Failed to parse JSON response for {}: {}. Response: {}",
                currency,
                e,
                text
            )
        })?;

        if !data.data.currency.eq_ignore_ascii_case(currency) {
            warn!(
                requested = currency,
                received = %data.data.currency,
                "Upstream quoted a different currency"
            );
        }

        let rates = normalize_rates(data.data.rates);
        if rates.is_empty() {
            return Err(anyhow!("No exchange rates found for currency: {}", currency));
        }
        debug!(count = rates.len(), "Received exchange rates");
        Ok(rates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn create_mock_server(currency: &str, status: u16, body: &str) -> MockServer {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/exchange-rates"))
            .and(query_param("currency", currency))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(&mock_server)
            .await;
        mock_server
    }

    fn provider(server: &MockServer) -> CoinbaseProvider {
        CoinbaseProvider::new(&server.uri(), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_successful_rates_fetch() {
        let body = r#"{
            "data": {
                "currency": "USD",
                "rates": {
                    "BTC": "0.0000153",
                    "ETH": "0.00033",
                    "EUR": 0.92
                }
            }
        }"#;
        let server = create_mock_server("USD", 200, body).await;

        let rates = provider(&server).fetch_rates("USD").await.unwrap();
        assert_eq!(rates.len(), 3);
        assert_eq!(rates["BTC"], dec!(0.0000153));
        assert_eq!(rates["ETH"], dec!(0.00033));
        assert_eq!(rates["EUR"], dec!(0.92));
    }

    #[tokio::test]
    async fn test_invalid_entries_are_dropped() {
        let body = r#"{
            "data": {
                "currency": "USD",
                "rates": {
                    "BTC": "0.0000153",
                    "BAD": "not-a-number",
                    "NEG": "-1.5",
                    "NUL": null,
                    "SCI": "1.5e-7"
                }
            }
        }"#;
        let server = create_mock_server("USD", 200, body).await;

        let rates = provider(&server).fetch_rates("USD").await.unwrap();
        let codes: Vec<_> = rates.keys().cloned().collect();
        assert_eq!(codes, vec!["BTC", "SCI"]);
        assert_eq!(rates["SCI"], dec!(0.00000015));
    }

    #[tokio::test]
    async fn test_no_rates_is_an_error() {
        let body = r#"{"data": {"currency": "USD", "rates": {}}}"#;
        let server = create_mock_server("USD", 200, body).await;

        let result = provider(&server).fetch_rates("USD").await;
        assert_eq!(
            result.unwrap_err().to_string(),
            "No exchange rates found for currency: USD"
        );
    }

    #[tokio::test]
    async fn test_api_error_response() {
        let server = create_mock_server("USD", 500, "").await;

        let result = provider(&server).fetch_rates("USD").await;
        assert_eq!(
            result.unwrap_err().to_string(),
            "HTTP error: 500 Internal Server Error for currency: USD"
        );
    }

    #[tokio::test]
    async fn test_malformed_response() {
        // "rate" instead of "rates"
        let body = r#"{"data": {"currency": "USD", "rate": {"BTC": "1"}}}"#;
        let server = create_mock_server("USD", 200, body).await;

        let result = provider(&server).fetch_rates("USD").await;
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to parse JSON response for USD")
        );
    }

    #[tokio::test]
    async fn test_slow_upstream_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/exchange-rates"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"data": {"currency": "USD", "rates": {"BTC": "1"}}}"#)
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let provider = CoinbaseProvider::new(&server.uri(), Duration::from_millis(50)).unwrap();
        let result = provider.fetch_rates("USD").await;
        assert!(result.unwrap_err().to_string().starts_with("Request error"));
    }
}
