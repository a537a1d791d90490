//! HTTP boundary over [`QueryService`]

use crate::core::error::RateError;
use crate::core::query::QueryService;
use actix_web::error::InternalError;
use actix_web::http::StatusCode;
use actix_web::{App, HttpResponse, HttpServer, ResponseError, get, web};
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Deserialize)]
pub struct ExchangeRatesParams {
    pub base: String,
}

#[derive(Debug, Deserialize)]
pub struct HistoricalRatesParams {
    pub base_currency: String,
    pub target_currency: String,
    /// Epoch milliseconds, inclusive.
    pub start: i64,
    /// Epoch milliseconds, inclusive.
    pub end: i64,
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

/// Errors as presented to HTTP clients.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Exchange rates not found")]
    RatesNotFound,
    #[error("Failed to fetch exchange rates")]
    RatesFailed,
    #[error("Base currency data not found for the specified time period")]
    HistoryNotFound,
    #[error("Failed to fetch historical rates")]
    HistoryFailed,
    #[error("Invalid time range: start must not be after end")]
    InvalidRange,
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(i64),
    #[error("Invalid query parameters: {0}")]
    BadRequest(String),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::RatesNotFound | ApiError::HistoryNotFound => StatusCode::NOT_FOUND,
            ApiError::RatesFailed | ApiError::HistoryFailed => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::InvalidRange | ApiError::InvalidTimestamp(_) | ApiError::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorBody {
            error: &self.to_string(),
        })
    }
}

fn to_number(rate: Decimal) -> f64 {
    rate.to_f64().unwrap_or(f64::NAN)
}

fn parse_millis(ms: i64) -> Result<DateTime<Utc>, ApiError> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or(ApiError::InvalidTimestamp(ms))
}

#[get("/exchange-rates")]
async fn exchange_rates(
    service: web::Data<QueryService>,
    params: web::Query<ExchangeRatesParams>,
) -> Result<HttpResponse, ApiError> {
    let rates = service
        .current_rates(&params.base)
        .await
        .map_err(|e| match e {
            RateError::NotFound { .. } => ApiError::RatesNotFound,
            e => {
                error!(error = %e, base = %params.base, "Failed to read exchange rates");
                ApiError::RatesFailed
            }
        })?;

    let body: BTreeMap<String, f64> = rates
        .into_iter()
        .map(|(code, rate)| (code, to_number(rate)))
        .collect();
    Ok(HttpResponse::Ok().json(body))
}

#[get("/historical-rates")]
async fn historical_rates(
    service: web::Data<QueryService>,
    params: web::Query<HistoricalRatesParams>,
) -> Result<HttpResponse, ApiError> {
    let start = parse_millis(params.start)?;
    let end = parse_millis(params.end)?;

    let history = service
        .historical_rates(&params.base_currency, &params.target_currency, start, end)
        .await
        .map_err(|e| match e {
            RateError::NotFound { .. } => ApiError::HistoryNotFound,
            RateError::InvalidRange { .. } => ApiError::InvalidRange,
            e => {
                error!(
                    error = %e,
                    base = %params.base_currency,
                    target = %params.target_currency,
                    "Failed to read historical rates"
                );
                ApiError::HistoryFailed
            }
        })?;

    if history.is_empty() {
        return Err(ApiError::HistoryNotFound);
    }

    let body: BTreeMap<i64, f64> = history
        .into_iter()
        .map(|(ts, rate)| (ts.timestamp_millis(), to_number(rate)))
        .collect();
    Ok(HttpResponse::Ok().json(body))
}

#[get("/health")]
async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "status": "ok" }))
}

/// Registers routes and extractor settings; shared by the server and tests.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::QueryConfig::default().error_handler(|err, _req| {
        let api_error = ApiError::BadRequest(err.to_string());
        let response = api_error.error_response();
        InternalError::from_response(err, response).into()
    }))
    .service(exchange_rates)
    .service(historical_rates)
    .service(health);
}

/// Serves until the process receives a shutdown signal.
pub async fn run_server(bind: SocketAddr, service: QueryService) -> std::io::Result<()> {
    let data = web::Data::new(service);
    info!("Server is running on {}", bind);

    HttpServer::new(move || App::new().app_data(data.clone()).configure(configure))
        .bind(bind)?
        .run()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::Result as RateResult;
    use crate::core::rates::{ExchangeRateRecord, RateMap};
    use crate::core::store::RateStore;
    use crate::store::memory::MemoryRateStore;
    use actix_web::test;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use serde_json::Value;
    use std::sync::Arc;

    fn ts(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).unwrap()
    }

    async fn seeded_service() -> QueryService {
        let store = Arc::new(MemoryRateStore::new());
        store
            .upsert(
                "crypto",
                ts(1000),
                [("BTC".to_string(), dec!(50000)), ("ETH".to_string(), dec!(3000))].into(),
            )
            .await
            .unwrap();
        store
            .upsert("crypto", ts(2000), [("BTC".to_string(), dec!(51000))].into())
            .await
            .unwrap();
        QueryService::new(store)
    }

    struct BrokenStore;

    #[async_trait]
    impl RateStore for BrokenStore {
        async fn upsert(&self, _: &str, _: DateTime<Utc>, _: RateMap) -> RateResult<()> {
            Err(RateError::Storage("disk on fire".to_string()))
        }

        async fn get_current(&self, _: &str) -> RateResult<ExchangeRateRecord> {
            Err(RateError::Storage("disk on fire".to_string()))
        }

        async fn get_range(
            &self,
            _: &str,
            _: &str,
            _: DateTime<Utc>,
            _: DateTime<Utc>,
        ) -> RateResult<Vec<(DateTime<Utc>, Decimal)>> {
            Err(RateError::Storage("disk on fire".to_string()))
        }

        async fn bases(&self) -> RateResult<Vec<String>> {
            Ok(Vec::new())
        }
    }

    macro_rules! app {
        ($service:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new($service))
                    .configure(configure),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn test_exchange_rates_ok() {
        let app = app!(seeded_service().await);
        let req = test::TestRequest::get()
            .uri("/exchange-rates?base=crypto")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body, json!({ "BTC": 51000.0 }));
    }

    #[actix_web::test]
    async fn test_exchange_rates_unknown_base() {
        let app = app!(seeded_service().await);
        let req = test::TestRequest::get()
            .uri("/exchange-rates?base=unknown")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body, json!({ "error": "Exchange rates not found" }));
    }

    #[actix_web::test]
    async fn test_exchange_rates_storage_failure() {
        let app = app!(QueryService::new(Arc::new(BrokenStore)));
        let req = test::TestRequest::get()
            .uri("/exchange-rates?base=crypto")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body, json!({ "error": "Failed to fetch exchange rates" }));
    }

    #[actix_web::test]
    async fn test_missing_base_is_bad_request() {
        let app = app!(seeded_service().await);
        let req = test::TestRequest::get().uri("/exchange-rates").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: Value = test::read_body_json(resp).await;
        assert!(body["error"].as_str().unwrap().starts_with("Invalid query parameters"));
    }

    #[actix_web::test]
    async fn test_historical_rates_ok() {
        let app = app!(seeded_service().await);
        let req = test::TestRequest::get()
            .uri("/historical-rates?base_currency=crypto&target_currency=BTC&start=1000&end=2000")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body, json!({ "1000": 50000.0, "2000": 51000.0 }));
    }

    #[actix_web::test]
    async fn test_historical_rates_empty_range_is_not_found() {
        let app = app!(seeded_service().await);
        let req = test::TestRequest::get()
            .uri("/historical-rates?base_currency=crypto&target_currency=BTC&start=1500&end=1999")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(
            body,
            json!({ "error": "Base currency data not found for the specified time period" })
        );
    }

    #[actix_web::test]
    async fn test_historical_rates_inverted_range() {
        let app = app!(seeded_service().await);
        let req = test::TestRequest::get()
            .uri("/historical-rates?base_currency=crypto&target_currency=BTC&start=2000&end=1000")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_historical_rates_non_numeric_bounds() {
        let app = app!(seeded_service().await);
        let req = test::TestRequest::get()
            .uri("/historical-rates?base_currency=crypto&target_currency=BTC&start=yesterday&end=1000")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_historical_rates_storage_failure() {
        let app = app!(QueryService::new(Arc::new(BrokenStore)));
        let req = test::TestRequest::get()
            .uri("/historical-rates?base_currency=crypto&target_currency=BTC&start=0&end=1")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body, json!({ "error": "Failed to fetch historical rates" }));
    }

    #[actix_web::test]
    async fn test_health() {
        let app = app!(seeded_service().await);
        let req = test::TestRequest::get().uri("/health").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
