//! Core business logic abstractions

pub mod config;
pub mod error;
pub mod log;
pub mod provider;
pub mod query;
pub mod rates;
pub mod retention;
pub mod store;

// Re-export main types for cleaner imports
pub use error::RateError;
pub use provider::RateProvider;
pub use query::QueryService;
pub use rates::{ExchangeRateRecord, RateMap, Snapshot};
pub use store::RateStore;
