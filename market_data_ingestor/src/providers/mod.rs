//! Provider abstraction for market data sources.
//!
//! This module defines the [`DataProvider`] trait, which serves as a unified interface
//! for fetching time-series bar data from any market data vendor (e.g., Yahoo, Alpaca).
//!
//! Each concrete provider implementation should implement [`DataProvider`] to handle
//! vendor-specific API logic and validation.
//!
//! The trait is designed for async usage and supports dynamic dispatch (`dyn DataProvider`)
//! for runtime selection of providers.
//!
//! # Example
//!
//! ```rust
//! use async_trait::async_trait;
//! use market_data_ingestor::models::{bar::BarSeries, request_params::BarsRequestParams};
//! use market_data_ingestor::providers::{DataProvider, ProviderError};
//!
//! struct MyProvider;
//!
//! #[async_trait]
//! impl DataProvider for MyProvider {
//!     async fn fetch_bars(&self, params: BarsRequestParams) -> Result<BarSeries, ProviderError> {
//!         Ok(BarSeries::new(params.symbol, params.interval, vec![]))
//!     }
//! }
//! ```

pub mod alpaca_rest;
pub mod yahoo_chart;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shared_utils::env::MissingEnvVarError;
use thiserror::Error;

use crate::models::{bar::BarSeries, request_params::BarsRequestParams};

/// Trait for fetching time-series bar data from a market data provider.
#[async_trait]
pub trait DataProvider: Send + Sync {
    /// Fetches the bars of one symbol for the given request parameters.
    ///
    /// An empty series is a successful answer; deciding what that means is up to the caller.
    async fn fetch_bars(&self, params: BarsRequestParams) -> Result<BarSeries, ProviderError>;
}

/// Which upstream to use (serde snake_case).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderId {
    /// Yahoo Finance chart API.
    #[default]
    Yahoo,
    /// Alpaca market data API.
    Alpaca,
}

/// Errors that can occur during the creation of a provider instance
#[derive(Debug, Error)]
pub enum ProviderInitError {
    /// missed environment variable.
    #[error(transparent)]
    MissingEnvVar(#[from] MissingEnvVarError),

    /// failed to init reqwest client
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(#[from] reqwest::Error),

    /// API key contains invalid characters.
    #[error("Invalid API key format: {0}")]
    InvalidApiKey(#[from] reqwest::header::InvalidHeaderValue),
}

/// Errors that can occur within a `DataProvider` implementation.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// An error during an API request (e.g., network failure, timeout).
    #[error("API request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The provider's API returned a specific error message (e.g., invalid API key).
    #[error("API error: {0}")]
    Api(String),

    /// The request parameters were invalid for this specific provider.
    #[error("Invalid parameters for provider: {0}")]
    Validation(String),

    /// An internal error occurred while processing data within the provider.
    #[error("Internal provider error: {0}")]
    Internal(String),
}

/// Builds the provider matching `id`.
pub fn build_provider(id: ProviderId) -> Result<Box<dyn DataProvider>, ProviderInitError> {
    match id {
        ProviderId::Yahoo => Ok(Box::new(yahoo_chart::YahooChartProvider::new()?)),
        ProviderId::Alpaca => Ok(Box::new(alpaca_rest::AlpacaProvider::new()?)),
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::Utc;

    use crate::models::interval::Interval;

    use super::*;

    struct CannedProvider;
    struct BrokenProvider;

    #[async_trait]
    impl DataProvider for CannedProvider {
        async fn fetch_bars(&self, params: BarsRequestParams) -> Result<BarSeries, ProviderError> {
            Ok(BarSeries::new(params.symbol, params.interval, vec![]))
        }
    }

    #[async_trait]
    impl DataProvider for BrokenProvider {
        async fn fetch_bars(&self, _params: BarsRequestParams) -> Result<BarSeries, ProviderError> {
            Err(ProviderError::Api("Too Many Requests".into()))
        }
    }

    // Chosen at runtime, which only works through `Box<dyn DataProvider>`.
    fn get_provider(name: &str) -> Box<dyn DataProvider> {
        if name == "canned" {
            Box::new(CannedProvider)
        } else {
            Box::new(BrokenProvider)
        }
    }

    fn params() -> BarsRequestParams {
        BarsRequestParams {
            symbol: "ES=F".to_string(),
            interval: Interval::OneDay,
            start: Utc::now(),
            end: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_dynamic_provider() {
        let series = get_provider("canned").fetch_bars(params()).await.unwrap();
        assert_eq!(series.symbol, "ES=F");
        assert_eq!(series.interval, Interval::OneDay);

        let err = get_provider("broken").fetch_bars(params()).await.unwrap_err();
        assert_eq!(err.to_string(), "API error: Too Many Requests");
    }

    #[test]
    fn provider_ids_use_snake_case() {
        #[derive(Deserialize)]
        struct Wrapper {
            provider: ProviderId,
        }
        let w: Wrapper = serde_json::from_str(r#"{"provider":"alpaca"}"#).unwrap();
        assert_eq!(w.provider, ProviderId::Alpaca);
        assert_eq!(ProviderId::default(), ProviderId::Yahoo);
    }
}
