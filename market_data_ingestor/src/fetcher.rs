//! Market data fetcher: one provider call per (symbol, interval), bounded in time.
//!
//! Every way a fetch can go wrong collapses into [`FetchError`], and both
//! variants are recoverable: the caller skips that unit and moves on.

use std::{sync::Arc, time::Duration};

use thiserror::Error;
use tracing::{error, info, warn};

use crate::{
    models::{bar::BarSeries, interval::Interval, request_params::BarsRequestParams},
    policy::FetchWindow,
    providers::DataProvider,
};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The provider answered, but with zero bars.
    #[error("No bars returned for {symbol} ({interval})")]
    Empty { symbol: String, interval: Interval },

    /// The provider failed or did not answer in time.
    #[error("Provider failure for {symbol} ({interval}): {detail}")]
    ProviderFailure {
        symbol: String,
        interval: Interval,
        detail: String,
    },
}

#[derive(Clone)]
pub struct MarketDataFetcher {
    provider: Arc<dyn DataProvider>,
    timeout: Duration,
}

impl MarketDataFetcher {
    pub fn new(provider: Arc<dyn DataProvider>) -> Self {
        Self::with_timeout(provider, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(provider: Arc<dyn DataProvider>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Fetches `symbol` over `window`; bars come back in provider order.
    pub async fn fetch(
        &self,
        symbol: &str,
        window: FetchWindow,
        interval: Interval,
    ) -> Result<BarSeries, FetchError> {
        let params = BarsRequestParams {
            symbol: symbol.to_string(),
            interval,
            start: window.start,
            end: window.end,
        };

        let failure = |detail: String| {
            error!(%symbol, %interval, %detail, "Could not download ticker");
            FetchError::ProviderFailure {
                symbol: symbol.to_string(),
                interval,
                detail,
            }
        };

        let series = match tokio::time::timeout(self.timeout, self.provider.fetch_bars(params)).await {
            Ok(Ok(series)) => series,
            Ok(Err(e)) => return Err(failure(e.to_string())),
            Err(_) => return Err(failure(format!("timed out after {:?}", self.timeout))),
        };

        if series.is_empty() {
            warn!(%symbol, %interval, start = %window.start, end = %window.end, "Provider returned no bars");
            return Err(FetchError::Empty {
                symbol: symbol.to_string(),
                interval,
            });
        }

        info!(%symbol, %interval, bars = series.len(), "Downloaded");
        Ok(series)
    }
}
