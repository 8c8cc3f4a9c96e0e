use std::num::NonZeroU32;

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use nonzero_ext::nonzero;
use reqwest::{Client, header};
use tracing::debug;

use crate::{
    models::{bar::BarSeries, request_params::BarsRequestParams},
    providers::{
        DataProvider, ProviderError, ProviderInitError,
        yahoo_chart::{
            params::{BASE_URL, chart_url, construct_params},
            response::ChartResponse,
        },
    },
};

/// Yahoo starts answering 429 well before this, but only in bursts.
const REQUESTS_PER_SECOND: NonZeroU32 = nonzero!(2u32);

/// The chart endpoint rejects reqwest's default (empty) user agent.
const USER_AGENT: &str = concat!("Mozilla/5.0 (compatible; market-saver/", env!("CARGO_PKG_VERSION"), ")");

pub struct YahooChartProvider {
    client: Client,
    base_url: String,
    pacer: DefaultDirectRateLimiter,
}

impl YahooChartProvider {
    /// Creates a provider for the public chart endpoint. No credentials needed.
    pub fn new() -> Result<Self, ProviderInitError> {
        Self::with_base_url(BASE_URL, REQUESTS_PER_SECOND)
    }

    /// Points the provider at another host (a mirror, or a local fake in tests).
    pub fn with_base_url(
        base_url: &str,
        requests_per_second: NonZeroU32,
    ) -> Result<Self, ProviderInitError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .default_headers(headers)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.to_string(),
            pacer: RateLimiter::direct(Quota::per_second(requests_per_second)),
        })
    }
}

#[async_trait]
impl DataProvider for YahooChartProvider {
    async fn fetch_bars(&self, params: BarsRequestParams) -> Result<BarSeries, ProviderError> {
        let url = chart_url(&self.base_url, &params.symbol)?;
        let query = construct_params(&params)?;

        self.pacer.until_ready().await;
        let response = self.client.get(url).query(&query).send().await?;
        let status = response.status();
        let body = response.text().await?;

        // Errors still come wrapped in the chart envelope, so try that first.
        let bars = match serde_json::from_str::<ChartResponse>(&body) {
            Ok(parsed) => parsed.into_bars()?,
            Err(_) if !status.is_success() => {
                return Err(ProviderError::Api(format!("{status}: {}", truncate(&body))));
            }
            Err(e) => {
                return Err(ProviderError::Internal(format!("malformed chart response: {e}")));
            }
        };
        if !status.is_success() {
            return Err(ProviderError::Api(status.to_string()));
        }

        debug!(symbol = %params.symbol, interval = %params.interval, count = bars.len(), "yahoo chart");
        Ok(BarSeries::new(params.symbol, params.interval, bars))
    }
}

fn truncate(body: &str) -> &str {
    match body.char_indices().nth(200) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}
