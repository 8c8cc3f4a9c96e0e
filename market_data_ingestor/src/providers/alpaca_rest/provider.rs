use std::num::NonZeroU32;

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use nonzero_ext::nonzero;
use reqwest::{Client, header};
use secrecy::{ExposeSecret, SecretString};
use shared_utils::env::get_env_var;
use tracing::debug;

use crate::{
    models::{
        bar::{Bar, BarSeries},
        request_params::BarsRequestParams,
    },
    providers::{
        DataProvider, ProviderError, ProviderInitError,
        alpaca_rest::{
            params::{AlpacaBarsParams, alpaca_timeframe, construct_params},
            response::AlpacaResponse,
        },
    },
};

const BASE_URL: &str = "https://data.alpaca.markets/v2/stocks/bars";

/// Free plan allowance is 200 requests per minute.
const REQUESTS_PER_SECOND: NonZeroU32 = nonzero!(3u32);

pub struct AlpacaProvider {
    client: Client,
    settings: AlpacaBarsParams,
    pacer: DefaultDirectRateLimiter,
    _api_key: SecretString,
    _secret_key: SecretString,
}

impl AlpacaProvider {
    /// Creates a new Alpaca provider.
    ///
    /// Reads API keys from the `APCA_API_KEY_ID` and `APCA_API_SECRET_KEY`
    /// environment variables.
    pub fn new() -> Result<Self, ProviderInitError> {
        Self::with_settings(AlpacaBarsParams::default())
    }

    pub fn with_settings(settings: AlpacaBarsParams) -> Result<Self, ProviderInitError> {
        let api_key = SecretString::new(get_env_var("APCA_API_KEY_ID")?.into());
        let secret_key = SecretString::new(get_env_var("APCA_API_SECRET_KEY")?.into());

        let mut headers = header::HeaderMap::new();
        let mut key_value = header::HeaderValue::from_str(api_key.expose_secret())?;
        key_value.set_sensitive(true);
        headers.insert("APCA-API-KEY-ID", key_value);
        let mut secret_value = header::HeaderValue::from_str(secret_key.expose_secret())?;
        secret_value.set_sensitive(true);
        headers.insert("APCA-API-SECRET-KEY", secret_value);

        let client = Client::builder().default_headers(headers).build()?;

        Ok(Self {
            client,
            settings,
            pacer: RateLimiter::direct(Quota::per_second(REQUESTS_PER_SECOND)),
            _api_key: api_key,
            _secret_key: secret_key,
        })
    }
}

#[async_trait]
impl DataProvider for AlpacaProvider {
    async fn fetch_bars(&self, params: BarsRequestParams) -> Result<BarSeries, ProviderError> {
        // Validate the interval before spending a request on it.
        alpaca_timeframe(params.interval)?;

        let mut bars: Vec<Bar> = Vec::new();
        let mut next_page_token: Option<String> = None;

        loop {
            let mut query_params = construct_params(&params, &self.settings)?;
            if let Some(token) = &next_page_token {
                query_params.push(("page_token".to_string(), token.clone()));
            }

            self.pacer.until_ready().await;
            let response = self.client.get(BASE_URL).query(&query_params).send().await?;

            if !response.status().is_success() {
                let status = response.status();
                let error_msg = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown API error".to_string());
                return Err(ProviderError::Api(format!("{status}: {error_msg}")));
            }

            let page = response.json::<AlpacaResponse>().await?;

            // The endpoint is multi-symbol; only ours was asked for.
            if let Some(mut by_symbol) = page.bars {
                if let Some(page_bars) = by_symbol.swap_remove(&params.symbol) {
                    debug!(symbol = %params.symbol, count = page_bars.len(), "alpaca page");
                    bars.extend(page_bars.into_iter().map(Bar::from));
                }
            }

            // If there's a next page token, use it for the next iteration. Otherwise, we're done.
            match page.next_page_token {
                Some(token) => next_page_token = Some(token),
                None => break,
            }
        }

        Ok(BarSeries::new(params.symbol, params.interval, bars))
    }
}
