use reqwest::Url;

use crate::{models::request_params::BarsRequestParams, providers::ProviderError};

pub const BASE_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart/";

/// Builds the chart URL for `symbol`. The symbol is percent-encoded as a path
/// segment, so a stray `/` or `%` cannot change the endpoint.
pub fn chart_url(base: &str, symbol: &str) -> Result<Url, ProviderError> {
    let mut url = Url::parse(base)
        .map_err(|e| ProviderError::Internal(format!("bad base url {base}: {e}")))?;
    url.path_segments_mut()
        .map_err(|_| ProviderError::Internal(format!("base url {base} cannot take a path")))?
        .pop_if_empty()
        .push(symbol);
    Ok(url)
}

/// Query string for one chart request.
pub fn construct_params(params: &BarsRequestParams) -> Result<Vec<(String, String)>, ProviderError> {
    if params.end <= params.start {
        return Err(ProviderError::Validation(format!(
            "end {} is not after start {}",
            params.end, params.start
        )));
    }
    Ok(vec![
        ("period1".to_string(), params.start.timestamp().to_string()),
        ("period2".to_string(), params.end.timestamp().to_string()),
        ("interval".to_string(), params.interval.code().to_string()),
        ("includePrePost".to_string(), "false".to_string()),
    ])
}
