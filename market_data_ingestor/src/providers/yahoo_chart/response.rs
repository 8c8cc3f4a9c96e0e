use chrono::DateTime;
use serde::Deserialize;

use crate::{models::bar::Bar, providers::ProviderError};

#[derive(Deserialize, Debug)]
pub struct ChartResponse {
    pub chart: Chart,
}

#[derive(Deserialize, Debug)]
pub struct Chart {
    #[serde(default)]
    pub result: Option<Vec<ChartResult>>,
    #[serde(default)]
    pub error: Option<ChartError>,
}

#[derive(Deserialize, Debug)]
pub struct ChartError {
    pub code: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct ChartResult {
    /// Absent when the window holds no bars.
    #[serde(default)]
    pub timestamp: Vec<i64>,
    pub indicators: Indicators,
}

#[derive(Deserialize, Debug)]
pub struct Indicators {
    #[serde(default)]
    pub quote: Vec<Quote>,
}

/// Column-oriented OHLCV; gaps come through as `null`.
#[derive(Deserialize, Debug, Default)]
pub struct Quote {
    #[serde(default)]
    pub open: Vec<Option<f64>>,
    #[serde(default)]
    pub high: Vec<Option<f64>>,
    #[serde(default)]
    pub low: Vec<Option<f64>>,
    #[serde(default)]
    pub close: Vec<Option<f64>>,
    #[serde(default)]
    pub volume: Vec<Option<f64>>,
}

impl ChartError {
    pub fn message(&self) -> String {
        match &self.description {
            Some(d) => format!("{}: {d}", self.code),
            None => self.code.clone(),
        }
    }
}

impl ChartResponse {
    /// Flattens the columnar payload into bars, in the order Yahoo sent them.
    ///
    /// Rows missing any price are dropped; a missing volume counts as zero.
    pub fn into_bars(self) -> Result<Vec<Bar>, ProviderError> {
        if let Some(err) = self.chart.error {
            return Err(ProviderError::Api(err.message()));
        }
        let Some(result) = self.chart.result.and_then(|r| r.into_iter().next()) else {
            return Ok(Vec::new());
        };
        let quote = result.indicators.quote.into_iter().next().unwrap_or_default();

        let mut bars = Vec::with_capacity(result.timestamp.len());
        for (i, ts) in result.timestamp.iter().copied().enumerate() {
            let cell = |col: &[Option<f64>]| col.get(i).copied().flatten();
            let (Some(open), Some(high), Some(low), Some(close)) = (
                cell(&quote.open),
                cell(&quote.high),
                cell(&quote.low),
                cell(&quote.close),
            ) else {
                continue;
            };
            let timestamp = DateTime::from_timestamp(ts, 0)
                .ok_or_else(|| ProviderError::Internal(format!("timestamp {ts} out of range")))?;
            bars.push(Bar {
                timestamp,
                open,
                high,
                low,
                close,
                volume: cell(&quote.volume).map_or(0, |v| v.round() as i64),
            });
        }
        Ok(bars)
    }
}
