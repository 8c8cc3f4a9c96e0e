use serde::{Deserialize, Serialize};

use crate::{
    models::{interval::Interval, request_params::BarsRequestParams},
    providers::ProviderError,
};

/// Largest page Alpaca serves per request.
pub const PAGE_LIMIT: u32 = 10_000;

/// Specifies the corporate action adjustment for stock data.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Adjustment {
    #[default]
    Raw,
    Split,
    Dividend,
    All,
}

impl Adjustment {
    pub const fn as_str(self) -> &'static str {
        match self {
            Adjustment::Raw => "raw",
            Adjustment::Split => "split",
            Adjustment::Dividend => "dividend",
            Adjustment::All => "all",
        }
    }
}

/// Specifies the source feed for stock data.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Feed {
    Sip,
    #[default]
    Iex,
    Otc,
}

impl Feed {
    pub const fn as_str(self) -> &'static str {
        match self {
            Feed::Sip => "sip",
            Feed::Iex => "iex",
            Feed::Otc => "otc",
        }
    }
}

/// Alpaca-specific settings applied to every bars request.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct AlpacaBarsParams {
    #[serde(default)]
    pub adjustment: Adjustment,
    #[serde(default)]
    pub feed: Feed,
}

/// Maps an interval onto Alpaca's `timeframe` query value.
///
/// Alpaca accepts 1-59 minutes, 1-23 hours, one day, one week and
/// 1/2/3/4/6/12 months; `90m` and `5d` have no equivalent.
pub fn alpaca_timeframe(interval: Interval) -> Result<&'static str, ProviderError> {
    let tf = match interval {
        Interval::OneMinute => "1Min",
        Interval::TwoMinutes => "2Min",
        Interval::FiveMinutes => "5Min",
        Interval::FifteenMinutes => "15Min",
        Interval::ThirtyMinutes => "30Min",
        Interval::SixtyMinutes | Interval::OneHour => "1Hour",
        Interval::OneDay => "1Day",
        Interval::OneWeek => "1Week",
        Interval::OneMonth => "1Month",
        Interval::ThreeMonths => "3Month",
        Interval::NinetyMinutes | Interval::FiveDays => {
            return Err(ProviderError::Validation(format!(
                "Alpaca has no timeframe for interval {interval}"
            )));
        }
    };
    Ok(tf)
}

/// Builds the query string for one page of a bars request.
pub fn construct_params(
    params: &BarsRequestParams,
    settings: &AlpacaBarsParams,
) -> Result<Vec<(String, String)>, ProviderError> {
    Ok(vec![
        ("symbols".to_string(), params.symbol.clone()),
        (
            "timeframe".to_string(),
            alpaca_timeframe(params.interval)?.to_string(),
        ),
        ("start".to_string(), params.start.to_rfc3339()),
        ("end".to_string(), params.end.to_rfc3339()),
        ("limit".to_string(), PAGE_LIMIT.to_string()),
        (
            "adjustment".to_string(),
            settings.adjustment.as_str().to_string(),
        ),
        ("feed".to_string(), settings.feed.as_str().to_string()),
        ("sort".to_string(), "asc".to_string()),
    ])
}
