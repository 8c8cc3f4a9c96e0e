//! Sampling intervals understood by the pipeline.
//!
//! The codes are the provider's own (`"1m"`, `"90m"`, `"1wk"`, ...) and double as
//! the suffix of the per-interval bar table, so the set is closed: anything not
//! listed in [`Interval::ALL`] is rejected at parse time instead of defaulted.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IntervalError {
    #[error("Unknown interval {input:?}; expected one of: {}", Interval::codes().join(", "))]
    Unknown { input: String },
}

/// One sampling granularity of price bars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Interval {
    OneMinute,
    TwoMinutes,
    FiveMinutes,
    FifteenMinutes,
    ThirtyMinutes,
    SixtyMinutes,
    NinetyMinutes,
    OneHour,
    OneDay,
    FiveDays,
    OneWeek,
    OneMonth,
    ThreeMonths,
}

/// How far back the provider lets a given interval reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalClass {
    /// Finest granularity (1 minute).
    Finest,
    /// Multi-minute intraday bars.
    Intraday,
    /// Hour-sized bars.
    Hourly,
    /// Daily and coarser.
    Daily,
}

impl Interval {
    pub const ALL: [Interval; 13] = [
        Interval::OneMinute,
        Interval::TwoMinutes,
        Interval::FiveMinutes,
        Interval::FifteenMinutes,
        Interval::ThirtyMinutes,
        Interval::SixtyMinutes,
        Interval::NinetyMinutes,
        Interval::OneHour,
        Interval::OneDay,
        Interval::FiveDays,
        Interval::OneWeek,
        Interval::OneMonth,
        Interval::ThreeMonths,
    ];

    pub const fn code(self) -> &'static str {
        match self {
            Interval::OneMinute => "1m",
            Interval::TwoMinutes => "2m",
            Interval::FiveMinutes => "5m",
            Interval::FifteenMinutes => "15m",
            Interval::ThirtyMinutes => "30m",
            Interval::SixtyMinutes => "60m",
            Interval::NinetyMinutes => "90m",
            Interval::OneHour => "1h",
            Interval::OneDay => "1d",
            Interval::FiveDays => "5d",
            Interval::OneWeek => "1wk",
            Interval::OneMonth => "1mo",
            Interval::ThreeMonths => "3mo",
        }
    }

    pub const fn class(self) -> IntervalClass {
        match self {
            Interval::OneMinute => IntervalClass::Finest,
            Interval::TwoMinutes
            | Interval::FiveMinutes
            | Interval::FifteenMinutes
            | Interval::ThirtyMinutes
            | Interval::NinetyMinutes => IntervalClass::Intraday,
            Interval::SixtyMinutes | Interval::OneHour => IntervalClass::Hourly,
            Interval::OneDay
            | Interval::FiveDays
            | Interval::OneWeek
            | Interval::OneMonth
            | Interval::ThreeMonths => IntervalClass::Daily,
        }
    }

    fn codes() -> Vec<&'static str> {
        Self::ALL.iter().map(|i| i.code()).collect()
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Interval {
    type Err = IntervalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Self::ALL
            .into_iter()
            .find(|i| i.code() == trimmed)
            .ok_or_else(|| IntervalError::Unknown {
                input: s.to_string(),
            })
    }
}

impl TryFrom<String> for Interval {
    type Error = IntervalError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Interval> for String {
    fn from(value: Interval) -> Self {
        value.code().to_string()
    }
}
