//! Interval policy: which date range to ask the provider for.
//!
//! The provider only keeps fine-grained history for a limited time, so a
//! "full history" request has to be capped per interval:
//!
//! | interval class              | lookback  |
//! |-----------------------------|-----------|
//! | `1m`                        | 6 days    |
//! | `2m 5m 15m 30m 90m`         | 59 days   |
//! | `60m 1h`                    | 729 days  |
//! | anything else               | error     |
//!
//! Everything here is a pure function of the interval, the mode and `now`.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::{America::New_York, Tz};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::interval::{Interval, IntervalClass};

/// Time zone whose calendar defines "the current trading day".
pub const EXCHANGE_TZ: Tz = New_York;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("Interval {interval} has no full-history lookback; use an explicit range instead")]
pub struct UnsupportedIntervalError {
    pub interval: Interval,
}

/// What the caller wants fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FetchMode {
    /// As much history as the provider allows for the interval.
    Full,
    /// Exactly the current trading day.
    Today,
    /// Caller-supplied bounds, passed through untouched.
    Range {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

/// Resolved request bounds: `start` inclusive, `end` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Maximum lookback in days for "full" requests, `None` when the interval has none.
pub const fn max_lookback_days(interval: Interval) -> Option<i64> {
    match interval.class() {
        IntervalClass::Finest => Some(6),
        IntervalClass::Intraday => Some(59),
        IntervalClass::Hourly => Some(729),
        IntervalClass::Daily => None,
    }
}

/// Resolves the effective request window for `interval` under `mode`.
pub fn resolve_window(
    interval: Interval,
    mode: &FetchMode,
    now: DateTime<Utc>,
) -> Result<FetchWindow, UnsupportedIntervalError> {
    match *mode {
        FetchMode::Full => {
            let days = max_lookback_days(interval).ok_or(UnsupportedIntervalError { interval })?;
            let first_day = now.date_naive() - Duration::days(days);
            Ok(FetchWindow {
                start: first_day.and_time(NaiveTime::MIN).and_utc(),
                end: now,
            })
        }
        FetchMode::Today => {
            let today = now.with_timezone(&EXCHANGE_TZ).date_naive();
            Ok(FetchWindow {
                start: exchange_midnight(today),
                end: exchange_midnight(today + Duration::days(1)),
            })
        }
        FetchMode::Range { start, end } => Ok(FetchWindow { start, end }),
    }
}

fn exchange_midnight(day: NaiveDate) -> DateTime<Utc> {
    let midnight = day.and_time(NaiveTime::MIN);
    // US DST transitions happen at 02:00, so local midnight always exists.
    EXCHANGE_TZ
        .from_local_datetime(&midnight)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| midnight.and_utc())
}
