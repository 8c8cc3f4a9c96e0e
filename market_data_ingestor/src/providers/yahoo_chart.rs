//! Yahoo Finance chart API (`/v8/finance/chart/{symbol}`).
//!
//! This is the endpoint behind the usual "download history" tooling. Its
//! interval codes are the ones [`Interval`](crate::models::interval::Interval)
//! uses, and it enforces the lookback caps encoded in [`crate::policy`].

pub mod params;
pub mod provider;
pub mod response;

pub use provider::YahooChartProvider;
