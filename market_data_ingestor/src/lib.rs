//! Fetch side of the market-saver pipeline.
//!
//! - [`models`]: instruments, intervals and the vendor-neutral [`Bar`](models::bar::Bar).
//! - [`policy`]: which window to request for an interval.
//! - [`providers`]: the [`DataProvider`](providers::DataProvider) seam and its vendors.
//! - [`fetcher`]: provider calls with a deadline and normalized failures.

pub mod fetcher;
pub mod models;
pub mod policy;
pub mod providers;
