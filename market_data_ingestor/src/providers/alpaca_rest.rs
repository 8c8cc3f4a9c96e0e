//! Alpaca market data REST API (`/v2/stocks/bars`).

pub mod params;
pub mod provider;
pub mod response;

pub use provider::AlpacaProvider;
