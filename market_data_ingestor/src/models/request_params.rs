use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::interval::Interval;

/// Universal parameters for requesting time-series bar data from any market data provider.
///
/// One request covers one symbol. **Validation of the interval against what a vendor
/// actually serves is performed by each data provider implementation.**
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BarsRequestParams {
    /// Symbol as the provider spells it (e.g., `"AAPL"`, `"CL=F"`).
    pub symbol: String,

    /// The sampling interval of each bar.
    pub interval: Interval,

    /// Start of the requested time range (inclusive, UTC).
    pub start: DateTime<Utc>,

    /// End of the requested time range (exclusive, UTC).
    pub end: DateTime<Utc>,
}
