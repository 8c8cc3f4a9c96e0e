//! Diesel models for the static registry table in [`crate::schema`].

use diesel::prelude::*;
use market_data_ingestor::models::instrument::InstrumentKind;

use crate::schema::ticker;

/// A row in [`crate::schema::ticker`]: one known instrument and its kind.
#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable)]
#[diesel(table_name = ticker)]
pub struct Ticker {
    /// Storage name (symbol with the futures marker removed).
    pub tick_name: String,
    /// `"Stock"` or `"Future"`.
    pub tick_type: String,
}

/// Insertable form of [`Ticker`].
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = ticker)]
pub struct NewTicker<'a> {
    pub tick_name: &'a str,
    pub tick_type: &'a str,
}

impl<'a> NewTicker<'a> {
    pub fn new(tick_name: &'a str, kind: InstrumentKind) -> Self {
        Self {
            tick_name,
            tick_type: kind.as_str(),
        }
    }
}
