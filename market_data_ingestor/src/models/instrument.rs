//! Instrument identity and classification.
//!
//! Futures symbols carry the provider's `=` marker (`CL=F`, `CLF=2024`). The
//! marker decides the [`InstrumentKind`] and is stripped from the name used for
//! storage, since it is not a valid identifier character there.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The provider's futures marker.
pub const FUTURES_MARKER: char = '=';

const MAX_SYMBOL_LEN: usize = 10;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InstrumentError {
    #[error("Symbol is empty")]
    Empty,

    #[error("Symbol {symbol:?} is longer than {MAX_SYMBOL_LEN} characters")]
    TooLong { symbol: String },

    #[error("Symbol {symbol:?} contains a non-printable or whitespace character")]
    NotPrintable { symbol: String },

    #[error("Symbol {symbol:?} has nothing left once the futures marker is removed")]
    EmptyStorageName { symbol: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstrumentKind {
    Stock,
    Future,
}

impl InstrumentKind {
    /// Value stored in the registry's `tick_type` column.
    pub const fn as_str(self) -> &'static str {
        match self {
            InstrumentKind::Stock => "Stock",
            InstrumentKind::Future => "Future",
        }
    }

    pub fn classify(symbol: &str) -> Self {
        if symbol.contains(FUTURES_MARKER) {
            InstrumentKind::Future
        } else {
            InstrumentKind::Stock
        }
    }
}

impl fmt::Display for InstrumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tracked symbol together with its kind and storage name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Instrument {
    symbol: String,
    kind: InstrumentKind,
    storage_name: String,
}

impl Instrument {
    /// Validates `symbol` (surrounding whitespace is trimmed, ASCII letters are
    /// upper-cased) and derives kind and storage name from it.
    pub fn parse(symbol: &str) -> Result<Self, InstrumentError> {
        let symbol = symbol.trim();
        if symbol.is_empty() {
            return Err(InstrumentError::Empty);
        }
        if symbol.chars().count() > MAX_SYMBOL_LEN {
            return Err(InstrumentError::TooLong {
                symbol: symbol.to_string(),
            });
        }
        if symbol.chars().any(|c| c.is_control() || c.is_whitespace()) {
            return Err(InstrumentError::NotPrintable {
                symbol: symbol.to_string(),
            });
        }

        // Tickers are case-insensitive upstream; one spelling keeps one set of tables.
        let symbol = symbol.to_ascii_uppercase();
        let storage_name: String = symbol.chars().filter(|&c| c != FUTURES_MARKER).collect();
        if storage_name.is_empty() {
            return Err(InstrumentError::EmptyStorageName {
                symbol: symbol.to_string(),
            });
        }

        Ok(Self {
            kind: InstrumentKind::classify(&symbol),
            symbol,
            storage_name,
        })
    }

    /// The symbol as the provider knows it.
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn kind(&self) -> InstrumentKind {
        self.kind
    }

    /// The symbol with the futures marker removed.
    pub fn storage_name(&self) -> &str {
        &self.storage_name
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.symbol)
    }
}
