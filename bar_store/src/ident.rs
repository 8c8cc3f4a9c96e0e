//! SQL identifiers derived from instrument symbols.
//!
//! Table and index names are built at runtime from symbols, which are not
//! trusted input. Every such name goes through [`Ident::new`], which accepts
//! only `[A-Za-z0-9_.^-]`, and is always emitted double-quoted.

use std::fmt;

use market_data_ingestor::models::{instrument::Instrument, interval::Interval};
use thiserror::Error;

/// Global instrument registry table.
pub const REGISTRY_TABLE: &str = "ticker";

/// PostgreSQL truncates identifiers past this many bytes.
pub const MAX_IDENT_LEN: usize = 63;

const SEPARATOR: char = '_';

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdentError {
    #[error("identifier is empty")]
    Empty,

    #[error("identifier {0:?} is longer than {MAX_IDENT_LEN} bytes")]
    TooLong(String),

    #[error("identifier {ident:?} contains disallowed character {ch:?}")]
    InvalidChar { ident: String, ch: char },

    #[error("storage name {0:?} is reserved")]
    Reserved(String),
}

fn allowed(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '^' | '-')
}

/// A validated identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ident(String);

impl Ident {
    pub fn new(raw: &str) -> Result<Self, IdentError> {
        if raw.is_empty() {
            return Err(IdentError::Empty);
        }
        if raw.len() > MAX_IDENT_LEN {
            return Err(IdentError::TooLong(raw.to_string()));
        }
        if let Some(ch) = raw.chars().find(|&c| !allowed(c)) {
            return Err(IdentError::InvalidChar {
                ident: raw.to_string(),
                ch,
            });
        }
        Ok(Self(raw.to_string()))
    }

    /// The registry table's own name.
    pub fn registry() -> Self {
        Self(REGISTRY_TABLE.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The identifier wrapped in double quotes, ready to splice into SQL.
    pub fn quoted(&self) -> String {
        format!("\"{}\"", self.0)
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Names of every schema object backing one (instrument, interval) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstrumentTables {
    /// Registry key, the instrument's storage name.
    pub name: String,
    pub interval: Interval,
    /// `<NAME>`: one `downloaded_on` row per interval.
    pub meta: Ident,
    /// `<NAME>_<interval>`: the bars.
    pub bars: Ident,
    /// `<NAME>_<interval>_idx` on `tick_time`.
    pub index: Ident,
}

impl InstrumentTables {
    /// Derives the table names for `instrument` at `interval`.
    ///
    /// The storage name may not contain `_`, otherwise the metadata table of
    /// one symbol could coincide with the bar table of another.
    pub fn new(instrument: &Instrument, interval: Interval) -> Result<Self, IdentError> {
        let name = instrument.storage_name();
        if let Some(ch) = name.chars().find(|&c| c == SEPARATOR || !allowed(c)) {
            return Err(IdentError::InvalidChar {
                ident: name.to_string(),
                ch,
            });
        }
        if name.eq_ignore_ascii_case(REGISTRY_TABLE) {
            return Err(IdentError::Reserved(name.to_string()));
        }

        let bars = format!("{name}{SEPARATOR}{}", interval.code());
        Ok(Self {
            name: name.to_string(),
            interval,
            meta: Ident::new(name)?,
            index: Ident::new(&format!("{bars}{SEPARATOR}idx"))?,
            bars: Ident::new(&bars)?,
        })
    }
}
