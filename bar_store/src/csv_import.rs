//! Loading bars from a CSV export into the store.
//!
//! The first column is the bar time; `Open`, `High`, `Low`, `Close` and
//! `Volume` are located by header name (case-insensitive). Extra columns such
//! as `Adj Close` are ignored.

use std::{fs::File, io::Read, path::Path};

use anyhow::{Context, anyhow, bail};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use csv::ReaderBuilder;
use market_data_ingestor::models::{bar::Bar, instrument::Instrument, interval::Interval};
use tracing::info;

use crate::{
    db::connection::StoreConnection,
    ident::InstrumentTables,
    pipeline::persist,
    writer::{IngestReport, IngestWriter},
};

const NAIVE_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S"];
const OFFSET_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%:z", "%Y-%m-%d %H:%M:%S%z"];

/// Parses a bar time. Times without an offset are taken as UTC; a bare date
/// is midnight UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Some(t.with_timezone(&Utc));
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(t) = DateTime::parse_from_str(raw, fmt) {
            return Some(t.with_timezone(&Utc));
        }
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(t) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(t.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|t| t.and_utc())
}

fn parse_volume(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Some(0);
    }
    raw.parse::<i64>()
        .ok()
        .or_else(|| raw.parse::<f64>().ok().filter(|v| v.is_finite()).map(|v| v.round() as i64))
}

struct Columns {
    open: usize,
    high: usize,
    low: usize,
    close: usize,
    volume: usize,
}

impl Columns {
    fn locate(headers: &csv::StringRecord) -> anyhow::Result<Self> {
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(name))
                .ok_or_else(|| anyhow!("missing column {name:?}"))
        };
        Ok(Self {
            open: find("open")?,
            high: find("high")?,
            low: find("low")?,
            close: find("close")?,
            volume: find("volume")?,
        })
    }
}

/// Reads bars from CSV text in file order.
pub fn read_bars(input: impl Read) -> anyhow::Result<Vec<Bar>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(input);
    let columns = Columns::locate(reader.headers()?)?;

    let mut bars = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let line = i + 2;
        let record = record.with_context(|| format!("line {line}"))?;
        let field = |idx: usize| record.get(idx).unwrap_or("");
        let price = |idx: usize| -> anyhow::Result<f64> {
            field(idx)
                .trim()
                .parse::<f64>()
                .with_context(|| format!("line {line}: bad price {:?}", field(idx)))
        };

        let Some(timestamp) = parse_timestamp(field(0)) else {
            bail!("line {line}: bad timestamp {:?}", field(0));
        };
        let Some(volume) = parse_volume(field(columns.volume)) else {
            bail!("line {line}: bad volume {:?}", field(columns.volume));
        };
        bars.push(Bar {
            timestamp,
            open: price(columns.open)?,
            high: price(columns.high)?,
            low: price(columns.low)?,
            close: price(columns.close)?,
            volume,
        });
    }
    Ok(bars)
}

/// Loads `path` and stores it as `symbol` at `interval`, the same way a fetch would.
pub fn import_csv(
    conn: &mut StoreConnection,
    writer: &IngestWriter,
    symbol: &str,
    interval: Interval,
    path: &Path,
) -> anyhow::Result<IngestReport> {
    let instrument = Instrument::parse(symbol)?;
    let tables = InstrumentTables::new(&instrument, interval)?;
    let file = File::open(path).with_context(|| format!("could not open {}", path.display()))?;
    let bars = read_bars(file).with_context(|| format!("in {}", path.display()))?;
    if bars.is_empty() {
        bail!("{} has no rows", path.display());
    }

    info!(%symbol, %interval, rows = bars.len(), "Importing CSV");
    Ok(persist(conn, writer, &instrument, &tables, &bars, Utc::now())?)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 2, 14, 30, 0).unwrap();
        assert_eq!(parse_timestamp("2024-01-02T14:30:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2024-01-02 09:30:00-05:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-01-02 14:30:00"), Some(expected));
        assert_eq!(
            parse_timestamp("2024-01-02"),
            Some(Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn reads_yahoo_style_export() {
        let text = "\
Datetime,Open,High,Low,Close,Adj Close,Volume
2024-01-02 09:30:00-05:00,10.0,11.0,9.5,10.5,10.5,1200
2024-01-02 09:35:00-05:00,10.5,10.75,10.25,10.5,10.5,800.0
";
        let bars = read_bars(text.as_bytes()).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].close, 10.5);
        assert_eq!(bars[0].volume, 1200);
        assert_eq!(bars[1].volume, 800);
        assert_eq!(
            bars[1].timestamp,
            Utc.with_ymd_and_hms(2024, 1, 2, 14, 35, 0).unwrap()
        );
    }

    #[test]
    fn headers_are_case_insensitive() {
        let bars = read_bars("date,open,high,low,close,volume\n2024-01-02,1,2,0.5,1.5,7\n".as_bytes())
            .unwrap();
        assert_eq!(bars[0].high, 2.0);
    }

    #[test]
    fn reports_bad_rows() {
        let err = read_bars("Date,Open,High,Low,Close,Volume\n2024-01-02,x,2,1,1,1\n".as_bytes())
            .unwrap_err();
        assert!(format!("{err:#}").contains("line 2"));

        let err = read_bars("Date,Open,High,Low,Close\n".as_bytes()).unwrap_err();
        assert!(err.to_string().contains("Volume") || err.to_string().contains("volume"));
    }
}
