//! Orchestrator: runs every (symbol, interval) unit through policy, fetch,
//! schema and writer.
//!
//! Units are independent. Each one gets its own database connection on a
//! blocking thread, and whatever goes wrong inside a unit ends up in its
//! [`UnitOutcome`] instead of stopping the batch.

use std::{any::Any, fmt, panic::AssertUnwindSafe, sync::Arc};

use chrono::{DateTime, Utc};
use futures::{FutureExt, StreamExt, stream};
use market_data_ingestor::{
    fetcher::{FetchError, MarketDataFetcher},
    models::{
        bar::Bar,
        instrument::{Instrument, InstrumentError},
        interval::Interval,
    },
    policy::{FetchMode, UnsupportedIntervalError, resolve_window},
};
use thiserror::Error;
use tracing::{Instrument as _, Span, error, info, info_span, warn};

use crate::{
    db::connection::{ConnectError, StoreConnection},
    ident::{IdentError, InstrumentTables},
    schema_manager::{StorageError, ensure_storage},
    writer::{IngestError, IngestReport, IngestWriter},
};

pub const DEFAULT_CONCURRENCY: usize = 4;

/// Storage-side failure of one unit.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Ingest(#[from] IngestError),
}

/// Why a unit produced nothing.
#[derive(Debug, Error)]
pub enum UnitFailure {
    #[error(transparent)]
    Symbol(#[from] InstrumentError),

    #[error("unusable storage name: {0}")]
    Identifier(#[from] IdentError),

    #[error(transparent)]
    Interval(#[from] UnsupportedIntervalError),

    #[error(transparent)]
    Fetch(FetchError),

    #[error(transparent)]
    Persist(#[from] PersistError),

    #[error("worker aborted: {0}")]
    Aborted(String),
}

/// One (symbol, interval) pair to ingest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkUnit {
    pub symbol: String,
    pub interval: Interval,
}

impl fmt::Display for WorkUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.symbol, self.interval)
    }
}

#[derive(Debug)]
pub enum UnitOutcome {
    Ingested(IngestReport),
    /// The provider had no bars; nothing was touched.
    Skipped,
    Failed(UnitFailure),
}

#[derive(Debug)]
pub struct UnitResult {
    pub unit: WorkUnit,
    pub outcome: UnitOutcome,
}

/// Aggregate of one batch.
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub ingested: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Bars inserted or overwritten across all units.
    pub bars_written: usize,
    /// Bars whose timestamp was already stored.
    pub collisions: usize,
    /// Bars that could not be written.
    pub bars_failed: usize,
    /// Per-unit results in completion order.
    pub units: Vec<UnitResult>,
}

impl BatchSummary {
    fn record(&mut self, result: UnitResult) {
        match &result.outcome {
            UnitOutcome::Ingested(report) => {
                self.ingested += 1;
                self.bars_written += report.written();
                self.collisions += report.collisions();
                self.bars_failed += report.failed;
            }
            UnitOutcome::Skipped => self.skipped += 1,
            UnitOutcome::Failed(_) => self.failed += 1,
        }
        self.units.push(result);
    }

    pub fn outcome_of(&self, symbol: &str, interval: Interval) -> Option<&UnitOutcome> {
        self.units
            .iter()
            .find(|r| r.unit.symbol == symbol && r.unit.interval == interval)
            .map(|r| &r.outcome)
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ingested, {} skipped, {} failed; {} bars written, {} collisions, {} bar failures",
            self.ingested,
            self.skipped,
            self.failed,
            self.bars_written,
            self.collisions,
            self.bars_failed
        )
    }
}

/// Ensures storage for `instrument` and writes `bars` into it.
///
/// Shared by the fetch pipeline and CSV import.
pub fn persist(
    conn: &mut StoreConnection,
    writer: &IngestWriter,
    instrument: &Instrument,
    tables: &InstrumentTables,
    bars: &[Bar],
    downloaded_on: DateTime<Utc>,
) -> Result<IngestReport, PersistError> {
    ensure_storage(conn, tables)?;
    Ok(writer.ingest(conn, instrument, tables, bars, downloaded_on)?)
}

#[derive(Clone)]
pub struct Pipeline {
    fetcher: MarketDataFetcher,
    database_url: Arc<str>,
    writer: IngestWriter,
    mode: FetchMode,
    concurrency: usize,
}

impl Pipeline {
    pub fn new(fetcher: MarketDataFetcher, database_url: &str, mode: FetchMode) -> Self {
        Self {
            fetcher,
            database_url: Arc::from(database_url),
            writer: IngestWriter::default(),
            mode,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    pub fn with_writer(mut self, writer: IngestWriter) -> Self {
        self.writer = writer;
        self
    }

    /// Number of units in flight at once; clamped to at least 1.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Every symbol crossed with every interval, intervals in the given order.
    pub fn units(symbols: &[String], intervals: &[Interval]) -> Vec<WorkUnit> {
        symbols
            .iter()
            .flat_map(|symbol| {
                intervals.iter().map(move |&interval| WorkUnit {
                    symbol: symbol.clone(),
                    interval,
                })
            })
            .collect()
    }

    pub async fn run(&self, symbols: &[String], intervals: &[Interval]) -> BatchSummary {
        let units = Self::units(symbols, intervals);
        info!(units = units.len(), concurrency = self.concurrency, "Starting batch");

        let mut results = stream::iter(units)
            .map(|unit| async move {
                let span = info_span!("ingest", symbol = %unit.symbol, interval = %unit.interval);
                let outcome = self.run_unit(&unit).instrument(span).await;
                UnitResult { unit, outcome }
            })
            .buffer_unordered(self.concurrency);

        let mut summary = BatchSummary::default();
        while let Some(result) = results.next().await {
            summary.record(result);
        }

        info!(%summary, "Batch finished");
        summary
    }

    /// Runs one unit to completion; never panics or propagates.
    ///
    /// A panic anywhere in the unit, provider code included, becomes
    /// [`UnitFailure::Aborted`].
    pub async fn run_unit(&self, unit: &WorkUnit) -> UnitOutcome {
        let attempt = AssertUnwindSafe(self.try_unit(unit))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Err(UnitFailure::Aborted(panic_message(payload.as_ref()))));

        match attempt {
            Ok(Some(report)) => UnitOutcome::Ingested(report),
            Ok(None) => UnitOutcome::Skipped,
            Err(failure) => {
                error!(error = %failure, "Unit failed");
                UnitOutcome::Failed(failure)
            }
        }
    }

    async fn try_unit(&self, unit: &WorkUnit) -> Result<Option<IngestReport>, UnitFailure> {
        let instrument = Instrument::parse(&unit.symbol)?;
        let tables = InstrumentTables::new(&instrument, unit.interval)?;
        let window = resolve_window(unit.interval, &self.mode, Utc::now())?;

        let series = match self
            .fetcher
            .fetch(instrument.symbol(), window, unit.interval)
            .await
        {
            Ok(series) => series,
            Err(FetchError::Empty { .. }) => {
                warn!("Skipping, nothing to store");
                return Ok(None);
            }
            Err(e) => return Err(UnitFailure::Fetch(e)),
        };

        let database_url = Arc::clone(&self.database_url);
        let writer = self.writer;
        let span = Span::current();
        let report = tokio::task::spawn_blocking(move || {
            let _entered = span.enter();
            let mut conn = StoreConnection::establish(&database_url).map_err(PersistError::from)?;
            persist(
                &mut conn,
                &writer,
                &instrument,
                &tables,
                &series.bars,
                Utc::now(),
            )
        })
        .await
        .map_err(|e| UnitFailure::Aborted(e.to_string()))??;

        Ok(Some(report))
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "panicked".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_payloads_are_readable() {
        assert_eq!(panic_message(&"static str"), "static str");
        assert_eq!(panic_message(&String::from("owned")), "owned");
        assert_eq!(panic_message(&42_u8), "panicked");
    }

    #[test]
    fn units_keep_interval_order_per_symbol() {
        let symbols = vec!["AAA".to_string(), "BBB".to_string()];
        let units = Pipeline::units(&symbols, &[Interval::FiveMinutes, Interval::OneMinute]);
        let labels: Vec<String> = units.iter().map(ToString::to_string).collect();
        assert_eq!(labels, ["AAA/5m", "AAA/1m", "BBB/5m", "BBB/1m"]);
    }

    #[test]
    fn summary_counts_outcomes() {
        let mut summary = BatchSummary::default();
        let unit = |s: &str| WorkUnit {
            symbol: s.into(),
            interval: Interval::OneDay,
        };
        summary.record(UnitResult {
            unit: unit("A"),
            outcome: UnitOutcome::Ingested(IngestReport {
                inserted: 2,
                overwritten: 1,
                failed: 1,
                ..Default::default()
            }),
        });
        summary.record(UnitResult {
            unit: unit("B"),
            outcome: UnitOutcome::Skipped,
        });
        summary.record(UnitResult {
            unit: unit("C"),
            outcome: UnitOutcome::Failed(UnitFailure::Aborted("boom".into())),
        });

        assert_eq!((summary.ingested, summary.skipped, summary.failed), (1, 1, 1));
        assert_eq!(summary.bars_written, 3);
        assert_eq!(summary.collisions, 1);
        assert_eq!(summary.bars_failed, 1);
        assert!(matches!(
            summary.outcome_of("B", Interval::OneDay),
            Some(UnitOutcome::Skipped)
        ));
        assert_eq!(
            summary.to_string(),
            "1 ingested, 1 skipped, 1 failed; 3 bars written, 1 collisions, 1 bar failures"
        );
    }
}
