mod common;

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use bar_store::{
    pipeline::{Pipeline, UnitFailure, UnitOutcome},
    writer::{ConflictPolicy, IngestWriter},
};
use chrono::{TimeZone, Utc};
use common::{bar_rows, daily_bar, meta_rows, registry, schema_objects, setup_db};
use market_data_ingestor::{
    fetcher::{FetchError, MarketDataFetcher},
    models::{
        bar::{Bar, BarSeries},
        interval::Interval,
        request_params::BarsRequestParams,
    },
    policy::FetchMode,
    providers::{DataProvider, ProviderError},
};

/// Answers from a fixed table; unknown symbols fail like an unknown ticker would.
#[derive(Default)]
struct ScriptedProvider {
    bars: HashMap<String, Vec<Bar>>,
}

impl ScriptedProvider {
    fn with(mut self, symbol: &str, bars: Vec<Bar>) -> Self {
        self.bars.insert(symbol.to_string(), bars);
        self
    }
}

#[async_trait]
impl DataProvider for ScriptedProvider {
    async fn fetch_bars(&self, params: BarsRequestParams) -> Result<BarSeries, ProviderError> {
        match self.bars.get(&params.symbol) {
            Some(bars) => Ok(BarSeries::new(params.symbol, params.interval, bars.clone())),
            None => Err(ProviderError::Api(format!("No data found, symbol may be delisted: {}", params.symbol))),
        }
    }
}

/// Panics for one symbol, answers every other symbol with the same bars.
struct PanickingProvider {
    bad: &'static str,
    bars: Vec<Bar>,
}

#[async_trait]
impl DataProvider for PanickingProvider {
    async fn fetch_bars(&self, params: BarsRequestParams) -> Result<BarSeries, ProviderError> {
        if params.symbol == self.bad {
            panic!("provider bug for {}", params.symbol);
        }
        Ok(BarSeries::new(params.symbol, params.interval, self.bars.clone()))
    }
}

fn january() -> FetchMode {
    FetchMode::Range {
        start: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        end: Utc.with_ymd_and_hms(2024, 1, 4, 0, 0, 0).unwrap(),
    }
}

fn pipeline(provider: ScriptedProvider, db_path: &str, mode: FetchMode) -> Pipeline {
    Pipeline::new(MarketDataFetcher::new(Arc::new(provider)), db_path, mode).with_concurrency(2)
}

fn symbols(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn stock_end_to_end() {
    let (db, mut conn) = setup_db();
    let bars = vec![daily_bar(1, 10.0), daily_bar(2, 11.0), daily_bar(3, 12.0)];
    let provider = ScriptedProvider::default().with("ABC", bars.clone());

    let before = Utc::now().naive_utc();
    let summary = pipeline(provider, &db.path, january())
        .run(&symbols(&["ABC"]), &[Interval::OneDay])
        .await;

    assert_eq!((summary.ingested, summary.skipped, summary.failed), (1, 0, 0));
    assert_eq!(summary.bars_written, 3);

    let tickers = registry(&mut conn);
    assert_eq!(tickers.len(), 1);
    assert_eq!((tickers[0].tick_name.as_str(), tickers[0].tick_type.as_str()), ("ABC", "Stock"));

    let meta = meta_rows(&mut conn, "ABC");
    assert_eq!(meta.len(), 1);
    assert_eq!(meta[0].time_span, "1d");
    assert!(meta[0].downloaded_on >= before - chrono::Duration::seconds(1));

    let rows = bar_rows(&mut conn, "ABC_1d");
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().zip(&bars).all(|(row, bar)| row.matches(bar)));
}

#[tokio::test]
async fn futures_symbol_is_stored_without_marker() {
    let (db, mut conn) = setup_db();
    let provider = ScriptedProvider::default().with("CLF=2024", vec![daily_bar(2, 72.5)]);

    let summary = pipeline(provider, &db.path, january())
        .run(&symbols(&["CLF=2024"]), &[Interval::OneDay])
        .await;

    assert_eq!(summary.ingested, 1);
    let tickers = registry(&mut conn);
    assert_eq!(tickers[0].tick_name, "CLF2024");
    assert_eq!(tickers[0].tick_type, "Future");
    assert_eq!(bar_rows(&mut conn, "CLF2024_1d").len(), 1);
}

#[tokio::test]
async fn empty_fetch_touches_nothing() {
    let (db, mut conn) = setup_db();
    let provider = ScriptedProvider::default().with("EMPTY", Vec::new());

    let summary = pipeline(provider, &db.path, january())
        .run(&symbols(&["EMPTY"]), &[Interval::OneDay])
        .await;

    assert_eq!((summary.ingested, summary.skipped, summary.failed), (0, 1, 0));
    assert!(matches!(
        summary.outcome_of("EMPTY", Interval::OneDay),
        Some(UnitOutcome::Skipped)
    ));
    assert!(schema_objects(&mut conn).is_empty());
}

#[tokio::test]
async fn unsupported_interval_in_full_mode_fails_only_that_unit() {
    let (db, mut conn) = setup_db();
    let provider = ScriptedProvider::default().with("ABC", vec![daily_bar(1, 10.0)]);

    let summary = pipeline(provider, &db.path, FetchMode::Full)
        .run(&symbols(&["ABC"]), &[Interval::OneDay, Interval::OneHour])
        .await;

    assert_eq!((summary.ingested, summary.failed), (1, 1));
    assert!(matches!(
        summary.outcome_of("ABC", Interval::OneDay),
        Some(UnitOutcome::Failed(UnitFailure::Interval(_)))
    ));
    assert_eq!(bar_rows(&mut conn, "ABC_1h").len(), 1);
    assert!(!schema_objects(&mut conn).contains(&"ABC_1d".to_string()));
}

#[tokio::test]
async fn one_bad_symbol_does_not_stop_the_batch() {
    let (db, mut conn) = setup_db();
    let provider = ScriptedProvider::default()
        .with("GOOD", vec![daily_bar(1, 10.0)])
        .with("A;B", vec![daily_bar(1, 10.0)]);

    let summary = pipeline(provider, &db.path, january())
        .run(&symbols(&["GONE", "A;B", "GOOD"]), &[Interval::OneDay])
        .await;

    assert_eq!((summary.ingested, summary.skipped, summary.failed), (1, 0, 2));
    assert!(matches!(
        summary.outcome_of("GONE", Interval::OneDay),
        Some(UnitOutcome::Failed(UnitFailure::Fetch(FetchError::ProviderFailure { .. })))
    ));
    assert!(matches!(
        summary.outcome_of("A;B", Interval::OneDay),
        Some(UnitOutcome::Failed(UnitFailure::Identifier(_)))
    ));
    assert_eq!(registry(&mut conn).len(), 1);
}

#[tokio::test]
async fn rerun_over_the_same_window_counts_collisions() {
    let (db, mut conn) = setup_db();
    let bars = vec![daily_bar(1, 10.0), daily_bar(2, 11.0)];
    let run = || {
        pipeline(
            ScriptedProvider::default().with("ABC", bars.clone()),
            &db.path,
            january(),
        )
        .with_writer(IngestWriter::new(ConflictPolicy::Skip))
    };

    run().run(&symbols(&["ABC"]), &[Interval::OneDay]).await;
    let second = run().run(&symbols(&["ABC"]), &[Interval::OneDay]).await;

    assert_eq!(second.ingested, 1);
    assert_eq!(second.collisions, 2);
    assert_eq!(second.bars_written, 0);
    assert_eq!(bar_rows(&mut conn, "ABC_1d").len(), 2);
    assert_eq!(meta_rows(&mut conn, "ABC").len(), 1);
}

#[tokio::test]
async fn unreachable_database_is_a_unit_failure() {
    let dir = tempfile::tempdir().unwrap();
    let bad_path = dir.path().join("missing-dir").join("x.db");
    let provider = ScriptedProvider::default().with("ABC", vec![daily_bar(1, 10.0)]);

    let summary = pipeline(provider, bad_path.to_str().unwrap(), january())
        .run(&symbols(&["ABC"]), &[Interval::OneDay])
        .await;

    assert_eq!(summary.failed, 1);
    assert!(matches!(
        summary.outcome_of("ABC", Interval::OneDay),
        Some(UnitOutcome::Failed(UnitFailure::Persist(_)))
    ));
}

#[tokio::test]
async fn a_panicking_provider_fails_only_its_unit() {
    let (db, mut conn) = setup_db();
    let provider = PanickingProvider {
        bad: "BOOM",
        bars: vec![daily_bar(1, 10.0), daily_bar(2, 11.0)],
    };
    let pipeline = Pipeline::new(MarketDataFetcher::new(Arc::new(provider)), &db.path, january())
        .with_concurrency(2);

    let summary = pipeline
        .run(&symbols(&["GOOD", "BOOM", "ALSO"]), &[Interval::OneDay])
        .await;

    assert_eq!((summary.ingested, summary.failed), (2, 1));
    match summary.outcome_of("BOOM", Interval::OneDay) {
        Some(UnitOutcome::Failed(UnitFailure::Aborted(msg))) => {
            assert!(msg.contains("provider bug for BOOM"), "{msg}")
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(registry(&mut conn).len(), 2);
}

#[tokio::test]
async fn differently_cased_symbols_share_one_registry_row() {
    let (db, mut conn) = setup_db();
    let provider = ScriptedProvider::default().with("ABC", vec![daily_bar(1, 10.0)]);

    let summary = pipeline(provider, &db.path, january())
        .with_concurrency(1)
        .run(&symbols(&["abc", "ABC"]), &[Interval::OneDay])
        .await;

    assert_eq!(summary.ingested, 2);
    let tickers = registry(&mut conn);
    assert_eq!(tickers.len(), 1);
    assert_eq!(tickers[0].tick_name, "ABC");
    assert_eq!(bar_rows(&mut conn, "ABC_1d").len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_first_sightings_stay_consistent() {
    let (db, mut conn) = setup_db();
    let names: Vec<String> = (0..24).map(|i| format!("S{i:02}")).collect();
    let bars: Vec<Bar> = (1..=28).map(|day| daily_bar(day, 100.0 + f64::from(day))).collect();
    let provider = names
        .iter()
        .fold(ScriptedProvider::default(), |p, name| p.with(name, bars.clone()));
    let intervals = [Interval::OneDay, Interval::OneHour, Interval::FiveMinutes];

    let summary = Pipeline::new(MarketDataFetcher::new(Arc::new(provider)), &db.path, january())
        .with_concurrency(16)
        .run(&names, &intervals)
        .await;

    assert_eq!(summary.ingested, names.len() * intervals.len(), "{summary}");
    assert_eq!(summary.failed, 0, "{summary}");
    assert_eq!(summary.bars_failed, 0, "{summary}");
    assert_eq!(summary.bars_written, names.len() * intervals.len() * bars.len());

    let tickers = registry(&mut conn);
    assert_eq!(tickers.len(), names.len());
    assert!(tickers.iter().all(|t| t.tick_type == "Stock"));
    for name in &names {
        assert_eq!(meta_rows(&mut conn, name).len(), intervals.len());
        for interval in intervals {
            assert_eq!(bar_rows(&mut conn, &format!("{name}_{interval}")).len(), bars.len());
        }
    }
}
