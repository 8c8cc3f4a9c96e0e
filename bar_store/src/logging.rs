//! Tracing setup for the CLI: stderr, an append-mode daily file, and one
//! append-mode file per instrument per day.

use std::{
    collections::{HashMap, hash_map::Entry},
    fmt::{self as stdfmt, Write as _},
    fs::{self, File, OpenOptions},
    io::Write as _,
    path::{Path, PathBuf},
    sync::Mutex,
};

use anyhow::Context as _;
use chrono::{Local, NaiveDate};
use tracing::{
    Event, Subscriber,
    field::{Field, Visit},
    span::{Attributes, Id},
};
use tracing_subscriber::{
    EnvFilter, Layer, fmt,
    layer::{Context, SubscriberExt},
    registry::LookupSpan,
    util::SubscriberInitExt,
};

/// `<log_dir>/market_saver_<YYYY-MM-DD>.log`
pub fn log_file_path(log_dir: &Path, date: NaiveDate) -> PathBuf {
    log_dir.join(format!("market_saver_{}.log", date.format("%Y-%m-%d")))
}

/// `<log_dir>/download_<symbol>_<YYYY-MM-DD>.log`. Characters that could
/// escape `log_dir` are replaced by `_`.
pub fn instrument_log_path(log_dir: &Path, symbol: &str, date: NaiveDate) -> PathBuf {
    let name: String = symbol
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '^' | '=' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    log_dir.join(format!("download_{name}_{}.log", date.format("%Y-%m-%d")))
}

fn open_log_file(log_dir: &Path) -> anyhow::Result<File> {
    fs::create_dir_all(log_dir)
        .with_context(|| format!("could not create log directory {}", log_dir.display()))?;
    let path = log_file_path(log_dir, Local::now().date_naive());
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("could not open log file {}", path.display()))
}

struct SymbolField(String);

#[derive(Default)]
struct FieldText {
    symbol: Option<String>,
    message: String,
    fields: String,
}

impl FieldText {
    fn push(&mut self, field: &Field, value: String) {
        match field.name() {
            "message" => self.message = value,
            "symbol" => self.symbol = Some(value),
            name => {
                let _ = write!(self.fields, " {name}={value}");
            }
        }
    }
}

impl Visit for FieldText {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.push(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn stdfmt::Debug) {
        self.push(field, format!("{value:?}"));
    }
}

/// Copies every event recorded inside a span with a `symbol` field to that
/// symbol's daily file (see [`instrument_log_path`]).
pub struct InstrumentFileLayer {
    log_dir: PathBuf,
    files: Mutex<HashMap<PathBuf, File>>,
}

impl InstrumentFileLayer {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
            files: Mutex::new(HashMap::new()),
        }
    }

    fn append(&self, path: PathBuf, line: &str) {
        let Ok(mut files) = self.files.lock() else {
            return;
        };
        let file = match files.entry(path) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => {
                match OpenOptions::new().create(true).append(true).open(e.key()) {
                    Ok(file) => e.insert(file),
                    Err(_) => return,
                }
            }
        };
        // A log sink has nowhere to report its own failures.
        let _ = file.write_all(line.as_bytes());
    }
}

impl<S> Layer<S> for InstrumentFileLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let mut fields = FieldText::default();
        attrs.record(&mut fields);
        if let (Some(symbol), Some(span)) = (fields.symbol, ctx.span(id)) {
            span.extensions_mut().insert(SymbolField(symbol));
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let Some(symbol) = ctx.event_scope(event).and_then(|mut scope| {
            scope.find_map(|span| span.extensions().get::<SymbolField>().map(|s| s.0.clone()))
        }) else {
            return;
        };

        let mut fields = FieldText::default();
        event.record(&mut fields);
        let now = Local::now();
        let line = format!(
            "{} {} {}{}\n",
            now.format("%Y-%m-%dT%H:%M:%S%.3f"),
            event.metadata().level(),
            fields.message,
            fields.fields
        );
        self.append(instrument_log_path(&self.log_dir, &symbol, now.date_naive()), &line);
    }
}

/// Installs the global subscriber. `RUST_LOG` overrides the default `info` level.
pub fn init_tracing(log_dir: Option<&Path>) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = match log_dir {
        Some(dir) => Some(
            fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(open_log_file(dir)?)),
        ),
        None => None,
    };
    let instrument_layer = log_dir.map(InstrumentFileLayer::new);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .with(instrument_layer)
        .try_init()
        .context("tracing subscriber already installed")
}
