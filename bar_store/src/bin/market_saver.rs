use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result, bail};
use bar_store::{
    config::{MarketSaverConfig, load_config_path},
    csv_import::import_csv,
    db::bootstrap::{connect_or_create, init_database},
    logging::init_tracing,
    pipeline::Pipeline,
    symbols::{append_symbols, load_symbols, prompt_symbols},
    writer::IngestWriter,
};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use market_data_ingestor::{
    fetcher::MarketDataFetcher, models::interval::Interval, policy::FetchMode,
    providers::build_provider,
};
use secrecy::ExposeSecret;
use tracing::{info, warn};

#[derive(Parser)]
#[command(version, about = "Download historical price bars into per-instrument tables")]
struct Cli {
    /// TOML configuration; defaults apply when the file does not exist.
    #[arg(long, value_name = "FILE", default_value = "conf/market_saver.toml")]
    config: PathBuf,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Fetch every configured symbol and store the bars.
    Run(RunArgs),
    /// Store bars from a CSV export.
    ImportCsv {
        #[arg(long)]
        symbol: String,
        #[arg(long)]
        interval: Interval,
        #[arg(long, value_name = "FILE")]
        file: PathBuf,
    },
    /// Create the database (if missing) and the instrument registry.
    InitDb,
}

#[derive(Args)]
struct RunArgs {
    /// Longest history the provider keeps for each interval.
    #[arg(long, conflicts_with = "today")]
    full: bool,
    /// Only the current trading day.
    #[arg(long)]
    today: bool,
    /// Intervals to fetch, overriding the configuration (repeatable).
    #[arg(long = "interval", value_name = "INTERVAL")]
    intervals: Vec<Interval>,
}

fn load_config(path: &Path) -> Result<MarketSaverConfig> {
    if path.exists() {
        load_config_path(path)
    } else {
        Ok(MarketSaverConfig::default())
    }
}

fn symbols_or_prompt(path: &Path) -> Result<Vec<String>> {
    let symbols = load_symbols(path)?;
    if !symbols.is_empty() {
        return Ok(symbols);
    }
    let entered = prompt_symbols(io::stdin().lock(), io::stdout())?;
    if entered.is_empty() {
        bail!("no symbols to fetch; add some to {}", path.display());
    }
    append_symbols(path, &entered)?;
    info!(count = entered.len(), file = %path.display(), "Saved symbols");
    Ok(entered)
}

async fn run(cfg: &MarketSaverConfig, args: RunArgs, database_url: &str) -> Result<()> {
    let symbols = symbols_or_prompt(&cfg.symbols_file)?;
    let intervals = if args.intervals.is_empty() {
        cfg.intervals.clone()
    } else {
        args.intervals
    };
    let mode = if args.full {
        FetchMode::Full
    } else if args.today {
        FetchMode::Today
    } else {
        cfg.mode.to_fetch_mode(Utc::now())?
    };

    let provider = build_provider(cfg.provider).context("could not set up the provider")?;
    let fetcher = MarketDataFetcher::with_timeout(Arc::from(provider), cfg.fetch_timeout());
    let pipeline = Pipeline::new(fetcher, database_url, mode)
        .with_writer(IngestWriter::new(cfg.on_conflict))
        .with_concurrency(cfg.concurrency);

    let summary = pipeline.run(&symbols, &intervals).await;
    println!("{summary}");
    if summary.failed > 0 {
        warn!(failed = summary.failed, "Some units failed, see the log for details");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = load_config(&cli.config)?;
    init_tracing(Some(&cfg.log_dir))?;

    let database_url = cfg.database.database_url();
    let bootstrap = cfg.database.bootstrap();
    let url = database_url.expose_secret();

    match cli.cmd {
        Cmd::InitDb => {
            init_database(url, bootstrap.as_ref()).context("could not initialise the database")?;
            println!("Database ready");
        }
        Cmd::Run(args) => {
            // Only make sure the database exists; tables appear with the first stored bars.
            drop(connect_or_create(url, bootstrap.as_ref()).context("could not connect to the database")?);
            run(&cfg, args, url).await?;
        }
        Cmd::ImportCsv {
            symbol,
            interval,
            file,
        } => {
            let mut conn = connect_or_create(url, bootstrap.as_ref())
                .context("could not connect to the database")?;
            let writer = IngestWriter::new(cfg.on_conflict);
            let report = import_csv(&mut conn, &writer, &symbol, interval, &file)?;
            println!(
                "{symbol} {interval}: {} inserted, {} overwritten, {} skipped, {} failed",
                report.inserted, report.overwritten, report.conflicts, report.failed
            );
        }
    }

    Ok(())
}
