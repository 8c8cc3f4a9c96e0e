//! Runtime configuration: TOML parsing and resolution.
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! working setup: `conf/symbols.txt`, intervals `5m` then `1m`, a six-day
//! window, and the local `market_saver_db` PostgreSQL database.
//!
//! Entrypoints:
//! - Parse from a TOML string: [`load_config_str`]
//! - Parse from a file path: [`load_config_path`]

use std::{path::{Path, PathBuf}, time::Duration};

use anyhow::{Context, bail};
use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};
use market_data_ingestor::{models::interval::Interval, policy::FetchMode, providers::ProviderId};
use secrecy::SecretString;
use serde::Deserialize;
use shared_utils::env::get_optional_env_var;

use crate::{db::bootstrap::Bootstrap, pipeline::DEFAULT_CONCURRENCY, writer::ConflictPolicy};

/// Overrides the whole `[database]` section when set.
pub const DATABASE_URL_ENV: &str = "DATABASE_URL";

const MAINTENANCE_DB: &str = "postgres";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct MarketSaverConfig {
    /// Newline-delimited symbol list.
    pub symbols_file: PathBuf,
    /// Directory for the daily log file.
    pub log_dir: PathBuf,
    /// Intervals fetched for every symbol, in order.
    pub intervals: Vec<Interval>,
    pub provider: ProviderId,
    /// Units processed at once.
    pub concurrency: usize,
    /// Upper bound on a single provider call.
    pub fetch_timeout_secs: u64,
    pub on_conflict: ConflictPolicy,
    pub mode: ModeConfig,
    pub database: DatabaseConfig,
}

impl Default for MarketSaverConfig {
    fn default() -> Self {
        Self {
            symbols_file: PathBuf::from("conf/symbols.txt"),
            log_dir: PathBuf::from("logs"),
            intervals: vec![Interval::FiveMinutes, Interval::OneMinute],
            provider: ProviderId::default(),
            concurrency: DEFAULT_CONCURRENCY,
            fetch_timeout_secs: 30,
            on_conflict: ConflictPolicy::default(),
            mode: ModeConfig::default(),
            database: DatabaseConfig::default(),
        }
    }
}

impl MarketSaverConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

/// How the fetch window is chosen.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModeConfig {
    /// Longest history the provider keeps for each interval.
    Full,
    /// The current trading day.
    Today,
    /// Explicit bounds. A missing `start` means `lookback_days` before now,
    /// a missing `end` means now.
    Range {
        #[serde(default)]
        start: Option<NaiveDate>,
        #[serde(default)]
        end: Option<NaiveDate>,
        #[serde(default = "default_lookback_days")]
        lookback_days: u64,
    },
}

fn default_lookback_days() -> u64 {
    6
}

impl Default for ModeConfig {
    fn default() -> Self {
        ModeConfig::Range {
            start: None,
            end: None,
            lookback_days: default_lookback_days(),
        }
    }
}

fn midnight_utc(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

impl ModeConfig {
    /// Pins the mode to concrete bounds relative to `now`.
    pub fn to_fetch_mode(&self, now: DateTime<Utc>) -> anyhow::Result<FetchMode> {
        match *self {
            ModeConfig::Full => Ok(FetchMode::Full),
            ModeConfig::Today => Ok(FetchMode::Today),
            ModeConfig::Range {
                start,
                end,
                lookback_days,
            } => {
                let start = match start {
                    Some(date) => midnight_utc(date),
                    None => now
                        .checked_sub_days(Days::new(lookback_days))
                        .context("lookback_days reaches before the supported calendar")?,
                };
                Ok(FetchMode::Range {
                    start,
                    end: end.map_or(now, midnight_utc),
                })
            }
        }
    }
}

/// Where bars are stored.
///
/// Either a full `url` (PostgreSQL URL, libpq conninfo, or SQLite path) or
/// the individual PostgreSQL fields. The password never lives in the file:
/// it is read from the variable named by `password_env`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub dbname: String,
    pub password_env: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: "localhost".into(),
            port: 5432,
            user: None,
            dbname: "market_saver_db".into(),
            password_env: "MARKET_SAVER_DB_PASSWORD".into(),
        }
    }
}

fn conninfo_value(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

impl DatabaseConfig {
    /// Connection string, honouring `DATABASE_URL` and the password variable.
    pub fn database_url(&self) -> SecretString {
        self.resolve_url(
            get_optional_env_var(DATABASE_URL_ENV),
            get_optional_env_var(&self.password_env),
        )
    }

    /// How to create the database when it does not exist yet. Only known when
    /// the connection is assembled from the individual fields.
    pub fn bootstrap(&self) -> Option<Bootstrap> {
        if self.url.is_some() || get_optional_env_var(DATABASE_URL_ENV).is_some() {
            return None;
        }
        let password = get_optional_env_var(&self.password_env);
        Some(Bootstrap {
            maintenance_url: SecretString::new(
                self.conninfo(MAINTENANCE_DB, password.as_deref()).into(),
            ),
            dbname: self.dbname.clone(),
        })
    }

    fn resolve_url(&self, env_url: Option<String>, password: Option<String>) -> SecretString {
        let url = env_url
            .or_else(|| self.url.clone())
            .unwrap_or_else(|| self.conninfo(&self.dbname, password.as_deref()));
        SecretString::new(url.into())
    }

    /// libpq `key=value` connection string for `dbname`.
    fn conninfo(&self, dbname: &str, password: Option<&str>) -> String {
        let mut parts = vec![
            format!("host={}", conninfo_value(&self.host)),
            format!("port={}", self.port),
            format!("dbname={}", conninfo_value(dbname)),
        ];
        if let Some(user) = &self.user {
            parts.push(format!("user={}", conninfo_value(user)));
        }
        if let Some(password) = password {
            parts.push(format!("password={}", conninfo_value(password)));
        }
        parts.join(" ")
    }
}

/// Parse a configuration from a TOML string.
pub fn load_config_str(s: &str) -> anyhow::Result<MarketSaverConfig> {
    let cfg: MarketSaverConfig = toml::from_str(s).context("invalid configuration")?;
    if cfg.intervals.is_empty() {
        bail!("at least one interval must be configured");
    }
    Ok(cfg)
}

/// Read and parse a configuration file.
pub fn load_config_path(path: impl AsRef<Path>) -> anyhow::Result<MarketSaverConfig> {
    let path = path.as_ref();
    let s = std::fs::read_to_string(path)
        .with_context(|| format!("could not read config {}", path.display()))?;
    load_config_str(&s).with_context(|| format!("in {}", path.display()))
}
