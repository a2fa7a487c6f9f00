use serde::Deserialize;
use std::{fs, path::PathBuf, time::Duration};

use meter_client::{db::MeterSchema, domain::MeterIndex};
use time::{format_description::FormatItem, macros::format_description, Time, UtcOffset};

use crate::pipeline::{AccountingZone, IngestError};

const OFFSET_FORMAT: &[FormatItem<'static>] =
    format_description!("[offset_hour sign:mandatory]:[offset_minute]");
const TIME_OF_DAY_FORMAT: &[FormatItem<'static>] = format_description!("[hour]:[minute]:[second]");

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 3306,
            user: "root".to_string(),
            password: String::new(),
            database: "sensors".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub url: String,
    pub timeout_secs: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    pub interval_secs: u64,
    pub meters: Vec<MeterIndex>,
    /// Fixed civil-time offset, e.g. `+05:30`.
    pub utc_offset: String,
    /// Local time of day at which the baseline is recomputed.
    pub baseline_refresh_at: String,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            meters: vec![70, 40, 69, 41],
            utc_offset: "+05:30".to_string(),
            baseline_refresh_at: "00:00:05".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogSinkConfig {
    pub dir: PathBuf,
    pub file_prefix: String,
}

impl Default for LogSinkConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("VIT-Data"),
            file_prefix: "VITB".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind_addr: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub feed: FeedConfig,
    pub ingestion: IngestionConfig,
    pub log_sink: LogSinkConfig,
    pub http: HttpConfig,
}

impl AppConfig {
    /// Read and validate the service configuration.
    pub fn load() -> anyhow::Result<Self> {
        let cfg = Self::read()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read the TOML file named by `INGESTION_CONFIG` (if it exists) and apply
    /// environment overrides, without validating.
    pub fn read() -> anyhow::Result<Self> {
        use std::env;

        let path = env::var("INGESTION_CONFIG").unwrap_or_else(|_| "ingestion-config.toml".to_string());
        let mut cfg: AppConfig = match fs::read_to_string(&path) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path, "config file not found, using defaults and environment");
                AppConfig::default()
            }
            Err(e) => return Err(e.into()),
        };

        cfg.apply_env(|key| env::var(key).ok())?;
        Ok(cfg)
    }

    /// Override settings from environment-style variables.
    pub fn apply_env<F>(&mut self, var: F) -> Result<(), IngestError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = var("DB_HOST") {
            self.database.host = v;
        }
        if let Some(v) = var("DB_PORT") {
            self.database.port = parse_var("DB_PORT", &v)?;
        }
        if let Some(v) = var("DB_USER") {
            self.database.user = v;
        }
        if let Some(v) = var("DB_PASSWORD") {
            self.database.password = v;
        }
        if let Some(v) = var("DB_NAME") {
            self.database.database = v;
        }
        if let Some(v) = var("FEED_URL") {
            self.feed.url = v;
        }
        if let Some(v) = var("PORT") {
            let port: u16 = parse_var("PORT", &v)?;
            self.http.bind_addr = format!("0.0.0.0:{port}");
        }
        if let Some(v) = var("INGEST_INTERVAL_SECS") {
            self.ingestion.interval_secs = parse_var("INGEST_INTERVAL_SECS", &v)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), IngestError> {
        if self.feed.url.trim().is_empty() {
            return Err(IngestError::Config("feed.url (FEED_URL) must be set".to_string()));
        }
        if self.ingestion.interval_secs == 0 {
            return Err(IngestError::Config("ingestion.interval_secs must be positive".to_string()));
        }
        if self.feed.timeout_secs == 0 {
            return Err(IngestError::Config("feed.timeout_secs must be positive".to_string()));
        }
        self.meter_schema()?;
        self.zone()?;
        self.baseline_refresh_at()?;
        Ok(())
    }

    pub fn meter_schema(&self) -> Result<MeterSchema, IngestError> {
        MeterSchema::new(self.ingestion.meters.iter().copied())
            .map_err(|e| IngestError::Config(format!("ingestion.meters: {e}")))
    }

    pub fn zone(&self) -> Result<AccountingZone, IngestError> {
        UtcOffset::parse(self.ingestion.utc_offset.trim(), OFFSET_FORMAT)
            .map(AccountingZone::new)
            .map_err(|e| {
                IngestError::Config(format!("ingestion.utc_offset '{}': {e}", self.ingestion.utc_offset))
            })
    }

    pub fn baseline_refresh_at(&self) -> Result<Time, IngestError> {
        Time::parse(self.ingestion.baseline_refresh_at.trim(), TIME_OF_DAY_FORMAT).map_err(|e| {
            IngestError::Config(format!(
                "ingestion.baseline_refresh_at '{}': {e}",
                self.ingestion.baseline_refresh_at
            ))
        })
    }

    pub fn ingest_interval(&self) -> Duration {
        Duration::from_secs(self.ingestion.interval_secs)
    }

    pub fn feed_timeout(&self) -> Duration {
        Duration::from_secs(self.feed.timeout_secs)
    }
}

fn parse_var<T>(key: &str, value: &str) -> Result<T, IngestError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| IngestError::Config(format!("{key}='{value}': {e}")))
}
