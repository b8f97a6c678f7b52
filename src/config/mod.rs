//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

use std::{
    num::{NonZeroU32, NonZeroUsize},
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use cumulus_types::AccountDescriptor;
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::cache::CacheConfig;

pub use cli::{CheckArgs, CliArgs, Command, ServeArgs, ServeOverrides};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "cumulus";
const ENV_PREFIX: &str = "CUMULUS";
const DEFAULT_SYNC_CADENCE_SECS: u64 = 60;
const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub cache: CacheSettings,
    pub scheduler: SchedulerSettings,
    pub accounts: Vec<AccountDescriptor>,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub prefix: String,
    pub io_timeout: Duration,
    pub fan_out_timeout: Duration,
    pub read_concurrency: NonZeroUsize,
}

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    /// How often configuration is re-read and synchronized.
    pub sync_cadence: Duration,
    /// Poll interval for agents that carry no hint of their own.
    pub default_poll_interval: Duration,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Check(_)) => {}
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    cache: RawCacheSettings,
    scheduler: RawSchedulerSettings,
    accounts: Vec<AccountDescriptor>,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(prefix) = overrides.cache_prefix.as_ref() {
            self.cache.prefix = Some(prefix.clone());
        }
        if let Some(millis) = overrides.cache_io_timeout_ms {
            self.cache.io_timeout_ms = Some(millis);
        }
        if let Some(cadence) = overrides.sync_cadence_seconds {
            self.scheduler.sync_cadence_seconds = Some(cadence);
        }
        if let Some(interval) = overrides.default_poll_interval_seconds {
            self.scheduler.default_poll_interval_seconds = Some(interval);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            cache,
            scheduler,
            accounts,
        } = raw;

        let logging = build_logging_settings(logging)?;
        let cache = build_cache_settings(cache)?;
        let scheduler = build_scheduler_settings(scheduler)?;

        Ok(Self {
            logging,
            cache,
            scheduler,
            accounts,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let defaults = CacheConfig::default();

    let prefix = match cache.prefix {
        Some(prefix) => prefix.trim().to_string(),
        None => defaults.prefix.clone(),
    };
    if prefix.is_empty() {
        return Err(LoadError::invalid("cache.prefix", "must not be empty"));
    }
    if prefix.contains(':') {
        return Err(LoadError::invalid(
            "cache.prefix",
            "must not contain the key separator `:`",
        ));
    }

    let io_timeout = match cache.io_timeout_ms {
        Some(millis) => non_zero_millis(millis, "cache.io_timeout_ms")?,
        None => defaults.io_timeout,
    };
    let fan_out_timeout = match cache.fan_out_timeout_ms {
        Some(millis) => non_zero_millis(millis, "cache.fan_out_timeout_ms")?,
        None => defaults.fan_out_timeout,
    };

    let read_concurrency = match cache.read_concurrency {
        Some(value) => {
            let value = non_zero_u32(value, "cache.read_concurrency")?;
            NonZeroUsize::try_from(value).map_err(|_| {
                LoadError::invalid("cache.read_concurrency", "value exceeds supported range")
            })?
        }
        None => defaults.read_concurrency_non_zero(),
    };

    Ok(CacheSettings {
        prefix,
        io_timeout,
        fan_out_timeout,
        read_concurrency,
    })
}

fn build_scheduler_settings(
    scheduler: RawSchedulerSettings,
) -> Result<SchedulerSettings, LoadError> {
    let cadence_secs = scheduler
        .sync_cadence_seconds
        .unwrap_or(DEFAULT_SYNC_CADENCE_SECS);
    if cadence_secs == 0 {
        return Err(LoadError::invalid(
            "scheduler.sync_cadence_seconds",
            "must be greater than zero",
        ));
    }

    let poll_secs = scheduler
        .default_poll_interval_seconds
        .unwrap_or(DEFAULT_POLL_INTERVAL_SECS);
    if poll_secs == 0 {
        return Err(LoadError::invalid(
            "scheduler.default_poll_interval_seconds",
            "must be greater than zero",
        ));
    }

    Ok(SchedulerSettings {
        sync_cadence: Duration::from_secs(cadence_secs),
        default_poll_interval: Duration::from_secs(poll_secs),
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    prefix: Option<String>,
    io_timeout_ms: Option<u64>,
    fan_out_timeout_ms: Option<u64>,
    read_concurrency: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSchedulerSettings {
    sync_cadence_seconds: Option<u64>,
    default_poll_interval_seconds: Option<u64>,
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

fn non_zero_millis(value: u64, key: &'static str) -> Result<Duration, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_millis(value))
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[cfg(test)]
mod tests;
