use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the Cumulus binary.
#[derive(Debug, Parser)]
#[command(name = "cumulus", version, about = "Cumulus inventory cache service")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "CUMULUS_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run caching agents and keep them in step with configuration.
    Serve(Box<ServeArgs>),
    /// Validate configuration and summarize configured accounts.
    Check(CheckArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the cache key prefix.
    #[arg(long = "cache-prefix", value_name = "PREFIX")]
    pub cache_prefix: Option<String>,

    /// Override the per-call backing store deadline.
    #[arg(long = "cache-io-timeout-ms", value_name = "MILLIS")]
    pub cache_io_timeout_ms: Option<u64>,

    /// Override how often configuration is re-read and synchronized.
    #[arg(long = "sync-cadence-seconds", value_name = "SECONDS")]
    pub sync_cadence_seconds: Option<u64>,

    /// Override the poll interval for agents without their own.
    #[arg(long = "default-poll-interval-seconds", value_name = "SECONDS")]
    pub default_poll_interval_seconds: Option<u64>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct CheckArgs {
    /// Print the account summary as JSON.
    #[arg(long)]
    pub json: bool,
}
