use std::time::Duration;

use clap::Parser;
use envconfig::Envconfig;

#[derive(Envconfig, Clone, Debug)]
pub struct Config {
    #[envconfig(from = "IMPRESSIONS_PATH", default = "ad_impressions.json")]
    pub impressions_path: String,

    // Combined clicks and conversions, one row per interaction
    #[envconfig(from = "CLICKS_PATH", default = "clicks_conversions.csv")]
    pub clicks_path: String,

    // Unset means conversions aren't ingested on their own, and conversion_info is never filled
    #[envconfig(from = "CONVERSIONS_PATH")]
    pub conversions_path: Option<String>,

    #[envconfig(from = "BIDS_PATH", default = "bid_requests.avro")]
    pub bids_path: String,

    #[envconfig(from = "DB_PATH", default = "advertising.db")]
    pub db_path: String,

    #[envconfig(from = "LOG_PATH", default = "advertising.log")]
    pub log_path: String,

    // Deadline for the whole ingest, correlate, persist run
    #[envconfig(from = "BATCH_TIMEOUT_SECONDS", default = "300")]
    pub batch_timeout_seconds: u64,

    // One connection means one writer per table
    #[envconfig(from = "MAX_SQLITE_CONNECTIONS", default = "1")]
    pub max_sqlite_connections: u32,

    #[envconfig(from = "FAIL_ON_PARTIAL", default = "false")]
    pub fail_on_partial: bool,
}

/// Command line overrides. Anything not given falls back to the environment, then the defaults.
#[derive(Parser, Debug, Default)]
#[command(version, about = "Correlates ad impressions with clicks and conversions", long_about = None)]
pub struct Cli {
    /// JSON array of impressions
    #[arg(long)]
    pub impressions_path: Option<String>,

    /// CSV of clicks and conversions
    #[arg(long)]
    pub clicks_path: Option<String>,

    /// CSV of conversions, ingested separately from clicks
    #[arg(long)]
    pub conversions_path: Option<String>,

    /// Avro container of bid requests
    #[arg(long)]
    pub bids_path: Option<String>,

    /// SQLite database to write into
    #[arg(long)]
    pub db_path: Option<String>,

    /// Append-only log file
    #[arg(long)]
    pub log_path: Option<String>,

    /// Exit with a non-zero code if any stage degraded
    #[arg(long)]
    pub fail_on_partial: bool,
}

impl Config {
    pub fn with_overrides(mut self, cli: Cli) -> Self {
        if let Some(path) = cli.impressions_path {
            self.impressions_path = path;
        }
        if let Some(path) = cli.clicks_path {
            self.clicks_path = path;
        }
        if cli.conversions_path.is_some() {
            self.conversions_path = cli.conversions_path;
        }
        if let Some(path) = cli.bids_path {
            self.bids_path = path;
        }
        if let Some(path) = cli.db_path {
            self.db_path = path;
        }
        if let Some(path) = cli.log_path {
            self.log_path = path;
        }
        self.fail_on_partial |= cli.fail_on_partial;
        self
    }

    pub fn batch_timeout(&self) -> Duration {
        Duration::from_secs(self.batch_timeout_seconds)
    }
}
