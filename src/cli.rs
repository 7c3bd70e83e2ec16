use clap::Parser;
use std::path::PathBuf;

use crate::config::{Config, PriceStatusPolicy, RunConfig, Step};

/// Reconcile and migrate products, prices, coupons, promotion codes and
/// subscriptions from one Stripe account into another.
///
/// Runs are dry by default: nothing is written until `--live` is given.
#[derive(Debug, Parser)]
#[command(name = "stripe-migrate", version, about)]
pub struct Cli {
    /// Migration step to execute
    #[arg(long, value_enum)]
    pub step: Step,

    /// Write to the target account (default is a dry run)
    #[arg(long)]
    pub live: bool,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    /// How to reconcile the active flag of migrated prices
    #[arg(long = "price-status", value_enum)]
    pub price_status: Option<PriceStatusPolicy>,

    /// Write the run report as JSON to this file
    #[arg(long = "report-json", value_name = "PATH")]
    pub report_json: Option<PathBuf>,
}

impl Cli {
    /// Command-line flags win over the configuration file.
    pub fn run_config(&self, config: &Config) -> RunConfig {
        RunConfig {
            step: self.step,
            live: self.live,
            price_status_policy: self
                .price_status
                .unwrap_or(config.migration.price_status_policy),
        }
    }

    pub fn log_filter(&self) -> &'static str {
        if self.debug { "debug" } else { "info" }
    }
}
