use std::process::ExitCode;

use ad_pipeline::{
    config::{Cli, Config},
    logging::setup_tracing,
    pipeline::Pipeline,
};
use anyhow::Error;
use clap::Parser;
use envconfig::Envconfig;
use tracing::{error, info, warn};

// Returned when --fail-on-partial is set and the batch degraded
const PARTIAL_FAILURE_EXIT: u8 = 2;

#[tokio::main]
pub async fn main() -> Result<ExitCode, Error> {
    let cli = Cli::parse();
    let config = Config::init_from_env()?.with_overrides(cli);

    setup_tracing(&config.log_path)?;
    info!("Starting up...");

    let pipeline = Pipeline::new(&config);
    let degraded = match pipeline.run().await {
        Ok(summary) => {
            for failure in &summary.failures {
                warn!("Degraded stage {}: {}", failure.stage, failure.message);
            }
            summary.is_partial()
        }
        Err(e) => {
            error!("Batch aborted: {}", e);
            true
        }
    };

    info!("Shutting down");

    Ok(ExitCode::from(exit_status(degraded, config.fail_on_partial)))
}

fn exit_status(degraded: bool, fail_on_partial: bool) -> u8 {
    if degraded && fail_on_partial {
        PARTIAL_FAILURE_EXIT
    } else {
        0
    }
}
