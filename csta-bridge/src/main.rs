use std::process::ExitCode;

use csta_bridge::config::Config;
use csta_bridge::logging::init_logging_from_env;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(e) = init_logging_from_env() {
        eprintln!("Failed to initialize logging: {}", e);
        return ExitCode::FAILURE;
    }

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {:#}", e);
            return ExitCode::FAILURE;
        }
    };
    config.print_summary();

    match csta_bridge::run(config).await {
        Ok(exit) if exit.is_failure() => {
            error!("Exiting after {:?}", exit);
            ExitCode::FAILURE
        }
        Ok(_) => {
            info!("Bridge stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
