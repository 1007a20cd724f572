use std::process::ExitCode;

use clap::Parser;
use label_picker::config::{Cli, PickerConfig};
use label_picker::FinishReason;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = match PickerConfig::from_cli(cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    // RUST_LOG, when set, overrides the configured level.
    env_logger::Builder::new()
        .filter_level(config.log_level.to_level_filter())
        .parse_default_env()
        .init();

    match label_picker::run(&config) {
        Ok(Some(FinishReason::FetchFailed(_))) => ExitCode::FAILURE,
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
