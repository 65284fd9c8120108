use clap::Parser;
use pandoc_web::cli;
use std::process::ExitCode;
use tracing::error;

fn main() -> ExitCode {
    match cli::dispatch(cli::Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            // Logging may not be up yet if config loading failed.
            error!("{err:#}");
            eprintln!("pandoc-web: {err:#}");
            ExitCode::FAILURE
        }
    }
}
