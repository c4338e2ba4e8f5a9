mod cli;

use std::process::ExitCode;

use clap::Parser;
use log::error;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // Credentials may come from a .env file
    dotenvy::dotenv().ok();

    let cli = cli::Cli::parse();
    cli::init_logger(cli.verbosity);

    match cli::run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
