//! `harvester`: collects product reviews into a JSON-lines file and picks up
//! where the previous run stopped.
mod cli;
mod session;

use clap::Parser;
use engine_logging::LogDestination;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();
    let config = cli.load_config()?;
    engine_logging::initialize(LogDestination::Both(config.log_path()), cli.log_level());

    let summary = session::run(&cli, config).await?;
    session::print_summary(&summary);
    Ok(())
}
