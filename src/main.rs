use anyhow::Result;
use clap::Parser as _;
use support_tracker_etl::cli::run_command;
use support_tracker_etl::cli::Cli;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    run_command(cli.command)
}
