mod cli;

use anyhow::Context;
use tracing::debug;
use tracing_subscriber::EnvFilter;

fn init_tracing() -> anyhow::Result<()> {
    // stdout carries the command output
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .finish();

    tracing_log::LogTracer::init().context("Failed to bridge log records")?;
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to install tracing subscriber")?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing()?;
    debug!("Starting safe-delegates");

    cli::Cli::execute().await
}
