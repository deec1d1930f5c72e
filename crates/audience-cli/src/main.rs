use audience_cli::Cli;
use audience_cli::tracing_setup::init_tracing;
use clap::Parser;
use tracing::debug;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs, cli.verbose)?;

    debug!(version = env!("CARGO_PKG_VERSION"), "Starting audience");

    let output = cli.execute().await?;
    println!("{output}");
    Ok(())
}
