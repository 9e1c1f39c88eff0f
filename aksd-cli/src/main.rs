use aksd_cli::{Cli, commands, telemetry};
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    telemetry::init(cli.verbose);
    commands::handle(cli).await
}
