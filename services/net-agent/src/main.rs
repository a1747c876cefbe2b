//! hostnet - tap and bridge setup for local VM launches.

use anyhow::Result;
use clap::Parser;

use hostnet_net_agent::commands::Cli;
use hostnet_net_agent::error;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Err(e) = cli.run().await {
        error::print_error(&e);
        std::process::exit(1);
    }

    Ok(())
}
