//! `hostnet mac`.

use anyhow::Result;
use clap::Args;
use hostnet_networking::MacAddress;
use serde::Serialize;

use crate::output::{print_json, OutputFormat};

use super::CommandContext;

/// Generate a random locally administered MAC address.
#[derive(Debug, Args)]
pub struct MacCommand {}

#[derive(Debug, Serialize)]
struct MacView {
    mac: String,
}

impl MacCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let mac = MacAddress::random().to_string();
        match ctx.format {
            OutputFormat::Json => print_json(&MacView { mac }),
            OutputFormat::Table => println!("{}", mac),
        }
        Ok(())
    }
}
