//! `hostnet allocate-cidr`.

use anyhow::{bail, Result};
use clap::Args;
use hostnet_networking::allocate_new_cidr_block;
use serde::Serialize;

use crate::output::{print_json, OutputFormat};

use super::CommandContext;

/// Pick the block following the greatest of the given CIDR blocks.
#[derive(Debug, Args)]
pub struct AllocateCidrCommand {
    /// Blocks already in use, e.g. 10.0.0.0/16 172.16.3.0/24.
    blocks: Vec<String>,
}

#[derive(Debug, Serialize)]
struct CidrView<'a> {
    cidr: &'a str,
}

impl AllocateCidrCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let cidr = allocate_new_cidr_block(&self.blocks);
        if cidr.is_empty() {
            bail!(
                "no block allocated: give at least one existing IPv4 block, \
                 and make the greatest one a /16 or /24"
            );
        }

        match ctx.format {
            OutputFormat::Json => print_json(&CidrView { cidr: &cidr }),
            OutputFormat::Table => println!("{}", cidr),
        }
        Ok(())
    }
}
