//! `hostnet down`.

use anyhow::{Context, Result};
use clap::Args;
use hostnet_reconcile::QuiesceOutcome;
use serde::Serialize;

use crate::output::{print_info, print_json, print_success, OutputFormat};

use super::{CommandContext, NetworkArgs};

/// Deactivate the tap, and the bridge once nothing uses it.
#[derive(Debug, Args)]
pub struct DownCommand {
    #[command(flatten)]
    network: NetworkArgs,

    /// Also delete the tap, and the bridge once it has no members.
    #[arg(long)]
    delete: bool,
}

#[derive(Debug, Serialize)]
pub(super) struct DownView {
    tap: String,
    bridge: Option<String>,
    outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    active_member: Option<String>,
    deleted: bool,
}

impl DownView {
    pub(super) fn new(
        tap: String,
        bridge: Option<String>,
        outcome: QuiesceOutcome,
        deleted: bool,
    ) -> Self {
        let (outcome, active_member) = match outcome {
            QuiesceOutcome::TapDown => ("tap_down", None),
            QuiesceOutcome::BridgeDeactivated => ("bridge_deactivated", None),
            QuiesceOutcome::BridgeInUse { member } => ("bridge_in_use", Some(member)),
        };
        Self {
            tap,
            bridge,
            outcome,
            active_member,
            deleted,
        }
    }

    pub(super) fn print(&self, format: OutputFormat) {
        match format {
            OutputFormat::Json => print_json(self),
            OutputFormat::Table => {
                print_success(&format!("tap {} is down", self.tap));
                match (&self.bridge, &self.active_member) {
                    (Some(bridge), Some(member)) => print_info(&format!(
                        "bridge {} left up, {} is still active",
                        bridge, member
                    )),
                    (Some(bridge), None) => {
                        print_success(&format!("bridge {} is down and flushed", bridge))
                    }
                    (None, _) => {}
                }
                if self.deleted {
                    print_success("unused interfaces deleted");
                }
            }
        }
    }
}

impl DownCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let intent = self.network.intent(&ctx.config)?;
        let tap = intent.tap_name().to_string();
        let bridge = intent.bridge_name().map(str::to_string);
        let delete = self.delete;

        let outcome = ctx
            .reconcile(move |r| {
                if delete {
                    r.remove_network(&intent)
                } else {
                    r.ensure_network_quiesced(&intent)
                }
            })
            .await
            .context("network teardown failed")?;

        DownView::new(tap, bridge, outcome, delete).print(ctx.format);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_use_view_names_member() {
        let view = DownView::new(
            "tap0".to_string(),
            Some("br0".to_string()),
            QuiesceOutcome::BridgeInUse {
                member: "tap1".to_string(),
            },
            false,
        );
        assert_eq!(
            serde_json::to_value(&view).unwrap(),
            serde_json::json!({
                "tap": "tap0",
                "bridge": "br0",
                "outcome": "bridge_in_use",
                "active_member": "tap1",
                "deleted": false,
            })
        );
    }
}
