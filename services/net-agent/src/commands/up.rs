//! `hostnet up`.

use anyhow::{Context, Result};
use clap::Args;
use hostnet_reconcile::Change;
use serde::Serialize;

use crate::output::{print_info, print_json, print_success, OutputFormat};

use super::{CommandContext, NetworkArgs};

/// Create and activate the tap (and bridge).
#[derive(Debug, Args)]
pub struct UpCommand {
    #[command(flatten)]
    network: NetworkArgs,
}

/// Serializable form of a [`Change`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeView {
    pub action: &'static str,
    pub interface: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl From<&Change> for ChangeView {
    fn from(change: &Change) -> Self {
        match change {
            Change::CreatedTap(name) => ChangeView {
                action: "created_tap",
                interface: name.clone(),
                detail: None,
            },
            Change::CreatedBridge(name) => ChangeView {
                action: "created_bridge",
                interface: name.clone(),
                detail: None,
            },
            Change::AssignedIp {
                interface,
                ip,
                netmask,
            } => ChangeView {
                action: "assigned_ip",
                interface: interface.clone(),
                detail: Some(format!("{}/{}", ip, netmask)),
            },
            Change::Attached { bridge, member } => ChangeView {
                action: "attached",
                interface: member.clone(),
                detail: Some(bridge.clone()),
            },
            Change::BroughtUp(name) => ChangeView {
                action: "brought_up",
                interface: name.clone(),
                detail: None,
            },
        }
    }
}

impl ChangeView {
    /// One-line description for table output.
    pub fn describe(&self) -> String {
        match (self.action, &self.detail) {
            ("created_tap", _) => format!("created tap {}", self.interface),
            ("created_bridge", _) => format!("created bridge {}", self.interface),
            ("assigned_ip", Some(address)) => format!("assigned {} to {}", address, self.interface),
            ("attached", Some(bridge)) => format!("attached {} to {}", self.interface, bridge),
            ("brought_up", _) => format!("brought {} up", self.interface),
            (action, _) => format!("{} {}", action, self.interface),
        }
    }
}

#[derive(Debug, Serialize)]
struct UpView {
    tap: String,
    bridge: Option<String>,
    changes: Vec<ChangeView>,
}

impl UpCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let intent = self.network.intent(&ctx.config)?;
        let tap = intent.tap_name().to_string();
        let bridge = intent.bridge_name().map(str::to_string);

        let changes = ctx
            .reconcile(move |r| r.ensure_network_ready(&intent))
            .await
            .context("network setup failed")?;

        let view = UpView {
            tap,
            bridge,
            changes: changes.iter().map(ChangeView::from).collect(),
        };

        match ctx.format {
            OutputFormat::Json => print_json(&view),
            OutputFormat::Table => print_changes(&view.changes),
        }

        Ok(())
    }
}

/// Print changes as success lines, or a note when nothing changed.
pub(super) fn print_changes(changes: &[ChangeView]) {
    if changes.is_empty() {
        print_info("Network already ready.");
    }
    for change in changes {
        print_success(&change.describe());
    }
}
