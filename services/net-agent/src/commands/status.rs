//! `hostnet status`.

use anyhow::{Context, Result};
use clap::Args;
use hostnet_reconcile::{
    InterfaceKind, NetworkInterface, NetworkPort, ReconcileError, ReconciliationIntent, Reconciler,
};
use serde::Serialize;
use tabled::Tabled;

use crate::output::print_output;

use super::{CommandContext, NetworkArgs};

/// Show the current state of the tap and bridge.
#[derive(Debug, Args)]
pub struct StatusCommand {
    #[command(flatten)]
    network: NetworkArgs,
}

/// One interface in `status` output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Tabled)]
pub struct InterfaceRow {
    #[tabled(rename = "NAME")]
    pub name: String,
    #[tabled(rename = "KIND")]
    pub kind: &'static str,
    #[tabled(rename = "EXISTS")]
    pub exists: bool,
    #[tabled(rename = "UP")]
    pub up: bool,
    #[tabled(rename = "IP")]
    pub ip: String,
    #[tabled(rename = "MEMBERS")]
    pub members: String,
}

impl From<NetworkInterface> for InterfaceRow {
    fn from(iface: NetworkInterface) -> Self {
        Self {
            name: iface.name,
            kind: match iface.kind {
                InterfaceKind::Tap => "tap",
                InterfaceKind::Bridge => "bridge",
            },
            exists: iface.exists,
            up: iface.up,
            ip: iface.ip.map(|ip| ip.to_string()).unwrap_or_default(),
            members: iface.members.join(","),
        }
    }
}

/// Query the tap and, when bridged, the bridge named by `intent`.
pub fn interface_rows<P: NetworkPort>(
    reconciler: &Reconciler<P>,
    intent: &ReconciliationIntent,
) -> Result<Vec<InterfaceRow>, ReconcileError> {
    let mut rows: Vec<InterfaceRow> = vec![reconciler
        .inspect(intent.tap_name(), InterfaceKind::Tap)?
        .into()];

    if let Some(bridge) = intent.bridge_name() {
        rows.push(reconciler.inspect(bridge, InterfaceKind::Bridge)?.into());
    }

    Ok(rows)
}

impl StatusCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let intent = self.network.intent(&ctx.config)?;

        let rows = ctx
            .reconcile(move |r| interface_rows(r, &intent))
            .await
            .context("failed to query interfaces")?;

        print_output(&rows, ctx.format);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use hostnet_testing::FakeNetworkPort;

    use super::*;

    #[test]
    fn test_rows_for_bridged_intent() {
        let port = FakeNetworkPort::new();
        port.add_tap("tap0", true)
            .add_bridge("br0", true)
            .add_member("br0", "tap0")
            .add_address(
                "br0",
                Ipv4Addr::new(192, 168, 1, 66),
                Ipv4Addr::new(255, 255, 255, 0),
            );
        let intent = ReconciliationIntent::new("tap0")
            .unwrap()
            .with_bridge("br0")
            .unwrap();

        let rows = interface_rows(&Reconciler::new(&port), &intent).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].kind, "tap");
        assert!(rows[0].up);
        assert_eq!(rows[1].ip, "192.168.1.66");
        assert_eq!(rows[1].members, "tap0");
        assert!(port.mutations().is_empty());
    }

    #[test]
    fn test_missing_tap_row() {
        let port = FakeNetworkPort::new();
        let intent = ReconciliationIntent::new("tap5").unwrap();

        let rows = interface_rows(&Reconciler::new(&port), &intent).unwrap();

        assert_eq!(
            rows,
            vec![InterfaceRow {
                name: "tap5".to_string(),
                kind: "tap",
                exists: false,
                up: false,
                ip: String::new(),
                members: String::new(),
            }]
        );
    }
}
