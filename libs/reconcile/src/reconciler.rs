//! Tap and bridge reconciliation.
//!
//! Every step queries the port before acting, so repeating a call with the
//! same intent converges without issuing further mutations. Nothing is
//! cached between steps; the host may change underneath us at any time.

use std::net::Ipv4Addr;

use tracing::{debug, info, warn};

use crate::error::{ReconcileError, Step, StepExt};
use crate::intent::ReconciliationIntent;
use crate::port::NetworkPort;

/// A mutation performed by [`Reconciler::ensure_network_ready`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    CreatedTap(String),
    CreatedBridge(String),
    AssignedIp {
        interface: String,
        ip: Ipv4Addr,
        netmask: Ipv4Addr,
    },
    Attached {
        bridge: String,
        member: String,
    },
    BroughtUp(String),
}

/// Result of [`Reconciler::ensure_network_quiesced`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuiesceOutcome {
    /// Only the tap was brought down; no bridge in use.
    TapDown,

    /// No bridge member was up; the bridge was brought down and flushed.
    BridgeDeactivated,

    /// A bridge member is still up, so the bridge was left alone.
    BridgeInUse { member: String },
}

/// Kind of interface, as tracked by the caller's intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterfaceKind {
    Tap,
    Bridge,
}

/// Observed state of one interface at the moment it was queried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInterface {
    pub name: String,
    pub kind: InterfaceKind,
    pub exists: bool,
    pub up: bool,
    pub ip: Option<Ipv4Addr>,
    pub members: Vec<String>,
}

/// Drives a [`NetworkPort`] towards a [`ReconciliationIntent`].
#[derive(Debug)]
pub struct Reconciler<P> {
    port: P,
}

impl<P: NetworkPort> Reconciler<P> {
    /// Create a reconciler over a port.
    pub fn new(port: P) -> Self {
        Self { port }
    }

    /// The underlying port.
    pub fn port(&self) -> &P {
        &self.port
    }

    /// Bring the tap (and bridge, if requested) into the state a VM needs.
    ///
    /// Order:
    /// 1. Create the tap if missing (left down for now)
    /// 2. With a bridge: create it, assign its address, attach the tap,
    ///    bring the bridge up
    /// 3. Bring the tap up
    ///
    /// Returns the mutations performed; empty when already converged. The
    /// first failing port call aborts, and completed steps are not undone.
    pub fn ensure_network_ready(
        &self,
        intent: &ReconciliationIntent,
    ) -> Result<Vec<Change>, ReconcileError> {
        let tap = intent.tap_name();
        let mut changes = Vec::new();

        if !self.port.exists(tap).step(Step::CheckTapExists)? {
            info!(tap = %tap, "Creating tap device");
            self.port.create_tap(tap).step(Step::CreateTap)?;
            changes.push(Change::CreatedTap(tap.to_string()));
        }

        if let Some(bridge) = intent.bridge_name() {
            self.ensure_bridge_ready(bridge, tap, intent, &mut changes)?;
        }

        if !self.port.is_up(tap).step(Step::CheckTapUp)? {
            info!(tap = %tap, "Bringing tap up");
            self.port.up(tap).step(Step::TapUp)?;
            changes.push(Change::BroughtUp(tap.to_string()));
        }

        if changes.is_empty() {
            debug!(tap = %tap, bridge = ?intent.bridge_name(), "Network already ready");
        }

        Ok(changes)
    }

    fn ensure_bridge_ready(
        &self,
        bridge: &str,
        tap: &str,
        intent: &ReconciliationIntent,
        changes: &mut Vec<Change>,
    ) -> Result<(), ReconcileError> {
        if !self.port.exists(bridge).step(Step::CheckBridgeExists)? {
            info!(bridge = %bridge, "Creating bridge");
            self.port.create_bridge(bridge).step(Step::CreateBridge)?;
            changes.push(Change::CreatedBridge(bridge.to_string()));
        }

        if let Some(bridge_ip) = intent.bridge_address() {
            let current = self.port.get_ip(bridge).step(Step::GetBridgeIp)?;

            if current == Some(bridge_ip) {
                debug!(bridge = %bridge, ip = %bridge_ip, "Bridge address already set");
            } else {
                let netmask = intent.netmask();
                info!(
                    bridge = %bridge,
                    current = ?current,
                    ip = %bridge_ip,
                    netmask = %netmask,
                    "Assigning bridge address"
                );
                self.port.flush_ip(bridge).step(Step::FlushBridgeIp)?;
                self.port
                    .set_ip(bridge, bridge_ip, netmask)
                    .step(Step::SetBridgeIp)?;
                changes.push(Change::AssignedIp {
                    interface: bridge.to_string(),
                    ip: bridge_ip,
                    netmask,
                });
            }
        }

        if !self.port.has_member(bridge, tap).step(Step::CheckTapInBridge)? {
            info!(bridge = %bridge, tap = %tap, "Adding tap to bridge");
            self.port.attach_to_bridge(bridge, tap).step(Step::AttachTap)?;
            changes.push(Change::Attached {
                bridge: bridge.to_string(),
                member: tap.to_string(),
            });
        }

        if !self.port.is_up(bridge).step(Step::CheckBridgeUp)? {
            info!(bridge = %bridge, "Bringing bridge up");
            self.port.up(bridge).step(Step::BridgeUp)?;
            changes.push(Change::BroughtUp(bridge.to_string()));
        }

        Ok(())
    }

    /// Take down what the VM no longer needs, leaving shared pieces alone.
    ///
    /// The tap always goes down. A bridge is only brought down (and stripped
    /// of addresses, but not deleted) when none of its members is up.
    ///
    /// Members are listed after the tap is brought down. An adapter whose
    /// view lags behind its own `down` call can make that decision stale.
    pub fn ensure_network_quiesced(
        &self,
        intent: &ReconciliationIntent,
    ) -> Result<QuiesceOutcome, ReconcileError> {
        let tap = intent.tap_name();

        info!(tap = %tap, "Bringing tap down");
        self.port.down(tap).step(Step::TapDown)?;

        match intent.bridge_name() {
            Some(bridge) => self.quiesce_bridge(bridge),
            None => Ok(QuiesceOutcome::TapDown),
        }
    }

    fn quiesce_bridge(&self, bridge: &str) -> Result<QuiesceOutcome, ReconcileError> {
        let members = self
            .port
            .list_members(bridge)
            .step(Step::ListBridgeMembers)?;

        for member in members {
            if self.port.is_up(&member).step(Step::CheckMemberUp)? {
                warn!(
                    bridge = %bridge,
                    member = %member,
                    "Bridge still has an active member, leaving it up"
                );
                return Ok(QuiesceOutcome::BridgeInUse { member });
            }
        }

        info!(bridge = %bridge, "No active bridge members, bringing bridge down");
        self.port.down(bridge).step(Step::BridgeDown)?;
        self.port
            .flush_ip(bridge)
            .step(Step::FlushBridgeIpOnTeardown)?;

        Ok(QuiesceOutcome::BridgeDeactivated)
    }

    /// Quiesce, then delete the tap and any bridge left without members.
    ///
    /// Interfaces that are already gone are skipped, so repeating the call
    /// succeeds. A missing bridge is reported as deactivated.
    pub fn remove_network(
        &self,
        intent: &ReconciliationIntent,
    ) -> Result<QuiesceOutcome, ReconcileError> {
        let tap = intent.tap_name();
        let tap_exists = self.port.exists(tap).step(Step::CheckTapExists)?;

        if tap_exists {
            info!(tap = %tap, "Bringing tap down");
            self.port.down(tap).step(Step::TapDown)?;
        }

        let Some(bridge) = intent.bridge_name() else {
            if tap_exists {
                info!(tap = %tap, "Deleting tap device");
                self.port.delete(tap).step(Step::DeleteTap)?;
            }
            return Ok(QuiesceOutcome::TapDown);
        };

        let bridge_exists = self.port.exists(bridge).step(Step::CheckBridgeExists)?;
        let outcome = if bridge_exists {
            self.quiesce_bridge(bridge)?
        } else {
            debug!(bridge = %bridge, "Bridge already gone");
            QuiesceOutcome::BridgeDeactivated
        };

        if tap_exists {
            info!(tap = %tap, "Deleting tap device");
            self.port.delete(tap).step(Step::DeleteTap)?;
        }

        if !bridge_exists {
            return Ok(outcome);
        }

        let members = self
            .port
            .list_members(bridge)
            .step(Step::ListBridgeMembers)?;

        if members.is_empty() {
            info!(bridge = %bridge, "Deleting bridge");
            self.port.delete(bridge).step(Step::DeleteBridge)?;
        } else {
            warn!(bridge = %bridge, members = ?members, "Bridge still has members, not deleting");
        }

        Ok(outcome)
    }

    /// Query the current state of one interface.
    pub fn inspect(
        &self,
        name: &str,
        kind: InterfaceKind,
    ) -> Result<NetworkInterface, ReconcileError> {
        let mut iface = NetworkInterface {
            name: name.to_string(),
            kind,
            exists: self.port.exists(name).step(Step::Inspect)?,
            up: false,
            ip: None,
            members: Vec::new(),
        };

        if !iface.exists {
            return Ok(iface);
        }

        iface.up = self.port.is_up(name).step(Step::Inspect)?;
        iface.ip = self.port.get_ip(name).step(Step::Inspect)?;
        if kind == InterfaceKind::Bridge {
            iface.members = self.port.list_members(name).step(Step::Inspect)?;
        }

        Ok(iface)
    }
}
