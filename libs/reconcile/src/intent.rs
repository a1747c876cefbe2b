//! Desired interface configuration for a VM launch.

use std::net::Ipv4Addr;

use hostnet_networking::{
    bridge_address, parse_netmask, validate_interface_name, DEFAULT_NETMASK,
};

use crate::error::ReconcileError;

/// What the host should look like before a VM attaches to its tap.
///
/// Built once per launch and handed to both
/// [`ensure_network_ready`](crate::Reconciler::ensure_network_ready) and
/// [`ensure_network_quiesced`](crate::Reconciler::ensure_network_quiesced).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciliationIntent {
    tap_name: String,
    bridge_name: Option<String>,
    desired_ip: Option<Ipv4Addr>,
    desired_netmask: Option<Ipv4Addr>,
    bridge_ip: Option<Ipv4Addr>,
}

impl ReconciliationIntent {
    /// Intent for an un-bridged tap.
    pub fn new(tap_name: impl Into<String>) -> Result<Self, ReconcileError> {
        let tap_name = tap_name.into();
        validate_interface_name(&tap_name)
            .map_err(|e| ReconcileError::InvalidIntent(format!("tap: {}", e)))?;

        Ok(Self {
            tap_name,
            bridge_name: None,
            desired_ip: None,
            desired_netmask: None,
            bridge_ip: None,
        })
    }

    /// Request bridging. An empty name leaves bridging disabled.
    pub fn with_bridge(mut self, bridge_name: impl Into<String>) -> Result<Self, ReconcileError> {
        let bridge_name = bridge_name.into();
        if bridge_name.is_empty() {
            self.bridge_name = None;
            return Ok(self);
        }

        validate_interface_name(&bridge_name)
            .map_err(|e| ReconcileError::InvalidIntent(format!("bridge: {}", e)))?;
        if bridge_name == self.tap_name {
            return Err(ReconcileError::InvalidIntent(format!(
                "tap and bridge cannot share the name '{}'",
                bridge_name
            )));
        }

        self.bridge_name = Some(bridge_name);
        Ok(self)
    }

    /// Address the guest will use; the bridge address is derived from it.
    pub fn with_ip(mut self, ip: Ipv4Addr) -> Self {
        self.desired_ip = Some(ip);
        self
    }

    /// Netmask applied with the bridge address.
    pub fn with_netmask(mut self, netmask: Ipv4Addr) -> Self {
        self.desired_netmask = Some(netmask);
        self
    }

    /// Assign this exact address to the bridge instead of deriving one.
    pub fn with_bridge_ip(mut self, ip: Ipv4Addr) -> Self {
        self.bridge_ip = Some(ip);
        self
    }

    /// Build an intent from string inputs where an empty string means "not set".
    pub fn from_parts(
        tap_name: &str,
        bridge_name: &str,
        ip: &str,
        netmask: &str,
        bridge_ip: &str,
    ) -> Result<Self, ReconcileError> {
        let mut intent = Self::new(tap_name)?.with_bridge(bridge_name)?;

        if let Some(ip) = parse_optional_ip(ip, "ip")? {
            intent = intent.with_ip(ip);
        }
        if !netmask.trim().is_empty() {
            let netmask = parse_netmask(netmask)
                .map_err(|e| ReconcileError::InvalidIntent(format!("netmask: {}", e)))?;
            intent = intent.with_netmask(netmask);
        }
        if let Some(ip) = parse_optional_ip(bridge_ip, "bridge ip")? {
            intent = intent.with_bridge_ip(ip);
        }

        Ok(intent)
    }

    /// Tap device name.
    pub fn tap_name(&self) -> &str {
        &self.tap_name
    }

    /// Bridge name, when bridging is requested.
    pub fn bridge_name(&self) -> Option<&str> {
        self.bridge_name.as_deref()
    }

    /// Returns true if bridging is requested.
    pub fn is_bridged(&self) -> bool {
        self.bridge_name.is_some()
    }

    /// Address the guest was asked to use.
    pub fn desired_ip(&self) -> Option<Ipv4Addr> {
        self.desired_ip
    }

    /// Netmask for the bridge address, defaulting to /24.
    pub fn netmask(&self) -> Ipv4Addr {
        self.desired_netmask.unwrap_or(DEFAULT_NETMASK)
    }

    /// Address the bridge should carry, if any.
    ///
    /// Only set when a guest address was given. An explicit bridge address
    /// wins; otherwise the guest address with its last octet replaced by 66.
    pub fn bridge_address(&self) -> Option<Ipv4Addr> {
        self.desired_ip
            .map(|ip| self.bridge_ip.unwrap_or_else(|| bridge_address(ip)))
    }
}

fn parse_optional_ip(s: &str, field: &str) -> Result<Option<Ipv4Addr>, ReconcileError> {
    let s = s.trim();
    if s.is_empty() {
        return Ok(None);
    }

    s.parse::<Ipv4Addr>()
        .map(Some)
        .map_err(|_| ReconcileError::InvalidIntent(format!("{} '{}' is not an IPv4 address", field, s)))
}
