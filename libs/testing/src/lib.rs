//! In-memory network port.
//!
//! [`FakeNetworkPort`] models just enough of a Linux network namespace to
//! exercise the reconciler: interfaces with a kind, an admin state, a list of
//! addresses and an optional bridge master. Every port call is recorded so
//! tests can assert on what was issued and in which order, and failures can
//! be injected per operation and interface.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::sync::{Mutex, MutexGuard};

use hostnet_reconcile::{InterfaceKind, NetworkPort, PortError};

/// Port operation, without arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Exists,
    IsUp,
    CreateTap,
    CreateBridge,
    AttachToBridge,
    HasMember,
    ListMembers,
    SetIp,
    FlushIp,
    GetIp,
    Up,
    Down,
    Delete,
}

impl Op {
    /// Returns true if the operation changes host state.
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Op::CreateTap
                | Op::CreateBridge
                | Op::AttachToBridge
                | Op::SetIp
                | Op::FlushIp
                | Op::Up
                | Op::Down
                | Op::Delete
        )
    }
}

/// A recorded port call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortCall {
    Exists(String),
    IsUp(String),
    CreateTap(String),
    CreateBridge(String),
    AttachToBridge { bridge: String, member: String },
    HasMember { bridge: String, member: String },
    ListMembers(String),
    SetIp { name: String, ip: Ipv4Addr, netmask: Ipv4Addr },
    FlushIp(String),
    GetIp(String),
    Up(String),
    Down(String),
    Delete(String),
}

impl PortCall {
    /// Operation of this call.
    pub fn op(&self) -> Op {
        match self {
            PortCall::Exists(_) => Op::Exists,
            PortCall::IsUp(_) => Op::IsUp,
            PortCall::CreateTap(_) => Op::CreateTap,
            PortCall::CreateBridge(_) => Op::CreateBridge,
            PortCall::AttachToBridge { .. } => Op::AttachToBridge,
            PortCall::HasMember { .. } => Op::HasMember,
            PortCall::ListMembers(_) => Op::ListMembers,
            PortCall::SetIp { .. } => Op::SetIp,
            PortCall::FlushIp(_) => Op::FlushIp,
            PortCall::GetIp(_) => Op::GetIp,
            PortCall::Up(_) => Op::Up,
            PortCall::Down(_) => Op::Down,
            PortCall::Delete(_) => Op::Delete,
        }
    }

    /// Interface the call acts on. For bridge membership calls, the member.
    pub fn target(&self) -> &str {
        match self {
            PortCall::Exists(name)
            | PortCall::IsUp(name)
            | PortCall::CreateTap(name)
            | PortCall::CreateBridge(name)
            | PortCall::ListMembers(name)
            | PortCall::FlushIp(name)
            | PortCall::GetIp(name)
            | PortCall::Up(name)
            | PortCall::Down(name)
            | PortCall::Delete(name) => name,
            PortCall::SetIp { name, .. } => name,
            PortCall::AttachToBridge { member, .. } | PortCall::HasMember { member, .. } => member,
        }
    }

    /// Returns true if the call changes host state.
    pub fn is_mutation(&self) -> bool {
        self.op().is_mutation()
    }
}

/// One interface in the fake namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeInterface {
    pub kind: InterfaceKind,
    pub up: bool,
    pub addresses: Vec<(Ipv4Addr, Ipv4Addr)>,
    pub master: Option<String>,
}

impl FakeInterface {
    fn new(kind: InterfaceKind) -> Self {
        Self {
            kind,
            up: false,
            addresses: Vec::new(),
            master: None,
        }
    }
}

#[derive(Debug, Default)]
struct State {
    interfaces: BTreeMap<String, FakeInterface>,
    calls: Vec<PortCall>,
    failures: Vec<(Op, String)>,
}

impl State {
    fn get(&self, name: &str) -> Result<&FakeInterface, PortError> {
        self.interfaces.get(name).ok_or_else(|| missing(name))
    }

    fn get_mut(&mut self, name: &str) -> Result<&mut FakeInterface, PortError> {
        self.interfaces.get_mut(name).ok_or_else(|| missing(name))
    }

    fn bridge(&self, name: &str) -> Result<&FakeInterface, PortError> {
        let iface = self.get(name)?;
        if iface.kind != InterfaceKind::Bridge {
            return Err(PortError::Other(format!("{} is not a bridge", name)));
        }
        Ok(iface)
    }

    fn members(&self, bridge: &str) -> Vec<String> {
        self.interfaces
            .iter()
            .filter(|(_, iface)| iface.master.as_deref() == Some(bridge))
            .map(|(name, _)| name.clone())
            .collect()
    }
}

fn missing(name: &str) -> PortError {
    PortError::Other(format!("Device \"{}\" does not exist.", name))
}

/// In-memory [`NetworkPort`] with a call log and failure injection.
#[derive(Debug, Default)]
pub struct FakeNetworkPort {
    state: Mutex<State>,
}

impl FakeNetworkPort {
    /// Create an empty namespace.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("fake port state poisoned")
    }

    /// Record a call and fail it if a failure was injected for it.
    fn record(&self, call: PortCall) -> Result<MutexGuard<'_, State>, PortError> {
        let mut state = self.lock();
        let op = call.op();
        let target = call.target().to_string();
        state.calls.push(call);

        if state
            .failures
            .iter()
            .any(|(fail_op, name)| *fail_op == op && *name == target)
        {
            return Err(PortError::Other(format!("injected failure: {:?} {}", op, target)));
        }

        Ok(state)
    }

    // ------------------------------------------------------------------
    // Seeding (not recorded)
    // ------------------------------------------------------------------

    /// Add a tap device.
    pub fn add_tap(&self, name: &str, up: bool) -> &Self {
        self.add(name, InterfaceKind::Tap, up)
    }

    /// Add a bridge device.
    pub fn add_bridge(&self, name: &str, up: bool) -> &Self {
        self.add(name, InterfaceKind::Bridge, up)
    }

    fn add(&self, name: &str, kind: InterfaceKind, up: bool) -> &Self {
        let mut iface = FakeInterface::new(kind);
        iface.up = up;
        self.lock().interfaces.insert(name.to_string(), iface);
        self
    }

    /// Give an existing interface an address.
    pub fn add_address(&self, name: &str, ip: Ipv4Addr, netmask: Ipv4Addr) -> &Self {
        if let Some(iface) = self.lock().interfaces.get_mut(name) {
            iface.addresses.push((ip, netmask));
        }
        self
    }

    /// Enslave an existing interface to a bridge.
    pub fn add_member(&self, bridge: &str, member: &str) -> &Self {
        if let Some(iface) = self.lock().interfaces.get_mut(member) {
            iface.master = Some(bridge.to_string());
        }
        self
    }

    /// Change the admin state of an existing interface behind the reconciler's back.
    pub fn set_up(&self, name: &str, up: bool) -> &Self {
        if let Some(iface) = self.lock().interfaces.get_mut(name) {
            iface.up = up;
        }
        self
    }

    /// Make every `op` call against `name` fail.
    pub fn fail_on(&self, op: Op, name: &str) -> &Self {
        self.lock().failures.push((op, name.to_string()));
        self
    }

    /// Remove all injected failures.
    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    /// Every call issued so far, in order.
    pub fn calls(&self) -> Vec<PortCall> {
        self.lock().calls.clone()
    }

    /// Mutating calls issued so far, in order.
    pub fn mutations(&self) -> Vec<PortCall> {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.is_mutation())
            .cloned()
            .collect()
    }

    /// Forget the recorded calls.
    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Index of the first recorded call equal to `call`.
    pub fn position(&self, call: &PortCall) -> Option<usize> {
        self.lock().calls.iter().position(|c| c == call)
    }

    /// Current state of one interface.
    pub fn interface(&self, name: &str) -> Option<FakeInterface> {
        self.lock().interfaces.get(name).cloned()
    }

    /// Current state of the whole namespace.
    pub fn snapshot(&self) -> BTreeMap<String, FakeInterface> {
        self.lock().interfaces.clone()
    }
}

impl NetworkPort for FakeNetworkPort {
    fn exists(&self, name: &str) -> Result<bool, PortError> {
        let state = self.record(PortCall::Exists(name.to_string()))?;
        Ok(state.interfaces.contains_key(name))
    }

    fn is_up(&self, name: &str) -> Result<bool, PortError> {
        let state = self.record(PortCall::IsUp(name.to_string()))?;
        Ok(state.get(name)?.up)
    }

    fn create_tap(&self, name: &str) -> Result<(), PortError> {
        let mut state = self.record(PortCall::CreateTap(name.to_string()))?;
        match state.interfaces.get(name) {
            Some(iface) if iface.kind != InterfaceKind::Tap => Err(PortError::Other(format!(
                "{} already exists and is not a tap",
                name
            ))),
            Some(_) => Ok(()),
            None => {
                state
                    .interfaces
                    .insert(name.to_string(), FakeInterface::new(InterfaceKind::Tap));
                Ok(())
            }
        }
    }

    fn create_bridge(&self, name: &str) -> Result<(), PortError> {
        let mut state = self.record(PortCall::CreateBridge(name.to_string()))?;
        if state.interfaces.contains_key(name) {
            return Err(PortError::Other("RTNETLINK answers: File exists".to_string()));
        }
        state
            .interfaces
            .insert(name.to_string(), FakeInterface::new(InterfaceKind::Bridge));
        Ok(())
    }

    fn attach_to_bridge(&self, bridge: &str, member: &str) -> Result<(), PortError> {
        let mut state = self.record(PortCall::AttachToBridge {
            bridge: bridge.to_string(),
            member: member.to_string(),
        })?;
        state.bridge(bridge)?;
        if bridge == member {
            return Err(PortError::Other(format!("cannot enslave {} to itself", bridge)));
        }
        state.get_mut(member)?.master = Some(bridge.to_string());
        Ok(())
    }

    fn has_member(&self, bridge: &str, member: &str) -> Result<bool, PortError> {
        let state = self.record(PortCall::HasMember {
            bridge: bridge.to_string(),
            member: member.to_string(),
        })?;
        state.bridge(bridge)?;
        Ok(state
            .interfaces
            .get(member)
            .is_some_and(|iface| iface.master.as_deref() == Some(bridge)))
    }

    fn list_members(&self, bridge: &str) -> Result<Vec<String>, PortError> {
        let state = self.record(PortCall::ListMembers(bridge.to_string()))?;
        state.bridge(bridge)?;
        Ok(state.members(bridge))
    }

    fn set_ip(&self, name: &str, ip: Ipv4Addr, netmask: Ipv4Addr) -> Result<(), PortError> {
        let mut state = self.record(PortCall::SetIp {
            name: name.to_string(),
            ip,
            netmask,
        })?;
        let iface = state.get_mut(name)?;
        if iface.addresses.iter().any(|(existing, _)| *existing == ip) {
            return Err(PortError::Other("RTNETLINK answers: File exists".to_string()));
        }
        iface.addresses.push((ip, netmask));
        Ok(())
    }

    fn flush_ip(&self, name: &str) -> Result<(), PortError> {
        let mut state = self.record(PortCall::FlushIp(name.to_string()))?;
        state.get_mut(name)?.addresses.clear();
        Ok(())
    }

    fn get_ip(&self, name: &str) -> Result<Option<Ipv4Addr>, PortError> {
        let state = self.record(PortCall::GetIp(name.to_string()))?;
        Ok(state.get(name)?.addresses.first().map(|(ip, _)| *ip))
    }

    fn up(&self, name: &str) -> Result<(), PortError> {
        let mut state = self.record(PortCall::Up(name.to_string()))?;
        state.get_mut(name)?.up = true;
        Ok(())
    }

    fn down(&self, name: &str) -> Result<(), PortError> {
        let mut state = self.record(PortCall::Down(name.to_string()))?;
        state.get_mut(name)?.up = false;
        Ok(())
    }

    fn delete(&self, name: &str) -> Result<(), PortError> {
        let mut state = self.record(PortCall::Delete(name.to_string()))?;
        state.interfaces.remove(name).ok_or_else(|| missing(name))?;
        for iface in state.interfaces.values_mut() {
            if iface.master.as_deref() == Some(name) {
                iface.master = None;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calls_are_recorded_in_order() {
        let port = FakeNetworkPort::new();
        port.create_tap("tap0").unwrap();
        port.up("tap0").unwrap();
        assert!(port.is_up("tap0").unwrap());

        assert_eq!(
            port.calls(),
            vec![
                PortCall::CreateTap("tap0".to_string()),
                PortCall::Up("tap0".to_string()),
                PortCall::IsUp("tap0".to_string()),
            ]
        );
        assert_eq!(port.mutations().len(), 2);
    }

    #[test]
    fn test_create_tap_rejects_non_tap_collision() {
        let port = FakeNetworkPort::new();
        port.add_bridge("br0", false);
        assert!(port.create_tap("br0").is_err());
        assert!(port.create_bridge("br0").is_err());
    }

    #[test]
    fn test_set_ip_does_not_flush() {
        let port = FakeNetworkPort::new();
        port.add_bridge("br0", false);
        port.set_ip("br0", Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(255, 255, 255, 0))
            .unwrap();
        port.set_ip("br0", Ipv4Addr::new(10, 0, 1, 1), Ipv4Addr::new(255, 255, 255, 0))
            .unwrap();

        assert_eq!(port.interface("br0").unwrap().addresses.len(), 2);
        assert_eq!(port.get_ip("br0").unwrap(), Some(Ipv4Addr::new(10, 0, 0, 1)));

        port.flush_ip("br0").unwrap();
        assert_eq!(port.get_ip("br0").unwrap(), None);
    }

    #[test]
    fn test_bridge_membership() {
        let port = FakeNetworkPort::new();
        port.add_bridge("br0", false).add_tap("tap0", false).add_tap("tap1", false);

        assert!(!port.has_member("br0", "tap0").unwrap());
        port.attach_to_bridge("br0", "tap0").unwrap();
        port.attach_to_bridge("br0", "tap1").unwrap();
        assert!(port.has_member("br0", "tap0").unwrap());
        assert_eq!(port.list_members("br0").unwrap(), vec!["tap0", "tap1"]);

        port.delete("br0").unwrap();
        assert_eq!(port.interface("tap0").unwrap().master, None);
    }

    #[test]
    fn test_queries_on_missing_interfaces_fail() {
        let port = FakeNetworkPort::new();
        assert!(!port.exists("tap0").unwrap());
        assert!(port.is_up("tap0").is_err());
        assert!(port.get_ip("tap0").is_err());
        assert!(port.list_members("br0").is_err());
    }

    #[test]
    fn test_injected_failure() {
        let port = FakeNetworkPort::new();
        port.fail_on(Op::CreateTap, "tap0");

        assert!(port.create_tap("tap0").is_err());
        assert!(!port.exists("tap0").unwrap());
        assert!(port.create_tap("tap1").is_ok());

        port.clear_failures();
        assert!(port.create_tap("tap0").is_ok());
    }
}
