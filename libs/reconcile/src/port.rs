//! Network interface port.
//!
//! The primitives the reconciler needs from the host. Implementations shell
//! out to `ip`, talk netlink, or keep an in-memory model for tests.
//!
//! Every call is synchronous and observes or mutates shared host state. No
//! call is atomic with respect to other processes changing the same
//! interface, so callers must not cache answers across calls.

use std::net::Ipv4Addr;

use crate::error::PortError;

/// Query and mutate host network interfaces.
pub trait NetworkPort {
    /// Whether an interface with this name exists.
    fn exists(&self, name: &str) -> Result<bool, PortError>;

    /// Whether the interface is administratively up.
    fn is_up(&self, name: &str) -> Result<bool, PortError>;

    /// Create a tap device.
    ///
    /// Fails on insufficient privilege or when the name is taken by a
    /// non-tap interface.
    fn create_tap(&self, name: &str) -> Result<(), PortError>;

    /// Create a bridge device.
    fn create_bridge(&self, name: &str) -> Result<(), PortError>;

    /// Enslave `member` to `bridge`. Both must exist.
    ///
    /// Not assumed idempotent; check [`has_member`](Self::has_member) first.
    fn attach_to_bridge(&self, bridge: &str, member: &str) -> Result<(), PortError>;

    /// Whether `member` is enslaved to `bridge`.
    fn has_member(&self, bridge: &str, member: &str) -> Result<bool, PortError>;

    /// Names of the interfaces enslaved to `bridge`.
    fn list_members(&self, bridge: &str) -> Result<Vec<String>, PortError>;

    /// Add an address. Existing addresses are kept.
    fn set_ip(&self, name: &str, ip: Ipv4Addr, netmask: Ipv4Addr) -> Result<(), PortError>;

    /// Remove every address from the interface.
    fn flush_ip(&self, name: &str) -> Result<(), PortError>;

    /// Primary IPv4 address, if any.
    fn get_ip(&self, name: &str) -> Result<Option<Ipv4Addr>, PortError>;

    /// Bring the interface up.
    fn up(&self, name: &str) -> Result<(), PortError>;

    /// Bring the interface down.
    fn down(&self, name: &str) -> Result<(), PortError>;

    /// Delete the interface.
    fn delete(&self, name: &str) -> Result<(), PortError>;
}

impl<P: NetworkPort + ?Sized> NetworkPort for &P {
    fn exists(&self, name: &str) -> Result<bool, PortError> {
        (**self).exists(name)
    }

    fn is_up(&self, name: &str) -> Result<bool, PortError> {
        (**self).is_up(name)
    }

    fn create_tap(&self, name: &str) -> Result<(), PortError> {
        (**self).create_tap(name)
    }

    fn create_bridge(&self, name: &str) -> Result<(), PortError> {
        (**self).create_bridge(name)
    }

    fn attach_to_bridge(&self, bridge: &str, member: &str) -> Result<(), PortError> {
        (**self).attach_to_bridge(bridge, member)
    }

    fn has_member(&self, bridge: &str, member: &str) -> Result<bool, PortError> {
        (**self).has_member(bridge, member)
    }

    fn list_members(&self, bridge: &str) -> Result<Vec<String>, PortError> {
        (**self).list_members(bridge)
    }

    fn set_ip(&self, name: &str, ip: Ipv4Addr, netmask: Ipv4Addr) -> Result<(), PortError> {
        (**self).set_ip(name, ip, netmask)
    }

    fn flush_ip(&self, name: &str) -> Result<(), PortError> {
        (**self).flush_ip(name)
    }

    fn get_ip(&self, name: &str) -> Result<Option<Ipv4Addr>, PortError> {
        (**self).get_ip(name)
    }

    fn up(&self, name: &str) -> Result<(), PortError> {
        (**self).up(name)
    }

    fn down(&self, name: &str) -> Result<(), PortError> {
        (**self).down(name)
    }

    fn delete(&self, name: &str) -> Result<(), PortError> {
        (**self).delete(name)
    }
}
