//! Networking utilities for host-side VM plumbing.
//!
//! This library provides helpers for:
//! - CIDR block allocation for new isolated network segments
//! - Bridge address derivation and netmask handling
//! - Interface name validation
//! - Guest MAC address generation
//!
//! Everything here is pure; nothing touches the host's network namespace.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use thiserror::Error;

/// Networking errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkError {
    /// Invalid IP address.
    #[error("invalid IP address: {0}")]
    InvalidAddress(String),

    /// Invalid CIDR prefix.
    #[error("invalid CIDR prefix: {0}")]
    InvalidPrefix(String),

    /// Netmask with non-contiguous bits.
    #[error("invalid netmask: {0}")]
    InvalidNetmask(String),

    /// Interface name the kernel would reject.
    #[error("invalid interface name '{name}': {reason}")]
    InvalidInterfaceName { name: String, reason: &'static str },
}

// ============================================================================
// Defaults
// ============================================================================

/// Bridge used when bridging is requested without a name.
pub const DEFAULT_BRIDGE_NAME: &str = "br0";

/// Tap device used when the caller does not pick one.
pub const DEFAULT_TAP_NAME: &str = "tap0";

/// Host octet the bridge takes inside the guest's /24.
pub const BRIDGE_HOST_OCTET: u8 = 66;

/// Netmask assumed when an address is assigned without one.
pub const DEFAULT_NETMASK: Ipv4Addr = Ipv4Addr::new(255, 255, 255, 0);

/// Maximum interface name length (IFNAMSIZ - 1).
pub const MAX_INTERFACE_NAME_LEN: usize = 15;

// ============================================================================
// CIDR Block Allocation
// ============================================================================

/// IPv4 network prefix, stored with host bits cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CidrBlock {
    /// Network address of the block.
    network: Ipv4Addr,

    /// Prefix length (e.g., 16 for /16).
    prefix_len: u8,
}

impl CidrBlock {
    /// Create a new block, masking the address to the prefix.
    pub fn new(address: Ipv4Addr, prefix_len: u8) -> Result<Self, NetworkError> {
        if prefix_len > 32 {
            return Err(NetworkError::InvalidPrefix(format!(
                "prefix length {} exceeds 32",
                prefix_len
            )));
        }

        Ok(Self {
            network: mask_ipv4(address, prefix_len),
            prefix_len,
        })
    }

    /// Network address of the block.
    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    /// Prefix length of the block.
    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// The block immediately above this one, at the same prefix length.
    ///
    /// Only /16 and /24 blocks have a defined successor. The increment
    /// ripples into more significant octets when an octet wraps to zero.
    pub fn next_block(&self) -> Option<Self> {
        let mut octets = self.network.octets();

        match self.prefix_len {
            16 => increment_with_carry(&mut octets, 1),
            24 => increment_with_carry(&mut octets, 2),
            _ => return None,
        }

        Some(Self {
            network: Ipv4Addr::from(octets),
            prefix_len: self.prefix_len,
        })
    }
}

impl FromStr for CidrBlock {
    type Err = NetworkError;

    /// Parse from CIDR notation (e.g., "172.31.0.0/16").
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((addr_str, prefix_str)) = s.trim().split_once('/') else {
            return Err(NetworkError::InvalidPrefix(format!(
                "missing '/' in CIDR: {}",
                s
            )));
        };

        let address = Ipv4Addr::from_str(addr_str)
            .map_err(|_| NetworkError::InvalidAddress(addr_str.to_string()))?;

        let prefix_len = prefix_str
            .parse::<u8>()
            .map_err(|_| NetworkError::InvalidPrefix(prefix_str.to_string()))?;

        Self::new(address, prefix_len)
    }
}

impl fmt::Display for CidrBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix_len)
    }
}

/// Add one to `octets[index]`, carrying into lower indices on wrap.
fn increment_with_carry(octets: &mut [u8; 4], index: usize) {
    for i in (0..=index).rev() {
        octets[i] = octets[i].wrapping_add(1);
        if octets[i] != 0 {
            return;
        }
    }
}

/// Mask an IPv4 address to a prefix length.
fn mask_ipv4(addr: Ipv4Addr, prefix_len: u8) -> Ipv4Addr {
    let bits = u32::from(addr);
    Ipv4Addr::from(bits & prefix_mask(prefix_len))
}

fn prefix_mask(prefix_len: u8) -> u32 {
    match prefix_len {
        0 => 0,
        n if n >= 32 => u32::MAX,
        n => u32::MAX << (32 - n),
    }
}

/// Pick the block that follows the greatest of `existing`.
///
/// The greatest block is chosen by comparing network addresses byte by byte,
/// regardless of prefix length; the first of several equal blocks wins.
/// Entries that do not parse as IPv4 CIDR blocks are ignored.
///
/// Returns an empty string when there is nothing to step past or when the
/// greatest block is neither /16 nor /24.
pub fn allocate_new_cidr_block<S: AsRef<str>>(existing: &[S]) -> String {
    let mut greatest: Option<CidrBlock> = None;

    for block in existing.iter().filter_map(|b| b.as_ref().parse::<CidrBlock>().ok()) {
        match greatest {
            Some(max) if block.network.octets() <= max.network.octets() => {}
            _ => greatest = Some(block),
        }
    }

    greatest
        .and_then(|block| block.next_block())
        .map(|block| block.to_string())
        .unwrap_or_default()
}

// ============================================================================
// Address Helpers
// ============================================================================

/// Address a bridge takes for guests addressed from `guest_ip`.
///
/// The last octet is replaced with [`BRIDGE_HOST_OCTET`], so any address in
/// the guest's /24 maps to the same bridge address.
pub fn bridge_address(guest_ip: Ipv4Addr) -> Ipv4Addr {
    let [a, b, c, _] = guest_ip.octets();
    Ipv4Addr::new(a, b, c, BRIDGE_HOST_OCTET)
}

/// Convert a dotted netmask (e.g. 255.255.255.0) to a prefix length.
pub fn netmask_to_prefix(netmask: Ipv4Addr) -> Result<u8, NetworkError> {
    let bits = u32::from(netmask);
    let prefix_len = bits.leading_ones();

    if bits.checked_shl(prefix_len).unwrap_or(0) != 0 {
        return Err(NetworkError::InvalidNetmask(netmask.to_string()));
    }

    Ok(prefix_len as u8)
}

/// Convert a prefix length to a dotted netmask.
pub fn prefix_to_netmask(prefix_len: u8) -> Result<Ipv4Addr, NetworkError> {
    if prefix_len > 32 {
        return Err(NetworkError::InvalidPrefix(format!(
            "prefix length {} exceeds 32",
            prefix_len
        )));
    }
    Ok(Ipv4Addr::from(prefix_mask(prefix_len)))
}

/// Parse a netmask given either dotted (255.255.255.0) or as a prefix (24).
pub fn parse_netmask(s: &str) -> Result<Ipv4Addr, NetworkError> {
    let s = s.trim().trim_start_matches('/');

    if let Ok(prefix_len) = s.parse::<u8>() {
        return prefix_to_netmask(prefix_len);
    }

    let netmask = Ipv4Addr::from_str(s).map_err(|_| NetworkError::InvalidNetmask(s.to_string()))?;
    netmask_to_prefix(netmask)?;
    Ok(netmask)
}

/// Check that a name is acceptable to the kernel as an interface name.
pub fn validate_interface_name(name: &str) -> Result<(), NetworkError> {
    let invalid = |reason| NetworkError::InvalidInterfaceName {
        name: name.to_string(),
        reason,
    };

    if name.is_empty() {
        return Err(invalid("must not be empty"));
    }
    if name.len() > MAX_INTERFACE_NAME_LEN {
        return Err(invalid("exceeds the 15 character Linux interface limit"));
    }
    if name == "." || name == ".." {
        return Err(invalid("reserved name"));
    }
    if !name
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.'))
    {
        return Err(invalid("only alphanumeric, '-', '_' and '.' are allowed"));
    }

    Ok(())
}

// ============================================================================
// MAC Addresses
// ============================================================================

/// Ethernet hardware address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    /// Create from raw octets.
    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    /// Generate a random locally administered unicast address.
    pub fn random() -> Self {
        let mut octets: [u8; 6] = rand::random();
        octets[0] = (octets[0] | 0x02) & !0x01;
        Self(octets)
    }

    /// Raw octets.
    pub fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// Whether the locally administered bit is set.
    pub fn is_local(&self) -> bool {
        self.0[0] & 0x02 != 0
    }

    /// Whether this is a unicast address.
    pub fn is_unicast(&self) -> bool {
        self.0[0] & 0x01 == 0
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::nothing_to_step_past(&[], "")]
    #[case::slash16(&["10.0.0.0/16", "172.31.0.0/16"], "172.32.0.0/16")]
    #[case::slash24(&["10.0.0.0/24", "172.31.0.0/24"], "172.31.1.0/24")]
    #[case::slash16_carry_into_first(&["10.0.0.0/16", "172.255.0.0/16"], "173.0.0.0/16")]
    #[case::slash24_carry_into_second(&["10.0.0.0/16", "172.1.255.0/24"], "172.2.0.0/24")]
    #[case::slash24_double_carry(&["10.0.0.0/16", "172.255.255.0/24"], "173.0.0.0/24")]
    fn test_allocate_new_cidr_block(#[case] existing: &[&str], #[case] expected: &str) {
        assert_eq!(allocate_new_cidr_block(existing), expected);
    }

    #[test]
    fn test_allocate_compares_bytes_not_strings() {
        // "9.0.0.0" sorts after "10.0.0.0" as a string.
        let existing = ["9.0.0.0/16", "10.0.0.0/16"];
        assert_eq!(allocate_new_cidr_block(&existing), "10.1.0.0/16");
    }

    #[test]
    fn test_allocate_declines_unsupported_prefix() {
        assert_eq!(allocate_new_cidr_block(&["10.0.0.0/16", "172.31.0.0/20"]), "");
        assert_eq!(allocate_new_cidr_block(&["10.0.0.0/8"]), "");
    }

    #[test]
    fn test_allocate_ignores_unparseable_blocks() {
        let existing = ["garbage", "10.0.0.0/16", "2001:db8::/32"];
        assert_eq!(allocate_new_cidr_block(&existing), "10.1.0.0/16");
        assert_eq!(allocate_new_cidr_block(&["garbage"]), "");
    }

    #[test]
    fn test_allocate_first_of_equal_blocks_wins() {
        assert_eq!(
            allocate_new_cidr_block(&["10.0.0.0/16", "10.0.0.0/24"]),
            "10.1.0.0/16"
        );
    }

    #[test]
    fn test_allocate_carry_only_on_wrap() {
        // Second octet is already zero; only the third octet moves.
        assert_eq!(allocate_new_cidr_block(&["10.0.5.0/24"]), "10.0.6.0/24");
    }

    #[test]
    fn test_cidr_block_masks_host_bits() {
        let block: CidrBlock = "172.31.7.9/16".parse().unwrap();
        assert_eq!(block.network(), Ipv4Addr::new(172, 31, 0, 0));
        assert_eq!(block.to_string(), "172.31.0.0/16");
        assert_eq!(block.next_block().unwrap().to_string(), "172.32.0.0/16");
    }

    #[test]
    fn test_cidr_block_parse_errors() {
        assert!(matches!(
            "10.0.0.0".parse::<CidrBlock>(),
            Err(NetworkError::InvalidPrefix(_))
        ));
        assert!(matches!(
            "10.0.0/16".parse::<CidrBlock>(),
            Err(NetworkError::InvalidAddress(_))
        ));
        assert!(matches!(
            "10.0.0.0/33".parse::<CidrBlock>(),
            Err(NetworkError::InvalidPrefix(_))
        ));
    }

    #[test]
    fn test_bridge_address() {
        let guest: Ipv4Addr = "192.168.1.100".parse().unwrap();
        assert_eq!(bridge_address(guest), Ipv4Addr::new(192, 168, 1, 66));
    }

    #[test]
    fn test_netmask_conversion() {
        assert_eq!(netmask_to_prefix(Ipv4Addr::new(255, 255, 255, 0)).unwrap(), 24);
        assert_eq!(netmask_to_prefix(Ipv4Addr::new(255, 255, 0, 0)).unwrap(), 16);
        assert_eq!(netmask_to_prefix(Ipv4Addr::new(0, 0, 0, 0)).unwrap(), 0);
        assert_eq!(netmask_to_prefix(Ipv4Addr::BROADCAST).unwrap(), 32);
        assert!(netmask_to_prefix(Ipv4Addr::new(255, 0, 255, 0)).is_err());

        assert_eq!(prefix_to_netmask(20).unwrap(), Ipv4Addr::new(255, 255, 240, 0));
        assert!(prefix_to_netmask(33).is_err());
    }

    #[test]
    fn test_parse_netmask() {
        assert_eq!(parse_netmask("255.255.255.0").unwrap(), DEFAULT_NETMASK);
        assert_eq!(parse_netmask("24").unwrap(), DEFAULT_NETMASK);
        assert_eq!(parse_netmask("/16").unwrap(), Ipv4Addr::new(255, 255, 0, 0));
        assert!(parse_netmask("255.0.255.0").is_err());
        assert!(parse_netmask("mask").is_err());
    }

    #[test]
    fn test_interface_name_validation() {
        assert!(validate_interface_name("tap0").is_ok());
        assert!(validate_interface_name("br-vm_1.10").is_ok());
        assert!(validate_interface_name("").is_err());
        assert!(validate_interface_name("a-very-long-tap-name").is_err());
        assert!(validate_interface_name("tap 0").is_err());
        assert!(validate_interface_name("tap/0").is_err());
        assert!(validate_interface_name("..").is_err());
    }

    #[test]
    fn test_random_mac_is_local_unicast() {
        for _ in 0..32 {
            let mac = MacAddress::random();
            assert!(mac.is_local());
            assert!(mac.is_unicast());
        }
    }

    #[test]
    fn test_mac_display() {
        let mac = MacAddress::new([0x08, 0x00, 0x27, 0x00, 0xa8, 0xe8]);
        assert_eq!(mac.to_string(), "08:00:27:00:a8:e8");
    }
}
