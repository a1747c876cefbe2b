//! [`NetworkPort`] backed by iproute2.
//!
//! Mutations and most queries shell out to `ip`; existence is read from
//! sysfs. Output is requested in one-line mode (`-o`) so each interface or
//! address is a single line.

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::process::Command;

use hostnet_reconcile::{NetworkPort, PortError};
use tracing::debug;

use crate::config::Config;

/// Talks to the host through the `ip` command.
#[derive(Debug, Clone)]
pub struct IprouteNetworkPort {
    ip_bin: String,
    sudo: bool,
    sysfs_net_dir: PathBuf,
}

impl Default for IprouteNetworkPort {
    fn default() -> Self {
        Self::new()
    }
}

impl IprouteNetworkPort {
    /// Port using `ip` from `PATH` and `/sys/class/net`.
    pub fn new() -> Self {
        Self {
            ip_bin: "ip".to_string(),
            sudo: false,
            sysfs_net_dir: PathBuf::from("/sys/class/net"),
        }
    }

    /// Port configured from agent configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            ip_bin: config.ip_bin.clone(),
            sudo: config.use_sudo,
            sysfs_net_dir: config.sysfs_net_dir.clone(),
        }
    }

    /// Run every command through `sudo`.
    pub fn with_sudo(mut self, sudo: bool) -> Self {
        self.sudo = sudo;
        self
    }

    /// Use a different `ip` binary.
    pub fn with_ip_bin(mut self, ip_bin: impl Into<String>) -> Self {
        self.ip_bin = ip_bin.into();
        self
    }

    /// Read interface existence from a different directory.
    pub fn with_sysfs_net_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.sysfs_net_dir = dir.into();
        self
    }

    /// Directory consulted by [`NetworkPort::exists`].
    pub fn sysfs_net_dir(&self) -> &Path {
        &self.sysfs_net_dir
    }

    /// Program and arguments for an `ip` invocation.
    fn command_line(&self, args: &[&str]) -> (String, Vec<String>) {
        let mut argv: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        if self.sudo {
            argv.insert(0, self.ip_bin.clone());
            ("sudo".to_string(), argv)
        } else {
            (self.ip_bin.clone(), argv)
        }
    }

    /// Run an `ip` command and return its stdout.
    fn run(&self, args: &[&str]) -> Result<String, PortError> {
        let (program, argv) = self.command_line(args);
        let command = format!("{} {}", program, argv.join(" "));
        debug!(command = %command, "Running ip command");

        let output = Command::new(&program)
            .args(&argv)
            .output()
            .map_err(|source| PortError::Spawn {
                command: command.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PortError::Command {
                command,
                status: output.status.to_string(),
                stderr: stderr.trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl NetworkPort for IprouteNetworkPort {
    fn exists(&self, name: &str) -> Result<bool, PortError> {
        if name.is_empty() || name.contains('/') {
            return Ok(false);
        }
        Ok(self.sysfs_net_dir.join(name).try_exists()?)
    }

    fn is_up(&self, name: &str) -> Result<bool, PortError> {
        let output = self.run(&["-o", "link", "show", "dev", name])?;
        parse_admin_up(&output).ok_or_else(|| PortError::Parse {
            command: format!("ip -o link show dev {}", name),
            detail: "no interface flags in output".to_string(),
        })
    }

    fn create_tap(&self, name: &str) -> Result<(), PortError> {
        self.run(&["tuntap", "add", "dev", name, "mode", "tap"])?;
        Ok(())
    }

    fn create_bridge(&self, name: &str) -> Result<(), PortError> {
        self.run(&["link", "add", "name", name, "type", "bridge"])?;
        Ok(())
    }

    fn attach_to_bridge(&self, bridge: &str, member: &str) -> Result<(), PortError> {
        self.run(&["link", "set", "dev", member, "master", bridge])?;
        Ok(())
    }

    fn has_member(&self, bridge: &str, member: &str) -> Result<bool, PortError> {
        Ok(self.list_members(bridge)?.iter().any(|m| m == member))
    }

    fn list_members(&self, bridge: &str) -> Result<Vec<String>, PortError> {
        let output = self.run(&["-o", "link", "show", "master", bridge])?;
        Ok(parse_link_names(&output))
    }

    fn set_ip(&self, name: &str, ip: Ipv4Addr, netmask: Ipv4Addr) -> Result<(), PortError> {
        let address = format!("{}/{}", ip, netmask);
        self.run(&["address", "add", &address, "dev", name])?;
        Ok(())
    }

    fn flush_ip(&self, name: &str) -> Result<(), PortError> {
        self.run(&["address", "flush", "dev", name])?;
        Ok(())
    }

    fn get_ip(&self, name: &str) -> Result<Option<Ipv4Addr>, PortError> {
        let output = self.run(&["-o", "-4", "address", "show", "dev", name])?;
        parse_first_inet(&output).map_err(|detail| PortError::Parse {
            command: format!("ip -o -4 address show dev {}", name),
            detail,
        })
    }

    fn up(&self, name: &str) -> Result<(), PortError> {
        self.run(&["link", "set", "dev", name, "up"])?;
        Ok(())
    }

    fn down(&self, name: &str) -> Result<(), PortError> {
        self.run(&["link", "set", "dev", name, "down"])?;
        Ok(())
    }

    fn delete(&self, name: &str) -> Result<(), PortError> {
        self.run(&["link", "delete", "dev", name])?;
        Ok(())
    }
}

/// Interface names from `ip -o link show` output.
///
/// Lines look like `7: veth0@if6: <BROADCAST,...> ...`; the peer suffix after
/// `@` is dropped.
pub fn parse_link_names(output: &str) -> Vec<String> {
    output
        .lines()
        .filter(|line| !line.starts_with(char::is_whitespace))
        .filter_map(|line| {
            let (_, rest) = line.split_once(':')?;
            let name = rest.split_whitespace().next()?.trim_end_matches(':');
            let name = name.split('@').next()?;
            (!name.is_empty()).then(|| name.to_string())
        })
        .collect()
}

/// Administrative state from the flag list of the first `ip link` line.
///
/// Returns `None` when no `<...>` flag list is present.
pub fn parse_admin_up(output: &str) -> Option<bool> {
    let line = output.lines().next()?;
    let start = line.find('<')?;
    let end = start + line[start..].find('>')?;
    Some(line[start + 1..end].split(',').any(|flag| flag == "UP"))
}

/// First IPv4 address from `ip -o -4 address show` output.
pub fn parse_first_inet(output: &str) -> Result<Option<Ipv4Addr>, String> {
    let mut tokens = output.split_whitespace();
    while let Some(token) = tokens.next() {
        if token != "inet" {
            continue;
        }
        let Some(cidr) = tokens.next() else {
            return Err("`inet` without an address".to_string());
        };
        let address = cidr.split('/').next().unwrap_or(cidr);
        return address
            .parse()
            .map(Some)
            .map_err(|_| format!("'{}' is not an IPv4 address", cidr));
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINK_TAP_UP: &str = "12: tap0: <NO-CARRIER,BROADCAST,MULTICAST,UP> mtu 1500 qdisc fq_codel master br0 state DOWN mode DEFAULT group default qlen 1000\\    link/ether 6a:1f:2e:33:10:0b brd ff:ff:ff:ff:ff:ff\n";
    const LINK_BR_DOWN: &str = "5: br0: <BROADCAST,MULTICAST> mtu 1500 qdisc noop state DOWN mode DEFAULT group default qlen 1000\\    link/ether 0e:33:1a:90:4b:22 brd ff:ff:ff:ff:ff:ff\n";
    const MEMBERS: &str = "\
12: tap0: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 1500 qdisc fq_codel master br0 state UP mode DEFAULT group default qlen 1000\\    link/ether 6a:1f:2e:33:10:0b brd ff:ff:ff:ff:ff:ff
14: veth1@if13: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 1500 qdisc noqueue master br0 state UP mode DEFAULT group default qlen 1000\\    link/ether 52:9a:0d:11:c4:71 brd ff:ff:ff:ff:ff:ff link-netnsid 0
";
    const ADDRS: &str = "\
5: br0    inet 192.168.1.66/24 brd 192.168.1.255 scope global br0\\       valid_lft forever preferred_lft forever
5: br0    inet 10.0.0.66/16 scope global br0\\       valid_lft forever preferred_lft forever
";

    #[test]
    fn test_parse_link_names() {
        assert_eq!(parse_link_names(MEMBERS), vec!["tap0", "veth1"]);
        assert!(parse_link_names("").is_empty());
    }

    #[test]
    fn test_parse_link_names_skips_continuation_lines() {
        let multi_line = "3: tap1: <BROADCAST> mtu 1500\n    link/ether aa:bb:cc:dd:ee:ff\n";
        assert_eq!(parse_link_names(multi_line), vec!["tap1"]);
    }

    #[test]
    fn test_parse_admin_up() {
        // Admin state, not carrier: a tap without a reader is still UP.
        assert_eq!(parse_admin_up(LINK_TAP_UP), Some(true));
        assert_eq!(parse_admin_up(LINK_BR_DOWN), Some(false));
        assert_eq!(parse_admin_up("5: br0: <LOWER_UP> mtu 1500"), Some(false));
        assert_eq!(parse_admin_up("garbage"), None);
        assert_eq!(parse_admin_up(""), None);
    }

    #[test]
    fn test_parse_first_inet() {
        assert_eq!(
            parse_first_inet(ADDRS).unwrap(),
            Some(Ipv4Addr::new(192, 168, 1, 66))
        );
        assert_eq!(parse_first_inet("").unwrap(), None);
        assert!(parse_first_inet("5: br0    inet").is_err());
        assert!(parse_first_inet("5: br0    inet fd00::1/64").is_err());
    }

    #[test]
    fn test_command_line_with_sudo() {
        let port = IprouteNetworkPort::new().with_ip_bin("/sbin/ip");
        let (program, argv) = port.command_line(&["link", "show"]);
        assert_eq!(program, "/sbin/ip");
        assert_eq!(argv, vec!["link", "show"]);

        let (program, argv) = port.with_sudo(true).command_line(&["link", "show"]);
        assert_eq!(program, "sudo");
        assert_eq!(argv, vec!["/sbin/ip", "link", "show"]);
    }

    #[test]
    fn test_exists_reads_sysfs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("tap7")).unwrap();
        let port = IprouteNetworkPort::new().with_sysfs_net_dir(dir.path());

        assert!(port.exists("tap7").unwrap());
        assert!(!port.exists("tap8").unwrap());
        assert!(!port.exists("../tap7").unwrap());
        assert!(!port.exists("").unwrap());
    }

    #[test]
    fn test_missing_binary_is_spawn_error() {
        let port = IprouteNetworkPort::new().with_ip_bin("/nonexistent/hostnet-ip");
        let err = port.up("tap0").unwrap_err();
        assert!(matches!(err, PortError::Spawn { .. }), "{:?}", err);
    }

    #[test]
    fn test_from_config() {
        let config = Config {
            use_sudo: true,
            ip_bin: "/usr/sbin/ip".to_string(),
            ..Config::default()
        };
        let port = IprouteNetworkPort::from_config(&config);
        assert!(port.sudo);
        assert_eq!(port.ip_bin, "/usr/sbin/ip");
        assert_eq!(port.sysfs_net_dir(), Path::new("/sys/class/net"));
    }
}
