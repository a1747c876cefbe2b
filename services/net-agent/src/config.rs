//! Configuration for the network agent.

use std::net::Ipv4Addr;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use hostnet_networking::{
    parse_netmask, validate_interface_name, DEFAULT_BRIDGE_NAME, DEFAULT_NETMASK, DEFAULT_TAP_NAME,
};

use crate::logging::LogFormat;

/// Network agent configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Bridge used when bridging is requested without a name.
    pub bridge_name: String,

    /// Tap used when none is given on the command line.
    pub tap_name: String,

    /// Netmask applied to the bridge address.
    pub netmask: Ipv4Addr,

    /// Prefix every `ip` invocation with `sudo`.
    pub use_sudo: bool,

    /// Path or name of the `ip` binary.
    pub ip_bin: String,

    /// Directory listing network interfaces.
    pub sysfs_net_dir: PathBuf,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log line format.
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bridge_name: DEFAULT_BRIDGE_NAME.to_string(),
            tap_name: DEFAULT_TAP_NAME.to_string(),
            netmask: DEFAULT_NETMASK,
            use_sudo: false,
            ip_bin: "ip".to_string(),
            sysfs_net_dir: PathBuf::from("/sys/class/net"),
            log_level: "info".to_string(),
            log_format: LogFormat::Compact,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bridge_name = var("HOSTNET_BRIDGE_NAME").unwrap_or(defaults.bridge_name);
        validate_interface_name(&bridge_name).context("invalid HOSTNET_BRIDGE_NAME")?;

        let tap_name = var("HOSTNET_TAP_NAME").unwrap_or(defaults.tap_name);
        validate_interface_name(&tap_name).context("invalid HOSTNET_TAP_NAME")?;

        let netmask = match var("HOSTNET_NETMASK") {
            Some(v) => parse_netmask(&v).context("invalid HOSTNET_NETMASK")?,
            None => defaults.netmask,
        };

        let use_sudo = match var("HOSTNET_SUDO") {
            Some(v) => parse_bool(&v).context("invalid HOSTNET_SUDO")?,
            None => defaults.use_sudo,
        };

        let ip_bin = var("HOSTNET_IP_BIN").unwrap_or(defaults.ip_bin);

        let sysfs_net_dir = var("HOSTNET_SYSFS_NET")
            .map(PathBuf::from)
            .unwrap_or(defaults.sysfs_net_dir);

        let log_level = var("HOSTNET_LOG_LEVEL").unwrap_or(defaults.log_level);

        let log_format = match var("HOSTNET_LOG_FORMAT") {
            Some(v) => v
                .parse()
                .map_err(|e: String| anyhow!(e))
                .context("invalid HOSTNET_LOG_FORMAT")?,
            None => defaults.log_format,
        };

        Ok(Self {
            bridge_name,
            tap_name,
            netmask,
            use_sudo,
            ip_bin,
            sysfs_net_dir,
            log_level,
            log_format,
        })
    }
}

fn parse_bool(s: &str) -> Result<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(anyhow!("'{}' is not a boolean", other)),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use rstest::rstest;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.bridge_name, "br0");
        assert_eq!(config.tap_name, "tap0");
        assert_eq!(config.netmask, Ipv4Addr::new(255, 255, 255, 0));
        assert!(!config.use_sudo);
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("HOSTNET_BRIDGE_NAME", "br7"),
            ("HOSTNET_TAP_NAME", "vm7"),
            ("HOSTNET_NETMASK", "/16"),
            ("HOSTNET_SUDO", "yes"),
            ("HOSTNET_IP_BIN", "/usr/sbin/ip"),
            ("HOSTNET_SYSFS_NET", "/tmp/net"),
            ("HOSTNET_LOG_LEVEL", "debug"),
            ("HOSTNET_LOG_FORMAT", "json"),
        ])
        .unwrap();

        assert_eq!(config.bridge_name, "br7");
        assert_eq!(config.tap_name, "vm7");
        assert_eq!(config.netmask, Ipv4Addr::new(255, 255, 0, 0));
        assert!(config.use_sudo);
        assert_eq!(config.ip_bin, "/usr/sbin/ip");
        assert_eq!(config.sysfs_net_dir, PathBuf::from("/tmp/net"));
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_blank_values_fall_back_to_defaults() {
        let config = load(&[("HOSTNET_TAP_NAME", "  "), ("HOSTNET_SUDO", "")]).unwrap();
        assert_eq!(config.tap_name, "tap0");
        assert!(!config.use_sudo);
    }

    #[rstest]
    #[case::holey_netmask("HOSTNET_NETMASK", "255.0.255.0")]
    #[case::prefix_too_long("HOSTNET_NETMASK", "33")]
    #[case::not_a_bool("HOSTNET_SUDO", "maybe")]
    #[case::long_tap("HOSTNET_TAP_NAME", "a-very-long-tap-name")]
    #[case::bad_bridge("HOSTNET_BRIDGE_NAME", "br/0")]
    #[case::unknown_log_format("HOSTNET_LOG_FORMAT", "xml")]
    fn test_invalid_values_rejected(#[case] key: &str, #[case] value: &str) {
        let err = load(&[(key, value)]).unwrap_err();
        assert!(err.to_string().contains(key), "{:#}", err);
    }
}
