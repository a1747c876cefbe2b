//! Host-side network agent.
//!
//! Prepares tap and bridge interfaces before a VM launch and quiesces them
//! after the VM exits. The heavy lifting lives in `hostnet-reconcile`; this
//! crate provides the `ip`-backed port, configuration, logging and the
//! `hostnet` command line.

pub mod commands;
pub mod config;
pub mod error;
pub mod iproute;
pub mod logging;
pub mod output;

pub use config::Config;
pub use iproute::IprouteNetworkPort;
pub use logging::LogFormat;
