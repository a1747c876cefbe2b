//! CLI commands.

mod cidr;
mod down;
mod mac;
mod run;
mod status;
mod up;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use hostnet_reconcile::{ReconcileError, ReconciliationIntent, Reconciler};

use crate::config::Config;
use crate::iproute::IprouteNetworkPort;
use crate::logging;
use crate::output::OutputFormat;

pub use status::{interface_rows, InterfaceRow};
pub use up::ChangeView;

/// hostnet - prepare tap and bridge interfaces for local VMs.
#[derive(Debug, Parser)]
#[command(name = "hostnet")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format.
    #[arg(long, global = true, env = "HOSTNET_FORMAT", value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,

    /// Run `ip` through sudo.
    #[arg(long, global = true)]
    sudo: bool,

    /// Log level; overrides HOSTNET_LOG_LEVEL.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Create and activate the tap (and bridge).
    Up(up::UpCommand),

    /// Deactivate the tap, and the bridge once nothing uses it.
    Down(down::DownCommand),

    /// Bring the network up, run a command, then bring it down.
    Run(run::RunCommand),

    /// Show the current state of the tap and bridge.
    Status(status::StatusCommand),

    /// Pick the block following the greatest of the given CIDR blocks.
    AllocateCidr(cidr::AllocateCidrCommand),

    /// Generate a random locally administered MAC address.
    Mac(mac::MacCommand),
}

impl Cli {
    /// Run the CLI command.
    pub async fn run(self) -> Result<()> {
        let mut config = Config::from_env()?;
        config.use_sudo |= self.sudo;
        if let Some(level) = self.log_level {
            config.log_level = level;
        }

        logging::init(&config.log_level, config.log_format)?;

        let ctx = CommandContext {
            config,
            format: self.format,
        };

        match self.command {
            Commands::Up(cmd) => cmd.run(ctx).await,
            Commands::Down(cmd) => cmd.run(ctx).await,
            Commands::Run(cmd) => cmd.run(ctx).await,
            Commands::Status(cmd) => cmd.run(ctx).await,
            Commands::AllocateCidr(cmd) => cmd.run(ctx).await,
            Commands::Mac(cmd) => cmd.run(ctx).await,
        }
    }
}

/// Context shared by all commands.
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub config: Config,
    pub format: OutputFormat,
}

impl CommandContext {
    /// Reconciler over the host's `ip` tooling.
    pub fn reconciler(&self) -> Reconciler<IprouteNetworkPort> {
        Reconciler::new(IprouteNetworkPort::from_config(&self.config))
    }

    /// Run a reconciler operation on the blocking pool.
    pub async fn reconcile<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Reconciler<IprouteNetworkPort>) -> Result<T, ReconcileError> + Send + 'static,
        T: Send + 'static,
    {
        let reconciler = self.reconciler();
        let result = tokio::task::spawn_blocking(move || f(&reconciler))
            .await
            .context("reconciler task failed")?;
        Ok(result?)
    }
}

/// Interface selection shared by the network commands.
#[derive(Debug, Clone, Default, Args)]
pub struct NetworkArgs {
    /// Tap device name [default: HOSTNET_TAP_NAME or tap0].
    #[arg(long)]
    pub tap: Option<String>,

    /// Attach the tap to a bridge.
    #[arg(long)]
    pub bridged: bool,

    /// Bridge name; implies --bridged [default: HOSTNET_BRIDGE_NAME or br0].
    #[arg(long)]
    pub bridge: Option<String>,

    /// Guest IPv4 address; the bridge takes the same network with host part 66.
    #[arg(long)]
    pub ip: Option<String>,

    /// Netmask for the bridge address, dotted or as a prefix length.
    #[arg(long)]
    pub netmask: Option<String>,

    /// Use this bridge address instead of deriving one from --ip.
    #[arg(long)]
    pub bridge_ip: Option<String>,
}

impl NetworkArgs {
    /// Resolve flags against configured defaults.
    pub fn intent(&self, config: &Config) -> Result<ReconciliationIntent, ReconcileError> {
        let tap = self.tap.as_deref().unwrap_or(&config.tap_name);
        let bridge = match (&self.bridge, self.bridged) {
            (Some(name), _) => name.as_str(),
            (None, true) => config.bridge_name.as_str(),
            (None, false) => "",
        };
        let netmask = self
            .netmask
            .clone()
            .unwrap_or_else(|| config.netmask.to_string());

        ReconciliationIntent::from_parts(
            tap,
            bridge,
            self.ip.as_deref().unwrap_or(""),
            &netmask,
            self.bridge_ip.as_deref().unwrap_or(""),
        )
    }
}
