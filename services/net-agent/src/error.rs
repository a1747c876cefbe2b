//! Error display for the CLI.

use colored::Colorize;
use hostnet_reconcile::{PortError, ReconcileError};

/// Print an error chain, followed by a hint when one applies.
pub fn print_error(err: &anyhow::Error) {
    eprintln!("{} {:#}", "Error:".red().bold(), err);

    if let Some(hint) = hint_for(err) {
        eprintln!("\n{}", format!("Hint: {}", hint).yellow());
    }
}

/// Suggest a fix for well-known failures.
pub fn hint_for(err: &anyhow::Error) -> Option<&'static str> {
    for cause in err.chain() {
        if let Some(ReconcileError::InvalidIntent(_)) = cause.downcast_ref::<ReconcileError>() {
            return Some("Interface names are at most 15 characters; addresses are dotted IPv4.");
        }

        match cause.downcast_ref::<PortError>() {
            Some(PortError::Spawn { .. }) => {
                return Some("Is iproute2 installed? Set HOSTNET_IP_BIN to the `ip` binary.");
            }
            Some(PortError::Command { stderr, .. })
                if stderr.contains("Operation not permitted") =>
            {
                return Some("Run as root, or pass --sudo (HOSTNET_SUDO=1).");
            }
            Some(PortError::Command { stderr, .. }) if stderr.contains("does not exist") => {
                return Some("Run `hostnet up` first to create the interfaces.");
            }
            _ => {}
        }
    }

    None
}
