//! `hostnet run`: wrap a VM process with network setup and teardown.

use std::process::ExitStatus;

use anyhow::{bail, Context, Result};
use clap::Args;
use tracing::{info, warn};

use crate::output::OutputFormat;

use super::down::DownView;
use super::up::{print_changes, ChangeView};
use super::{CommandContext, NetworkArgs};

/// Bring the network up, run a command, then bring it down.
#[derive(Debug, Args)]
pub struct RunCommand {
    #[command(flatten)]
    network: NetworkArgs,

    /// Delete the interfaces afterwards instead of only deactivating them.
    #[arg(long)]
    delete: bool,

    /// Command to run once the network is ready.
    #[arg(trailing_var_arg = true, required = true, num_args = 1..)]
    command: Vec<String>,
}

impl RunCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let intent = self.network.intent(&ctx.config)?;
        let tap = intent.tap_name().to_string();
        let bridge = intent.bridge_name().map(str::to_string);

        let ready = intent.clone();
        let changes = ctx
            .reconcile(move |r| r.ensure_network_ready(&ready))
            .await
            .context("network setup failed")?;
        if ctx.format == OutputFormat::Table {
            let views: Vec<ChangeView> = changes.iter().map(ChangeView::from).collect();
            print_changes(&views);
        }

        info!(tap = %tap, bridge = ?bridge, command = ?self.command, "Starting command");
        let status = run_child(&self.command).await;

        // Tear down whatever happened to the child.
        let delete = self.delete;
        let outcome = ctx
            .reconcile(move |r| {
                if delete {
                    r.remove_network(&intent)
                } else {
                    r.ensure_network_quiesced(&intent)
                }
            })
            .await
            .context("network teardown failed");

        let status = status?;
        DownView::new(tap, bridge, outcome?, delete).print(ctx.format);

        if !status.success() {
            bail!("`{}` exited with {}", self.command.join(" "), status);
        }
        Ok(())
    }
}

/// Run a child process to completion, killing it on Ctrl-C.
async fn run_child(argv: &[String]) -> Result<ExitStatus> {
    let (program, args) = argv.split_first().context("no command given")?;

    let mut child = tokio::process::Command::new(program)
        .args(args)
        .spawn()
        .with_context(|| format!("failed to start `{}`", program))?;

    tokio::select! {
        status = child.wait() => Ok(status?),
        _ = tokio::signal::ctrl_c() => {
            warn!(program = %program, "Interrupted, stopping command");
            child.kill().await.context("failed to stop command")?;
            Ok(child.wait().await?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_child_reports_exit_status() {
        let ok = run_child(&["true".to_string()]).await.unwrap();
        assert!(ok.success());

        let failed = run_child(&["false".to_string()]).await.unwrap();
        assert!(!failed.success());
    }

    #[tokio::test]
    async fn test_run_child_missing_program() {
        let err = run_child(&["/nonexistent/hostnet-vm".to_string()])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("failed to start"));
    }
}
