//! Error types for ports and reconciliation.

use std::fmt;
use std::io;

use thiserror::Error;

/// Errors returned by a [`NetworkPort`](crate::NetworkPort) implementation.
#[derive(Debug, Error)]
pub enum PortError {
    /// Command ran but reported failure.
    #[error("`{command}` failed ({status}): {stderr}")]
    Command {
        command: String,
        status: String,
        stderr: String,
    },

    /// Command could not be started.
    #[error("failed to execute `{command}`")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    /// Reading interface state failed.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Command output could not be understood.
    #[error("unexpected output from `{command}`: {detail}")]
    Parse { command: String, detail: String },

    /// Anything else the adapter wants to report.
    #[error("{0}")]
    Other(String),
}

/// A single query or mutation performed while reconciling.
///
/// Each step carries the message used when its port call fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    CheckTapExists,
    CreateTap,
    CheckBridgeExists,
    CreateBridge,
    GetBridgeIp,
    FlushBridgeIp,
    SetBridgeIp,
    CheckTapInBridge,
    AttachTap,
    CheckBridgeUp,
    BridgeUp,
    CheckTapUp,
    TapUp,
    TapDown,
    ListBridgeMembers,
    CheckMemberUp,
    BridgeDown,
    FlushBridgeIpOnTeardown,
    DeleteTap,
    DeleteBridge,
    Inspect,
}

impl Step {
    /// Human readable failure message for this step.
    pub fn message(&self) -> &'static str {
        match self {
            Step::CheckTapExists => "not able to check tap exists",
            Step::CreateTap => "not able to create tap",
            Step::CheckBridgeExists => "not able to check if bridge exists",
            Step::CreateBridge => "not able to create bridge",
            Step::GetBridgeIp => "not able to get current bridge IP",
            Step::FlushBridgeIp => "not able to flush bridge IPs",
            Step::SetBridgeIp => "not able to assign IP to bridge",
            Step::CheckTapInBridge => "not able to check if tap is in the bridge",
            Step::AttachTap => "not able to add tap to bridge",
            Step::CheckBridgeUp => "not able to check if bridge is up",
            Step::BridgeUp => "not able to turn bridge up",
            Step::CheckTapUp => "not able to check if tap is up",
            Step::TapUp => "not able to turn tap up",
            Step::TapDown => "not able to turn tap down",
            Step::ListBridgeMembers => "not able to get network interfaces in bridge",
            Step::CheckMemberUp => "not able to get interface state",
            Step::BridgeDown => "not able to turn bridge down",
            Step::FlushBridgeIpOnTeardown => "not able to flush IPs from bridge",
            Step::DeleteTap => "not able to delete tap",
            Step::DeleteBridge => "not able to delete bridge",
            Step::Inspect => "not able to inspect interface",
        }
    }

    /// Returns true if the step changes host state.
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Step::CreateTap
                | Step::CreateBridge
                | Step::FlushBridgeIp
                | Step::SetBridgeIp
                | Step::AttachTap
                | Step::BridgeUp
                | Step::TapUp
                | Step::TapDown
                | Step::BridgeDown
                | Step::FlushBridgeIpOnTeardown
                | Step::DeleteTap
                | Step::DeleteBridge
        )
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Reconciliation errors.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// A port call failed; nothing after it was attempted.
    #[error("{step}")]
    Step {
        step: Step,
        #[source]
        source: PortError,
    },

    /// The requested configuration cannot be applied.
    #[error("invalid intent: {0}")]
    InvalidIntent(String),
}

impl ReconcileError {
    /// The step that failed, if a port call failed.
    pub fn step(&self) -> Option<Step> {
        match self {
            ReconcileError::Step { step, .. } => Some(*step),
            ReconcileError::InvalidIntent(_) => None,
        }
    }
}

/// Attach a [`Step`] to a port result.
pub(crate) trait StepExt<T> {
    fn step(self, step: Step) -> Result<T, ReconcileError>;
}

impl<T> StepExt<T> for Result<T, PortError> {
    fn step(self, step: Step) -> Result<T, ReconcileError> {
        self.map_err(|source| ReconcileError::Step { step, source })
    }
}
