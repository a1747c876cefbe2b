//! Host network reconciliation for VM launches.
//!
//! Brings a tap device (and optionally a bridge) into the state a VM needs
//! before it boots, and takes it back down afterwards. Key concepts:
//!
//! - **Port**: the host primitives ([`NetworkPort`]); the reconciler only
//!   talks to the host through it.
//! - **Intent**: the desired tap/bridge/address configuration
//!   ([`ReconciliationIntent`]).
//! - **Reconciler**: query-then-act orchestration over a port
//!   ([`Reconciler`]).
//!
//! # Invariants
//!
//! - Every mutation is gated by a fresh query, so repeating a call with the
//!   same intent issues no further mutations
//! - Steps run in a fixed order and the first failure aborts
//! - Nothing is rolled back; re-running is always safe
//! - A bridge is never brought down while one of its members is up

mod error;
mod intent;
mod port;
mod reconciler;

pub use error::{PortError, ReconcileError, Step};
pub use intent::ReconciliationIntent;
pub use port::NetworkPort;
pub use reconciler::{Change, InterfaceKind, NetworkInterface, QuiesceOutcome, Reconciler};
