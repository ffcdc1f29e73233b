//! Dual-channel watch
//!
//! Polls the UI and the job API for the same job until both agree it succeeded,
//! one of them reports a failure, or a deadline passes.

pub mod poller;
pub mod state;

pub use poller::{DualChannelPoller, PollSettings, WatchOutcome};
pub use state::{Reconciler, WatchState};
