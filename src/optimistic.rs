//! Optimistic update helper
//!
//! A local mutation is applied synchronously, the remote call runs in the
//! background, and the local mutation is either confirmed or compensated
//! once the remote call settles. Sends and reactions both go through here.

use crate::Result;
use std::future::Future;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// How an optimistic command settled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The remote call succeeded and the local change stands
    Committed,
    /// The remote call failed and the local change was compensated
    Compensated,
}

/// A local mutation backed by a remote call
pub trait OptimisticCommand: Send + Sync + 'static {
    /// Value returned by the remote call
    type Output: Send + 'static;

    /// Short label used in log lines
    fn label(&self) -> &'static str;

    /// Apply the local change; returning false skips the command entirely
    fn apply(&self) -> bool;

    /// Perform the remote call
    fn commit(&self) -> impl Future<Output = Result<Self::Output>> + Send;

    /// Whether a successful remote result actually means success
    fn accepts(&self, _output: &Self::Output) -> bool {
        true
    }

    /// Finalize the local change with the remote result
    fn confirm(&self, _output: Self::Output) {}

    /// Undo (or mark) the local change after a failed remote call
    fn compensate(&self);
}

/// Apply the command now and settle it in the background
///
/// Returns `None` when `apply` declined, in which case no remote call is made.
pub fn start<C: OptimisticCommand>(command: C) -> Option<JoinHandle<CommitOutcome>> {
    if !command.apply() {
        debug!("{}: nothing to apply", command.label());
        return None;
    }
    Some(tokio::spawn(async move { settle(&command).await }))
}

async fn settle<C: OptimisticCommand>(command: &C) -> CommitOutcome {
    match command.commit().await {
        Ok(output) if command.accepts(&output) => {
            command.confirm(output);
            CommitOutcome::Committed
        }
        Ok(_) => {
            warn!("{} rejected by server, rolling back", command.label());
            command.compensate();
            CommitOutcome::Compensated
        }
        Err(e) => {
            warn!("{} failed: {}", command.label(), e);
            command.compensate();
            CommitOutcome::Compensated
        }
    }
}
