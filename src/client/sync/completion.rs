//! Completion handles for fire-and-forget writes
//!
//! Every write returns immediately; the remote outcome is delivered through a
//! [`Completion`] the caller may await or simply drop.

use tokio::sync::oneshot;

use crate::shared::SyncError;

/// How a remote write ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome<T> {
    /// The remote store accepted the write
    Applied(T),
    /// The remote store rejected the write; already reported
    Rejected(SyncError),
    /// The engine was stopped before the write resolved; nothing was applied
    Discarded,
}

impl<T> WriteOutcome<T> {
    pub fn is_applied(&self) -> bool {
        matches!(self, WriteOutcome::Applied(_))
    }

    pub fn applied(self) -> Option<T> {
        match self {
            WriteOutcome::Applied(value) => Some(value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&SyncError> {
        match self {
            WriteOutcome::Rejected(error) => Some(error),
            _ => None,
        }
    }
}

/// Pending outcome of a remote write
#[derive(Debug)]
pub struct Completion<T> {
    rx: oneshot::Receiver<WriteOutcome<T>>,
}

impl<T> Completion<T> {
    pub(crate) fn channel() -> (Resolver<T>, Completion<T>) {
        let (tx, rx) = oneshot::channel();
        (Resolver { tx }, Completion { rx })
    }

    /// A completion that has already resolved
    pub(crate) fn ready(outcome: WriteOutcome<T>) -> Completion<T> {
        let (resolver, completion) = Self::channel();
        resolver.resolve(outcome);
        completion
    }

    /// Wait for the remote outcome
    pub async fn wait(self) -> WriteOutcome<T> {
        self.rx.await.unwrap_or(WriteOutcome::Discarded)
    }
}

/// Sending half of a [`Completion`]
#[derive(Debug)]
pub(crate) struct Resolver<T> {
    tx: oneshot::Sender<WriteOutcome<T>>,
}

impl<T> Resolver<T> {
    pub(crate) fn resolve(self, outcome: WriteOutcome<T>) {
        // Nobody listening is fine.
        let _ = self.tx.send(outcome);
    }
}
