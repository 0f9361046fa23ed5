//! Shared Error Types
//!
//! This module defines the error taxonomy of the synchronization core.
//!
//! # Error Categories
//!
//! - `SyncError` - failures surfaced by a Sync Engine to its caller
//! - `RemoteError` - failures reported by the remote store collaborator
//! - `CacheError` - local persistence failures (never escapes the members cache)
//!
//! # Usage
//!
//! ```rust
//! use clubsync::shared::error::{SyncError, WriteOp};
//! use clubsync::shared::CollectionKind;
//!
//! let error = SyncError::write(WriteOp::Delete, CollectionKind::Members, "permission denied");
//! assert!(error.to_string().contains("delete"));
//! ```
//!
//! # Thread Safety
//!
//! All error types are `Send + Sync` and `Clone`, so a single failure can be
//! handed to the caller, the notice board and the log at the same time.
use thiserror::Error;

use crate::shared::entity::{CollectionKind, EntityId};

/// Remote write operations, used to label write failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteOp {
    Create,
    Update,
    Delete,
}

impl WriteOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteOp::Create => "create",
            WriteOp::Update => "update",
            WriteOp::Delete => "delete",
        }
    }
}

impl std::fmt::Display for WriteOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors surfaced by a Sync Engine
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// The change feed could not be opened or was interrupted
    #[error("Subscription error on '{collection}': {message}")]
    Subscription {
        /// Collection whose feed failed
        collection: CollectionKind,
        /// Human-readable error message
        message: String,
    },

    /// A create, update or delete was rejected by the remote store
    #[error("Write error ({op}) on '{collection}': {message}")]
    Write {
        /// Which write failed
        op: WriteOp,
        /// Collection the write targeted
        collection: CollectionKind,
        /// Human-readable error message
        message: String,
    },

    /// No entity with this identifier is in the current view
    #[error("Unknown entity '{0}'")]
    UnknownEntity(EntityId),

    /// The entity is still pending and has no remote identifier yet
    #[error("Entity '{0}' is not confirmed yet")]
    Unconfirmed(EntityId),

    /// The engine was never started or has been stopped
    #[error("Sync engine for '{0}' is not running")]
    NotRunning(CollectionKind),
}

impl SyncError {
    /// Create a new subscription error
    pub fn subscription(collection: CollectionKind, message: impl Into<String>) -> Self {
        Self::Subscription {
            collection,
            message: message.into(),
        }
    }

    /// Create a new write error
    pub fn write(op: WriteOp, collection: CollectionKind, message: impl Into<String>) -> Self {
        Self::Write {
            op,
            collection,
            message: message.into(),
        }
    }

    pub fn is_write(&self) -> bool {
        matches!(self, Self::Write { .. })
    }
}

/// Errors reported by the remote store collaborator
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// The store could not be reached
    #[error("remote store unavailable: {0}")]
    Unavailable(String),

    /// The store refused the request
    #[error("request rejected: {0}")]
    Rejected(String),

    /// The target document does not exist
    #[error("document '{0}' not found")]
    NotFound(String),
}

/// Local persistence failures
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache payload error: {0}")]
    Serialization(#[from] serde_json::Error),
}
