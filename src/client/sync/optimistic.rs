//! # Optimistic Creates
//!
//! Tracks entities that exist only locally while their create is in flight.
//!
//! ## Features
//!
//! - **Immediate Visibility**: a pending create is shown in the view at once
//! - **Rollback Support**: a rejected create is removed again
//! - **Confirmation**: a pending entry is dropped once a snapshot carries its
//!   remote identifier
//! - **Cancellation**: deleting a pending entity before its create resolves
//!   hides it and schedules the remote delete
//!
//! ## Usage
//!
//! ```rust,ignore
//! let mut pending = PendingSet::new();
//! let local_id = mint_local_id();
//! pending.apply(PendingCreate::new(local_id, fields));
//!
//! // create resolved with the store's identifier
//! pending.resolve(&local_id, "abc123".into());
//!
//! // a snapshot listed "abc123"
//! pending.confirm(&local_id);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};

use crate::shared::{Entity, Fields, LocalId};

static NEXT_LOCAL_ID: AtomicU64 = AtomicU64::new(1);

/// Mint a local identifier, unique for the life of the process
pub fn mint_local_id() -> LocalId {
    LocalId::new(NEXT_LOCAL_ID.fetch_add(1, Ordering::Relaxed))
}

/// A create that has not been confirmed by a snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct PendingCreate {
    /// Placeholder identifier shown in the view
    pub local_id: LocalId,
    /// Fields as sent to the remote store
    pub fields: Fields,
    /// Identifier assigned by the store, once the create resolved
    pub remote_id: Option<String>,
    /// Deleted locally before the create resolved
    pub cancelled: bool,
    /// When the create was issued
    pub applied_at: DateTime<Utc>,
}

impl PendingCreate {
    pub fn new(local_id: LocalId, fields: Fields) -> Self {
        Self {
            local_id,
            fields,
            remote_id: None,
            cancelled: false,
            applied_at: Utc::now(),
        }
    }

    /// The entity rendered for this create
    pub fn to_entity(&self) -> Entity {
        Entity::pending(self.local_id, self.fields.clone())
    }
}

/// Pending creates of one collection, in the order they were issued
#[derive(Debug, Default)]
pub struct PendingSet {
    creates: Vec<PendingCreate>,
}

impl PendingSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a new pending create
    pub fn apply(&mut self, create: PendingCreate) {
        tracing::debug!("Applied optimistic create {}", create.local_id.get());
        self.creates.push(create);
    }

    pub fn get(&self, local_id: &LocalId) -> Option<&PendingCreate> {
        self.creates.iter().find(|c| &c.local_id == local_id)
    }

    pub fn get_mut(&mut self, local_id: &LocalId) -> Option<&mut PendingCreate> {
        self.creates.iter_mut().find(|c| &c.local_id == local_id)
    }

    /// Record the identifier the store assigned
    pub fn resolve(&mut self, local_id: &LocalId, remote_id: String) -> bool {
        match self.get_mut(local_id) {
            Some(create) => {
                create.remote_id = Some(remote_id);
                true
            }
            None => false,
        }
    }

    /// Hide a pending create; it stays tracked until its create resolves
    pub fn cancel(&mut self, local_id: &LocalId) -> bool {
        match self.get_mut(local_id) {
            Some(create) => {
                create.cancelled = true;
                true
            }
            None => false,
        }
    }

    /// Drop a pending create that a snapshot now carries
    pub fn confirm(&mut self, local_id: &LocalId) -> Option<PendingCreate> {
        self.take(local_id)
    }

    /// Drop a pending create whose remote create failed
    pub fn rollback(&mut self, local_id: &LocalId) -> Option<PendingCreate> {
        let removed = self.take(local_id);
        if removed.is_some() {
            tracing::debug!("Rolled back optimistic create {}", local_id.get());
        }
        removed
    }

    /// Stop tracking a pending create
    pub fn take(&mut self, local_id: &LocalId) -> Option<PendingCreate> {
        let index = self.creates.iter().position(|c| &c.local_id == local_id)?;
        Some(self.creates.remove(index))
    }

    /// Pending creates that should be rendered
    pub fn visible(&self) -> impl Iterator<Item = &PendingCreate> {
        self.creates.iter().filter(|c| !c.cancelled)
    }

    /// Number of tracked creates, cancelled ones included
    pub fn count_pending(&self) -> usize {
        self.creates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.creates.is_empty()
    }

    pub fn clear_all(&mut self) {
        self.creates.clear();
    }
}
