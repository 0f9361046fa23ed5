//! # Snapshot Reconciliation
//!
//! Merges an authoritative remote snapshot with the locally pending state of
//! a collection. Everything here is pure: the engine owns the state and
//! applies the returned [`Reconciliation`].
//!
//! ## Rules
//!
//! - Snapshot entities replace confirmed ones wholesale; fields are never
//!   merged with local edits.
//! - A pending create whose remote identifier appears in the snapshot is
//!   superseded and disappears in the same publish.
//! - Pending creates still unconfirmed are kept.
//! - Identifiers with a live delete tombstone are filtered out, so a stale
//!   snapshot cannot resurrect a deleted entity.
//! - The result is ordered by the collection's [`SortOrder`].
//!
//! ## Usage
//!
//! ```rust,ignore
//! let outcome = reconcile(&previous_view, snapshot, &pending, &tombstones);
//! for local_id in &outcome.superseded {
//!     pending.confirm(local_id);
//! }
//! tombstones.clear(&outcome.cleared_tombstones);
//! ```

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use super::optimistic::PendingSet;
use crate::shared::{
    CollectionKind, CollectionView, Entity, EntityId, LocalId, RemoteDocument, SortOrder,
};

/// Record of a local delete
#[derive(Debug, Clone, PartialEq)]
pub struct Tombstone {
    /// Entity and its index in the confirmed list, for restoring on failure
    pub restore: Option<(usize, Entity)>,
    /// The remote delete succeeded
    pub settled: bool,
}

/// Deletes that snapshots must not undo
#[derive(Debug, Default)]
pub struct Tombstones {
    entries: HashMap<String, Tombstone>,
}

impl Tombstones {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a delete that has been applied locally
    pub fn bury(&mut self, remote_id: impl Into<String>, restore: Option<(usize, Entity)>) {
        self.entries.insert(
            remote_id.into(),
            Tombstone {
                restore,
                settled: false,
            },
        );
    }

    /// Mark the remote delete as done
    pub fn settle(&mut self, remote_id: &str) {
        if let Some(tombstone) = self.entries.get_mut(remote_id) {
            tombstone.settled = true;
        }
    }

    /// Remove a tombstone, handing back what it held
    pub fn exhume(&mut self, remote_id: &str) -> Option<Tombstone> {
        self.entries.remove(remote_id)
    }

    pub fn contains(&self, remote_id: &str) -> bool {
        self.entries.contains_key(remote_id)
    }

    pub fn clear(&mut self, remote_ids: &[String]) {
        for id in remote_ids {
            self.entries.remove(id);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear_all(&mut self) {
        self.entries.clear();
    }
}

/// Result of reconciling one snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    /// The view to publish
    pub view: CollectionView,
    /// Confirmed entities in feed order, tombstoned ones removed
    pub confirmed: Vec<Entity>,
    /// Pending creates the snapshot now carries
    pub superseded: Vec<LocalId>,
    /// Settled tombstones the store has stopped reporting
    pub cleared_tombstones: Vec<String>,
}

/// Merge `snapshot` into the previous view of a collection
pub fn reconcile(
    previous: &CollectionView,
    snapshot: Vec<RemoteDocument>,
    pending: &PendingSet,
    tombstones: &Tombstones,
) -> Reconciliation {
    let kind = previous.kind;
    let snapshot_ids: HashSet<String> = snapshot.iter().map(|doc| doc.id.clone()).collect();

    let mut seen = HashSet::new();
    let mut confirmed = Vec::with_capacity(snapshot.len());
    for document in snapshot {
        if tombstones.contains(&document.id) {
            crate::debug_trace!("Filtered deleted '{}' from {} snapshot", document.id, kind);
            continue;
        }
        if !seen.insert(document.id.clone()) {
            tracing::warn!("Duplicate '{}' in {} snapshot, keeping first", document.id, kind);
            continue;
        }
        confirmed.push(Entity::from(document));
    }

    let mut superseded = Vec::new();
    let mut survivors = Vec::new();
    for create in pending.visible() {
        match &create.remote_id {
            Some(remote_id) if snapshot_ids.contains(remote_id) => {
                superseded.push(create.local_id);
            }
            _ => survivors.push(create.to_entity()),
        }
    }

    let cleared_tombstones = tombstones
        .entries
        .iter()
        .filter(|(id, tombstone)| tombstone.settled && !snapshot_ids.contains(*id))
        .map(|(id, _)| id.clone())
        .collect();

    let entities = confirmed.iter().cloned().chain(survivors).collect();
    let view = CollectionView {
        kind,
        entities: order_entities(kind, entities),
        provisional: false,
        revision: previous.revision + 1,
    };

    Reconciliation {
        view,
        confirmed,
        superseded,
        cleared_tombstones,
    }
}

/// Build a view from confirmed entities plus the visible pending creates
pub fn materialize(
    kind: CollectionKind,
    confirmed: &[Entity],
    pending: &PendingSet,
    provisional: bool,
    revision: u64,
) -> CollectionView {
    let entities = confirmed
        .iter()
        .cloned()
        .chain(pending.visible().map(|create| create.to_entity()))
        .collect();
    CollectionView {
        kind,
        entities: order_entities(kind, entities),
        provisional,
        revision,
    }
}

/// Order entities for a collection; the sort is stable
pub fn order_entities(kind: CollectionKind, entities: Vec<Entity>) -> Vec<Entity> {
    let (field, descending) = match kind.sort_order() {
        SortOrder::Insertion => return entities,
        SortOrder::Ascending(field) => (field, false),
        SortOrder::Descending(field) => (field, true),
    };

    let mut keyed: Vec<(Option<DateTime<Utc>>, Entity)> = entities
        .into_iter()
        .map(|entity| (entity.timestamp(field), entity))
        .collect();
    keyed.sort_by(|(a, _), (b, _)| compare_dated(*a, *b, descending));
    keyed.into_iter().map(|(_, entity)| entity).collect()
}

/// Dated before undated, then by time in the requested direction
fn compare_dated(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>, descending: bool) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) if descending => b.cmp(&a),
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Whether every identifier in the view is distinct
pub fn has_unique_ids(view: &CollectionView) -> bool {
    let mut seen: HashSet<&EntityId> = HashSet::with_capacity(view.len());
    view.iter().all(|entity| seen.insert(&entity.id))
}
