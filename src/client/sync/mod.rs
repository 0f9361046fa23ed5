//! # Sync Engine
//!
//! Keeps one collection's view consistent with the remote store while
//! hiding write latency. Writes are applied to the view immediately and sent
//! to the store in the background; the store's change feed is the authority
//! that eventually replaces local guesses.
//!
//! ## Architecture
//!
//! ```text
//! caller ──apply_optimistic / apply_mutation / delete_local──► EngineInner
//!                                  │                              │ publish
//!                                  ▼                              ▼
//!                           RemoteStore write           watch<Arc<CollectionView>>
//!                                  │                              ▲
//!                      completion task ──generation check┐        │
//!                                                        ▼        │
//!                            feed task ──snapshot──► reconcile ───┘
//! ```
//!
//! Feed events carry the feed epoch, bumped by every start, so a replaced
//! feed task cannot publish. Write completions carry the write generation,
//! bumped only by `stop()`: restarting after a feed failure keeps in-flight
//! writes and their rollbacks, while nothing lands after `stop()`.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use clubsync::client::remote::MemoryRemote;
//! use clubsync::client::sync::SyncEngine;
//! use clubsync::shared::{CollectionKind, Fields};
//!
//! # async fn example() -> Result<(), clubsync::shared::SyncError> {
//! let engine = SyncEngine::builder(CollectionKind::Posts, Arc::new(MemoryRemote::new())).build();
//! engine.start()?;
//!
//! let create = engine.apply_optimistic(Fields::new())?;
//! assert!(engine.current_view().contains(&create.id));
//!
//! let outcome = create.completion.wait().await;
//! println!("{:?}", outcome);
//! engine.stop();
//! # Ok(())
//! # }
//! ```

pub mod completion;
pub mod optimistic;
pub mod reconciliation;
pub mod sync_state;

pub use completion::{Completion, WriteOutcome};
pub use sync_state::EngineState;

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::future::BoxFuture;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::client::cache::MembersCache;
use crate::client::notices::NoticeBoard;
use crate::client::remote::{FeedEvent, FeedSubscription, RemoteStore};
use crate::debug::validate_invariant;
use crate::shared::{
    CollectionKind, CollectionView, Entity, EntityId, Fields, LocalId, RemoteDocument,
    RemoteError, SyncError, WriteOp,
};
use optimistic::{mint_local_id, PendingCreate, PendingSet};
use reconciliation::{has_unique_ids, materialize, reconcile, Tombstones};

/// Handle to an optimistic create
#[derive(Debug)]
pub struct OptimisticCreate {
    /// Local identifier the entity is shown under until confirmed
    pub id: EntityId,
    /// Resolves to the identifier assigned by the remote store
    pub completion: Completion<EntityId>,
}

/// Builder for [`SyncEngine`]
pub struct SyncEngineBuilder {
    kind: CollectionKind,
    remote: Arc<dyn RemoteStore>,
    cache: Option<MembersCache>,
    notices: Option<NoticeBoard>,
    runtime: Option<Handle>,
}

impl SyncEngineBuilder {
    /// Back the view with the local cache (members only)
    pub fn cache(mut self, cache: MembersCache) -> Self {
        if self.kind.is_cached() {
            self.cache = Some(cache);
        } else {
            tracing::warn!("Ignoring cache for '{}', only members are cached", self.kind);
        }
        self
    }

    /// Board that failures are posted to
    pub fn notices(mut self, notices: NoticeBoard) -> Self {
        self.notices = Some(notices);
        self
    }

    /// Runtime background tasks are spawned on
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// # Panics
    ///
    /// Panics if no runtime was given and this is called outside a Tokio
    /// runtime.
    pub fn build(self) -> SyncEngine {
        let runtime = self.runtime.unwrap_or_else(Handle::current);
        let view = Arc::new(CollectionView::empty(self.kind));
        let (view_tx, _) = watch::channel(view.clone());
        let (state_tx, _) = watch::channel(EngineState::Uninitialized);

        SyncEngine {
            shared: Arc::new(EngineShared {
                kind: self.kind,
                remote: self.remote,
                cache: self.cache,
                notices: self.notices.unwrap_or_default(),
                runtime,
                inner: Mutex::new(EngineInner {
                    state: EngineState::Uninitialized,
                    feed_epoch: 0,
                    generation: 0,
                    confirmed: Vec::new(),
                    pending: PendingSet::new(),
                    tombstones: Tombstones::new(),
                    view,
                    feed_task: None,
                }),
                view_tx,
                state_tx,
            }),
        }
    }
}

/// Optimistic synchronization of one collection
///
/// Cloning is cheap; clones share the same engine.
#[derive(Clone)]
pub struct SyncEngine {
    shared: Arc<EngineShared>,
}

impl fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncEngine")
            .field("kind", &self.shared.kind)
            .field("state", &self.state())
            .finish()
    }
}

struct EngineShared {
    kind: CollectionKind,
    remote: Arc<dyn RemoteStore>,
    cache: Option<MembersCache>,
    notices: NoticeBoard,
    runtime: Handle,
    inner: Mutex<EngineInner>,
    view_tx: watch::Sender<Arc<CollectionView>>,
    state_tx: watch::Sender<EngineState>,
}

struct EngineInner {
    state: EngineState,
    /// Bumped on every start and stop; tags feed events
    feed_epoch: u64,
    /// Bumped on stop; tags write completions
    generation: u64,
    /// Entities from the last snapshot (or cache), minus local deletes
    confirmed: Vec<Entity>,
    pending: PendingSet,
    tombstones: Tombstones,
    /// Last published view
    view: Arc<CollectionView>,
    feed_task: Option<JoinHandle<()>>,
}

impl SyncEngine {
    pub fn builder(kind: CollectionKind, remote: Arc<dyn RemoteStore>) -> SyncEngineBuilder {
        SyncEngineBuilder {
            kind,
            remote,
            cache: None,
            notices: None,
            runtime: None,
        }
    }

    pub fn kind(&self) -> CollectionKind {
        self.shared.kind
    }

    pub fn state(&self) -> EngineState {
        self.shared.state_tx.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<EngineState> {
        self.shared.state_tx.subscribe()
    }

    /// Latest published view
    pub fn current_view(&self) -> Arc<CollectionView> {
        self.shared.view_tx.borrow().clone()
    }

    /// Receiver notified on every publish
    pub fn subscribe_view(&self) -> watch::Receiver<Arc<CollectionView>> {
        self.shared.view_tx.subscribe()
    }

    /// Creates not yet confirmed by a snapshot
    pub fn pending_count(&self) -> usize {
        self.shared.lock().pending.count_pending()
    }

    pub fn notices(&self) -> &NoticeBoard {
        &self.shared.notices
    }

    /// Open the change feed
    ///
    /// For the members collection a cached list is published first as a
    /// provisional view. Calling this on a running engine does nothing.
    pub fn start(&self) -> Result<(), SyncError> {
        let shared = &self.shared;
        let kind = shared.kind;
        let mut inner = shared.lock();
        if !inner.state.can_start() {
            tracing::debug!("Sync engine for '{}' already running", kind);
            return Ok(());
        }

        inner.feed_epoch += 1;
        let feed_epoch = inner.feed_epoch;
        if let Some(task) = inner.feed_task.take() {
            task.abort();
        }

        // After a feed failure the engine kept serving and accepting writes;
        // only a fresh start begins from the cache.
        let provisional = if matches!(inner.state, EngineState::Failed(_)) {
            tracing::info!("Resubscribing '{}' after feed failure", kind);
            inner.view.provisional
        } else {
            inner.pending.clear_all();
            inner.tombstones.clear_all();
            let cached = shared.cache.as_ref().map(MembersCache::load).unwrap_or_default();
            let provisional = !cached.is_empty();
            if provisional {
                tracing::info!("Loaded {} cached {} as provisional view", cached.len(), kind);
                inner.confirmed = cached;
            }
            provisional
        };
        let view = materialize(
            kind,
            &inner.confirmed,
            &inner.pending,
            provisional,
            inner.view.revision + 1,
        );
        shared.install(&mut inner, view);

        match shared.remote.subscribe(kind) {
            Ok(feed) => {
                let state = if provisional {
                    EngineState::Subscribed { provisional: true }
                } else {
                    EngineState::Connecting
                };
                shared.set_state(&mut inner, state);
                inner.feed_task = Some(shared.spawn_feed(feed_epoch, feed));
                tracing::info!("Subscribed to '{}'", kind);
                Ok(())
            }
            Err(e) => {
                let error = SyncError::subscription(kind, e.to_string());
                shared.set_state(&mut inner, EngineState::Failed(error.to_string()));
                drop(inner);
                shared.notices.report(&error);
                Err(error)
            }
        }
    }

    /// Close the change feed; in-flight completions are discarded
    pub fn stop(&self) {
        let shared = &self.shared;
        let mut inner = shared.lock();
        if matches!(
            inner.state,
            EngineState::Uninitialized | EngineState::Unsubscribed
        ) {
            return;
        }

        inner.feed_epoch += 1;
        inner.generation += 1;
        if let Some(task) = inner.feed_task.take() {
            task.abort();
        }
        shared.set_state(&mut inner, EngineState::Unsubscribed);
        tracing::info!("Unsubscribed from '{}'", shared.kind);
    }

    /// Show a new entity at once and create it remotely
    ///
    /// Returns the local identifier the entity is rendered under. If the
    /// remote create fails the entity is removed again and the failure is
    /// reported.
    pub fn apply_optimistic(&self, fields: Fields) -> Result<OptimisticCreate, SyncError> {
        let shared = &self.shared;
        let mut inner = shared.lock();
        shared.ensure_running(&inner)?;

        let local_id = mint_local_id();
        inner.pending.apply(PendingCreate::new(local_id, fields.clone()));
        shared.publish(&mut inner);
        let generation = inner.generation;
        drop(inner);

        let request = shared.remote.create(shared.kind, fields);
        let completion = shared.spawn_write(request, move |shared, result| {
            shared.finish_create(generation, local_id, result)
        });
        Ok(OptimisticCreate {
            id: EntityId::Local(local_id),
            completion,
        })
    }

    /// Patch an entity locally and remotely
    ///
    /// `transform` receives the current entity and returns the fields to
    /// overwrite. It runs under the engine lock and must not call back into
    /// the engine.
    pub fn apply_mutation<F>(&self, id: &EntityId, transform: F) -> Result<Completion<()>, SyncError>
    where
        F: FnOnce(&Entity) -> Fields,
    {
        let shared = &self.shared;
        let mut inner = shared.lock();
        shared.ensure_running(&inner)?;

        let (remote_id, patch) = match id {
            EntityId::Remote(remote_id) => {
                let entity = inner
                    .confirmed
                    .iter_mut()
                    .find(|entity| &entity.id == id)
                    .ok_or_else(|| SyncError::UnknownEntity(id.clone()))?;
                let patch = transform(entity);
                entity.fields.extend(patch.clone());
                (remote_id.clone(), patch)
            }
            EntityId::Local(local_id) => {
                let create = inner
                    .pending
                    .get_mut(local_id)
                    .filter(|create| !create.cancelled)
                    .ok_or_else(|| SyncError::UnknownEntity(id.clone()))?;
                let remote_id = create
                    .remote_id
                    .clone()
                    .ok_or_else(|| SyncError::Unconfirmed(id.clone()))?;
                let patch = transform(&create.to_entity());
                create.fields.extend(patch.clone());
                (remote_id, patch)
            }
        };

        if patch.is_empty() {
            return Ok(Completion::ready(WriteOutcome::Applied(())));
        }
        shared.publish(&mut inner);
        let generation = inner.generation;
        drop(inner);

        let request = shared.remote.update(shared.kind, remote_id.clone(), patch);
        Ok(shared.spawn_write(request, move |shared, result| {
            shared.finish_update(generation, &remote_id, result)
        }))
    }

    /// Remove an entity locally and delete it remotely
    ///
    /// A pending entity whose create has not resolved is hidden at once and
    /// deleted remotely as soon as its identifier is known.
    pub fn delete_local(&self, id: &EntityId) -> Result<Completion<()>, SyncError> {
        let shared = &self.shared;
        let mut inner = shared.lock();
        shared.ensure_running(&inner)?;

        let remote_id = match id {
            EntityId::Remote(remote_id) => {
                let index = inner
                    .confirmed
                    .iter()
                    .position(|entity| &entity.id == id)
                    .ok_or_else(|| SyncError::UnknownEntity(id.clone()))?;
                let entity = inner.confirmed.remove(index);
                inner.tombstones.bury(remote_id.clone(), Some((index, entity)));
                remote_id.clone()
            }
            EntityId::Local(local_id) => {
                let resolved = inner
                    .pending
                    .get(local_id)
                    .filter(|create| !create.cancelled)
                    .ok_or_else(|| SyncError::UnknownEntity(id.clone()))?
                    .remote_id
                    .clone();
                match resolved {
                    Some(remote_id) => {
                        inner.pending.take(local_id);
                        inner.tombstones.bury(remote_id.clone(), None);
                        remote_id
                    }
                    None => {
                        inner.pending.cancel(local_id);
                        shared.publish(&mut inner);
                        tracing::debug!("Cancelled pending {} '{}'", shared.kind, id);
                        return Ok(Completion::ready(WriteOutcome::Applied(())));
                    }
                }
            }
        };

        shared.persist(&inner);
        shared.publish(&mut inner);
        let generation = inner.generation;
        drop(inner);

        Ok(shared.issue_delete(generation, remote_id))
    }
}

impl EngineShared {
    fn lock(&self) -> MutexGuard<'_, EngineInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_running(&self, inner: &EngineInner) -> Result<(), SyncError> {
        if inner.state.is_running() {
            Ok(())
        } else {
            Err(SyncError::NotRunning(self.kind))
        }
    }

    /// Whether a feed event delivered under `feed_epoch` may be applied
    fn is_current_feed(inner: &EngineInner, feed_epoch: u64) -> bool {
        inner.feed_epoch == feed_epoch && inner.state.is_running()
    }

    /// Whether a write completion issued under `generation` may be applied
    fn is_current_write(inner: &EngineInner, generation: u64) -> bool {
        inner.generation == generation && inner.state.is_running()
    }

    fn set_state(&self, inner: &mut EngineInner, state: EngineState) {
        inner.state = state.clone();
        self.state_tx.send_replace(state);
    }

    fn install(&self, inner: &mut EngineInner, view: CollectionView) {
        validate_invariant(has_unique_ids(&view), "collection view holds duplicate ids");
        inner.view = Arc::new(view);
        self.view_tx.send_replace(inner.view.clone());
    }

    /// Rebuild the view from local state and publish it
    fn publish(&self, inner: &mut EngineInner) {
        let view = materialize(
            self.kind,
            &inner.confirmed,
            &inner.pending,
            inner.view.provisional,
            inner.view.revision + 1,
        );
        self.install(inner, view);
    }

    fn persist(&self, inner: &EngineInner) {
        if let Some(cache) = &self.cache {
            cache.save(&inner.confirmed);
        }
    }

    fn spawn_feed(self: &Arc<Self>, feed_epoch: u64, mut feed: FeedSubscription) -> JoinHandle<()> {
        let engine = Arc::downgrade(self);
        self.runtime.spawn(async move {
            loop {
                let event = feed.next().await;
                let Some(shared) = engine.upgrade() else {
                    break;
                };
                if !shared.on_feed_event(feed_epoch, event) {
                    break;
                }
            }
        })
    }

    /// Handle one feed delivery; false once the feed is done
    fn on_feed_event(&self, feed_epoch: u64, event: Option<FeedEvent>) -> bool {
        let mut inner = self.lock();
        if !Self::is_current_feed(&inner, feed_epoch) {
            tracing::debug!("Discarding '{}' feed event from a replaced feed", self.kind);
            return false;
        }

        let error = match event {
            Some(FeedEvent::Snapshot(documents)) => {
                self.apply_snapshot(&mut inner, documents);
                return true;
            }
            Some(FeedEvent::Error(e)) => SyncError::subscription(self.kind, e.to_string()),
            None => SyncError::subscription(self.kind, "change feed closed"),
        };
        self.set_state(&mut inner, EngineState::Failed(error.to_string()));
        drop(inner);
        self.notices.report(&error);
        false
    }

    fn apply_snapshot(&self, inner: &mut EngineInner, snapshot: Vec<RemoteDocument>) {
        let delivered = snapshot.len();
        let outcome = reconcile(&inner.view, snapshot, &inner.pending, &inner.tombstones);
        for local_id in &outcome.superseded {
            inner.pending.confirm(local_id);
        }
        inner.tombstones.clear(&outcome.cleared_tombstones);
        inner.confirmed = outcome.confirmed;

        self.persist(inner);
        self.install(inner, outcome.view);
        if inner.state != (EngineState::Subscribed { provisional: false }) {
            self.set_state(inner, EngineState::Subscribed { provisional: false });
        }
        crate::debug_log!(
            "Reconciled '{}' snapshot: {} documents, {} pending",
            self.kind,
            delivered,
            inner.pending.count_pending()
        );
    }

    /// Await a remote write in the background and resolve its completion
    fn spawn_write<R, T, F>(
        self: &Arc<Self>,
        request: BoxFuture<'static, Result<R, RemoteError>>,
        finish: F,
    ) -> Completion<T>
    where
        R: Send + 'static,
        T: Send + 'static,
        F: FnOnce(&Arc<EngineShared>, Result<R, RemoteError>) -> WriteOutcome<T> + Send + 'static,
    {
        let (resolver, completion) = Completion::channel();
        let engine = Arc::downgrade(self);
        self.runtime.spawn(async move {
            let result = request.await;
            let outcome = match engine.upgrade() {
                Some(shared) => finish(&shared, result),
                None => WriteOutcome::Discarded,
            };
            resolver.resolve(outcome);
        });
        completion
    }

    fn issue_delete(self: &Arc<Self>, generation: u64, remote_id: String) -> Completion<()> {
        let request = self.remote.delete(self.kind, remote_id.clone());
        self.spawn_write(request, move |shared, result| {
            shared.finish_delete(generation, &remote_id, result)
        })
    }

    fn finish_create(
        self: &Arc<Self>,
        generation: u64,
        local_id: LocalId,
        result: Result<String, RemoteError>,
    ) -> WriteOutcome<EntityId> {
        let mut inner = self.lock();
        if !Self::is_current_write(&inner, generation) {
            tracing::debug!("Discarding '{}' create completion after stop", self.kind);
            return WriteOutcome::Discarded;
        }

        let remote_id = match result {
            Ok(remote_id) => remote_id,
            Err(e) => {
                if inner.pending.rollback(&local_id).is_some() {
                    self.publish(&mut inner);
                }
                let error = SyncError::write(WriteOp::Create, self.kind, e.to_string());
                drop(inner);
                self.notices.report(&error);
                return WriteOutcome::Rejected(error);
            }
        };

        let cancelled = inner
            .pending
            .get(&local_id)
            .map_or(false, |create| create.cancelled);
        if cancelled {
            inner.pending.take(&local_id);
            inner.tombstones.bury(remote_id.clone(), None);
            // The snapshot carrying the new document may have landed first.
            let before = inner.confirmed.len();
            inner
                .confirmed
                .retain(|entity| entity.id.as_remote() != Some(remote_id.as_str()));
            if inner.confirmed.len() != before {
                self.persist(&inner);
                self.publish(&mut inner);
            }
            drop(inner);
            tracing::debug!(
                "Cancelled '{}' create resolved as '{}', deleting",
                self.kind,
                remote_id
            );
            // Failures of this delete are reported through the notice board.
            let _ = self.issue_delete(generation, remote_id.clone());
        } else if inner
            .confirmed
            .iter()
            .any(|entity| entity.id.as_remote() == Some(remote_id.as_str()))
        {
            inner.pending.confirm(&local_id);
            self.publish(&mut inner);
        } else {
            inner.pending.resolve(&local_id, remote_id.clone());
        }

        WriteOutcome::Applied(EntityId::Remote(remote_id))
    }

    fn finish_update(
        &self,
        generation: u64,
        remote_id: &str,
        result: Result<(), RemoteError>,
    ) -> WriteOutcome<()> {
        let mut inner = self.lock();
        if !Self::is_current_write(&inner, generation) {
            tracing::debug!("Discarding '{}' update completion after stop", self.kind);
            return WriteOutcome::Discarded;
        }

        match result {
            Ok(()) => WriteOutcome::Applied(()),
            Err(e) => {
                self.restore_from_cache(&mut inner, remote_id);
                let error = SyncError::write(WriteOp::Update, self.kind, e.to_string());
                drop(inner);
                self.notices.report(&error);
                WriteOutcome::Rejected(error)
            }
        }
    }

    fn finish_delete(
        &self,
        generation: u64,
        remote_id: &str,
        result: Result<(), RemoteError>,
    ) -> WriteOutcome<()> {
        let mut inner = self.lock();
        if !Self::is_current_write(&inner, generation) {
            tracing::debug!("Discarding '{}' delete completion after stop", self.kind);
            return WriteOutcome::Discarded;
        }

        match result {
            Ok(()) | Err(RemoteError::NotFound(_)) => {
                inner.tombstones.settle(remote_id);
                WriteOutcome::Applied(())
            }
            Err(e) => {
                let tombstone = inner.tombstones.exhume(remote_id);
                if self.cache.is_some() {
                    if let Some((index, entity)) = tombstone.and_then(|t| t.restore) {
                        if !inner.confirmed.iter().any(|c| c.id == entity.id) {
                            let index = index.min(inner.confirmed.len());
                            inner.confirmed.insert(index, entity);
                            self.persist(&inner);
                            self.publish(&mut inner);
                        }
                    }
                }
                let error = SyncError::write(WriteOp::Delete, self.kind, e.to_string());
                drop(inner);
                self.notices.report(&error);
                WriteOutcome::Rejected(error)
            }
        }
    }

    /// Put the cached copy of a member back after a rejected update
    fn restore_from_cache(&self, inner: &mut EngineInner, remote_id: &str) {
        let Some(cache) = &self.cache else {
            return;
        };
        let Some(cached) = cache
            .load()
            .into_iter()
            .find(|entity| entity.id.as_remote() == Some(remote_id))
        else {
            return;
        };
        if let Some(slot) = inner.confirmed.iter_mut().find(|entity| entity.id == cached.id) {
            *slot = cached;
            self.publish(inner);
            tracing::info!("Restored '{}' from the members cache", remote_id);
        }
    }
}

impl Drop for EngineShared {
    fn drop(&mut self) {
        let inner = self.inner.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(task) = inner.feed_task.take() {
            task.abort();
        }
    }
}
