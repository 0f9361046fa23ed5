//! In-process remote store
//!
//! Behaves like the document database as far as the engines can observe:
//! identifiers are assigned on create, and every successful write pushes a
//! fresh snapshot to each subscriber of the collection. The extra knobs
//! (pausing writes, scripted failures, stale snapshots) exist so latency and
//! failure paths can be driven deterministically.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::future::BoxFuture;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use super::{FeedEvent, FeedSubscription, RemoteStore};
use crate::shared::{CollectionKind, Fields, RemoteDocument, RemoteError, WriteOp};

#[derive(Debug)]
struct StoreState {
    collections: HashMap<CollectionKind, Vec<RemoteDocument>>,
    subscribers: HashMap<CollectionKind, Vec<mpsc::UnboundedSender<FeedEvent>>>,
    failures: HashMap<WriteOp, RemoteError>,
    subscribe_failure: Option<RemoteError>,
    auto_publish: bool,
}

impl StoreState {
    fn publish(&mut self, collection: CollectionKind) {
        let documents = self.collections.get(&collection).cloned().unwrap_or_default();
        self.send(collection, FeedEvent::Snapshot(documents));
    }

    fn send(&mut self, collection: CollectionKind, event: FeedEvent) {
        if let Some(subscribers) = self.subscribers.get_mut(&collection) {
            subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        }
    }
}

/// Remote store kept in memory
#[derive(Debug, Clone)]
pub struct MemoryRemote {
    state: Arc<Mutex<StoreState>>,
    writes_open: Arc<watch::Sender<bool>>,
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRemote {
    pub fn new() -> Self {
        let (writes_open, _) = watch::channel(true);
        Self {
            state: Arc::new(Mutex::new(StoreState {
                collections: HashMap::new(),
                subscribers: HashMap::new(),
                failures: HashMap::new(),
                subscribe_failure: None,
                auto_publish: true,
            })),
            writes_open: Arc::new(writes_open),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a document as another client would, returning its id
    pub fn insert(&self, collection: CollectionKind, fields: Fields) -> String {
        let id = new_document_id();
        let mut state = self.lock();
        state
            .collections
            .entry(collection)
            .or_default()
            .push(RemoteDocument::new(id.clone(), fields));
        if state.auto_publish {
            state.publish(collection);
        }
        id
    }

    /// Current contents of a collection
    pub fn documents(&self, collection: CollectionKind) -> Vec<RemoteDocument> {
        self.lock()
            .collections
            .get(&collection)
            .cloned()
            .unwrap_or_default()
    }

    /// Whether writes publish snapshots (and subscribing delivers an initial one)
    pub fn set_auto_publish(&self, enabled: bool) {
        self.lock().auto_publish = enabled;
    }

    /// Push the current contents of a collection to its subscribers
    pub fn publish(&self, collection: CollectionKind) {
        self.lock().publish(collection);
    }

    /// Push an arbitrary snapshot, e.g. a stale one
    pub fn push_snapshot(&self, collection: CollectionKind, documents: Vec<RemoteDocument>) {
        self.lock().send(collection, FeedEvent::Snapshot(documents));
    }

    /// Report a feed interruption to the subscribers of a collection
    pub fn push_error(&self, collection: CollectionKind, error: RemoteError) {
        self.lock().send(collection, FeedEvent::Error(error));
    }

    /// Hold every write until [`MemoryRemote::resume_writes`]
    pub fn pause_writes(&self) {
        self.writes_open.send_replace(false);
    }

    pub fn resume_writes(&self) {
        self.writes_open.send_replace(true);
    }

    /// Make the next write of this kind fail with `error`
    pub fn fail_next(&self, op: WriteOp, error: RemoteError) {
        self.lock().failures.insert(op, error);
    }

    /// Make the next subscribe call fail with `error`
    pub fn fail_next_subscribe(&self, error: RemoteError) {
        self.lock().subscribe_failure = Some(error);
    }

    /// Number of live feeds on a collection
    pub fn subscriber_count(&self, collection: CollectionKind) -> usize {
        let mut state = self.lock();
        match state.subscribers.get_mut(&collection) {
            Some(subscribers) => {
                subscribers.retain(|tx| !tx.is_closed());
                subscribers.len()
            }
            None => 0,
        }
    }

    async fn wait_until_open(&self) {
        let mut open = self.writes_open.subscribe();
        // The sender lives as long as `self`, so this cannot error.
        let _ = open.wait_for(|open| *open).await;
    }

    fn take_failure(&self, op: WriteOp) -> Option<RemoteError> {
        self.lock().failures.remove(&op)
    }
}

fn new_document_id() -> String {
    Uuid::new_v4().simple().to_string()
}

impl RemoteStore for MemoryRemote {
    fn subscribe(&self, collection: CollectionKind) -> Result<FeedSubscription, RemoteError> {
        let mut state = self.lock();
        if let Some(error) = state.subscribe_failure.take() {
            return Err(error);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        if state.auto_publish {
            let documents = state.collections.get(&collection).cloned().unwrap_or_default();
            let _ = tx.send(FeedEvent::Snapshot(documents));
        }
        state.subscribers.entry(collection).or_default().push(tx);
        tracing::debug!("Opened feed on '{}'", collection);
        Ok(FeedSubscription::new(rx))
    }

    fn create(
        &self,
        collection: CollectionKind,
        fields: Fields,
    ) -> BoxFuture<'static, Result<String, RemoteError>> {
        let store = self.clone();
        Box::pin(async move {
            store.wait_until_open().await;
            if let Some(error) = store.take_failure(WriteOp::Create) {
                return Err(error);
            }
            Ok(store.insert(collection, fields))
        })
    }

    fn update(
        &self,
        collection: CollectionKind,
        id: String,
        patch: Fields,
    ) -> BoxFuture<'static, Result<(), RemoteError>> {
        let store = self.clone();
        Box::pin(async move {
            store.wait_until_open().await;
            if let Some(error) = store.take_failure(WriteOp::Update) {
                return Err(error);
            }

            let mut state = store.lock();
            let document = state
                .collections
                .get_mut(&collection)
                .and_then(|documents| documents.iter_mut().find(|doc| doc.id == id))
                .ok_or_else(|| RemoteError::NotFound(id.clone()))?;
            document.fields.extend(patch);
            if state.auto_publish {
                state.publish(collection);
            }
            Ok(())
        })
    }

    fn delete(
        &self,
        collection: CollectionKind,
        id: String,
    ) -> BoxFuture<'static, Result<(), RemoteError>> {
        let store = self.clone();
        Box::pin(async move {
            store.wait_until_open().await;
            if let Some(error) = store.take_failure(WriteOp::Delete) {
                return Err(error);
            }

            let mut state = store.lock();
            let documents = state.collections.entry(collection).or_default();
            let before = documents.len();
            documents.retain(|doc| doc.id != id);
            if documents.len() == before {
                return Err(RemoteError::NotFound(id));
            }
            if state.auto_publish {
                state.publish(collection);
            }
            Ok(())
        })
    }
}
