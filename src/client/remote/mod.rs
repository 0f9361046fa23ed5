//! # Remote Store Collaborator
//!
//! The document database the collections live in. It is consumed, not
//! implemented, by the synchronization core: a per-collection change feed plus
//! per-document create, update and delete.
//!
//! Writes return boxed futures so the store can be shared as
//! `Arc<dyn RemoteStore>` between engines. A feed is a channel of
//! [`FeedEvent`]s; dropping the [`FeedSubscription`] unsubscribes.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use clubsync::client::remote::{FeedEvent, MemoryRemote, RemoteStore};
//! use clubsync::shared::CollectionKind;
//!
//! # async fn example() {
//! let store = MemoryRemote::new();
//! let mut feed = store.subscribe(CollectionKind::Posts).unwrap();
//! while let Some(FeedEvent::Snapshot(documents)) = feed.next().await {
//!     println!("{} posts", documents.len());
//! }
//! # }
//! ```

pub mod memory;

pub use memory::MemoryRemote;

use futures_util::future::BoxFuture;
use tokio::sync::mpsc;

use crate::shared::{CollectionKind, Fields, RemoteDocument, RemoteError};

/// One delivery on a collection's change feed
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    /// Full, ordered contents of the collection
    Snapshot(Vec<RemoteDocument>),
    /// The feed was interrupted
    Error(RemoteError),
}

/// Live change feed of one collection
#[derive(Debug)]
pub struct FeedSubscription {
    events: mpsc::UnboundedReceiver<FeedEvent>,
}

impl FeedSubscription {
    pub fn new(events: mpsc::UnboundedReceiver<FeedEvent>) -> Self {
        Self { events }
    }

    /// Next delivery, `None` once the store closed the feed
    pub async fn next(&mut self) -> Option<FeedEvent> {
        self.events.recv().await
    }
}

/// Remote document store
pub trait RemoteStore: Send + Sync + 'static {
    /// Open the change feed of a collection
    fn subscribe(&self, collection: CollectionKind) -> Result<FeedSubscription, RemoteError>;

    /// Create a document, resolving to the identifier the store assigned
    fn create(
        &self,
        collection: CollectionKind,
        fields: Fields,
    ) -> BoxFuture<'static, Result<String, RemoteError>>;

    /// Overwrite the given fields of a document
    fn update(
        &self,
        collection: CollectionKind,
        id: String,
        patch: Fields,
    ) -> BoxFuture<'static, Result<(), RemoteError>>;

    /// Delete a document
    fn delete(
        &self,
        collection: CollectionKind,
        id: String,
    ) -> BoxFuture<'static, Result<(), RemoteError>>;
}
