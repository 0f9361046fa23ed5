//! Client Module
//!
//! Everything that runs inside one connected client: the per-collection Sync
//! Engines, the members cache, the Aggregator, the mutators, and the session
//! scope tying them to the signed-in user.
//!
//! # Architecture
//!
//! - **`remote`** - Remote store collaborator trait and an in-memory store
//! - **`cache`** - Key-value persistence and the members cache
//! - **`sync`** - Sync Engine: optimistic writes and snapshot reconciliation
//! - **`aggregator`** - Summary statistics across the three collections
//! - **`mutators`** - Attendance, like and bookmark toggles, deletes
//! - **`views`** - Member search and event buckets
//! - **`notifications`** - Notifications about other users' posts
//! - **`notices`** - Dismissible failure notices
//! - **`auth`** - Auth collaborator trait and an in-process provider
//! - **`session`** - Scope owning the engines of one signed-in client
//! - **`config`** - Client configuration (cache location, limits)
//! - **`main`** - Demo entry point (binary)
//!
//! # Module Structure
//!
//! ```text
//! client/
//! ├── mod.rs           - Module exports and documentation
//! ├── main.rs          - Demo entry point
//! ├── config.rs        - Configuration wrapper
//! ├── auth.rs          - Auth collaborator
//! ├── cache.rs         - Local cache
//! ├── remote/          - Remote store collaborator
//! ├── sync/            - Sync Engine
//! ├── aggregator.rs    - Aggregate stats
//! ├── mutators.rs      - Toggles and deletes
//! ├── views.rs         - Derived lists
//! ├── notifications.rs - Post notifications
//! ├── notices.rs       - Notice board
//! └── session.rs       - Session scope
//! ```

pub mod aggregator;
pub mod auth;
pub mod cache;
pub mod config;
pub mod mutators;
pub mod notices;
pub mod notifications;
pub mod remote;
pub mod session;
pub mod sync;
pub mod views;

// Re-export commonly used types
pub use aggregator::{AggregateStats, Aggregator, StatsSources};
pub use auth::{AuthProvider, SessionAuth, UserId};
pub use cache::{FileStore, KeyValueStore, MembersCache, MemoryStore};
pub use config::Config;
pub use notices::{Notice, NoticeBoard, Severity};
pub use notifications::{Inbox, PostNotification};
pub use remote::{FeedEvent, FeedSubscription, MemoryRemote, RemoteStore};
pub use session::ClubSession;
pub use sync::{Completion, EngineState, OptimisticCreate, SyncEngine, WriteOutcome};
pub use views::{filter_members, EventBuckets};
