//! ClubSync - Main Library
//!
//! ClubSync keeps a club's shared collections (members, events and posts)
//! consistent across concurrently connected clients. Each client renders its
//! own writes immediately, survives restarts with a cached members list, and
//! lets the remote store's live snapshots settle what is true.
//!
//! # Module Structure
//!
//! - **`shared`** - Platform-agnostic types
//!   - Entities, identifiers and collection views
//!   - Record drafts and timestamp parsing
//!   - Error types and configuration
//!
//! - **`client`** - Everything that runs in one client
//!   - Sync Engine (optimistic writes, snapshot reconciliation)
//!   - Members cache, Aggregator, mutators
//!   - Session scope following the auth provider
//!
//! - **`debug`** - Invariant checks and debug-only logging
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use clubsync::client::{ClubSession, MemoryRemote, SessionAuth, UserId};
//!
//! # async fn example() {
//! clubsync::init_tracing();
//!
//! let auth = SessionAuth::new();
//! let session = ClubSession::builder(Arc::new(MemoryRemote::new()), Arc::new(auth.clone())).build();
//! auth.sign_in(UserId::new("u1"));
//!
//! let stats = session.current_stats();
//! println!("{} members, {} upcoming events", stats.total_members, stats.upcoming_events);
//! # }
//! ```
//!
//! # Thread Safety
//!
//! - Engine state lives behind a `std::sync::Mutex` and is never held across
//!   an `.await`
//! - Views and stats are published as `Arc` snapshots through
//!   `tokio::sync::watch`, so readers never see a half-applied change
//!
//! # Error Handling
//!
//! - `Result<T, SyncError>` for rejected calls (unknown entity, engine not
//!   running)
//! - `WriteOutcome` for the asynchronous result of remote writes
//! - Failures are logged and posted to a `NoticeBoard`; none is fatal

/// Shared types and data structures
pub mod shared;

/// Client-side synchronization
pub mod client;

/// Debug utilities
pub mod debug;

/// Install the `tracing` subscriber used by the binaries
///
/// The filter comes from `RUST_LOG`, `info` when unset. Calling this more
/// than once is harmless.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
