//! # Club Session
//!
//! Scope owning the three Sync Engines and the Aggregator of one signed-in
//! client. The engines follow the auth provider: they start when a user signs
//! in and stop when the user signs out. Dropping the session stops them on
//! every exit path.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use clubsync::client::auth::{SessionAuth, UserId};
//! use clubsync::client::remote::MemoryRemote;
//! use clubsync::client::session::ClubSession;
//!
//! # async fn example() {
//! let auth = SessionAuth::new();
//! let session = ClubSession::builder(Arc::new(MemoryRemote::new()), Arc::new(auth.clone())).build();
//!
//! auth.sign_in(UserId::new("u1"));
//! // ... engines are now running
//! drop(session); // every engine stopped
//! # }
//! ```

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::client::aggregator::{AggregateStats, Aggregator, StatsSources};
use crate::client::auth::{AuthProvider, UserId};
use crate::client::cache::MembersCache;
use crate::client::config::Config;
use crate::client::notices::NoticeBoard;
use crate::client::remote::RemoteStore;
use crate::client::sync::SyncEngine;
use crate::shared::config::DEFAULT_RECENT_POSTS_LIMIT;
use crate::shared::CollectionKind;

/// The engines of one session
#[derive(Debug, Clone)]
struct Engines {
    members: SyncEngine,
    events: SyncEngine,
    posts: SyncEngine,
}

impl Engines {
    fn all(&self) -> [&SyncEngine; 3] {
        [&self.members, &self.events, &self.posts]
    }

    fn follow(&self, user: Option<&UserId>) {
        match user {
            Some(user) => {
                tracing::info!("Starting sync for {}", user);
                for engine in self.all() {
                    // Failures are already on the notice board.
                    if let Err(e) = engine.start() {
                        tracing::debug!("Start of '{}' failed: {}", engine.kind(), e);
                    }
                }
            }
            None => self.stop(),
        }
    }

    fn stop(&self) {
        for engine in self.all() {
            engine.stop();
        }
    }
}

/// Builder for [`ClubSession`]
pub struct ClubSessionBuilder {
    remote: Arc<dyn RemoteStore>,
    auth: Arc<dyn AuthProvider>,
    cache: Option<MembersCache>,
    notices: NoticeBoard,
    recent_posts_limit: usize,
}

impl ClubSessionBuilder {
    /// Take the cache and limits from a client configuration
    pub fn config(mut self, config: &Config) -> Self {
        self.cache = Some(config.members_cache());
        self.recent_posts_limit = config.recent_posts_limit();
        self
    }

    pub fn cache(mut self, cache: MembersCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn notices(mut self, notices: NoticeBoard) -> Self {
        self.notices = notices;
        self
    }

    pub fn recent_posts_limit(mut self, limit: usize) -> Self {
        self.recent_posts_limit = limit;
        self
    }

    /// Build the session and apply the current auth state
    ///
    /// Must be called within a Tokio runtime.
    pub fn build(self) -> ClubSession {
        let engine = |kind| {
            SyncEngine::builder(kind, self.remote.clone()).notices(self.notices.clone())
        };
        let mut members = engine(CollectionKind::Members);
        if let Some(cache) = self.cache {
            members = members.cache(cache);
        }
        let engines = Engines {
            members: members.build(),
            events: engine(CollectionKind::Events).build(),
            posts: engine(CollectionKind::Posts).build(),
        };

        let aggregator = Aggregator::spawn(
            StatsSources::new()
                .members(&engines.members)
                .events(&engines.events)
                .posts(&engines.posts),
            self.recent_posts_limit,
        );

        let mut auth_changes = self.auth.on_auth_state_changed();
        let current = auth_changes.borrow_and_update().clone();
        engines.follow(current.as_ref());

        let follower = engines.clone();
        let follow_task = tokio::spawn(async move {
            while auth_changes.changed().await.is_ok() {
                let user = auth_changes.borrow_and_update().clone();
                follower.follow(user.as_ref());
            }
            tracing::debug!("Auth provider gone, session stops following");
        });

        ClubSession {
            engines,
            aggregator,
            auth: self.auth,
            notices: self.notices,
            follow_task,
        }
    }
}

/// Sync scope of one client
pub struct ClubSession {
    engines: Engines,
    aggregator: Aggregator,
    auth: Arc<dyn AuthProvider>,
    notices: NoticeBoard,
    follow_task: JoinHandle<()>,
}

impl ClubSession {
    pub fn builder(remote: Arc<dyn RemoteStore>, auth: Arc<dyn AuthProvider>) -> ClubSessionBuilder {
        ClubSessionBuilder {
            remote,
            auth,
            cache: None,
            notices: NoticeBoard::new(),
            recent_posts_limit: DEFAULT_RECENT_POSTS_LIMIT,
        }
    }

    pub fn members(&self) -> &SyncEngine {
        &self.engines.members
    }

    pub fn events(&self) -> &SyncEngine {
        &self.engines.events
    }

    pub fn posts(&self) -> &SyncEngine {
        &self.engines.posts
    }

    pub fn engine(&self, kind: CollectionKind) -> &SyncEngine {
        match kind {
            CollectionKind::Members => &self.engines.members,
            CollectionKind::Events => &self.engines.events,
            CollectionKind::Posts => &self.engines.posts,
        }
    }

    pub fn current_stats(&self) -> AggregateStats {
        self.aggregator.current_stats()
    }

    pub fn subscribe_stats(&self) -> watch::Receiver<AggregateStats> {
        self.aggregator.subscribe()
    }

    pub fn current_user(&self) -> Option<UserId> {
        self.auth.current_user_id()
    }

    pub fn notices(&self) -> &NoticeBoard {
        &self.notices
    }
}

impl Drop for ClubSession {
    fn drop(&mut self) {
        self.follow_task.abort();
        self.engines.stop();
        self.aggregator.stop();
        tracing::debug!("Club session closed");
    }
}
