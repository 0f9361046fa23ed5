//! # Aggregator
//!
//! Read-only summary statistics over up to three Sync Engines.
//!
//! ## Features
//!
//! - **Full Recompute**: every change of any source view recomputes all
//!   fields from the current contents of every source
//! - **Optional Sources**: a missing source counts as an empty collection
//! - **Subscribable**: stats are published through a watch channel
//!
//! ## Usage
//!
//! ```rust,no_run
//! use clubsync::client::aggregator::{Aggregator, StatsSources};
//! # use clubsync::client::sync::SyncEngine;
//! # fn example(members: &SyncEngine, events: &SyncEngine, posts: &SyncEngine) {
//! let sources = StatsSources::new().members(members).events(events).posts(posts);
//! let aggregator = Aggregator::spawn(sources, 3);
//! println!("{} upcoming", aggregator.current_stats().upcoming_events);
//! # }
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::client::sync::reconciliation::order_entities;
use crate::client::sync::SyncEngine;
use crate::shared::entity::DATE_FIELD;
use crate::shared::{CollectionKind, CollectionView, Entity};

/// Derived summary of the shared collections
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AggregateStats {
    pub total_members: usize,
    pub total_events: usize,
    /// Events dated strictly after the time of computation
    pub upcoming_events: usize,
    /// Newest posts first, pending ones included
    pub recent_posts: Vec<Entity>,
}

impl AggregateStats {
    /// Compute the stats of three views at `now`
    ///
    /// Events with a missing or unparseable date count towards the total
    /// but are never upcoming. Recent posts are ordered by creation time,
    /// newest first, ties kept in view order.
    pub fn compute(
        members: &CollectionView,
        events: &CollectionView,
        posts: &CollectionView,
        now: DateTime<Utc>,
        recent_limit: usize,
    ) -> Self {
        let upcoming_events = events
            .iter()
            .filter(|event| event.timestamp(DATE_FIELD).map_or(false, |date| date > now))
            .count();

        let mut recent_posts = order_entities(CollectionKind::Posts, posts.entities.clone());
        recent_posts.truncate(recent_limit);

        Self {
            total_members: members.len(),
            total_events: events.len(),
            upcoming_events,
            recent_posts,
        }
    }
}

type ViewReceiver = watch::Receiver<Arc<CollectionView>>;

struct Source {
    rx: ViewReceiver,
    open: bool,
}

impl Source {
    fn new(rx: ViewReceiver) -> Self {
        Self { rx, open: true }
    }
}

/// The views an [`Aggregator`] reads from
#[derive(Default)]
pub struct StatsSources {
    members: Option<Source>,
    events: Option<Source>,
    posts: Option<Source>,
}

impl StatsSources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn members(self, engine: &SyncEngine) -> Self {
        self.view(CollectionKind::Members, engine.subscribe_view())
    }

    pub fn events(self, engine: &SyncEngine) -> Self {
        self.view(CollectionKind::Events, engine.subscribe_view())
    }

    pub fn posts(self, engine: &SyncEngine) -> Self {
        self.view(CollectionKind::Posts, engine.subscribe_view())
    }

    /// Read `kind` from any view receiver
    pub fn view(mut self, kind: CollectionKind, rx: ViewReceiver) -> Self {
        let slot = match kind {
            CollectionKind::Members => &mut self.members,
            CollectionKind::Events => &mut self.events,
            CollectionKind::Posts => &mut self.posts,
        };
        *slot = Some(Source::new(rx));
        self
    }

    fn any_open(&self) -> bool {
        [&self.members, &self.events, &self.posts]
            .into_iter()
            .any(|source| matches!(source, Some(s) if s.open))
    }

    fn compute(&mut self, recent_limit: usize) -> AggregateStats {
        let members = current(&mut self.members, CollectionKind::Members);
        let events = current(&mut self.events, CollectionKind::Events);
        let posts = current(&mut self.posts, CollectionKind::Posts);
        AggregateStats::compute(&members, &events, &posts, Utc::now(), recent_limit)
    }
}

fn current(source: &mut Option<Source>, kind: CollectionKind) -> Arc<CollectionView> {
    match source {
        Some(source) => source.rx.borrow_and_update().clone(),
        None => Arc::new(CollectionView::empty(kind)),
    }
}

async fn wait_changed(source: &mut Option<Source>) {
    match source {
        Some(source) if source.open => {
            if source.rx.changed().await.is_err() {
                // Engine gone; its last view keeps counting.
                source.open = false;
            }
        }
        _ => std::future::pending().await,
    }
}

/// Background task keeping [`AggregateStats`] current
#[derive(Debug)]
pub struct Aggregator {
    stats: watch::Receiver<AggregateStats>,
    task: JoinHandle<()>,
}

impl Aggregator {
    /// Compute the initial stats and follow the sources
    ///
    /// Must be called within a Tokio runtime.
    pub fn spawn(mut sources: StatsSources, recent_limit: usize) -> Self {
        let (tx, stats) = watch::channel(sources.compute(recent_limit));

        let task = tokio::spawn(async move {
            while sources.any_open() {
                tokio::select! {
                    _ = wait_changed(&mut sources.members) => {}
                    _ = wait_changed(&mut sources.events) => {}
                    _ = wait_changed(&mut sources.posts) => {}
                }
                let next = sources.compute(recent_limit);
                tx.send_if_modified(|stats| {
                    if *stats == next {
                        false
                    } else {
                        *stats = next;
                        true
                    }
                });
            }
            tracing::debug!("All aggregator sources closed");
        });

        Self { stats, task }
    }

    /// Latest stats
    pub fn current_stats(&self) -> AggregateStats {
        self.stats.borrow().clone()
    }

    /// Receiver notified whenever the stats change
    pub fn subscribe(&self) -> watch::Receiver<AggregateStats> {
        self.stats.clone()
    }

    /// Stop following the sources; the last stats stay readable
    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for Aggregator {
    fn drop(&mut self) {
        self.task.abort();
    }
}
