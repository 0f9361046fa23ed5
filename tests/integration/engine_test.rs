//! Sync Engine behaviour against the in-memory remote store

use std::sync::Arc;

use assert_matches::assert_matches;
use clubsync::client::cache::{KeyValueStore, MembersCache, MemoryStore};
use clubsync::client::remote::MemoryRemote;
use clubsync::client::sync::{EngineState, SyncEngine, WriteOutcome};
use clubsync::shared::config::DEFAULT_MEMBERS_CACHE_KEY;
use clubsync::shared::{CollectionKind, EntityId, RemoteDocument, RemoteError, SyncError, WriteOp};
use pretty_assertions::assert_eq;

use crate::common::*;
use crate::{assert_err, assert_ok, assert_view_ids};

/// Push a feed error and wait for the engine to report it
async fn break_feed(remote: &MemoryRemote, engine: &SyncEngine) {
    remote.push_error(engine.kind(), RemoteError::Unavailable("connection reset".into()));
    let mut states = engine.subscribe_state();
    tokio::time::timeout(WAIT, states.wait_for(|state| matches!(state, EngineState::Failed(_))))
        .await
        .expect("engine should fail")
        .expect("engine dropped");
}

#[tokio::test]
async fn test_optimistic_create_is_visible_before_the_store_answers() {
    let remote = MemoryRemote::new();
    let members = engine(CollectionKind::Members, &remote);
    start_synced(&members).await;

    remote.pause_writes();
    let create = assert_ok!(members.apply_optimistic(member("Ada", "Maths")));

    let view = members.current_view();
    assert_eq!(view.len(), 1);
    let pending = view.get(&create.id).expect("pending entity in view");
    assert!(pending.is_pending());
    assert_eq!(pending.str_field("name"), Some("Ada"));

    remote.resume_writes();
    let remote_id = match create.completion.wait().await {
        WriteOutcome::Applied(id) => id,
        other => panic!("Expected Applied, got {:?}", other),
    };

    let view = wait_for_view(&members, |view| view.pending().count() == 0).await;
    assert_view_ids!(view, [remote_id]);
    assert_eq!(members.pending_count(), 0);
}

#[tokio::test]
async fn test_snapshots_keep_unconfirmed_pending_entities() {
    let remote = MemoryRemote::new();
    remote.insert(CollectionKind::Members, member("Ada", "Maths"));
    let members = engine(CollectionKind::Members, &remote);
    start_synced(&members).await;

    remote.pause_writes();
    let create = assert_ok!(members.apply_optimistic(member("Grace", "CS")));

    // Another client writes while ours is still in flight.
    let other = remote.insert(CollectionKind::Members, member("Linus", "OS"));
    let view = wait_for_view(&members, |view| view.len() == 3).await;

    let ids = view.ids();
    assert_eq!(ids[1], EntityId::remote(other));
    assert_eq!(ids[2], create.id);
}

#[tokio::test]
async fn test_events_and_posts_stay_sorted() {
    let remote = MemoryRemote::new();
    let events = engine(CollectionKind::Events, &remote);
    let posts = engine(CollectionKind::Posts, &remote);
    let late = remote.insert(CollectionKind::Events, event("Late", "2031-01-01"));
    let early = remote.insert(CollectionKind::Events, event("Early", "2030-01-01"));
    let old = remote.insert(CollectionKind::Posts, post("Old", "u2", "2024-01-01T00:00:00Z"));
    start_synced(&events).await;
    start_synced(&posts).await;

    let tbd = assert_ok!(events.apply_optimistic(event("Someday", "")));
    assert_view_ids!(events.current_view(), [early, late, tbd.id]);

    let fresh = assert_ok!(posts.apply_optimistic(post("Fresh", "u1", "2024-06-01T00:00:00Z")));
    assert_view_ids!(posts.current_view(), [fresh.id, old]);
}

#[tokio::test]
async fn test_deleted_entity_is_not_resurrected_by_stale_snapshot() {
    let remote = MemoryRemote::new();
    let keep = remote.insert(CollectionKind::Posts, post("Keep", "u1", "2024-01-02T00:00:00Z"));
    let gone = remote.insert(CollectionKind::Posts, post("Gone", "u1", "2024-01-01T00:00:00Z"));
    let posts = engine(CollectionKind::Posts, &remote);
    start_synced(&posts).await;
    let stale: Vec<RemoteDocument> = remote.documents(CollectionKind::Posts);

    remote.set_auto_publish(false);
    let deleted = assert_ok!(posts.delete_local(&EntityId::remote(gone.clone())));
    assert_view_ids!(posts.current_view(), [keep]);
    assert_eq!(deleted.wait().await, WriteOutcome::Applied(()));

    // The feed still lists the deleted post.
    let revision = posts.current_view().revision;
    remote.push_snapshot(CollectionKind::Posts, stale);
    let view = wait_for_view(&posts, |view| view.revision > revision).await;
    assert_view_ids!(view, [keep]);

    // A fresh snapshot without it clears the tombstone; the view is unchanged.
    remote.publish(CollectionKind::Posts);
    let view = wait_for_view(&posts, |view| view.revision > revision + 1).await;
    assert_view_ids!(view, [keep]);
}

#[tokio::test]
async fn test_failed_create_is_rolled_back_and_reported() {
    let remote = MemoryRemote::new();
    let posts = engine(CollectionKind::Posts, &remote);
    start_synced(&posts).await;

    remote.fail_next(WriteOp::Create, RemoteError::Rejected("permission denied".into()));
    let create = assert_ok!(posts.apply_optimistic(post("Draft", "u1", "2024-01-01T00:00:00Z")));
    assert!(posts.current_view().contains(&create.id));

    let outcome = create.completion.wait().await;
    assert_matches!(
        outcome,
        WriteOutcome::Rejected(SyncError::Write { op: WriteOp::Create, .. })
    );
    assert!(posts.current_view().is_empty());

    let notices = posts.notices().active();
    assert_eq!(notices.len(), 1);
    assert!(notices[0].message.contains("permission denied"));
}

#[tokio::test]
async fn test_failed_update_keeps_local_change_outside_members() {
    let remote = MemoryRemote::new();
    let id = EntityId::remote(remote.insert(CollectionKind::Events, event("Meetup", "2030-01-01")));
    let events = engine(CollectionKind::Events, &remote);
    start_synced(&events).await;

    remote.fail_next(WriteOp::Update, RemoteError::Unavailable("offline".into()));
    let completion = assert_ok!(events.apply_mutation(&id, |_| fields(serde_json::json!({ "venue": "Lab" }))));
    assert_matches!(completion.wait().await, WriteOutcome::Rejected(_));

    let view = events.current_view();
    assert_eq!(view.get(&id).and_then(|e| e.str_field("venue")), Some("Lab"));
    assert_eq!(events.notices().len(), 1);
}

#[tokio::test]
async fn test_failed_delete_outside_members_waits_for_next_snapshot() {
    let remote = MemoryRemote::new();
    let id = remote.insert(CollectionKind::Posts, post("Pinned", "u1", "2024-01-01T00:00:00Z"));
    let posts = engine(CollectionKind::Posts, &remote);
    start_synced(&posts).await;

    remote.fail_next(WriteOp::Delete, RemoteError::Rejected("read only".into()));
    let completion = assert_ok!(posts.delete_local(&EntityId::remote(id.clone())));
    assert_matches!(completion.wait().await, WriteOutcome::Rejected(_));
    assert!(posts.current_view().is_empty());

    remote.publish(CollectionKind::Posts);
    let view = wait_for_view(&posts, |view| !view.is_empty()).await;
    assert_view_ids!(view, [id]);
}

#[tokio::test]
async fn test_corrupt_cache_then_snapshot_populates_view() {
    let store = Arc::new(MemoryStore::new());
    assert_ok!(store.save(DEFAULT_MEMBERS_CACHE_KEY, "[{ this is not json"));
    let remote = MemoryRemote::new();
    let ada = remote.insert(CollectionKind::Members, member("Ada", "Maths"));
    remote.set_auto_publish(false);

    let members = members_engine(&remote, MembersCache::new(store.clone()));
    assert_ok!(members.start());
    assert_eq!(members.state(), EngineState::Connecting);
    assert!(members.current_view().is_empty());

    remote.publish(CollectionKind::Members);
    let view = wait_for_view(&members, |view| !view.is_empty()).await;
    assert_view_ids!(view, [ada]);
    assert!(!view.provisional);

    // The snapshot overwrote the corrupt payload.
    let reloaded = MembersCache::new(store).load();
    assert_eq!(reloaded.len(), 1);
}

#[tokio::test]
async fn test_cached_members_are_provisional_until_first_snapshot() {
    let store = Arc::new(MemoryStore::new());
    let cache = MembersCache::new(store.clone());
    let remote = MemoryRemote::new();
    let ada = remote.insert(CollectionKind::Members, member("Ada", "Maths"));

    let first = members_engine(&remote, cache.clone());
    start_synced(&first).await;
    first.stop();

    // Restart: the network is slow to deliver.
    remote.set_auto_publish(false);
    let second = members_engine(&remote, cache);
    assert_ok!(second.start());
    assert_eq!(second.state(), EngineState::Subscribed { provisional: true });
    let view = second.current_view();
    assert!(view.provisional);
    assert_view_ids!(view, [ada]);

    remote.publish(CollectionKind::Members);
    let view = wait_for_view(&second, |view| !view.provisional).await;
    assert_view_ids!(view, [ada]);
    assert_eq!(second.state(), EngineState::Subscribed { provisional: false });
}

#[tokio::test]
async fn test_member_delete_updates_cache() {
    let store = Arc::new(MemoryStore::new());
    let remote = MemoryRemote::new();
    remote.insert(CollectionKind::Members, member("Ada", "Maths"));
    let grace = remote.insert(CollectionKind::Members, member("Grace", "CS"));
    let members = members_engine(&remote, MembersCache::new(store.clone()));
    start_synced(&members).await;

    remote.pause_writes();
    assert_ok!(members.delete_local(&EntityId::remote(grace)));
    assert_eq!(MembersCache::new(store).load().len(), 1);
    remote.resume_writes();
}

#[tokio::test]
async fn test_stop_during_inflight_create_discards_completion() {
    let remote = MemoryRemote::new();
    let posts = engine(CollectionKind::Posts, &remote);
    start_synced(&posts).await;

    remote.pause_writes();
    let create = assert_ok!(posts.apply_optimistic(post("Late", "u1", "2024-01-01T00:00:00Z")));
    posts.stop();
    let frozen = posts.current_view();

    remote.resume_writes();
    assert_eq!(create.completion.wait().await, WriteOutcome::Discarded);
    settle().await;

    assert_eq!(posts.current_view(), frozen);
    assert!(posts.notices().is_empty());
    assert_eq!(posts.state(), EngineState::Unsubscribed);
    assert_err!(
        posts.apply_optimistic(post("After", "u1", "2024-01-01T00:00:00Z")),
        SyncError::NotRunning(CollectionKind::Posts)
    );
}

#[tokio::test]
async fn test_feed_error_keeps_last_view() {
    let remote = MemoryRemote::new();
    let id = remote.insert(CollectionKind::Events, event("Meetup", "2030-01-01"));
    let events = engine(CollectionKind::Events, &remote);
    start_synced(&events).await;

    break_feed(&remote, &events).await;

    assert_view_ids!(events.current_view(), [id]);
    assert_matches!(
        events.notices().active()[0].error,
        Some(SyncError::Subscription { .. })
    );

    // Restart recovers.
    assert_ok!(events.start());
    start_synced(&events).await;
}

#[tokio::test]
async fn test_resubscribing_after_feed_error_keeps_inflight_create() {
    let remote = MemoryRemote::new();
    let posts = engine(CollectionKind::Posts, &remote);
    start_synced(&posts).await;
    break_feed(&remote, &posts).await;

    remote.pause_writes();
    let create = assert_ok!(posts.apply_optimistic(post("Offline", "u1", "2024-01-01T00:00:00Z")));
    start_synced(&posts).await;
    assert!(posts.current_view().contains(&create.id));
    assert_eq!(posts.pending_count(), 1);

    remote.fail_next(WriteOp::Create, RemoteError::Rejected("quota exceeded".into()));
    remote.resume_writes();
    assert_matches!(
        create.completion.wait().await,
        WriteOutcome::Rejected(SyncError::Write { op: WriteOp::Create, .. })
    );
    assert!(!posts.current_view().contains(&create.id));

    let notices = posts.notices().active();
    assert_eq!(notices.len(), 2);
    assert!(notices[1].message.contains("quota exceeded"));
}

#[tokio::test]
async fn test_resubscribing_after_feed_error_keeps_inflight_delete_hidden() {
    let remote = MemoryRemote::new();
    let id = remote.insert(CollectionKind::Posts, post("Old news", "u1", "2024-01-01T00:00:00Z"));
    let posts = engine(CollectionKind::Posts, &remote);
    start_synced(&posts).await;
    break_feed(&remote, &posts).await;

    remote.pause_writes();
    let completion = assert_ok!(posts.delete_local(&EntityId::remote(id)));
    // The new feed still carries the document.
    start_synced(&posts).await;
    assert!(posts.current_view().is_empty());

    remote.resume_writes();
    assert_eq!(completion.wait().await, WriteOutcome::Applied(()));
    assert!(remote.documents(CollectionKind::Posts).is_empty());
}

#[tokio::test]
async fn test_cache_with_repeated_ids_starts_cleanly() {
    let store = Arc::new(MemoryStore::new());
    assert_ok!(store.save(
        DEFAULT_MEMBERS_CACHE_KEY,
        r#"[{"id":"a","name":"Ada"},{"id":"a","name":"Ada again"}]"#,
    ));
    let remote = MemoryRemote::new();
    remote.set_auto_publish(false);

    let members = members_engine(&remote, MembersCache::new(store));
    assert_ok!(members.start());
    let view = members.current_view();
    assert!(view.provisional);
    assert_view_ids!(view, ["a"]);
}

#[tokio::test]
async fn test_restart_after_stop_resubscribes() {
    let remote = MemoryRemote::new();
    let members = engine(CollectionKind::Members, &remote);
    start_synced(&members).await;
    members.stop();
    members.stop();
    assert_eq!(members.state(), EngineState::Unsubscribed);

    start_synced(&members).await;
    remote.insert(CollectionKind::Members, member("Ada", "Maths"));
    let view = wait_for_view(&members, |view| view.len() == 1).await;
    assert_eq!(view.entities[0].str_field("name"), Some("Ada"));
    assert_eq!(remote.subscriber_count(CollectionKind::Members), 1);
}
