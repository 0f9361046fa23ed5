//! Session scope, Aggregator and mutators working together

use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::Utc;
use clubsync::client::mutators::{create_record, delete_post, toggle_attendance, toggle_bookmark, toggle_like};
use clubsync::client::{
    filter_members, AggregateStats, Aggregator, ClubSession, EventBuckets, Inbox, MembersCache,
    MemoryRemote, MemoryStore, SessionAuth, StatsSources, UserId, WriteOutcome,
};
use clubsync::shared::records::{ATTENDANCE_FIELD, LIKES_FIELD};
use clubsync::shared::{CollectionKind, EntityId, NewPost, PostCategory, RemoteError, WriteOp};
use pretty_assertions::assert_eq;
use tokio::sync::watch;

use crate::common::*;
use crate::{assert_contains, assert_ok, assert_view_ids};

fn signed_in_session(remote: &MemoryRemote, user: &str) -> (ClubSession, SessionAuth) {
    let auth = SessionAuth::new();
    auth.sign_in(UserId::new(user));
    let session = ClubSession::builder(Arc::new(remote.clone()), Arc::new(auth.clone()))
        .cache(MembersCache::new(Arc::new(MemoryStore::new())))
        .build();
    (session, auth)
}

async fn wait_for_stats<F>(session: &ClubSession, mut predicate: F) -> AggregateStats
where
    F: FnMut(&AggregateStats) -> bool,
{
    let mut stats = session.subscribe_stats();
    let waited = tokio::time::timeout(WAIT, stats.wait_for(|stats| predicate(stats))).await;
    match waited {
        Ok(Ok(stats)) => stats.clone(),
        _ => panic!("timed out waiting for stats, last was {:?}", session.current_stats()),
    }
}

#[tokio::test]
async fn test_upcoming_count_ignores_past_and_unparseable_dates() {
    let remote = MemoryRemote::new();
    for date in ["2099-01-01", "not-a-date", "2000-01-01"] {
        remote.insert(CollectionKind::Events, event("Meetup", date));
    }

    let (session, _auth) = signed_in_session(&remote, "u1");
    let stats = wait_for_stats(&session, |stats| stats.total_events == 3).await;
    assert_eq!(stats.upcoming_events, 1);

    let events = session.events().current_view();
    let buckets = EventBuckets::partition(&events, Utc::now());
    assert_eq!(
        (buckets.upcoming.len(), buckets.past.len(), buckets.undated.len()),
        (1, 1, 1)
    );
}

#[tokio::test]
async fn test_stats_include_pending_posts() {
    let remote = MemoryRemote::new();
    remote.insert(CollectionKind::Members, member("Ada", "Maths"));
    remote.insert(CollectionKind::Posts, post("Oldest", "u2", "2024-01-01T00:00:00Z"));
    remote.insert(CollectionKind::Posts, post("Middle", "u2", "2024-02-01T00:00:00Z"));
    let (session, _auth) = signed_in_session(&remote, "u1");
    wait_for_stats(&session, |stats| stats.total_members == 1 && stats.recent_posts.len() == 2).await;

    remote.pause_writes();
    let me = UserId::new("u1");
    let created = assert_ok!(create_record(
        session.posts(),
        NewPost {
            title: "Newest".into(),
            content: "Hot off the press".into(),
            category: PostCategory::Discussion,
        },
        Some(&me),
    ));

    let stats = wait_for_stats(&session, |stats| stats.recent_posts.len() == 3).await;
    let titles: Vec<_> = stats
        .recent_posts
        .iter()
        .map(|post| post.str_field("title").unwrap_or_default())
        .collect();
    assert_eq!(titles, vec!["Newest", "Middle", "Oldest"]);
    assert!(stats.recent_posts[0].is_pending());

    remote.resume_writes();
    assert_matches!(created.completion.wait().await, WriteOutcome::Applied(_));
}

#[tokio::test]
async fn test_recent_posts_respect_limit() {
    let remote = MemoryRemote::new();
    for day in 1..=5 {
        remote.insert(
            CollectionKind::Posts,
            post(&format!("Day {day}"), "u2", &format!("2024-03-0{day}T00:00:00Z")),
        );
    }
    let auth = SessionAuth::new();
    auth.sign_in(UserId::new("u1"));
    let session = ClubSession::builder(Arc::new(remote), Arc::new(auth))
        .recent_posts_limit(2)
        .build();

    let stats = wait_for_stats(&session, |stats| !stats.recent_posts.is_empty()).await;
    let titles: Vec<_> = stats
        .recent_posts
        .iter()
        .filter_map(|post| post.str_field("title"))
        .collect();
    assert_eq!(titles, vec!["Day 5", "Day 4"]);
}

#[tokio::test]
async fn test_like_toggled_twice_restores_original_set() {
    let remote = MemoryRemote::new();
    let mut fields = post("Hello", "u2", "2024-01-01T00:00:00Z");
    fields.insert(LIKES_FIELD.into(), serde_json::json!(["u3", "u4"]));
    let id = EntityId::remote(remote.insert(CollectionKind::Posts, fields));
    let (session, _auth) = signed_in_session(&remote, "u1");
    let posts = session.posts();
    wait_for_view(posts, |view| !view.is_empty()).await;

    let me = UserId::new("u1");
    let first = assert_ok!(toggle_like(posts, &id, &me));
    assert_eq!(first.wait().await, WriteOutcome::Applied(()));
    let second = assert_ok!(toggle_like(posts, &id, &me));
    assert_eq!(second.wait().await, WriteOutcome::Applied(()));

    // Snapshots of the first toggle may still be in flight.
    wait_for_view(posts, |view| {
        view.get(&id)
            .map_or(false, |post| post.string_set(LIKES_FIELD) == ["u3", "u4"])
    })
    .await;
    let stored = remote.documents(CollectionKind::Posts)[0].fields[LIKES_FIELD].clone();
    assert_eq!(stored, serde_json::json!(["u3", "u4"]));
}

#[tokio::test]
async fn test_attendance_and_bookmarks_are_independent_sets() {
    let remote = MemoryRemote::new();
    let event_id = EntityId::remote(remote.insert(CollectionKind::Events, event("Hack night", "2099-03-14")));
    let post_id = EntityId::remote(remote.insert(
        CollectionKind::Posts,
        post("Notes", "u2", "2024-01-01T00:00:00Z"),
    ));
    let (session, _auth) = signed_in_session(&remote, "u1");
    wait_for_view(session.events(), |view| !view.is_empty()).await;
    wait_for_view(session.posts(), |view| !view.is_empty()).await;

    assert_ok!(toggle_attendance(session.events(), &event_id, "Ada"));
    assert_ok!(toggle_attendance(session.events(), &event_id, "Grace"));
    let attendance = session
        .events()
        .current_view()
        .get(&event_id)
        .map(|event| event.string_set(ATTENDANCE_FIELD));
    assert_eq!(attendance, Some(vec!["Ada".to_owned(), "Grace".to_owned()]));

    let me = UserId::new("u1");
    assert_ok!(toggle_bookmark(session.posts(), &post_id, &me));
    let view = session.posts().current_view();
    let post = view.get(&post_id).expect("post in view");
    assert_eq!(post.string_set("bookmarks"), vec!["u1".to_owned()]);
    assert!(post.string_set(LIKES_FIELD).is_empty());
}

#[tokio::test]
async fn test_failed_post_delete_is_reported_on_shared_board() {
    let remote = MemoryRemote::new();
    let id = remote.insert(CollectionKind::Posts, post("Keep me", "u2", "2024-01-01T00:00:00Z"));
    let (session, _auth) = signed_in_session(&remote, "u1");
    wait_for_view(session.posts(), |view| !view.is_empty()).await;

    remote.fail_next(WriteOp::Delete, RemoteError::Rejected("not the author".into()));
    let completion = assert_ok!(delete_post(session.posts(), &EntityId::remote(id.clone())));
    assert_matches!(completion.wait().await, WriteOutcome::Rejected(_));

    let notices = session.notices().active();
    assert_eq!(notices.len(), 1);
    assert_contains!(notices[0].message, "not the author");
    assert!(session.notices().dismiss(notices[0].id));
    assert!(session.notices().is_empty());

    remote.publish(CollectionKind::Posts);
    let view = wait_for_view(session.posts(), |view| !view.is_empty()).await;
    assert_view_ids!(view, [id]);
}

#[tokio::test]
async fn test_inbox_lists_other_users_posts() {
    let remote = MemoryRemote::new();
    remote.insert(CollectionKind::Posts, post("Mine", "u1", "2024-01-03T00:00:00Z"));
    let theirs = remote.insert(CollectionKind::Posts, post("Theirs", "u2", "2024-01-02T00:00:00Z"));
    let mut anonymous = post("Anonymous", "u3", "2024-01-01T00:00:00Z");
    anonymous.remove("userId");
    remote.insert(CollectionKind::Posts, anonymous);

    let (session, _auth) = signed_in_session(&remote, "u1");
    let posts = wait_for_view(session.posts(), |view| view.len() == 3).await;

    let mut inbox = Inbox::new(5);
    let me = UserId::new("u1");
    let messages: Vec<_> = inbox
        .refresh(&posts, &me)
        .iter()
        .map(|notification| notification.message.clone())
        .collect();
    assert_eq!(messages, vec!["New post: Theirs".to_owned()]);

    inbox.mark_read(&EntityId::remote(theirs));
    assert_eq!(inbox.unread_count(), 0);
}

#[tokio::test]
async fn test_member_search_over_cached_view() {
    let remote = MemoryRemote::new();
    remote.insert(CollectionKind::Members, member("Ada Lovelace", "Mathematics"));
    remote.insert(CollectionKind::Members, member("Grace Hopper", "Computer Science"));
    remote.insert(CollectionKind::Members, member("Alan Turing", "Mathematics"));
    let (session, _auth) = signed_in_session(&remote, "u1");
    let members = wait_for_view(session.members(), |view| view.len() == 3).await;

    let names = |query: &str| -> Vec<String> {
        filter_members(&members, query)
            .into_iter()
            .filter_map(|member| member.str_field("name").map(str::to_owned))
            .collect()
    };
    assert_eq!(names("MATH"), vec!["Ada Lovelace", "Alan Turing"]);
    assert_eq!(names("hopper"), vec!["Grace Hopper"]);
    assert_eq!(names("").len(), 3);
}

#[tokio::test]
async fn test_sign_out_stops_and_sign_in_restarts() {
    let remote = MemoryRemote::new();
    let (session, auth) = signed_in_session(&remote, "u1");
    start_synced(session.members()).await;

    auth.sign_out();
    let mut states = session.members().subscribe_state();
    tokio::time::timeout(WAIT, states.wait_for(|state| !state.is_running()))
        .await
        .expect("engine should stop on sign-out")
        .expect("engine dropped");
    assert_eq!(session.current_user(), None);

    auth.sign_in(UserId::new("u2"));
    remote.insert(CollectionKind::Members, member("Ada", "Maths"));
    let view = wait_for_view(session.members(), |view| view.len() == 1).await;
    assert!(!view.provisional);
    assert_eq!(session.current_user(), Some(UserId::new("u2")));
}

#[tokio::test]
async fn test_aggregator_follows_plain_view_channels() {
    let (members_tx, members_rx) = watch::channel(Arc::new(clubsync::shared::CollectionView::empty(
        CollectionKind::Members,
    )));
    let aggregator = Aggregator::spawn(
        StatsSources::new().view(CollectionKind::Members, members_rx),
        3,
    );
    assert_eq!(aggregator.current_stats().total_members, 0);

    let mut view = clubsync::shared::CollectionView::empty(CollectionKind::Members);
    view.entities.push(clubsync::shared::Entity::confirmed("m1", member("Ada", "Maths")));
    members_tx.send_replace(Arc::new(view));

    let mut stats = aggregator.subscribe();
    let stats = tokio::time::timeout(WAIT, stats.wait_for(|stats| stats.total_members == 1))
        .await
        .expect("stats should update")
        .expect("aggregator dropped")
        .clone();
    assert_eq!(stats.total_events, 0);
    assert!(stats.recent_posts.is_empty());
}
