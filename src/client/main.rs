//! ClubSync demo entry point
//!
//! Runs one client session against the in-memory remote store: seeds a few
//! documents as "another client", signs in, writes optimistically and prints
//! the views and stats as they settle.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clubsync::client::mutators::{create_record, toggle_attendance, toggle_like};
use clubsync::client::{
    ClubSession, Config, EventBuckets, Inbox, MembersCache, MemoryRemote, MemoryStore,
    SessionAuth, UserId, WriteOutcome,
};
use clubsync::shared::{CollectionKind, Draft, NewEvent, NewMember, NewPost, PostCategory};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    clubsync::init_tracing();
    tracing::info!("Starting ClubSync demo");

    let remote = MemoryRemote::new();
    seed(&remote);

    // Default limits; the cache stays in memory so the demo leaves nothing on disk.
    let config = Config::default();
    let auth = SessionAuth::new();
    let cache = MembersCache::new(Arc::new(MemoryStore::new()));
    let session = ClubSession::builder(Arc::new(remote.clone()), Arc::new(auth.clone()))
        .cache(cache)
        .recent_posts_limit(config.recent_posts_limit())
        .build();

    let me = UserId::new("demo-user");
    auth.sign_in(me.clone());
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Slow network: writes show up locally long before the store answers.
    remote.pause_writes();
    let member = create_record(
        session.members(),
        NewMember {
            name: "Grace Hopper".into(),
            email: "grace@example.org".into(),
            department: "Computer Science".into(),
            joining_date: "2024-09-01".into(),
        },
        Some(&me),
    )?;
    println!(
        "Members before the store answered: {} ({} pending)",
        session.members().current_view().len(),
        session.members().pending_count()
    );
    remote.resume_writes();

    match member.completion.wait().await {
        WriteOutcome::Applied(id) => println!("Member confirmed as {id}"),
        other => println!("Member create ended as {other:?}"),
    }

    let event = create_record(
        session.events(),
        NewEvent {
            title: "Hack night".into(),
            date: "2099-03-14T18:00".into(),
            description: "Bring a laptop".into(),
            venue: "Lab 2".into(),
        },
        Some(&me),
    )?;
    if let Some(event_id) = event.completion.wait().await.applied() {
        tokio::time::sleep(Duration::from_millis(20)).await;
        toggle_attendance(session.events(), &event_id, "Grace Hopper")?
            .wait()
            .await;
    }

    let post = create_record(
        session.posts(),
        NewPost {
            title: "Welcome".into(),
            content: "Glad to have you all".into(),
            category: PostCategory::Announcement,
        },
        Some(&me),
    )?;
    if let Some(post_id) = post.completion.wait().await.applied() {
        tokio::time::sleep(Duration::from_millis(20)).await;
        toggle_like(session.posts(), &post_id, &me)?.wait().await;
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    let stats = session.current_stats();
    println!(
        "{} members, {} events ({} upcoming)",
        stats.total_members, stats.total_events, stats.upcoming_events
    );
    for post in &stats.recent_posts {
        println!(
            "  recent: {} ({} likes)",
            post.str_field("title").unwrap_or("untitled"),
            post.string_set("likes").len()
        );
    }

    let events = session.events().current_view();
    let buckets = EventBuckets::partition(&events, Utc::now());
    println!(
        "Events: {} upcoming, {} past, {} undated",
        buckets.upcoming.len(),
        buckets.past.len(),
        buckets.undated.len()
    );

    let mut inbox = Inbox::new(config.notification_limit());
    for notification in inbox.refresh(&session.posts().current_view(), &me) {
        println!("  {}", notification.message);
    }
    println!("Unread notifications: {}", inbox.unread_count());

    auth.sign_out();
    drop(session);
    tracing::info!("Demo finished");
    Ok(())
}

/// Documents written by another client before this one connects
fn seed(remote: &MemoryRemote) {
    let other = Some("club-admin");
    let now = Utc::now();

    remote.insert(
        CollectionKind::Members,
        NewMember {
            name: "Ada Lovelace".into(),
            email: "ada@example.org".into(),
            department: "Mathematics".into(),
            joining_date: "2023-01-15".into(),
        }
        .into_fields(other, now),
    );
    remote.insert(
        CollectionKind::Events,
        NewEvent {
            title: "Founders' meetup".into(),
            date: "2020-05-01".into(),
            description: "Where it all began".into(),
            venue: "Main hall".into(),
        }
        .into_fields(other, now),
    );
    remote.insert(
        CollectionKind::Posts,
        NewPost {
            title: "Elections next week".into(),
            content: "Nominations are open".into(),
            category: PostCategory::News,
        }
        .into_fields(other, now),
    );
}
