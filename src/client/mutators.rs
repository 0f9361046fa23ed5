//! Attendance and engagement mutators
//!
//! Collection-specific writes built on the Sync Engine primitives. Toggles
//! read the current set-valued field, add or remove the acting identity and
//! write the whole set back, so toggling twice restores the original set.
//! The acting identity is always passed in explicitly.

use chrono::Utc;
use serde_json::Value;

use crate::client::auth::UserId;
use crate::client::sync::{Completion, OptimisticCreate, SyncEngine};
use crate::shared::records::{ATTENDANCE_FIELD, BOOKMARKS_FIELD, LIKES_FIELD};
use crate::shared::{CollectionKind, Draft, EntityId, Fields, SyncError};

/// Add `member` to the set in `field`, or remove it if present
///
/// A missing field is the empty set.
pub fn toggle_membership(
    engine: &SyncEngine,
    id: &EntityId,
    field: &str,
    member: &str,
) -> Result<Completion<()>, SyncError> {
    engine.apply_mutation(id, |entity| {
        let mut set = entity.string_set(field);
        match set.iter().position(|existing| existing == member) {
            Some(index) => {
                set.remove(index);
            }
            None => set.push(member.to_owned()),
        }
        let mut patch = Fields::new();
        patch.insert(field.to_owned(), Value::from(set));
        patch
    })
}

/// Mark or unmark a member as attending an event
pub fn toggle_attendance(
    events: &SyncEngine,
    event_id: &EntityId,
    member_name: &str,
) -> Result<Completion<()>, SyncError> {
    debug_assert_eq!(events.kind(), CollectionKind::Events);
    toggle_membership(events, event_id, ATTENDANCE_FIELD, member_name)
}

pub fn toggle_like(
    posts: &SyncEngine,
    post_id: &EntityId,
    user: &UserId,
) -> Result<Completion<()>, SyncError> {
    debug_assert_eq!(posts.kind(), CollectionKind::Posts);
    toggle_membership(posts, post_id, LIKES_FIELD, user.as_str())
}

pub fn toggle_bookmark(
    posts: &SyncEngine,
    post_id: &EntityId,
    user: &UserId,
) -> Result<Completion<()>, SyncError> {
    debug_assert_eq!(posts.kind(), CollectionKind::Posts);
    toggle_membership(posts, post_id, BOOKMARKS_FIELD, user.as_str())
}

pub fn delete_post(posts: &SyncEngine, post_id: &EntityId) -> Result<Completion<()>, SyncError> {
    debug_assert_eq!(posts.kind(), CollectionKind::Posts);
    posts.delete_local(post_id)
}

pub fn delete_member(
    members: &SyncEngine,
    member_id: &EntityId,
) -> Result<Completion<()>, SyncError> {
    debug_assert_eq!(members.kind(), CollectionKind::Members);
    members.delete_local(member_id)
}

/// Create a record from a draft, authored by `author`
pub fn create_record<D: Draft>(
    engine: &SyncEngine,
    draft: D,
    author: Option<&UserId>,
) -> Result<OptimisticCreate, SyncError> {
    let fields = draft.into_fields(author.map(UserId::as_str), Utc::now());
    engine.apply_optimistic(fields)
}
