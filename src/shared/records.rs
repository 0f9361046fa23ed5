//! Record drafts
//!
//! Typed shapes of the documents a user can create. A draft is turned into the
//! [`Fields`] handed to `SyncEngine::apply_optimistic`; the stamping of the
//! author and creation time happens here so every collection gets the same
//! metadata.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::shared::entity::{Fields, CREATED_AT_FIELD};

/// Author of a record
pub const USER_ID_FIELD: &str = "userId";
/// Names of members who attended an event
pub const ATTENDANCE_FIELD: &str = "attendance";
/// User ids that liked a post
pub const LIKES_FIELD: &str = "likes";
/// User ids that bookmarked a post
pub const BOOKMARKS_FIELD: &str = "bookmarks";
pub const COMMENTS_FIELD: &str = "comments";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMember {
    pub name: String,
    pub email: String,
    pub department: String,
    pub joining_date: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEvent {
    pub title: String,
    pub date: String,
    pub description: String,
    pub venue: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostCategory {
    #[default]
    Announcement,
    Event,
    News,
    Discussion,
    Achievement,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPost {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub category: PostCategory,
}

/// A draft that can be written into a collection
pub trait Draft: Serialize {
    /// Set-valued fields a fresh record starts with
    const EMPTY_SETS: &'static [&'static str];

    /// Build the document fields, stamped with author and creation time
    fn into_fields(self, author: Option<&str>, now: DateTime<Utc>) -> Fields
    where
        Self: Sized,
    {
        let mut fields: Fields = match serde_json::to_value(&self) {
            Ok(Value::Object(map)) => map.into_iter().collect(),
            _ => Fields::new(),
        };
        fields.insert(
            USER_ID_FIELD.to_owned(),
            author.map_or(Value::Null, |id| Value::String(id.to_owned())),
        );
        fields.insert(
            CREATED_AT_FIELD.to_owned(),
            Value::String(now.to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        for set in Self::EMPTY_SETS {
            fields.insert((*set).to_owned(), json!([]));
        }
        fields
    }
}

impl Draft for NewMember {
    const EMPTY_SETS: &'static [&'static str] = &[];
}

impl Draft for NewEvent {
    const EMPTY_SETS: &'static [&'static str] = &[ATTENDANCE_FIELD];
}

impl Draft for NewPost {
    const EMPTY_SETS: &'static [&'static str] = &[LIKES_FIELD, COMMENTS_FIELD, BOOKMARKS_FIELD];
}
