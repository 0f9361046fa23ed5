//! Entity and Collection View types
//!
//! An [`Entity`] is one document of a synchronized collection: an identifier,
//! a bag of JSON fields and an [`Origin`] tag saying whether it came from a
//! remote snapshot or only exists locally. A [`CollectionView`] is the ordered
//! sequence of entities a Sync Engine publishes for one [`CollectionKind`].

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::shared::timestamp::parse_timestamp;

/// Field name to value mapping of a document
pub type Fields = BTreeMap<String, Value>;

/// Scheduled date of an event
pub const DATE_FIELD: &str = "date";
/// Creation time of any record
pub const CREATED_AT_FIELD: &str = "createdAt";

/// The shared collections kept in sync
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionKind {
    Members,
    Events,
    Posts,
}

impl CollectionKind {
    pub const ALL: [CollectionKind; 3] = [
        CollectionKind::Members,
        CollectionKind::Events,
        CollectionKind::Posts,
    ];

    /// Collection name used by the remote store
    pub fn as_str(&self) -> &'static str {
        match self {
            CollectionKind::Members => "members",
            CollectionKind::Events => "events",
            CollectionKind::Posts => "posts",
        }
    }

    /// Deterministic order the view of this collection is kept in
    pub fn sort_order(&self) -> SortOrder {
        match self {
            CollectionKind::Members => SortOrder::Insertion,
            CollectionKind::Events => SortOrder::Ascending(DATE_FIELD),
            CollectionKind::Posts => SortOrder::Descending(CREATED_AT_FIELD),
        }
    }

    /// Only the members collection is backed by the local cache
    pub fn is_cached(&self) -> bool {
        matches!(self, CollectionKind::Members)
    }
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordering of a collection view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Feed order, local additions at the end
    Insertion,
    /// Ascending by a timestamp field, undated entities last
    Ascending(&'static str),
    /// Descending by a timestamp field, undated entities last
    Descending(&'static str),
}

/// Identifier minted locally for an optimistic create
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocalId(u64);

impl LocalId {
    pub(crate) fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

/// Identifier of an entity in a view
///
/// Local and remote identifiers live in different variants, so a placeholder
/// can never compare equal to an identifier assigned by the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityId {
    Remote(String),
    Local(LocalId),
}

impl EntityId {
    pub fn remote(id: impl Into<String>) -> Self {
        Self::Remote(id.into())
    }

    pub fn as_remote(&self) -> Option<&str> {
        match self {
            EntityId::Remote(id) => Some(id),
            EntityId::Local(_) => None,
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, EntityId::Local(_))
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Remote(id) => f.write_str(id),
            EntityId::Local(local) => write!(f, "local-{}", local.0),
        }
    }
}

/// Where an entity's current contents came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    /// Delivered by a remote snapshot
    Confirmed,
    /// Exists only locally, awaiting confirmation
    Pending,
}

/// One item of a synchronized collection
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub id: EntityId,
    pub fields: Fields,
    pub origin: Origin,
}

impl Entity {
    pub fn confirmed(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: EntityId::remote(id),
            fields,
            origin: Origin::Confirmed,
        }
    }

    pub fn pending(id: LocalId, fields: Fields) -> Self {
        Self {
            id: EntityId::Local(id),
            fields,
            origin: Origin::Pending,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.origin == Origin::Pending
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    /// Members of a set-valued field. A missing or non-array field is empty.
    pub fn string_set(&self, name: &str) -> Vec<String> {
        self.fields
            .get(name)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.as_str().map(str::to_owned))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Parsed timestamp held in `field`, if any
    pub fn timestamp(&self, field: &str) -> Option<DateTime<Utc>> {
        self.str_field(field).and_then(parse_timestamp)
    }
}

/// A document as delivered by (or written to) the remote store
///
/// Serialized flat, `{ "id": ..., <fields> }`, which is also the record shape
/// kept in the local cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteDocument {
    pub id: String,
    #[serde(flatten)]
    pub fields: Fields,
}

impl RemoteDocument {
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }
}

impl From<RemoteDocument> for Entity {
    fn from(document: RemoteDocument) -> Self {
        Entity::confirmed(document.id, document.fields)
    }
}

/// Ordered, renderable contents of one collection
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionView {
    pub kind: CollectionKind,
    pub entities: Vec<Entity>,
    /// Sourced from the local cache; no snapshot has landed yet
    pub provisional: bool,
    /// Bumped on every publish
    pub revision: u64,
}

impl CollectionView {
    pub fn empty(kind: CollectionKind) -> Self {
        Self {
            kind,
            entities: Vec::new(),
            provisional: false,
            revision: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.iter()
    }

    pub fn get(&self, id: &EntityId) -> Option<&Entity> {
        self.entities.iter().find(|entity| &entity.id == id)
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.get(id).is_some()
    }

    pub fn ids(&self) -> Vec<EntityId> {
        self.entities.iter().map(|entity| entity.id.clone()).collect()
    }

    pub fn pending(&self) -> impl Iterator<Item = &Entity> {
        self.entities.iter().filter(|entity| entity.is_pending())
    }

    pub fn confirmed(&self) -> impl Iterator<Item = &Entity> {
        self.entities.iter().filter(|entity| !entity.is_pending())
    }
}
