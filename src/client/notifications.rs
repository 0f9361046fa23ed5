//! Post notifications
//!
//! Posts written by other users, newest first, capped at a small number.
//! Read state is tracked per post and survives refreshes.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::client::auth::UserId;
use crate::client::sync::reconciliation::order_entities;
use crate::shared::entity::CREATED_AT_FIELD;
use crate::shared::records::USER_ID_FIELD;
use crate::shared::{CollectionKind, CollectionView, EntityId};

/// One notification about a post
#[derive(Debug, Clone, PartialEq)]
pub struct PostNotification {
    pub post_id: EntityId,
    /// `New post: <title>`
    pub message: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub read: bool,
}

/// Notifications about other users' posts
#[derive(Debug, Clone)]
pub struct Inbox {
    limit: usize,
    read: HashSet<EntityId>,
    items: Vec<PostNotification>,
}

impl Inbox {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            read: HashSet::new(),
            items: Vec::new(),
        }
    }

    /// Rebuild the notifications from the posts view
    ///
    /// Posts without an author are skipped, as are the reader's own posts.
    pub fn refresh(&mut self, posts: &CollectionView, reader: &UserId) -> &[PostNotification] {
        let candidates = posts
            .iter()
            .filter(|post| {
                post.str_field(USER_ID_FIELD)
                    .map_or(false, |author| author != reader.as_str())
            })
            .cloned()
            .collect();

        self.items = order_entities(CollectionKind::Posts, candidates)
            .into_iter()
            .take(self.limit)
            .map(|post| PostNotification {
                message: format!("New post: {}", post.str_field("title").unwrap_or_default()),
                timestamp: post.timestamp(CREATED_AT_FIELD),
                read: self.read.contains(&post.id),
                post_id: post.id,
            })
            .collect();
        &self.items
    }

    pub fn notifications(&self) -> &[PostNotification] {
        &self.items
    }

    pub fn unread_count(&self) -> usize {
        self.items.iter().filter(|item| !item.read).count()
    }

    pub fn mark_read(&mut self, post_id: &EntityId) {
        self.read.insert(post_id.clone());
        for item in self.items.iter_mut().filter(|item| &item.post_id == post_id) {
            item.read = true;
        }
    }

    pub fn mark_all_read(&mut self) {
        for item in &mut self.items {
            item.read = true;
            self.read.insert(item.post_id.clone());
        }
    }
}
