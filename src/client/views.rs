//! Derived lists for the member directory and the event calendar

use chrono::{DateTime, Utc};

use crate::shared::entity::DATE_FIELD;
use crate::shared::{CollectionView, Entity};

/// Members whose name or department contains `query`, ignoring case
///
/// An empty query matches everyone.
pub fn filter_members<'a>(members: &'a CollectionView, query: &str) -> Vec<&'a Entity> {
    let needle = query.trim().to_lowercase();
    members
        .iter()
        .filter(|member| {
            needle.is_empty()
                || ["name", "department"].iter().any(|field| {
                    member
                        .str_field(field)
                        .map_or(false, |value| value.to_lowercase().contains(&needle))
                })
        })
        .collect()
}

/// Events split around a point in time, each bucket in view order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EventBuckets<'a> {
    /// Dated strictly after `now`
    pub upcoming: Vec<&'a Entity>,
    /// Dated at or before `now`
    pub past: Vec<&'a Entity>,
    /// Missing or unparseable date
    pub undated: Vec<&'a Entity>,
}

impl<'a> EventBuckets<'a> {
    pub fn partition(events: &'a CollectionView, now: DateTime<Utc>) -> Self {
        let mut buckets = Self::default();
        for event in events.iter() {
            match event.timestamp(DATE_FIELD) {
                Some(date) if date > now => buckets.upcoming.push(event),
                Some(_) => buckets.past.push(event),
                None => buckets.undated.push(event),
            }
        }
        buckets
    }
}
