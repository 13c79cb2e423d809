//! De-duplication and newest-first ordering of merged result sets.

use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::HashSet;

use crate::models::{Alert, Location};

/// An entity that can be placed on a timeline.
pub trait Timeline {
    /// Stable identity used for de-duplication.
    fn key(&self) -> &str;
    fn instant(&self) -> Option<DateTime<Utc>>;
}

impl Timeline for Alert {
    fn key(&self) -> &str {
        &self.id
    }

    fn instant(&self) -> Option<DateTime<Utc>> {
        self.timestamp
    }
}

impl Timeline for Location {
    fn key(&self) -> &str {
        &self.id
    }

    fn instant(&self) -> Option<DateTime<Utc>> {
        self.timestamp
    }
}

/// Keeps the first occurrence of every key.
pub fn dedupe_by_key<T: Timeline>(items: impl IntoIterator<Item = T>) -> Vec<T> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.key().to_string()))
        .collect()
}

/// Newest first; entries without an instant go last. Stable, so ties keep
/// their input order.
pub fn sort_newest_first<T: Timeline>(items: &mut [T]) {
    items.sort_by(|a, b| match (a.instant(), b.instant()) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
}

/// De-duplicates then sorts newest first.
pub fn merge_newest_first<T: Timeline>(items: impl IntoIterator<Item = T>) -> Vec<T> {
    let mut merged = dedupe_by_key(items);
    sort_newest_first(&mut merged);
    merged
}
