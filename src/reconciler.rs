//! Bookmark list reconciliation.
//!
//! [`BookmarkList`] holds the signed-in user's bookmarks newest first and
//! merges the three sources that can change it: the initial snapshot, local
//! user actions, and change notifications pushed by the backend. Every
//! operation runs to completion synchronously; the async plumbing around it
//! lives in [`crate::session`].
//!
//! Two rules keep the list consistent no matter how those sources interleave:
//!
//! - inserts are deduplicated by id, first arrival wins
//! - removals of an absent id are no-ops

use std::collections::HashSet;

use crate::model::Bookmark;

#[derive(Debug, Default, Clone)]
pub struct BookmarkList {
    items: Vec<Bookmark>,
}

impl BookmarkList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole list with an authoritative snapshot. Used for the
    /// initial load and for every re-sync.
    ///
    /// Repeated ids in the snapshot keep their first occurrence.
    pub fn initialize(&mut self, snapshot: Vec<Bookmark>) {
        let mut seen = HashSet::with_capacity(snapshot.len());
        self.items = snapshot
            .into_iter()
            .filter(|b| seen.insert(b.id.clone()))
            .collect();
        tracing::debug!(count = self.items.len(), "bookmark list initialized");
    }

    /// Prepends `bookmark` unless an entry with the same id is already held.
    /// Returns whether the list changed.
    ///
    /// Both a confirmed local create and a remote insert notification land
    /// here, so whichever arrives second is dropped.
    pub fn insert(&mut self, bookmark: Bookmark) -> bool {
        if self.contains(&bookmark.id) {
            tracing::debug!(id = %bookmark.id, "duplicate insert ignored");
            return false;
        }

        self.items.insert(0, bookmark);
        true
    }

    /// Removes the entry with `id`. Returns the removed bookmark, or `None`
    /// when it was not held.
    pub fn remove(&mut self, id: &str) -> Option<Bookmark> {
        let position = self.items.iter().position(|b| b.id == id)?;
        Some(self.items.remove(position))
    }

    pub fn on_remote_insert(&mut self, bookmark: Bookmark) -> bool {
        self.insert(bookmark)
    }

    pub fn on_remote_delete(&mut self, id: &str) -> bool {
        self.remove(id).is_some()
    }

    /// True when `bookmark` is older than the current head, so prepending it
    /// would break newest-first order.
    pub fn is_older_than_head(&self, bookmark: &Bookmark) -> bool {
        self.items
            .first()
            .is_some_and(|head| bookmark.created_at < head.created_at)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.items.iter().any(|b| b.id == id)
    }

    pub fn get(&self, id: &str) -> Option<&Bookmark> {
        self.items.iter().find(|b| b.id == id)
    }

    pub fn bookmarks(&self) -> &[Bookmark] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    pub(crate) fn bookmark(id: &str, minutes: i64) -> Bookmark {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        Bookmark {
            id: id.to_string(),
            owner_id: "u1".to_string(),
            title: format!("title {id}"),
            url: format!("https://example.com/{id}"),
            created_at: base + Duration::minutes(minutes),
        }
    }

    fn ids(list: &BookmarkList) -> Vec<&str> {
        list.bookmarks().iter().map(|b| b.id.as_str()).collect()
    }

    #[test]
    fn remote_insert_prepends_to_snapshot() {
        let mut list = BookmarkList::new();
        list.initialize(vec![bookmark("b3", 3), bookmark("b2", 2), bookmark("b1", 1)]);

        assert!(list.on_remote_insert(bookmark("b4", 4)));
        assert_eq!(ids(&list), vec!["b4", "b3", "b2", "b1"]);
    }

    #[test]
    fn repeated_inserts_keep_one_entry() {
        let mut list = BookmarkList::new();
        list.initialize(vec![bookmark("b1", 1)]);

        assert!(list.insert(bookmark("A", 5)));
        for _ in 0..3 {
            assert!(!list.on_remote_insert(bookmark("A", 5)));
        }

        assert_eq!(ids(&list), vec!["A", "b1"]);
    }

    #[test]
    fn first_insert_wins() {
        let mut list = BookmarkList::new();
        let mut first = bookmark("A", 5);
        first.title = "first".to_string();
        let mut second = bookmark("A", 5);
        second.title = "second".to_string();

        list.on_remote_insert(first);
        list.insert(second);

        assert_eq!(list.len(), 1);
        assert_eq!(list.get("A").unwrap().title, "first");
    }

    #[test]
    fn remote_delete_is_idempotent() {
        let mut list = BookmarkList::new();
        list.initialize(vec![bookmark("b2", 2), bookmark("b1", 1)]);

        assert!(!list.on_remote_delete("missing"));
        assert_eq!(ids(&list), vec!["b2", "b1"]);

        assert!(list.on_remote_delete("b2"));
        assert!(!list.on_remote_delete("b2"));
        assert_eq!(ids(&list), vec!["b1"]);
    }

    #[test]
    fn initialize_replaces_state() {
        let mut list = BookmarkList::new();
        list.initialize(vec![bookmark("b1", 1)]);
        list.insert(bookmark("b2", 2));

        list.initialize(vec![bookmark("b9", 9)]);

        assert_eq!(ids(&list), vec!["b9"]);
        assert!(!list.contains("b2"));
    }

    #[test]
    fn initialize_drops_repeated_ids() {
        let mut list = BookmarkList::new();
        let mut repeat = bookmark("b2", 2);
        repeat.title = "later copy".to_string();

        list.initialize(vec![bookmark("b2", 2), bookmark("b1", 1), repeat]);

        assert_eq!(ids(&list), vec!["b2", "b1"]);
        assert_eq!(list.get("b2").unwrap().title, "title b2");
    }

    #[test]
    fn detects_inserts_older_than_head() {
        let mut list = BookmarkList::new();
        assert!(!list.is_older_than_head(&bookmark("b1", 1)));

        list.initialize(vec![bookmark("b5", 5)]);
        assert!(list.is_older_than_head(&bookmark("b3", 3)));
        assert!(!list.is_older_than_head(&bookmark("b6", 6)));
    }

    #[test]
    fn remove_returns_removed_entry() {
        let mut list = BookmarkList::new();
        list.initialize(vec![bookmark("b2", 2), bookmark("b1", 1)]);

        let removed = list.remove("b1").unwrap();
        assert_eq!(removed.id, "b1");
        assert!(list.remove("b1").is_none());
        assert!(!list.is_empty());
    }
}
