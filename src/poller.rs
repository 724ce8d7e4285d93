use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::feed::{ChangeEvent, ChangeFeed};
use crate::model::Bookmark;
use crate::store::BookmarkStore;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct PollStats {
    pub inserted: i32,
    pub deleted: i32,
}

/// Difference between two snapshots of the same user.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Changes {
    /// Oldest first, so prepending them one by one keeps newest-first order.
    pub inserted: Vec<Bookmark>,
    pub deleted: Vec<String>,
}

impl Changes {
    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.deleted.is_empty()
    }
}

pub fn diff(previous: &[Bookmark], current: &[Bookmark]) -> Changes {
    let seen: HashSet<&str> = previous.iter().map(|b| b.id.as_str()).collect();
    let present: HashSet<&str> = current.iter().map(|b| b.id.as_str()).collect();

    let inserted = current
        .iter()
        .rev()
        .filter(|b| !seen.contains(b.id.as_str()))
        .cloned()
        .collect();

    let deleted = previous
        .iter()
        .filter(|b| !present.contains(b.id.as_str()))
        .map(|b| b.id.clone())
        .collect();

    Changes { inserted, deleted }
}

/// Turns writes made by other processes into feed events by periodically
/// diffing the store's snapshot.
pub struct ChangePoller<S> {
    store: Arc<S>,
    feed: ChangeFeed,
    owner_id: String,
    interval: Duration,
    baseline: Option<Vec<Bookmark>>,
}

impl<S: BookmarkStore> ChangePoller<S> {
    pub fn new(store: Arc<S>, feed: ChangeFeed, owner_id: &str, interval: Duration) -> Self {
        Self {
            store,
            feed,
            owner_id: owner_id.to_string(),
            interval,
            baseline: None,
        }
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Some(stats) = self.poll().await {
                        if stats.inserted > 0 || stats.deleted > 0 {
                            tracing::info!(
                                inserted = stats.inserted,
                                deleted = stats.deleted,
                                "picked up remote changes"
                            );
                        }
                    }
                }
                _ = cancel.cancelled() => {
                    tracing::info!("change poller shutting down");
                    break;
                }
            }
        }
    }

    /// One polling round. The first successful round only records the
    /// baseline. Returns `None` when the snapshot could not be fetched.
    pub async fn poll(&mut self) -> Option<PollStats> {
        if let Err(e) = self.store.refresh().await {
            tracing::warn!(error = %e, "failed to refresh replica");
        }

        let current = match self.store.snapshot().await {
            Ok(current) => current,
            Err(e) => {
                tracing::error!(error = %e, "failed to poll bookmarks");
                return None;
            }
        };

        let changes = self.baseline.as_ref().map(|previous| diff(previous, &current));
        self.baseline = Some(current);
        let Some(changes) = changes else {
            return Some(PollStats::default());
        };

        let mut stats = PollStats::default();
        for bookmark in changes.inserted {
            self.feed.publish(&self.owner_id, ChangeEvent::Insert(bookmark));
            stats.inserted += 1;
        }
        for id in changes.deleted {
            self.feed.publish(&self.owner_id, ChangeEvent::Delete { id });
            stats.deleted += 1;
        }

        Some(stats)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::feed::FeedMessage;
    use crate::reconciler::tests::bookmark;
    use crate::store::fake::FakeStore;

    #[test]
    fn diff_finds_inserts_oldest_first_and_deletes() {
        let previous = vec![bookmark("b2", 2), bookmark("b1", 1)];
        let current = vec![bookmark("b4", 4), bookmark("b3", 3), bookmark("b2", 2)];

        let changes = diff(&previous, &current);

        let inserted: Vec<&str> = changes.inserted.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(inserted, vec!["b3", "b4"]);
        assert_eq!(changes.deleted, vec!["b1".to_string()]);
    }

    #[test]
    fn diff_of_equal_snapshots_is_empty() {
        let rows = vec![bookmark("b1", 1)];
        assert!(diff(&rows, &rows).is_empty());
    }

    #[tokio::test]
    async fn publishes_changes_after_baseline() {
        let feed = ChangeFeed::new(16);
        let mut sub = feed.subscribe("u1");
        let store = Arc::new(FakeStore::new(vec![bookmark("b1", 1)]));
        let mut poller = ChangePoller::new(store.clone(), feed.clone(), "u1", Duration::from_secs(1));

        assert_eq!(poller.poll().await, Some(PollStats::default()));

        store.set_rows(vec![bookmark("b2", 2)]);
        let stats = poller.poll().await.unwrap();

        assert_eq!(stats, PollStats { inserted: 1, deleted: 1 });
        assert_eq!(
            sub.recv().await,
            Some(FeedMessage::Change(ChangeEvent::Insert(bookmark("b2", 2))))
        );
        assert_eq!(
            sub.recv().await,
            Some(FeedMessage::Change(ChangeEvent::Delete { id: "b1".to_string() }))
        );
    }

    #[tokio::test]
    async fn failed_poll_keeps_baseline() {
        let feed = ChangeFeed::new(16);
        let store = Arc::new(FakeStore::new(vec![bookmark("b1", 1)]));
        let mut poller = ChangePoller::new(store.clone(), feed.clone(), "u1", Duration::from_secs(1));
        poller.poll().await;

        store.fail_snapshots.store(true, Ordering::SeqCst);
        assert_eq!(poller.poll().await, None);

        store.fail_snapshots.store(false, Ordering::SeqCst);
        store.set_rows(vec![bookmark("b2", 2), bookmark("b1", 1)]);
        assert_eq!(poller.poll().await, Some(PollStats { inserted: 1, deleted: 0 }));
    }
}
