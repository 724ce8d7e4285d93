//! In-process change feed.
//!
//! Stores publish an event after each successful write and the poller
//! publishes changes it discovers from other processes, so a subscriber may
//! see the same change more than once. Delivery is scoped to one owner per
//! subscription.

use tokio::sync::broadcast::{self, error::RecvError};

use crate::model::Bookmark;

pub const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    Insert(Bookmark),
    Delete { id: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedMessage {
    Change(ChangeEvent),
    /// The subscriber fell behind and this many events were dropped.
    Lagged(u64),
}

#[derive(Debug, Clone)]
struct Envelope {
    owner_id: String,
    event: ChangeEvent,
}

#[derive(Debug, Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<Envelope>,
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Returns how many subscriptions the event reached; zero when nobody
    /// is listening.
    pub fn publish(&self, owner_id: &str, event: ChangeEvent) -> usize {
        let envelope = Envelope {
            owner_id: owner_id.to_string(),
            event,
        };
        self.tx.send(envelope).unwrap_or(0)
    }

    pub fn subscribe(&self, owner_id: &str) -> Subscription {
        Subscription {
            owner_id: owner_id.to_string(),
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

pub struct Subscription {
    owner_id: String,
    rx: broadcast::Receiver<Envelope>,
}

impl Subscription {
    /// Next message for this subscription's owner, or `None` once every
    /// publisher is gone.
    pub async fn recv(&mut self) -> Option<FeedMessage> {
        loop {
            match self.rx.recv().await {
                Ok(envelope) if envelope.owner_id == self.owner_id => {
                    return Some(FeedMessage::Change(envelope.event));
                }
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => return Some(FeedMessage::Lagged(skipped)),
                Err(RecvError::Closed) => return None,
            }
        }
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }
}
