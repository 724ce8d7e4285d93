//! One user's live bookmark session.
//!
//! Everything that can touch the list (user commands, feed notifications and
//! completions of store calls) is funnelled into a single queue and applied by
//! one task, one event at a time. Store calls never run inline: they are
//! spawned and post their outcome back to the queue, so notifications keep
//! flowing while a create or delete is in flight.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{SessionError, StoreError, SubmitError};
use crate::feed::{ChangeEvent, ChangeFeed, FeedMessage, Subscription};
use crate::model::{Bookmark, Identity, NewBookmark};
use crate::reconciler::BookmarkList;
use crate::store::BookmarkStore;

const EVENT_QUEUE_CAPACITY: usize = 64;

/// What a front-end renders.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionView {
    pub bookmarks: Vec<Bookmark>,
    /// A submission is waiting on the store; the front-end should not offer
    /// another one.
    pub pending: bool,
}

type SubmitReply = oneshot::Sender<Result<Bookmark, SubmitError>>;
type Reply = oneshot::Sender<Result<(), SessionError>>;

enum Event {
    Submit {
        title: String,
        url: String,
        reply: SubmitReply,
    },
    Delete {
        id: String,
        reply: Reply,
    },
    Resync {
        reply: Reply,
    },
    Remote(ChangeEvent),
    Lagged(u64),
    CreateResolved {
        result: Result<Bookmark, StoreError>,
        reply: SubmitReply,
    },
    DeleteResolved {
        id: String,
        result: Result<(), StoreError>,
        reply: Reply,
    },
    ResyncResolved {
        result: Result<Vec<Bookmark>, StoreError>,
        // set when the re-sync recovers from a failed delete
        cause: Option<StoreError>,
        reply: Option<Reply>,
    },
}

pub struct Session<S> {
    identity: Identity,
    store: Arc<S>,
    list: BookmarkList,
    pending: bool,
    events: mpsc::Sender<Event>,
    view: watch::Sender<SessionView>,
}

impl<S: BookmarkStore> Session<S> {
    /// Subscribes to `feed`, loads the initial snapshot and starts the event
    /// loop. The subscription is taken before the fetch so nothing written in
    /// between is missed; anything seen twice is dropped by id.
    pub async fn start(
        identity: Identity,
        store: Arc<S>,
        feed: &ChangeFeed,
    ) -> Result<SessionHandle, StoreError> {
        let subscription = feed.subscribe(&identity.user_id);
        let snapshot = store.snapshot().await?;

        let mut list = BookmarkList::new();
        list.initialize(snapshot);

        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let (view_tx, view_rx) = watch::channel(SessionView {
            bookmarks: list.bookmarks().to_vec(),
            pending: false,
        });
        let cancel = CancellationToken::new();

        tracing::info!(
            user_id = %identity.user_id,
            bookmarks = list.len(),
            "session started"
        );

        tokio::spawn(forward_changes(
            subscription,
            events_tx.clone(),
            cancel.clone(),
        ));

        let session = Session {
            identity,
            store,
            list,
            pending: false,
            events: events_tx.clone(),
            view: view_tx,
        };
        let task = tokio::spawn(session.run(events_rx, cancel.clone()));

        Ok(SessionHandle {
            events: events_tx,
            view: view_rx,
            cancel,
            task: Some(task),
        })
    }

    async fn run(mut self, mut events: mpsc::Receiver<Event>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => self.handle(event),
                    None => break,
                },
            }
        }
        tracing::info!(user_id = %self.identity.user_id, "session stopped");
    }

    fn handle(&mut self, event: Event) {
        match event {
            Event::Submit { title, url, reply } => self.submit(&title, &url, reply),
            Event::Delete { id, reply } => self.request_delete(id, reply),
            Event::Resync { reply } => self.spawn_resync(None, Some(reply)),
            Event::Remote(ChangeEvent::Insert(bookmark)) => self.remote_insert(bookmark),
            Event::Remote(ChangeEvent::Delete { id }) => {
                if self.list.on_remote_delete(&id) {
                    self.publish_view();
                }
            }
            Event::Lagged(skipped) => {
                tracing::warn!(skipped, "change feed lagged, resyncing");
                self.spawn_resync(None, None);
            }
            Event::CreateResolved { result, reply } => self.create_resolved(result, reply),
            Event::DeleteResolved { id, result, reply } => match result {
                Ok(()) => {
                    tracing::debug!(%id, "delete confirmed");
                    let _ = reply.send(Ok(()));
                }
                Err(e) => {
                    tracing::warn!(%id, error = %e, "delete failed, resyncing");
                    self.spawn_resync(Some(e), Some(reply));
                }
            },
            Event::ResyncResolved {
                result,
                cause,
                reply,
            } => self.resync_resolved(result, cause, reply),
        }
    }

    /// Prepending only keeps the list newest first when the row is newer than
    /// the head. A late notification for an older row (a poll that raced a
    /// local create) is placed by re-fetching instead.
    fn remote_insert(&mut self, bookmark: Bookmark) {
        if self.list.contains(&bookmark.id) {
            return;
        }

        if self.list.is_older_than_head(&bookmark) {
            tracing::info!(id = %bookmark.id, "remote insert older than head, resyncing");
            self.spawn_resync(None, None);
            return;
        }

        if self.list.on_remote_insert(bookmark) {
            self.publish_view();
        }
    }

    fn submit(&mut self, title: &str, url: &str, reply: SubmitReply) {
        if self.pending {
            let _ = reply.send(Err(SubmitError::Pending));
            return;
        }

        let input = match NewBookmark::validate(title, url, &self.identity.user_id) {
            Ok(input) => input,
            Err(e) => {
                let _ = reply.send(Err(e.into()));
                return;
            }
        };

        self.pending = true;
        self.publish_view();

        let store = self.store.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = store.create(input).await;
            let _ = events.send(Event::CreateResolved { result, reply }).await;
        });
    }

    fn create_resolved(&mut self, result: Result<Bookmark, StoreError>, reply: SubmitReply) {
        self.pending = false;

        let outcome = match result {
            Ok(bookmark) => {
                tracing::info!(id = %bookmark.id, "bookmark created");
                self.list.insert(bookmark.clone());
                Ok(bookmark)
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to create bookmark");
                Err(SubmitError::Store(e))
            }
        };

        self.publish_view();
        let _ = reply.send(outcome);
    }

    /// Removes the entry before the store has answered.
    fn request_delete(&mut self, id: String, reply: Reply) {
        if self.list.remove(&id).is_some() {
            self.publish_view();
        }

        let store = self.store.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = store.delete(&id).await;
            let _ = events.send(Event::DeleteResolved { id, result, reply }).await;
        });
    }

    fn spawn_resync(&self, cause: Option<StoreError>, reply: Option<Reply>) {
        let store = self.store.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = store.snapshot().await;
            let _ = events
                .send(Event::ResyncResolved {
                    result,
                    cause,
                    reply,
                })
                .await;
        });
    }

    fn resync_resolved(
        &mut self,
        result: Result<Vec<Bookmark>, StoreError>,
        cause: Option<StoreError>,
        reply: Option<Reply>,
    ) {
        let resynced = match result {
            Ok(snapshot) => {
                tracing::info!(bookmarks = snapshot.len(), "resynced from store");
                self.list.initialize(snapshot);
                self.publish_view();
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "resync failed, keeping local state");
                Err(SessionError::Store(e))
            }
        };

        if let Some(reply) = reply {
            let outcome = match cause {
                Some(cause) => Err(SessionError::Store(cause)),
                None => resynced,
            };
            let _ = reply.send(outcome);
        }
    }

    fn publish_view(&self) {
        self.view.send_replace(SessionView {
            bookmarks: self.list.bookmarks().to_vec(),
            pending: self.pending,
        });
    }
}

async fn forward_changes(
    mut subscription: Subscription,
    events: mpsc::Sender<Event>,
    cancel: CancellationToken,
) {
    loop {
        let message = tokio::select! {
            _ = cancel.cancelled() => break,
            message = subscription.recv() => message,
        };

        let event = match message {
            Some(FeedMessage::Change(change)) => Event::Remote(change),
            Some(FeedMessage::Lagged(skipped)) => Event::Lagged(skipped),
            None => {
                tracing::info!(owner = subscription.owner_id(), "change feed closed");
                break;
            }
        };

        if events.send(event).await.is_err() {
            break;
        }
    }
}

/// Cheap front-end handle to a running [`Session`]. Dropping it stops the
/// session.
pub struct SessionHandle {
    events: mpsc::Sender<Event>,
    view: watch::Receiver<SessionView>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl SessionHandle {
    /// Validates and creates a bookmark. Resolves once the store has answered.
    pub async fn submit(&self, title: &str, url: &str) -> Result<Bookmark, SubmitError> {
        let (reply, rx) = oneshot::channel();
        let event = Event::Submit {
            title: title.to_string(),
            url: url.to_string(),
            reply,
        };
        self.events.send(event).await.map_err(|_| SubmitError::Closed)?;
        rx.await.map_err(|_| SubmitError::Closed)?
    }

    /// Removes `id` right away and deletes it in the store. On a store error
    /// the list has already been replaced by a fresh snapshot when this
    /// returns.
    pub async fn delete(&self, id: &str) -> Result<(), SessionError> {
        let (reply, rx) = oneshot::channel();
        let event = Event::Delete {
            id: id.to_string(),
            reply,
        };
        self.events.send(event).await.map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)?
    }

    /// Replaces the list with a fresh snapshot from the store.
    pub async fn resync(&self) -> Result<(), SessionError> {
        let (reply, rx) = oneshot::channel();
        self.events
            .send(Event::Resync { reply })
            .await
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)?
    }

    pub fn view(&self) -> SessionView {
        self.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.view.clone()
    }

    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "session task failed");
            }
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
