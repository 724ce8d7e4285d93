//! The boundary between a session and the backend that owns the rows.
//!
//! A store instance is already scoped to one user: its snapshot only returns
//! that user's bookmarks and its writes are checked against that user by the
//! backend. Sessions never filter by owner themselves.

use std::future::Future;

use crate::error::StoreError;
use crate::model::{Bookmark, NewBookmark};

pub trait BookmarkStore: Send + Sync + 'static {
    /// All bookmarks of the current user, newest first.
    fn snapshot(&self) -> impl Future<Output = Result<Vec<Bookmark>, StoreError>> + Send;

    /// Creates a row and returns it with its store-assigned id and timestamp.
    fn create(&self, input: NewBookmark) -> impl Future<Output = Result<Bookmark, StoreError>> + Send;

    fn delete(&self, id: &str) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Pulls remote changes into a local replica before a read. Stores
    /// without a replica have nothing to do.
    fn refresh(&self) -> impl Future<Output = Result<(), StoreError>> + Send {
        async { Ok(()) }
    }
}
