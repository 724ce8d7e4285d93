use std::error::Error;

pub mod command;
pub mod config;
pub mod db;
pub mod display;
pub mod error;
pub mod feed;
pub mod model;
pub mod poller;
pub mod reconciler;
pub mod session;
pub mod store;

pub fn unpack_error(err: &(dyn Error)) -> String {
    let mut parts = Vec::new();
    parts.push(err.to_string());
    let mut current = err.source();
    while let Some(source) = current {
        parts.push(source.to_string());
        current = source.source();
    }
    parts.join(": ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{StoreError, SubmitError};

    #[test]
    fn unpack_error_walks_sources() {
        let err = SubmitError::Store(StoreError::Rejected("duplicate key".to_string()));
        assert_eq!(unpack_error(&err), "store rejected the request: duplicate key");

        let err = Wrapped(StoreError::Unavailable("offline".to_string()));
        assert_eq!(unpack_error(&err), "loading bookmarks: store unavailable: offline");
    }

    #[derive(Debug, thiserror::Error)]
    #[error("loading bookmarks")]
    struct Wrapped(#[source] StoreError);
}
