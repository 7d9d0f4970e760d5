//! Watch Events
//!
//! The typed event stream a watcher receives. Within one table events arrive
//! in strict revision order; BOOKMARK events carry only a resource version
//! and mark either the end of the initial snapshot or a keepalive during a
//! long wait.

use crate::error::Error;

#[derive(Debug)]
pub enum WatchEvent<K> {
    /// Object created, or part of the initial snapshot.
    Added(K),
    /// Object updated.
    Modified(K),
    /// Object deleted; the payload is the tombstoned revision's object.
    Deleted(K),
    /// Progress marker. `initial_events_end` is set on the bookmark that
    /// terminates the initial snapshot of a list-watch consumer.
    Bookmark {
        resource_version: i64,
        initial_events_end: bool,
    },
    /// Terminal stream error.
    Error(Error),
}

impl<K> WatchEvent<K> {
    /// The wire-level event type string.
    pub fn type_str(&self) -> &'static str {
        match self {
            WatchEvent::Added(_) => "ADDED",
            WatchEvent::Modified(_) => "MODIFIED",
            WatchEvent::Deleted(_) => "DELETED",
            WatchEvent::Bookmark { .. } => "BOOKMARK",
            WatchEvent::Error(_) => "ERROR",
        }
    }

    pub fn object(&self) -> Option<&K> {
        match self {
            WatchEvent::Added(obj) | WatchEvent::Modified(obj) | WatchEvent::Deleted(obj) => {
                Some(obj)
            }
            _ => None,
        }
    }
}
