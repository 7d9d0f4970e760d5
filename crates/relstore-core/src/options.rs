//! List, Watch, and Delete Options
//!
//! [`ListOptions`] carries every knob a list or watch call recognizes,
//! matching the REST surface one-to-one. [`ContinueToken`] is the opaque
//! pagination cursor: a URL-safe unpadded base64 encoding of the snapshot
//! revision plus the last `(namespace, name)` returned, so subsequent pages
//! pin to the same consistent cut.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::selector::{FieldSelector, LabelSelector};

/// How an explicit `resourceVersion` constrains a list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResourceVersionMatch {
    #[default]
    Unset,
    /// Serve any state at least as new as the given revision.
    NotOlderThan,
    /// Serve the state exactly as of the given revision; fails `Expired` if
    /// that revision has been compacted.
    Exact,
}

/// Options recognized by list and watch calls.
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    /// Snapshot anchor: `""`, `"0"`, or an explicit revision id.
    pub resource_version: String,
    pub resource_version_match: ResourceVersionMatch,
    /// Maximum items per page; 0 means unlimited.
    pub limit: i64,
    /// Opaque pagination cursor from a previous page.
    pub continue_token: Option<String>,
    pub label_selector: Option<LabelSelector>,
    pub field_selector: Option<FieldSelector>,
    /// Permit BOOKMARK events in the watch stream.
    pub allow_watch_bookmarks: bool,
    /// Request the initial snapshot as ADDED events terminated by an
    /// initial-events-end bookmark.
    pub send_initial_events: Option<bool>,
    /// If true and the namespace is empty, list across namespaces.
    pub recursive: bool,
    /// Emit periodic bookmarks during long waits.
    pub progress_notify: bool,
}

impl ListOptions {
    /// True when the resource version requests the latest committed state.
    pub fn is_fresh(&self) -> bool {
        self.resource_version.is_empty() || self.resource_version == "0"
    }
}

/// Preconditions a delete must satisfy against the current revision.
#[derive(Debug, Clone, Default)]
pub struct Preconditions {
    pub uid: Option<String>,
    pub resource_version: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct DeleteOptions {
    pub preconditions: Option<Preconditions>,
}

/// Decoded pagination cursor. Opaque to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContinueToken {
    /// Snapshot revision every page of this iteration is pinned to.
    #[serde(rename = "rv")]
    pub resource_version: i64,
    #[serde(rename = "ns")]
    pub namespace: String,
    #[serde(rename = "n")]
    pub name: String,
}

impl ContinueToken {
    pub fn encode(&self) -> String {
        // Serializing a struct of strings and an integer cannot fail.
        let json = serde_json::to_vec(self).expect("continue token serialization");
        URL_SAFE_NO_PAD.encode(json)
    }

    pub fn decode(token: &str) -> Result<Self> {
        let json = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|_| Error::Invalid("malformed continue token".into()))?;
        serde_json::from_slice(&json)
            .map_err(|_| Error::Invalid("malformed continue token".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn continue_token_round_trips() {
        let token = ContinueToken {
            resource_version: 42,
            namespace: "default".into(),
            name: "w1".into(),
        };
        let encoded = token.encode();
        assert_eq!(ContinueToken::decode(&encoded).unwrap(), token);
    }

    #[test]
    fn continue_token_rejects_garbage() {
        assert!(ContinueToken::decode("not base64 at all!!!").is_err());
        let bad = URL_SAFE_NO_PAD.encode(b"{\"rv\":\"nope\"}");
        assert!(ContinueToken::decode(&bad).is_err());
    }

    #[test]
    fn fresh_resource_versions() {
        let mut opts = ListOptions::default();
        assert!(opts.is_fresh());
        opts.resource_version = "0".into();
        assert!(opts.is_fresh());
        opts.resource_version = "17".into();
        assert!(!opts.is_fresh());
    }
}
