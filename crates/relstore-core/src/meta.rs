//! Object Metadata and the Storage Object Trait
//!
//! Every stored object carries an [`ObjectMeta`] block mirroring the
//! Kubernetes wire shape (camelCase JSON). The storage engine treats objects
//! as opaque payloads plus this metadata: identity `(namespace, name)`, the
//! chain-stable `uid`, and the `resourceVersion` string form of the revision
//! id used for optimistic concurrency and watch cursors.
//!
//! Typed behavior is supplied through the [`Object`] trait implemented by
//! each resource kind; [`StorageObject`] adds the serde bounds the engine
//! needs and is blanket-implemented.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::kind::ResourceKind;

/// System metadata common to all stored objects.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ObjectMeta {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,

    /// Owning namespace, or empty for cluster-scoped kinds.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub namespace: String,

    /// Stable per-object identity. Unchanged across revisions of the same
    /// object; a re-created object gets a fresh uid.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub uid: String,

    /// String form of the revision id. Empty on objects that have never been
    /// persisted; required to match the current revision on update/delete.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub resource_version: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "is_zero")]
    pub generation: i64,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

fn is_zero(v: &i64) -> bool {
    *v == 0
}

/// A typed resource the engine can persist.
pub trait Object: Clone + Send + Sync + 'static {
    /// Static descriptor for this kind: group/version/kind, scope, and the
    /// fields materialized into indexed columns.
    fn kind() -> &'static ResourceKind
    where
        Self: Sized;

    fn metadata(&self) -> &ObjectMeta;

    fn metadata_mut(&mut self) -> &mut ObjectMeta;

    fn name(&self) -> &str {
        &self.metadata().name
    }

    fn namespace(&self) -> &str {
        &self.metadata().namespace
    }

    fn resource_version(&self) -> &str {
        &self.metadata().resource_version
    }
}

/// The full bound set the storage engine requires of an object type.
pub trait StorageObject: Object + Serialize + DeserializeOwned {}

impl<T> StorageObject for T where T: Object + Serialize + DeserializeOwned {}

/// A page of objects returned by a list call.
///
/// `resource_version` is the snapshot id the page was cut at; every page of
/// one paginated iteration carries the same value. `continue_token` is set
/// when more results may follow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(bound(serialize = "K: Serialize", deserialize = "K: DeserializeOwned"))]
pub struct ObjectList<K> {
    pub items: Vec<K>,
    pub resource_version: String,
    #[serde(rename = "continue", skip_serializing_if = "Option::is_none")]
    pub continue_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_item_count: Option<i64>,
}

impl<K> Default for ObjectList<K> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            resource_version: String::new(),
            continue_token: None,
            remaining_item_count: None,
        }
    }
}
