//! Object Payload Codec
//!
//! Objects are persisted as JSON text in the `value` column. The stored
//! payload never contains a `resourceVersion`: the revision row's id is
//! authoritative and is re-attached on every read, so a revision's payload
//! stays byte-stable however many times it is re-read or re-listed.

use serde_json::Value;

use crate::error::{Error, Result};
use crate::meta::StorageObject;

/// Serializes an object for storage, stripping the resource version from the
/// payload. Returns the JSON text together with the parsed value the field
/// extractor runs against.
pub fn encode<K: StorageObject>(obj: &K) -> Result<(String, Value)> {
    let mut value = serde_json::to_value(obj)?;
    if let Some(meta) = value.get_mut("metadata").and_then(Value::as_object_mut) {
        meta.remove("resourceVersion");
    }
    let payload = serde_json::to_string(&value)?;
    Ok((payload, value))
}

/// Deserializes a stored payload and binds the revision id as the object's
/// resource version.
pub fn decode<K: StorageObject>(payload: &str, id: i64) -> Result<K> {
    let mut obj: K = serde_json::from_str(payload)
        .map_err(|e| Error::internal(format!("stored payload does not decode: {e}")))?;
    obj.metadata_mut().resource_version = id.to_string();
    Ok(obj)
}
