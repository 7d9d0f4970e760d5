//! Indexed Field Extraction
//!
//! Resolves dotted paths like `status.phase` or `metadata.labels.app`
//! against a serialized object to the string cell stored in the matching
//! `field_*` column. Strings are used verbatim; numbers and booleans take
//! their canonical display form; structured values are not indexable and
//! resolve to `None`.

use serde_json::Value;

/// Resolves `path` against `value`. Returns `None` when any segment is
/// missing or the leaf is not a scalar.
pub fn extract(value: &Value, path: &str) -> Option<String> {
    let mut current = value;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    match current {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
