//! Kind Registry
//!
//! The [`Scheme`] maps `(group, version, kind)` coordinates to their static
//! descriptors, giving the REST framework type reflection over everything a
//! server serves.

use std::collections::HashMap;

use relstore_core::{Object, ResourceKind};

#[derive(Debug, Default)]
pub struct Scheme {
    kinds: HashMap<String, &'static ResourceKind>,
}

impl Scheme {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: &'static ResourceKind) -> &mut Self {
        self.kinds.insert(key(kind.group, kind.version, kind.kind), kind);
        self
    }

    pub fn register_object<K: Object>(&mut self) -> &mut Self {
        self.register(K::kind())
    }

    pub fn get(&self, group: &str, version: &str, kind: &str) -> Option<&'static ResourceKind> {
        self.kinds.get(&key(group, version, kind)).copied()
    }

    pub fn contains<K: Object>(&self) -> bool {
        let k = K::kind();
        self.get(k.group, k.version, k.kind).is_some()
    }

    pub fn kinds(&self) -> impl Iterator<Item = &'static ResourceKind> + '_ {
        self.kinds.values().copied()
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

fn key(group: &str, version: &str, kind: &str) -> String {
    format!("{group}/{version}/{kind}")
}

#[cfg(test)]
mod tests {
    use super::*;

    static WIDGETS: ResourceKind = ResourceKind {
        group: "example.com",
        version: "v1",
        kind: "Widget",
        namespaced: true,
        indexed_fields: &[],
    };

    #[test]
    fn register_and_resolve() {
        let mut scheme = Scheme::new();
        scheme.register(&WIDGETS);
        assert_eq!(scheme.get("example.com", "v1", "Widget"), Some(&WIDGETS));
        assert_eq!(scheme.get("example.com", "v2", "Widget"), None);
        assert_eq!(scheme.len(), 1);
    }
}
