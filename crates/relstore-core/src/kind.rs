//! Resource Kind Descriptors
//!
//! A [`ResourceKind`] is the static description of one API resource: its
//! group/version/kind coordinates, whether it is namespaced, and which dotted
//! field paths are materialized into indexed `field_*` columns. Descriptors
//! are `'static` so the engine can hold them without lifetimes; typed kinds
//! return theirs from [`crate::Object::kind`].

/// Static descriptor of one resource kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceKind {
    pub group: &'static str,
    pub version: &'static str,
    pub kind: &'static str,
    /// Namespaced kinds require a namespace on every object; cluster-scoped
    /// kinds reject one.
    pub namespaced: bool,
    /// Dotted paths extracted into `field_*` columns on every write, e.g.
    /// `"status.phase"` or `"metadata.labels.app"`.
    pub indexed_fields: &'static [&'static str],
}

impl ResourceKind {
    /// Table name for this kind, e.g. `example_com_v1_widgets` for
    /// `example.com/v1, Kind=Widget`. Core-only kinds (empty group) drop the
    /// group segment.
    pub fn table_name(&self) -> String {
        let kind = sanitize_identifier(self.kind);
        let version = sanitize_identifier(self.version);
        if self.group.is_empty() {
            format!("{version}_{kind}")
        } else {
            format!("{}_{version}_{kind}", sanitize_identifier(self.group))
        }
    }

    /// `group/version, Kind=Kind` display form used in errors and logs.
    pub fn qualified(&self) -> String {
        if self.group.is_empty() {
            format!("{}, Kind={}", self.version, self.kind)
        } else {
            format!("{}/{}, Kind={}", self.group, self.version, self.kind)
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.qualified())
    }
}

/// Lowercases and maps every non-alphanumeric character to `_` so the result
/// is safe to splice into SQL identifiers.
pub fn sanitize_identifier(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// Column name for an indexed field path: `status.phase` -> `field_status_phase`.
pub fn field_column(path: &str) -> String {
    format!("field_{}", sanitize_identifier(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    static WIDGETS: ResourceKind = ResourceKind {
        group: "example.com",
        version: "v1",
        kind: "Widget",
        namespaced: true,
        indexed_fields: &["status.phase"],
    };

    #[test]
    fn table_name_includes_group_version_kind() {
        assert_eq!(WIDGETS.table_name(), "example_com_v1_widget");
    }

    #[test]
    fn core_group_drops_group_segment() {
        let k = ResourceKind {
            group: "",
            version: "v1",
            kind: "ConfigMap",
            namespaced: true,
            indexed_fields: &[],
        };
        assert_eq!(k.table_name(), "v1_configmap");
    }

    #[test]
    fn field_column_sanitizes_path() {
        assert_eq!(field_column("status.phase"), "field_status_phase");
        assert_eq!(
            field_column("metadata.labels.app"),
            "field_metadata_labels_app"
        );
    }
}
