//! SQL Template Registry
//!
//! Every statement the engine executes is rendered here from a
//! [`TableContext`]: the per-resource table name, the declared indexed field
//! columns, and the dialect. Statements are runtime-rendered rather than
//! compile-time checked because tables and `field_*` columns are created
//! dynamically per resource kind; binds are collected as [`SqlParam`] values
//! alongside the text so placeholder numbering stays correct on PostgreSQL.
//!
//! Table and column names are sanitized identifiers
//! ([`relstore_core::kind::sanitize_identifier`]) and are spliced into the
//! text directly; all object-controlled values go through binds.

use relstore_core::kind::{field_column, sanitize_identifier};
use relstore_core::ResourceKind;

use crate::dialect::Dialect;

/// Columns common to every revision row, in select order.
pub const REVISION_COLUMNS: [&str; 8] = [
    "id",
    "name",
    "namespace",
    "uid",
    "previous_id",
    "created",
    "deleted",
    "value",
];

/// Name of the singleton watermark table shared by all resource tables.
pub const COMPACTION_TABLE: &str = "compaction";

/// A bind value paired with rendered SQL.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    BigInt(i64),
    Text(String),
    Null,
}

/// Per-resource rendering context.
#[derive(Debug, Clone)]
pub struct TableContext {
    pub table: String,
    pub dialect: Dialect,
    /// Declared indexed field paths, e.g. `status.phase`.
    pub field_paths: Vec<String>,
    /// `field_*` column names aligned with `field_paths`.
    pub field_columns: Vec<String>,
}

/// Inputs for rendering a snapshot list query.
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    /// Revision the page is pinned to; rows newer than this are invisible.
    pub snapshot: i64,
    /// Restrict to one namespace when non-empty.
    pub namespace: String,
    /// Resume after this `(namespace, name)` key (from a continue token).
    pub after: Option<(String, String)>,
    /// Indexed equality predicates as `(column, value)` pairs.
    pub pushdown: Vec<(String, String)>,
    pub limit: i64,
}

/// Inputs for rendering a watch catch-up query.
#[derive(Debug, Clone, Default)]
pub struct SinceQuery {
    pub cursor: i64,
    pub namespace: String,
    pub pushdown: Vec<(String, String)>,
    pub limit: i64,
}

impl TableContext {
    pub fn new(kind: &ResourceKind, dialect: Dialect) -> Self {
        let field_paths: Vec<String> =
            kind.indexed_fields.iter().map(|p| p.to_string()).collect();
        let field_columns = field_paths.iter().map(|p| field_column(p)).collect();
        Self {
            table: kind.table_name(),
            dialect,
            field_paths,
            field_columns,
        }
    }

    pub fn create_table(&self) -> String {
        let mut columns = vec![
            self.dialect.id_column().to_string(),
            "name TEXT NOT NULL".to_string(),
            "namespace TEXT NOT NULL".to_string(),
            "uid TEXT NOT NULL".to_string(),
            "previous_id BIGINT".to_string(),
            "created BIGINT".to_string(),
            "deleted BIGINT NOT NULL DEFAULT 0".to_string(),
            "value TEXT NOT NULL".to_string(),
        ];
        for col in &self.field_columns {
            columns.push(format!("{col} TEXT"));
        }
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            self.table,
            columns.join(", ")
        )
    }

    /// Key lookup and successor uniqueness. Field-column indexes are created
    /// separately, after the additive column migration has run.
    pub fn create_base_indexes(&self) -> Vec<String> {
        let t = &self.table;
        vec![
            format!("CREATE INDEX IF NOT EXISTS idx_{t}_key ON {t} (namespace, name, id DESC)"),
            format!("CREATE UNIQUE INDEX IF NOT EXISTS uq_{t}_previous ON {t} (previous_id)"),
        ]
    }

    pub fn create_field_index(&self, column: &str) -> String {
        let t = &self.table;
        format!("CREATE INDEX IF NOT EXISTS idx_{t}_{column} ON {t} ({column})")
    }

    pub fn add_field_column(&self, column: &str) -> String {
        format!("ALTER TABLE {} ADD COLUMN {} TEXT", self.table, column)
    }

    pub fn columns_query(&self) -> String {
        self.dialect.columns_query(&self.table)
    }

    /// Insert one revision row. Bind order: name, namespace, uid,
    /// previous_id, created, deleted, value, then one bind per field column.
    pub fn insert(&self) -> String {
        let mut columns: Vec<&str> = vec![
            "name",
            "namespace",
            "uid",
            "previous_id",
            "created",
            "deleted",
            "value",
        ];
        for col in &self.field_columns {
            columns.push(col.as_str());
        }
        let mut b = SqlBuilder::new(self.dialect);
        b.push(&format!(
            "INSERT INTO {} ({}) VALUES (",
            self.table,
            columns.join(", ")
        ));
        for i in 0..columns.len() {
            if i > 0 {
                b.push(", ");
            }
            b.param();
        }
        b.push(") RETURNING id");
        b.finish()
    }

    /// Latest revision (live or tombstone) for one key. Binds: namespace, name.
    pub fn current(&self, lock: bool) -> String {
        let mut b = SqlBuilder::new(self.dialect);
        b.push(&format!(
            "SELECT {} FROM {} WHERE namespace = ",
            REVISION_COLUMNS.join(", "),
            self.table
        ));
        b.param();
        b.push(" AND name = ");
        b.param();
        b.push(" ORDER BY id DESC LIMIT 1");
        if lock {
            b.push(self.dialect.for_update());
        }
        b.finish()
    }

    /// Highest id ever assigned in this table, 0 when empty.
    pub fn max_id(&self) -> String {
        format!("SELECT COALESCE(MAX(id), 0) AS id FROM {}", self.table)
    }

    /// Snapshot list of current live revisions as of `q.snapshot`, ordered by
    /// `(namespace, name)`.
    pub fn list(&self, q: &ListQuery) -> (String, Vec<SqlParam>) {
        let t = &self.table;
        let mut b = SqlBuilder::new(self.dialect);
        let mut params = Vec::new();

        b.push(&format!(
            "SELECT {} FROM {t} AS r WHERE r.deleted = 0 AND r.id = \
             (SELECT MAX(id) FROM {t} WHERE namespace = r.namespace AND name = r.name AND id <= ",
            qualified_columns("r")
        ));
        b.param();
        params.push(SqlParam::BigInt(q.snapshot));
        b.push(")");

        if !q.namespace.is_empty() {
            b.push(" AND r.namespace = ");
            b.param();
            params.push(SqlParam::Text(q.namespace.clone()));
        }

        if let Some((ns, name)) = &q.after {
            b.push(" AND (r.namespace > ");
            b.param();
            params.push(SqlParam::Text(ns.clone()));
            b.push(" OR (r.namespace = ");
            b.param();
            params.push(SqlParam::Text(ns.clone()));
            b.push(" AND r.name > ");
            b.param();
            params.push(SqlParam::Text(name.clone()));
            b.push("))");
        }

        for (col, value) in &q.pushdown {
            b.push(&format!(" AND r.{col} = "));
            b.param();
            params.push(SqlParam::Text(value.clone()));
        }

        b.push(" ORDER BY r.namespace, r.name LIMIT ");
        b.param();
        params.push(SqlParam::BigInt(q.limit));

        (b.finish(), params)
    }

    /// Revisions newer than the cursor, oldest first, for watch catch-up.
    pub fn since(&self, q: &SinceQuery) -> (String, Vec<SqlParam>) {
        let mut b = SqlBuilder::new(self.dialect);
        let mut params = Vec::new();

        b.push(&format!(
            "SELECT {} FROM {} WHERE id > ",
            REVISION_COLUMNS.join(", "),
            self.table
        ));
        b.param();
        params.push(SqlParam::BigInt(q.cursor));

        if !q.namespace.is_empty() {
            b.push(" AND namespace = ");
            b.param();
            params.push(SqlParam::Text(q.namespace.clone()));
        }

        for (col, value) in &q.pushdown {
            b.push(&format!(" AND {col} = "));
            b.param();
            params.push(SqlParam::Text(value.clone()));
        }

        b.push(" ORDER BY id ASC LIMIT ");
        b.param();
        params.push(SqlParam::BigInt(q.limit));

        (b.finish(), params)
    }

    /// Highest id among superseded revisions: the watermark candidate.
    pub fn watermark_candidate(&self) -> String {
        let t = &self.table;
        format!(
            "SELECT MAX(r.id) AS id FROM {t} AS r \
             WHERE EXISTS (SELECT 1 FROM {t} AS s WHERE s.previous_id = r.id)"
        )
    }

    /// Deletes superseded revisions at or below the watermark. Bind: watermark.
    pub fn compaction_delete(&self) -> String {
        let t = &self.table;
        let mut b = SqlBuilder::new(self.dialect);
        b.push(&format!("DELETE FROM {t} WHERE id <= "));
        b.param();
        b.push(&format!(
            " AND EXISTS (SELECT 1 FROM {t} AS s WHERE s.previous_id = {t}.id)"
        ));
        b.finish()
    }
}

/// Maps a declared field path to its pushdown column, if indexed.
impl TableContext {
    pub fn indexed_column(&self, path: &str) -> Option<&str> {
        self.field_paths
            .iter()
            .position(|p| p == path)
            .map(|i| self.field_columns[i].as_str())
    }
}

pub fn create_compaction_table() -> String {
    format!("CREATE TABLE IF NOT EXISTS {COMPACTION_TABLE} (name TEXT PRIMARY KEY, id BIGINT NOT NULL)")
}

/// Bind: table name.
pub fn select_watermark(dialect: Dialect) -> String {
    let mut b = SqlBuilder::new(dialect);
    b.push(&format!("SELECT id FROM {COMPACTION_TABLE} WHERE name = "));
    b.param();
    b.finish()
}

/// Binds: table name, watermark. The upsert syntax is shared by both dialects.
pub fn upsert_watermark(dialect: Dialect) -> String {
    let mut b = SqlBuilder::new(dialect);
    b.push(&format!("INSERT INTO {COMPACTION_TABLE} (name, id) VALUES ("));
    b.param();
    b.push(", ");
    b.param();
    b.push(") ON CONFLICT(name) DO UPDATE SET id = excluded.id");
    b.finish()
}

fn qualified_columns(alias: &str) -> String {
    REVISION_COLUMNS
        .iter()
        .map(|c| format!("{alias}.{c}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Appends fragments and dialect-correct positional placeholders.
struct SqlBuilder {
    sql: String,
    dialect: Dialect,
    args: usize,
}

impl SqlBuilder {
    fn new(dialect: Dialect) -> Self {
        Self {
            sql: String::new(),
            dialect,
            args: 0,
        }
    }

    fn push(&mut self, fragment: &str) {
        self.sql.push_str(fragment);
    }

    fn param(&mut self) {
        self.args += 1;
        let p = self.dialect.placeholder(self.args);
        self.sql.push_str(&p);
    }

    fn finish(self) -> String {
        self.sql
    }
}

/// Guard against a field path that would render an unsafe column name; the
/// descriptor is static so this is a programming error, caught at table
/// creation.
pub fn assert_safe_identifier(name: &str) {
    debug_assert_eq!(name, sanitize_identifier(name));
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
    fn create_table_carries_field_columns() {
        let ctx = TableContext::new(&WIDGETS, Dialect::Sqlite);
        let sql = ctx.create_table();
        assert!(sql.contains("field_status_phase TEXT"));
        assert!(sql.contains("id INTEGER PRIMARY KEY AUTOINCREMENT"));

        let ctx = TableContext::new(&WIDGETS, Dialect::Postgres);
        assert!(ctx.create_table().contains("id BIGSERIAL PRIMARY KEY"));
    }

    #[test]
    fn insert_placeholders_are_positional_on_postgres() {
        let ctx = TableContext::new(&WIDGETS, Dialect::Postgres);
        let sql = ctx.insert();
        assert!(sql.contains("$1"));
        assert!(sql.contains("$8"), "field column bind missing: {sql}");
        assert!(sql.ends_with("RETURNING id"));
    }

    #[test]
    fn list_pushes_indexed_predicates_into_sql() {
        let ctx = TableContext::new(&WIDGETS, Dialect::Sqlite);
        let (sql, params) = ctx.list(&ListQuery {
            snapshot: 100,
            namespace: "default".into(),
            after: None,
            pushdown: vec![("field_status_phase".into(), "Running".into())],
            limit: 11,
        });
        assert!(sql.contains("r.field_status_phase = ?"));
        assert!(sql.contains("ORDER BY r.namespace, r.name"));
        assert_eq!(
            params,
            vec![
                SqlParam::BigInt(100),
                SqlParam::Text("default".into()),
                SqlParam::Text("Running".into()),
                SqlParam::BigInt(11),
            ]
        );
    }

    #[test]
    fn list_keyset_resume_renders_row_comparison() {
        let ctx = TableContext::new(&WIDGETS, Dialect::Postgres);
        let (sql, params) = ctx.list(&ListQuery {
            snapshot: 9,
            namespace: String::new(),
            after: Some(("default".into(), "w100".into())),
            pushdown: Vec::new(),
            limit: 5,
        });
        assert!(sql.contains("r.namespace > $2 OR (r.namespace = $3 AND r.name > $4)"));
        assert_eq!(params.len(), 5);
    }

    #[test]
    fn since_orders_by_id() {
        let ctx = TableContext::new(&WIDGETS, Dialect::Sqlite);
        let (sql, _) = ctx.since(&SinceQuery {
            cursor: 7,
            namespace: "default".into(),
            pushdown: Vec::new(),
            limit: 500,
        });
        assert!(sql.contains("WHERE id > ?"));
        assert!(sql.contains("ORDER BY id ASC"));
    }

    #[test]
    fn compaction_delete_spares_rows_without_successor() {
        let ctx = TableContext::new(&WIDGETS, Dialect::Sqlite);
        let sql = ctx.compaction_delete();
        assert!(sql.contains("EXISTS"));
        assert!(sql.contains("previous_id"));
    }
}
