//! SQL Dialect Resolution
//!
//! The engine runs unchanged against PostgreSQL and SQLite; everything the
//! two disagree on is concentrated here and consumed by the template layer.
//! The divergent fragments are the autoincrement primary key, bind
//! placeholder syntax (`$n` vs `?`), the row-lock suffix (`FOR UPDATE` has no
//! SQLite equivalent; its single-writer model covers the same race), and
//! column introspection for additive migrations.

use relstore_core::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    Postgres,
}

impl Dialect {
    /// Resolves the dialect from a DSN. Accepted schemes: `sqlite://<path>`,
    /// `postgres://...`, and the `postgresql://` alias.
    pub fn from_dsn(dsn: &str) -> Result<Self> {
        if dsn.starts_with("sqlite:") {
            Ok(Dialect::Sqlite)
        } else if dsn.starts_with("postgres://") || dsn.starts_with("postgresql://") {
            Ok(Dialect::Postgres)
        } else {
            Err(Error::Invalid(format!(
                "unsupported DSN {dsn:?}: expected sqlite://, postgres://, or postgresql://"
            )))
        }
    }

    /// Primary key column definition. SQLite's AUTOINCREMENT keyword matters:
    /// it forbids rowid reuse after deletion, which the revision log requires.
    pub fn id_column(self) -> &'static str {
        match self {
            Dialect::Sqlite => "id INTEGER PRIMARY KEY AUTOINCREMENT",
            Dialect::Postgres => "id BIGSERIAL PRIMARY KEY",
        }
    }

    /// Bind placeholder for the 1-based argument position.
    pub fn placeholder(self, position: usize) -> String {
        match self {
            Dialect::Sqlite => "?".to_string(),
            Dialect::Postgres => format!("${position}"),
        }
    }

    /// Row-lock suffix for current-revision reads inside write transactions.
    pub fn for_update(self) -> &'static str {
        match self {
            Dialect::Sqlite => "",
            Dialect::Postgres => " FOR UPDATE",
        }
    }

    /// Statement taking a transaction-scoped lock on an opaque key (one
    /// bind). A first-time create has no row for `FOR UPDATE` to lock, so
    /// the key itself is locked before the current-revision read. SQLite
    /// needs no statement: its single-writer transactions refuse the losing
    /// insert outright.
    pub fn key_lock(self) -> Option<&'static str> {
        match self {
            Dialect::Sqlite => None,
            Dialect::Postgres => Some(
                "SELECT 1 AS locked FROM (SELECT pg_advisory_xact_lock(hashtext($1))) AS l",
            ),
        }
    }

    /// Statement listing the existing columns of `table` as `column_name`.
    pub fn columns_query(self, table: &str) -> String {
        match self {
            Dialect::Sqlite => {
                format!("SELECT name AS column_name FROM pragma_table_info('{table}')")
            }
            Dialect::Postgres => format!(
                "SELECT column_name FROM information_schema.columns WHERE table_name = '{table}'"
            ),
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dialect::Sqlite => f.write_str("sqlite"),
            Dialect::Postgres => f.write_str("postgres"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dsn_scheme_resolution() {
        assert_eq!(Dialect::from_dsn("sqlite://data.db").unwrap(), Dialect::Sqlite);
        assert_eq!(
            Dialect::from_dsn("postgres://u:p@localhost/db").unwrap(),
            Dialect::Postgres
        );
        assert_eq!(
            Dialect::from_dsn("postgresql://u:p@localhost/db").unwrap(),
            Dialect::Postgres
        );
        assert!(Dialect::from_dsn("mysql://nope").is_err());
    }

    #[test]
    fn placeholders_differ_per_dialect() {
        assert_eq!(Dialect::Sqlite.placeholder(3), "?");
        assert_eq!(Dialect::Postgres.placeholder(3), "$3");
    }

    #[test]
    fn key_lock_is_postgres_only() {
        assert_eq!(Dialect::Sqlite.key_lock(), None);
        assert!(Dialect::Postgres
            .key_lock()
            .unwrap()
            .contains("pg_advisory_xact_lock"));
    }
}
