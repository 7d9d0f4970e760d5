//! SQL Statement Logging
//!
//! Every statement the engine executes is timed and logged: error level on
//! failure (optionally ignoring row-not-found), info level when it exceeds
//! the slow threshold, trace level otherwise. Single-quoted string literals
//! are redacted before the statement text reaches the log so object payloads
//! and selector values never leak; the SQL structure stays visible for
//! debugging.

use std::borrow::Cow;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tracing::{error, info, trace};

/// Matches single-quoted SQL string literals, including escaped quotes (`''`)
/// within them.
static SQL_STRING_LITERAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"'(?:[^']|'')*'").expect("literal redaction regex"));

/// Replaces every single-quoted string literal with `'[REDACTED]'`.
pub fn redact_sql(sql: &str) -> Cow<'_, str> {
    SQL_STRING_LITERAL.replace_all(sql, "'[REDACTED]'")
}

#[derive(Debug, Clone)]
pub struct SqlLogConfig {
    /// Statements slower than this are logged at info level.
    pub slow_threshold: Duration,
    /// Include (redacted) statement text in log output.
    pub log_statements: bool,
    /// Suppress error-level logging for row-not-found results.
    pub ignore_not_found: bool,
}

impl Default for SqlLogConfig {
    fn default() -> Self {
        let slow_ms = std::env::var("RELSTORE_SLOW_QUERY_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(500);

        Self {
            slow_threshold: Duration::from_millis(slow_ms),
            log_statements: true,
            ignore_not_found: true,
        }
    }
}

/// Emits the log record for one executed statement.
pub(crate) fn log_query(
    cfg: &SqlLogConfig,
    sql: &str,
    elapsed: Duration,
    rows: Option<u64>,
    err: Option<&sqlx::Error>,
) {
    let redacted;
    let statement = if cfg.log_statements {
        redacted = redact_sql(sql);
        redacted.as_ref()
    } else {
        ""
    };
    let elapsed_ms = elapsed.as_millis() as u64;

    if let Some(err) = err {
        if cfg.ignore_not_found && matches!(err, sqlx::Error::RowNotFound) {
            return;
        }
        error!(%err, elapsed_ms, sql = statement, "sql query error");
        return;
    }

    if elapsed > cfg.slow_threshold {
        info!(elapsed_ms, rows, sql = statement, "sql query slow");
        return;
    }

    trace!(elapsed_ms, rows, sql = statement, "sql query executed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_string_literals() {
        let cases = [
            (
                "SELECT * FROM users WHERE name = 'John Doe'",
                "SELECT * FROM users WHERE name = '[REDACTED]'",
            ),
            (
                "INSERT INTO users (name, email) VALUES ('John', 'john@example.com')",
                "INSERT INTO users (name, email) VALUES ('[REDACTED]', '[REDACTED]')",
            ),
            (
                "SELECT * FROM users WHERE name = ''",
                "SELECT * FROM users WHERE name = '[REDACTED]'",
            ),
            (
                "INSERT INTO users (name) VALUES ('O''Brien')",
                "INSERT INTO users (name) VALUES ('[REDACTED]')",
            ),
            (
                "SELECT * FROM users WHERE id = 123",
                "SELECT * FROM users WHERE id = 123",
            ),
            ("SELECT 'foo' || 'bar'", "SELECT '[REDACTED]' || '[REDACTED]'"),
            (
                "SELECT * FROM users WHERE role IN ('admin', 'user')",
                "SELECT * FROM users WHERE role IN ('[REDACTED]', '[REDACTED]')",
            ),
            (
                "INSERT INTO data (json) VALUES ('{\"key\": \"value\"}')",
                "INSERT INTO data (json) VALUES ('[REDACTED]')",
            ),
            ("", ""),
        ];
        for (input, expected) in cases {
            assert_eq!(redact_sql(input), expected, "input: {input}");
        }
    }

    #[test]
    fn redacts_literals_with_newlines() {
        assert_eq!(
            redact_sql("INSERT INTO t (c) VALUES ('line 1\nline 2')"),
            "INSERT INTO t (c) VALUES ('[REDACTED]')"
        );
    }
}
