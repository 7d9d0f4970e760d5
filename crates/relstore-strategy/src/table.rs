//! Human-Readable Table Output
//!
//! Renders objects into the column/row shape CLI clients print. Kinds plug
//! in a [`TableConvertor`] for domain-specific columns; the default shows
//! Name and Created At.

use relstore_core::Object;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableColumn {
    pub name: String,
    /// Display type hint: `string`, `date`, `integer`.
    pub kind: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableRow {
    pub cells: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Table {
    pub columns: Vec<TableColumn>,
    pub rows: Vec<TableRow>,
}

pub trait TableConvertor<K>: Send + Sync {
    fn columns(&self) -> Vec<TableColumn>;
    fn row(&self, obj: &K) -> TableRow;
}

/// Name / Created At, matching what every kind can answer.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultTableConvertor;

impl<K: Object> TableConvertor<K> for DefaultTableConvertor {
    fn columns(&self) -> Vec<TableColumn> {
        vec![
            TableColumn {
                name: "Name".to_string(),
                kind: "string".to_string(),
            },
            TableColumn {
                name: "Created At".to_string(),
                kind: "date".to_string(),
            },
        ]
    }

    fn row(&self, obj: &K) -> TableRow {
        let created = obj
            .metadata()
            .creation_timestamp
            .map(|t| t.to_rfc3339())
            .unwrap_or_default();
        TableRow {
            cells: vec![obj.name().to_string(), created],
        }
    }
}

/// Renders a slice of objects through a convertor.
pub fn to_table<K>(convertor: &dyn TableConvertor<K>, items: &[K]) -> Table {
    Table {
        columns: convertor.columns(),
        rows: items.iter().map(|o| convertor.row(o)).collect(),
    }
}
