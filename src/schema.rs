// ABOUTME: Table structure as introspected from a session
// ABOUTME: Column metadata, primary keys, and row/key aliases used by the diff

use crate::value::Value;

/// A row loaded from a table, aligned with the column list it was read with.
pub type Row = Vec<Value>;

/// Projection of a row onto its table's primary-key columns.
pub type RowKey = Vec<Value>;

/// How a backend compares table and column names.
///
/// SQLite identifiers are case-insensitive for ASCII letters even when
/// quoted; PostgreSQL compares quoted identifiers exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NameMatching {
    #[default]
    Exact,
    AsciiCaseInsensitive,
}

impl NameMatching {
    pub fn matches(self, a: &str, b: &str) -> bool {
        match self {
            NameMatching::Exact => a == b,
            NameMatching::AsciiCaseInsensitive => a.eq_ignore_ascii_case(b),
        }
    }

    /// First entry of `names` that refers to `name`.
    pub fn find<'a>(self, names: &'a [String], name: &str) -> Option<&'a str> {
        names
            .iter()
            .map(String::as_str)
            .find(|candidate| self.matches(candidate, name))
    }
}

/// Information about a table column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    /// Declared type as the backend reports it (e.g. `character varying(20)`,
    /// `INTEGER`). Sessions map it to a value encoding when writing.
    pub data_type: String,
    pub is_nullable: bool,
    pub has_default: bool,
    /// Computed by the database; never written.
    pub is_generated: bool,
}

/// Structure of one table in one database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
    /// Primary key column names in key order. Empty if the table has none.
    pub primary_key: Vec<String>,
}

impl TableSchema {
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.find_column(name, NameMatching::Exact)
    }

    /// Look a column up under the given name comparison.
    pub fn find_column(&self, name: &str, matching: NameMatching) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| matching.matches(&c.name, name))
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn is_key_column(&self, name: &str) -> bool {
        self.primary_key.iter().any(|k| k == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(name: &str) -> ColumnInfo {
        ColumnInfo {
            name: name.to_string(),
            data_type: "integer".to_string(),
            is_nullable: false,
            has_default: false,
            is_generated: false,
        }
    }

    #[test]
    fn test_column_lookup() {
        let table = TableSchema {
            name: "users".to_string(),
            columns: vec![column("id"), column("age")],
            primary_key: vec!["id".to_string()],
        };

        assert!(table.has_column("age"));
        assert!(!table.has_column("email"));
        assert!(table.is_key_column("id"));
        assert!(!table.is_key_column("age"));
        assert_eq!(table.column_names(), vec!["id", "age"]);
    }

    #[test]
    fn test_find_column_case_insensitive() {
        let table = TableSchema {
            name: "users".to_string(),
            columns: vec![column("id"), column("Email")],
            primary_key: vec!["id".to_string()],
        };

        assert!(table.column("email").is_none());
        assert!(table.find_column("email", NameMatching::Exact).is_none());
        let found = table
            .find_column("EMAIL", NameMatching::AsciiCaseInsensitive)
            .unwrap();
        assert_eq!(found.name, "Email");
    }

    #[test]
    fn test_find_table_name() {
        let names = vec!["orders".to_string(), "Users".to_string()];

        assert_eq!(NameMatching::Exact.find(&names, "users"), None);
        assert_eq!(
            NameMatching::AsciiCaseInsensitive.find(&names, "users"),
            Some("Users")
        );
        assert!(!NameMatching::AsciiCaseInsensitive.matches("straße", "STRASSE"));
    }
}
