// ABOUTME: Table selection for a synchronization run
// ABOUTME: Handles include/exclude table lists from CLI flags and config

use anyhow::{bail, Result};

/// Represents table selection rules
#[derive(Debug, Clone, Default)]
pub struct TableFilter {
    include_tables: Option<Vec<String>>,
    exclude_tables: Option<Vec<String>>,
}

impl TableFilter {
    /// Creates a filter from CLI arguments
    pub fn new(
        include_tables: Option<Vec<String>>,
        exclude_tables: Option<Vec<String>>,
    ) -> Result<Self> {
        if include_tables.is_some() && exclude_tables.is_some() {
            bail!("Cannot use both --include-tables and --exclude-tables");
        }

        for table in include_tables.iter().chain(exclude_tables.iter()).flatten() {
            if table.trim().is_empty() {
                bail!("Table names in filters cannot be empty");
            }
        }

        Ok(Self {
            include_tables: normalize(include_tables),
            exclude_tables: normalize(exclude_tables),
        })
    }

    /// Creates an empty filter (sync everything)
    pub fn empty() -> Self {
        Self::default()
    }

    /// Checks if any filters are active
    pub fn is_empty(&self) -> bool {
        self.include_tables.is_none() && self.exclude_tables.is_none()
    }

    pub fn include_tables(&self) -> Option<&Vec<String>> {
        self.include_tables.as_ref()
    }

    pub fn exclude_tables(&self) -> Option<&Vec<String>> {
        self.exclude_tables.as_ref()
    }

    /// Determines if a table should be synchronized
    pub fn should_sync_table(&self, table_name: &str) -> bool {
        if let Some(ref include) = self.include_tables {
            if !include.iter().any(|t| t == table_name) {
                return false;
            }
        }

        if let Some(ref exclude) = self.exclude_tables {
            if exclude.iter().any(|t| t == table_name) {
                return false;
            }
        }

        true
    }

    /// Included table names that do not appear in `available`.
    ///
    /// Used to warn about typos in `--include-tables`.
    pub fn unknown_includes(&self, available: &[String]) -> Vec<String> {
        match self.include_tables {
            Some(ref include) => include
                .iter()
                .filter(|t| !available.contains(t))
                .cloned()
                .collect(),
            None => Vec::new(),
        }
    }
}

fn normalize(tables: Option<Vec<String>>) -> Option<Vec<String>> {
    tables.map(|list| list.into_iter().map(|t| t.trim().to_string()).collect())
}
