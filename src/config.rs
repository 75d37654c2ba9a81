// ABOUTME: Optional TOML run configuration merged with command-line arguments
// ABOUTME: Command-line values and environment variables override file values

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::filters::TableFilter;
use crate::sync::SyncOptions;

/// Contents of a `refsync.toml` file.
///
/// ```toml
/// reference = "postgresql://reader@primary/app"
/// target = "sqlite:///var/lib/app/replica.db"
/// schema = "public"
/// dry_run = false
/// continue_on_error = true
///
/// [tables]
/// exclude = ["audit_log"]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub reference: Option<String>,
    pub target: Option<String>,
    pub schema: Option<String>,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub continue_on_error: bool,
    #[serde(default)]
    pub tables: TablesConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TablesConfig {
    pub include: Option<Vec<String>>,
    pub exclude: Option<Vec<String>>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

/// Values given on the command line (or through the environment).
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub reference: Option<String>,
    pub target: Option<String>,
    pub schema: Option<String>,
    pub include_tables: Option<Vec<String>>,
    pub exclude_tables: Option<Vec<String>>,
    pub dry_run: bool,
    pub continue_on_error: bool,
}

/// A fully resolved run: both connection strings and the sync options.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub reference: String,
    pub target: String,
    pub options: SyncOptions,
}

impl RunConfig {
    /// Merge command-line values over the file configuration.
    ///
    /// A table selection on the command line replaces the file's selection
    /// entirely. Boolean switches are on if either source turns them on.
    pub fn resolve(cli: CliOverrides, file: Option<FileConfig>) -> Result<Self> {
        let file = file.unwrap_or_default();

        let Some(reference) = cli.reference.or(file.reference) else {
            bail!("No reference database given (use --reference, REFSYNC_REFERENCE_URL, or `reference` in the config file)");
        };
        let Some(target) = cli.target.or(file.target) else {
            bail!("No target database given (use --target, REFSYNC_TARGET_URL, or `target` in the config file)");
        };

        let filter = if cli.include_tables.is_some() || cli.exclude_tables.is_some() {
            TableFilter::new(cli.include_tables, cli.exclude_tables)?
        } else {
            TableFilter::new(file.tables.include, file.tables.exclude)?
        };

        let schema = cli
            .schema
            .or(file.schema)
            .unwrap_or_else(|| "public".to_string());
        if schema.trim().is_empty() {
            bail!("Schema name cannot be empty");
        }

        Ok(Self {
            reference,
            target,
            options: SyncOptions {
                schema,
                filter,
                dry_run: cli.dry_run || file.dry_run,
                continue_on_error: cli.continue_on_error || file.continue_on_error,
            },
        })
    }
}
