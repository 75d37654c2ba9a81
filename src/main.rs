// ABOUTME: CLI entry point for refsync
// ABOUTME: Parses commands, resolves configuration, and routes to the command handlers

use clap::{Args, Parser, Subcommand};
use refsync::commands::{self, OutputFormat};
use refsync::config::{CliOverrides, FileConfig, RunConfig};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "refsync")]
#[command(about = "Synchronize table rows from a reference database into a target database", long_about = None)]
#[command(version)]
struct Cli {
    /// Allow self-signed TLS certificates (insecure - use only for testing)
    #[arg(
        long = "allow-self-signed-certs",
        global = true,
        default_value_t = false
    )]
    allow_self_signed_certs: bool,
    /// Set the log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct RunArgs {
    /// Reference database (source of truth): postgresql://... or a SQLite file
    #[arg(long, env = "REFSYNC_REFERENCE_URL")]
    reference: Option<String>,
    /// Target database to bring in line with the reference
    #[arg(long, env = "REFSYNC_TARGET_URL")]
    target: Option<String>,
    /// PostgreSQL schema to synchronize [default: public]
    #[arg(long)]
    schema: Option<String>,
    /// Synchronize only these tables (comma-separated)
    #[arg(long, value_delimiter = ',', conflicts_with = "exclude_tables")]
    include_tables: Option<Vec<String>>,
    /// Skip these tables (comma-separated)
    #[arg(long, value_delimiter = ',')]
    exclude_tables: Option<Vec<String>>,
    /// Record failing tables and continue with the rest
    #[arg(long)]
    continue_on_error: bool,
    /// Path to a refsync.toml run configuration
    #[arg(long = "config")]
    config_path: Option<PathBuf>,
    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Insert missing rows and update differing rows in the target
    Sync {
        #[command(flatten)]
        run: RunArgs,
        /// Compute and report changes without writing them
        #[arg(long)]
        dry_run: bool,
    },
    /// Report what sync would change without writing anything
    Diff {
        #[command(flatten)]
        run: RunArgs,
    },
}

impl RunArgs {
    fn resolve(self, dry_run: bool) -> anyhow::Result<(RunConfig, OutputFormat)> {
        let file = self
            .config_path
            .as_deref()
            .map(FileConfig::load)
            .transpose()?;

        let overrides = CliOverrides {
            reference: self.reference,
            target: self.target,
            schema: self.schema,
            include_tables: self.include_tables,
            exclude_tables: self.exclude_tables,
            dry_run,
            continue_on_error: self.continue_on_error,
        };

        let format = if self.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        };

        Ok((RunConfig::resolve(overrides, file)?, format))
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    // 1. RUST_LOG environment variable has highest precedence
    // 2. --log flag is used if RUST_LOG is not set
    // 3. Default to "info" if neither are provided
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.log.clone()));

    // Logs go to stderr so stdout carries only the report.
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    refsync::postgres::init_tls_policy(cli.allow_self_signed_certs);

    match cli.command {
        Commands::Sync { run, dry_run } => {
            let (run, format) = run.resolve(dry_run)?;
            commands::sync(run, format).await?;
        }
        Commands::Diff { run } => {
            let (run, format) = run.resolve(true)?;
            commands::diff(run, format).await?;
        }
    }

    Ok(())
}
