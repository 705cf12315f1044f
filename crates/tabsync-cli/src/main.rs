//! tabsync - incremental tabular snapshot synchronizer

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tabsync_cli::{effective_log_config, load_run_config};
use tabsync_cli::{source_fs::DirectorySource, store_fs::DirectoryStore};
use tabsync_common::logging::init_logging;
use tabsync_engine::config::SyncMode;
use tabsync_engine::driver::SyncDriver;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "tabsync")]
#[command(author, version, about = "Incremental tabular snapshot synchronizer")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a sync of snapshot files into the document store
    Run {
        /// Run configuration file (JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Directory holding the source snapshot files
        #[arg(long)]
        source_dir: PathBuf,

        /// Root directory of the target document store
        #[arg(long)]
        store_dir: PathBuf,

        /// Rewrite every eligible row, ignoring stored fingerprints
        #[arg(long)]
        full: bool,
    },

    /// Validate a run configuration file without syncing
    Check {
        /// Run configuration file (JSON)
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&effective_log_config(cli.verbose))?;

    match cli.command {
        Command::Run {
            config,
            source_dir,
            store_dir,
            full,
        } => {
            let mut run_config = load_run_config(&config)?;
            if full {
                run_config.mode = SyncMode::Full;
            }

            let source = DirectorySource::new(source_dir);
            let store = DirectoryStore::new(store_dir);
            let driver = SyncDriver::new(run_config, &source, &store);

            let report = driver.run().await?;
            for table in &report.tables {
                info!(
                    table = %table.table,
                    collection = %table.collection,
                    written = table.written,
                    skipped = table.skipped,
                    outcome = ?table.outcome,
                    "table result"
                );
            }
            if !report.is_clean() {
                warn!(failed = report.failed_tables(), "sync finished with failures");
                anyhow::bail!("{} table(s) failed to sync", report.failed_tables());
            }
            info!(
                written = report.total_written(),
                skipped = report.total_skipped(),
                "sync complete"
            );
        },
        Command::Check { config } => {
            let run_config = load_run_config(&config)?;
            info!(
                tables = run_config.tables.len(),
                target_year = run_config.target_year,
                "configuration is valid"
            );
        },
    }

    Ok(())
}
