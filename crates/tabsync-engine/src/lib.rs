//! Tabsync Engine
//!
//! Incremental, idempotent synchronization of tabular snapshot files into a
//! document store, under a tight per-operation quota.
//!
//! The engine detects change via content fingerprints, filters dependent
//! detail rows by the year of the header row they reference, derives
//! composite document identifiers for one-to-many detail tables, and commits
//! writes in bounded batches with retry and backoff.
//!
//! The two external collaborators are behind traits: [`source::SourceReader`]
//! lists and fetches tabular files, [`store::DocumentStore`] persists
//! documents with batched commits. [`driver::SyncDriver`] orchestrates a run.
//!
//! # Example
//!
//! ```no_run
//! use tabsync_engine::config::RunConfig;
//! use tabsync_engine::driver::SyncDriver;
//! use tabsync_engine::source::MemorySource;
//! use tabsync_engine::store::MemoryStore;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = RunConfig::default();
//!     let source = MemorySource::new();
//!     let store = MemoryStore::new();
//!     let driver = SyncDriver::new(config, &source, &store);
//!     let report = driver.run().await?;
//!     println!("{} records written", report.total_written());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod dates;
pub mod driver;
pub mod keys;
pub mod record;
pub mod report;
pub mod retry;
pub mod source;
pub mod store;

pub use config::{RunConfig, SyncMode, TableConfig};
pub use driver::SyncDriver;
pub use report::{RunReport, TableOutcome, TableReport};
