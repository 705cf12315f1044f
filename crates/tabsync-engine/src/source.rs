//! Source Reader collaborator
//!
//! The source is a remote file store holding tabular snapshot files. The
//! engine only needs two operations: enumerate the sync-eligible files and
//! fetch one of them as typed rows. Listing returns everything eligible by
//! file type; the recency-window/first-sync selection policy lives in the
//! driver.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tabsync_common::{Result, TabsyncError};

use crate::record::{TableRef, TableSnapshot};

/// Lists and fetches tabular snapshot files.
#[async_trait]
pub trait SourceReader: Send + Sync {
    /// Enumerate all sync-eligible tables with their modification times.
    async fn list_tables(&self) -> Result<Vec<TableRef>>;

    /// Fetch a table's rows. Called at most once per table per run.
    async fn fetch_table(&self, table: &TableRef) -> Result<TableSnapshot>;
}

/// In-memory source for tests and examples.
#[derive(Default)]
pub struct MemorySource {
    tables: HashMap<String, (TableRef, TableSnapshot)>,
    unfetchable: HashSet<String>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a table. The id doubles as the file name.
    pub fn add_table(
        &mut self,
        table: TableRef,
        snapshot: TableSnapshot,
    ) -> &mut Self {
        self.tables.insert(table.id.clone(), (table, snapshot));
        self
    }

    /// Make a table's fetch fail, to exercise SourceUnavailable handling.
    pub fn make_unfetchable(&mut self, id: &str) -> &mut Self {
        self.unfetchable.insert(id.to_string());
        self
    }
}

#[async_trait]
impl SourceReader for MemorySource {
    async fn list_tables(&self) -> Result<Vec<TableRef>> {
        let mut refs: Vec<TableRef> =
            self.tables.values().map(|(r, _)| r.clone()).collect();
        // Deterministic processing order for tests and reproducible runs
        refs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(refs)
    }

    async fn fetch_table(&self, table: &TableRef) -> Result<TableSnapshot> {
        if self.unfetchable.contains(&table.id) {
            return Err(TabsyncError::SourceUnavailable(format!(
                "fetch failed for '{}'",
                table.name
            )));
        }
        self.tables
            .get(&table.id)
            .map(|(_, snapshot)| snapshot.clone())
            .ok_or_else(|| TabsyncError::TableNotFound(table.name.clone()))
    }
}
