//! Run configuration
//!
//! Everything the driver needs for one run: the target year, the recency
//! window, batching and retry knobs, and the per-table metadata (primary key
//! field, date association, detail sequencing, row filters). Configuration
//! is validated once at startup; the engine never falls back to silent
//! defaults for a misconfigured table.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Hard ceiling on documents per commit imposed by the target store.
pub const STORE_MAX_BATCH: usize = 500;

/// Reference from a detail table to the header table it inherits a year from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HeaderRef {
    /// Collection name of the header table (e.g. "invoices")
    pub table: String,
    /// Key field shared by header and detail rows (e.g. "NO_FAC")
    pub key_field: String,
    /// Date field on the header row (e.g. "FALTA_FAC")
    pub date_field: String,
}

/// Pre-filter applied to a table's rows before all other steps.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RowFilter {
    /// Field the predicate tests (e.g. "LUGAR")
    pub field: String,
    /// Sentinel value a row must carry to survive (e.g. "LINEA")
    pub equals: String,
    /// Collapse to at most one surviving row per key, last occurrence wins
    #[serde(default)]
    pub unique_by_key: bool,
}

/// Per-table sync metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TableConfig {
    /// Primary key field (also the foreign key for detail tables)
    pub key_field: String,
    /// The table's own date field, if it has one
    #[serde(default)]
    pub date_field: Option<String>,
    /// Header reference for detail tables without their own date
    #[serde(default)]
    pub header_ref: Option<HeaderRef>,
    /// Derive `<key>_<NNN>` document ids for repeating foreign keys
    #[serde(default)]
    pub detail_sequencing: bool,
    /// Optional pre-filter predicate
    #[serde(default)]
    pub row_filter: Option<RowFilter>,
}

impl TableConfig {
    /// Minimal config: direct primary key, no date association.
    pub fn keyed(key_field: impl Into<String>) -> Self {
        Self {
            key_field: key_field.into(),
            date_field: None,
            header_ref: None,
            detail_sequencing: false,
            row_filter: None,
        }
    }
}

/// Sync mode for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Diff against stored fingerprints, write only changed/new documents
    #[default]
    Incremental,
    /// Write every eligible row unconditionally (fingerprints still stored)
    Full,
}

/// Main run configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Year records must belong to; others are excluded by the temporal filter
    pub target_year: i32,
    /// Source files modified within this many hours are sync-eligible
    #[serde(default = "default_recency_window_hours")]
    pub recency_window_hours: u64,
    /// Maximum documents per commit (must be <= STORE_MAX_BATCH)
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Pause between batch commits, for write-rate smoothing
    #[serde(default = "default_pause_secs")]
    pub pause_between_batches_secs: u64,
    /// Cooldown after a quota-exhaustion signal
    #[serde(default = "default_quota_cooldown_secs")]
    pub quota_cooldown_secs: u64,
    /// Maximum commit attempts per batch
    #[serde(default = "default_max_attempts")]
    pub max_commit_attempts: u32,
    /// Base delay for commit retry backoff (actual delay is base * attempt)
    #[serde(default = "default_retry_base_secs")]
    pub retry_base_delay_secs: u64,
    /// Incremental or full refresh
    #[serde(default)]
    pub mode: SyncMode,
    /// Per-table metadata, keyed by collection name
    #[serde(default)]
    pub tables: HashMap<String, TableConfig>,
}

fn default_recency_window_hours() -> u64 {
    5
}

fn default_batch_size() -> usize {
    400
}

fn default_pause_secs() -> u64 {
    1
}

fn default_quota_cooldown_secs() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_base_secs() -> u64 {
    5
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            target_year: 2025,
            recency_window_hours: default_recency_window_hours(),
            batch_size: default_batch_size(),
            pause_between_batches_secs: default_pause_secs(),
            quota_cooldown_secs: default_quota_cooldown_secs(),
            max_commit_attempts: default_max_attempts(),
            retry_base_delay_secs: default_retry_base_secs(),
            mode: SyncMode::Incremental,
            tables: HashMap::new(),
        }
    }
}

impl RunConfig {
    /// Validate the configuration at startup.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.batch_size == 0 {
            anyhow::bail!("batch_size must be greater than 0");
        }
        if self.batch_size > STORE_MAX_BATCH {
            anyhow::bail!(
                "batch_size {} exceeds the store limit of {}",
                self.batch_size,
                STORE_MAX_BATCH
            );
        }
        if self.max_commit_attempts == 0 {
            anyhow::bail!("max_commit_attempts must be greater than 0");
        }
        if !(1900..=2100).contains(&self.target_year) {
            anyhow::bail!("target_year {} is not plausible", self.target_year);
        }

        for (name, table) in &self.tables {
            if table.key_field.trim().is_empty() {
                anyhow::bail!("table '{}': key_field cannot be empty", name);
            }
            if table.date_field.is_some() && table.header_ref.is_some() {
                anyhow::bail!(
                    "table '{}': at most one of date_field and header_ref may be set",
                    name
                );
            }
            if let Some(ref header) = table.header_ref {
                if header.table.trim().is_empty()
                    || header.key_field.trim().is_empty()
                    || header.date_field.trim().is_empty()
                {
                    anyhow::bail!("table '{}': header_ref fields cannot be empty", name);
                }
            }
            if let Some(ref filter) = table.row_filter {
                if filter.field.trim().is_empty() {
                    anyhow::bail!("table '{}': row_filter field cannot be empty", name);
                }
                if filter.field.eq_ignore_ascii_case(&table.key_field) {
                    anyhow::bail!(
                        "table '{}': row_filter cannot target the key field",
                        name
                    );
                }
            }
        }

        Ok(())
    }

    /// Look up a table's config by collection name.
    pub fn table(&self, collection: &str) -> Option<&TableConfig> {
        self.tables.get(collection)
    }

    pub fn recency_window(&self) -> chrono::Duration {
        chrono::Duration::hours(self.recency_window_hours as i64)
    }

    pub fn pause_between_batches(&self) -> Duration {
        Duration::from_secs(self.pause_between_batches_secs)
    }

    pub fn quota_cooldown(&self) -> Duration {
        Duration::from_secs(self.quota_cooldown_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_secs(self.retry_base_delay_secs)
    }
}
