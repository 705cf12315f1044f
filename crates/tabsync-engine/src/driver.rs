//! Sync Driver
//!
//! Orchestrates one run: list tables, select by recency window or first
//! sync, build the header date index, then per table: filter, resolve keys,
//! normalize, fingerprint, diff against the store, and commit changed
//! documents in bounded batches with retry and backoff.
//!
//! Tables are processed sequentially to respect the shared write-rate
//! budget. Idempotence replaces locking: re-running over an unchanged
//! source performs zero writes.

use anyhow::Context;
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, error, info, warn};

use tabsync_common::fingerprint::{fingerprint_map, FINGERPRINT_FIELD};
use tabsync_common::TabsyncError;

use crate::config::{RowFilter, RunConfig, SyncMode, TableConfig};
use crate::dates::{HeaderDateIndex, TemporalFilter};
use crate::keys::{KeyResolver, LINE_NO_FIELD};
use crate::record::{normalize_row, row_value, FieldValue, RawRow, TableRef, TableSnapshot};
use crate::report::{RunReport, TableOutcome, TableReport};
use crate::retry::RetryPolicy;
use crate::source::SourceReader;
use crate::store::{DocumentStore, StagedWrite, StoreError};

/// Processing phase of one table's sync. Throttled is a side-state entered
/// on a quota-exhaustion signal; processing resumes at the same point after
/// the cooldown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Listing,
    Filtering,
    Diffing,
    Batching,
    Committing,
    Throttled,
    Done,
}

impl std::fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SyncPhase::Listing => "listing",
            SyncPhase::Filtering => "filtering",
            SyncPhase::Diffing => "diffing",
            SyncPhase::Batching => "batching",
            SyncPhase::Committing => "committing",
            SyncPhase::Throttled => "throttled",
            SyncPhase::Done => "done",
        };
        f.write_str(name)
    }
}

/// Drives one sync run against a source and a store.
pub struct SyncDriver<'a, S: SourceReader, D: DocumentStore> {
    config: RunConfig,
    source: &'a S,
    store: &'a D,
    policy: RetryPolicy,
}

impl<'a, S: SourceReader, D: DocumentStore> SyncDriver<'a, S, D> {
    pub fn new(config: RunConfig, source: &'a S, store: &'a D) -> Self {
        let policy = RetryPolicy::from_config(&config);
        Self {
            config,
            source,
            store,
            policy,
        }
    }

    /// Run the full sync: every selected table, sequentially.
    pub async fn run(&self) -> anyhow::Result<RunReport> {
        self.config
            .validate()
            .context("invalid run configuration")?;

        debug!(phase = %SyncPhase::Listing, "listing source tables");
        let listed = self
            .source
            .list_tables()
            .await
            .context("failed to list source tables")?;

        let selected = self.select_tables(listed).await;
        info!(
            selected = selected.len(),
            window_hours = self.config.recency_window_hours,
            "tables selected for this run"
        );

        let mut report = RunReport::default();

        // Fetch everything up front: header tables must be indexed before
        // any dependent detail table is processed.
        let mut snapshots: HashMap<String, TableSnapshot> = HashMap::new();
        let mut order: Vec<TableRef> = Vec::new();
        for table in selected {
            match self.source.fetch_table(&table).await {
                Ok(snapshot) => {
                    snapshots.insert(table.collection(), snapshot);
                    order.push(table);
                },
                Err(e) => {
                    error!(table = %table.name, error = %e, "fetch failed; table skipped");
                    report.push(TableReport {
                        table: table.name.clone(),
                        collection: table.collection(),
                        written: 0,
                        skipped: 0,
                        outcome: TableOutcome::SourceUnavailable,
                    });
                },
            }
        }

        let index = HeaderDateIndex::build(&self.config, &snapshots);
        let filter = TemporalFilter::new(self.config.target_year, &index);

        for table in &order {
            let collection = table.collection();
            let snapshot = match snapshots.get(&collection) {
                Some(s) => s,
                None => continue,
            };
            let table_report = self.sync_table(table, snapshot, &filter).await;
            info!(
                table = %table.name,
                written = table_report.written,
                skipped = table_report.skipped,
                outcome = ?table_report.outcome,
                "table synchronized"
            );
            report.push(table_report);
        }

        info!(
            tables = report.tables.len(),
            written = report.total_written(),
            skipped = report.total_skipped(),
            empty = report.empty_tables(),
            failed = report.failed_tables(),
            "sync run complete"
        );
        Ok(report)
    }

    /// Selection: modified within the recency window, or first sync of the
    /// collection. The first-sync exception is an explicit OR, not a side
    /// effect of a missing collection check.
    async fn select_tables(&self, listed: Vec<TableRef>) -> Vec<TableRef> {
        let threshold = Utc::now() - self.config.recency_window();
        let mut selected = Vec::new();
        for table in listed {
            let within_window = table.modified_at > threshold;
            let first_sync = match self.store.has_collection(&table.collection()).await {
                Ok(present) => !present,
                Err(e) => {
                    // Probe failure must not drop a possibly-new collection
                    warn!(table = %table.name, error = %e, "collection probe failed; assuming first sync");
                    true
                },
            };
            if within_window || first_sync {
                selected.push(table);
            } else {
                debug!(table = %table.name, "outside recency window, already synced; skipped");
            }
        }
        selected
    }

    /// Sync one table end to end. Never propagates per-record errors;
    /// a failed batch marks the table incomplete and the run moves on.
    async fn sync_table(
        &self,
        table: &TableRef,
        snapshot: &TableSnapshot,
        filter: &TemporalFilter<'_>,
    ) -> TableReport {
        let collection = table.collection();

        if snapshot.is_empty() {
            info!(table = %table.name, "empty table, skipped");
            return TableReport {
                table: table.name.clone(),
                collection,
                written: 0,
                skipped: 0,
                outcome: TableOutcome::Empty,
            };
        }

        let table_config = match self.config.table(&collection) {
            Some(cfg) => cfg.clone(),
            None => {
                // Unconfigured tables key on their first field
                let key_field = snapshot
                    .field_names
                    .first()
                    .cloned()
                    .unwrap_or_default();
                debug!(
                    table = %table.name,
                    key_field = %key_field,
                    "no table config; keying on first field"
                );
                TableConfig::keyed(key_field)
            },
        };

        debug!(table = %table.name, phase = %SyncPhase::Filtering, rows = snapshot.rows.len(), "processing rows");
        let rows = match table_config.row_filter {
            Some(ref predicate) => {
                apply_row_filter(&snapshot.rows, predicate, &table_config.key_field)
            },
            None => snapshot.rows.iter().collect(),
        };

        debug!(
            table = %table.name,
            phase = %SyncPhase::Diffing,
            eligible = rows.len(),
            "diffing and staging rows"
        );
        let mut resolver =
            KeyResolver::new(table_config.key_field.clone(), table_config.detail_sequencing);
        let mut batch: Vec<StagedWrite> = Vec::new();
        let mut written = 0u64;
        let mut skipped = 0u64;

        for row in rows {
            if !filter.includes(row, &table_config) {
                continue;
            }
            let Some(key) = resolver.resolve(row) else {
                // No key, no document identity
                continue;
            };

            let mut document = normalize_row(row);
            if let Some(line_no) = key.line_no {
                document.insert(
                    LINE_NO_FIELD.to_string(),
                    Value::String(line_no.to_string()),
                );
            }
            let fingerprint = fingerprint_map(&document);
            document.insert(
                FINGERPRINT_FIELD.to_string(),
                Value::String(fingerprint.clone()),
            );

            if self.config.mode == SyncMode::Incremental {
                let stored = self.read_fingerprint(&collection, &key.doc_id).await;
                if stored.as_deref() == Some(fingerprint.as_str()) {
                    skipped += 1;
                    continue;
                }
            }

            tracing::trace!(doc_id = %key.doc_id, phase = %SyncPhase::Batching, "write staged");
            batch.push(StagedWrite {
                doc_id: key.doc_id,
                document,
            });
            written += 1;

            if batch.len() >= self.config.batch_size {
                if let Err(e) = self.commit_with_retry(&collection, &batch).await {
                    error!(table = %table.name, error = %e, "batch commit failed; table incomplete");
                    return TableReport {
                        table: table.name.clone(),
                        collection,
                        written,
                        skipped,
                        outcome: TableOutcome::Incomplete,
                    };
                }
                batch.clear();
                // Rate smoothing between full batches
                tokio::time::sleep(self.config.pause_between_batches()).await;
            }
        }

        if !batch.is_empty() {
            if let Err(e) = self.commit_with_retry(&collection, &batch).await {
                error!(table = %table.name, error = %e, "final batch commit failed; table incomplete");
                return TableReport {
                    table: table.name.clone(),
                    collection,
                    written,
                    skipped,
                    outcome: TableOutcome::Incomplete,
                };
            }
        }

        debug!(table = %table.name, phase = %SyncPhase::Done, "table done");
        TableReport {
            table: table.name.clone(),
            collection,
            written,
            skipped,
            outcome: TableOutcome::Completed,
        }
    }

    /// Single-field fingerprint read with quota handling.
    ///
    /// A quota signal pauses for the cooldown and retries at the same
    /// position. Any other read failure is treated as "no prior
    /// fingerprint": the record gets written rather than silently dropped.
    async fn read_fingerprint(&self, collection: &str, doc_id: &str) -> Option<String> {
        let mut attempt = 1u32;
        loop {
            match self.store.get_fingerprint(collection, doc_id).await {
                Ok(stored) => return stored,
                Err(StoreError::QuotaExceeded) => {
                    if !self.policy.allows_retry(attempt) {
                        warn!(collection, doc_id, "still throttled after retries; treating as new");
                        return None;
                    }
                    warn!(
                        collection,
                        phase = %SyncPhase::Throttled,
                        cooldown_secs = self.config.quota_cooldown_secs,
                        "read quota exhausted; cooling down"
                    );
                    tokio::time::sleep(self.config.quota_cooldown()).await;
                    attempt += 1;
                },
                Err(e) => {
                    warn!(collection, doc_id, error = %e, "fingerprint read failed; treating as new");
                    return None;
                },
            }
        }
    }

    /// Commit a staged batch, retrying transient failures with backoff and
    /// quota signals with the cooldown pause. Retry exhaustion is fatal for
    /// the batch; earlier batches of the same table remain applied.
    async fn commit_with_retry(
        &self,
        collection: &str,
        batch: &[StagedWrite],
    ) -> Result<(), TabsyncError> {
        debug!(collection, size = batch.len(), phase = %SyncPhase::Committing, "committing batch");
        let mut attempt = 1u32;
        loop {
            match self.store.commit(collection, batch).await {
                Ok(()) => return Ok(()),
                Err(StoreError::QuotaExceeded) => {
                    if !self.policy.allows_retry(attempt) {
                        return Err(TabsyncError::CommitFailed {
                            attempts: attempt,
                            message: "write quota exhausted".to_string(),
                        });
                    }
                    warn!(
                        collection,
                        phase = %SyncPhase::Throttled,
                        cooldown_secs = self.config.quota_cooldown_secs,
                        "write quota exhausted; cooling down before resuming"
                    );
                    tokio::time::sleep(self.config.quota_cooldown()).await;
                },
                Err(StoreError::Transient(message)) => {
                    if !self.policy.allows_retry(attempt) {
                        return Err(TabsyncError::CommitFailed {
                            attempts: attempt,
                            message,
                        });
                    }
                    let delay = self.policy.delay_for(attempt);
                    warn!(
                        collection,
                        attempt,
                        delay_secs = delay.as_secs(),
                        error = %message,
                        "commit failed; backing off"
                    );
                    tokio::time::sleep(delay).await;
                },
                Err(StoreError::Fatal(message)) => {
                    return Err(TabsyncError::CommitFailed {
                        attempts: attempt,
                        message,
                    });
                },
            }
            attempt += 1;
        }
    }
}

/// Apply a table's row-filter predicate, and optionally collapse to at most
/// one surviving row per key, last occurrence winning.
fn apply_row_filter<'r>(
    rows: &'r [RawRow],
    predicate: &RowFilter,
    key_field: &str,
) -> Vec<&'r RawRow> {
    let survivors = rows.iter().filter(|row| {
        row_value(row, &predicate.field)
            .and_then(FieldValue::canonical_string)
            .map(|v| v.trim() == predicate.equals)
            .unwrap_or(false)
    });

    if !predicate.unique_by_key {
        return survivors.collect();
    }

    // Last occurrence per key wins, first-seen position is kept
    let mut ordered: Vec<&RawRow> = Vec::new();
    let mut position: HashMap<String, usize> = HashMap::new();
    for row in survivors {
        let Some(key) = row_value(row, key_field)
            .and_then(FieldValue::canonical_string)
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
        else {
            continue;
        };
        match position.get(&key) {
            Some(&at) => ordered[at] = row,
            None => {
                position.insert(key, ordered.len());
                ordered.push(row);
            },
        }
    }
    ordered
}
