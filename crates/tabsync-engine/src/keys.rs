//! Document identity resolution
//!
//! Header-style tables use the trimmed primary key directly as the document
//! id. Detail tables have repeating foreign keys (many line items per
//! invoice), so each row gets a per-run sequence number appended:
//! `F1_001`, `F1_002`, ... The sequence number is also written back into the
//! record as a line-number attribute so the document carries its position.

use std::collections::HashMap;

use crate::record::{row_value, FieldValue, RawRow};

/// Field written back into detail records with the row's sequence number.
pub const LINE_NO_FIELD: &str = "line_no";

/// Resolved document identity for one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedKey {
    pub doc_id: String,
    /// Sequence number for detail rows, 1-based
    pub line_no: Option<u32>,
}

/// Per-table key resolver. Counters reset with each run, matching the
/// full-snapshot nature of the source: every detail row of a key is present
/// in every snapshot, so re-deriving the sequence is deterministic.
pub struct KeyResolver {
    key_field: String,
    detail_sequencing: bool,
    counters: HashMap<String, u32>,
}

impl KeyResolver {
    pub fn new(key_field: impl Into<String>, detail_sequencing: bool) -> Self {
        Self {
            key_field: key_field.into(),
            detail_sequencing,
            counters: HashMap::new(),
        }
    }

    /// Resolve the document id for a row.
    ///
    /// Returns `None` when the key field is missing, null, or empty after
    /// trimming: no key, no document identity, the record is excluded.
    pub fn resolve(&mut self, row: &RawRow) -> Option<ResolvedKey> {
        let key = row_value(row, &self.key_field)
            .and_then(FieldValue::canonical_string)?
            .trim()
            .to_string();
        if key.is_empty() {
            return None;
        }

        if self.detail_sequencing {
            let counter = self.counters.entry(key.clone()).or_insert(0);
            *counter += 1;
            let line_no = *counter;
            Some(ResolvedKey {
                doc_id: format!("{}_{:03}", key, line_no),
                line_no: Some(line_no),
            })
        } else {
            Some(ResolvedKey {
                doc_id: key,
                line_no: None,
            })
        }
    }
}
