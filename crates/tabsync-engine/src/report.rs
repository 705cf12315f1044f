//! Per-table and per-run sync reports

use serde::{Deserialize, Serialize};

/// How a table's sync ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableOutcome {
    /// All rows processed and all batches committed
    Completed,
    /// A batch failed after retry exhaustion; earlier batches remain applied
    Incomplete,
    /// The table yielded zero rows and was skipped
    Empty,
    /// Listing or fetch failed; nothing was processed
    SourceUnavailable,
}

/// Outcome of one table's sync.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableReport {
    /// Source file name, e.g. "INVOICES.DBF"
    pub table: String,
    /// Target collection name, e.g. "invoices"
    pub collection: String,
    pub written: u64,
    pub skipped: u64,
    pub outcome: TableOutcome,
}

/// Aggregate outcome of one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunReport {
    pub tables: Vec<TableReport>,
}

impl RunReport {
    pub fn push(&mut self, report: TableReport) {
        self.tables.push(report);
    }

    pub fn total_written(&self) -> u64 {
        self.tables.iter().map(|t| t.written).sum()
    }

    pub fn total_skipped(&self) -> u64 {
        self.tables.iter().map(|t| t.skipped).sum()
    }

    pub fn empty_tables(&self) -> usize {
        self.count(TableOutcome::Empty)
    }

    pub fn failed_tables(&self) -> usize {
        self.tables
            .iter()
            .filter(|t| {
                matches!(
                    t.outcome,
                    TableOutcome::Incomplete | TableOutcome::SourceUnavailable
                )
            })
            .count()
    }

    /// True when every processed table completed.
    pub fn is_clean(&self) -> bool {
        self.failed_tables() == 0
    }

    fn count(&self, outcome: TableOutcome) -> usize {
        self.tables.iter().filter(|t| t.outcome == outcome).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(written: u64, skipped: u64, outcome: TableOutcome) -> TableReport {
        TableReport {
            table: "T.DBF".into(),
            collection: "t".into(),
            written,
            skipped,
            outcome,
        }
    }

    #[test]
    fn test_totals() {
        let mut run = RunReport::default();
        run.push(report(10, 5, TableOutcome::Completed));
        run.push(report(0, 0, TableOutcome::Empty));
        run.push(report(3, 1, TableOutcome::Incomplete));

        assert_eq!(run.total_written(), 13);
        assert_eq!(run.total_skipped(), 6);
        assert_eq!(run.empty_tables(), 1);
        assert_eq!(run.failed_tables(), 1);
        assert!(!run.is_clean());
    }

    #[test]
    fn test_clean_run() {
        let mut run = RunReport::default();
        run.push(report(1, 0, TableOutcome::Completed));
        run.push(report(0, 0, TableOutcome::Empty));
        assert!(run.is_clean());
    }
}
