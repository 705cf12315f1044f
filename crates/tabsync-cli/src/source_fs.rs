//! Directory-of-CSV source reader
//!
//! Treats a local directory as the remote file store: every `.csv` file is a
//! sync-eligible table, its modification time is the file's mtime, and its
//! rows are parsed with headers as field names. Empty cells become nulls.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::debug;

use tabsync_common::{Result, TabsyncError};
use tabsync_engine::record::{FieldValue, RawRow, TableRef, TableSnapshot};
use tabsync_engine::source::SourceReader;

/// Reads tabular snapshots from a directory of CSV files.
pub struct DirectorySource {
    dir: PathBuf,
}

impl DirectorySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

fn parse_csv(name: &str, data: &[u8]) -> Result<TableSnapshot> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(data);

    let field_names: Vec<String> = reader
        .headers()
        .map_err(|e| TabsyncError::Parse(format!("{}: {}", name, e)))?
        .iter()
        .map(String::from)
        .collect();

    let mut rows: Vec<RawRow> = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| TabsyncError::Parse(format!("{}: {}", name, e)))?;
        let row = field_names
            .iter()
            .zip(record.iter())
            .map(|(field, cell)| {
                let value = if cell.is_empty() {
                    FieldValue::Null
                } else {
                    FieldValue::Text(cell.to_string())
                };
                (field.clone(), value)
            })
            .collect();
        rows.push(row);
    }

    Ok(TableSnapshot {
        name: name.to_string(),
        field_names,
        rows,
    })
}

fn is_csv(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("csv"))
        .unwrap_or(false)
}

#[async_trait]
impl SourceReader for DirectorySource {
    async fn list_tables(&self) -> Result<Vec<TableRef>> {
        let mut tables = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !path.is_file() || !is_csv(&path) {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let modified_at: DateTime<Utc> = entry.metadata().await?.modified()?.into();
            tables.push(TableRef {
                id: path.to_string_lossy().into_owned(),
                name: name.to_string(),
                modified_at,
            });
        }
        tables.sort_by(|a, b| a.name.cmp(&b.name));
        debug!(dir = %self.dir.display(), count = tables.len(), "listed snapshot files");
        Ok(tables)
    }

    async fn fetch_table(&self, table: &TableRef) -> Result<TableSnapshot> {
        let data = tokio::fs::read(&table.id)
            .await
            .map_err(|e| TabsyncError::SourceUnavailable(format!("{}: {}", table.name, e)))?;
        parse_csv(&table.name, &data)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_csv_with_nulls() {
        let data = b"NO_FAC,FALTA_FAC,OBS\nF1,2025-03-01,\nF2,,note\n";
        let snapshot = parse_csv("invoices.csv", data).unwrap();
        assert_eq!(snapshot.field_names, vec!["NO_FAC", "FALTA_FAC", "OBS"]);
        assert_eq!(snapshot.rows.len(), 2);
        assert_eq!(snapshot.rows[0][2].1, FieldValue::Null);
        assert_eq!(snapshot.rows[1][1].1, FieldValue::Null);
        assert_eq!(snapshot.rows[1][2].1, FieldValue::Text("note".into()));
    }

    #[tokio::test]
    async fn test_lists_only_csv_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.csv"), "ID\n1\n").unwrap();
        std::fs::write(dir.path().join("B.CSV"), "ID\n2\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let source = DirectorySource::new(dir.path());
        let tables = source.list_tables().await.unwrap();
        let names: Vec<&str> = tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["B.CSV", "a.csv"]);
    }

    #[tokio::test]
    async fn test_fetch_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("t.csv"), "ID,NAME\n1,uno\n").unwrap();

        let source = DirectorySource::new(dir.path());
        let tables = source.list_tables().await.unwrap();
        let snapshot = source.fetch_table(&tables[0]).await.unwrap();
        assert_eq!(snapshot.rows.len(), 1);
        assert_eq!(snapshot.rows[0][1].1, FieldValue::Text("uno".into()));
    }

    #[tokio::test]
    async fn test_fetch_missing_file_is_source_unavailable() {
        let source = DirectorySource::new("/tmp");
        let table = TableRef {
            id: "/tmp/definitely-not-here.csv".into(),
            name: "definitely-not-here.csv".into(),
            modified_at: Utc::now(),
        };
        let err = source.fetch_table(&table).await.unwrap_err();
        assert!(matches!(err, TabsyncError::SourceUnavailable(_)));
    }
}
