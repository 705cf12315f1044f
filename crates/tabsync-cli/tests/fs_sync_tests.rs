//! End-to-end sync through the filesystem collaborators

use serde_json::Value;
use tabsync_cli::{source_fs::DirectorySource, store_fs::DirectoryStore};
use tabsync_engine::config::{HeaderRef, RunConfig, TableConfig};
use tabsync_engine::driver::SyncDriver;

fn invoice_config() -> RunConfig {
    let mut config = RunConfig {
        target_year: 2025,
        ..Default::default()
    };
    config
        .tables
        .insert("invoices".into(), TableConfig::keyed("NO_FAC"));
    config.tables.insert(
        "invoice_lines".into(),
        TableConfig {
            key_field: "NO_FAC".into(),
            date_field: None,
            header_ref: Some(HeaderRef {
                table: "invoices".into(),
                key_field: "NO_FAC".into(),
                date_field: "FALTA_FAC".into(),
            }),
            detail_sequencing: true,
            row_filter: None,
        },
    );
    config
}

fn write_snapshots(dir: &std::path::Path) {
    std::fs::write(
        dir.join("invoices.csv"),
        "NO_FAC,FALTA_FAC\nF1,2025-03-01\n",
    )
    .unwrap();
    std::fs::write(
        dir.join("invoice_lines.csv"),
        "NO_FAC,ARTICULO\nF1,A-1\nF1,B-7\n",
    )
    .unwrap();
}

#[tokio::test]
async fn csv_to_json_store_roundtrip() {
    let source_dir = tempfile::tempdir().unwrap();
    let store_dir = tempfile::tempdir().unwrap();
    write_snapshots(source_dir.path());

    let source = DirectorySource::new(source_dir.path());
    let store = DirectoryStore::new(store_dir.path());

    let report = SyncDriver::new(invoice_config(), &source, &store)
        .run()
        .await
        .unwrap();
    assert!(report.is_clean());
    assert_eq!(report.total_written(), 3);

    let line = store_dir.path().join("invoice_lines/F1_001.json");
    let doc: Value =
        serde_json::from_slice(&std::fs::read(line).unwrap()).unwrap();
    assert_eq!(doc["articulo"], Value::String("A-1".into()));
    assert_eq!(doc["line_no"], Value::String("1".into()));
    assert!(doc["h"].is_string());
    assert!(store_dir
        .path()
        .join("invoice_lines/F1_002.json")
        .is_file());
}

#[tokio::test]
async fn rerun_against_files_is_idempotent() {
    let source_dir = tempfile::tempdir().unwrap();
    let store_dir = tempfile::tempdir().unwrap();
    write_snapshots(source_dir.path());

    let source = DirectorySource::new(source_dir.path());
    let store = DirectoryStore::new(store_dir.path());

    let first = SyncDriver::new(invoice_config(), &source, &store)
        .run()
        .await
        .unwrap();
    let second = SyncDriver::new(invoice_config(), &source, &store)
        .run()
        .await
        .unwrap();

    assert_eq!(first.total_written(), 3);
    assert_eq!(second.total_written(), 0);
    assert_eq!(second.total_skipped(), 3);
}

#[tokio::test]
async fn changed_row_is_rewritten() {
    let source_dir = tempfile::tempdir().unwrap();
    let store_dir = tempfile::tempdir().unwrap();
    write_snapshots(source_dir.path());

    let source = DirectorySource::new(source_dir.path());
    let store = DirectoryStore::new(store_dir.path());

    SyncDriver::new(invoice_config(), &source, &store)
        .run()
        .await
        .unwrap();

    // One line item changes; only documents whose content changed rewrite
    std::fs::write(
        source_dir.path().join("invoice_lines.csv"),
        "NO_FAC,ARTICULO\nF1,A-1\nF1,B-9\n",
    )
    .unwrap();

    let report = SyncDriver::new(invoice_config(), &source, &store)
        .run()
        .await
        .unwrap();
    assert_eq!(report.total_written(), 1);
    assert_eq!(report.total_skipped(), 2);

    let doc: Value = serde_json::from_slice(
        &std::fs::read(store_dir.path().join("invoice_lines/F1_002.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(doc["articulo"], Value::String("B-9".into()));
}
