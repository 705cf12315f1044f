//! JSON-file-per-document store
//!
//! A collection is a directory, a document is `<doc_id>.json` inside it.
//! Useful for local runs and tests; a real deployment points the engine at
//! a hosted document database instead.

use async_trait::async_trait;
use serde_json::Value;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

use tabsync_common::fingerprint::FINGERPRINT_FIELD;
use tabsync_engine::store::{DocumentStore, StagedWrite, StoreError};

/// Persists documents as JSON files under a root directory.
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn doc_path(&self, collection: &str, doc_id: &str) -> PathBuf {
        // Keys may contain path separators; flatten them for the filesystem
        let safe: String = doc_id
            .chars()
            .map(|c| if c == '/' || c == '\\' { '_' } else { c })
            .collect();
        self.root.join(collection).join(format!("{}.json", safe))
    }
}

fn transient(path: &Path, e: impl std::fmt::Display) -> StoreError {
    StoreError::Transient(format!("{}: {}", path.display(), e))
}

#[async_trait]
impl DocumentStore for DirectoryStore {
    async fn has_collection(&self, collection: &str) -> Result<bool, StoreError> {
        Ok(self.root.join(collection).is_dir())
    }

    async fn get_fingerprint(
        &self,
        collection: &str,
        doc_id: &str,
    ) -> Result<Option<String>, StoreError> {
        let path = self.doc_path(collection, doc_id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(transient(&path, e)),
        };
        // A corrupt document reads as fingerprint-less and gets rewritten
        let fingerprint = serde_json::from_slice::<Value>(&bytes)
            .ok()
            .and_then(|doc| {
                doc.get(FINGERPRINT_FIELD)
                    .and_then(Value::as_str)
                    .map(String::from)
            });
        Ok(fingerprint)
    }

    async fn commit(
        &self,
        collection: &str,
        batch: &[StagedWrite],
    ) -> Result<(), StoreError> {
        let dir = self.root.join(collection);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| transient(&dir, e))?;

        for write in batch {
            let path = self.doc_path(collection, &write.doc_id);
            let body = serde_json::to_vec_pretty(&write.document)
                .map_err(|e| StoreError::Fatal(format!("{}: {}", write.doc_id, e)))?;
            tokio::fs::write(&path, body)
                .await
                .map_err(|e| transient(&path, e))?;
        }

        debug!(collection, size = batch.len(), "batch committed");
        Ok(())
    }
}
