//! Document Store collaborator
//!
//! The target store persists JSON documents addressed by collection and
//! document id. The engine needs three operations: a collection-existence
//! probe (for the first-sync exception), a single-field fingerprint read
//! (cheap under the store's I/O accounting), and a batched commit.
//!
//! Store failures are classified into `Transient | QuotaExceeded | Fatal`
//! so the retry policy never depends on a concrete store's error types.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use thiserror::Error;

use tabsync_common::fingerprint::FINGERPRINT_FIELD;

/// Classified store failure.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The store's write quota is exhausted; recoverable after a cooldown.
    #[error("write quota exhausted")]
    QuotaExceeded,

    /// A failure worth retrying with backoff.
    #[error("transient store error: {0}")]
    Transient(String),

    /// Not worth retrying.
    #[error("fatal store error: {0}")]
    Fatal(String),
}

/// One pending full-document overwrite.
#[derive(Debug, Clone)]
pub struct StagedWrite {
    pub doc_id: String,
    pub document: Map<String, Value>,
}

/// Key-value document writes with batched atomic-ish commits.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Whether the collection has been synced before. Used for the
    /// first-sync exception to the recency window.
    async fn has_collection(&self, collection: &str) -> Result<bool, StoreError>;

    /// Read only the stored fingerprint of a document, not the document.
    async fn get_fingerprint(
        &self,
        collection: &str,
        doc_id: &str,
    ) -> Result<Option<String>, StoreError>;

    /// Atomically apply a batch of full-document overwrites.
    async fn commit(
        &self,
        collection: &str,
        batch: &[StagedWrite],
    ) -> Result<(), StoreError>;
}

#[derive(Default)]
struct MemoryStoreInner {
    collections: HashMap<String, HashMap<String, Map<String, Value>>>,
    commit_sizes: Vec<usize>,
    commit_failures: VecDeque<StoreError>,
    fingerprint_read_fails: bool,
}

/// In-memory store for tests, with failure injection.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryStoreInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryStoreInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Queue an error for the next commit attempt; attempts consume the
    /// queue in order and succeed once it is empty.
    pub fn fail_next_commit(&self, error: StoreError) {
        self.lock().commit_failures.push_back(error);
    }

    /// Make every fingerprint read fail with a transient error.
    pub fn fail_fingerprint_reads(&self, fail: bool) {
        self.lock().fingerprint_read_fails = fail;
    }

    /// Pre-seed a document, as if written by an earlier run.
    pub fn seed_document(&self, collection: &str, doc_id: &str, document: Map<String, Value>) {
        self.lock()
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(doc_id.to_string(), document);
    }

    pub fn document(&self, collection: &str, doc_id: &str) -> Option<Map<String, Value>> {
        self.lock()
            .collections
            .get(collection)
            .and_then(|docs| docs.get(doc_id))
            .cloned()
    }

    pub fn collection_size(&self, collection: &str) -> usize {
        self.lock()
            .collections
            .get(collection)
            .map(|docs| docs.len())
            .unwrap_or(0)
    }

    pub fn doc_ids(&self, collection: &str) -> Vec<String> {
        let mut ids: Vec<String> = self
            .lock()
            .collections
            .get(collection)
            .map(|docs| docs.keys().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    /// Sizes of the commits applied so far, in order.
    pub fn commit_sizes(&self) -> Vec<usize> {
        self.lock().commit_sizes.clone()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn has_collection(&self, collection: &str) -> Result<bool, StoreError> {
        Ok(self.lock().collections.contains_key(collection))
    }

    async fn get_fingerprint(
        &self,
        collection: &str,
        doc_id: &str,
    ) -> Result<Option<String>, StoreError> {
        let inner = self.lock();
        if inner.fingerprint_read_fails {
            return Err(StoreError::Transient("fingerprint read failed".into()));
        }
        Ok(inner
            .collections
            .get(collection)
            .and_then(|docs| docs.get(doc_id))
            .and_then(|doc| doc.get(FINGERPRINT_FIELD))
            .and_then(Value::as_str)
            .map(String::from))
    }

    async fn commit(
        &self,
        collection: &str,
        batch: &[StagedWrite],
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if let Some(error) = inner.commit_failures.pop_front() {
            return Err(error);
        }
        let docs = inner
            .collections
            .entry(collection.to_string())
            .or_default();
        for write in batch {
            docs.insert(write.doc_id.clone(), write.document.clone());
        }
        inner.commit_sizes.push(batch.len());
        Ok(())
    }
}
