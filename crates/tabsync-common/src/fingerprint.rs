//! Content fingerprinting for change detection
//!
//! A fingerprint is a SHA-256 digest over the canonical JSON serialization
//! of a normalized record, with field names sorted lexicographically so that
//! field insertion order never affects the digest. It is the sole mechanism
//! behind skip-if-unchanged and is not used for security purposes.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Name of the fingerprint field stored inside each document.
pub const FINGERPRINT_FIELD: &str = "h";

/// Compute the fingerprint of a normalized record.
///
/// The fingerprint field itself is excluded, so recomputing over a document
/// that already carries one yields the same digest. Keys are sorted
/// explicitly rather than relying on the map's iteration order.
pub fn fingerprint_map(fields: &Map<String, Value>) -> String {
    let canonical: BTreeMap<&str, &Value> = fields
        .iter()
        .filter(|(k, _)| k.as_str() != FINGERPRINT_FIELD)
        .map(|(k, v)| (k.as_str(), v))
        .collect();

    // BTreeMap serialization is deterministic; a serialization failure is
    // impossible for string/null values, so fall back to an empty canonical
    // form rather than panicking.
    let serialized = serde_json::to_vec(&canonical).unwrap_or_default();

    let mut hasher = Sha256::new();
    hasher.update(&serialized);
    hex::encode(hasher.finalize())
}
