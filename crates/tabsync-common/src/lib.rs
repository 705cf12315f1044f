//! Tabsync Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, utilities, and error handling for the tabsync workspace.
//!
//! # Overview
//!
//! This crate provides common functionality used across all tabsync
//! workspace members:
//!
//! - **Error Handling**: the shared error taxonomy and result type
//! - **Fingerprinting**: content digests over normalized records
//! - **Logging**: centralized tracing setup
//!
//! # Example
//!
//! ```no_run
//! use tabsync_common::fingerprint::fingerprint_map;
//!
//! let mut doc = serde_json::Map::new();
//! doc.insert("no_fac".into(), serde_json::Value::String("F1".into()));
//! let digest = fingerprint_map(&doc);
//! println!("content fingerprint: {}", digest);
//! ```

pub mod error;
pub mod fingerprint;
pub mod logging;

// Re-export commonly used types
pub use error::{Result, TabsyncError};
