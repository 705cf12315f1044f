//! Tabsync CLI Library
//!
//! Filesystem-backed reference implementations of the engine's collaborator
//! traits, plus configuration loading for the `tabsync` binary:
//!
//! - [`source_fs::DirectorySource`]: a directory of `.csv` snapshot files
//! - [`store_fs::DirectoryStore`]: one JSON file per document

use anyhow::Context;
use std::path::Path;
use tabsync_common::logging::{LogConfig, LogLevel};
use tabsync_engine::config::RunConfig;

pub mod source_fs;
pub mod store_fs;

/// Logging configuration for the binary: what `TABSYNC_LOG_*` says, with
/// `--verbose` raising the level to debug on top.
pub fn effective_log_config(verbose: bool) -> LogConfig {
    let mut config = LogConfig::from_env().unwrap_or_default();
    if verbose {
        config.level = LogLevel::Debug;
    }
    config
}

/// Load and validate a run configuration from a JSON file.
pub fn load_run_config(path: &Path) -> anyhow::Result<RunConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let config: RunConfig = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse config file {}", path.display()))?;
    config.validate().context("invalid run configuration")?;
    Ok(config)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_minimal_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "target_year": 2025 }}"#).unwrap();
        let config = load_run_config(file.path()).unwrap();
        assert_eq!(config.target_year, 2025);
        assert_eq!(config.batch_size, 400);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "target_year": 2025, "batch_size": 9999 }}"#).unwrap();
        assert!(load_run_config(file.path()).is_err());
    }

    #[test]
    fn test_missing_file_errors() {
        assert!(load_run_config(Path::new("/nonexistent/config.json")).is_err());
    }

    // One test owns the env var to keep parallel runs deterministic.
    #[test]
    fn test_verbose_raises_level_without_clobbering_env() {
        std::env::remove_var("TABSYNC_LOG_LEVEL");
        assert_eq!(effective_log_config(false).level, LogLevel::Info);
        assert_eq!(effective_log_config(true).level, LogLevel::Debug);

        std::env::set_var("TABSYNC_LOG_LEVEL", "warn");
        assert_eq!(effective_log_config(false).level, LogLevel::Warn);
        assert_eq!(effective_log_config(true).level, LogLevel::Debug);
        std::env::remove_var("TABSYNC_LOG_LEVEL");
    }
}
