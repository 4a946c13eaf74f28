use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::channel::Topic;
use crate::error::{Result, SyncError};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Directory `accountsync.log` is written to.
    pub dir: PathBuf,
    /// `EnvFilter` directive, e.g. `info` or `accountsync_client=debug`.
    pub level: String,
    /// OTLP collector, only used with the `telemetry` feature.
    pub otel_endpoint: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            dir: std::env::temp_dir(),
            level: "info".to_string(),
            otel_endpoint: "http://localhost:4317".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Topic selections are published on.
    pub topic: String,
    pub fetch_timeout_ms: u64,
    /// Permission category for which an empty tree shows the "no accounts" state.
    pub empty_state_category: String,
    /// Catalog backing the tree, record and permission sources.
    pub catalog_path: Option<PathBuf>,
    pub log: LogConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            topic: "AccountsMessageChannel".to_string(),
            fetch_timeout_ms: 10_000,
            empty_state_category: "Standard".to_string(),
            catalog_path: None,
            log: LogConfig::default(),
        }
    }
}

impl SyncConfig {
    /// Loads YAML (`.yaml`/`.yml`) or JSON (anything else).
    #[tracing::instrument]
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: SyncConfig = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&raw)?,
            _ => serde_json::from_str(&raw)?,
        };
        config.validate()
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: SyncConfig = serde_json::from_str(raw)?;
        config.validate()
    }

    fn validate(self) -> Result<Self> {
        if self.topic.trim().is_empty() {
            return Err(SyncError::Config("topic must not be empty".into()));
        }
        if self.fetch_timeout_ms == 0 {
            return Err(SyncError::Config("fetch_timeout_ms must be positive".into()));
        }
        Ok(self)
    }

    pub fn topic(&self) -> Topic {
        Topic::new(self.topic.clone())
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = SyncConfig::from_json_str("{}").unwrap();
        assert_eq!(config.topic().as_str(), "AccountsMessageChannel");
        assert_eq!(config.fetch_timeout(), Duration::from_secs(10));
        assert_eq!(config.empty_state_category, "Standard");
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn test_yaml_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "topic: Accounts\nfetch_timeout_ms: 250\nlog:\n  level: debug\n"
        )
        .unwrap();

        let config = SyncConfig::from_path(file.path()).unwrap();
        assert_eq!(config.topic, "Accounts");
        assert_eq!(config.fetch_timeout(), Duration::from_millis(250));
        assert_eq!(config.log.level, "debug");
        assert_eq!(config.empty_state_category, "Standard");
    }

    #[test]
    fn test_json_file() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{"empty_state_category": "PowerPartner"}}"#).unwrap();

        let config = SyncConfig::from_path(file.path()).unwrap();
        assert_eq!(config.empty_state_category, "PowerPartner");
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let err = SyncConfig::from_json_str(r#"{"fetch_timeout_ms": 0}"#).unwrap_err();
        assert!(matches!(err, SyncError::Config(_)));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = SyncConfig::from_path(Path::new("/nonexistent/accountsync.yaml")).unwrap_err();
        assert!(matches!(err, SyncError::Io(_)));
    }
}
