//! Run configuration for ingestion passes.
//!
//! Loaded from `labelscope.toml` (or the path in `LABELSCOPE_CONFIG`), or
//! explicitly from YAML/JSON/TOML files. Every field has a default so an
//! empty file is a valid configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::LabelscopeError;

/// Complete configuration for one ingestion run.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IngestConfig {
    /// Freshness and known-error gating
    #[serde(default)]
    pub gate: GateConfig,

    /// Fetch retry/backoff policy
    #[serde(default)]
    pub retry: RetryConfig,

    /// Orchestrator behaviour
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Log filter
    #[serde(default)]
    pub logging: LoggingConfig,
}

// ── Gate ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    /// Identifiers updated within this many hours are not re-fetched.
    #[serde(default = "default_freshness_hours")]
    pub freshness_hours: u64,

    /// Skip identifiers that have a recorded known error.
    #[serde(default = "default_true")]
    pub skip_known_errors: bool,
}

fn default_freshness_hours() -> u64 { 168 }
fn default_true() -> bool { true }

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            freshness_hours: default_freshness_hours(),
            skip_known_errors: true,
        }
    }
}

impl GateConfig {
    pub fn freshness_window(&self) -> chrono::Duration {
        chrono::Duration::hours(self.freshness_hours as i64)
    }
}

// ── Retry ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts, including the first (undelayed) one.
    #[serde(default = "default_attempts")]
    pub attempts: u32,

    /// Unit of the exponential term: attempt `i` waits `2^(i-1) * base`.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Upper bound (exclusive) of the uniform jitter added to each delay.
    #[serde(default = "default_max_jitter_ms")]
    pub max_jitter_ms: u64,
}

fn default_attempts() -> u32 { 5 }
fn default_base_delay_ms() -> u64 { 1_000 }
fn default_max_jitter_ms() -> u64 { 1_000 }

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_jitter_ms: default_max_jitter_ms(),
        }
    }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_jitter(&self) -> Duration {
        Duration::from_millis(self.max_jitter_ms)
    }
}

// ── Pipeline ──────────────────────────────────────────────────────────────────

/// What happens to a body whose heading matched no canonical section.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum UnclassifiedPolicy {
    /// Discard the body.
    #[default]
    Drop,
    /// Keep it under `OTHER`, with the raw heading prepended to the body.
    Bucket,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Call `refresh_session` on the transport after this many identifiers.
    /// Zero disables refreshing.
    #[serde(default = "default_session_refresh_every")]
    pub session_refresh_every: usize,

    #[serde(default)]
    pub unclassified: UnclassifiedPolicy,

    /// Below this many numbered headings the titled fallback strategy runs.
    #[serde(default = "default_min_numbered_headings")]
    pub min_numbered_headings: usize,

    /// Write a known error when a required header field is missing.
    #[serde(default = "default_true")]
    pub record_missing_fields: bool,
}

fn default_session_refresh_every() -> usize { 50 }
fn default_min_numbered_headings() -> usize { 3 }

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            session_refresh_every: default_session_refresh_every(),
            unclassified: UnclassifiedPolicy::default(),
            min_numbered_headings: default_min_numbered_headings(),
            record_missing_fields: true,
        }
    }
}

// ── Logging ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive, overridden by `RUST_LOG`.
    #[serde(default = "default_filter")]
    pub filter: String,
}

fn default_filter() -> String { "labelscope=info".to_string() }

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { filter: default_filter() }
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl IngestConfig {
    /// Load configuration from labelscope.toml.
    /// Checks LABELSCOPE_CONFIG env var first, then current directory.
    /// A missing file yields the defaults.
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("LABELSCOPE_CONFIG")
            .unwrap_or_else(|_| "labelscope.toml".to_string());

        if !Path::new(&path).exists() {
            tracing::debug!(path = %path, "No config file found, using defaults");
            return Ok(Self::default());
        }

        Self::from_toml(&path)
    }

    pub fn from_toml(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_yaml(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), LabelscopeError> {
        if self.retry.attempts == 0 {
            return Err(LabelscopeError::Config(
                "retry.attempts must be at least 1".to_string(),
            ));
        }
        if self.logging.filter.trim().is_empty() {
            return Err(LabelscopeError::Config(
                "logging.filter must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = IngestConfig::default();
        assert_eq!(config.gate.freshness_hours, 168);
        assert!(config.gate.skip_known_errors);
        assert_eq!(config.retry.attempts, 5);
        assert_eq!(config.pipeline.unclassified, UnclassifiedPolicy::Drop);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config: IngestConfig = toml::from_str("").unwrap();
        assert_eq!(config.retry.base_delay_ms, 1_000);
        assert_eq!(config.pipeline.session_refresh_every, 50);
    }

    #[test]
    fn test_partial_toml_overrides() {
        let config: IngestConfig = toml::from_str(
            r#"
            [gate]
            freshness_hours = 24
            skip_known_errors = false

            [pipeline]
            unclassified = "bucket"
            "#,
        )
        .unwrap();
        assert_eq!(config.gate.freshness_hours, 24);
        assert!(!config.gate.skip_known_errors);
        assert_eq!(config.pipeline.unclassified, UnclassifiedPolicy::Bucket);
        assert_eq!(config.retry.attempts, 5);
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let mut config = IngestConfig::default();
        config.retry.attempts = 0;
        assert!(matches!(config.validate(), Err(LabelscopeError::Config(_))));
    }

    #[test]
    fn test_yaml_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labelscope.yaml");
        let mut config = IngestConfig::default();
        config.gate.freshness_hours = 12;
        config.to_yaml(&path).unwrap();
        let parsed = IngestConfig::from_yaml(&path).unwrap();
        assert_eq!(parsed.gate.freshness_hours, 12);
    }
}
