//! Harness configuration
//!
//! Endpoint, ingestion, polling, and default synthesis settings. Loaded from a
//! TOML file; every field has a default so partial files are fine.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::ingest::{IngestConfig, PollConfig, DEFAULT_BATCH_SIZE};
use crate::synthetic::{MissingMode, SynthesisParams};

/// Top-level harness configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HarnessConfig {
    #[serde(default)]
    pub endpoint: EndpointConfig,

    #[serde(default)]
    pub ingest: IngestSettings,

    #[serde(default)]
    pub poll: PollSettings,

    #[serde(default)]
    pub synthesis: SynthesisSettings,
}

impl HarnessConfig {
    /// Load from TOML file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load from `TSDATA_CONFIG_PATH` (or `tsdata.toml`), then apply env overrides.
    pub fn from_env() -> Self {
        let path =
            std::env::var("TSDATA_CONFIG_PATH").unwrap_or_else(|_| "tsdata.toml".to_string());

        let mut config = Self::load(&path).unwrap_or_else(|e| {
            tracing::debug!("Using default harness config ({}): {}", path, e);
            Self::default()
        });
        config.endpoint.apply_env();
        config
    }

    /// Save to TOML file
    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}

/// Destination endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    #[serde(default = "default_url")]
    pub url: String,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// Per-request timeout (seconds)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Accept self-signed certificates (local clusters)
    #[serde(default)]
    pub insecure_tls: bool,
}

fn default_url() -> String {
    "http://localhost:9200".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            username: None,
            password: None,
            timeout_secs: default_timeout_secs(),
            insecure_tls: false,
        }
    }
}

impl EndpointConfig {
    /// `OPENSEARCH_URL`, `OPENSEARCH_USER` and `OPENSEARCH_PASSWORD` win over the file.
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("OPENSEARCH_URL") {
            self.url = url;
        }
        if let Ok(user) = std::env::var("OPENSEARCH_USER") {
            self.username = Some(user);
        }
        if let Ok(password) = std::env::var("OPENSEARCH_PASSWORD") {
            self.password = Some(password);
        }
    }
}

/// Bulk ingestion pacing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestSettings {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Pause between bulk requests (ms)
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,

    /// Pause after creating the collection (ms)
    #[serde(default = "default_create_settle_ms")]
    pub create_settle_ms: u64,
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}
fn default_batch_delay_ms() -> u64 {
    1_000
}
fn default_create_settle_ms() -> u64 {
    1_000
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            batch_delay_ms: default_batch_delay_ms(),
            create_settle_ms: default_create_settle_ms(),
        }
    }
}

impl IngestSettings {
    pub fn to_ingest_config(&self) -> IngestConfig {
        IngestConfig {
            batch_size: self.batch_size,
            batch_delay: Duration::from_millis(self.batch_delay_ms),
            create_settle: Duration::from_millis(self.create_settle_ms),
        }
    }
}

/// Completion polling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollSettings {
    #[serde(default = "default_max_cycles")]
    pub max_cycles: u32,

    /// Pause between poll cycles (ms)
    #[serde(default = "default_cycle_delay_ms")]
    pub cycle_delay_ms: u64,

    /// Accepted distance between the latest id and the expected last id
    #[serde(default = "default_tolerance")]
    pub tolerance: u64,

    #[serde(default = "default_sort_field")]
    pub sort_field: String,
}

fn default_max_cycles() -> u32 {
    4
}
fn default_cycle_delay_ms() -> u64 {
    1_000
}
fn default_tolerance() -> u64 {
    3
}
fn default_sort_field() -> String {
    "timestamp".to_string()
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            max_cycles: default_max_cycles(),
            cycle_delay_ms: default_cycle_delay_ms(),
            tolerance: default_tolerance(),
            sort_field: default_sort_field(),
        }
    }
}

impl PollSettings {
    pub fn to_poll_config(&self) -> PollConfig {
        PollConfig {
            max_cycles: self.max_cycles,
            cycle_delay: Duration::from_millis(self.cycle_delay_ms),
            tolerance: self.tolerance,
            sort_field: self.sort_field.clone(),
        }
    }
}

/// Defaults for generated datasets
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisSettings {
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u32,

    #[serde(default = "default_train_test_split")]
    pub train_test_split: usize,

    #[serde(default = "default_entities")]
    pub entities: usize,

    #[serde(default = "default_categorical_field")]
    pub categorical_field: String,

    #[serde(default = "default_mode")]
    pub mode: MissingMode,

    #[serde(default)]
    pub impute_start: u64,

    #[serde(default)]
    pub impute_end: u64,

    #[serde(default = "default_sample_count")]
    pub sample_count: usize,

    /// Fixed seed for drop decisions; unseeded when absent
    #[serde(default)]
    pub drop_seed: Option<u64>,
}

fn default_interval_minutes() -> u32 {
    1
}
fn default_train_test_split() -> usize {
    200
}
fn default_entities() -> usize {
    2
}
fn default_categorical_field() -> String {
    "componentName".to_string()
}
fn default_mode() -> MissingMode {
    MissingMode::NoMissingData
}
fn default_sample_count() -> usize {
    210
}

impl Default for SynthesisSettings {
    fn default() -> Self {
        Self {
            interval_minutes: default_interval_minutes(),
            train_test_split: default_train_test_split(),
            entities: default_entities(),
            categorical_field: default_categorical_field(),
            mode: default_mode(),
            impute_start: 0,
            impute_end: 0,
            sample_count: default_sample_count(),
            drop_seed: None,
        }
    }
}

impl SynthesisSettings {
    pub fn to_params(&self) -> SynthesisParams {
        SynthesisParams::new(
            self.interval_minutes,
            self.train_test_split,
            self.entities,
            self.categorical_field.clone(),
            self.mode,
        )
        .with_impute_window(self.impute_start, self.impute_end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: HarnessConfig = toml::from_str(
            r#"
            [endpoint]
            url = "https://search.internal:9200"
            insecure_tls = true

            [synthesis]
            mode = "MISSING_ENTITY"
            entities = 4
            "#,
        )
        .unwrap();

        assert_eq!(config.endpoint.url, "https://search.internal:9200");
        assert!(config.endpoint.insecure_tls);
        assert_eq!(config.endpoint.timeout_secs, 30);
        assert_eq!(config.ingest.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(config.poll.max_cycles, 4);
        assert_eq!(config.poll.tolerance, 3);
        assert_eq!(config.synthesis.mode, MissingMode::MissingEntity);
        assert_eq!(config.synthesis.entities, 4);
        assert_eq!(config.synthesis.train_test_split, 200);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tsdata.toml");
        let mut config = HarnessConfig::default();
        config.ingest.batch_size = 250;
        config.synthesis.drop_seed = Some(9);
        config.save(&path).unwrap();

        let loaded = HarnessConfig::load(&path).unwrap();
        assert_eq!(loaded.ingest.batch_size, 250);
        assert_eq!(loaded.synthesis.drop_seed, Some(9));
        assert_eq!(loaded.poll.sort_field, "timestamp");
    }

    #[test]
    fn test_settings_convert_to_runtime_configs() {
        let settings = HarnessConfig::default();
        let ingest = settings.ingest.to_ingest_config();
        assert_eq!(ingest.batch_size, 1_000);
        assert_eq!(ingest.batch_delay, Duration::from_secs(1));
        let poll = settings.poll.to_poll_config();
        assert_eq!(poll.cycle_delay, Duration::from_secs(1));
        let params = settings.synthesis.to_params();
        assert_eq!(params.number_of_entities, 2);
        assert!(params.validate().is_ok());
    }
}
