//! # Pipeline Configuration
//!
//! Settings for one pipeline deployment, persisted as JSON in the `.specforge`
//! runtime directory. A missing file means defaults.

use crate::models::ModelSettings;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable that relocates the runtime directory
pub const RUNTIME_PATH_ENV: &str = "SPECFORGE_RUNTIME_PATH";

const CONFIG_FILE: &str = "config.json";
const DATABASE_FILE: &str = "specforge.db";

/// Get the runtime directory path (.specforge)
pub fn runtime_path() -> PathBuf {
    if let Ok(path) = std::env::var(RUNTIME_PATH_ENV) {
        return PathBuf::from(path);
    }

    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(".specforge")
}

/// Bucket names for the three kinds of stored state
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Buckets {
    /// Pipeline deliverables
    pub artifacts: String,
    /// Dialogue transcripts
    pub records: String,
    /// Per-conversation working state (criteria checklist)
    pub state: String,
}

impl Default for Buckets {
    fn default() -> Self {
        Self {
            artifacts: "requirements-artifacts".to_string(),
            records: "interview-records".to_string(),
            state: "pipeline-state".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Dialogue turns before the interviewer is forced to write user requirements
    pub enduser_turn_cap: u32,
    /// Dialogue turns before the deployment interview is forced to conclude
    pub deployer_turn_cap: u32,
    /// Hard cap on decide/act iterations within one loop invocation
    pub max_iterations: u32,
    /// Remembered message IDs per agent; `None` keeps every ID
    pub dedup_window: Option<usize>,
    /// Saturation score above which the interviewer stops asking
    pub saturation_threshold: f64,
    /// How long `Coordinator::run` waits for the reviewed document
    pub run_timeout_secs: u64,
    pub buckets: Buckets,
    /// SQLite database; defaults to `specforge.db` in the runtime directory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,
    pub models: ModelSettings,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            enduser_turn_cap: 15,
            deployer_turn_cap: 20,
            max_iterations: 100,
            dedup_window: Some(10_000),
            saturation_threshold: 0.8,
            run_timeout_secs: 1800,
            buckets: Buckets::default(),
            database_path: None,
            models: ModelSettings::default(),
        }
    }
}

/// Partial settings laid over a loaded config (CLI flags)
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub enduser_turn_cap: Option<u32>,
    pub deployer_turn_cap: Option<u32>,
    pub max_iterations: Option<u32>,
    pub saturation_threshold: Option<f64>,
    pub run_timeout_secs: Option<u64>,
    pub database_path: Option<PathBuf>,
    pub global_provider: Option<crate::models::LlmProvider>,
    pub global_model: Option<String>,
}

impl PipelineConfig {
    pub fn config_path() -> PathBuf {
        runtime_path().join(CONFIG_FILE)
    }

    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| runtime_path().join(DATABASE_FILE))
    }

    /// Load from the runtime directory, falling back to defaults
    pub async fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()).await
    }

    pub async fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config: {:?}", path))?;
        serde_json::from_str(&content).with_context(|| format!("Invalid config file: {:?}", path))
    }

    pub async fn save(&self) -> Result<PathBuf> {
        let path = Self::config_path();
        self.save_to(&path).await?;
        Ok(path)
    }

    pub async fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create runtime directory: {:?}", parent))?;
        }
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content)
            .await
            .with_context(|| format!("Failed to write config: {:?}", path))
    }

    pub fn merge(&mut self, other: ConfigOverrides) {
        if let Some(cap) = other.enduser_turn_cap {
            self.enduser_turn_cap = cap;
        }
        if let Some(cap) = other.deployer_turn_cap {
            self.deployer_turn_cap = cap;
        }
        if let Some(max) = other.max_iterations {
            self.max_iterations = max;
        }
        if let Some(threshold) = other.saturation_threshold {
            self.saturation_threshold = threshold;
        }
        if let Some(secs) = other.run_timeout_secs {
            self.run_timeout_secs = secs;
        }
        if other.database_path.is_some() {
            self.database_path = other.database_path;
        }
        if let Some(provider) = other.global_provider {
            self.models.global_provider = provider;
        }
        if other.global_model.is_some() {
            self.models.global_model = other.global_model;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LlmProvider;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.enduser_turn_cap, 15);
        assert_eq!(config.max_iterations, 100);
        assert_eq!(config.buckets.records, "interview-records");
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"enduser_turn_cap": 4, "buckets": {"artifacts": "a", "records": "r", "state": "s"}}"#)
                .unwrap();
        assert_eq!(config.enduser_turn_cap, 4);
        assert_eq!(config.deployer_turn_cap, 20);
        assert_eq!(config.buckets.artifacts, "a");
    }

    #[test]
    fn test_merge_overrides() {
        let mut config = PipelineConfig::default();
        config.merge(ConfigOverrides {
            enduser_turn_cap: Some(3),
            global_provider: Some(LlmProvider::OpenAI),
            global_model: Some("gpt-4o-mini".to_string()),
            ..ConfigOverrides::default()
        });

        assert_eq!(config.enduser_turn_cap, 3);
        assert_eq!(config.deployer_turn_cap, 20);
        assert_eq!(config.models.resolve("analyst").model, "gpt-4o-mini");
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let path = std::env::temp_dir()
            .join(format!("specforge-config-{}", uuid::Uuid::new_v4()))
            .join(CONFIG_FILE);
        let mut config = PipelineConfig::default();
        config.saturation_threshold = 0.7;
        config.save_to(&path).await.unwrap();

        let loaded = PipelineConfig::load_from(&path).await.unwrap();
        assert_eq!(loaded, config);
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[tokio::test]
    async fn test_missing_file_is_default() {
        let path = std::env::temp_dir().join("specforge-does-not-exist/config.json");
        let loaded = PipelineConfig::load_from(&path).await.unwrap();
        assert_eq!(loaded, PipelineConfig::default());
    }
}
