//! Config - TOML 設定
//!
//! すべてのセクションに既定値があるので、空ファイル（またはファイルなし）でも
//! 動きます。

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::eviction::RetentionPolicy;
use crate::domain::CertError;
use crate::render::RenderOptions;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub assets: AssetsConfig,
    pub render: RenderOptions,
    pub storage: StorageConfig,
    pub coordinator: CoordinatorConfig,
    pub downloads: DownloadsConfig,
    pub retention: RetentionConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetsConfig {
    pub template: PathBuf,
    pub font: PathBuf,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            template: PathBuf::from("assets/template.jpg"),
            font: PathBuf::from("assets/font.ttf"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub artifact_dir: PathBuf,
    /// JSON record book; unset means an empty in-memory book.
    pub records_path: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            artifact_dir: PathBuf::from("generated_files"),
            records_path: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    pub cooldown_secs: u64,
    pub marker_ttl_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: 3600,
            marker_ttl_secs: 24 * 3600,
            sweep_interval_secs: 3600,
        }
    }
}

impl CoordinatorConfig {
    pub fn cooldown(&self) -> Duration {
        secs(self.cooldown_secs)
    }

    pub fn marker_ttl(&self) -> Duration {
        secs(self.marker_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        secs(self.sweep_interval_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadsConfig {
    pub session_ttl_secs: u64,
}

impl Default for DownloadsConfig {
    fn default() -> Self {
        Self {
            session_ttl_secs: 3600,
        }
    }
}

impl DownloadsConfig {
    pub fn session_ttl(&self) -> Duration {
        secs(self.session_ttl_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub window_days: u32,
    pub prune_fraction: f64,
    /// Fixed seed for the pruning pass; unset draws from entropy.
    pub seed: Option<u64>,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            window_days: 10,
            prune_fraction: 0.2,
            seed: None,
        }
    }
}

impl RetentionConfig {
    pub fn policy(&self) -> RetentionPolicy {
        RetentionPolicy {
            window: Duration::days(i64::from(self.window_days)),
            prune_fraction: self.prune_fraction,
        }
    }
}

fn secs(value: u64) -> Duration {
    Duration::seconds(value.min(i64::MAX as u64 / 1000) as i64)
}

impl Config {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ConfigError::Read(CertError::storage(path.display().to_string(), e)))?;
        Self::from_toml_str(&raw)
    }

    /// `path` when given, defaults otherwise.
    pub async fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path).await,
            None => Ok(Self::default()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Read(#[source] CertError),
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}
