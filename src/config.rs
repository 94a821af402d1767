//! Configuration management with YAML support

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::continuity::UnchangedPolicy;
use crate::merge::MergeOrder;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sessions: SessionsConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub merge: MergeConfig,

    #[serde(default)]
    pub continuity: ContinuityConfig,

    #[serde(default)]
    pub capture: CaptureConfig,
}

/// Where the assistant writes its raw session logs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// Parent of the per-worktree session directories
    #[serde(default = "default_sessions_base")]
    pub base_path: String,
}

/// Snapshot and context storage locations, relative to the worktree root
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_snapshots_dir")]
    pub snapshots_dir: String,

    #[serde(default = "default_context_dir")]
    pub context_dir: String,

    #[serde(default)]
    pub backend: StorageBackend,
}

/// Backend holding merged context documents
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    File,
    Sqlite,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MergeConfig {
    #[serde(default)]
    pub order: MergeOrder,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContinuityConfig {
    #[serde(default)]
    pub unchanged: UnchangedPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Only pick up logs modified after the parent commit was made
    #[serde(default = "default_enabled")]
    pub only_since_parent: bool,
}

// Default value functions
fn default_sessions_base() -> String {
    "~/.claude/projects".to_string()
}

fn default_snapshots_dir() -> String {
    ".cc-snapshots".to_string()
}

fn default_context_dir() -> String {
    ".cc-context".to_string()
}

fn default_enabled() -> bool {
    true
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            base_path: default_sessions_base(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            snapshots_dir: default_snapshots_dir(),
            context_dir: default_context_dir(),
            backend: StorageBackend::default(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            only_since_parent: true,
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    /// Searches in order:
    /// 1. Provided path
    /// 2. ./cc-context.yaml (current directory)
    /// 3. ~/.config/cc-context/cc-context.yaml
    pub fn load(path: &str) -> Result<Self> {
        let search_paths = vec![
            shellexpand::tilde(path).to_string(),
            "cc-context.yaml".to_string(),
            dirs::home_dir()
                .unwrap_or_default()
                .join(".config/cc-context/cc-context.yaml")
                .to_string_lossy()
                .to_string(),
        ];

        for search_path in &search_paths {
            if std::path::Path::new(search_path).exists() {
                let content = std::fs::read_to_string(search_path)
                    .with_context(|| format!("reading config {}", search_path))?;
                let config: Config = serde_yaml::from_str(&content)
                    .with_context(|| format!("parsing config {}", search_path))?;
                return Ok(config);
            }
        }

        // No config file found, use defaults
        Ok(Config::default())
    }

    /// Get the sessions base path, expanding ~ to home directory
    pub fn sessions_base(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.sessions.base_path).to_string())
    }
}
