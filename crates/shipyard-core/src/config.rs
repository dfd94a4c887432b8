use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::types::Action;

// ── Config ──

/// Runtime configuration. Every field has a default, so an empty `{}` or a
/// missing file are both valid.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ShipyardConfig {
    /// Base URL of the OpenAI-compatible text-generation server.
    pub backend_url: String,
    pub model: String,
    pub backend_timeout_sec: u64,
    pub git_bin: String,
    pub kubectl_bin: String,
    /// Root of the disposable workspaces. `None` means `<temp>/shipyard-repos`.
    pub work_root: Option<PathBuf>,
    pub primary_branch: String,
    /// Action used when the model answers with an unknown verb.
    pub default_action: Action,
    pub clone_timeout_sec: u64,
    pub exec_timeout_sec: u64,
    pub context_deadline_ms: u64,
}

impl Default for ShipyardConfig {
    fn default() -> Self {
        Self {
            backend_url: "http://localhost:11434".into(),
            model: "deepseek-coder-v2:16b".into(),
            backend_timeout_sec: 120,
            git_bin: "git".into(),
            kubectl_bin: "kubectl".into(),
            work_root: None,
            primary_branch: "main".into(),
            default_action: Action::Show,
            clone_timeout_sec: 300,
            exec_timeout_sec: 120,
            context_deadline_ms: 3000,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl ShipyardConfig {
    /// `<config dir>/shipyard/config.json`, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("shipyard").join("config.json"))
    }

    /// Load from an explicit path, or the default location when `None`.
    /// A missing file yields defaults; a malformed one is an error.
    /// Environment overrides are applied last.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.map(Path::to_path_buf).or_else(Self::default_path);
        let mut cfg = match path {
            Some(p) => Self::from_file(&p)?,
            None => Self::default(),
        };
        cfg.apply_env(|key| std::env::var(key).ok());
        Ok(cfg)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `SHIPYARD_*` overrides. Empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(v) = get("SHIPYARD_BACKEND_URL") {
            self.backend_url = v;
        }
        if let Some(v) = get("SHIPYARD_MODEL") {
            self.model = v;
        }
        if let Some(v) = get("SHIPYARD_KUBECTL") {
            self.kubectl_bin = v;
        }
        if let Some(v) = get("SHIPYARD_GIT") {
            self.git_bin = v;
        }
        if let Some(v) = get("SHIPYARD_WORK_ROOT") {
            self.work_root = Some(PathBuf::from(v));
        }
    }

    /// Effective workspace root.
    pub fn work_root(&self) -> PathBuf {
        self.work_root
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("shipyard-repos"))
    }

    pub fn backend_timeout(&self) -> Duration {
        Duration::from_secs(self.backend_timeout_sec)
    }

    pub fn clone_timeout(&self) -> Duration {
        Duration::from_secs(self.clone_timeout_sec)
    }

    pub fn exec_timeout(&self) -> Duration {
        Duration::from_secs(self.exec_timeout_sec)
    }

    pub fn context_deadline(&self) -> Duration {
        Duration::from_millis(self.context_deadline_ms)
    }
}
