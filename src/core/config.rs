//! Configuration system: TOML file + env var overrides + smart defaults.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::errors::{HarnessError, Result};

/// Full stagecheck configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Config {
    pub runtime: RuntimeConfig,
    pub workspace: WorkspaceConfig,
    pub paths: PathsConfig,
}

/// External tools and container execution knobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Container runtime binary name or path (`docker`, `podman`, ...).
    pub container_binary: String,
    /// Local cluster tool used for image loading and cluster lookup.
    pub kind_binary: String,
    /// Tag appended to the synthesized image name.
    pub image_tag: String,
    /// Per-testcase deadline for the container run. `0` waits forever.
    pub timeout_secs: u64,
    /// Host kubeconfig mounted into the container when a cluster is named.
    pub kubeconfig: PathBuf,
    /// Where the kubeconfig lands inside the container.
    pub container_kubeconfig: PathBuf,
}

/// Where and how per-testcase workspaces are created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WorkspaceConfig {
    pub base_dir: PathBuf,
    pub prefix: String,
    /// Keep workspaces after their verdict is recorded.
    pub keep: bool,
}

/// Filesystem paths used by stagecheck.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    pub config_file: PathBuf,
    /// Root holding `<lifecycle>/<action>/<pipeline>/<container>` trees.
    pub workflows_root: PathBuf,
    /// JSONL activity log. Empty disables logging.
    pub activity_log: PathBuf,
}

fn home_dir() -> PathBuf {
    env::var_os("HOME").map_or_else(
        || {
            eprintln!("[STC-CONFIG] WARNING: HOME not set, falling back to /tmp for data paths");
            PathBuf::from("/tmp")
        },
        PathBuf::from,
    )
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            container_binary: "docker".to_string(),
            kind_binary: "kind".to_string(),
            image_tag: "dev".to_string(),
            timeout_secs: 900,
            kubeconfig: home_dir().join(".kube").join("config"),
            container_kubeconfig: PathBuf::from("/root/.kube/config"),
        }
    }
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            base_dir: env::temp_dir(),
            prefix: "stagecheck".to_string(),
            keep: true,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        let home = home_dir();
        Self {
            config_file: home.join(".config").join("stagecheck").join("config.toml"),
            workflows_root: PathBuf::from("workflows"),
            activity_log: home
                .join(".local")
                .join("share")
                .join("stagecheck")
                .join("activity.jsonl"),
        }
    }
}

impl RuntimeConfig {
    /// Container deadline, `None` when disabled.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

impl PathsConfig {
    /// Activity log path, `None` when logging is disabled.
    #[must_use]
    pub fn activity_log(&self) -> Option<&Path> {
        (!self.activity_log.as_os_str().is_empty()).then_some(self.activity_log.as_path())
    }
}

impl Config {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        PathsConfig::default().config_file
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Missing config file is not an error when loading from default path; defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);
        let is_explicit_path = path.is_some();

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|source| HarnessError::Io {
                path: path_buf.clone(),
                source,
            })?;
            let parsed: Self = toml::from_str(&raw)?;
            parsed
        } else if is_explicit_path {
            return Err(HarnessError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.paths.config_file = path_buf;
        cfg.apply_env_overrides_from(env_var)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| HarnessError::Serialization {
            context: "toml",
            details: e.to_string(),
        })
    }

    fn apply_env_overrides_from<F>(&mut self, mut lookup: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<String>,
    {
        // runtime
        if let Some(raw) = lookup("STAGECHECK_RUNTIME_CONTAINER_BINARY") {
            self.runtime.container_binary = raw;
        }
        if let Some(raw) = lookup("STAGECHECK_RUNTIME_KIND_BINARY") {
            self.runtime.kind_binary = raw;
        }
        if let Some(raw) = lookup("STAGECHECK_RUNTIME_IMAGE_TAG") {
            self.runtime.image_tag = raw;
        }
        if let Some(raw) = lookup("STAGECHECK_RUNTIME_TIMEOUT_SECS") {
            self.runtime.timeout_secs = parse_env_u64("STAGECHECK_RUNTIME_TIMEOUT_SECS", &raw)?;
        }
        if let Some(raw) = lookup("STAGECHECK_RUNTIME_KUBECONFIG") {
            self.runtime.kubeconfig = PathBuf::from(raw);
        }

        // workspace
        if let Some(raw) = lookup("STAGECHECK_WORKSPACE_BASE_DIR") {
            self.workspace.base_dir = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("STAGECHECK_WORKSPACE_PREFIX") {
            self.workspace.prefix = raw;
        }
        if let Some(raw) = lookup("STAGECHECK_WORKSPACE_KEEP") {
            self.workspace.keep = parse_env_bool("STAGECHECK_WORKSPACE_KEEP", &raw)?;
        }

        // paths
        if let Some(raw) = lookup("STAGECHECK_PATHS_WORKFLOWS_ROOT") {
            self.paths.workflows_root = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("STAGECHECK_PATHS_ACTIVITY_LOG") {
            self.paths.activity_log = PathBuf::from(raw);
        }

        Ok(())
    }

    fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("runtime.container_binary", &self.runtime.container_binary),
            ("runtime.kind_binary", &self.runtime.kind_binary),
            ("runtime.image_tag", &self.runtime.image_tag),
            ("workspace.prefix", &self.workspace.prefix),
        ] {
            if value.trim().is_empty() {
                return Err(HarnessError::InvalidConfig {
                    details: format!("{name} must not be empty"),
                });
            }
        }

        if self
            .runtime
            .image_tag
            .chars()
            .any(|c| c.is_whitespace() || c == ':' || c == '/')
        {
            return Err(HarnessError::InvalidConfig {
                details: format!(
                    "runtime.image_tag {:?} must not contain whitespace, ':' or '/'",
                    self.runtime.image_tag
                ),
            });
        }

        if self.workspace.prefix.contains(std::path::MAIN_SEPARATOR) {
            return Err(HarnessError::InvalidConfig {
                details: "workspace.prefix must be a single path component".to_string(),
            });
        }

        if self.workspace.base_dir.as_os_str().is_empty() {
            return Err(HarnessError::InvalidConfig {
                details: "workspace.base_dir must not be empty".to_string(),
            });
        }

        if !self.runtime.container_kubeconfig.is_absolute() {
            return Err(HarnessError::InvalidConfig {
                details: "runtime.container_kubeconfig must be an absolute in-container path"
                    .to_string(),
            });
        }

        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn parse_env_u64(name: &str, raw: &str) -> Result<u64> {
    raw.trim()
        .parse::<u64>()
        .map_err(|error| HarnessError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })
}

fn parse_env_bool(name: &str, raw: &str) -> Result<bool> {
    raw.trim()
        .parse::<bool>()
        .map_err(|error| HarnessError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })
}
