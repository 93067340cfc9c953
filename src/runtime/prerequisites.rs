//! Toolchain preflight: the container runtime, and kind when a cluster is named.
//!
//! Checks run before any image is built so a missing tool fails fast with a
//! remediation hint instead of surfacing as a spawn error mid-suite.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::core::config::RuntimeConfig;
use crate::core::errors::{HarnessError, Result};

/// External tools the harness shells out to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
    /// Builds and runs the image under test.
    ContainerRuntime,
    /// Loads the built image into a local cluster.
    Kind,
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ContainerRuntime => f.write_str("container runtime"),
            Self::Kind => f.write_str("kind"),
        }
    }
}

/// Result of probing a single tool.
#[derive(Debug, Clone)]
pub struct ToolStatus {
    pub tool: Tool,
    /// Binary name or path as configured.
    pub binary: String,
    pub available: bool,
    pub remediation: Option<String>,
}

/// Gate run once per invocation before anything is built.
pub trait Preflight {
    /// Fail unless every tool needed for this run is present.
    fn verify(&self, cluster: Option<&str>) -> Result<()>;
}

/// Checks the real toolchain named in [`RuntimeConfig`].
#[derive(Debug, Clone)]
pub struct ToolchainPreflight {
    container_binary: String,
    kind_binary: String,
}

impl ToolchainPreflight {
    #[must_use]
    pub fn new(config: &RuntimeConfig) -> Self {
        Self {
            container_binary: config.container_binary.clone(),
            kind_binary: config.kind_binary.clone(),
        }
    }

    /// Statuses of the tools a run with `cluster` would need, in check order.
    #[must_use]
    pub fn check_tools(&self, cluster: Option<&str>) -> Vec<ToolStatus> {
        let mut statuses = vec![check_single(Tool::ContainerRuntime, &self.container_binary)];
        if cluster.is_some() {
            statuses.push(check_single(Tool::Kind, &self.kind_binary));
        }
        statuses
    }

    fn ensure_cluster_exists(&self, cluster: &str) -> Result<()> {
        let output = Command::new(&self.kind_binary)
            .args(["get", "clusters"])
            .output()
            .map_err(|source| HarnessError::Runtime {
                details: format!("failed to run {} get clusters: {source}", self.kind_binary),
            })?;
        if !output.status.success() {
            return Err(HarnessError::Runtime {
                details: format!(
                    "{} get clusters failed: {}",
                    self.kind_binary,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        if cluster_listed(&String::from_utf8_lossy(&output.stdout), cluster) {
            Ok(())
        } else {
            Err(HarnessError::ClusterNotFound {
                cluster: cluster.to_string(),
            })
        }
    }
}

impl Preflight for ToolchainPreflight {
    fn verify(&self, cluster: Option<&str>) -> Result<()> {
        if let Some(missing) = self
            .check_tools(cluster)
            .into_iter()
            .find(|status| !status.available)
        {
            return Err(HarnessError::MissingTool {
                tool: missing.binary,
                remediation: missing.remediation.unwrap_or_default(),
            });
        }
        match cluster {
            Some(name) => self.ensure_cluster_exists(name),
            None => Ok(()),
        }
    }
}

/// Whether `kind get clusters` output lists `name` on a line of its own.
#[must_use]
pub fn cluster_listed(output: &str, name: &str) -> bool {
    output.lines().any(|line| line.trim() == name)
}

fn check_single(tool: Tool, binary: &str) -> ToolStatus {
    let available = which_binary(binary).is_some();
    ToolStatus {
        tool,
        binary: binary.to_string(),
        available,
        remediation: (!available).then(|| remediation_for(tool)),
    }
}

/// Resolve `name` against PATH. Names containing a separator are checked as-is.
pub(crate) fn which_binary(name: &str) -> Option<PathBuf> {
    if name.contains(std::path::MAIN_SEPARATOR) || name.contains('/') {
        let candidate = Path::new(name);
        return candidate.is_file().then(|| candidate.to_path_buf());
    }
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

fn remediation_for(tool: Tool) -> String {
    match tool {
        Tool::ContainerRuntime => {
            "install Docker (https://docs.docker.com/get-docker/) or set runtime.container_binary"
                .to_string()
        }
        Tool::Kind => {
            "install kind (go install sigs.k8s.io/kind@latest) or set runtime.kind_binary"
                .to_string()
        }
    }
}
