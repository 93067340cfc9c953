//! Stage execution: run the image once against a workspace's contract mounts.

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use crate::core::errors::{HarnessError, Result};
use crate::core::paths::sanitize_component;
use crate::runtime::process::{self, OutputMode};
use crate::runtime::provision::ImageRef;
use crate::suite::workspace::{ContractSubtree, Workspace};

/// A host directory or file bound into the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeBinding {
    pub host_path: PathBuf,
    pub container_path: String,
}

impl VolumeBinding {
    /// `host:container`, as passed to `--volume`.
    #[must_use]
    pub fn as_arg(&self) -> String {
        format!("{}:{}", self.host_path.display(), self.container_path)
    }
}

/// Host kubeconfig and where it appears inside the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterCredentials {
    pub host_path: PathBuf,
    pub container_path: String,
}

/// The three contract mounts for `workspace`, plus the credentials mount if any.
#[must_use]
pub fn contract_bindings(
    workspace: &Workspace,
    credentials: Option<&ClusterCredentials>,
) -> Vec<VolumeBinding> {
    let mut bindings: Vec<VolumeBinding> = ContractSubtree::ALL
        .iter()
        .map(|subtree| VolumeBinding {
            host_path: workspace.subtree(*subtree),
            container_path: subtree.mount_point().to_string(),
        })
        .collect();
    if let Some(creds) = credentials {
        bindings.push(VolumeBinding {
            host_path: creds.host_path.clone(),
            container_path: creds.container_path.clone(),
        });
    }
    bindings
}

/// Deadline for removing a container left behind by a timed-out run.
const REMOVE_TIMEOUT: Duration = Duration::from_secs(30);

/// Container name for a run against `workspace`: the workspace directory name,
/// made acceptable to the runtime.
#[must_use]
pub fn container_name(workspace: &Workspace) -> String {
    let stem = workspace
        .root()
        .file_name()
        .map(|name| sanitize_component(&name.to_string_lossy()))
        .unwrap_or_default();
    if stem.starts_with(|c: char| c.is_ascii_alphanumeric()) {
        stem
    } else {
        format!("stagecheck{stem}")
    }
}

/// Runs the image under test. One call per testcase, never concurrently.
pub trait StageExecutor {
    /// Block until the container exits. Only exit code zero is success.
    fn execute(&self, image: &ImageRef, workspace: &Workspace) -> Result<()>;
}

/// Executes via `<runtime> run --rm --network=host ...`.
#[derive(Debug, Clone)]
pub struct ContainerExecutor {
    runtime_binary: String,
    timeout: Option<Duration>,
    credentials: Option<ClusterCredentials>,
    command: Option<String>,
    output: OutputMode,
}

impl ContainerExecutor {
    #[must_use]
    pub fn new(runtime_binary: impl Into<String>) -> Self {
        Self {
            runtime_binary: runtime_binary.into(),
            timeout: None,
            credentials: None,
            command: None,
            output: OutputMode::Capture,
        }
    }

    /// Kill the run and remove its container after `timeout`. `None` waits forever.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_credentials(mut self, credentials: Option<ClusterCredentials>) -> Self {
        self.credentials = credentials;
        self
    }

    /// Override the entrypoint with `sh -c <command>`.
    #[must_use]
    pub fn with_command(mut self, command: Option<String>) -> Self {
        self.command = command;
        self
    }

    /// Stream container output to the terminal instead of capturing it.
    #[must_use]
    pub fn with_streaming(mut self, stream: bool) -> Self {
        self.output = if stream {
            OutputMode::Stream
        } else {
            OutputMode::Capture
        };
        self
    }

    #[must_use]
    pub fn run_args(&self, image: &ImageRef, workspace: &Workspace) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "--rm".to_string(),
            "--network=host".to_string(),
            "--name".to_string(),
            container_name(workspace),
        ];
        for binding in contract_bindings(workspace, self.credentials.as_ref()) {
            args.push("--volume".to_string());
            args.push(binding.as_arg());
        }
        args.push(image.to_string());
        if let Some(command) = &self.command {
            args.extend(["sh".to_string(), "-c".to_string(), command.clone()]);
        }
        args
    }

    // Killing the client does not stop a container the daemon already started.
    fn remove_container(&self, name: &str) {
        let _ = process::run(
            Command::new(&self.runtime_binary).args(["rm", "--force", name]),
            OutputMode::Capture,
            Some(REMOVE_TIMEOUT),
        );
    }
}

impl StageExecutor for ContainerExecutor {
    fn execute(&self, image: &ImageRef, workspace: &Workspace) -> Result<()> {
        let outcome = process::run(
            Command::new(&self.runtime_binary).args(self.run_args(image, workspace)),
            self.output,
            self.timeout,
        )
        .map_err(|source| HarnessError::ContainerStart {
            program: self.runtime_binary.clone(),
            source,
        })?;

        if outcome.timed_out {
            self.remove_container(&container_name(workspace));
            return Err(HarnessError::ContainerTimeout {
                image: image.to_string(),
                timeout: self.timeout.unwrap_or(outcome.duration),
            });
        }
        if outcome.success() {
            Ok(())
        } else {
            Err(HarnessError::ContainerExit {
                image: image.to_string(),
                code: outcome.exit_code(),
                stderr_tail: outcome.stderr_tail,
            })
        }
    }
}
