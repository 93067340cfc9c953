//! STC-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::suite::verify::Divergence;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, HarnessError>;

/// Top-level error type for stagecheck.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("[STC-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[STC-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[STC-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[STC-1004] invalid suite location {input:?}: {details}")]
    InvalidSuiteLocation { input: String, details: String },

    #[error("[STC-1005] invalid testcase name {name:?}")]
    InvalidTestcaseName { name: String },

    #[error("[STC-1101] {tool} not found in PATH ({remediation})")]
    MissingTool { tool: String, remediation: String },

    #[error("[STC-1102] kind cluster {cluster:?} does not exist")]
    ClusterNotFound { cluster: String },

    #[error("[STC-2001] fixture root {path} is unreadable: {source}")]
    FixtureRootUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[STC-2002] testcase directory {path} does not exist")]
    FixtureNotFound { path: PathBuf },

    #[error("[STC-2101] image build failed for {image}: {details}")]
    ImageBuild { image: String, details: String },

    #[error("[STC-2102] loading {image} into kind cluster {cluster:?} failed: {details}")]
    ImageLoad {
        image: String,
        cluster: String,
        details: String,
    },

    #[error("[STC-3001] workspace materialization failed at {path}: {source}")]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[STC-3002] workspace {path} lies inside fixture directory {fixture}")]
    WorkspaceInsideFixture { path: PathBuf, fixture: PathBuf },

    #[error("[STC-3101] failed to start {program}: {source}")]
    ContainerStart {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("[STC-3102] container {image} exited with {}{}", exit_label(.code), stderr_suffix(.stderr_tail))]
    ContainerExit {
        image: String,
        code: Option<i32>,
        stderr_tail: String,
    },

    #[error("[STC-3103] container {image} timed out after {timeout:?}")]
    ContainerTimeout { image: String, timeout: Duration },

    #[error("[STC-3201] {0}")]
    Verification(Divergence),

    #[error("[STC-3901] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[STC-3902] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[STC-3903] runtime failure: {details}")]
    Runtime { details: String },
}

#[allow(clippy::ref_option)]
fn exit_label(code: &Option<i32>) -> String {
    code.map_or_else(|| "no exit code (signal)".to_string(), |c| format!("exit code {c}"))
}

fn stderr_suffix(tail: &str) -> String {
    if tail.trim().is_empty() {
        String::new()
    } else {
        format!(": {}", tail.trim())
    }
}

impl HarnessError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "STC-1001",
            Self::MissingConfig { .. } => "STC-1002",
            Self::ConfigParse { .. } => "STC-1003",
            Self::InvalidSuiteLocation { .. } => "STC-1004",
            Self::InvalidTestcaseName { .. } => "STC-1005",
            Self::MissingTool { .. } => "STC-1101",
            Self::ClusterNotFound { .. } => "STC-1102",
            Self::FixtureRootUnreadable { .. } => "STC-2001",
            Self::FixtureNotFound { .. } => "STC-2002",
            Self::ImageBuild { .. } => "STC-2101",
            Self::ImageLoad { .. } => "STC-2102",
            Self::Workspace { .. } => "STC-3001",
            Self::WorkspaceInsideFixture { .. } => "STC-3002",
            Self::ContainerStart { .. } => "STC-3101",
            Self::ContainerExit { .. } => "STC-3102",
            Self::ContainerTimeout { .. } => "STC-3103",
            Self::Verification(_) => "STC-3201",
            Self::Serialization { .. } => "STC-3901",
            Self::Io { .. } => "STC-3902",
            Self::Runtime { .. } => "STC-3903",
        }
    }

    /// Whether the error stems from bad user input rather than the environment.
    #[must_use]
    pub const fn is_usage(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfig { .. }
                | Self::MissingConfig { .. }
                | Self::ConfigParse { .. }
                | Self::InvalidSuiteLocation { .. }
                | Self::InvalidTestcaseName { .. }
                | Self::FixtureNotFound { .. }
                | Self::WorkspaceInsideFixture { .. }
        )
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Convenience constructor for workspace copy failures.
    #[must_use]
    pub fn workspace(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Workspace {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

impl From<Divergence> for HarnessError {
    fn from(value: Divergence) -> Self {
        Self::Verification(value)
    }
}

impl From<serde_json::Error> for HarnessError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for HarnessError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}
