//! Suite location: which pipeline stage is under test, and where its files live.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Serialize;

use crate::core::errors::{HarnessError, Result};

/// Workflow lifecycle a pipeline belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Lifecycle {
    Resource,
    Promise,
}

/// Workflow action a pipeline runs for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Configure,
    Delete,
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resource => f.write_str("resource"),
            Self::Promise => f.write_str("promise"),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configure => f.write_str("configure"),
            Self::Delete => f.write_str("delete"),
        }
    }
}

/// `lifecycle/action/pipeline/container`, supplied once per invocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TestSuiteLocation {
    pub lifecycle: Lifecycle,
    pub action: Action,
    pub pipeline: String,
    pub container: String,
}

impl TestSuiteLocation {
    /// `<workflows_root>/<lifecycle>/<action>/<pipeline>`.
    #[must_use]
    pub fn pipeline_dir(&self, workflows_root: &Path) -> PathBuf {
        workflows_root
            .join(self.lifecycle.to_string())
            .join(self.action.to_string())
            .join(&self.pipeline)
    }

    /// Build context of the image under test.
    #[must_use]
    pub fn source_dir(&self, workflows_root: &Path) -> PathBuf {
        self.pipeline_dir(workflows_root).join(&self.container)
    }

    /// Directory holding one subdirectory per testcase.
    #[must_use]
    pub fn fixture_root(&self, workflows_root: &Path) -> PathBuf {
        self.source_dir(workflows_root).join("test")
    }

    /// Image name synthesized from the location, e.g. `resource-configure-instance-demo:dev`.
    #[must_use]
    pub fn image_name(&self, tag: &str) -> String {
        format!(
            "{}-{}-{}-{}:{tag}",
            self.lifecycle, self.action, self.pipeline, self.container
        )
    }
}

impl fmt::Display for TestSuiteLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.lifecycle, self.action, self.pipeline, self.container
        )
    }
}

impl FromStr for TestSuiteLocation {
    type Err = HarnessError;

    fn from_str(input: &str) -> Result<Self> {
        let invalid = |details: String| HarnessError::InvalidSuiteLocation {
            input: input.to_string(),
            details,
        };

        let segments: Vec<&str> = input.split('/').collect();
        if segments.len() != 4 {
            return Err(invalid(format!(
                "expected LIFECYCLE/ACTION/PIPELINE-NAME/CONTAINER-NAME, got {} segment(s)",
                segments.len()
            )));
        }
        for segment in &segments {
            if segment.is_empty() || *segment == "." || *segment == ".." {
                return Err(invalid(format!("segment {segment:?} is not a name")));
            }
            if segment.chars().any(char::is_whitespace) {
                return Err(invalid(format!("segment {segment:?} contains whitespace")));
            }
        }

        let lifecycle = match segments[0] {
            "resource" => Lifecycle::Resource,
            "promise" => Lifecycle::Promise,
            other => {
                return Err(invalid(format!(
                    "lifecycle must be 'resource' or 'promise', got {other:?}"
                )));
            }
        };
        let action = match segments[1] {
            "configure" => Action::Configure,
            "delete" => Action::Delete,
            other => {
                return Err(invalid(format!(
                    "action must be 'configure' or 'delete', got {other:?}"
                )));
            }
        };

        Ok(Self {
            lifecycle,
            action,
            pipeline: segments[2].to_string(),
            container: segments[3].to_string(),
        })
    }
}
