//! Per-testcase verdicts and the aggregated suite report.

#![allow(missing_docs)]

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::errors::{HarnessError, Result};

/// Where in the per-testcase sequence a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureStage {
    Materialize,
    Execute,
    Verify,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Materialize => f.write_str("materialize"),
            Self::Execute => f.write_str("execute"),
            Self::Verify => f.write_str("verify"),
        }
    }
}

/// Outcome of one testcase.
#[derive(Debug, Clone, Serialize)]
pub struct TestcaseVerdict {
    pub testcase: String,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<FailureStage>,
    /// Human-readable failure cause.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    /// Left on disk for inspection unless cleanup is enabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace: Option<PathBuf>,
    pub duration_ms: u64,
}

impl TestcaseVerdict {
    #[must_use]
    pub fn pass(testcase: impl Into<String>, workspace: Option<PathBuf>, duration_ms: u64) -> Self {
        Self {
            testcase: testcase.into(),
            passed: true,
            stage: None,
            cause: None,
            error_code: None,
            workspace,
            duration_ms,
        }
    }

    #[must_use]
    pub fn fail(
        testcase: impl Into<String>,
        stage: FailureStage,
        err: &HarnessError,
        workspace: Option<PathBuf>,
        duration_ms: u64,
    ) -> Self {
        Self {
            testcase: testcase.into(),
            passed: false,
            stage: Some(stage),
            cause: Some(err.to_string()),
            error_code: Some(err.code().to_string()),
            workspace,
            duration_ms,
        }
    }
}

/// Overall result of a suite run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SuiteOutcome {
    Passed,
    Failed,
    /// No testcases were selected; reported as success with a warning.
    Empty,
}

impl SuiteOutcome {
    #[must_use]
    pub const fn is_success(self) -> bool {
        !matches!(self, Self::Failed)
    }
}

/// Everything a run produced, in run order.
#[derive(Debug, Clone, Serialize)]
pub struct SuiteReport {
    pub suite: String,
    pub image: String,
    pub started_at: DateTime<Utc>,
    pub verdicts: Vec<TestcaseVerdict>,
}

impl SuiteReport {
    /// `started_at` is when the run began, before preflight and the build.
    #[must_use]
    pub fn new(suite: impl Into<String>, image: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            suite: suite.into(),
            image: image.into(),
            started_at,
            verdicts: Vec::new(),
        }
    }

    #[must_use]
    pub fn passed_count(&self) -> usize {
        self.verdicts.iter().filter(|v| v.passed).count()
    }

    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.verdicts.len() - self.passed_count()
    }

    #[must_use]
    pub fn outcome(&self) -> SuiteOutcome {
        if self.verdicts.is_empty() {
            SuiteOutcome::Empty
        } else if self.verdicts.iter().all(|v| v.passed) {
            SuiteOutcome::Passed
        } else {
            SuiteOutcome::Failed
        }
    }

    /// Serialize with the derived summary fields included.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        let mut value = serde_json::to_value(self)?;
        if let Some(map) = value.as_object_mut() {
            map.insert("outcome".into(), serde_json::to_value(self.outcome())?);
            map.insert("passed".into(), self.passed_count().into());
            map.insert("failed".into(), self.failed_count().into());
        }
        Ok(value)
    }

    /// Write the report as pretty JSON, creating parent directories.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| HarnessError::io(parent, source))?;
        }
        let body = serde_json::to_string_pretty(&self.to_json()?)?;
        fs::write(path, format!("{body}\n")).map_err(|source| HarnessError::io(path, source))
    }
}
