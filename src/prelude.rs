//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use stagecheck::prelude::*;
//! ```

// Core
pub use crate::core::config::Config;
pub use crate::core::errors::{HarnessError, Result};

// Suite
pub use crate::suite::fixtures::{FixtureStore, Testcase, TestcaseSelection};
pub use crate::suite::location::{Action, Lifecycle, TestSuiteLocation};
pub use crate::suite::verify::{ArtifactVerifier, ComparisonResult, Divergence};
pub use crate::suite::workspace::{ContractSubtree, Workspace, WorkspaceMaterializer};

// Runtime
pub use crate::runtime::executor::{ContainerExecutor, StageExecutor, VolumeBinding};
pub use crate::runtime::prerequisites::{Preflight, ToolchainPreflight};
pub use crate::runtime::provision::{BuildRequest, DockerProvisioner, ImageProvisioner, ImageRef};

// Harness
pub use crate::harness::orchestrator::{RunObserver, RunOptions, TestHarnessOrchestrator};
pub use crate::harness::report::{FailureStage, SuiteOutcome, SuiteReport, TestcaseVerdict};
