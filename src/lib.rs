#![forbid(unsafe_code)]

//! stagecheck: fixture-driven contract tests for containerized pipeline-stage images.
//!
//! A stage image reads `/contract/input` and is expected to leave specific trees
//! under `/contract/output` and `/contract/metadata`. For each testcase under a
//! suite's `test/` directory the harness:
//! 1. **Materializes** a fresh workspace seeded from `before/`
//! 2. **Executes** the image with the workspace bound to the contract mounts
//! 3. **Verifies** the produced trees against `after/`, byte for byte
//!
//! The image is built once per run and shared by every testcase; a failing
//! testcase never stops the ones after it.
//!
//! # Library usage
//!
//! ```rust,no_run
//! use stagecheck::prelude::*;
//! ```
//!
//! Individual modules can also be imported directly:
//!
//! ```rust,no_run
//! use stagecheck::core::config::Config;
//! use stagecheck::suite::verify::{ArtifactVerifier, ComparisonResult};
//! ```

pub mod prelude;

pub mod core;
pub mod harness;
pub mod logger;
pub mod runtime;
pub mod suite;
