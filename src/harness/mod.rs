//! Suite orchestration and reporting.

pub mod orchestrator;
pub mod report;
