//! Fixture side of a suite: location, testcase discovery, workspace seeding, tree comparison.

pub mod fixtures;
pub mod location;
pub mod verify;
pub mod workspace;
