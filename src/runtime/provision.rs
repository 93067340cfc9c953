//! Image provisioning: build the stage image, then optionally load it into kind.

use std::fmt;
use std::path::PathBuf;
use std::process::Command;

use serde::Serialize;

use crate::core::errors::{HarnessError, Result};
use crate::runtime::process::{self, OutputMode};

/// A built image, `name:tag`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ImageRef(String);

impl ImageRef {
    #[must_use]
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What to build and what to call it.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    /// Build context containing the Dockerfile.
    pub source_dir: PathBuf,
    /// Container name from the suite location.
    pub container_name: String,
    /// Full `name:tag` to apply.
    pub image: String,
}

/// Produces the image under test. Called at most once per suite.
pub trait ImageProvisioner {
    fn build(&self, request: &BuildRequest) -> Result<ImageRef>;

    /// Make `image` available inside the named kind cluster.
    fn load(&self, image: &ImageRef, cluster: &str) -> Result<()>;
}

/// Shells out to the container runtime and kind.
#[derive(Debug, Clone)]
pub struct DockerProvisioner {
    runtime_binary: String,
    kind_binary: String,
    output: OutputMode,
}

impl DockerProvisioner {
    #[must_use]
    pub fn new(runtime_binary: impl Into<String>, kind_binary: impl Into<String>, verbose: bool) -> Self {
        Self {
            runtime_binary: runtime_binary.into(),
            kind_binary: kind_binary.into(),
            output: if verbose {
                OutputMode::Stream
            } else {
                OutputMode::Capture
            },
        }
    }

    #[must_use]
    pub fn build_args(request: &BuildRequest) -> Vec<String> {
        vec![
            "build".to_string(),
            "--tag".to_string(),
            request.image.clone(),
            request.source_dir.display().to_string(),
        ]
    }

    #[must_use]
    pub fn load_args(image: &ImageRef, cluster: &str) -> Vec<String> {
        vec![
            "load".to_string(),
            "docker-image".to_string(),
            image.to_string(),
            "--name".to_string(),
            cluster.to_string(),
        ]
    }
}

impl ImageProvisioner for DockerProvisioner {
    fn build(&self, request: &BuildRequest) -> Result<ImageRef> {
        if !request.source_dir.is_dir() {
            return Err(HarnessError::ImageBuild {
                image: request.image.clone(),
                details: format!("build context {} is not a directory", request.source_dir.display()),
            });
        }
        let outcome = process::run(
            Command::new(&self.runtime_binary).args(Self::build_args(request)),
            self.output,
            None,
        )
        .map_err(|source| HarnessError::ImageBuild {
            image: request.image.clone(),
            details: format!("failed to start {}: {source}", self.runtime_binary),
        })?;
        if !outcome.success() {
            return Err(HarnessError::ImageBuild {
                image: request.image.clone(),
                details: outcome.describe(),
            });
        }
        Ok(ImageRef::new(request.image.clone()))
    }

    fn load(&self, image: &ImageRef, cluster: &str) -> Result<()> {
        let load_err = |details: String| HarnessError::ImageLoad {
            image: image.to_string(),
            cluster: cluster.to_string(),
            details,
        };
        let outcome = process::run(
            Command::new(&self.kind_binary).args(Self::load_args(image, cluster)),
            self.output,
            None,
        )
        .map_err(|source| load_err(format!("failed to start {}: {source}", self.kind_binary)))?;
        if outcome.success() {
            Ok(())
        } else {
            Err(load_err(outcome.describe()))
        }
    }
}
