//! Workspace materialization: a fresh, fixture-seeded directory per testcase run.
//!
//! The workspace always exposes the three contract subtrees, whatever the
//! `before` fixture contains. Names are `<prefix>-<testcase>-<unix secs>-<nonce>`
//! and are claimed with an exclusive `create_dir`, so neither clock resolution
//! nor concurrent creation can hand the same directory to two runs.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use rand::random;

use crate::core::config::WorkspaceConfig;
use crate::core::errors::{HarnessError, Result};
use crate::core::paths::{is_within, sanitize_component};
use crate::suite::fixtures::Testcase;

/// Attempts before giving up on a unique name.
const MAX_NAME_ATTEMPTS: u32 = 32;

/// One of the fixed subtrees every image under test reads or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContractSubtree {
    Input,
    Output,
    Metadata,
}

impl ContractSubtree {
    pub const ALL: [Self; 3] = [Self::Input, Self::Output, Self::Metadata];

    /// Subtrees compared against the `after` fixture, in comparison order.
    pub const VERIFIED: [Self; 2] = [Self::Output, Self::Metadata];

    /// Directory name inside a workspace or fixture state.
    #[must_use]
    pub const fn dir_name(self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Output => "output",
            Self::Metadata => "metadata",
        }
    }

    /// Mount point inside the container.
    #[must_use]
    pub const fn mount_point(self) -> &'static str {
        match self {
            Self::Input => "/contract/input",
            Self::Output => "/contract/output",
            Self::Metadata => "/contract/metadata",
        }
    }
}

/// An isolated directory owned by exactly one testcase run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    root: PathBuf,
    testcase: String,
}

impl Workspace {
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn testcase(&self) -> &str {
        &self.testcase
    }

    #[must_use]
    pub fn subtree(&self, subtree: ContractSubtree) -> PathBuf {
        self.root.join(subtree.dir_name())
    }

    /// Delete the workspace and everything in it.
    pub fn remove(self) -> Result<()> {
        fs::remove_dir_all(&self.root).map_err(|source| HarnessError::io(&self.root, source))
    }
}

/// Creates workspaces under a configured base directory.
#[derive(Debug, Clone)]
pub struct WorkspaceMaterializer {
    base_dir: PathBuf,
    prefix: String,
}

impl WorkspaceMaterializer {
    #[must_use]
    pub fn new(config: &WorkspaceConfig) -> Self {
        Self {
            base_dir: config.base_dir.clone(),
            prefix: config.prefix.clone(),
        }
    }

    /// Refuse a base directory at or below `fixture_root`; workspaces there
    /// would be listed as testcases on the next run. Nothing is created.
    pub fn ensure_outside(&self, fixture_root: &Path) -> Result<()> {
        if is_within(&self.base_dir, fixture_root) {
            return Err(HarnessError::WorkspaceInsideFixture {
                path: self.base_dir.clone(),
                fixture: fixture_root.to_path_buf(),
            });
        }
        Ok(())
    }

    /// Allocate a workspace for `testcase` and seed it from `before/`.
    ///
    /// Any copy failure aborts materialization; the partially seeded directory is
    /// left behind for inspection.
    pub fn materialize(&self, testcase: &Testcase) -> Result<Workspace> {
        self.ensure_outside(testcase.dir.parent().unwrap_or(&testcase.dir))?;
        let root = self.allocate(&testcase.name)?;

        let before = testcase.before_dir();
        match fs::metadata(&before) {
            Ok(_) => copy_tree(&before, &root)?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(HarnessError::workspace(&before, err)),
        }

        for subtree in ContractSubtree::ALL {
            let dir = root.join(subtree.dir_name());
            if !dir.is_dir() {
                create_dir(&dir).map_err(|source| HarnessError::workspace(&dir, source))?;
            }
        }

        Ok(Workspace {
            root,
            testcase: testcase.name.clone(),
        })
    }

    fn allocate(&self, testcase: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.base_dir)
            .map_err(|source| HarnessError::workspace(&self.base_dir, source))?;

        let stem = format!(
            "{}-{}-{}",
            self.prefix,
            sanitize_component(testcase),
            chrono::Utc::now().timestamp()
        );
        for _attempt in 0..MAX_NAME_ATTEMPTS {
            let dir = self.base_dir.join(format!("{stem}-{:08x}", random::<u32>()));
            match create_dir(&dir) {
                Ok(()) => return Ok(dir),
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {}
                Err(err) => return Err(HarnessError::workspace(&dir, err)),
            }
        }

        Err(HarnessError::workspace(
            &self.base_dir,
            io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("no unique workspace name after {MAX_NAME_ATTEMPTS} attempts"),
            ),
        ))
    }
}

/// Recursively copy `src` into the existing directory `dst`, byte for byte.
pub fn copy_tree(src: &Path, dst: &Path) -> Result<()> {
    let entries = fs::read_dir(src).map_err(|source| HarnessError::workspace(src, source))?;
    for entry in entries {
        let entry = entry.map_err(|source| HarnessError::workspace(src, source))?;
        let from = entry.path();
        let to = dst.join(entry.file_name());
        let meta = fs::metadata(&from).map_err(|source| HarnessError::workspace(&from, source))?;
        if meta.is_dir() {
            create_dir(&to).map_err(|source| HarnessError::workspace(&to, source))?;
            copy_tree(&from, &to)?;
        } else {
            fs::copy(&from, &to).map_err(|source| HarnessError::workspace(&from, source))?;
        }
    }
    Ok(())
}

// Containers often write as a different uid, so directories start world-writable
// (subject to the process umask).
#[cfg(unix)]
fn create_dir(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new().mode(0o777).create(path)
}

#[cfg(not(unix))]
fn create_dir(path: &Path) -> io::Result<()> {
    fs::create_dir(path)
}
