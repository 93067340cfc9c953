//! Fixture store: enumerate testcase directories under a suite's fixture root.

use std::fs;
use std::path::{Path, PathBuf};

use crate::core::errors::{HarnessError, Result};

/// Which testcases to run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TestcaseSelection {
    /// Every immediate subdirectory of the fixture root, in listing order.
    #[default]
    All,
    /// Exactly these names, in this order.
    Named(Vec<String>),
}

impl TestcaseSelection {
    /// Parse a comma-separated name list. Blank input selects everything.
    pub fn parse(raw: Option<&str>) -> Result<Self> {
        let Some(raw) = raw else {
            return Ok(Self::All);
        };
        let names: Vec<String> = raw
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect();
        if names.is_empty() {
            return Ok(Self::All);
        }
        for name in &names {
            if name == "." || name == ".." || name.contains('/') || name.contains('\\') {
                return Err(HarnessError::InvalidTestcaseName { name: name.clone() });
            }
        }
        Ok(Self::Named(names))
    }
}

/// One fixture scenario: `<root>/<name>/{before,after}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Testcase {
    pub name: String,
    pub dir: PathBuf,
}

impl Testcase {
    /// Seed state copied into the workspace.
    #[must_use]
    pub fn before_dir(&self) -> PathBuf {
        self.dir.join("before")
    }

    /// Expected terminal state.
    #[must_use]
    pub fn after_dir(&self) -> PathBuf {
        self.dir.join("after")
    }
}

/// Locates testcases under a single fixture root.
#[derive(Debug, Clone)]
pub struct FixtureStore {
    root: PathBuf,
}

impl FixtureStore {
    /// Open a fixture root. A missing or unreadable root is fatal for the run.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let meta = fs::metadata(&root).map_err(|source| HarnessError::FixtureRootUnreadable {
            path: root.clone(),
            source,
        })?;
        if !meta.is_dir() {
            return Err(HarnessError::FixtureRootUnreadable {
                path: root,
                source: std::io::Error::other("not a directory"),
            });
        }
        Ok(Self { root })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve the selection into an ordered list of testcases.
    pub fn resolve(&self, selection: &TestcaseSelection) -> Result<Vec<Testcase>> {
        match selection {
            TestcaseSelection::All => self.list_all(),
            TestcaseSelection::Named(names) => names
                .iter()
                .map(|name| {
                    let dir = self.root.join(name);
                    if dir.is_dir() {
                        Ok(Testcase {
                            name: name.clone(),
                            dir,
                        })
                    } else {
                        Err(HarnessError::FixtureNotFound { path: dir })
                    }
                })
                .collect(),
        }
    }

    // Listing order is the filesystem's; it also governs report order.
    fn list_all(&self) -> Result<Vec<Testcase>> {
        let unreadable = |source| HarnessError::FixtureRootUnreadable {
            path: self.root.clone(),
            source,
        };
        let mut testcases = Vec::new();
        for entry in fs::read_dir(&self.root).map_err(unreadable)? {
            let entry = entry.map_err(unreadable)?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            testcases.push(Testcase {
                name: entry.file_name().to_string_lossy().into_owned(),
                dir: path,
            });
        }
        Ok(testcases)
    }
}
