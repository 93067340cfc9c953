//! Artifact verification: depth-first comparison of two directory trees.
//!
//! Entries are compared by name and by byte content only; timestamps and
//! permissions are ignored. Both listings are sorted by name before pairing,
//! and at each level the entry-count check runs before any pairing, so the
//! first divergence reported is stable across platforms and repeated runs.

use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::suite::workspace::{ContractSubtree, Workspace};

/// The first place two trees were found to differ.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Divergence {
    /// A directory or file could not be listed or read.
    Unreadable {
        relative: PathBuf,
        path: PathBuf,
        details: String,
    },
    /// The two directories hold a different number of entries.
    EntryCount {
        relative: PathBuf,
        actual: PathBuf,
        expected: PathBuf,
        actual_count: usize,
        expected_count: usize,
    },
    /// Entries at the same sorted position carry different names.
    NameMismatch {
        relative: PathBuf,
        actual: PathBuf,
        expected: PathBuf,
    },
    /// One side is a directory, the other is not.
    TypeMismatch {
        relative: PathBuf,
        actual: PathBuf,
        expected: PathBuf,
    },
    /// Same name, different bytes.
    ContentMismatch {
        relative: PathBuf,
        actual: PathBuf,
        expected: PathBuf,
        actual_sha256: String,
        expected_sha256: String,
    },
}

impl Divergence {
    /// Path of the divergence relative to the compared roots' parent,
    /// e.g. `output/deployment.yaml`.
    #[must_use]
    pub fn relative(&self) -> &Path {
        match self {
            Self::Unreadable { relative, .. }
            | Self::EntryCount { relative, .. }
            | Self::NameMismatch { relative, .. }
            | Self::TypeMismatch { relative, .. }
            | Self::ContentMismatch { relative, .. } => relative,
        }
    }
}

impl fmt::Display for Divergence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unreadable {
                relative,
                path,
                details,
            } => write!(
                f,
                "{}: cannot read {}: {details}",
                relative.display(),
                path.display()
            ),
            Self::EntryCount {
                relative,
                actual,
                expected,
                actual_count,
                expected_count,
            } => write!(
                f,
                "{}: directories {} and {} have different number of files ({actual_count} vs {expected_count} expected)",
                relative.display(),
                actual.display(),
                expected.display()
            ),
            Self::NameMismatch {
                relative,
                actual,
                expected,
            } => write!(
                f,
                "{}: files {} and {} are not the same",
                relative.display(),
                actual.display(),
                expected.display()
            ),
            Self::TypeMismatch {
                relative,
                actual,
                expected,
            } => write!(
                f,
                "{}: {} and {} are not both files or both directories",
                relative.display(),
                actual.display(),
                expected.display()
            ),
            Self::ContentMismatch {
                relative,
                actual,
                expected,
                actual_sha256,
                expected_sha256,
            } => write!(
                f,
                "{}: files {} and {} do not have the same contents (sha256 {} vs {} expected)",
                relative.display(),
                actual.display(),
                expected.display(),
                short_digest(actual_sha256),
                short_digest(expected_sha256)
            ),
        }
    }
}

fn short_digest(digest: &str) -> &str {
    digest.get(..12).unwrap_or(digest)
}

/// Outcome of comparing two trees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComparisonResult {
    Match,
    Mismatch(Divergence),
}

impl ComparisonResult {
    #[must_use]
    pub const fn is_match(&self) -> bool {
        matches!(self, Self::Match)
    }

    /// `Ok(())` on a match, the divergence otherwise.
    pub fn into_result(self) -> Result<(), Divergence> {
        match self {
            Self::Match => Ok(()),
            Self::Mismatch(divergence) => Err(divergence),
        }
    }
}

/// Compares produced trees against golden fixtures.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArtifactVerifier;

impl ArtifactVerifier {
    /// Compare `actual` against `expected`. Divergence paths are reported
    /// relative to `label`.
    pub fn compare(&self, actual: &Path, expected: &Path, label: &Path) -> ComparisonResult {
        match compare_dirs(actual, expected, label) {
            Ok(()) => ComparisonResult::Match,
            Err(divergence) => ComparisonResult::Mismatch(divergence),
        }
    }

    /// Compare every verified contract subtree of `workspace` against `after`,
    /// `output` first, stopping at the first divergence.
    ///
    /// A subtree missing from `after` expects the workspace subtree to be empty.
    pub fn verify_workspace(&self, workspace: &Workspace, after: &Path) -> ComparisonResult {
        for subtree in ContractSubtree::VERIFIED {
            let actual = workspace.subtree(subtree);
            let expected = after.join(subtree.dir_name());
            let label = Path::new(subtree.dir_name());
            let result = match fs::metadata(&expected) {
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    match expect_empty(&actual, &expected, label) {
                        Ok(()) => ComparisonResult::Match,
                        Err(divergence) => ComparisonResult::Mismatch(divergence),
                    }
                }
                _ => self.compare(&actual, &expected, label),
            };
            if !result.is_match() {
                return result;
            }
        }
        ComparisonResult::Match
    }
}

fn expect_empty(actual: &Path, expected: &Path, relative: &Path) -> Result<(), Divergence> {
    let entries = list_sorted(actual, relative)?;
    if entries.is_empty() {
        return Ok(());
    }
    Err(Divergence::EntryCount {
        relative: relative.to_path_buf(),
        actual: actual.to_path_buf(),
        expected: expected.to_path_buf(),
        actual_count: entries.len(),
        expected_count: 0,
    })
}

struct Entry {
    name: OsString,
    path: PathBuf,
    is_dir: bool,
}

fn list_sorted(dir: &Path, relative: &Path) -> Result<Vec<Entry>, Divergence> {
    let unreadable = |err: std::io::Error| Divergence::Unreadable {
        relative: relative.to_path_buf(),
        path: dir.to_path_buf(),
        details: err.to_string(),
    };
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir).map_err(unreadable)? {
        let entry = entry.map_err(unreadable)?;
        let path = entry.path();
        // Follow symlinks so a linked directory compares as a directory.
        let is_dir = fs::metadata(&path).is_ok_and(|m| m.is_dir());
        entries.push(Entry {
            name: entry.file_name(),
            path,
            is_dir,
        });
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

fn compare_dirs(actual: &Path, expected: &Path, relative: &Path) -> Result<(), Divergence> {
    let actual_entries = list_sorted(actual, relative)?;
    let expected_entries = list_sorted(expected, relative)?;

    if actual_entries.len() != expected_entries.len() {
        return Err(Divergence::EntryCount {
            relative: relative.to_path_buf(),
            actual: actual.to_path_buf(),
            expected: expected.to_path_buf(),
            actual_count: actual_entries.len(),
            expected_count: expected_entries.len(),
        });
    }

    for (a, e) in actual_entries.iter().zip(&expected_entries) {
        let child = relative.join(&a.name);
        if a.name != e.name {
            return Err(Divergence::NameMismatch {
                relative: child,
                actual: a.path.clone(),
                expected: e.path.clone(),
            });
        }
        match (a.is_dir, e.is_dir) {
            (true, true) => compare_dirs(&a.path, &e.path, &child)?,
            (false, false) => compare_files(&a.path, &e.path, &child)?,
            _ => {
                return Err(Divergence::TypeMismatch {
                    relative: child,
                    actual: a.path.clone(),
                    expected: e.path.clone(),
                });
            }
        }
    }

    Ok(())
}

fn compare_files(actual: &Path, expected: &Path, relative: &Path) -> Result<(), Divergence> {
    let read = |path: &Path| {
        fs::read(path).map_err(|err| Divergence::Unreadable {
            relative: relative.to_path_buf(),
            path: path.to_path_buf(),
            details: err.to_string(),
        })
    };
    let actual_bytes = read(actual)?;
    let expected_bytes = read(expected)?;
    if actual_bytes == expected_bytes {
        return Ok(());
    }
    Err(Divergence::ContentMismatch {
        relative: relative.to_path_buf(),
        actual: actual.to_path_buf(),
        expected: expected.to_path_buf(),
        actual_sha256: sha256_hex(&actual_bytes),
        expected_sha256: sha256_hex(&expected_bytes),
    })
}

fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}
