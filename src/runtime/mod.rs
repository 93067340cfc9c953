//! External collaborators: toolchain preflight, image provisioning, stage execution.
//!
//! Each collaborator sits behind a trait so the orchestrator can be driven by
//! in-process fakes; the concrete types shell out to the container runtime and kind.

pub mod executor;
pub mod prerequisites;
pub mod process;
pub mod provision;

/// Write an executable `sh` script named `name` into `dir`.
#[cfg(all(test, unix))]
pub(crate) fn write_test_script(
    dir: &std::path::Path,
    name: &str,
    body: &str,
) -> std::path::PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}
