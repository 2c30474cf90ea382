//! Artifact extraction from the install volume
//!
//! Compiled artifacts live in the docker-managed `voxl_install` volume,
//! which the host cannot see. A short-lived helper container bridges the
//! volume (mounted read-only) and a host directory, copying with attributes
//! preserved. This is a copy, not a sync: stale files from an earlier
//! extraction are left in place.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::process::{Invocation, ProcessError, ProcessRunner};

/// Named volume populated by the workspace build. Created by compose, never
/// deleted here.
pub const INSTALL_VOLUME: &str = "voxl_install";

/// Host directory receiving extracted artifacts, relative to project root.
pub const INSTALL_DIR: &str = "install";

/// Image for the disposable copy helper.
const HELPER_IMAGE: &str = "alpine:3";

/// Outcome of an extraction.
#[derive(Debug)]
pub struct ExtractReport {
    pub destination: PathBuf,
    /// The destination holds no files. Valid but degraded: the workspace
    /// build has not run yet.
    pub empty: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("cannot prepare {path}: {source}")]
    Destination { path: String, source: io::Error },

    #[error(transparent)]
    Process(#[from] ProcessError),
}

/// Copies compiled artifacts out of the install volume.
pub struct ArtifactExtractor<'a> {
    root: &'a Path,
    runner: &'a dyn ProcessRunner,
}

impl<'a> ArtifactExtractor<'a> {
    pub fn new(root: &'a Path, runner: &'a dyn ProcessRunner) -> Self {
        Self { root, runner }
    }

    /// Copy the volume contents into `install/`, creating it if absent.
    /// Safe to repeat. The helper container runs with `--rm`, so it is gone
    /// after the copy whether or not the copy succeeded.
    pub fn extract_install(&self) -> Result<ExtractReport, ExtractError> {
        let destination = self.root.join(INSTALL_DIR);
        fs::create_dir_all(&destination).map_err(|source| ExtractError::Destination {
            path: destination.display().to_string(),
            source,
        })?;
        // docker needs an absolute host path for the bind mount
        let absolute = destination
            .canonicalize()
            .map_err(|source| ExtractError::Destination {
                path: destination.display().to_string(),
                source,
            })?;

        eprintln!(
            "Extracting {} volume to {}...",
            INSTALL_VOLUME,
            destination.display()
        );
        self.runner.run(
            &Invocation::new("docker")
                .args(["run", "--rm", "-v"])
                .arg(format!("{}:/install:ro", INSTALL_VOLUME))
                .arg("-v")
                .arg(format!("{}:/out", absolute.display()))
                .arg(HELPER_IMAGE)
                .args(["cp", "-a", "/install/.", "/out/"]),
        )?;

        let empty = !tree_has_files(&destination).map_err(|source| ExtractError::Destination {
            path: destination.display().to_string(),
            source,
        })?;
        if empty {
            eprintln!(
                "warning: {} is empty; run `build-ws` or `build-ws-cross` first",
                destination.display()
            );
        }

        Ok(ExtractReport { destination, empty })
    }
}

/// True if the tree rooted at `dir` contains at least one regular file.
/// A missing directory counts as empty.
pub fn tree_has_files(dir: &Path) -> io::Result<bool> {
    if !dir.exists() {
        return Ok(false);
    }
    for entry in WalkDir::new(dir) {
        let entry = entry.map_err(io::Error::other)?;
        if entry.file_type().is_file() {
            return Ok(true);
        }
    }
    Ok(false)
}
