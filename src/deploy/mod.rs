//! Deploy bundle staging and device synchronization
//!
//! Assembles the deploy bundle (compose descriptor + mirrored source tree +
//! copied artifacts) in a local staging directory, then mirrors the whole
//! bundle to the device. Steps run in a fixed order and the first failure
//! aborts the rest; there is no rollback, so an interrupted transfer can
//! leave the remote directory in an intermediate state. Re-running
//! converges because both mirrors use delta transfer with deletion.

use std::fs;
use std::io;
use std::path::Path;

use crate::config::Settings;
use crate::extract::{tree_has_files, INSTALL_DIR};
use crate::process::{ProcessError, ProcessRunner};
use crate::remote::{rsync, ssh};

/// Local staging directory, mirroring the remote layout.
pub const STAGING_DIR: &str = "deploy";

/// Runtime composition descriptor shipped to the device.
pub const COMPOSE_FILE: &str = "docker-compose.yml";

/// Managed source tree (workspace packages).
pub const SRC_DIR: &str = "src";

/// Patterns excluded from the source mirror.
const SRC_EXCLUDES: &[&str] = &[".git", "__pycache__", "*.pyc"];

/// Outcome of a completed deploy.
#[derive(Debug)]
pub struct DeployReport {
    /// The bundle went out without prebuilt artifacts; the device will
    /// fall back to building from source.
    pub missing_artifacts: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("cannot stage {path}: {source}")]
    Stage { path: String, source: io::Error },

    #[error(transparent)]
    Process(#[from] ProcessError),
}

/// Assembles and ships the deploy bundle.
pub struct DeploySynchronizer<'a> {
    settings: &'a Settings,
    root: &'a Path,
    runner: &'a dyn ProcessRunner,
}

impl<'a> DeploySynchronizer<'a> {
    pub fn new(settings: &'a Settings, root: &'a Path, runner: &'a dyn ProcessRunner) -> Self {
        Self {
            settings,
            root,
            runner,
        }
    }

    fn stage_error(path: &Path) -> impl FnOnce(io::Error) -> DeployError + '_ {
        move |source| DeployError::Stage {
            path: path.display().to_string(),
            source,
        }
    }

    /// Run the full deploy sequence against the resolved endpoint.
    pub fn deploy(&self) -> Result<DeployReport, DeployError> {
        let staging = self.root.join(STAGING_DIR);

        // 1. staging directory
        fs::create_dir_all(&staging).map_err(Self::stage_error(&staging))?;

        // 2. composition descriptor, unconditional overwrite
        let descriptor = self.root.join(COMPOSE_FILE);
        fs::copy(&descriptor, staging.join(COMPOSE_FILE))
            .map_err(Self::stage_error(&descriptor))?;

        // 3. exact mirror of the source tree
        self.runner.run(&rsync(
            &format!("{}/", self.root.join(SRC_DIR).display()),
            &format!("{}/", staging.join(SRC_DIR).display()),
            true,
            SRC_EXCLUDES,
        ))?;

        // 4. artifact subtree: plain copy, may be absent or empty
        let install = self.root.join(INSTALL_DIR);
        let staged_install = staging.join(INSTALL_DIR);
        if install.is_dir() {
            self.runner.run(&rsync(
                &format!("{}/", install.display()),
                &format!("{}/", staged_install.display()),
                false,
                &[],
            ))?;
        } else {
            fs::create_dir_all(&staged_install).map_err(Self::stage_error(&staged_install))?;
        }

        let missing_artifacts =
            !tree_has_files(&staged_install).map_err(Self::stage_error(&staged_install))?;
        if missing_artifacts {
            eprintln!(
                "warning: deploying without prebuilt artifacts; \
                 the device will build from source (run `build-ws-cross` + `extract-install`)"
            );
        }

        // 5. remote directory, idempotent
        self.runner.run(&ssh(
            self.settings,
            &format!("mkdir -p {}", self.settings.remote_dir),
        ))?;

        // 6. mirror the bundle to the device
        eprintln!(
            "Syncing {} to {}:{}...",
            staging.display(),
            self.settings.host,
            self.settings.remote_dir
        );
        self.runner.run(&rsync(
            &format!("{}/", staging.display()),
            &format!("{}:{}/", self.settings.login(), self.settings.remote_dir),
            true,
            &[],
        ))?;

        Ok(DeployReport { missing_artifacts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::ScriptedRunner;
    use tempfile::TempDir;

    fn settings() -> Settings {
        Settings {
            user: "ubuntu".into(),
            host: "drone.local".into(),
            remote_dir: "/voxl_docker".into(),
            image: "voxl".into(),
        }
    }

    fn project_root() -> TempDir {
        let root = TempDir::new().unwrap();
        fs::write(root.path().join(COMPOSE_FILE), "services: {}\n").unwrap();
        fs::create_dir(root.path().join(SRC_DIR)).unwrap();
        root
    }

    #[test]
    fn test_steps_run_in_fixed_order() {
        let root = project_root();
        let settings = settings();
        let runner = ScriptedRunner::new();
        DeploySynchronizer::new(&settings, root.path(), &runner)
            .deploy()
            .unwrap();

        let src_mirror = runner.position_of("--exclude=.git").unwrap();
        let mkdir = runner.position_of("mkdir -p /voxl_docker").unwrap();
        let remote_mirror = runner
            .position_of("ubuntu@drone.local:/voxl_docker/")
            .unwrap();
        assert!(src_mirror < mkdir);
        assert!(mkdir < remote_mirror);

        // Descriptor staged before anything was shipped
        assert!(root.path().join("deploy/docker-compose.yml").is_file());
    }

    #[test]
    fn test_descriptor_overwrite_is_unconditional() {
        let root = project_root();
        fs::create_dir(root.path().join(STAGING_DIR)).unwrap();
        fs::write(root.path().join("deploy/docker-compose.yml"), "stale").unwrap();

        let settings = settings();
        let runner = ScriptedRunner::new();
        DeploySynchronizer::new(&settings, root.path(), &runner)
            .deploy()
            .unwrap();

        let staged = fs::read_to_string(root.path().join("deploy/docker-compose.yml")).unwrap();
        assert_eq!(staged, "services: {}\n");
    }

    #[test]
    fn test_missing_descriptor_is_fatal() {
        let root = TempDir::new().unwrap();
        fs::create_dir(root.path().join(SRC_DIR)).unwrap();

        let settings = settings();
        let runner = ScriptedRunner::new();
        let err = DeploySynchronizer::new(&settings, root.path(), &runner)
            .deploy()
            .unwrap_err();

        assert!(matches!(err, DeployError::Stage { .. }));
        // Nothing was shipped
        assert_eq!(runner.calls().len(), 0);
    }

    #[test]
    fn test_empty_artifacts_completes_with_warning_flag() {
        let root = project_root();
        let settings = settings();
        let runner = ScriptedRunner::new();
        let report = DeploySynchronizer::new(&settings, root.path(), &runner)
            .deploy()
            .unwrap();

        assert!(report.missing_artifacts);
    }

    #[test]
    fn test_staged_artifacts_clear_the_flag() {
        let root = project_root();
        // rsync is scripted, so pre-stage the artifact the copy would produce
        fs::create_dir_all(root.path().join("deploy/install/lib")).unwrap();
        fs::write(root.path().join("deploy/install/lib/payload.so"), b"elf").unwrap();
        fs::create_dir_all(root.path().join("install")).unwrap();
        fs::write(root.path().join("install/marker"), b"x").unwrap();

        let settings = settings();
        let runner = ScriptedRunner::new();
        let report = DeploySynchronizer::new(&settings, root.path(), &runner)
            .deploy()
            .unwrap();

        assert!(!report.missing_artifacts);
    }

    #[test]
    fn test_failed_source_mirror_aborts_remaining_steps() {
        let root = project_root();
        let settings = settings();
        let runner = ScriptedRunner::new().fail_when("--exclude=.git", 23);
        let err = DeploySynchronizer::new(&settings, root.path(), &runner)
            .deploy()
            .unwrap_err();

        assert!(matches!(err, DeployError::Process(_)));
        assert_eq!(runner.count_containing("mkdir -p"), 0);
        assert_eq!(runner.count_containing("ubuntu@drone.local:"), 0);
    }
}
