//! Runtime image transport
//!
//! Serializes the runtime image to a compressed archive, ships it to a
//! fixed temporary path on the device and loads it into the device's
//! container engine. The archive is deleted remotely after a successful
//! load; a failed load leaves it at the temporary path for inspection and
//! retry (documented risk, no automatic cleanup).

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::config::Settings;
use crate::image::BuildTarget;
use crate::process::{Invocation, ProcessError, ProcessRunner};
use crate::remote::{rsync, ssh};

/// Serialized runtime image archive, relative to project root.
pub const ARCHIVE_PATH: &str = "export/voxl-runtime.tar.gz";

/// Temporary archive location on the device.
pub const REMOTE_ARCHIVE_PATH: &str = "/tmp/voxl-runtime.tar.gz";

/// Typed missing-prerequisite result: the archive has not been exported
/// yet. The compound layer resolves this by running the runtime build and
/// export; `ship` itself never builds anything.
#[derive(Debug, thiserror::Error)]
#[error("no runtime image archive at {path}; run `build-runtime` and `export-runtime` first")]
pub struct MissingArchive {
    pub path: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error(transparent)]
    Missing(#[from] MissingArchive),

    #[error("cannot prepare {path}: {source}")]
    Export { path: String, source: io::Error },

    #[error(transparent)]
    Process(#[from] ProcessError),
}

/// Exports and ships the serialized runtime image.
pub struct ImageTransporter<'a> {
    settings: &'a Settings,
    root: &'a Path,
    runner: &'a dyn ProcessRunner,
}

impl<'a> ImageTransporter<'a> {
    pub fn new(settings: &'a Settings, root: &'a Path, runner: &'a dyn ProcessRunner) -> Self {
        Self {
            settings,
            root,
            runner,
        }
    }

    pub fn archive_path(&self) -> PathBuf {
        self.root.join(ARCHIVE_PATH)
    }

    /// Precondition check for `ship`.
    pub fn check_archive(&self) -> Result<(), MissingArchive> {
        let path = self.archive_path();
        if path.is_file() {
            Ok(())
        } else {
            Err(MissingArchive { path })
        }
    }

    /// Serialize the runtime image to the compressed archive, overwriting
    /// any previous export.
    pub fn export(&self) -> Result<(), TransportError> {
        let archive = self.archive_path();
        if let Some(parent) = archive.parent() {
            fs::create_dir_all(parent).map_err(|source| TransportError::Export {
                path: parent.display().to_string(),
                source,
            })?;
        }

        let tag = BuildTarget::Runtime.tag(&self.settings.image);
        eprintln!("Exporting {} to {}...", tag, archive.display());
        self.runner.run(&Invocation::shell(format!(
            "docker save {} | gzip > {}",
            tag,
            archive.display()
        )))?;
        Ok(())
    }

    /// Transfer the archive and load it into the device's image store. The
    /// remote copy is removed only when the load succeeded.
    pub fn ship(&self) -> Result<(), TransportError> {
        let archive = self.archive_path();
        eprintln!("Transferring {} to {}...", archive.display(), self.settings.host);
        self.runner.run(&rsync(
            &archive.display().to_string(),
            &format!("{}:{}", self.settings.login(), REMOTE_ARCHIVE_PATH),
            false,
            &[],
        ))?;

        self.runner.run(&ssh(
            self.settings,
            &format!(
                "docker load < {} && rm {}",
                REMOTE_ARCHIVE_PATH, REMOTE_ARCHIVE_PATH
            ),
        ))?;
        Ok(())
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

    #[test]
    fn test_check_archive_reports_missing() {
        let root = TempDir::new().unwrap();
        let settings = settings();
        let runner = ScriptedRunner::new();
        let transporter = ImageTransporter::new(&settings, root.path(), &runner);

        let missing = transporter.check_archive().unwrap_err();
        assert_eq!(missing.path, root.path().join(ARCHIVE_PATH));

        fs::create_dir_all(root.path().join("export")).unwrap();
        fs::write(root.path().join(ARCHIVE_PATH), b"gz").unwrap();
        transporter.check_archive().unwrap();
    }

    #[test]
    fn test_export_pipes_save_through_gzip() {
        let root = TempDir::new().unwrap();
        let settings = settings();
        let runner = ScriptedRunner::new();
        ImageTransporter::new(&settings, root.path(), &runner)
            .export()
            .unwrap();

        let call = &runner.calls()[0];
        assert!(call.contains("docker save voxl:runtime | gzip >"));
        assert!(call.contains("voxl-runtime.tar.gz"));
        // Export directory was prepared on the host side
        assert!(root.path().join("export").is_dir());
    }

    #[test]
    fn test_ship_transfers_then_loads_then_removes() {
        let root = TempDir::new().unwrap();
        let settings = settings();
        let runner = ScriptedRunner::new();
        ImageTransporter::new(&settings, root.path(), &runner)
            .ship()
            .unwrap();

        let transfer = runner
            .position_of("ubuntu@drone.local:/tmp/voxl-runtime.tar.gz")
            .unwrap();
        let load = runner.position_of("docker load <").unwrap();
        assert!(transfer < load);
        assert!(runner.calls()[load].contains("&& rm /tmp/voxl-runtime.tar.gz"));
    }

    #[test]
    fn test_failed_load_skips_remote_cleanup_step() {
        // `rm` is chained behind the load with &&, so a failed load leaves
        // the archive in place on the device.
        let root = TempDir::new().unwrap();
        let settings = settings();
        let runner = ScriptedRunner::new().fail_when("docker load", 1);
        let err = ImageTransporter::new(&settings, root.path(), &runner)
            .ship()
            .unwrap_err();

        assert!(matches!(err, TransportError::Process(_)));
    }
}
