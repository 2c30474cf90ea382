//! Command dispatch
//!
//! Maps one command-line token to one operation, or to one of the two fixed
//! compound chains. Chains are strictly sequential and fail-fast: the first
//! failing step aborts the rest, and its exit code is what the process
//! exits with.

use std::path::Path;

use crate::config::{ConfigError, Settings};
use crate::deploy::{DeployError, DeploySynchronizer};
use crate::extract::{ArtifactExtractor, ExtractError};
use crate::image::{setup_qemu, BuildTarget, ImageBuilder};
use crate::process::{ProcessError, ProcessRunner};
use crate::remote::RemoteController;
use crate::transport::{ImageTransporter, TransportError};
use crate::workspace::{DevEnvironment, WorkspaceBuilder};

/// Static command menu, printed for `help`, a missing token, or an
/// unrecognized token (exit 0 in all three cases).
pub const HELP: &str = "\
voxl-deploy <command>

Image builds
  setup-qemu       register qemu binfmt handlers for emulated builds
  build-dev        build the native development image
  build-cross      build the emulated arm64 development image
  build-runtime    build the slim arm64 runtime image (reports size)
  build-all        build-dev, build-cross and build-runtime in sequence

Workspace
  dev              interactive shell in the native dev container
  cross            interactive shell in the emulated dev container
  build-ws         colcon build in the native dev container
  build-ws-cross   colcon build in the emulated dev container
  extract-install  copy compiled artifacts out of the install volume

Deployment
  export-runtime   serialize the runtime image to export/voxl-runtime.tar.gz
  deploy           stage and mirror the bundle to the device
  deploy-image     transfer the runtime image archive and load it remotely
  deploy-all       build-runtime, export-runtime, deploy, deploy-image

Device control
  voxl-start       bring the deployed composition up in the background
  voxl-shell       interactive shell in the running payload container
  voxl-logs        tail the last 100 log lines and follow
  voxl-stop        tear the composition down

Settings come from voxl.toml and the VOXL_USER / VOXL_HOST / VOXL_DIR
environment variables.";

/// One recognized command token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Help,
    SetupQemu,
    BuildDev,
    BuildCross,
    BuildRuntime,
    BuildAll,
    Dev,
    Cross,
    BuildWs,
    BuildWsCross,
    ExtractInstall,
    ExportRuntime,
    Deploy,
    DeployImage,
    DeployAll,
    Start,
    Shell,
    Logs,
    Stop,
}

impl Command {
    /// Token table. Unknown tokens map to `None`; the caller prints the
    /// help text and exits 0.
    pub fn parse(token: &str) -> Option<Self> {
        let command = match token {
            "help" => Command::Help,
            "setup-qemu" => Command::SetupQemu,
            "build-dev" => Command::BuildDev,
            "build-cross" => Command::BuildCross,
            "build-runtime" => Command::BuildRuntime,
            "build-all" => Command::BuildAll,
            "dev" => Command::Dev,
            "cross" => Command::Cross,
            "build-ws" => Command::BuildWs,
            "build-ws-cross" => Command::BuildWsCross,
            "extract-install" => Command::ExtractInstall,
            "export-runtime" => Command::ExportRuntime,
            "deploy" => Command::Deploy,
            "deploy-image" => Command::DeployImage,
            "deploy-all" => Command::DeployAll,
            "voxl-start" => Command::Start,
            "voxl-shell" => Command::Shell,
            "voxl-logs" => Command::Logs,
            "voxl-stop" => Command::Stop,
            _ => return None,
        };
        Some(command)
    }
}

/// Top-level operation errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Deploy(#[from] DeployError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl Error {
    /// Exit code for the whole process: external tools' codes pass through,
    /// everything else is 1.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Process(e)
            | Error::Extract(ExtractError::Process(e))
            | Error::Deploy(DeployError::Process(e))
            | Error::Transport(TransportError::Process(e)) => e.exit_code(),
            _ => 1,
        }
    }
}

/// Composition layer: owns the components and the two compound chains.
pub struct Orchestrator<'a> {
    settings: &'a Settings,
    root: &'a Path,
    runner: &'a dyn ProcessRunner,
}

impl<'a> Orchestrator<'a> {
    pub fn new(settings: &'a Settings, root: &'a Path, runner: &'a dyn ProcessRunner) -> Self {
        Self {
            settings,
            root,
            runner,
        }
    }

    fn images(&self) -> ImageBuilder<'a> {
        ImageBuilder::new(self.settings, self.runner)
    }

    fn workspace(&self) -> WorkspaceBuilder<'a> {
        WorkspaceBuilder::new(self.runner)
    }

    fn transporter(&self) -> ImageTransporter<'a> {
        ImageTransporter::new(self.settings, self.root, self.runner)
    }

    /// Run one command to completion.
    pub fn run(&self, command: Command) -> Result<(), Error> {
        match command {
            Command::Help => println!("{}", HELP),
            Command::SetupQemu => setup_qemu(self.runner)?,
            Command::BuildDev => {
                self.images().build(BuildTarget::Dev)?;
            }
            Command::BuildCross => {
                self.images().build(BuildTarget::Cross)?;
            }
            Command::BuildRuntime => {
                self.images().build(BuildTarget::Runtime)?;
            }
            Command::BuildAll => {
                let images = self.images();
                for target in BuildTarget::ALL {
                    images.build(target)?;
                }
            }
            Command::Dev => self.workspace().shell(DevEnvironment::Native)?,
            Command::Cross => self.workspace().shell(DevEnvironment::Emulated)?,
            Command::BuildWs => self.workspace().build(DevEnvironment::Native)?,
            Command::BuildWsCross => self.workspace().build(DevEnvironment::Emulated)?,
            Command::ExtractInstall => {
                ArtifactExtractor::new(self.root, self.runner).extract_install()?;
            }
            Command::ExportRuntime => self.transporter().export()?,
            Command::Deploy => {
                DeploySynchronizer::new(self.settings, self.root, self.runner).deploy()?;
            }
            Command::DeployImage => self.deploy_image()?,
            Command::DeployAll => self.deploy_all()?,
            Command::Start => RemoteController::new(self.settings, self.runner).start()?,
            Command::Shell => RemoteController::new(self.settings, self.runner).shell()?,
            Command::Logs => RemoteController::new(self.settings, self.runner).logs()?,
            Command::Stop => RemoteController::new(self.settings, self.runner).stop()?,
        }
        Ok(())
    }

    /// `deploy-image`: the archive is a precondition; when it is missing
    /// this layer resolves it with one runtime build + export cycle before
    /// shipping. The leaf `ship` never builds on its own.
    fn deploy_image(&self) -> Result<(), Error> {
        let transporter = self.transporter();
        if let Err(missing) = transporter.check_archive() {
            eprintln!("{}; building it now", missing);
            self.images().build(BuildTarget::Runtime)?;
            transporter.export()?;
        }
        transporter.ship()?;
        Ok(())
    }

    /// `deploy-all`: runtime build, export, deploy, image deploy, in that
    /// order, fail-fast.
    fn deploy_all(&self) -> Result<(), Error> {
        self.images().build(BuildTarget::Runtime)?;
        let transporter = self.transporter();
        transporter.export()?;
        DeploySynchronizer::new(self.settings, self.root, self.runner).deploy()?;
        transporter.ship()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_listed_token_parses() {
        for token in [
            "help",
            "setup-qemu",
            "build-dev",
            "build-cross",
            "build-runtime",
            "build-all",
            "dev",
            "cross",
            "build-ws",
            "build-ws-cross",
            "extract-install",
            "export-runtime",
            "deploy",
            "deploy-image",
            "deploy-all",
            "voxl-start",
            "voxl-shell",
            "voxl-logs",
            "voxl-stop",
        ] {
            assert!(Command::parse(token).is_some(), "token {} did not parse", token);
            assert!(HELP.contains(token), "help text is missing {}", token);
        }
    }

    #[test]
    fn test_unknown_token_is_none() {
        assert_eq!(Command::parse("deploy-everything"), None);
        assert_eq!(Command::parse(""), None);
    }

    #[test]
    fn test_exit_code_passes_through_nested_process_errors() {
        let process = ProcessError::Failed {
            command: "rsync".into(),
            code: 23,
        };
        let err = Error::Deploy(DeployError::Process(process));
        assert_eq!(err.exit_code(), 23);
    }
}
