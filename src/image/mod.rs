//! Container image builds
//!
//! Three image variants come out of one multi-stage Dockerfile; each variant
//! fixes a (platform, stage) pair and a deterministic tag. Rebuilding a
//! variant overwrites its tag, there is no versioning.

use crate::config::Settings;
use crate::process::{Invocation, ProcessError, ProcessRunner};

/// Image used to register qemu binfmt handlers for emulated builds.
const QEMU_IMAGE: &str = "multiarch/qemu-user-static";

/// The three image variants this tool can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildTarget {
    /// Native development image (host architecture)
    Dev,
    /// Emulated cross-architecture development image
    Cross,
    /// Slim emulated runtime image for the device
    Runtime,
}

impl BuildTarget {
    pub const ALL: [BuildTarget; 3] = [BuildTarget::Dev, BuildTarget::Cross, BuildTarget::Runtime];

    /// Target platform passed to the build engine.
    pub fn platform(&self) -> &'static str {
        match self {
            BuildTarget::Dev => "linux/amd64",
            BuildTarget::Cross | BuildTarget::Runtime => "linux/arm64",
        }
    }

    /// Dockerfile stage selected for this variant.
    pub fn stage(&self) -> &'static str {
        match self {
            BuildTarget::Dev | BuildTarget::Cross => "dev",
            BuildTarget::Runtime => "runtime",
        }
    }

    /// Tag suffix; the full tag is `{image}:{suffix}`.
    pub fn suffix(&self) -> &'static str {
        match self {
            BuildTarget::Dev => "dev",
            BuildTarget::Cross => "cross",
            BuildTarget::Runtime => "runtime",
        }
    }

    pub fn tag(&self, image: &str) -> String {
        format!("{}:{}", image, self.suffix())
    }
}

/// Drives `docker build` for the three variants.
pub struct ImageBuilder<'a> {
    settings: &'a Settings,
    runner: &'a dyn ProcessRunner,
}

impl<'a> ImageBuilder<'a> {
    pub fn new(settings: &'a Settings, runner: &'a dyn ProcessRunner) -> Self {
        Self { settings, runner }
    }

    /// Build one variant and load it into the local image store. Returns the
    /// resulting tag. Build-engine failures are fatal and propagated
    /// verbatim; no timeout is imposed here.
    pub fn build(&self, target: BuildTarget) -> Result<String, ProcessError> {
        let tag = target.tag(&self.settings.image);
        eprintln!(
            "Building {} ({}, stage {})...",
            tag,
            target.platform(),
            target.stage()
        );

        self.runner.run(
            &Invocation::new("docker")
                .arg("build")
                .args(["--platform", target.platform()])
                .args(["--target", target.stage()])
                .args(["-t", tag.as_str()])
                .arg("--load")
                .arg("."),
        )?;

        if target == BuildTarget::Runtime {
            let size = self.runner.capture(
                &Invocation::new("docker")
                    .args(["image", "ls", tag.as_str()])
                    .args(["--format", "{{.Size}}"]),
            )?;
            eprintln!("Runtime image size: {}", size);
        }

        Ok(tag)
    }
}

/// Register qemu binfmt handlers so arm64 stages can run on the build host.
/// Needed once per boot before any emulated build.
pub fn setup_qemu(runner: &dyn ProcessRunner) -> Result<(), ProcessError> {
    runner.run(
        &Invocation::new("docker")
            .args(["run", "--rm", "--privileged"])
            .arg(QEMU_IMAGE)
            .args(["--reset", "-p", "yes"]),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::ScriptedRunner;

    fn settings() -> Settings {
        Settings {
            user: "ubuntu".into(),
            host: "drone.local".into(),
            remote_dir: "/voxl_docker".into(),
            image: "voxl".into(),
        }
    }

    #[test]
    fn test_target_table() {
        assert_eq!(BuildTarget::Dev.platform(), "linux/amd64");
        assert_eq!(BuildTarget::Dev.stage(), "dev");
        assert_eq!(BuildTarget::Cross.platform(), "linux/arm64");
        assert_eq!(BuildTarget::Cross.stage(), "dev");
        assert_eq!(BuildTarget::Runtime.platform(), "linux/arm64");
        assert_eq!(BuildTarget::Runtime.stage(), "runtime");
    }

    #[test]
    fn test_tags_are_deterministic() {
        assert_eq!(BuildTarget::Dev.tag("voxl"), "voxl:dev");
        assert_eq!(BuildTarget::Cross.tag("voxl"), "voxl:cross");
        assert_eq!(BuildTarget::Runtime.tag("voxl"), "voxl:runtime");
    }

    #[test]
    fn test_build_selects_platform_and_stage() {
        let settings = settings();
        let runner = ScriptedRunner::new();
        let tag = ImageBuilder::new(&settings, &runner)
            .build(BuildTarget::Cross)
            .unwrap();

        assert_eq!(tag, "voxl:cross");
        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].contains("--platform linux/arm64"));
        assert!(calls[0].contains("--target dev"));
        assert!(calls[0].contains("-t voxl:cross"));
    }

    #[test]
    fn test_runtime_build_reports_size() {
        let settings = settings();
        let runner = ScriptedRunner::new().output_when("image ls", "198MB");
        ImageBuilder::new(&settings, &runner)
            .build(BuildTarget::Runtime)
            .unwrap();

        assert_eq!(runner.count_containing("docker build"), 1);
        assert_eq!(runner.count_containing("image ls voxl:runtime"), 1);
    }

    #[test]
    fn test_dev_build_does_not_query_size() {
        let settings = settings();
        let runner = ScriptedRunner::new();
        ImageBuilder::new(&settings, &runner)
            .build(BuildTarget::Dev)
            .unwrap();

        assert_eq!(runner.count_containing("image ls"), 0);
    }

    #[test]
    fn test_build_failure_is_fatal() {
        let settings = settings();
        let runner = ScriptedRunner::new().fail_when("docker build", 1);
        let err = ImageBuilder::new(&settings, &runner)
            .build(BuildTarget::Dev)
            .unwrap_err();

        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_setup_qemu_invocation() {
        let runner = ScriptedRunner::new();
        setup_qemu(&runner).unwrap();

        let calls = runner.calls();
        assert!(calls[0].contains("--privileged"));
        assert!(calls[0].contains("multiarch/qemu-user-static"));
    }
}
