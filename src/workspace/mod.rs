//! Workspace builds inside the development containers
//!
//! The colcon workspace is built inside a disposable dev container (native
//! or emulated) defined by `docker-compose.dev.yml`. Compiled output lands
//! in the `voxl_install` volume, not on the host; the extractor copies it
//! out afterwards.

use crate::process::{Invocation, ProcessError, ProcessRunner};

/// Compose file defining the dev containers and the install volume.
pub const DEV_COMPOSE_FILE: &str = "docker-compose.dev.yml";

/// ROS environment sourced before every in-container build.
const ROS_SETUP: &str = "/opt/ros/humble/setup.bash";

/// Which development container to run in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DevEnvironment {
    /// Host-architecture dev container
    Native,
    /// Emulated arm64 dev container
    Emulated,
}

impl DevEnvironment {
    /// Compose service name.
    pub fn service(&self) -> &'static str {
        match self {
            DevEnvironment::Native => "dev",
            DevEnvironment::Emulated => "cross",
        }
    }
}

/// Runs colcon builds and interactive shells in the dev containers.
pub struct WorkspaceBuilder<'a> {
    runner: &'a dyn ProcessRunner,
}

impl<'a> WorkspaceBuilder<'a> {
    pub fn new(runner: &'a dyn ProcessRunner) -> Self {
        Self { runner }
    }

    fn compose_run(&self, env: DevEnvironment) -> Invocation {
        Invocation::new("docker")
            .arg("compose")
            .args(["-f", DEV_COMPOSE_FILE])
            .args(["run", "--rm"])
            .arg(env.service())
    }

    /// Build the workspace with symlink install, so rebuilds reuse compiled
    /// objects. A failing build surfaces the container engine's exit status.
    pub fn build(&self, env: DevEnvironment) -> Result<(), ProcessError> {
        eprintln!("Building workspace in `{}` container...", env.service());
        let build = format!("source {} && colcon build --symlink-install", ROS_SETUP);
        self.runner
            .run(&self.compose_run(env).args(["bash", "-lc", build.as_str()]))
    }

    /// Interactive bash in the dev container (`dev` / `cross` commands).
    pub fn shell(&self, env: DevEnvironment) -> Result<(), ProcessError> {
        self.runner.run(&self.compose_run(env).arg("bash"))
    }
}
