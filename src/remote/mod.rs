//! Remote session plumbing and container lifecycle control
//!
//! Builds the ssh/rsync invocations every deploy-side component shares, and
//! implements the four lifecycle commands against the already-deployed
//! composition on the device. None of these hold local state and none retry;
//! a remote command's non-zero exit is the operation's failure.

use crate::config::Settings;
use crate::process::{Invocation, ProcessError, ProcessRunner};

/// Fixed name of the payload container on the device.
pub const RUNTIME_CONTAINER: &str = "voxl";

/// `ssh user@host '<command>'`.
pub fn ssh(settings: &Settings, remote_command: &str) -> Invocation {
    Invocation::new("ssh")
        .arg(settings.login())
        .arg(remote_command)
}

/// `ssh -t`, for remote commands that need a tty (interactive shells,
/// followed logs).
pub fn ssh_tty(settings: &Settings, remote_command: &str) -> Invocation {
    Invocation::new("ssh")
        .arg("-t")
        .arg(settings.login())
        .arg(remote_command)
}

/// Delta-transfer copy. `delete` turns it into an exact mirror; progress is
/// reported for the operator on long device transfers.
pub fn rsync(source: &str, destination: &str, delete: bool, excludes: &[&str]) -> Invocation {
    let mut invocation = Invocation::new("rsync").arg("-az");
    if delete {
        invocation = invocation.arg("--delete");
    }
    for pattern in excludes {
        invocation = invocation.arg(format!("--exclude={}", pattern));
    }
    invocation.arg("--info=progress2").arg(source).arg(destination)
}

/// Lifecycle commands for the deployed composition.
pub struct RemoteController<'a> {
    settings: &'a Settings,
    runner: &'a dyn ProcessRunner,
}

impl<'a> RemoteController<'a> {
    pub fn new(settings: &'a Settings, runner: &'a dyn ProcessRunner) -> Self {
        Self { settings, runner }
    }

    fn compose(&self, subcommand: &str) -> String {
        format!(
            "cd {} && docker compose {}",
            self.settings.remote_dir, subcommand
        )
    }

    /// Bring the composition up in the background.
    pub fn start(&self) -> Result<(), ProcessError> {
        self.runner.run(&ssh(self.settings, &self.compose("up -d")))
    }

    /// Interactive shell in the running payload container.
    pub fn shell(&self) -> Result<(), ProcessError> {
        self.runner.run(&ssh_tty(
            self.settings,
            &format!("docker exec -it {} bash", RUNTIME_CONTAINER),
        ))
    }

    /// Stream the last 100 log lines and follow.
    pub fn logs(&self) -> Result<(), ProcessError> {
        self.runner.run(&ssh_tty(
            self.settings,
            &self.compose("logs --tail 100 --follow"),
        ))
    }

    /// Tear the composition down.
    pub fn stop(&self) -> Result<(), ProcessError> {
        self.runner.run(&ssh(self.settings, &self.compose("down")))
    }
}
