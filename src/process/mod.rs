//! External process model
//!
//! Every operation in this tool bottoms out in an invocation of docker,
//! rsync or ssh. Invocations are built as data, executed synchronously
//! through the [`ProcessRunner`] trait, and never retried. Failures carry
//! the underlying tool's exit code so the dispatcher can propagate it
//! verbatim; the tool's own stderr reaches the operator untranslated.

use std::fmt;
use std::io;
use std::process::{Command, Stdio};

/// A single external command, built as data before execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    program: String,
    args: Vec<String>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// A `sh -c` pipeline, for the few steps that genuinely need one
    /// (e.g. `docker save … | gzip > …`).
    pub fn shell(script: impl Into<String>) -> Self {
        Self::new("sh").arg("-c").arg(script)
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// The full command line as one string, used for operator messages,
    /// error reports and the scripted runner's call log.
    pub fn line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.line())
    }
}

/// External process errors
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("failed to start `{command}`: {source}")]
    Spawn { command: String, source: io::Error },

    #[error("`{command}` exited with status {code}")]
    Failed { command: String, code: i32 },

    #[error("`{command}` was terminated by a signal")]
    Interrupted { command: String },
}

impl ProcessError {
    /// Exit code to propagate to our own caller. External tools' non-zero
    /// codes pass through unchanged.
    pub fn exit_code(&self) -> i32 {
        match self {
            ProcessError::Failed { code, .. } => *code,
            ProcessError::Spawn { .. } | ProcessError::Interrupted { .. } => 1,
        }
    }
}

/// Synchronous executor for external commands.
///
/// The real implementation is [`SystemRunner`]; tests substitute
/// [`crate::mock::ScriptedRunner`] to exercise orchestration flows without
/// docker or a reachable device.
pub trait ProcessRunner {
    /// Run with inherited stdio, blocking until exit. Non-zero exit is an
    /// error.
    fn run(&self, invocation: &Invocation) -> Result<(), ProcessError>;

    /// Run with captured stdout (stderr still inherited), blocking until
    /// exit. Returns trimmed stdout on success.
    fn capture(&self, invocation: &Invocation) -> Result<String, ProcessError>;
}

/// [`ProcessRunner`] backed by `std::process::Command`.
pub struct SystemRunner;

impl SystemRunner {
    fn command(invocation: &Invocation) -> Command {
        let mut command = Command::new(&invocation.program);
        command.args(&invocation.args);
        command
    }

    fn check(invocation: &Invocation, status: std::process::ExitStatus) -> Result<(), ProcessError> {
        if status.success() {
            return Ok(());
        }
        match status.code() {
            Some(code) => Err(ProcessError::Failed {
                command: invocation.line(),
                code,
            }),
            None => Err(ProcessError::Interrupted {
                command: invocation.line(),
            }),
        }
    }
}

impl ProcessRunner for SystemRunner {
    fn run(&self, invocation: &Invocation) -> Result<(), ProcessError> {
        let status = Self::command(invocation)
            .status()
            .map_err(|source| ProcessError::Spawn {
                command: invocation.line(),
                source,
            })?;
        Self::check(invocation, status)
    }

    fn capture(&self, invocation: &Invocation) -> Result<String, ProcessError> {
        let output = Self::command(invocation)
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .output()
            .map_err(|source| ProcessError::Spawn {
                command: invocation.line(),
                source,
            })?;
        Self::check(invocation, output.status)?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}
