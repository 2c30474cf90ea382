//! Scripted process runner
//!
//! A [`ProcessRunner`] that records every invocation and plays back
//! scripted failures and captured output, so orchestration flows (step
//! ordering, fail-fast, prerequisite resolution) can be tested without
//! docker, rsync, ssh or a reachable device.

use std::cell::RefCell;

use crate::process::{Invocation, ProcessError, ProcessRunner};

/// Recording, failure-injecting [`ProcessRunner`] for tests.
///
/// Matching is by substring of the full command line: the first scripted
/// failure whose needle matches wins, and `capture` answers with the first
/// matching scripted output (empty string otherwise).
#[derive(Default)]
pub struct ScriptedRunner {
    calls: RefCell<Vec<String>>,
    failures: Vec<(String, i32)>,
    outputs: Vec<(String, String)>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail any invocation whose command line contains `needle` with the
    /// given exit code.
    pub fn fail_when(mut self, needle: &str, code: i32) -> Self {
        self.failures.push((needle.to_string(), code));
        self
    }

    /// Answer `capture` with `stdout` for invocations whose command line
    /// contains `needle`.
    pub fn output_when(mut self, needle: &str, stdout: &str) -> Self {
        self.outputs.push((needle.to_string(), stdout.to_string()));
        self
    }

    /// Full command lines, in invocation order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    /// Number of recorded invocations whose line contains `needle`.
    pub fn count_containing(&self, needle: &str) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|line| line.contains(needle))
            .count()
    }

    /// Index of the first recorded invocation containing `needle`.
    pub fn position_of(&self, needle: &str) -> Option<usize> {
        self.calls
            .borrow()
            .iter()
            .position(|line| line.contains(needle))
    }

    fn record(&self, invocation: &Invocation) -> Result<(), ProcessError> {
        let line = invocation.line();
        self.calls.borrow_mut().push(line.clone());

        for (needle, code) in &self.failures {
            if line.contains(needle.as_str()) {
                return Err(ProcessError::Failed {
                    command: line,
                    code: *code,
                });
            }
        }
        Ok(())
    }
}

impl ProcessRunner for ScriptedRunner {
    fn run(&self, invocation: &Invocation) -> Result<(), ProcessError> {
        self.record(invocation)
    }

    fn capture(&self, invocation: &Invocation) -> Result<String, ProcessError> {
        self.record(invocation)?;
        let line = invocation.line();
        Ok(self
            .outputs
            .iter()
            .find(|(needle, _)| line.contains(needle.as_str()))
            .map(|(_, stdout)| stdout.clone())
            .unwrap_or_default())
    }
}
