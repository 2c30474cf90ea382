//! voxl-deploy - build-and-deploy orchestrator for the VOXL docker payload
//!
//! Coordinates multi-architecture image builds, emulated workspace builds,
//! artifact extraction from the install volume, and synchronization of the
//! deploy bundle and runtime image to the device over ssh/rsync. Every
//! external tool is reached through the [`process::ProcessRunner`] trait so
//! the orchestration itself is testable without docker or a drone on the
//! bench.

pub mod config;
pub mod deploy;
pub mod dispatch;
pub mod extract;
pub mod image;
pub mod mock;
pub mod process;
pub mod remote;
pub mod transport;
pub mod workspace;

pub use config::{ConfigError, Settings};
pub use dispatch::{Command, Error, Orchestrator, HELP};
pub use image::{BuildTarget, ImageBuilder};
pub use process::{Invocation, ProcessError, ProcessRunner, SystemRunner};
