//! Deployment settings resolution
//!
//! Settings are resolved exactly once at startup and are immutable for the
//! rest of the process. Precedence, highest first:
//! 1. Environment variables (`VOXL_USER`, `VOXL_HOST`, `VOXL_DIR`)
//! 2. Project-local `voxl.toml`
//! 3. Built-in defaults

use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

/// Project-local settings file, looked up at the workspace root.
pub const SETTINGS_FILE: &str = "voxl.toml";

pub const DEFAULT_USER: &str = "ubuntu";
pub const DEFAULT_HOST: &str = "drone.local";
pub const DEFAULT_REMOTE_DIR: &str = "/voxl_docker";
pub const DEFAULT_IMAGE: &str = "voxl";

/// Resolved deployment settings, shared read-only by every component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Login name on the device
    pub user: String,

    /// Device hostname (mDNS name or address)
    pub host: String,

    /// Install directory on the device
    pub remote_dir: String,

    /// Local image name; tags are `{image}:{variant}`
    pub image: String,
}

/// Optional overrides read from `voxl.toml`. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileOverrides {
    user: Option<String>,
    host: Option<String>,
    remote_dir: Option<String>,
    image: Option<String>,
}

/// Settings resolution errors. All of these are fatal before any
/// operation starts.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read settings file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("cannot parse settings file {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
}

impl Settings {
    /// Resolve settings for a project root, reading `voxl.toml` if present
    /// and the `VOXL_*` environment.
    pub fn resolve(project_root: &Path) -> Result<Self, ConfigError> {
        let file = project_root.join(SETTINGS_FILE);
        let file = file.exists().then_some(file);
        Self::resolve_with(file.as_deref(), |key| env::var(key).ok())
    }

    /// Resolution core, with the environment abstracted for tests.
    fn resolve_with(
        settings_file: Option<&Path>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let overrides = match settings_file {
            Some(path) => {
                let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.display().to_string(),
                    source,
                })?;
                toml::from_str::<FileOverrides>(&contents).map_err(|source| ConfigError::Parse {
                    path: path.display().to_string(),
                    source,
                })?
            }
            None => FileOverrides::default(),
        };

        let pick = |env_key: Option<&str>, file_value: Option<String>, default: &str| {
            env_key
                .and_then(&env)
                .or(file_value)
                .unwrap_or_else(|| default.to_string())
        };

        Ok(Self {
            user: pick(Some("VOXL_USER"), overrides.user, DEFAULT_USER),
            host: pick(Some("VOXL_HOST"), overrides.host, DEFAULT_HOST),
            remote_dir: pick(Some("VOXL_DIR"), overrides.remote_dir, DEFAULT_REMOTE_DIR),
            image: pick(None, overrides.image, DEFAULT_IMAGE),
        })
    }

    /// `user@host` for ssh/rsync destinations.
    pub fn login(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }
}
