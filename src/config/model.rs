// src/config/model.rs

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Configuration as read from an optional TOML file.
///
/// ```toml
/// [server]
/// workdir = "/var/lib/cinder"
/// name = "cinder"
/// shutdown_grace_secs = 10
/// ```
///
/// Every field has a default, so an absent file and an empty file behave
/// the same.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfigFile {
    #[serde(default)]
    pub server: ServerSection,
}

/// `[server]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    /// Directory holding one subdirectory per project. Relative paths are
    /// resolved against the current directory.
    #[serde(default = "default_workdir")]
    pub workdir: String,

    /// Display name of this server instance.
    #[serde(default = "default_name")]
    pub name: String,

    /// How long shutdown waits for interrupted jobs to settle.
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

fn default_workdir() -> String {
    "workdir".to_string()
}

fn default_name() -> String {
    "cinder".to_string()
}

fn default_shutdown_grace_secs() -> u64 {
    10
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            workdir: default_workdir(),
            name: default_name(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

/// Values given on the command line; they win over the file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub workdir: Option<String>,
    pub name: Option<String>,
}

/// Validated configuration used by the server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Absolute, existing work directory.
    pub workdir: PathBuf,
    pub name: String,
    pub shutdown_grace: Duration,
}
