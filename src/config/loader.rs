// src/config/loader.rs

use std::fs;
use std::path::Path;

use crate::config::model::{ConfigOverrides, RawConfigFile, ServerConfig};
use crate::errors::Result;

/// Load a configuration file from a given path and return the raw
/// `RawConfigFile`.
///
/// This only performs TOML deserialization; it does **not** touch the work
/// directory. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let contents = fs::read_to_string(path.as_ref())?;
    let config: RawConfigFile = toml::from_str(&contents)?;
    Ok(config)
}

/// Build the server configuration.
///
/// - Reads the TOML file when `path` is given, otherwise starts from
///   defaults.
/// - Applies command-line overrides.
/// - Resolves and creates the work directory.
pub fn load_and_validate(path: Option<&Path>, overrides: &ConfigOverrides) -> Result<ServerConfig> {
    let mut raw = match path {
        Some(path) => load_from_path(path)?,
        None => RawConfigFile::default(),
    };

    apply_overrides(&mut raw, overrides);
    ServerConfig::try_from(raw)
}

pub fn apply_overrides(raw: &mut RawConfigFile, overrides: &ConfigOverrides) {
    if let Some(workdir) = &overrides.workdir {
        raw.server.workdir = workdir.clone();
    }
    if let Some(name) = &overrides.name {
        raw.server.name = name.clone();
    }
}
