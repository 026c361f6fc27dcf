// src/config/validate.rs

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::model::{RawConfigFile, ServerConfig};
use crate::errors::{CinderError, Result};

impl TryFrom<RawConfigFile> for ServerConfig {
    type Error = CinderError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let server = raw.server;

        let name = server.name.trim().to_string();
        if name.is_empty() {
            return Err(CinderError::ConfigError(
                "[server].name must not be empty".to_string(),
            ));
        }

        let workdir = prepare_workdir(Path::new(&server.workdir))?;

        Ok(ServerConfig {
            workdir,
            name,
            shutdown_grace: Duration::from_secs(server.shutdown_grace_secs),
        })
    }
}

/// Resolve the work directory to an absolute path, creating it if needed.
fn prepare_workdir(path: &Path) -> Result<PathBuf> {
    if path.as_os_str().is_empty() {
        return Err(CinderError::ConfigError(
            "work directory must not be empty".to_string(),
        ));
    }

    let absolute = std::path::absolute(path).map_err(|err| {
        CinderError::ConfigError(format!("cannot resolve work directory {:?}: {err}", path))
    })?;

    if !absolute.exists() {
        fs::create_dir_all(&absolute).map_err(|err| {
            CinderError::ConfigError(format!(
                "cannot create work directory {:?}: {err}",
                absolute
            ))
        })?;
    }

    if !absolute.is_dir() {
        return Err(CinderError::ConfigError(format!(
            "work directory {:?} is not a directory",
            absolute
        )));
    }

    Ok(fs::canonicalize(&absolute)?)
}
