#![allow(dead_code)]

use std::fs;
use std::path::Path;

use cinder::engine::Registry;
use cinder::store::{Params, Project, params};
use tempfile::TempDir;

/// Builder for a temporary work directory populated with projects.
pub struct WorkdirBuilder {
    dir: TempDir,
    job_env: Params,
}

impl WorkdirBuilder {
    pub fn new() -> Self {
        Self {
            dir: tempfile::Builder::new()
                .prefix("cinder-test-workdir")
                .tempdir()
                .expect("Failed to create temp work dir"),
            job_env: Params::new(),
        }
    }

    /// Add a project directory with the given `script.sh` body.
    pub fn with_project(self, name: &str, script: &str) -> Self {
        let dir = self.dir.path().join(name);
        fs::create_dir_all(&dir).expect("Failed to create project dir");
        fs::write(dir.join("script.sh"), script).expect("Failed to write script");
        self
    }

    /// Persist project-level parameters for an existing project.
    pub fn with_project_params(self, name: &str, pairs: &[(&str, &str)]) -> Self {
        let dir = self.dir.path().join(name);
        let params = params::normalize(pairs.iter().copied());
        params::save(&dir.join("params"), &params).expect("Failed to write project params");
        self
    }

    /// Extra environment every job of the built registry receives.
    pub fn with_job_env(mut self, key: &str, value: &str) -> Self {
        self.job_env.insert(key.to_string(), value.to_string());
        self
    }

    pub fn build(self) -> TestWorkdir {
        let registry = Registry::with_job_env(self.dir.path(), self.job_env);
        TestWorkdir {
            dir: self.dir,
            registry,
        }
    }
}

impl Default for WorkdirBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A populated temp work directory and a registry over it.
///
/// The directory is removed when this value is dropped.
pub struct TestWorkdir {
    dir: TempDir,
    registry: Registry,
}

impl TestWorkdir {
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn project(&self, name: &str) -> Project {
        self.registry.open_project(name)
    }
}
