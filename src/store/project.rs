// src/store/project.rs

use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::{debug, warn};

use crate::store::job::Job;
use crate::store::params::{self, Params};
use crate::store::status::JobStatus;

const COUNTER_FILE: &str = "counter";
const PARAMS_FILE: &str = "params";

/// Attempts at finding an unused job directory before giving up.
const MAX_MINT_ATTEMPTS: usize = 16;

#[cfg(windows)]
const SCRIPT_FILE: &str = "script.cmd";
#[cfg(not(windows))]
const SCRIPT_FILE: &str = "script.sh";

/// A build definition: `<workdir>/<name>/` holding a script and a job counter.
#[derive(Debug, Clone)]
pub struct Project {
    name: String,
    dir: PathBuf,
    params: Params,
}

impl PartialEq for Project {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Project {}

impl Project {
    pub fn new(name: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            dir: dir.into(),
            params: Params::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn exists(&self) -> bool {
        self.dir.is_dir()
    }

    /// Entry point run for every job of this project.
    pub fn script_path(&self) -> PathBuf {
        self.dir.join(SCRIPT_FILE)
    }

    /// Last issued job number, 0 if no job was minted yet.
    pub fn last_count(&self) -> u64 {
        fs::read_to_string(self.dir.join(COUNTER_FILE))
            .ok()
            .and_then(|raw| raw.trim().parse().ok())
            .unwrap_or(0)
    }

    /// Increment and persist the counter, returning the new value.
    pub fn rotate_count(&self) -> Result<u64> {
        let count = self.last_count() + 1;
        let path = self.dir.join(COUNTER_FILE);
        fs::write(&path, count.to_string())
            .with_context(|| format!("writing counter {:?}", path))?;
        Ok(count)
    }

    /// Mint a new job: rotate the counter, create its directory and mark it
    /// `Unknown`.
    ///
    /// If the directory for the next number already exists (a lost or
    /// rewound counter), the counter keeps rotating so an old job is never
    /// reused.
    pub fn new_job(&self) -> Result<Job> {
        for _ in 0..MAX_MINT_ATTEMPTS {
            let number = self.rotate_count()?;
            let job = self.open_job(&number.to_string());

            match fs::create_dir(job.dir()) {
                Ok(()) => {
                    job.set_status(JobStatus::Unknown)?;
                    debug!(project = %self.name, job = %job.name(), "minted job");
                    return Ok(job);
                }
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                    warn!(
                        project = %self.name,
                        job = %job.name(),
                        "job directory already exists; skipping number"
                    );
                }
                Err(err) => {
                    return Err(err)
                        .with_context(|| format!("creating job directory {:?}", job.dir()));
                }
            }
        }

        bail!(
            "no free job number for project '{}' after {} attempts",
            self.name,
            MAX_MINT_ATTEMPTS
        )
    }

    /// Handle for job `name`; the directory is not required to exist.
    pub fn open_job(&self, name: &str) -> Job {
        Job::new(&self.name, &self.dir, name)
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Replace the parameters, dropping keys that are not valid names.
    pub fn set_params<I, K, V>(&mut self, params: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        self.params = params::normalize(params);
    }

    pub fn save_params(&self) -> Result<()> {
        params::save(&self.dir.join(PARAMS_FILE), &self.params)
    }

    pub fn load_params(&mut self) {
        self.params = params::load(&self.dir.join(PARAMS_FILE));
    }
}

/// A usable project name is exactly one normal path component.
pub fn is_valid_project_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    ) && !name.contains(['/', '\\'])
}
