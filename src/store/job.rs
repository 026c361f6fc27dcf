// src/store/job.rs

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};
use tracing::debug;

use crate::store::params::{self, Params};
use crate::store::status::JobStatus;

const STATUS_FILE: &str = "status";
const START_FILE: &str = "start";
const OUTPUT_FILE: &str = "console.log";
const PARAMS_FILE: &str = "params";
const WORKSPACE_DIR: &str = "workspace";
const ARTIFACT_FILE: &str = "workspace.tar.gz";

/// Identity of a job: project name plus job name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobKey {
    pub project: String,
    pub job: String,
}

impl JobKey {
    pub fn new(project: impl Into<String>, job: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            job: job.into(),
        }
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.project, self.job)
    }
}

/// One execution of a project's script, backed by `<project>/<name>/`.
///
/// Nothing about the job's state is cached here: every accessor reads the
/// filesystem, so any number of `Job` values may point at the same directory.
#[derive(Debug, Clone)]
pub struct Job {
    project: String,
    name: String,
    dir: PathBuf,
    params: Params,
}

impl PartialEq for Job {
    fn eq(&self, other: &Self) -> bool {
        self.project == other.project && self.name == other.name
    }
}

impl Eq for Job {}

impl Job {
    pub(crate) fn new(project: &str, project_dir: &Path, name: &str) -> Self {
        Self {
            project: project.to_string(),
            name: name.to_string(),
            dir: project_dir.join(name),
            params: Params::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn project_name(&self) -> &str {
        &self.project
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn key(&self) -> JobKey {
        JobKey::new(&self.project, &self.name)
    }

    /// Numeric value of the job name; names that are not numbers count as 0.
    pub fn number(&self) -> u64 {
        self.name.trim().parse().unwrap_or(0)
    }

    pub fn exists(&self) -> bool {
        self.dir.is_dir()
    }

    /// Persisted status. Never `InProgress`; that is derived by the registry.
    pub fn status(&self) -> JobStatus {
        match fs::read_to_string(self.dir.join(STATUS_FILE)) {
            Ok(raw) => JobStatus::decode(&raw),
            Err(_) => JobStatus::Unknown,
        }
    }

    pub fn set_status(&self, status: JobStatus) -> Result<()> {
        let path = self.dir.join(STATUS_FILE);
        fs::write(&path, status.encode())
            .with_context(|| format!("writing status {status} to {:?}", path))
    }

    /// Modification time of the start marker, or the epoch when absent.
    pub fn start_date(&self) -> SystemTime {
        modified_or_epoch(&self.dir.join(START_FILE))
    }

    /// When the terminal status was written. The epoch while the job has not
    /// finished, even though minting already created the status file.
    pub fn end_date(&self) -> SystemTime {
        if !self.status().is_terminal() {
            return SystemTime::UNIX_EPOCH;
        }
        modified_or_epoch(&self.dir.join(STATUS_FILE))
    }

    /// Create the start marker. Fails when the job directory does not exist.
    pub fn log_start(&self) -> Result<()> {
        let path = self.dir.join(START_FILE);
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .with_context(|| format!("creating start marker {:?}", path))?;
        Ok(())
    }

    pub fn output_path(&self) -> PathBuf {
        self.dir.join(OUTPUT_FILE)
    }

    /// Open the console log for appending, creating it if needed.
    pub fn open_output(&self) -> Result<File> {
        let path = self.output_path();
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("opening console log {:?}", path))
    }

    /// Console output so far; empty when there is none yet.
    pub fn read_output(&self) -> String {
        match fs::read(self.output_path()) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(err) => {
                debug!(job = %self.key(), error = %err, "no console output");
                String::new()
            }
        }
    }

    pub fn workspace_path(&self) -> PathBuf {
        self.dir.join(WORKSPACE_DIR)
    }

    pub fn make_workspace(&self) -> Result<()> {
        let path = self.workspace_path();
        fs::create_dir_all(&path).with_context(|| format!("creating workspace {:?}", path))
    }

    pub fn remove_workspace(&self) -> Result<()> {
        let path = self.workspace_path();
        match fs::remove_dir_all(&path) {
            Err(err) if err.kind() != std::io::ErrorKind::NotFound => {
                Err(err).with_context(|| format!("removing workspace {:?}", path))
            }
            _ => Ok(()),
        }
    }

    pub fn artifact_path(&self) -> PathBuf {
        self.dir.join(ARTIFACT_FILE)
    }

    /// Size of the archived workspace in bytes, `None` if there is no archive.
    pub fn artifact_size(&self) -> Option<u64> {
        fs::metadata(self.artifact_path()).ok().map(|m| m.len())
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

fn modified_or_epoch(path: &Path) -> SystemTime {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .unwrap_or(SystemTime::UNIX_EPOCH)
}
