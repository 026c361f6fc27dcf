// src/engine/registry.rs

use std::cmp::Reverse;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::engine::cancel::{self, CancelTrigger};
use crate::engine::{lifecycle, retention};
use crate::errors::CinderError;
use crate::store::params::{self, Params};
use crate::store::{Job, JobKey, JobStatus, Project, is_valid_project_name};

/// Result of a start request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// The job was created and its lifecycle launched.
    Started(String),
    /// Another job of the same project is still running.
    Busy,
    /// The job could not be created.
    Rejected(String),
}

impl StartOutcome {
    /// Name of the started job, if any.
    pub fn job_name(&self) -> Option<&str> {
        match self {
            StartOutcome::Started(name) => Some(name),
            _ => None,
        }
    }

    pub fn is_started(&self) -> bool {
        matches!(self, StartOutcome::Started(_))
    }
}

/// Process-wide index of running jobs, plus the operations that read and
/// mutate the work directory on behalf of collaborators.
///
/// Cloning is cheap and every clone shares the same running index. Build one
/// at startup and hand clones to whoever needs it.
#[derive(Debug, Clone)]
pub struct Registry {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    workdir: PathBuf,
    /// Extra environment handed to every script (trigger endpoint etc.).
    job_env: Params,
    /// Jobs currently executing. The only shared mutable state.
    running: Mutex<HashMap<JobKey, CancelTrigger>>,
    /// Lifecycle tasks not yet fully done (archival included).
    lifecycles: AtomicUsize,
    settled: Notify,
}

impl Registry {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self::with_job_env(workdir, Params::new())
    }

    /// Registry whose scripts additionally see `job_env`. These variables
    /// take precedence over job parameters.
    pub fn with_job_env(workdir: impl Into<PathBuf>, job_env: Params) -> Self {
        Self {
            inner: Arc::new(Inner {
                workdir: workdir.into(),
                job_env,
                running: Mutex::new(HashMap::new()),
                lifecycles: AtomicUsize::new(0),
                settled: Notify::new(),
            }),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.inner.workdir
    }

    pub fn job_env(&self) -> &Params {
        &self.inner.job_env
    }

    /// Projects are the immediate subdirectories of the work directory,
    /// sorted by name.
    pub fn list_projects(&self) -> Result<Vec<Project>> {
        let workdir = self.workdir();
        let mut projects = Vec::new();

        for entry in
            fs::read_dir(workdir).with_context(|| format!("reading work dir {:?}", workdir))?
        {
            let entry = entry?;
            if !entry.path().is_dir() {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) => projects.push(self.open_project(&name)),
                Err(raw) => debug!(name = ?raw, "skipping non UTF-8 project directory"),
            }
        }

        projects.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(projects)
    }

    /// Handle for project `name`. Does not check that it exists.
    pub fn open_project(&self, name: &str) -> Project {
        Project::new(name, self.workdir().join(name))
    }

    /// Jobs of `project`, most recent first. Directory names that are not
    /// numbers sort as job 0.
    pub fn list_jobs(&self, project: &Project) -> Result<Vec<Job>> {
        let dir = project.dir();
        let mut jobs = Vec::new();

        for entry in fs::read_dir(dir).with_context(|| format!("reading project dir {:?}", dir))? {
            let entry = entry?;
            if !entry.path().is_dir() {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) => jobs.push(project.open_job(&name)),
                Err(raw) => debug!(name = ?raw, "skipping non UTF-8 job directory"),
            }
        }

        jobs.sort_by_key(|job| Reverse(job.number()));
        Ok(jobs)
    }

    /// Handle for job `name` of `project`. Does not check that it exists.
    pub fn open_job(&self, project: &Project, name: &str) -> Job {
        project.open_job(name)
    }

    /// Start a new job for `project` unless one is already running.
    ///
    /// The job gets the project's persisted parameters overlaid with
    /// `params`. Returns as soon as the job exists on disk and its lifecycle
    /// task is spawned; must be called from within a Tokio runtime.
    pub fn start_job<I, K, V>(&self, project: &Project, params: I) -> StartOutcome
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let name = project.name();
        if !is_valid_project_name(name) {
            warn!(project = %name, "refusing to start job for invalid project name");
            let reason = CinderError::InvalidProjectName(name.to_string());
            return StartOutcome::Rejected(reason.to_string());
        }

        let Ok(runtime) = Handle::try_current() else {
            warn!(project = %name, "start requested outside of an async runtime");
            return StartOutcome::Rejected("no async runtime available".to_string());
        };

        let mut project = project.clone();
        project.load_params();
        let mut job_params = project.params().clone();
        job_params.extend(params::normalize(params));

        // Check, mint and register under one lock so two concurrent
        // requests for the same project cannot both pass.
        let (job, watch, guard) = {
            let mut running = self.inner.running.lock();
            if running.keys().any(|key| key.project == name) {
                debug!(project = %name, "project already has a running job");
                return StartOutcome::Busy;
            }

            let mut job = match project.new_job() {
                Ok(job) => job,
                Err(err) => {
                    warn!(project = %name, error = %format!("{err:#}"), "could not create job");
                    return StartOutcome::Rejected(format!("{err:#}"));
                }
            };

            job.set_params(job_params);
            if let Err(err) = job.save_params() {
                warn!(job = %job.key(), error = %format!("{err:#}"), "could not save job params");
            }

            let (trigger, watch) = cancel::channel();
            running.insert(job.key(), trigger);
            let guard = LifecycleGuard::new(Arc::clone(&self.inner), job.key());
            (job, watch, guard)
        };

        retention::prune(self, &project, retention::KEEP_JOBS);

        let job_name = job.name().to_string();
        runtime.spawn(lifecycle::run(self.clone(), job, watch, guard));
        StartOutcome::Started(job_name)
    }

    /// Ask `job` to stop. A no-op when it is not running.
    pub fn interrupt(&self, job: &Job) {
        let mut running = self.inner.running.lock();
        if let Some(trigger) = running.get_mut(&job.key()) {
            if trigger.request() {
                info!(job = %job.key(), "interrupting job");
            } else {
                debug!(job = %job.key(), "job already interrupted");
            }
        }
    }

    /// Ask every running job to stop.
    pub fn interrupt_all(&self) {
        let mut running = self.inner.running.lock();
        for (key, trigger) in running.iter_mut() {
            if trigger.request() {
                info!(job = %key, "interrupting job");
            }
        }
    }

    /// True while `job` is in the running index.
    pub fn is_being_built(&self, job: &Job) -> bool {
        self.inner.running.lock().contains_key(&job.key())
    }

    /// Persisted status, or `InProgress` while the job is running.
    pub fn effective_status(&self, job: &Job) -> JobStatus {
        if self.is_being_built(job) {
            JobStatus::InProgress
        } else {
            job.status()
        }
    }

    /// Snapshot of the running index.
    pub fn running(&self) -> Vec<JobKey> {
        let mut keys: Vec<JobKey> = self.inner.running.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Wait until every lifecycle task, archival included, has completed.
    ///
    /// Returns `false` if `timeout` elapsed first.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let settle = async {
            loop {
                let notified = self.inner.settled.notified();
                if self.inner.lifecycles.load(Ordering::SeqCst) == 0 {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, settle).await.is_ok()
    }

    pub(crate) fn deregister(&self, job: &Job) {
        self.inner.deregister(&job.key());
    }

    /// Enter `job` in the running index the way `start_job` does, without
    /// spawning its lifecycle.
    #[cfg(test)]
    pub(crate) fn track(&self, job: &Job) -> (cancel::CancelWatch, LifecycleGuard) {
        let (trigger, watch) = cancel::channel();
        self.inner.running.lock().insert(job.key(), trigger);
        (watch, LifecycleGuard::new(Arc::clone(&self.inner), job.key()))
    }
}

impl Inner {
    fn deregister(&self, key: &JobKey) -> bool {
        self.running.lock().remove(key).is_some()
    }
}

/// Tracks one lifecycle task. Dropping it marks the task as settled and, as a
/// fallback, removes the job from the running index if the task never got to
/// do so.
#[derive(Debug)]
pub(crate) struct LifecycleGuard {
    inner: Arc<Inner>,
    key: JobKey,
}

impl LifecycleGuard {
    fn new(inner: Arc<Inner>, key: JobKey) -> Self {
        inner.lifecycles.fetch_add(1, Ordering::SeqCst);
        Self { inner, key }
    }
}

impl Drop for LifecycleGuard {
    fn drop(&mut self) {
        if self.inner.deregister(&self.key) {
            warn!(job = %self.key, "lifecycle ended without deregistering job");
        }
        if self.inner.lifecycles.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.inner.settled.notify_waiters();
        }
    }
}
