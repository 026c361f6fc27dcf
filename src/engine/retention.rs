// src/engine/retention.rs

//! Bounded job history per project.

use std::fs;

use tracing::{debug, info, warn};

use crate::engine::registry::Registry;
use crate::store::Project;

/// Number of most recent jobs kept per project.
pub const KEEP_JOBS: usize = 10;

/// Delete every job of `project` beyond the `keep` most recent ones.
///
/// Best effort: failures are logged and skipped. Jobs still in the running
/// index are never touched. Returns how many job directories were removed.
pub fn prune(registry: &Registry, project: &Project, keep: usize) -> usize {
    let jobs = match registry.list_jobs(project) {
        Ok(jobs) => jobs,
        Err(err) => {
            warn!(project = %project.name(), error = %format!("{err:#}"), "could not list jobs for retention");
            return 0;
        }
    };

    if jobs.len() <= keep {
        return 0;
    }

    info!(
        project = %project.name(),
        total = jobs.len(),
        keep,
        "removing old jobs"
    );

    let mut removed = 0;
    for job in jobs.into_iter().skip(keep) {
        if registry.is_being_built(&job) {
            debug!(job = %job.key(), "old job still running; keeping it");
            continue;
        }
        match fs::remove_dir_all(job.dir()) {
            Ok(()) => {
                debug!(job = %job.key(), "removed old job");
                removed += 1;
            }
            Err(err) => {
                warn!(job = %job.key(), error = %err, "could not remove old job");
            }
        }
    }

    removed
}
