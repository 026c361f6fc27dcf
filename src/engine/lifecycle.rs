// src/engine/lifecycle.rs

//! Execution of a single job, from spawning its script to archiving its
//! workspace.

use std::fs::File;
use std::io::Write;
use std::process::Stdio;

use tokio::process::{Child, Command};
use tracing::{debug, error, info, warn};

use crate::engine::archive;
use crate::engine::cancel::CancelWatch;
use crate::engine::registry::{LifecycleGuard, Registry};
use crate::store::{Job, JobKey, JobStatus};

/// Line appended to the console log when the script cannot be run at all.
const FAILURE_MARKER: &str = "Failed!";

/// Drive `job` to a terminal status.
///
/// Order of effects:
/// 1. workspace + start marker + console log are prepared,
/// 2. the script runs until it exits or the job is interrupted,
/// 3. exactly one terminal status is written,
/// 4. the job leaves the running index,
/// 5. the workspace is archived and deleted.
///
/// The archive therefore appears slightly after the job stops being
/// reported as running.
pub(crate) async fn run(
    registry: Registry,
    job: Job,
    cancel: CancelWatch,
    _guard: LifecycleGuard,
) {
    let key = job.key();
    info!(job = %key, "job started");

    if let Err(err) = job.make_workspace() {
        warn!(job = %key, error = %format!("{err:#}"), "could not create workspace");
    }
    if let Err(err) = job.log_start() {
        warn!(job = %key, error = %format!("{err:#}"), "could not write start marker");
    }

    let output = match job.open_output() {
        Ok(file) => file,
        Err(err) => {
            error!(job = %key, error = %format!("{err:#}"), "could not open console log");
            record_terminal_status(&job, JobStatus::Failed);
            registry.deregister(&job);
            return;
        }
    };

    let status = execute(&registry, &job, output, cancel).await;
    record_terminal_status(&job, status);
    registry.deregister(&job);

    archive_workspace(&job).await;

    info!(job = %key, %status, "job finished");
}

/// Run the script and map its end to a terminal status.
async fn execute(registry: &Registry, job: &Job, mut output: File, cancel: CancelWatch) -> JobStatus {
    let key = job.key();

    let mut child = match script_command(registry, job, &output).and_then(|mut cmd| cmd.spawn()) {
        Ok(child) => child,
        Err(err) => {
            warn!(job = %key, error = %err, "could not start script");
            append_line(&mut output, FAILURE_MARKER, &key);
            return JobStatus::Failed;
        }
    };

    debug!(job = %key, pid = ?child.id(), "script running");

    // Either the script exits on its own, or an interrupt arrives first.
    // Leaving the select drops the watch, which retires the signal.
    tokio::select! {
        waited = child.wait() => match waited {
            Ok(exit) if exit.success() => {
                info!(job = %key, exit_code = 0, "script exited");
                JobStatus::Finished
            }
            Ok(exit) => {
                info!(job = %key, exit_code = ?exit.code(), "script failed");
                append_line(&mut output, &exit.to_string(), &key);
                JobStatus::Failed
            }
            Err(err) => {
                warn!(job = %key, error = %err, "could not wait for script");
                append_line(&mut output, FAILURE_MARKER, &key);
                JobStatus::Failed
            }
        },

        () = cancel.cancelled() => {
            info!(job = %key, "interrupt received; killing script");
            terminate(&mut child, &key).await;
            JobStatus::Stopped
        }
    }
}

fn script_command(registry: &Registry, job: &Job, output: &File) -> std::io::Result<Command> {
    let script = registry.open_project(job.project_name()).script_path();

    let mut cmd = if cfg!(windows) {
        Command::new(&script)
    } else {
        let mut c = Command::new("sh");
        c.arg(&script);
        c
    };

    cmd.current_dir(job.workspace_path())
        .envs(job.params())
        .envs(registry.job_env())
        .stdin(Stdio::null())
        .stdout(output.try_clone()?)
        .stderr(output.try_clone()?)
        .kill_on_drop(true);

    // Own process group, so an interrupt reaches everything the script spawned.
    #[cfg(unix)]
    cmd.process_group(0);

    Ok(cmd)
}

async fn terminate(child: &mut Child, key: &JobKey) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        if let Some(pid) = child.id().and_then(|pid| i32::try_from(pid).ok()) {
            if let Err(err) = killpg(Pid::from_raw(pid), Signal::SIGKILL) {
                debug!(job = %key, error = %err, "could not signal process group");
            }
        }
    }

    if let Err(err) = child.kill().await {
        debug!(job = %key, error = %err, "could not kill script process");
    }
}

/// Write `status` unless a terminal status is already on disk.
fn record_terminal_status(job: &Job, status: JobStatus) {
    let current = job.status();
    if current.is_terminal() {
        warn!(
            job = %job.key(),
            %current,
            attempted = %status,
            "terminal status already recorded; keeping it"
        );
        return;
    }

    if let Err(err) = job.set_status(status) {
        error!(job = %job.key(), %status, error = %format!("{err:#}"), "could not write status");
    }
}

async fn archive_workspace(job: &Job) {
    let key = job.key();
    let src = job.workspace_path();
    let dest = job.artifact_path();

    let archived = tokio::task::spawn_blocking(move || archive::compress_dir(&src, &dest)).await;
    match archived {
        Ok(Ok(())) => debug!(job = %key, "workspace archived"),
        Ok(Err(err)) => warn!(job = %key, error = %format!("{err:#}"), "could not archive workspace"),
        Err(err) => warn!(job = %key, error = %err, "archive task failed"),
    }

    if let Err(err) = job.remove_workspace() {
        warn!(job = %key, error = %format!("{err:#}"), "could not remove workspace");
    }
}

fn append_line(output: &mut File, line: &str, key: &JobKey) {
    if let Err(err) = writeln!(output, "\n{line}") {
        debug!(job = %key, error = %err, "could not append to console log");
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::time::Duration;

    use tempfile::TempDir;

    use super::*;
    use crate::store::Project;

    const SETTLE: Duration = Duration::from_secs(10);

    fn project_with_script(script: &str) -> (TempDir, Registry, Project) {
        let dir = TempDir::new().unwrap();
        let registry = Registry::new(dir.path());
        let project = registry.open_project("demo");
        fs::create_dir(project.dir()).unwrap();
        fs::write(project.script_path(), script).unwrap();
        (dir, registry, project)
    }

    #[tokio::test]
    async fn unopenable_console_log_fails_without_archiving() {
        let (_dir, registry, project) = project_with_script("echo never\n");
        let job = project.new_job().unwrap();
        // A directory in place of the log makes opening it for append fail.
        fs::create_dir(job.output_path()).unwrap();

        let (watch, guard) = registry.track(&job);
        assert!(registry.is_being_built(&job));

        run(registry.clone(), job.clone(), watch, guard).await;

        assert_eq!(job.status(), JobStatus::Failed);
        assert!(!registry.is_being_built(&job));
        assert!(registry.running().is_empty());
        assert!(!job.artifact_path().exists());
        assert!(registry.wait_idle(SETTLE).await);
    }

    #[tokio::test]
    async fn existing_terminal_status_is_kept() {
        let (_dir, registry, project) = project_with_script("exit 3\n");
        let job = project.new_job().unwrap();
        job.set_status(JobStatus::Stopped).unwrap();

        let (watch, guard) = registry.track(&job);
        run(registry.clone(), job.clone(), watch, guard).await;

        // The failing script would have recorded Failed.
        assert_eq!(job.status(), JobStatus::Stopped);
        assert!(!registry.is_being_built(&job));
    }

    #[test]
    fn terminal_status_is_written_once() {
        let (_dir, _registry, project) = project_with_script("true\n");
        let job = project.new_job().unwrap();

        record_terminal_status(&job, JobStatus::Finished);
        assert_eq!(job.status(), JobStatus::Finished);

        record_terminal_status(&job, JobStatus::Failed);
        record_terminal_status(&job, JobStatus::Stopped);
        assert_eq!(job.status(), JobStatus::Finished);
    }
}
