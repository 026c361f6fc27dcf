use std::fs;
use std::time::SystemTime;

use tempfile::TempDir;

use cinder::store::{JobKey, JobStatus, Project};

fn temp_project() -> (TempDir, Project) {
    let dir = TempDir::new().unwrap();
    let project = Project::new("demo", dir.path().join("demo"));
    fs::create_dir_all(project.dir()).unwrap();
    (dir, project)
}

#[test]
fn absent_job_reads_safe_defaults() {
    let (_dir, project) = temp_project();
    let job = project.open_job("1");

    assert!(!job.exists());
    assert_eq!(job.status(), JobStatus::Unknown);
    assert_eq!(job.read_output(), "");
    assert_eq!(job.start_date(), SystemTime::UNIX_EPOCH);
    assert_eq!(job.end_date(), SystemTime::UNIX_EPOCH);
    assert_eq!(job.artifact_size(), None);

    // Writes need the job directory.
    assert!(job.log_start().is_err());
    assert!(job.set_status(JobStatus::Finished).is_err());
}

#[test]
fn status_is_read_back_from_disk() {
    let (_dir, project) = temp_project();
    let job = project.new_job().unwrap();

    assert_eq!(job.status(), JobStatus::Unknown);
    job.set_status(JobStatus::Stopped).unwrap();
    assert_eq!(job.status(), JobStatus::Stopped);
    assert_eq!(fs::read_to_string(job.dir().join("status")).unwrap(), "2");

    // A second handle sees the same state.
    assert_eq!(project.open_job(job.name()).status(), JobStatus::Stopped);
    assert!(job.end_date() > SystemTime::UNIX_EPOCH);
}

#[test]
fn end_date_waits_for_a_terminal_status() {
    let (_dir, project) = temp_project();
    let job = project.new_job().unwrap();

    // Minting writes an Unknown status file; that is not an end.
    assert!(job.dir().join("status").is_file());
    assert_eq!(job.end_date(), SystemTime::UNIX_EPOCH);

    job.set_status(JobStatus::Failed).unwrap();
    assert!(job.end_date() > SystemTime::UNIX_EPOCH);
}

#[test]
fn stray_in_progress_code_reads_as_unknown() {
    let (_dir, project) = temp_project();
    let job = project.new_job().unwrap();
    fs::write(job.dir().join("status"), "4").unwrap();

    assert_eq!(job.status(), JobStatus::Unknown);
    assert_eq!(job.end_date(), SystemTime::UNIX_EPOCH);
}

#[test]
fn start_marker_defines_start_date() {
    let (_dir, project) = temp_project();
    let job = project.new_job().unwrap();

    assert_eq!(job.start_date(), SystemTime::UNIX_EPOCH);
    job.log_start().unwrap();
    assert!(job.start_date() > SystemTime::UNIX_EPOCH);
    assert!(job.dir().join("start").is_file());
}

#[test]
fn output_is_appended() {
    let (_dir, project) = temp_project();
    let job = project.new_job().unwrap();

    {
        use std::io::Write;
        let mut out = job.open_output().unwrap();
        write!(out, "first ").unwrap();
        let mut again = job.open_output().unwrap();
        write!(again, "second").unwrap();
    }

    assert_eq!(job.read_output(), "first second");
    assert_eq!(job.output_path(), job.dir().join("console.log"));
}

#[test]
fn workspace_and_artifact_paths() {
    let (_dir, project) = temp_project();
    let job = project.new_job().unwrap();

    assert_eq!(job.workspace_path(), job.dir().join("workspace"));
    assert_eq!(job.artifact_path(), job.dir().join("workspace.tar.gz"));

    job.make_workspace().unwrap();
    assert!(job.workspace_path().is_dir());
    job.remove_workspace().unwrap();
    assert!(!job.workspace_path().exists());
    // Removing twice is not an error.
    job.remove_workspace().unwrap();

    fs::write(job.artifact_path(), b"12345").unwrap();
    assert_eq!(job.artifact_size(), Some(5));
}

#[test]
fn identity_is_project_and_name() {
    let dir = TempDir::new().unwrap();
    let a = Project::new("a", dir.path().join("a"));
    let b = Project::new("b", dir.path().join("b"));

    assert_eq!(a.open_job("1"), a.open_job("1"));
    assert_ne!(a.open_job("1"), a.open_job("2"));
    assert_ne!(a.open_job("1"), b.open_job("1"));
    assert_eq!(a.open_job("7").key(), JobKey::new("a", "7"));
    assert_eq!(JobKey::new("a", "7").to_string(), "a#7");
}

#[test]
fn job_params_are_persisted() {
    let (_dir, project) = temp_project();
    let mut job = project.new_job().unwrap();

    job.set_params([("branch", "main"), ("bad-key", "x")]);
    job.save_params().unwrap();

    let mut reopened = project.open_job(job.name());
    reopened.load_params();
    assert_eq!(reopened.params().len(), 1);
    assert_eq!(reopened.params().get("BRANCH").map(String::as_str), Some("main"));
}

#[test]
fn non_numeric_names_count_as_zero() {
    let (_dir, project) = temp_project();
    assert_eq!(project.open_job("42").number(), 42);
    assert_eq!(project.open_job("old").number(), 0);
}
