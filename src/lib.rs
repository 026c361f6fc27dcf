// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod logging;
pub mod store;
pub mod trigger;

use std::path::Path;
use std::time::{Duration, SystemTime};

use anyhow::Result;
use chrono::{DateTime, Local};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::cli::{CliArgs, CliCommand};
use crate::config::{ConfigOverrides, ServerConfig, load_and_validate};
use crate::engine::Registry;
use crate::store::Project;
use crate::trigger::{TriggerEndpoint, TriggerServer, client};

/// High-level entry point used by `main.rs`. Returns the process exit code.
pub async fn run(args: CliArgs) -> Result<i32> {
    match args.command.clone().unwrap_or(CliCommand::Serve) {
        CliCommand::Serve => {
            serve(load_config(&args)?).await?;
            Ok(0)
        }
        CliCommand::Start { project } => start_remote(&project).await,
        CliCommand::List { project } => {
            let cfg = load_config(&args)?;
            list(&Registry::new(cfg.workdir), project.as_deref())?;
            Ok(0)
        }
    }
}

fn load_config(args: &CliArgs) -> Result<ServerConfig> {
    let overrides = ConfigOverrides {
        workdir: args.path.clone(),
        name: args.name.clone(),
    };
    Ok(load_and_validate(args.config.as_deref().map(Path::new), &overrides)?)
}

/// Run the server.
///
/// This wires together:
/// - the trigger socket (bound first so its endpoint reaches every job)
/// - the registry
/// - signal handling: on shutdown every running job is interrupted and given
///   the configured grace period to settle
pub async fn serve(cfg: ServerConfig) -> Result<()> {
    let server = TriggerServer::bind().await?;
    let registry = Registry::with_job_env(&cfg.workdir, server.endpoint().env_vars());
    let listener = server.spawn(registry.clone());

    info!(name = %cfg.name, workdir = ?cfg.workdir, "cinder started");

    shutdown_signal().await?;

    info!(name = %cfg.name, "stopping cinder");
    if !shutdown(&registry, listener, cfg.shutdown_grace).await {
        warn!(running = ?registry.running(), "jobs still running at shutdown");
    }

    info!(name = %cfg.name, "cinder finished");
    Ok(())
}

/// Stop the trigger listener, then interrupt every running job and wait up
/// to `grace` for all lifecycles to settle.
///
/// The listener goes first so no request can start a job after the
/// interrupt. Returns `false` if jobs were still settling when `grace` ran
/// out.
pub async fn shutdown(registry: &Registry, listener: JoinHandle<()>, grace: Duration) -> bool {
    listener.abort();
    if let Err(err) = listener.await {
        if !err.is_cancelled() {
            warn!(error = %err, "trigger listener ended abnormally");
        }
    }

    registry.interrupt_all();
    registry.wait_idle(grace).await
}

/// Client mode: ask the server named by the environment to start `project`.
async fn start_remote(project: &str) -> Result<i32> {
    let endpoint = TriggerEndpoint::from_env()?;

    match client::start_project(&endpoint, project).await {
        Ok(response) => {
            info!(project, code = response.code(), "result code");
            Ok(i32::from(response.code()))
        }
        Err(err) => {
            error!(project, error = %err, "could not reach cinder server");
            Ok(i32::from(trigger::Response::Fail.code()))
        }
    }
}

async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut term = signal(SignalKind::terminate())?;
        let mut hangup = signal(SignalKind::hangup())?;
        let mut quit = signal(SignalKind::quit())?;

        tokio::select! {
            res = tokio::signal::ctrl_c() => res?,
            _ = term.recv() => {}
            _ = hangup.recv() => {}
            _ = quit.recv() => {}
        }
    }

    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;

    Ok(())
}

/// Print projects, or the job history of one project, straight from the
/// work directory.
fn list(registry: &Registry, project: Option<&str>) -> Result<()> {
    match project {
        None => {
            for project in registry.list_projects()? {
                println!("{}  (last job #{})", project.name(), project.last_count());
            }
        }
        Some(name) => {
            let mut project = registry.open_project(name);
            project.load_params();
            print_project(registry, &project)?;
        }
    }
    Ok(())
}

fn print_project(registry: &Registry, project: &Project) -> Result<()> {
    println!("{}", project.name());
    for (key, value) in project.params() {
        println!("  {key}={value}");
    }

    for job in registry.list_jobs(project)? {
        let artifact = job
            .artifact_size()
            .map(format_size)
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  #{:<6} {:<10} {}  ->  {}  {}",
            job.name(),
            registry.effective_status(&job),
            format_time(job.start_date()),
            format_time(job.end_date()),
            artifact
        );
    }
    Ok(())
}

fn format_time(time: SystemTime) -> String {
    if time == SystemTime::UNIX_EPOCH {
        return "-".to_string();
    }
    DateTime::<Local>::from(time)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

/// Human-readable binary size, e.g. `1.5 KiB`.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
