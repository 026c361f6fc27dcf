// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, Subcommand, ValueEnum};

/// Command-line arguments for `cinder`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "cinder",
    version,
    about = "Minimal continuous build server: runs project scripts as tracked jobs.",
    long_about = None
)]
pub struct CliArgs {
    /// Optional config file (TOML) with a `[server]` section.
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<String>,

    /// Work directory holding one subdirectory per project.
    ///
    /// Overrides `[server].workdir`; default `workdir`.
    #[arg(short = 't', long = "path", value_name = "PATH", global = true)]
    pub path: Option<String>,

    /// Name of this instance, shown in logs.
    #[arg(short, long, value_name = "NAME", global = true)]
    pub name: Option<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `CINDER_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Option<CliCommand>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum CliCommand {
    /// Run the server until interrupted (default).
    Serve,

    /// Ask a running server to start a job of PROJECT.
    ///
    /// The server is found through `SOCKET_PORT` and `SOCKET_TOKEN`, which
    /// every job script receives. Exits 0 when the job was started, 1
    /// otherwise.
    Start {
        #[arg(value_name = "PROJECT")]
        project: String,
    },

    /// List projects, or the jobs of one project.
    List {
        #[arg(value_name = "PROJECT")]
        project: Option<String>,
    },
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
