// src/store/mod.rs

//! Filesystem-backed data model.
//!
//! The work directory is the only source of truth:
//!
//! ```text
//! <workdir>/<project>/script.sh
//! <workdir>/<project>/counter
//! <workdir>/<project>/params
//! <workdir>/<project>/<job>/status
//! <workdir>/<project>/<job>/start
//! <workdir>/<project>/<job>/console.log
//! <workdir>/<project>/<job>/params
//! <workdir>/<project>/<job>/workspace/
//! <workdir>/<project>/<job>/workspace.tar.gz
//! ```
//!
//! - [`status`] encodes job states for disk and wire.
//! - [`params`] reads and writes `KEY=value` override files.
//! - [`job`] and [`project`] are thin path handles with accessors over those
//!   files.

pub mod job;
pub mod params;
pub mod project;
pub mod status;

pub use job::{Job, JobKey};
pub use params::Params;
pub use project::{Project, is_valid_project_name};
pub use status::JobStatus;
