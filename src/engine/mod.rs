// src/engine/mod.rs

//! Job orchestration engine.
//!
//! This module ties together:
//! - the registry of running jobs (single flight per project)
//! - the execution lifecycle of one job
//! - the one-shot cancellation signal used to interrupt a job
//! - retention of old jobs and archival of finished workspaces
//!
//! The registry is the only in-memory state. Everything else it reports is
//! read back from the work directory.

pub mod archive;
pub mod cancel;
pub mod lifecycle;
pub mod registry;
pub mod retention;

pub use cancel::{CancelTrigger, CancelWatch};
pub use registry::{Registry, StartOutcome};
pub use retention::KEEP_JOBS;
