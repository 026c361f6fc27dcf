// src/store/status.rs

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// State of a job.
///
/// `Unknown`, `Finished`, `Stopped` and `Failed` are persisted as a single
/// decimal digit in the job's `status` file. `InProgress` is never written to
/// disk: it is reported only while the registry still holds the job in its
/// running index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Unknown,
    Finished,
    Stopped,
    Failed,
    InProgress,
}

impl JobStatus {
    /// Byte stored on disk for this status.
    pub fn code(self) -> u8 {
        match self {
            JobStatus::Unknown => 0,
            JobStatus::Finished => 1,
            JobStatus::Stopped => 2,
            JobStatus::Failed => 3,
            JobStatus::InProgress => 4,
        }
    }

    /// Status for a byte read from disk. `InProgress` is never persisted, so
    /// its code reads back as `Unknown` like any other stray value.
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => JobStatus::Finished,
            2 => JobStatus::Stopped,
            3 => JobStatus::Failed,
            _ => JobStatus::Unknown,
        }
    }

    /// Decode the content of a `status` file. Anything unreadable is `Unknown`.
    pub fn decode(raw: &str) -> Self {
        raw.trim()
            .parse::<u8>()
            .map(JobStatus::from_code)
            .unwrap_or(JobStatus::Unknown)
    }

    /// Encode for the `status` file.
    pub fn encode(self) -> String {
        self.code().to_string()
    }

    /// True for the states a finished lifecycle leaves behind.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Finished | JobStatus::Stopped | JobStatus::Failed
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Unknown => "unknown",
            JobStatus::Finished => "finished",
            JobStatus::Stopped => "stopped",
            JobStatus::Failed => "failed",
            JobStatus::InProgress => "inprogress",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "unknown" => Ok(JobStatus::Unknown),
            "finished" => Ok(JobStatus::Finished),
            "stopped" => Ok(JobStatus::Stopped),
            "failed" => Ok(JobStatus::Failed),
            "inprogress" => Ok(JobStatus::InProgress),
            other => Err(format!("invalid job status: {other}")),
        }
    }
}
