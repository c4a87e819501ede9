use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::time::SystemTime;

use crate::models::{JobId, JobStatus, StatusUpdate};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct RunId(pub u64);

impl Display for RunId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum RunState {
    #[default]
    Idle,
    Submitting,
    Queued,
    Running,
    Finished,
    Cancelled,
    Error,
}

impl RunState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Submitting => "submitting",
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Finished => "finished",
            Self::Cancelled => "cancelled",
            Self::Error => "error",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Cancelled | Self::Error)
    }

    pub fn is_active(self) -> bool {
        matches!(self, Self::Submitting | Self::Queued | Self::Running)
    }

    /// Run state reached when a queue drains with `status`. Non-terminal
    /// statuses never drain a queue and are treated as errors.
    pub fn from_drained(status: JobStatus) -> Self {
        match status {
            JobStatus::Finished => Self::Finished,
            JobStatus::Cancelled => Self::Cancelled,
            JobStatus::Waiting | JobStatus::Running | JobStatus::Error => Self::Error,
        }
    }
}

impl Display for RunState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for RunState {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "idle" => Ok(Self::Idle),
            "submitting" => Ok(Self::Submitting),
            "queued" => Ok(Self::Queued),
            "running" => Ok(Self::Running),
            "finished" => Ok(Self::Finished),
            "cancelled" => Ok(Self::Cancelled),
            "error" => Ok(Self::Error),
            _ => Err(()),
        }
    }
}

/// Observable state of a coordinator's current run.
#[derive(Clone, Debug, PartialEq)]
pub struct RunSnapshot {
    pub run_id: Option<RunId>,
    pub app: Option<String>,
    pub state: RunState,
    pub update: StatusUpdate,
    pub job_ids: Vec<JobId>,
    pub active_job: Option<JobId>,
    pub completed_jobs: usize,
    pub results_ready: bool,
}

impl RunSnapshot {
    pub fn idle() -> Self {
        Self {
            run_id: None,
            app: None,
            state: RunState::Idle,
            update: StatusUpdate::waiting(),
            job_ids: Vec::new(),
            active_job: None,
            completed_jobs: 0,
            results_ready: false,
        }
    }

    pub fn submitting(run_id: RunId, app: &str) -> Self {
        Self {
            run_id: Some(run_id),
            app: Some(app.to_string()),
            state: RunState::Submitting,
            update: StatusUpdate::new(JobStatus::Running, "Submitting..."),
            ..Self::idle()
        }
    }
}

impl Default for RunSnapshot {
    fn default() -> Self {
        Self::idle()
    }
}

/// Persisted summary of one run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RunRecord {
    pub label: String,
    pub run_id: RunId,
    pub app: String,
    pub state: RunState,
    pub job_ids: Vec<JobId>,
    pub message: Option<String>,
    pub result_count: usize,
    pub created_at: SystemTime,
    pub finished_at: Option<SystemTime>,
}
