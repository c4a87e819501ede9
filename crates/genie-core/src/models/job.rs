use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{CoreError, CoreErrorKind};

/// Opaque backend-assigned identifier for one unit of asynchronous work.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for JobId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Waiting,
    Running,
    Cancelled,
    Error,
    Finished,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Running => "running",
            Self::Cancelled => "cancelled",
            Self::Error => "error",
            Self::Finished => "finished",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Cancelled | Self::Error | Self::Finished)
    }
}

impl Display for JobStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "waiting" => Ok(Self::Waiting),
            "running" => Ok(Self::Running),
            "cancelled" => Ok(Self::Cancelled),
            "error" => Ok(Self::Error),
            "finished" => Ok(Self::Finished),
            _ => Err(()),
        }
    }
}

/// Progress report for a single job, as carried in the `update` member of a
/// progress event.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub status: JobStatus,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<Value>,
    /// Percentage in `0..=100`, reported by tools that know their extent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
}

impl StatusUpdate {
    pub fn new(status: JobStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            values: Vec::new(),
            progress: None,
        }
    }

    pub fn waiting() -> Self {
        Self::new(JobStatus::Waiting, "Waiting...")
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// One decoded event from a job's progress stream.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub update: StatusUpdate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

impl ProgressEvent {
    pub fn new(update: StatusUpdate) -> Self {
        Self {
            update,
            result: None,
        }
    }

    pub fn finished(message: impl Into<String>, result: Value) -> Self {
        Self {
            update: StatusUpdate::new(JobStatus::Finished, message),
            result: Some(result),
        }
    }

    pub fn parse(payload: &str) -> Result<Self, CoreError> {
        serde_json::from_str(payload).map_err(|error| {
            CoreError::new(
                CoreErrorKind::ParseFailure,
                format!("malformed progress event: {error}"),
            )
        })
    }

    pub fn is_terminal(&self) -> bool {
        self.update.is_terminal()
    }
}

/// Body of a successful `POST /submit` response.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct SubmitResponse {
    #[serde(default)]
    pub job_id: Option<JobId>,
    #[serde(default)]
    pub job_ids: Option<Vec<JobId>>,
}

impl SubmitResponse {
    pub fn into_job_ids(self) -> Result<Vec<JobId>, CoreError> {
        match (self.job_ids, self.job_id) {
            (Some(job_ids), _) => Ok(job_ids),
            (None, Some(job_id)) => Ok(vec![job_id]),
            (None, None) => Err(CoreError::new(
                CoreErrorKind::ParseFailure,
                "submit response carried neither 'job_id' nor 'job_ids'",
            )),
        }
    }
}
