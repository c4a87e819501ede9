use thiserror::Error;

use crate::models::JobId;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum CoreErrorKind {
    SubmissionRejected,
    TransportFailure,
    JobError,
    Cancelled,
    Timeout,
    InvalidInput,
    ParseFailure,
    StorageFailure,
    Internal,
}

#[derive(Clone, Debug, Eq, PartialEq, Error)]
#[error("{kind:?}: {message}")]
pub struct CoreError {
    pub app: Option<String>,
    pub job: Option<JobId>,
    pub kind: CoreErrorKind,
    pub message: String,
}

impl CoreError {
    pub fn new(kind: CoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            app: None,
            job: None,
            kind,
            message: message.into(),
        }
    }

    pub fn for_app(mut self, app: impl Into<String>) -> Self {
        if self.app.is_none() {
            self.app = Some(app.into());
        }
        self
    }

    pub fn for_job(mut self, job: &JobId) -> Self {
        if self.job.is_none() {
            self.job = Some(job.clone());
        }
        self
    }
}
