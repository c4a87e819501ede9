use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use serde_json::Value;

use crate::backend::JobBackend;
use crate::models::{JobId, JobStatus, ProgressEvent, StatusUpdate};
use crate::orchestration::{CancellationToken, FailurePolicy, JobChannel};

/// Receives a draining queue's notifications, always from the draining task
/// and never concurrently.
pub trait QueueListener: Send {
    fn on_job_started(&mut self, _job_id: &JobId) {}

    fn on_update(&mut self, job_id: &JobId, update: &StatusUpdate);

    fn on_job_result(&mut self, job_id: &JobId, result: Value);

    /// Called exactly once per drain.
    fn on_drained(&mut self, status: JobStatus);
}

#[derive(Clone, Debug, PartialEq)]
pub struct QueueOutcome {
    pub status: JobStatus,
    pub completed: Vec<JobId>,
    pub failed: Vec<JobId>,
    /// Jobs that never reached a terminal status, in queue order.
    pub abandoned: Vec<JobId>,
}

/// Ordered jobs of one submission, drained one channel at a time.
pub struct JobQueue {
    pending: VecDeque<JobId>,
    policy: FailurePolicy,
    token: CancellationToken,
}

impl JobQueue {
    /// Later duplicates of an id are dropped; first-occurrence order is kept.
    pub fn new(job_ids: impl IntoIterator<Item = JobId>) -> Self {
        let mut seen = HashSet::new();
        let mut pending = VecDeque::new();
        for job_id in job_ids {
            if seen.insert(job_id.clone()) {
                pending.push_back(job_id);
            } else {
                tracing::warn!(job_id = %job_id, "dropping duplicate job id");
            }
        }

        Self {
            pending,
            policy: FailurePolicy::default(),
            token: CancellationToken::new(),
        }
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    /// Handle that cancels this queue while it drains.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn cancel(&self) -> bool {
        self.token.cancel()
    }

    pub fn pending(&self) -> impl Iterator<Item = &JobId> {
        self.pending.iter()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub async fn drain(
        mut self,
        backend: Arc<dyn JobBackend>,
        listener: &mut dyn QueueListener,
    ) -> QueueOutcome {
        let mut completed = Vec::new();
        let mut failed = Vec::new();

        loop {
            if self.token.is_cancelled() {
                return self.finish(JobStatus::Cancelled, listener, completed, failed);
            }

            let Some(job_id) = self.pending.pop_front() else {
                let status = if self.policy == FailurePolicy::SkipFailedJobs
                    && completed.is_empty()
                    && !failed.is_empty()
                {
                    JobStatus::Error
                } else {
                    JobStatus::Finished
                };
                return self.finish(status, listener, completed, failed);
            };

            listener.on_job_started(&job_id);
            let terminal = self.follow(backend.as_ref(), &job_id, listener).await;

            let Some(terminal) = terminal else {
                self.pending.push_front(job_id);
                return self.finish(JobStatus::Cancelled, listener, completed, failed);
            };

            match terminal.update.status {
                JobStatus::Finished => {
                    listener.on_job_result(&job_id, terminal.result.unwrap_or(Value::Null));
                    completed.push(job_id);
                }
                JobStatus::Error if self.policy == FailurePolicy::SkipFailedJobs => {
                    tracing::warn!(
                        job_id = %job_id,
                        message = %terminal.update.message,
                        "skipping failed job"
                    );
                    failed.push(job_id);
                }
                status => {
                    failed.push(job_id);
                    return self.finish(status, listener, completed, failed);
                }
            }
        }
    }

    /// Forwards a job's updates until its terminal update, or returns `None`
    /// when the queue is cancelled first.
    async fn follow(
        &self,
        backend: &dyn JobBackend,
        job_id: &JobId,
        listener: &mut dyn QueueListener,
    ) -> Option<ProgressEvent> {
        let mut channel = JobChannel::open(backend, job_id.clone());

        let terminal = loop {
            let event = tokio::select! {
                biased;
                _ = self.token.cancelled() => None,
                event = channel.next() => event,
            };

            let Some(event) = event else {
                break None;
            };
            listener.on_update(job_id, &event.update);
            if event.is_terminal() {
                break Some(event);
            }
        };

        channel.close();
        terminal
    }

    fn finish(
        mut self,
        status: JobStatus,
        listener: &mut dyn QueueListener,
        completed: Vec<JobId>,
        failed: Vec<JobId>,
    ) -> QueueOutcome {
        let abandoned: Vec<JobId> = self.pending.drain(..).collect();
        tracing::info!(
            status = %status,
            completed = completed.len(),
            failed = failed.len(),
            abandoned = abandoned.len(),
            "job queue drained"
        );
        listener.on_drained(status);

        QueueOutcome {
            status,
            completed,
            failed,
            abandoned,
        }
    }
}
