use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use serde_json::Value;

use crate::backend::{BackendResult, FeedSender, JobBackend, ProgressFeed, spawn_feed};
use crate::models::{
    CoreError, CoreErrorKind, JobId, JobStatus, ProgressEvent, Query, StatusUpdate,
};

/// One step of a scripted progress stream.
#[derive(Clone, Debug)]
pub enum ScriptedFrame {
    Event(ProgressEvent),
    /// Delivered verbatim, for malformed-payload scenarios.
    Payload(String),
    /// Ends the stream with a transport error.
    Fail(String),
    Delay(Duration),
}

impl ScriptedFrame {
    pub fn status(status: JobStatus, message: &str) -> Self {
        Self::Event(ProgressEvent::new(StatusUpdate::new(status, message)))
    }

    pub fn running(message: &str) -> Self {
        Self::status(JobStatus::Running, message)
    }

    pub fn finished(result: Value) -> Self {
        Self::Event(ProgressEvent::finished("Job completed", result))
    }
}

/// In-memory backend that replays scripted submissions and progress streams
/// and records every call made against it.
#[derive(Default)]
pub struct ScriptedBackend {
    state: Mutex<ScriptState>,
}

#[derive(Default)]
struct ScriptState {
    submissions: VecDeque<BackendResult<Vec<JobId>>>,
    submit_delay: Option<Duration>,
    cancel_delay: Option<Duration>,
    streams: HashMap<JobId, Vec<ScriptedFrame>>,
    submitted: Vec<Query>,
    opened: Vec<JobId>,
    cancelled: Vec<JobId>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_submission(&self, outcome: BackendResult<Vec<JobId>>) -> &Self {
        if let Ok(mut state) = self.lock_state() {
            state.submissions.push_back(outcome);
        }
        self
    }

    pub fn push_job_ids<I, S>(&self, job_ids: I) -> &Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push_submission(Ok(job_ids.into_iter().map(|id| JobId(id.into())).collect()))
    }

    pub fn set_submit_delay(&self, delay: Duration) -> &Self {
        if let Ok(mut state) = self.lock_state() {
            state.submit_delay = Some(delay);
        }
        self
    }

    /// Holds every cancel request this long before recording it.
    pub fn set_cancel_delay(&self, delay: Duration) -> &Self {
        if let Ok(mut state) = self.lock_state() {
            state.cancel_delay = Some(delay);
        }
        self
    }

    pub fn script(&self, job_id: &str, frames: Vec<ScriptedFrame>) -> &Self {
        if let Ok(mut state) = self.lock_state() {
            state.streams.insert(JobId::from(job_id), frames);
        }
        self
    }

    /// Scripts a job that reports one running update and then finishes with
    /// `result`.
    pub fn script_finished(&self, job_id: &str, result: Value) -> &Self {
        self.script(
            job_id,
            vec![ScriptedFrame::running("Running..."), ScriptedFrame::finished(result)],
        )
    }

    /// Scripts a job that keeps reporting progress for roughly `ticks *
    /// interval` before its stream ends without a terminal event.
    pub fn script_long_running(&self, job_id: &str, ticks: usize, interval: Duration) -> &Self {
        let mut frames = Vec::with_capacity(ticks * 2);
        for tick in 0..ticks {
            frames.push(ScriptedFrame::running(&format!("Running step {tick}")));
            frames.push(ScriptedFrame::Delay(interval));
        }
        self.script(job_id, frames)
    }

    pub fn submitted_queries(&self) -> Vec<Query> {
        self.lock_state()
            .map(|state| state.submitted.clone())
            .unwrap_or_default()
    }

    pub fn opened_jobs(&self) -> Vec<JobId> {
        self.lock_state()
            .map(|state| state.opened.clone())
            .unwrap_or_default()
    }

    pub fn cancelled_jobs(&self) -> Vec<JobId> {
        self.lock_state()
            .map(|state| state.cancelled.clone())
            .unwrap_or_default()
    }

    fn lock_state(&self) -> BackendResult<MutexGuard<'_, ScriptState>> {
        self.state.lock().map_err(|_| {
            CoreError::new(CoreErrorKind::Internal, "scripted backend mutex poisoned")
        })
    }
}

impl JobBackend for ScriptedBackend {
    fn submit(&self, query: &Query) -> BackendResult<Vec<JobId>> {
        let (outcome, delay) = {
            let mut state = self.lock_state()?;
            state.submitted.push(query.clone());
            let outcome = state.submissions.pop_front().unwrap_or_else(|| {
                Err(CoreError::new(
                    CoreErrorKind::SubmissionRejected,
                    "no scripted submission outcome available",
                ))
            });
            (outcome, state.submit_delay)
        };

        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        outcome.map_err(|error| error.for_app(&query.app))
    }

    fn cancel(&self, job_id: &JobId) -> BackendResult<()> {
        let delay = self.lock_state()?.cancel_delay;
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        self.lock_state()?.cancelled.push(job_id.clone());
        Ok(())
    }

    fn open_progress(&self, job_id: &JobId) -> BackendResult<ProgressFeed> {
        let frames = {
            let mut state = self.lock_state()?;
            state.opened.push(job_id.clone());
            state.streams.get(job_id).cloned()
        };

        let frames = frames.ok_or_else(|| {
            CoreError::new(
                CoreErrorKind::TransportFailure,
                format!("no progress stream for job '{job_id}'"),
            )
            .for_job(job_id)
        })?;

        let replay_job = job_id.clone();
        spawn_feed(job_id, move |sender| async move {
            replay(frames, &replay_job, &sender).await;
        })
    }
}

async fn replay(frames: Vec<ScriptedFrame>, job_id: &JobId, sender: &FeedSender) {
    for frame in frames {
        let item = match frame {
            ScriptedFrame::Delay(delay) => {
                tokio::time::sleep(delay).await;
                continue;
            }
            ScriptedFrame::Payload(payload) => Ok(payload),
            ScriptedFrame::Event(event) => serde_json::to_string(&event).map_err(|error| {
                CoreError::new(CoreErrorKind::Internal, error.to_string()).for_job(job_id)
            }),
            ScriptedFrame::Fail(message) => {
                let _ = sender
                    .send(Err(CoreError::new(CoreErrorKind::TransportFailure, message)
                        .for_job(job_id)))
                    .await;
                return;
            }
        };

        if sender.send(item).await.is_err() {
            return;
        }
    }
}
