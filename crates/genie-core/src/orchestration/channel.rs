use crate::backend::{JobBackend, ProgressFeed};
use crate::models::{CoreError, JobId, JobStatus, ProgressEvent, StatusUpdate};

/// Message carried by the `error` update synthesized for transport failures.
pub const TRANSPORT_ERROR_MESSAGE: &str = "Error";

/// Typed view of one job's progress stream.
///
/// `next` yields updates in emission order and ends after exactly one
/// terminal update; a stream that fails or ends early produces a synthesized
/// `error` update instead. Closing the channel drops the feed, which closes
/// the backend connection.
pub struct JobChannel {
    job_id: JobId,
    feed: Option<ProgressFeed>,
    open_failed: bool,
    terminated: bool,
}

impl JobChannel {
    pub fn open(backend: &dyn JobBackend, job_id: JobId) -> Self {
        let (feed, open_failed) = match backend.open_progress(&job_id) {
            Ok(feed) => {
                tracing::debug!(job_id = %job_id, "opened progress channel");
                (Some(feed), false)
            }
            Err(error) => {
                log_stream_error(&job_id, &error, "failed to open progress stream");
                (None, true)
            }
        };

        Self {
            job_id,
            feed,
            open_failed,
            terminated: false,
        }
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub async fn next(&mut self) -> Option<ProgressEvent> {
        if self.terminated {
            return None;
        }
        if std::mem::take(&mut self.open_failed) {
            return Some(self.finish(transport_error_event()));
        }
        let feed = self.feed.as_mut()?;

        let event = match feed.recv().await {
            Some(payload) => match payload.and_then(|payload| ProgressEvent::parse(&payload)) {
                Ok(event) => event,
                Err(error) => {
                    log_stream_error(&self.job_id, &error, "progress stream failed");
                    transport_error_event()
                }
            },
            None => {
                tracing::warn!(
                    job_id = %self.job_id,
                    "progress stream ended before a terminal status"
                );
                transport_error_event()
            }
        };

        Some(if event.is_terminal() {
            self.finish(event)
        } else {
            event
        })
    }

    /// Stops delivery and releases the connection. Safe to call any number
    /// of times.
    pub fn close(&mut self) {
        if self.feed.take().is_some() {
            tracing::debug!(job_id = %self.job_id, "closed progress channel");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.feed.is_none()
    }

    fn finish(&mut self, event: ProgressEvent) -> ProgressEvent {
        self.terminated = true;
        self.close();
        event
    }
}

fn log_stream_error(job_id: &JobId, error: &CoreError, context: &'static str) {
    tracing::warn!(
        job_id = %job_id,
        kind = ?error.kind,
        message = %error.message,
        "{context}"
    );
}

fn transport_error_event() -> ProgressEvent {
    ProgressEvent::new(StatusUpdate::new(JobStatus::Error, TRANSPORT_ERROR_MESSAGE))
}
