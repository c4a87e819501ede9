use std::time::Duration;

use reqwest::header::ACCEPT;
use serde_json::Value;

use crate::backend::{
    BackendResult, EventStreamDecoder, FeedSender, JobBackend, ProgressFeed, spawn_feed,
};
use crate::models::{CoreError, CoreErrorKind, JobId, Query, SubmitResponse};

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HttpBackendConfig {
    pub base_url: String,
    pub connect_timeout: Duration,
    /// Applies to submit and cancel requests. Progress streams stay open
    /// until the job terminates.
    pub request_timeout: Duration,
}

impl HttpBackendConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

impl Default for HttpBackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(60),
        }
    }
}

/// Submit and cancel are plain blocking requests. Progress streams are read
/// asynchronously so that dropping a feed closes its connection at once.
pub struct HttpBackend {
    config: HttpBackendConfig,
    agent: ureq::Agent,
    streams: reqwest::Client,
}

impl HttpBackend {
    pub fn new(config: HttpBackendConfig) -> BackendResult<Self> {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(config.connect_timeout)
            .build();
        let streams = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|error| {
                CoreError::new(
                    CoreErrorKind::Internal,
                    format!("unable to build progress stream client: {error}"),
                )
            })?;

        Ok(Self {
            config,
            agent,
            streams,
        })
    }

    pub fn config(&self) -> &HttpBackendConfig {
        &self.config
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }
}

impl JobBackend for HttpBackend {
    fn submit(&self, query: &Query) -> BackendResult<Vec<JobId>> {
        let url = self.endpoint("submit");
        tracing::debug!(app = %query.app, url = %url, "submitting query");

        let response = self
            .agent
            .post(&url)
            .timeout(self.config.request_timeout)
            .send_json(query.to_json())
            .map_err(|error| request_error(error, CoreErrorKind::SubmissionRejected))
            .map_err(|error| error.for_app(&query.app))?;

        response
            .into_json::<SubmitResponse>()
            .map_err(|error| {
                CoreError::new(
                    CoreErrorKind::ParseFailure,
                    format!("unreadable submit response: {error}"),
                )
                .for_app(&query.app)
            })?
            .into_job_ids()
            .map_err(|error| error.for_app(&query.app))
    }

    fn cancel(&self, job_id: &JobId) -> BackendResult<()> {
        self.agent
            .get(&self.endpoint(&format!("cancel/{job_id}")))
            .timeout(self.config.request_timeout)
            .call()
            .map(|_| ())
            .map_err(|error| request_error(error, CoreErrorKind::TransportFailure).for_job(job_id))
    }

    fn open_progress(&self, job_id: &JobId) -> BackendResult<ProgressFeed> {
        let request = self
            .streams
            .get(self.endpoint(&format!("progress/{job_id}")))
            .header(ACCEPT, "text/event-stream");
        let stream_job = job_id.clone();

        spawn_feed(job_id, move |sender| async move {
            stream_events(request, &stream_job, &sender).await;
        })
    }
}

async fn stream_events(request: reqwest::RequestBuilder, job_id: &JobId, sender: &FeedSender) {
    let mut response = match request.send().await {
        Ok(response) => response,
        Err(error) => {
            let _ = sender
                .send(Err(stream_error(job_id, format!("unable to reach backend: {error}"))))
                .await;
            return;
        }
    };

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let _ = sender
            .send(Err(stream_error(job_id, rejection_message(status.as_u16(), &body))))
            .await;
        return;
    }

    let mut decoder = EventStreamDecoder::new();
    loop {
        match response.chunk().await {
            Ok(Some(chunk)) => {
                for payload in decoder.push(&chunk) {
                    if sender.send(Ok(payload)).await.is_err() {
                        return;
                    }
                }
            }
            Ok(None) => return,
            Err(error) => {
                let _ = sender
                    .send(Err(stream_error(job_id, format!("progress stream read failed: {error}"))))
                    .await;
                return;
            }
        }
    }
}

fn stream_error(job_id: &JobId, message: String) -> CoreError {
    CoreError::new(CoreErrorKind::TransportFailure, message).for_job(job_id)
}

fn request_error(error: ureq::Error, status_kind: CoreErrorKind) -> CoreError {
    match error {
        ureq::Error::Status(code, response) => {
            let body = response.into_string().unwrap_or_default();
            CoreError::new(status_kind, rejection_message(code, &body))
        }
        ureq::Error::Transport(transport) => CoreError::new(
            CoreErrorKind::TransportFailure,
            format!("unable to reach backend: {transport}"),
        ),
    }
}

/// The backend reports failures as `{"message": ...}`; that message is
/// surfaced verbatim.
fn rejection_message(code: u16, body: &str) -> String {
    if let Ok(Value::Object(object)) = serde_json::from_str::<Value>(body)
        && let Some(Value::String(message)) = object.get("message")
    {
        return message.clone();
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {code}")
    } else {
        trimmed.to_string()
    }
}
