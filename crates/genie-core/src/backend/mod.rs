pub mod event_stream;
pub mod http;
pub mod scripted;

pub use event_stream::EventStreamDecoder;
pub use http::{HttpBackend, HttpBackendConfig};
pub use scripted::{ScriptedBackend, ScriptedFrame};

use std::future::Future;

use tokio::sync::mpsc;

use crate::models::{CoreError, CoreErrorKind, JobId, Query};

pub type BackendResult<T> = Result<T, CoreError>;

const FEED_CAPACITY: usize = 32;

/// Raw event payloads from one job's progress stream, in emission order.
/// The stream ends when the feed yields `None`. Dropping the feed closes the
/// underlying transport.
pub type ProgressFeed = mpsc::Receiver<BackendResult<String>>;

pub type FeedSender = mpsc::Sender<BackendResult<String>>;

/// The backend compute service. `submit` and `cancel` block; the
/// orchestrator runs them on tokio's blocking pool. `open_progress` returns
/// immediately and must be called from within a tokio runtime.
pub trait JobBackend: Send + Sync {
    fn submit(&self, query: &Query) -> BackendResult<Vec<JobId>>;

    fn cancel(&self, job_id: &JobId) -> BackendResult<()>;

    fn open_progress(&self, job_id: &JobId) -> BackendResult<ProgressFeed>;
}

/// Spawns `producer` on the current runtime, writing into a fresh feed. The
/// producer is dropped, along with whatever transport it holds, as soon as
/// the feed's receiver goes away.
pub fn spawn_feed<P, F>(job_id: &JobId, producer: P) -> BackendResult<ProgressFeed>
where
    P: FnOnce(FeedSender) -> F,
    F: Future<Output = ()> + Send + 'static,
{
    let runtime = tokio::runtime::Handle::try_current().map_err(|error| {
        CoreError::new(
            CoreErrorKind::Internal,
            format!("progress feeds require a tokio runtime: {error}"),
        )
        .for_job(job_id)
    })?;

    let (sender, feed) = mpsc::channel(FEED_CAPACITY);
    let watcher = sender.clone();
    let produce = producer(sender);
    let job_id = job_id.clone();
    runtime.spawn(async move {
        tokio::select! {
            () = watcher.closed() => {
                tracing::debug!(job_id = %job_id, "progress feed dropped; closing transport");
            }
            () = produce => {}
        }
    });

    Ok(feed)
}
