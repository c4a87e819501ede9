pub mod aggregator;
pub mod channel;
pub mod coordinator;
pub mod presenter;
pub mod queue;
pub mod save;

pub use aggregator::{ResultAggregator, SharedResults};
pub use channel::{JobChannel, TRANSPORT_ERROR_MESSAGE};
pub use coordinator::{
    CoordinatorBuilder, CoordinatorConfig, RunKind, RunView, SubmissionCoordinator,
};
pub use presenter::{ErrorReporter, ProgressPresenter, TracingErrorReporter};
pub use queue::{JobQueue, QueueListener, QueueOutcome};
pub use save::SaveRun;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

use crate::models::CoreError;

pub type OrchestrationResult<T> = Result<T, CoreError>;

/// What a queue does when a job reports `error`.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum FailurePolicy {
    /// Stop draining and end the run with the failing status.
    #[default]
    Halt,
    /// Record the failed job and continue with the next one. A backend
    /// `cancelled` status still halts the queue.
    SkipFailedJobs,
}

#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    inner: Arc<CancellationState>,
}

#[derive(Debug, Default)]
struct CancellationState {
    flag: AtomicBool,
    notify: Notify,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` only for the call that actually cancelled the token.
    pub fn cancel(&self) -> bool {
        let first = !self.inner.flag.swap(true, Ordering::SeqCst);
        if first {
            self.inner.notify.notify_waiters();
        }
        first
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.flag.load(Ordering::SeqCst)
    }

    pub async fn cancelled(&self) {
        let notified = self.inner.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}
