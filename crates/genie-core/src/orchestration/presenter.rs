use crate::orchestration::RunView;

/// Out-of-band channel for user-visible failure messages.
pub trait ErrorReporter: Send + Sync {
    fn report(&self, message: &str);
}

/// Default reporter: failures go to the `tracing` error level.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingErrorReporter;

impl ErrorReporter for TracingErrorReporter {
    fn report(&self, message: &str) {
        tracing::error!(message = %message, "run failed");
    }
}

/// Display-only observer attached to each run as it starts.
pub trait ProgressPresenter: Send + Sync {
    fn open(&self, title: &str, view: RunView);
}
