use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::{Duration, SystemTime};

use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::backend::JobBackend;
use crate::models::{
    CoreError, CoreErrorKind, JobId, JobStatus, MergeMode, Query, ResultSet, RunId, RunRecord,
    RunSnapshot, RunState, StatusUpdate, Tool,
};
use crate::orchestration::{
    CancellationToken, ErrorReporter, FailurePolicy, JobQueue, OrchestrationResult,
    ProgressPresenter, QueueListener, SharedResults, TRANSPORT_ERROR_MESSAGE,
    TracingErrorReporter,
};
use crate::persistence::RunStore;

const SUPERSEDED_MESSAGE: &str = "Superseded by a new submission";

/// What a coordinator does with the results of its finished jobs.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum RunKind {
    /// Each run starts from an empty result set and merges job results into it.
    Design(MergeMode),
    /// Job results are link lists applied to the results bound at submit time.
    Save,
}

impl Default for RunKind {
    fn default() -> Self {
        Self::Design(MergeMode::default())
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CoordinatorConfig {
    pub label: String,
    pub title: String,
    pub kind: RunKind,
    pub failure_policy: FailurePolicy,
    pub remote_cancel: bool,
}

impl CoordinatorConfig {
    pub fn new(label: impl Into<String>) -> Self {
        let label = label.into();
        Self {
            title: format!("{label} dashboard"),
            label,
            kind: RunKind::default(),
            failure_policy: FailurePolicy::default(),
            remote_cancel: true,
        }
    }

    pub fn for_tool(tool: Tool) -> Self {
        let kind = match tool {
            Tool::Save => RunKind::Save,
            other => RunKind::Design(other.merge_mode()),
        };
        Self {
            title: tool.dashboard_title(),
            kind,
            ..Self::new(tool.as_str())
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_kind(mut self, kind: RunKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_failure_policy(mut self, failure_policy: FailurePolicy) -> Self {
        self.failure_policy = failure_policy;
        self
    }

    pub fn with_remote_cancel(mut self, remote_cancel: bool) -> Self {
        self.remote_cancel = remote_cancel;
        self
    }
}

pub struct CoordinatorBuilder {
    config: CoordinatorConfig,
    backend: Arc<dyn JobBackend>,
    results: Option<SharedResults>,
    reporter: Option<Arc<dyn ErrorReporter>>,
    presenter: Option<Arc<dyn ProgressPresenter>>,
    run_store: Option<Arc<dyn RunStore>>,
}

impl CoordinatorBuilder {
    pub fn results(mut self, results: SharedResults) -> Self {
        self.results = Some(results);
        self
    }

    pub fn error_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn presenter(mut self, presenter: Arc<dyn ProgressPresenter>) -> Self {
        self.presenter = Some(presenter);
        self
    }

    pub fn run_store(mut self, run_store: Arc<dyn RunStore>) -> Self {
        self.run_store = Some(run_store);
        self
    }

    /// Run ids continue after the highest id the run store holds for this
    /// label. A store that cannot be read is logged and ids start at zero.
    pub fn build(self) -> SubmissionCoordinator {
        let merge_mode = match self.config.kind {
            RunKind::Design(mode) => mode,
            RunKind::Save => MergeMode::default(),
        };

        let next_run_id = match &self.run_store {
            Some(store) => match store.next_run_id(&self.config.label) {
                Ok(run_id) => run_id.0,
                Err(error) => {
                    tracing::error!(
                        label = %self.config.label,
                        kind = ?error.kind,
                        message = %error.message,
                        "failed to read run history; run ids start at zero"
                    );
                    0
                }
            },
            None => 0,
        };

        let (status, _) = watch::channel(RunSnapshot::idle());
        SubmissionCoordinator {
            inner: Arc::new(CoordinatorInner {
                config: self.config,
                backend: self.backend,
                results: self
                    .results
                    .unwrap_or_else(|| SharedResults::new(merge_mode)),
                reporter: self
                    .reporter
                    .unwrap_or_else(|| Arc::new(TracingErrorReporter)),
                presenter: self.presenter,
                run_store: self.run_store,
                state: Mutex::new(CoordinatorState {
                    next_run_id,
                    current: None,
                    snapshot: RunSnapshot::idle(),
                }),
                status,
            }),
        }
    }
}

/// Owns the run lifecycle for one tool: at most one active run, whose
/// jobs drain through a single `JobQueue`.
#[derive(Clone)]
pub struct SubmissionCoordinator {
    inner: Arc<CoordinatorInner>,
}

struct CoordinatorInner {
    config: CoordinatorConfig,
    backend: Arc<dyn JobBackend>,
    results: SharedResults,
    reporter: Arc<dyn ErrorReporter>,
    presenter: Option<Arc<dyn ProgressPresenter>>,
    run_store: Option<Arc<dyn RunStore>>,
    state: Mutex<CoordinatorState>,
    status: watch::Sender<RunSnapshot>,
}

struct CoordinatorState {
    next_run_id: u64,
    current: Option<CurrentRun>,
    snapshot: RunSnapshot,
}

struct CurrentRun {
    run_id: RunId,
    app: String,
    token: CancellationToken,
    drain: Option<JoinHandle<()>>,
    results_epoch: u64,
    created_at: SystemTime,
}

impl CoordinatorState {
    fn is_current(&self, run_id: RunId) -> bool {
        self.current
            .as_ref()
            .is_some_and(|run| run.run_id == run_id)
    }
}

impl SubmissionCoordinator {
    pub fn builder(config: CoordinatorConfig, backend: Arc<dyn JobBackend>) -> CoordinatorBuilder {
        CoordinatorBuilder {
            config,
            backend,
            results: None,
            reporter: None,
            presenter: None,
            run_store: None,
        }
    }

    pub fn new(config: CoordinatorConfig, backend: Arc<dyn JobBackend>) -> Self {
        Self::builder(config, backend).build()
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.inner.config
    }

    pub fn results(&self) -> SharedResults {
        self.inner.results.clone()
    }

    /// Builder for a save coordinator sharing this coordinator's backend,
    /// results and collaborators.
    pub(crate) fn save_builder(&self) -> CoordinatorBuilder {
        let config = CoordinatorConfig::for_tool(Tool::Save)
            .with_failure_policy(self.inner.config.failure_policy)
            .with_remote_cancel(self.inner.config.remote_cancel);

        CoordinatorBuilder {
            config,
            backend: self.inner.backend.clone(),
            results: Some(self.inner.results.clone()),
            reporter: Some(self.inner.reporter.clone()),
            presenter: self.inner.presenter.clone(),
            run_store: self.inner.run_store.clone(),
        }
    }

    /// Starts a run for `query`, superseding any active run. Returns once the
    /// run's queue has started, or with the submission error when the backend
    /// refused the query.
    pub async fn submit(&self, query: Query) -> OrchestrationResult<RunId> {
        self.submit_bound(query, None).await
    }

    pub(crate) async fn submit_bound(
        &self,
        query: Query,
        results_epoch: Option<u64>,
    ) -> OrchestrationResult<RunId> {
        let inner = &self.inner;
        let app = query.app.clone();
        let created_at = SystemTime::now();

        let (run_id, superseded) = {
            let mut guard = inner.lock_state()?;
            let state = &mut *guard;

            let superseded = inner.supersede_locked(state);

            let results_epoch = match (inner.config.kind, results_epoch) {
                (RunKind::Design(_), _) => inner.results.with(|aggregator| {
                    aggregator.reset();
                    aggregator.epoch()
                })?,
                (RunKind::Save, Some(epoch)) => epoch,
                (RunKind::Save, None) => inner.results.with(|aggregator| aggregator.epoch())?,
            };

            let run_id = RunId(state.next_run_id);
            state.next_run_id = state.next_run_id.saturating_add(1);
            state.current = Some(CurrentRun {
                run_id,
                app: app.clone(),
                token: CancellationToken::new(),
                drain: None,
                results_epoch,
                created_at,
            });
            state.snapshot = RunSnapshot::submitting(run_id, &app);
            inner.publish(state);

            (run_id, superseded)
        };

        if let Some((job, record)) = superseded {
            inner.spawn_remote_cancel(job.into_iter().collect());
            inner.spawn_finish_persistence(record);
        }

        tracing::info!(
            label = %inner.config.label,
            run_id = run_id.0,
            app = %app,
            "submitting run"
        );

        inner
            .persist_created(RunRecord {
                label: inner.config.label.clone(),
                run_id,
                app: app.clone(),
                state: RunState::Submitting,
                job_ids: Vec::new(),
                message: None,
                result_count: 0,
                created_at,
                finished_at: None,
            })
            .await;

        if let Some(presenter) = &inner.presenter {
            presenter.open(
                &inner.config.title,
                RunView {
                    inner: Arc::downgrade(&self.inner),
                    run_id,
                },
            );
        }

        let backend = inner.backend.clone();
        let submitted = query;
        let outcome = match tokio::task::spawn_blocking(move || backend.submit(&submitted)).await
        {
            Ok(outcome) => outcome,
            Err(join_error) => Err(CoreError::new(
                CoreErrorKind::Internal,
                format!("backend submit join failure: {join_error}"),
            )),
        };

        let mut guard = inner.lock_state()?;
        let state = &mut *guard;

        if !state.is_current(run_id) {
            drop(guard);
            if let Ok(job_ids) = outcome {
                inner.spawn_remote_cancel(job_ids);
            }
            return Err(CoreError::new(
                CoreErrorKind::Cancelled,
                format!("run {run_id} was superseded before its jobs were queued"),
            )
            .for_app(app));
        }

        if state.snapshot.state.is_terminal() {
            drop(guard);
            if let Ok(job_ids) = outcome {
                tracing::info!(
                    run_id = run_id.0,
                    jobs = job_ids.len(),
                    "run cancelled while submitting; cancelling its jobs"
                );
                inner.spawn_remote_cancel(job_ids);
            }
            return Ok(run_id);
        }

        let job_ids = match outcome {
            Ok(job_ids) => job_ids,
            Err(error) => {
                let error = error.for_app(app);
                let record = inner.finish_locked(
                    state,
                    RunState::Error,
                    StatusUpdate::new(JobStatus::Error, error.message.clone()),
                );
                drop(guard);

                tracing::warn!(
                    run_id = run_id.0,
                    kind = ?error.kind,
                    message = %error.message,
                    "submission rejected"
                );
                inner.reporter.report(&error.message);
                inner.spawn_finish_persistence(record);
                return Err(error);
            }
        };

        let Some(current) = state.current.as_mut() else {
            return Err(CoreError::new(
                CoreErrorKind::Internal,
                "current run disappeared while starting its queue",
            ));
        };

        let queue = JobQueue::new(job_ids)
            .with_policy(inner.config.failure_policy)
            .with_token(current.token.clone());
        let queued: Vec<JobId> = queue.pending().cloned().collect();

        let mut listener = RunListener {
            inner: self.inner.clone(),
            run_id,
            results_epoch: current.results_epoch,
        };
        let backend = inner.backend.clone();
        current.drain = Some(tokio::spawn(async move {
            queue.drain(backend, &mut listener).await;
        }));

        state.snapshot.state = RunState::Queued;
        state.snapshot.update = StatusUpdate::waiting();
        state.snapshot.job_ids = queued;
        inner.publish(state);

        Ok(run_id)
    }

    /// Cancels the active run. Returns `false`, without error, when no run
    /// is active.
    pub async fn cancel(&self) -> OrchestrationResult<bool> {
        self.cancel_matching(None).await
    }

    async fn cancel_matching(&self, run_id: Option<RunId>) -> OrchestrationResult<bool> {
        let inner = &self.inner;
        let (active_job, record) = {
            let mut guard = inner.lock_state()?;
            let state = &mut *guard;

            let Some(current) = state.current.as_ref() else {
                return Ok(false);
            };
            if run_id.is_some_and(|run_id| run_id != current.run_id)
                || !state.snapshot.state.is_active()
            {
                return Ok(false);
            }

            current.token.cancel();
            let active_job = state.snapshot.active_job.clone();
            let record = inner.finish_locked(
                state,
                RunState::Cancelled,
                StatusUpdate::new(JobStatus::Cancelled, "Cancelled"),
            );
            (active_job, record)
        };

        tracing::info!(label = %inner.config.label, "run cancelled");
        inner.spawn_remote_cancel(active_job.into_iter().collect());
        inner.spawn_finish_persistence(record);

        Ok(true)
    }

    pub fn current_status(&self) -> RunSnapshot {
        self.inner.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RunSnapshot> {
        self.inner.status.subscribe()
    }

    /// Waits until `run_id` reaches a terminal state. Fails with `Cancelled`
    /// when a newer run supersedes it first, and with `Timeout` when
    /// `timeout_duration` elapses.
    pub async fn wait_for_terminal(
        &self,
        run_id: RunId,
        timeout_duration: Option<Duration>,
    ) -> OrchestrationResult<RunSnapshot> {
        let mut receiver = self.subscribe();
        let wait = async move {
            receiver
                .wait_for(|snapshot| match snapshot.run_id {
                    Some(current) if current == run_id => snapshot.state.is_terminal(),
                    Some(current) => current > run_id,
                    None => false,
                })
                .await
                .map(|snapshot| snapshot.clone())
                .map_err(|_| {
                    CoreError::new(CoreErrorKind::Internal, "run status channel closed")
                })
        };

        let snapshot = match timeout_duration {
            Some(duration) => tokio::time::timeout(duration, wait).await.map_err(|_| {
                CoreError::new(
                    CoreErrorKind::Timeout,
                    format!("timed out waiting for run {run_id} after {duration:?}"),
                )
            })??,
            None => wait.await?,
        };

        if snapshot.run_id != Some(run_id) {
            return Err(CoreError::new(
                CoreErrorKind::Cancelled,
                format!("run {run_id} was superseded"),
            ));
        }
        Ok(snapshot)
    }
}

impl CoordinatorInner {
    fn lock_state(&self) -> OrchestrationResult<MutexGuard<'_, CoordinatorState>> {
        self.state.lock().map_err(|_| {
            CoreError::new(CoreErrorKind::Internal, "coordinator state mutex poisoned")
        })
    }

    fn publish(&self, state: &CoordinatorState) {
        self.status.send_replace(state.snapshot.clone());
    }

    /// Cancels and detaches the current run if it is still active. Returns
    /// its active job and terminal record.
    fn supersede_locked(
        &self,
        state: &mut CoordinatorState,
    ) -> Option<(Option<JobId>, Option<RunRecord>)> {
        let current = state.current.as_mut()?;
        if !state.snapshot.state.is_active() {
            return None;
        }

        current.token.cancel();
        if let Some(drain) = current.drain.take() {
            drain.abort();
        }
        tracing::info!(
            label = %self.config.label,
            run_id = current.run_id.0,
            "superseding active run"
        );

        let active_job = state.snapshot.active_job.clone();
        let record = self.finish_locked(
            state,
            RunState::Cancelled,
            StatusUpdate::new(JobStatus::Cancelled, SUPERSEDED_MESSAGE),
        );
        Some((active_job, record))
    }

    /// Moves the current run to `run_state` and publishes it. Returns the
    /// record to persist, or `None` when the run was already terminal.
    fn finish_locked(
        &self,
        state: &mut CoordinatorState,
        run_state: RunState,
        update: StatusUpdate,
    ) -> Option<RunRecord> {
        if state.snapshot.state.is_terminal() {
            return None;
        }
        let current = state.current.as_ref()?;

        state.snapshot.state = run_state;
        state.snapshot.update = update;
        state.snapshot.active_job = None;
        self.publish(state);

        let result_count = match self.config.kind {
            RunKind::Design(_) => match self
                .results
                .with(|aggregator| aggregator.current().map(ResultSet::len).unwrap_or(0))
            {
                Ok(count) => count,
                Err(error) => {
                    tracing::error!(
                        label = %self.config.label,
                        run_id = current.run_id.0,
                        kind = ?error.kind,
                        message = %error.message,
                        "failed to read result count; recording zero"
                    );
                    0
                }
            },
            RunKind::Save => state.snapshot.completed_jobs,
        };

        Some(RunRecord {
            label: self.config.label.clone(),
            run_id: current.run_id,
            app: current.app.clone(),
            state: run_state,
            job_ids: state.snapshot.job_ids.clone(),
            message: Some(state.snapshot.update.message.clone())
                .filter(|message| !message.is_empty()),
            result_count,
            created_at: current.created_at,
            finished_at: Some(SystemTime::now()),
        })
    }

    async fn persist_created(&self, record: RunRecord) {
        let Some(store) = self.run_store.clone() else {
            return;
        };
        let run_id = record.run_id;

        let outcome = tokio::task::spawn_blocking(move || store.create_run(&record))
            .await
            .map_err(|join_error| {
                CoreError::new(
                    CoreErrorKind::Internal,
                    format!("run persistence join failure: {join_error}"),
                )
            })
            .and_then(|outcome| outcome);

        if let Err(error) = outcome {
            tracing::error!(
                label = %self.config.label,
                run_id = run_id.0,
                kind = ?error.kind,
                message = %error.message,
                "failed to persist new run record"
            );
        }
    }

    fn spawn_finish_persistence(&self, record: Option<RunRecord>) {
        let (Some(store), Some(record)) = (self.run_store.clone(), record) else {
            return;
        };

        tokio::spawn(async move {
            let label = record.label.clone();
            let run_id = record.run_id;
            let outcome = tokio::task::spawn_blocking(move || store.finish_run(&record))
                .await
                .map_err(|join_error| {
                    CoreError::new(
                        CoreErrorKind::Internal,
                        format!("run persistence join failure: {join_error}"),
                    )
                })
                .and_then(|outcome| outcome);

            if let Err(error) = outcome {
                tracing::error!(
                    label = %label,
                    run_id = run_id.0,
                    kind = ?error.kind,
                    message = %error.message,
                    "failed to persist terminal run record"
                );
            }
        });
    }

    /// Asks the backend to cancel `job_ids` on the blocking pool without
    /// waiting for the replies.
    fn spawn_remote_cancel(&self, job_ids: Vec<JobId>) {
        if !self.config.remote_cancel || job_ids.is_empty() {
            return;
        }
        let backend = self.backend.clone();
        tokio::task::spawn_blocking(move || {
            for job_id in job_ids {
                match backend.cancel(&job_id) {
                    Ok(()) => tracing::debug!(job_id = %job_id, "requested backend cancellation"),
                    Err(error) => tracing::warn!(
                        job_id = %job_id,
                        kind = ?error.kind,
                        message = %error.message,
                        "backend cancel request failed"
                    ),
                }
            }
        });
    }
}

/// Routes one run's queue notifications into its coordinator. Anything
/// arriving after the run was superseded or finished is dropped.
struct RunListener {
    inner: Arc<CoordinatorInner>,
    run_id: RunId,
    results_epoch: u64,
}

impl RunListener {
    fn with_current<R>(
        &self,
        operation: impl FnOnce(&CoordinatorInner, &mut CoordinatorState) -> R,
    ) -> Option<R> {
        let mut guard = match self.inner.lock_state() {
            Ok(guard) => guard,
            Err(error) => {
                tracing::error!(
                    run_id = self.run_id.0,
                    message = %error.message,
                    "dropping queue notification"
                );
                return None;
            }
        };
        let state = &mut *guard;
        if !state.is_current(self.run_id) || state.snapshot.state.is_terminal() {
            return None;
        }
        Some(operation(self.inner.as_ref(), state))
    }
}

impl QueueListener for RunListener {
    fn on_job_started(&mut self, job_id: &JobId) {
        self.with_current(|inner, state| {
            state.snapshot.state = RunState::Running;
            state.snapshot.active_job = Some(job_id.clone());
            inner.publish(state);
        });
    }

    fn on_update(&mut self, _job_id: &JobId, update: &StatusUpdate) {
        self.with_current(|inner, state| {
            state.snapshot.update = update.clone();
            inner.publish(state);
        });
    }

    fn on_job_result(&mut self, job_id: &JobId, result: Value) {
        let results_epoch = self.results_epoch;
        self.with_current(|inner, state| {
            let merged = match inner.config.kind {
                RunKind::Design(MergeMode::Replace) => inner
                    .results
                    .with(|aggregator| aggregator.set_result(result)),
                RunKind::Design(MergeMode::Append) => inner
                    .results
                    .with(|aggregator| aggregator.append_result(result)),
                RunKind::Save => inner
                    .results
                    .with(|aggregator| aggregator.apply_links(results_epoch, &result))
                    .and_then(|applied| applied)
                    .map(|added| {
                        tracing::debug!(job_id = %job_id, added, "applied saved links");
                    }),
            };

            if let Err(error) = merged {
                tracing::error!(
                    job_id = %job_id,
                    kind = ?error.kind,
                    message = %error.message,
                    "failed to merge job result"
                );
            }

            state.snapshot.completed_jobs += 1;
            inner.publish(state);
        });
    }

    fn on_drained(&mut self, status: JobStatus) {
        let finished = self.with_current(|inner, state| {
            let run_state = RunState::from_drained(status);
            if run_state == RunState::Finished && matches!(inner.config.kind, RunKind::Design(_)) {
                match inner.results.with(|aggregator| aggregator.mark_ready()) {
                    Ok(()) => state.snapshot.results_ready = true,
                    Err(error) => tracing::error!(
                        message = %error.message,
                        "failed to mark results ready"
                    ),
                }
            }

            let update = if state.snapshot.update.status == status {
                state.snapshot.update.clone()
            } else {
                StatusUpdate::new(status, drained_message(status))
            };
            let report = (run_state == RunState::Error).then(|| update.message.clone());
            let record = inner.finish_locked(state, run_state, update);
            (report, record)
        });

        let Some((report, record)) = finished else {
            return;
        };
        if let Some(message) = report {
            self.inner.reporter.report(&message);
        }
        self.inner.spawn_finish_persistence(record);
    }
}

fn drained_message(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Finished => "Finished",
        JobStatus::Cancelled => "Cancelled",
        JobStatus::Waiting | JobStatus::Running | JobStatus::Error => TRANSPORT_ERROR_MESSAGE,
    }
}

/// Handle given to a `ProgressPresenter` for one run. It does not keep the
/// coordinator alive, and goes quiet once the run is superseded.
#[derive(Clone)]
pub struct RunView {
    inner: Weak<CoordinatorInner>,
    run_id: RunId,
}

impl std::fmt::Debug for RunView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunView")
            .field("run_id", &self.run_id)
            .field("attached", &(self.inner.strong_count() > 0))
            .finish()
    }
}

impl RunView {
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn snapshot(&self) -> Option<RunSnapshot> {
        let inner = self.inner.upgrade()?;
        let snapshot = inner.status.borrow().clone();
        (snapshot.run_id == Some(self.run_id)).then_some(snapshot)
    }

    pub fn update(&self) -> Option<StatusUpdate> {
        self.snapshot().map(|snapshot| snapshot.update)
    }

    pub fn subscribe(&self) -> Option<watch::Receiver<RunSnapshot>> {
        self.inner.upgrade().map(|inner| inner.status.subscribe())
    }

    pub async fn cancel(&self) -> OrchestrationResult<bool> {
        let Some(inner) = self.inner.upgrade() else {
            return Ok(false);
        };
        SubmissionCoordinator { inner }
            .cancel_matching(Some(self.run_id))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_config_derives_title_and_kind() {
        let design = CoordinatorConfig::for_tool(Tool::DesignGenie);
        assert_eq!(design.label, "DesignGenie");
        assert_eq!(design.title, "DesignGenie dashboard");
        assert_eq!(design.kind, RunKind::Design(MergeMode::Append));
        assert_eq!(design.failure_policy, FailurePolicy::Halt);
        assert!(design.remote_cancel);

        let save = CoordinatorConfig::for_tool(Tool::Save);
        assert_eq!(save.kind, RunKind::Save);
        assert_eq!(save.label, "save");
    }

    #[test]
    fn drained_messages_cover_terminal_statuses() {
        assert_eq!(drained_message(JobStatus::Finished), "Finished");
        assert_eq!(drained_message(JobStatus::Cancelled), "Cancelled");
        assert_eq!(drained_message(JobStatus::Error), "Error");
    }
}
