use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Map, Value};

use crate::backend::JobBackend;
use crate::models::{CoreError, CoreErrorKind, Query, RunId, RunSnapshot, RunState, Tool};
use crate::orchestration::{
    CoordinatorConfig, OrchestrationResult, SharedResults, SubmissionCoordinator,
};

/// Persists the current results through the backend's `save` app and
/// records the returned links on the saved entries.
pub struct SaveRun {
    coordinator: SubmissionCoordinator,
    results: SharedResults,
    bound: Mutex<Option<(RunId, u64)>>,
}

impl SaveRun {
    pub fn new(backend: Arc<dyn JobBackend>, results: SharedResults) -> Self {
        let coordinator =
            SubmissionCoordinator::builder(CoordinatorConfig::for_tool(Tool::Save), backend)
                .results(results.clone())
                .build();
        Self::with_coordinator(coordinator)
    }

    /// Save run sharing `design`'s results, backend and collaborators.
    pub fn from_coordinator(design: &SubmissionCoordinator) -> Self {
        Self::with_coordinator(design.save_builder().build())
    }

    fn with_coordinator(coordinator: SubmissionCoordinator) -> Self {
        Self {
            results: coordinator.results(),
            coordinator,
            bound: Mutex::new(None),
        }
    }

    pub fn coordinator(&self) -> &SubmissionCoordinator {
        &self.coordinator
    }

    /// Submits `{app: "save", designs: <results>, ..context}`. The links
    /// returned are only applied while the results are the ones saved here.
    pub async fn save(&self, context: Map<String, Value>) -> OrchestrationResult<RunId> {
        let (designs, epoch) = self
            .results
            .with(|aggregator| (aggregator.current().cloned(), aggregator.epoch()))?;

        let Some(designs) = designs.filter(|designs| !designs.is_empty()) else {
            return Err(CoreError::new(CoreErrorKind::InvalidInput, "there are no results to save")
                .for_app(Tool::Save.as_str()));
        };

        let mut query = Query::for_tool(Tool::Save);
        query.params = context;
        query.params.insert("designs".to_string(), designs.to_json());

        let run_id = self.coordinator.submit_bound(query, Some(epoch)).await?;
        if let Ok(mut bound) = self.bound.lock() {
            *bound = Some((run_id, epoch));
        }
        Ok(run_id)
    }

    /// Whether the most recent save finished against the results currently
    /// held.
    pub fn saved(&self) -> bool {
        let Some((run_id, epoch)) = self.bound.lock().ok().and_then(|bound| *bound) else {
            return false;
        };

        let snapshot = self.coordinator.current_status();
        let current_epoch = self.results.with(|aggregator| aggregator.epoch()).ok();

        snapshot.run_id == Some(run_id)
            && snapshot.state == RunState::Finished
            && current_epoch == Some(epoch)
    }

    pub async fn wait(
        &self,
        run_id: RunId,
        timeout_duration: Option<Duration>,
    ) -> OrchestrationResult<RunSnapshot> {
        self.coordinator
            .wait_for_terminal(run_id, timeout_duration)
            .await
    }
}
