use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;

use crate::models::{CoreError, CoreErrorKind, MergeMode, ResultSet};
use crate::orchestration::OrchestrationResult;

/// Accumulates the results of one run.
///
/// Each `reset` starts a new epoch. Link annotations computed against an
/// older epoch are refused, so a save started before a new run cannot touch
/// that run's entries.
#[derive(Clone, Debug, Default)]
pub struct ResultAggregator {
    mode: MergeMode,
    results: Option<ResultSet>,
    ready: bool,
    epoch: u64,
}

impl ResultAggregator {
    pub fn new(mode: MergeMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub fn mode(&self) -> MergeMode {
        self.mode
    }

    pub fn reset(&mut self) {
        self.results = None;
        self.ready = false;
        self.epoch = self.epoch.wrapping_add(1);
    }

    pub fn set_result(&mut self, document: Value) {
        self.results = Some(ResultSet::from_document(document));
    }

    pub fn append_result(&mut self, document: Value) {
        self.results
            .get_or_insert_with(ResultSet::new)
            .extend(ResultSet::from_document(document));
    }

    pub fn merge(&mut self, document: Value) {
        match self.mode {
            MergeMode::Replace => self.set_result(document),
            MergeMode::Append => self.append_result(document),
        }
    }

    pub fn current(&self) -> Option<&ResultSet> {
        self.results.as_ref()
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn mark_ready(&mut self) {
        self.results.get_or_insert_with(ResultSet::new);
        self.ready = true;
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Applies one save job's result: a list aligned with the entries, each
    /// element a link or a list of links for that entry. Links already
    /// recorded are not added again. Returns the number of links added.
    pub fn apply_links(&mut self, epoch: u64, links: &Value) -> OrchestrationResult<usize> {
        if epoch != self.epoch {
            tracing::warn!(
                expected = epoch,
                current = self.epoch,
                "dropping links for results that have since been reset"
            );
            return Ok(0);
        }

        let Value::Array(per_entry) = links else {
            return Err(CoreError::new(
                CoreErrorKind::ParseFailure,
                "save result must be a list of links per entry",
            ));
        };

        let Some(results) = self.results.as_mut() else {
            return Ok(0);
        };

        let entries = results.entries_mut();
        if per_entry.len() > entries.len() {
            tracing::warn!(
                links = per_entry.len(),
                entries = entries.len(),
                "save result has more link lists than entries"
            );
        }

        let mut added = 0;
        for (entry, entry_links) in entries.iter_mut().zip(per_entry) {
            let candidates: Vec<&str> = match entry_links {
                Value::String(link) => vec![link.as_str()],
                Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
                _ => Vec::new(),
            };
            for link in candidates {
                if entry.add_link(link) {
                    added += 1;
                }
            }
        }
        Ok(added)
    }
}

/// Aggregator handle shared between a coordinator, its save runs and the
/// display layer.
#[derive(Clone, Debug, Default)]
pub struct SharedResults {
    inner: Arc<Mutex<ResultAggregator>>,
}

impl SharedResults {
    pub fn new(mode: MergeMode) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ResultAggregator::new(mode))),
        }
    }

    pub fn with<R>(&self, operation: impl FnOnce(&mut ResultAggregator) -> R) -> OrchestrationResult<R> {
        let mut aggregator = self.lock()?;
        Ok(operation(&mut aggregator))
    }

    pub fn snapshot(&self) -> OrchestrationResult<Option<ResultSet>> {
        Ok(self.lock()?.current().cloned())
    }

    pub fn is_ready(&self) -> OrchestrationResult<bool> {
        Ok(self.lock()?.is_ready())
    }

    fn lock(&self) -> OrchestrationResult<MutexGuard<'_, ResultAggregator>> {
        self.inner.lock().map_err(|_| {
            CoreError::new(CoreErrorKind::Internal, "result aggregator mutex poisoned")
        })
    }
}
