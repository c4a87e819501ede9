use crate::models::{CoreError, RunId, RunRecord};

pub type PersistenceResult<T> = Result<T, CoreError>;

pub trait MigrationStore: Send + Sync {
    fn current_version(&self) -> PersistenceResult<i64>;

    fn apply_migration(&self, target_version: i64) -> PersistenceResult<()>;
}

pub trait RunStore: Send + Sync {
    /// Records a newly submitted run. A record that already exists for the
    /// same label and run id is left untouched.
    fn create_run(&self, run: &RunRecord) -> PersistenceResult<()>;

    /// Stores the terminal state of a run. Records that are already terminal
    /// are never overwritten.
    fn finish_run(&self, run: &RunRecord) -> PersistenceResult<()>;

    fn list_recent_runs(&self, limit: usize) -> PersistenceResult<Vec<RunRecord>>;

    fn next_run_id(&self, label: &str) -> PersistenceResult<RunId>;

    fn delete_all_runs(&self) -> PersistenceResult<()>;
}
