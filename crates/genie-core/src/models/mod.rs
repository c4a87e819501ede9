pub mod error;
pub mod job;
pub mod query;
pub mod results;
pub mod run;

pub use error::{CoreError, CoreErrorKind};
pub use job::{JobId, JobStatus, ProgressEvent, StatusUpdate, SubmitResponse};
pub use query::{Query, Tool};
pub use results::{MergeMode, ResultEntry, ResultSet};
pub use run::{RunId, RunRecord, RunSnapshot, RunState};
