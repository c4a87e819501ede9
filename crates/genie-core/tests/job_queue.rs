use std::sync::Arc;
use std::time::Duration;

use genie_core::backend::{JobBackend, ScriptedBackend, ScriptedFrame};
use genie_core::models::{JobId, JobStatus, StatusUpdate};
use genie_core::orchestration::{FailurePolicy, JobQueue, QueueListener, TRANSPORT_ERROR_MESSAGE};
use serde_json::{Value, json};

#[derive(Debug, Default)]
struct Recorder {
    started: Vec<JobId>,
    updates: Vec<(JobId, StatusUpdate)>,
    results: Vec<(JobId, Value)>,
    drained: Vec<JobStatus>,
}

impl QueueListener for Recorder {
    fn on_job_started(&mut self, job_id: &JobId) {
        self.started.push(job_id.clone());
    }

    fn on_update(&mut self, job_id: &JobId, update: &StatusUpdate) {
        self.updates.push((job_id.clone(), update.clone()));
    }

    fn on_job_result(&mut self, job_id: &JobId, result: Value) {
        self.results.push((job_id.clone(), result));
    }

    fn on_drained(&mut self, status: JobStatus) {
        self.drained.push(status);
    }
}

fn ids(raw: &[&str]) -> Vec<JobId> {
    raw.iter().map(|id| JobId::from(*id)).collect()
}

async fn wait_until_opened(backend: &ScriptedBackend, job_id: &str) {
    let expected = JobId::from(job_id);
    for _ in 0..200 {
        if backend.opened_jobs().contains(&expected) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("job '{job_id}' was never opened");
}

#[tokio::test]
async fn drains_jobs_in_submission_order() {
    let backend = Arc::new(ScriptedBackend::new());
    backend
        .script_finished("a", json!([{"name": "a"}]))
        .script(
            "b",
            vec![
                ScriptedFrame::Delay(Duration::from_millis(30)),
                ScriptedFrame::finished(json!([{"name": "b"}])),
            ],
        )
        .script_finished("c", json!([{"name": "c"}]));

    let mut recorder = Recorder::default();
    let outcome = JobQueue::new(ids(&["a", "b", "c"]))
        .drain(backend.clone(), &mut recorder)
        .await;

    assert_eq!(outcome.status, JobStatus::Finished);
    assert_eq!(outcome.completed, ids(&["a", "b", "c"]));
    assert!(outcome.failed.is_empty());
    assert!(outcome.abandoned.is_empty());

    let result_order: Vec<&str> = recorder
        .results
        .iter()
        .map(|(job_id, _)| job_id.as_str())
        .collect();
    assert_eq!(result_order, vec!["a", "b", "c"]);
    assert_eq!(recorder.results[1].1, json!([{"name": "b"}]));
    assert_eq!(recorder.drained, vec![JobStatus::Finished]);
    assert_eq!(backend.opened_jobs(), ids(&["a", "b", "c"]));
}

#[tokio::test]
async fn forwards_every_update_of_the_active_job() {
    let backend = Arc::new(ScriptedBackend::new());
    backend.script(
        "a",
        vec![
            ScriptedFrame::status(JobStatus::Waiting, "Queued"),
            ScriptedFrame::running("Designing"),
            ScriptedFrame::running("Optimising"),
            ScriptedFrame::finished(json!({"id": 1})),
        ],
    );

    let mut recorder = Recorder::default();
    JobQueue::new(ids(&["a"]))
        .drain(backend, &mut recorder)
        .await;

    let messages: Vec<&str> = recorder
        .updates
        .iter()
        .map(|(_, update)| update.message.as_str())
        .collect();
    assert_eq!(
        messages,
        vec!["Queued", "Designing", "Optimising", "Job completed"]
    );
    assert_eq!(recorder.started, ids(&["a"]));
}

#[tokio::test]
async fn job_error_stops_the_queue_before_later_jobs() {
    let backend = Arc::new(ScriptedBackend::new());
    backend
        .script_finished("a", json!([{"name": "a"}]))
        .script(
            "b",
            vec![
                ScriptedFrame::running("Running..."),
                ScriptedFrame::status(JobStatus::Error, "Design infeasible"),
            ],
        )
        .script_finished("c", json!([{"name": "c"}]));

    let mut recorder = Recorder::default();
    let outcome = JobQueue::new(ids(&["a", "b", "c"]))
        .drain(backend.clone(), &mut recorder)
        .await;

    assert_eq!(outcome.status, JobStatus::Error);
    assert_eq!(outcome.completed, ids(&["a"]));
    assert_eq!(outcome.failed, ids(&["b"]));
    assert_eq!(outcome.abandoned, ids(&["c"]));
    assert_eq!(recorder.results.len(), 1);
    assert_eq!(recorder.drained, vec![JobStatus::Error]);
    assert!(!backend.opened_jobs().contains(&JobId::from("c")));
}

#[tokio::test]
async fn backend_cancelled_status_stops_the_queue() {
    let backend = Arc::new(ScriptedBackend::new());
    backend
        .script("a", vec![ScriptedFrame::status(JobStatus::Cancelled, "Job cancelled")])
        .script_finished("b", json!([]));

    let mut recorder = Recorder::default();
    let outcome = JobQueue::new(ids(&["a", "b"]))
        .drain(backend.clone(), &mut recorder)
        .await;

    assert_eq!(outcome.status, JobStatus::Cancelled);
    assert_eq!(outcome.abandoned, ids(&["b"]));
    assert_eq!(recorder.drained, vec![JobStatus::Cancelled]);
    assert_eq!(backend.opened_jobs(), ids(&["a"]));
}

#[tokio::test]
async fn transport_failures_behave_like_job_errors() {
    let scenarios: Vec<(&str, Option<Vec<ScriptedFrame>>)> = vec![
        (
            "explicit error",
            Some(vec![ScriptedFrame::status(JobStatus::Error, "Error")]),
        ),
        (
            "dropped connection",
            Some(vec![
                ScriptedFrame::running("Running..."),
                ScriptedFrame::Fail("connection reset by peer".to_string()),
            ]),
        ),
        (
            "malformed payload",
            Some(vec![ScriptedFrame::Payload("{not json".to_string())]),
        ),
        (
            "stream ended early",
            Some(vec![ScriptedFrame::running("Running...")]),
        ),
        ("stream unavailable", None),
    ];

    for (scenario, frames) in scenarios {
        let backend = Arc::new(ScriptedBackend::new());
        backend
            .script_finished("a", json!([{"name": "a"}]))
            .script_finished("c", json!([{"name": "c"}]));
        if let Some(frames) = frames {
            backend.script("b", frames);
        }

        let mut recorder = Recorder::default();
        let outcome = JobQueue::new(ids(&["a", "b", "c"]))
            .drain(backend.clone(), &mut recorder)
            .await;

        assert_eq!(outcome.status, JobStatus::Error, "{scenario}");
        assert_eq!(outcome.completed, ids(&["a"]), "{scenario}");
        assert_eq!(outcome.abandoned, ids(&["c"]), "{scenario}");
        assert_eq!(recorder.drained, vec![JobStatus::Error], "{scenario}");
        assert!(
            !backend.opened_jobs().contains(&JobId::from("c")),
            "{scenario}"
        );

        let (last_job, last_update) = recorder.updates.last().unwrap();
        assert_eq!(last_job.as_str(), "b", "{scenario}");
        assert_eq!(last_update.status, JobStatus::Error, "{scenario}");
        assert_eq!(last_update.message, TRANSPORT_ERROR_MESSAGE, "{scenario}");
    }
}

#[tokio::test]
async fn cancel_is_idempotent_and_drains_once() {
    let backend = Arc::new(ScriptedBackend::new());
    backend
        .script_long_running("a", 20, Duration::from_millis(10))
        .script_finished("b", json!([]));

    let queue = JobQueue::new(ids(&["a", "b"]));
    let token = queue.token();
    let drain_backend: Arc<dyn JobBackend> = backend.clone();
    let drain = tokio::spawn(async move {
        let mut recorder = Recorder::default();
        let outcome = queue.drain(drain_backend, &mut recorder).await;
        (outcome, recorder)
    });

    wait_until_opened(&backend, "a").await;
    assert!(token.cancel());
    assert!(!token.cancel());

    let (outcome, recorder) = tokio::time::timeout(Duration::from_secs(2), drain)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(outcome.status, JobStatus::Cancelled);
    assert_eq!(outcome.abandoned, ids(&["a", "b"]));
    assert!(recorder.results.is_empty());
    assert_eq!(recorder.drained, vec![JobStatus::Cancelled]);
    assert_eq!(backend.opened_jobs(), ids(&["a"]));
}

#[tokio::test]
async fn cancelled_before_drain_opens_no_channel() {
    let backend = Arc::new(ScriptedBackend::new());
    backend.script_finished("a", json!([]));

    let queue = JobQueue::new(ids(&["a"]));
    assert!(queue.cancel());

    let mut recorder = Recorder::default();
    let outcome = queue.drain(backend.clone(), &mut recorder).await;

    assert_eq!(outcome.status, JobStatus::Cancelled);
    assert_eq!(recorder.drained, vec![JobStatus::Cancelled]);
    assert!(backend.opened_jobs().is_empty());
}

#[tokio::test]
async fn empty_queue_finishes_immediately() {
    let backend = Arc::new(ScriptedBackend::new());

    let mut recorder = Recorder::default();
    let outcome = JobQueue::new(Vec::new())
        .drain(backend.clone(), &mut recorder)
        .await;

    assert_eq!(outcome.status, JobStatus::Finished);
    assert!(outcome.completed.is_empty());
    assert_eq!(recorder.drained, vec![JobStatus::Finished]);
    assert!(recorder.started.is_empty());
    assert!(backend.opened_jobs().is_empty());
}

#[tokio::test]
async fn duplicate_job_ids_are_drained_once() {
    let backend = Arc::new(ScriptedBackend::new());
    backend
        .script_finished("a", json!([1]))
        .script_finished("b", json!([2]));

    let queue = JobQueue::new(ids(&["a", "b", "a"]));
    assert_eq!(queue.len(), 2);

    let mut recorder = Recorder::default();
    let outcome = queue.drain(backend.clone(), &mut recorder).await;

    assert_eq!(outcome.completed, ids(&["a", "b"]));
    assert_eq!(backend.opened_jobs(), ids(&["a", "b"]));
}

#[tokio::test]
async fn skip_policy_continues_past_failed_jobs() {
    let backend = Arc::new(ScriptedBackend::new());
    backend
        .script_finished("a", json!([{"name": "a"}]))
        .script("b", vec![ScriptedFrame::Fail("connection reset".to_string())])
        .script_finished("c", json!([{"name": "c"}]));

    let mut recorder = Recorder::default();
    let outcome = JobQueue::new(ids(&["a", "b", "c"]))
        .with_policy(FailurePolicy::SkipFailedJobs)
        .drain(backend, &mut recorder)
        .await;

    assert_eq!(outcome.status, JobStatus::Finished);
    assert_eq!(outcome.completed, ids(&["a", "c"]));
    assert_eq!(outcome.failed, ids(&["b"]));
    assert_eq!(recorder.results.len(), 2);
    assert_eq!(recorder.drained, vec![JobStatus::Finished]);
}

#[tokio::test]
async fn skip_policy_reports_error_when_every_job_failed() {
    let backend = Arc::new(ScriptedBackend::new());
    backend
        .script("a", vec![ScriptedFrame::status(JobStatus::Error, "Error")])
        .script("b", vec![ScriptedFrame::status(JobStatus::Error, "Error")]);

    let mut recorder = Recorder::default();
    let outcome = JobQueue::new(ids(&["a", "b"]))
        .with_policy(FailurePolicy::SkipFailedJobs)
        .drain(backend, &mut recorder)
        .await;

    assert_eq!(outcome.status, JobStatus::Error);
    assert_eq!(outcome.failed, ids(&["a", "b"]));
    assert_eq!(recorder.drained, vec![JobStatus::Error]);
}
