use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use genie_core::backend::{HttpBackend, HttpBackendConfig, JobBackend};
use genie_core::models::{CoreErrorKind, JobId, JobStatus, ProgressEvent, Query, RunState, Tool};
use genie_core::orchestration::{CoordinatorConfig, SubmissionCoordinator};
use serde_json::{Value, json};

#[derive(Clone, Debug)]
struct RecordedRequest {
    request_line: String,
    headers: Vec<String>,
    body: String,
    /// For held-open streams: how long after the events were written the
    /// client closed its end.
    client_closed_after: Option<Duration>,
}

struct CannedResponse {
    status: u16,
    content_type: &'static str,
    body: String,
    held_open: bool,
}

impl CannedResponse {
    fn json(status: u16, body: Value) -> Self {
        Self {
            status,
            content_type: "application/json",
            body: body.to_string(),
            held_open: false,
        }
    }

    fn text(status: u16, body: &str) -> Self {
        Self {
            status,
            content_type: "text/plain",
            body: body.to_string(),
            held_open: false,
        }
    }

    fn event_stream(events: &[Value]) -> Self {
        let mut body = String::from(": stream opened\n\n");
        for event in events {
            body.push_str(&format!("data: {event}\n\n"));
        }
        Self {
            status: 200,
            content_type: "text/event-stream",
            body,
            held_open: false,
        }
    }

    /// Writes `events` and then keeps the stream open until the client
    /// hangs up, like a job that is still running.
    fn open_event_stream(events: &[Value]) -> Self {
        Self {
            held_open: true,
            ..Self::event_stream(events)
        }
    }
}

/// Serves one canned response per connection, in order, then stops.
struct TestServer {
    base_url: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    handle: Option<JoinHandle<()>>,
}

impl TestServer {
    fn start(responses: Vec<CannedResponse>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));

        let recorded = requests.clone();
        let handle = std::thread::spawn(move || {
            for response in responses {
                let Ok((stream, _)) = listener.accept() else {
                    return;
                };
                let request = handle_connection(stream, &response);
                recorded.lock().unwrap().push(request);
            }
        });

        Self {
            base_url,
            requests,
            handle: Some(handle),
        }
    }

    fn finish(mut self) -> Vec<RecordedRequest> {
        if let Some(handle) = self.handle.take() {
            handle.join().unwrap();
        }
        self.requests.lock().unwrap().clone()
    }
}

fn handle_connection(stream: TcpStream, response: &CannedResponse) -> RecordedRequest {
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    let mut reader = BufReader::new(stream.try_clone().unwrap());

    let mut request_line = String::new();
    reader.read_line(&mut request_line).unwrap();

    let mut headers = Vec::new();
    let mut content_length = 0;
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        let line = line.trim_end().to_string();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':')
            && name.eq_ignore_ascii_case("content-length")
        {
            content_length = value.trim().parse().unwrap();
        }
        headers.push(line);
    }

    let mut body = vec![0; content_length];
    reader.read_exact(&mut body).unwrap();

    let mut stream = stream;
    let mut client_closed_after = None;
    if response.held_open {
        write!(
            stream,
            "HTTP/1.1 {} Canned\r\nContent-Type: {}\r\nConnection: close\r\n\r\n{}",
            response.status, response.content_type, response.body
        )
        .unwrap();
        stream.flush().unwrap();

        let written = Instant::now();
        let mut scratch = [0; 64];
        if let Ok(0) = reader.read(&mut scratch) {
            client_closed_after = Some(written.elapsed());
        }
    } else {
        write!(
            stream,
            "HTTP/1.1 {} Canned\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            response.status,
            response.content_type,
            response.body.len(),
            response.body
        )
        .unwrap();
        stream.flush().unwrap();
    }

    RecordedRequest {
        request_line: request_line.trim_end().to_string(),
        headers,
        body: String::from_utf8(body).unwrap(),
        client_closed_after,
    }
}

fn backend(server: &TestServer) -> HttpBackend {
    HttpBackend::new(
        HttpBackendConfig::new(format!("{}/", server.base_url))
            .with_connect_timeout(Duration::from_secs(2))
            .with_request_timeout(Duration::from_secs(5)),
    )
    .unwrap()
}

#[test]
fn submit_posts_query_and_returns_ordered_job_ids() {
    let server = TestServer::start(vec![CannedResponse::json(
        200,
        json!({"job_ids": ["design-1", "design-2"]}),
    )]);

    let query = Query::for_tool(Tool::DesignGenie).param("designs", json!([{"id": 1}]));
    let job_ids = backend(&server).submit(&query).unwrap();
    assert_eq!(
        job_ids,
        vec![JobId::from("design-1"), JobId::from("design-2")]
    );

    let requests = server.finish();
    assert_eq!(requests[0].request_line, "POST /submit HTTP/1.1");
    let body: Value = serde_json::from_str(&requests[0].body).unwrap();
    assert_eq!(body["app"], json!("DesignGenie"));
    assert_eq!(body["designs"], json!([{"id": 1}]));
}

#[test]
fn submit_wraps_a_single_job_id() {
    let server = TestServer::start(vec![CannedResponse::json(200, json!({"job_id": "parts-1"}))]);

    let job_ids = backend(&server)
        .submit(&Query::for_tool(Tool::PartsGenie))
        .unwrap();
    assert_eq!(job_ids, vec![JobId::from("parts-1")]);
    server.finish();
}

#[test]
fn submit_without_job_ids_is_a_parse_failure() {
    let server = TestServer::start(vec![CannedResponse::json(200, json!({"status": "ok"}))]);

    let error = backend(&server)
        .submit(&Query::for_tool(Tool::PartsGenie))
        .unwrap_err();
    assert_eq!(error.kind, CoreErrorKind::ParseFailure);
    assert_eq!(error.app.as_deref(), Some("PartsGenie"));
    server.finish();
}

#[test]
fn rejected_submit_surfaces_backend_message_verbatim() {
    let server = TestServer::start(vec![
        CannedResponse::json(400, json!({"message": "Sequence contains invalid characters"})),
        CannedResponse::text(500, "  upstream exploded \n"),
        CannedResponse::text(503, ""),
    ]);
    let backend = backend(&server);
    let query = Query::for_tool(Tool::DominoGenie);

    let error = backend.submit(&query).unwrap_err();
    assert_eq!(error.kind, CoreErrorKind::SubmissionRejected);
    assert_eq!(error.message, "Sequence contains invalid characters");

    let error = backend.submit(&query).unwrap_err();
    assert_eq!(error.message, "upstream exploded");

    let error = backend.submit(&query).unwrap_err();
    assert_eq!(error.message, "HTTP 503");
    server.finish();
}

#[test]
fn unreachable_backend_is_a_transport_failure() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let backend = HttpBackend::new(
        HttpBackendConfig::new(base_url).with_connect_timeout(Duration::from_secs(1)),
    )
    .unwrap();
    let error = backend
        .submit(&Query::for_tool(Tool::PartsGenie))
        .unwrap_err();
    assert_eq!(error.kind, CoreErrorKind::TransportFailure);
}

#[test]
fn cancel_requests_the_job_cancel_endpoint() {
    let server = TestServer::start(vec![CannedResponse::json(200, json!({}))]);

    backend(&server).cancel(&JobId::from("parts-1")).unwrap();

    let requests = server.finish();
    assert_eq!(requests[0].request_line, "GET /cancel/parts-1 HTTP/1.1");
}

#[tokio::test]
async fn progress_stream_yields_event_payloads() {
    let running = json!({"update": {"status": "running", "message": "Designing", "progress": 40.0}});
    let finished = json!({
        "update": {"status": "finished", "message": "Done"},
        "result": [{"name": "part"}]
    });
    let server = TestServer::start(vec![CannedResponse::event_stream(&[
        running.clone(),
        finished.clone(),
    ])]);

    let mut feed = backend(&server)
        .open_progress(&JobId::from("parts-1"))
        .unwrap();
    let mut payloads = Vec::new();
    while let Some(payload) = feed.recv().await {
        payloads.push(payload.unwrap());
    }

    let events: Vec<ProgressEvent> = payloads
        .iter()
        .map(|payload| ProgressEvent::parse(payload).unwrap())
        .collect();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].update.status, JobStatus::Running);
    assert_eq!(events[0].update.progress, Some(40.0));
    assert_eq!(events[1].update.status, JobStatus::Finished);
    assert_eq!(events[1].result, Some(json!([{"name": "part"}])));

    let requests = tokio::task::spawn_blocking(move || server.finish())
        .await
        .unwrap();
    assert_eq!(requests[0].request_line, "GET /progress/parts-1 HTTP/1.1");
    assert!(
        requests[0]
            .headers
            .iter()
            .any(|header| header.eq_ignore_ascii_case("accept: text/event-stream"))
    );
}

#[tokio::test]
async fn coordinator_runs_a_job_against_the_http_backend() {
    let server = TestServer::start(vec![
        CannedResponse::json(200, json!({"job_ids": ["parts-1"]})),
        CannedResponse::event_stream(&[
            json!({"update": {"status": "waiting", "message": "Waiting..."}}),
            json!({"update": {"status": "running", "message": "Designing"}}),
            json!({"update": {"status": "finished", "message": "Done"}, "result": [{"name": "p"}]}),
        ]),
    ]);
    let coordinator = SubmissionCoordinator::new(
        CoordinatorConfig::for_tool(Tool::PartsGenie),
        Arc::new(backend(&server)),
    );

    let run_id = coordinator
        .submit(Query::for_tool(Tool::PartsGenie))
        .await
        .unwrap();
    let snapshot = coordinator
        .wait_for_terminal(run_id, Some(Duration::from_secs(5)))
        .await
        .unwrap();

    assert_eq!(snapshot.state, RunState::Finished);
    assert_eq!(snapshot.update.message, "Done");
    let results = coordinator.results().snapshot().unwrap().unwrap();
    assert_eq!(results.entries()[0].0["name"], json!("p"));

    let requests = tokio::task::spawn_blocking(move || server.finish())
        .await
        .unwrap();
    assert_eq!(requests.len(), 2);
}

#[tokio::test]
async fn rejected_progress_stream_reports_a_transport_failure() {
    let server = TestServer::start(vec![CannedResponse::json(
        404,
        json!({"message": "Unknown job"}),
    )]);

    let mut feed = backend(&server)
        .open_progress(&JobId::from("gone"))
        .unwrap();
    let error = feed.recv().await.unwrap().unwrap_err();
    assert_eq!(error.kind, CoreErrorKind::TransportFailure);
    assert_eq!(error.message, "Unknown job");
    assert_eq!(error.job, Some(JobId::from("gone")));
    assert!(feed.recv().await.is_none());

    tokio::task::spawn_blocking(move || server.finish())
        .await
        .unwrap();
}

#[tokio::test]
async fn cancelling_mid_stream_closes_the_progress_connection() {
    let server = TestServer::start(vec![
        CannedResponse::json(200, json!({"job_ids": ["parts-1"]})),
        CannedResponse::open_event_stream(&[
            json!({"update": {"status": "running", "message": "Designing"}}),
        ]),
        CannedResponse::json(200, json!({})),
    ]);
    let coordinator = SubmissionCoordinator::new(
        CoordinatorConfig::for_tool(Tool::PartsGenie),
        Arc::new(backend(&server)),
    );

    let run_id = coordinator
        .submit(Query::for_tool(Tool::PartsGenie))
        .await
        .unwrap();
    let mut status = coordinator.subscribe();
    tokio::time::timeout(
        Duration::from_secs(5),
        status.wait_for(|snapshot| snapshot.update.status == JobStatus::Running),
    )
    .await
    .unwrap()
    .unwrap();

    assert!(coordinator.cancel().await.unwrap());
    let snapshot = coordinator
        .wait_for_terminal(run_id, Some(Duration::from_secs(5)))
        .await
        .unwrap();
    assert_eq!(snapshot.state, RunState::Cancelled);

    let requests = tokio::task::spawn_blocking(move || server.finish())
        .await
        .unwrap();
    assert_eq!(requests[1].request_line, "GET /progress/parts-1 HTTP/1.1");
    let closed_after = requests[1]
        .client_closed_after
        .expect("client never closed the progress stream");
    assert!(closed_after < Duration::from_secs(3), "closed after {closed_after:?}");
    assert_eq!(requests[2].request_line, "GET /cancel/parts-1 HTTP/1.1");
}
