//! Dispatcher tests against a mock runner over real HTTP.
//!
//! The mock binds 127.0.0.1:0, records every request it sees and answers
//! according to the request path, so each test can provoke one failure mode.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::State,
    http::{Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use ui_bridge_mcp::normalize::ToolFailure;
use ui_bridge_mcp::{Dispatcher, ErrorKind, HttpBackend, RunnerConfig, ToolRegistry, ToolResult};

#[derive(Debug, Clone)]
struct Recorded {
    method: Method,
    path: String,
    body: Value,
}

type Log = Arc<Mutex<Vec<Recorded>>>;

/// Mock runner running in a background task.
struct MockRunner {
    port: u16,
    log: Log,
    _shutdown_tx: oneshot::Sender<()>,
}

impl MockRunner {
    async fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();

        let log: Log = Arc::default();
        let app = Router::new().fallback(respond).with_state(log.clone());
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .expect("Mock runner failed");
        });

        Self {
            port,
            log,
            _shutdown_tx: shutdown_tx,
        }
    }

    fn dispatcher(&self) -> Dispatcher {
        self.dispatcher_with(RunnerConfig::new(Some("127.0.0.1".into()), self.port))
    }

    fn dispatcher_with(&self, config: RunnerConfig) -> Dispatcher {
        let backend = HttpBackend::new(&config).expect("Failed to build backend");
        Dispatcher::new(ToolRegistry::builtin().unwrap(), Arc::new(backend))
    }

    fn requests(&self) -> Vec<Recorded> {
        self.log.lock().unwrap().clone()
    }
}

async fn respond(State(log): State<Log>, method: Method, uri: Uri, body: String) -> Response {
    let path = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_owned())
        .unwrap_or_else(|| uri.path().to_owned());
    let parsed = serde_json::from_str(&body).unwrap_or(Value::Null);
    log.lock().unwrap().push(Recorded {
        method: method.clone(),
        path: path.clone(),
        body: parsed.clone(),
    });

    match (method, uri.path()) {
        (Method::GET, "/health") => Json(json!({"status": "ok", "version": "test"})).into_response(),
        (Method::GET, "/ui-bridge/control/snapshot") => {
            (StatusCode::INTERNAL_SERVER_ERROR, "renderer crashed").into_response()
        }
        (Method::GET, "/ui-bridge/control/element/slow") => {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Json(json!({"success": true})).into_response()
        }
        (Method::GET, "/ui-bridge/control/element/html") => {
            (StatusCode::OK, "<html>not json</html>").into_response()
        }
        (Method::GET, "/ui-bridge/control/element/empty") => StatusCode::NO_CONTENT.into_response(),
        (Method::POST, "/ui-bridge/sdk/connect") => {
            Json(json!({"success": true, "url": parsed["url"]})).into_response()
        }
        (Method::POST, "/ui-bridge/sdk/disconnect") => {
            (StatusCode::BAD_GATEWAY, "app already gone").into_response()
        }
        (Method::POST, p) if p.ends_with("/action") => Json(json!({"success": true})).into_response(),
        _ => (StatusCode::NOT_FOUND, "no such route").into_response(),
    }
}

fn failure(result: &ToolResult) -> &ToolFailure {
    match result {
        ToolResult::Failure(f) => f,
        ToolResult::Success(out) => panic!("expected failure, got {:?}", out.payload),
    }
}

#[tokio::test]
async fn click_passes_runner_payload_through() {
    let runner = MockRunner::spawn().await;
    let dispatcher = runner.dispatcher();

    let result = dispatcher
        .dispatch("ui_click", json!({"element_id": "sidebar-nav-item-settings"}))
        .await;

    assert_eq!(result.payload(), Some(&json!({"success": true})));
    let requests = runner.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, Method::POST);
    assert_eq!(
        requests[0].path,
        "/ui-bridge/control/element/sidebar-nav-item-settings/action"
    );
    assert_eq!(requests[0].body["action"], "click");
}

#[tokio::test]
async fn type_sends_text_in_params() {
    let runner = MockRunner::spawn().await;
    let dispatcher = runner.dispatcher();

    let result = dispatcher
        .dispatch("ui_type", json!({"element_id": "search", "text": "hello"}))
        .await;

    assert!(!result.is_error());
    let requests = runner.requests();
    assert_eq!(requests[0].body["action"], "type");
    assert_eq!(requests[0].body["params"]["text"], "hello");
}

#[tokio::test]
async fn health_reports_runner_body() {
    let runner = MockRunner::spawn().await;
    let result = runner.dispatcher().dispatch("ui_health", json!({})).await;

    assert_eq!(result.payload().unwrap()["status"], "ok");
    assert_eq!(runner.requests()[0].path, "/health");
}

#[tokio::test]
async fn refused_connection_is_unreachable() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let config = RunnerConfig::new(Some("127.0.0.1".into()), port);
    let backend = HttpBackend::new(&config).unwrap();
    let dispatcher = Dispatcher::new(ToolRegistry::builtin().unwrap(), Arc::new(backend));

    let result = dispatcher.dispatch("ui_health", json!({})).await;

    let failure = failure(&result);
    assert_eq!(failure.kind, ErrorKind::BackendUnreachable);
    let url = failure.details.as_ref().unwrap()["url"].as_str().unwrap();
    assert!(url.contains(&port.to_string()), "{url}");
}

#[tokio::test]
async fn slow_runner_times_out() {
    let runner = MockRunner::spawn().await;
    let dispatcher = runner.dispatcher_with(
        RunnerConfig::new(Some("127.0.0.1".into()), runner.port)
            .with_timeout(Duration::from_millis(300)),
    );

    let started = std::time::Instant::now();
    let result = dispatcher
        .dispatch("ui_get_element", json!({"element_id": "slow"}))
        .await;

    let failure = failure(&result);
    assert_eq!(failure.kind, ErrorKind::BackendTimeout);
    assert_eq!(failure.details.as_ref().unwrap()["timeout_ms"], 300);
    assert!(started.elapsed() < Duration::from_secs(4));
}

#[tokio::test]
async fn server_error_keeps_status_and_body() {
    let runner = MockRunner::spawn().await;
    let result = runner.dispatcher().dispatch("ui_snapshot", json!({})).await;

    let failure = failure(&result);
    assert_eq!(failure.kind, ErrorKind::BackendError);
    let details = failure.details.as_ref().unwrap();
    assert_eq!(details["status"], 500);
    assert_eq!(details["body"], "renderer crashed");
}

#[tokio::test]
async fn unknown_route_is_a_backend_error() {
    let runner = MockRunner::spawn().await;
    let result = runner.dispatcher().dispatch("ui_get_element", json!({"element_id": "x"})).await;

    let failure = failure(&result);
    assert_eq!(failure.kind, ErrorKind::BackendError);
    assert_eq!(failure.details.as_ref().unwrap()["status"], 404);
}

#[tokio::test]
async fn non_json_success_is_a_protocol_error() {
    let runner = MockRunner::spawn().await;
    let result = runner
        .dispatcher()
        .dispatch("ui_get_element", json!({"element_id": "html"}))
        .await;

    assert_eq!(result.error_kind(), Some(ErrorKind::BackendProtocolError));
}

#[tokio::test]
async fn empty_success_body_is_null() {
    let runner = MockRunner::spawn().await;
    let result = runner
        .dispatcher()
        .dispatch("ui_get_element", json!({"element_id": "empty"}))
        .await;

    assert_eq!(result.payload(), Some(&Value::Null));
}

#[tokio::test]
async fn sdk_tool_without_connection_never_reaches_runner() {
    let runner = MockRunner::spawn().await;
    let result = runner
        .dispatcher()
        .dispatch("sdk_click", json!({"element_id": "submit"}))
        .await;

    assert_eq!(result.error_kind(), Some(ErrorKind::NoActiveConnection));
    assert!(runner.requests().is_empty());
}

#[tokio::test]
async fn sdk_session_lifecycle() {
    let runner = MockRunner::spawn().await;
    let dispatcher = runner.dispatcher();

    let connected = dispatcher
        .dispatch("sdk_connect", json!({"url": "http://localhost:3000"}))
        .await;
    let payload = connected.payload().unwrap();
    assert_eq!(payload["connected"], true);
    assert_eq!(payload["runner"]["url"], "http://localhost:3000");

    let status = dispatcher.dispatch("sdk_status", json!({})).await;
    assert_eq!(status.payload().unwrap()["connected"], true);
    assert_eq!(status.payload().unwrap()["target_url"], "http://localhost:3000");

    let clicked = dispatcher
        .dispatch("sdk_click", json!({"element_id": "submit"}))
        .await;
    assert_eq!(clicked.payload(), Some(&json!({"success": true})));

    // teardown fails on the runner but the local session still ends
    let disconnected = dispatcher.dispatch("sdk_disconnect", json!({})).await;
    let payload = disconnected.payload().unwrap();
    assert_eq!(payload["connected"], false);
    assert_eq!(payload["previous_target_url"], "http://localhost:3000");
    assert_eq!(payload["teardown"]["ok"], false);
    assert_eq!(payload["teardown"]["kind"], "BackendError");

    assert!(!dispatcher.session().status().await.connected);
    let after = dispatcher
        .dispatch("sdk_click", json!({"element_id": "submit"}))
        .await;
    assert_eq!(after.error_kind(), Some(ErrorKind::NoActiveConnection));

    let paths: Vec<String> = runner.requests().into_iter().map(|r| r.path).collect();
    assert_eq!(
        paths,
        [
            "/ui-bridge/sdk/connect",
            "/ui-bridge/sdk/element/submit/action",
            "/ui-bridge/sdk/disconnect",
        ]
    );
}

#[tokio::test]
async fn concurrent_calls_are_independent() {
    let runner = MockRunner::spawn().await;
    let dispatcher = Arc::new(runner.dispatcher_with(
        RunnerConfig::new(Some("127.0.0.1".into()), runner.port)
            .with_timeout(Duration::from_millis(500)),
    ));

    let slow = {
        let d = dispatcher.clone();
        tokio::spawn(async move { d.dispatch("ui_get_element", json!({"element_id": "slow"})).await })
    };
    let fast = dispatcher.dispatch("ui_health", json!({})).await;

    assert!(!fast.is_error());
    let slow = slow.await.unwrap();
    assert_eq!(slow.error_kind(), Some(ErrorKind::BackendTimeout));
}
