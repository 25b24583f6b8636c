use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use axum::{
    extract::State,
    http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::any,
    Json, Router,
};
use reqwest::header::HeaderMap as ReqwestHeaderMap;
use serde_json::{json, Value as JsonValue};
use smart_queue::{
    HttpTransport, Payload, Query, QueueOptions, SmartQueue, SmartQueueError, Transport,
    TransportOptions,
};

#[derive(Clone)]
struct MockResponse {
    status: StatusCode,
    body: Option<JsonValue>,
    headers: Vec<(&'static str, String)>,
    delay: Duration,
}

impl MockResponse {
    fn json(status: StatusCode, body: JsonValue) -> Self {
        Self {
            status,
            body: Some(body),
            headers: Vec::new(),
            delay: Duration::from_millis(0),
        }
    }

    fn empty(status: StatusCode) -> Self {
        Self {
            status,
            body: None,
            headers: Vec::new(),
            delay: Duration::from_millis(0),
        }
    }

    fn with_header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Clone, Debug)]
struct Received {
    method: Method,
    path: String,
    query: Option<String>,
    headers: HeaderMap,
    body: String,
}

#[derive(Clone)]
struct MockState {
    responses: Arc<Mutex<VecDeque<MockResponse>>>,
    received: Arc<Mutex<Vec<Received>>>,
    hits: Arc<AtomicUsize>,
}

async fn proxy_handler(
    State(state): State<MockState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> Response {
    state.hits.fetch_add(1, Ordering::SeqCst);
    state
        .received
        .lock()
        .expect("received log mutex must not be poisoned")
        .push(Received {
            method,
            path: uri.path().to_owned(),
            query: uri.query().map(str::to_owned),
            headers,
            body,
        });

    let response = {
        let mut queue = state
            .responses
            .lock()
            .expect("response queue mutex must not be poisoned");
        queue.pop_front().unwrap_or_else(|| {
            MockResponse::json(
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({"error": "no mock response available"}),
            )
        })
    };

    if !response.delay.is_zero() {
        tokio::time::sleep(response.delay).await;
    }

    let mut reply = match response.body {
        Some(body) => (response.status, Json(body)).into_response(),
        None => response.status.into_response(),
    };
    for (name, value) in response.headers {
        reply.headers_mut().insert(
            HeaderName::from_static(name),
            HeaderValue::from_str(&value).expect("valid mock header value"),
        );
    }
    reply
}

struct TestServer {
    base_url: String,
    hits: Arc<AtomicUsize>,
    received: Arc<Mutex<Vec<Received>>>,
    task: tokio::task::JoinHandle<()>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl TestServer {
    fn received(&self) -> Vec<Received> {
        self.received
            .lock()
            .expect("received log mutex must not be poisoned")
            .clone()
    }
}

async fn spawn_server(responses: Vec<MockResponse>) -> TestServer {
    let state = MockState {
        responses: Arc::new(Mutex::new(responses.into())),
        received: Arc::new(Mutex::new(Vec::new())),
        hits: Arc::new(AtomicUsize::new(0)),
    };

    let app = Router::new()
        .route("/api/osm/*path", any(proxy_handler))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("must bind test listener");
    let address = listener.local_addr().expect("must have local addr");
    let task = tokio::spawn(async move {
        axum::serve(listener, app)
            .await
            .expect("mock server must run");
    });

    TestServer {
        base_url: format!("http://{address}"),
        hits: state.hits,
        received: state.received,
        task,
    }
}

fn fast_options() -> QueueOptions {
    QueueOptions {
        min_interval_ms: 5,
        rate_limit_buffer_ms: 5,
        retry_backoff_ms: 5,
        ..QueueOptions::default()
    }
}

#[tokio::test]
async fn get_forwards_query_and_maps_success() {
    let server = spawn_server(vec![MockResponse::json(
        StatusCode::OK,
        json!({ "items": [{ "eventid": "e1" }] }),
    )
    .with_header("x-ratelimit-remaining", "99")])
    .await;
    let transport = HttpTransport::new(&server.base_url);

    let response = transport
        .get(
            "ext/events/summary/",
            &Query::from([("action", "get"), ("termid", "7")]),
        )
        .await
        .expect("get must succeed");

    assert_eq!(response.status, 200);
    assert_eq!(
        response.data(),
        Some(&json!({ "items": [{ "eventid": "e1" }] }))
    );
    assert_eq!(response.header("X-RateLimit-Remaining"), Some("99"));

    let received = server.received();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].method, Method::GET);
    assert_eq!(received[0].path, "/api/osm/ext/events/summary/");
    assert_eq!(received[0].query.as_deref(), Some("action=get&termid=7"));
    assert!(received[0].headers.get("authorization").is_none());
}

#[tokio::test]
async fn non_success_maps_error_field_into_failure_payload() {
    let server = spawn_server(vec![MockResponse::json(
        StatusCode::TOO_MANY_REQUESTS,
        json!({ "error": "Rate limit exceeded", "retryAfter": 2 }),
    )])
    .await;
    let transport = HttpTransport::new(&server.base_url);

    let response = transport
        .get("ext/members/patrols", &Query::default())
        .await
        .expect("a settled 429 is not a transport error");

    assert_eq!(response.status, 429);
    match response.payload {
        Payload::Failure { message, data } => {
            assert_eq!(message, "Rate limit exceeded");
            assert_eq!(data, Some(json!({ "error": "Rate limit exceeded", "retryAfter": 2 })));
        }
        other => panic!("expected failure payload, got {other:?}"),
    }
}

#[tokio::test]
async fn post_sends_json_body_custom_headers_and_bearer() {
    let server = spawn_server(vec![MockResponse::json(StatusCode::OK, json!({ "ok": true }))]).await;
    let transport = HttpTransport::new_bearer(&server.base_url, "secret");

    let mut headers = ReqwestHeaderMap::new();
    headers.insert("x-request-source", "diagnostics".parse().expect("valid header"));

    let response = transport
        .post(
            "ext/members/contact/",
            Some(&json!({ "scoutid": "m1" })),
            &headers,
        )
        .await
        .expect("post must succeed");
    assert_eq!(response.status, 200);

    let received = server.received();
    let request = &received[0];
    assert_eq!(request.method, Method::POST);
    assert_eq!(
        request.headers.get("content-type").map(|v| v.as_bytes()),
        Some(&b"application/json"[..])
    );
    assert_eq!(
        request.headers.get("x-request-source").map(|v| v.as_bytes()),
        Some(&b"diagnostics"[..])
    );
    assert_eq!(
        request.headers.get("authorization").map(|v| v.as_bytes()),
        Some(&b"Bearer secret"[..])
    );
    let body: JsonValue = serde_json::from_str(&request.body).expect("body must be JSON");
    assert_eq!(body, json!({ "scoutid": "m1" }));
}

#[tokio::test]
async fn empty_delete_response_decodes_as_null() {
    let server = spawn_server(vec![MockResponse::empty(StatusCode::NO_CONTENT)]).await;
    let transport = HttpTransport::new(&server.base_url);

    let response = transport
        .delete("ext/events/event/e1")
        .await
        .expect("delete must succeed");

    assert_eq!(response.status, 204);
    assert_eq!(response.data(), Some(&JsonValue::Null));
    assert_eq!(server.received()[0].method, Method::DELETE);
}

#[tokio::test]
async fn request_timeout_surfaces_transport_error() {
    let server = spawn_server(vec![MockResponse::json(StatusCode::OK, json!({}))
        .with_delay(Duration::from_millis(150))])
    .await;
    let transport =
        HttpTransport::new(&server.base_url).with_options(TransportOptions { timeout_ms: 20 });

    let err = transport
        .put("ext/events/event/e1", None)
        .await
        .expect_err("request must timeout");

    match err {
        SmartQueueError::Transport(inner) => assert!(inner.is_timeout()),
        other => panic!("expected transport timeout error, got {other:?}"),
    }
}

#[tokio::test]
async fn queue_recovers_from_429_over_http() {
    let server = spawn_server(vec![
        MockResponse::json(
            StatusCode::TOO_MANY_REQUESTS,
            json!({ "error": "Rate limit exceeded", "retryAfter": 0 }),
        )
        .with_header("retry-after", "0"),
        MockResponse::json(StatusCode::OK, json!({ "items": [] }))
            .with_header("x-ratelimit-limit", "1000")
            .with_header("x-ratelimit-remaining", "998"),
    ])
    .await;
    let queue = SmartQueue::with_options(HttpTransport::new(&server.base_url), fast_options());

    let response = queue
        .get("ext/events/summary/", [("action", "get")])
        .await
        .expect("must succeed after 429");

    assert_eq!(response.status, 200);
    assert_eq!(server.hits.load(Ordering::SeqCst), 2);
    assert_eq!(queue.rate_limit().remaining, 998);
}

#[tokio::test]
async fn queue_surfaces_proxy_block_and_flushes() {
    let server = spawn_server(vec![MockResponse::json(
        StatusCode::FORBIDDEN,
        json!({ "error": "Application has been blocked by OSM API" }),
    )])
    .await;
    let queue = SmartQueue::with_options(HttpTransport::new(&server.base_url), fast_options());

    let first = queue.get("ext/generic/startup", [("action", "getData")]);
    let second = queue.get("ext/members/patrols", ());

    assert!(matches!(first.await, Err(SmartQueueError::Blocked(_))));
    assert!(matches!(second.await, Err(SmartQueueError::Aborted)));
    assert_eq!(server.hits.load(Ordering::SeqCst), 1);
}
