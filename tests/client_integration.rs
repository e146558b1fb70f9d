use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use axum::{
    body::{to_bytes, Bytes},
    extract::{Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use pagefetch_http::{
    parse_headers, ClientOptions, Content, FetchClient, FetchError, HeaderEntry, Payload,
    RequestOptions,
};
use serde_json::json;

#[derive(Clone)]
struct MockResponse {
    status: StatusCode,
    headers: Vec<(&'static str, &'static str)>,
    body: Vec<u8>,
    delay: Duration,
}

impl MockResponse {
    fn new(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
            delay: Duration::from_millis(0),
        }
    }

    fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self::new(StatusCode::OK, body)
    }

    fn with_header(mut self, name: &'static str, value: &'static str) -> Self {
        self.headers.push((name, value));
        self
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Clone, Debug)]
struct Recorded {
    method: Method,
    path: String,
    headers: HeaderMap,
    body: Bytes,
}

#[derive(Clone)]
struct MockState {
    responses: Arc<Mutex<VecDeque<MockResponse>>>,
    recorded: Arc<Mutex<Vec<Recorded>>>,
    hits: Arc<AtomicUsize>,
}

async fn mock_handler(State(state): State<MockState>, request: Request) -> Response {
    state.hits.fetch_add(1, Ordering::SeqCst);

    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let headers = request.headers().clone();
    let body = to_bytes(request.into_body(), usize::MAX)
        .await
        .expect("request body must be readable");
    state
        .recorded
        .lock()
        .expect("recorded mutex must not be poisoned")
        .push(Recorded {
            method,
            path,
            headers,
            body,
        });

    let response = {
        let mut queue = state
            .responses
            .lock()
            .expect("response queue mutex must not be poisoned");
        queue.pop_front().unwrap_or_else(|| {
            MockResponse::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "no mock response available",
            )
        })
    };

    if !response.delay.is_zero() {
        tokio::time::sleep(response.delay).await;
    }

    let mut headers = HeaderMap::new();
    for (name, value) in response.headers {
        headers.append(
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        );
    }
    (response.status, headers, response.body).into_response()
}

struct TestServer {
    base_url: String,
    hits: Arc<AtomicUsize>,
    recorded: Arc<Mutex<Vec<Recorded>>>,
    task: tokio::task::JoinHandle<()>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl TestServer {
    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    fn recorded(&self) -> Vec<Recorded> {
        self.recorded
            .lock()
            .expect("recorded mutex must not be poisoned")
            .clone()
    }
}

async fn spawn_server(responses: Vec<MockResponse>) -> TestServer {
    let state = MockState {
        responses: Arc::new(Mutex::new(responses.into())),
        recorded: Arc::new(Mutex::new(Vec::new())),
        hits: Arc::new(AtomicUsize::new(0)),
    };

    let app = Router::new()
        .fallback(mock_handler)
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
        recorded: state.recorded,
        task,
    }
}

fn quiet_client(options: ClientOptions) -> FetchClient {
    FetchClient::new().with_options(ClientOptions {
        logging: false,
        ..options
    })
}

fn header_str<'a>(recorded: &'a Recorded, name: &str) -> Option<&'a str> {
    recorded
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
}

#[tokio::test]
async fn get_recodes_latin1_body_to_utf8() {
    let server = spawn_server(vec![MockResponse::ok(b"caf\xe9".to_vec())
        .with_header("content-type", "text/html; charset=ISO-8859-1")])
    .await;
    let mut client = quiet_client(ClientOptions::default());

    let fetched = client.get(&server.url("/page"), &RequestOptions::new()).await;

    assert_eq!(fetched.text(), Some("café"));
    assert_eq!(
        fetched.content_type(),
        Some("text/html; charset=ISO-8859-1")
    );
    assert_eq!(fetched.url.as_deref(), Some(server.url("/page").as_str()));
    assert_eq!(fetched.attempts, 1);
    assert_eq!(server.hits(), 1);
}

#[tokio::test]
async fn retries_server_errors_without_waiting() {
    let server = spawn_server(vec![
        MockResponse::new(StatusCode::INTERNAL_SERVER_ERROR, "boom"),
        MockResponse::new(StatusCode::INTERNAL_SERVER_ERROR, "boom"),
        MockResponse::ok("finally"),
    ])
    .await;
    let mut client = quiet_client(ClientOptions {
        attempts: 3,
        retry_wait: 0,
        ..ClientOptions::default()
    });

    let fetched = client.get(&server.url("/flaky"), &RequestOptions::new()).await;

    assert_eq!(fetched.text(), Some("finally"));
    assert_eq!(fetched.attempts, 3);
    assert_eq!(server.hits(), 3);
    assert!(fetched.elapsed < Duration::from_secs(1));
}

#[tokio::test]
async fn client_error_stops_when_retry_45_is_off() {
    let server = spawn_server(vec![
        MockResponse::new(StatusCode::NOT_FOUND, "missing"),
        MockResponse::ok("never fetched"),
    ])
    .await;
    let mut client = quiet_client(ClientOptions::default());

    let fetched = client
        .get(&server.url("/missing"), &RequestOptions::new().retry_45(false))
        .await;

    assert!(!fetched.is_ok());
    assert_eq!(fetched.attempts, 1);
    assert_eq!(server.hits(), 1);
    assert_eq!(fetched.error_message().as_deref(), Some("404 Not Found"));
    assert_eq!(fetched.error().and_then(FetchError::status), Some(404));
    assert_eq!(fetched.url.as_deref(), Some(server.url("/missing").as_str()));
}

#[tokio::test]
async fn exhaustion_reports_last_error() {
    let server = spawn_server(vec![
        MockResponse::new(StatusCode::INTERNAL_SERVER_ERROR, ""),
        MockResponse::new(StatusCode::BAD_GATEWAY, ""),
    ])
    .await;
    let mut client = quiet_client(ClientOptions::default());

    let fetched = client
        .get(&server.url("/down"), &RequestOptions::new().attempts(2))
        .await;

    assert_eq!(fetched.attempts, 2);
    assert_eq!(server.hits(), 2);
    assert!(fetched.page().is_none());
    assert!(matches!(
        fetched.error(),
        Some(FetchError::Status { code: 502, .. })
    ));
    assert_eq!(fetched.url.as_deref(), Some(server.url("/down").as_str()));
}

#[tokio::test]
async fn post_sends_url_encoded_form() {
    let server = spawn_server(vec![MockResponse::ok("created")]).await;
    let mut client = quiet_client(ClientOptions::default());

    let fetched = client
        .post(
            &server.url("/submit"),
            [("name", "Kit Kat"), ("q", "a&b")],
            &RequestOptions::new(),
        )
        .await;

    assert_eq!(fetched.text(), Some("created"));
    let recorded = server.recorded();
    assert_eq!(recorded[0].method, Method::POST);
    assert_eq!(&recorded[0].body[..], b"name=Kit+Kat&q=a%26b");
    assert_eq!(
        header_str(&recorded[0], "content-type"),
        Some("application/x-www-form-urlencoded")
    );
}

#[tokio::test]
async fn unsupported_payload_fails_without_attempts() {
    let server = spawn_server(vec![MockResponse::ok("unused")]).await;
    let mut client = quiet_client(ClientOptions::default());

    let fetched = client
        .post(&server.url("/submit"), json!([1, 2, 3]), &RequestOptions::new())
        .await;

    assert!(matches!(
        fetched.error(),
        Some(FetchError::InvalidPayload(_))
    ));
    assert_eq!(fetched.attempts, 0);
    assert_eq!(fetched.url, None);
    assert_eq!(server.hits(), 0);
}

#[tokio::test]
async fn put_uses_content_type_override_and_auth() {
    let server = spawn_server(vec![MockResponse::ok("")]).await;
    let mut client = quiet_client(ClientOptions::default());

    let options = RequestOptions::new()
        .content_type("application/json")
        .basic_auth("kit", "secret")
        .header("X-Trace", "abc");
    let fetched = client
        .put(&server.url("/doc"), r#"{"a":1}"#, &options)
        .await;

    assert!(fetched.is_ok());
    let recorded = server.recorded();
    assert_eq!(recorded[0].method, Method::PUT);
    assert_eq!(&recorded[0].body[..], br#"{"a":1}"#);
    assert_eq!(
        header_str(&recorded[0], "content-type"),
        Some("application/json")
    );
    assert_eq!(
        header_str(&recorded[0], "authorization"),
        Some("Basic a2l0OnNlY3JldA==")
    );
    assert_eq!(header_str(&recorded[0], "x-trace"), Some("abc"));
}

#[tokio::test]
async fn delete_without_body_sends_empty_request() {
    let server = spawn_server(vec![MockResponse::new(StatusCode::NO_CONTENT, "")]).await;
    let mut client = quiet_client(ClientOptions::default());

    let fetched = client
        .delete(&server.url("/doc/1"), &RequestOptions::new())
        .await;

    assert_eq!(fetched.text(), Some(""));
    let recorded = server.recorded();
    assert_eq!(recorded[0].method, Method::DELETE);
    assert_eq!(recorded[0].path, "/doc/1");
    assert!(recorded[0].body.is_empty());
}

#[tokio::test]
async fn delete_with_body_sends_payload() {
    let server = spawn_server(vec![MockResponse::ok("gone")]).await;
    let mut client = quiet_client(ClientOptions::default());

    let fetched = client
        .delete_with_body(
            &server.url("/doc/2"),
            Payload::text("reason=stale"),
            &RequestOptions::new().content_type("text/plain"),
        )
        .await;

    assert_eq!(fetched.text(), Some("gone"));
    let recorded = server.recorded();
    assert_eq!(recorded[0].method, Method::DELETE);
    assert_eq!(header_str(&recorded[0], "content-type"), Some("text/plain"));
    assert_eq!(&recorded[0].body[..], b"reason=stale");
}

#[tokio::test]
async fn head_returns_raw_header_block() {
    let server =
        spawn_server(vec![MockResponse::ok("").with_header("x-custom", "yes")]).await;
    let mut client = quiet_client(ClientOptions::default());

    let fetched = client.head(&server.url("/"), &RequestOptions::new()).await;

    let block = fetched.text().expect("head must return header block");
    assert!(block.starts_with("HTTP/1.1 200 OK\r\n"));
    let headers = parse_headers(block);
    assert_eq!(headers.status(), Some("HTTP/1.1 200 OK"));
    assert_eq!(headers.get("x-custom"), Some(&HeaderEntry::from("yes")));
    assert_eq!(server.recorded()[0].method, Method::HEAD);
}

#[tokio::test]
async fn follows_redirects_and_reports_final_url() {
    let server = spawn_server(vec![
        MockResponse::new(StatusCode::FOUND, "").with_header("location", "/final"),
        MockResponse::ok("landed"),
    ])
    .await;
    let mut client = quiet_client(ClientOptions::default());

    let fetched = client.get(&server.url("/start"), &RequestOptions::new()).await;

    assert_eq!(fetched.text(), Some("landed"));
    assert_eq!(fetched.url.as_deref(), Some(server.url("/final").as_str()));
    assert_eq!(server.hits(), 2);
}

#[tokio::test]
async fn redirect_without_following_is_success() {
    let server = spawn_server(vec![
        MockResponse::new(StatusCode::FOUND, "").with_header("location", "/final")
    ])
    .await;
    let mut client = quiet_client(ClientOptions::default());

    let fetched = client
        .get(
            &server.url("/start"),
            &RequestOptions::new().follow_redirects(false),
        )
        .await;

    assert!(fetched.is_ok());
    assert_eq!(fetched.url.as_deref(), Some(server.url("/start").as_str()));
    assert_eq!(server.hits(), 1);
}

#[tokio::test]
async fn request_timeout_surfaces_transport_error() {
    let server = spawn_server(vec![
        MockResponse::ok("late").with_delay(Duration::from_millis(1_500))
    ])
    .await;
    let mut client = quiet_client(ClientOptions::default());

    let fetched = client
        .get(
            &server.url("/slow"),
            &RequestOptions::new().timeout(1).attempts(1),
        )
        .await;

    match fetched.error() {
        Some(FetchError::Transport(inner)) => assert!(inner.is_timeout()),
        other => panic!("expected transport timeout error, got {other:?}"),
    }
    assert_eq!(fetched.attempts, 1);
}

#[tokio::test]
async fn forced_encoding_overrides_detection() {
    let server = spawn_server(vec![MockResponse::ok(b"\xef\xf0\xe8\xe2\xe5\xf2".to_vec())
        .with_header("content-type", "text/plain; charset=utf-8")])
    .await;
    let mut client = quiet_client(ClientOptions::default());

    let fetched = client
        .get(
            &server.url("/ru"),
            &RequestOptions::new().encoding("windows-1251"),
        )
        .await;

    assert_eq!(fetched.text(), Some("привет"));
}

#[tokio::test]
async fn failed_recode_keeps_raw_bytes() {
    let server = spawn_server(vec![MockResponse::ok(b"bad \xff".to_vec())]).await;
    let mut client = quiet_client(ClientOptions::default());

    let fetched = client
        .get(&server.url("/bin"), &RequestOptions::new().encoding("utf-8"))
        .await;

    let page = fetched.page().expect("call must still succeed");
    assert_eq!(page.content, Content::Raw(b"bad \xff".to_vec()));
}

#[tokio::test]
async fn cookie_override_replaces_jar() {
    let server = spawn_server(vec![
        MockResponse::ok("").with_header("set-cookie", "sid=1; Path=/"),
        MockResponse::ok(""),
        MockResponse::ok(""),
    ])
    .await;
    let mut client = quiet_client(ClientOptions {
        cookies: true,
        ..ClientOptions::default()
    });

    client.get(&server.url("/login"), &RequestOptions::new()).await;
    client.get(&server.url("/me"), &RequestOptions::new()).await;
    client
        .get(&server.url("/me"), &RequestOptions::new().cookies("x=2"))
        .await;

    let recorded = server.recorded();
    assert_eq!(header_str(&recorded[1], "cookie"), Some("sid=1"));
    assert_eq!(header_str(&recorded[2], "cookie"), Some("x=2"));
}

#[tokio::test]
async fn rate_limit_blocks_third_request_and_runs_hook_once() {
    let server = spawn_server(vec![
        MockResponse::ok("1"),
        MockResponse::ok("2"),
        MockResponse::ok("3"),
    ])
    .await;
    let mut client = quiet_client(ClientOptions {
        req_limit: Some(2),
        req_time_range: Some(1),
        ..ClientOptions::default()
    });
    let url = server.url("/limited");
    let options = RequestOptions::new();
    let mut hook_calls = 0;
    let mut hook = || hook_calls += 1;

    let started = std::time::Instant::now();
    client.get_with_hook(&url, &options, &mut hook).await;
    client.get_with_hook(&url, &options, &mut hook).await;
    assert!(started.elapsed() < Duration::from_millis(900));

    let third = client.get_with_hook(&url, &options, &mut hook).await;

    assert_eq!(third.text(), Some("3"));
    assert!(started.elapsed() >= Duration::from_secs(1));
    assert_eq!(server.hits(), 3);
    assert_eq!(hook_calls, 1);
}

#[tokio::test(start_paused = true)]
async fn retry_wait_pauses_between_failed_attempts() {
    let mut client = quiet_client(ClientOptions::default());
    let options = RequestOptions::new().attempts(3).retry_wait(4);

    let fetched = client.get("not a url", &options).await;

    assert!(matches!(fetched.error(), Some(FetchError::Transport(_))));
    assert_eq!(fetched.attempts, 3);
    // Two pauses of 1..=4 whole seconds each.
    assert!(fetched.elapsed >= Duration::from_secs(2));
    assert!(fetched.elapsed < Duration::from_secs(9));
}

#[tokio::test(start_paused = true)]
async fn zero_retry_wait_retries_immediately() {
    let mut client = quiet_client(ClientOptions::default());
    let options = RequestOptions::new().attempts(3).retry_wait(0);

    let fetched = client.get("not a url", &options).await;

    assert_eq!(fetched.attempts, 3);
    assert!(fetched.elapsed < Duration::from_secs(1));
}
