//! End-to-end tests: actix app in front of a wiremock DuckDuckGo backend.

use std::sync::Arc;
use std::time::{Duration, Instant};

use actix_web::http::{header::ContentType, StatusCode};
use actix_web::{test, web, App};
use serde_json::{json, Value};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use duckchat_proxy::headers::SESSION_HEADER;
use duckchat_proxy::server::{configure, json_config};
use duckchat_proxy::sse::DONE_FRAME;
use duckchat_proxy::streaming::{delta_frame, stop_frame};
use duckchat_proxy::testing::{MockBackend, ScriptedBackend, ScriptedReply};
use duckchat_proxy::{AppState, DuckChatClient, ProxyConfig, ProxyError, RetryPolicy, SessionHolder};

const STATUS_PATH: &str = "/duckchat/v1/status";
const CHAT_PATH: &str = "/duckchat/v1/chat";

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

struct Response {
    status: StatusCode,
    content_type: Option<String>,
    body: String,
}

async fn call(state: AppState, req: test::TestRequest) -> Response {
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .app_data(json_config(1024 * 1024))
            .configure(configure),
    )
    .await;

    let resp = test::call_service(&app, req.to_request()).await;
    let status = resp.status();
    let content_type = resp
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = test::read_body(resp).await;

    Response {
        status,
        content_type,
        body: String::from_utf8_lossy(&body).into_owned(),
    }
}

async fn post_chat(state: AppState, body: Value) -> Response {
    call(
        state,
        test::TestRequest::post()
            .uri("/v1/chat/completions")
            .set_json(body),
    )
    .await
}

fn hi_request() -> Value {
    json!({
        "model": "gpt-4o-mini",
        "messages": [{"role": "user", "content": "hi"}]
    })
}

fn sse_body(frames: &[&str]) -> String {
    frames.iter().map(|f| format!("data: {}\n\n", f)).collect()
}

fn event_stream(frames: &[&str]) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(sse_body(frames), "text/event-stream")
}

async fn mount_handshake(server: &MockServer, token: &str, times: u64) {
    Mock::given(method("GET"))
        .and(path(STATUS_PATH))
        .and(header("x-vqd-accept", "1"))
        .respond_with(ResponseTemplate::new(200).insert_header(SESSION_HEADER, token))
        .up_to_n_times(times)
        .mount(server)
        .await;
}

/// Session holder + backend client wired to `server`, already handshaken.
async fn duckchat_backend(
    server: &MockServer,
    retry: RetryPolicy,
) -> (Arc<SessionHolder>, AppState) {
    let config = ProxyConfig {
        status_url: format!("{}{}", server.uri(), STATUS_PATH),
        chat_url: format!("{}{}", server.uri(), CHAT_PATH),
        ..ProxyConfig::default()
    }
    .without_proxy();

    let http = config.build_http_client().unwrap();
    let session = Arc::new(SessionHolder::new(http.clone(), config.status_url.clone()));
    session.initialize().await.unwrap();

    let client = DuckChatClient::new(http, session.clone(), config.chat_url, retry);
    (session, AppState::new(Arc::new(client)))
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy::new(3, Duration::from_millis(1))
}

// ---------------------------------------------------------------------------
// Gateway behavior against a mock backend
// ---------------------------------------------------------------------------

#[actix_web::test]
async fn test_ping_returns_pong_without_backend_call() {
    let backend = Arc::new(MockBackend::new(&[r#"{"message":"unused"}"#]));
    let state = AppState::new(backend.clone());

    let resp = post_chat(
        state,
        json!({
            "model": "anything",
            "messages": [
                {"role": "system", "content": "health check"},
                {"role": "user", "content": "ping"}
            ]
        }),
    )
    .await;

    assert_eq!(resp.status, StatusCode::OK);
    let v: Value = serde_json::from_str(&resp.body).unwrap();
    assert_eq!(v["choices"][0]["message"]["content"], "pong");
    assert_eq!(v["choices"][0]["finish_reason"], "length");
    assert_eq!(backend.call_count(), 0);
}

#[actix_web::test]
async fn test_stream_framing_with_mock_backend() {
    let backend = Arc::new(MockBackend::new(&[
        r#"{"message":"He"}"#,
        "garbage",
        r#"{"message":"llo"}"#,
    ]));
    let resp = post_chat(AppState::new(backend.clone()), hi_request()).await;

    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.content_type.as_deref(), Some("text/event-stream"));
    assert_eq!(
        resp.body,
        format!("{}{}{}{}", delta_frame("He"), delta_frame("llo"), stop_frame(), DONE_FRAME)
    );

    let (model, messages) = backend.last_request().unwrap();
    assert_eq!(model, "gpt-4o-mini");
    assert_eq!(messages.len(), 1);
}

#[actix_web::test]
async fn test_max_tokens_is_accepted() {
    let backend = Arc::new(MockBackend::new(&[r#"{"message":"ok"}"#]));
    let resp = post_chat(
        AppState::new(backend.clone()),
        json!({
            "model": "gpt-4o-mini",
            "max_tokens": 16,
            "messages": [{"role": "user", "content": "hi"}]
        }),
    )
    .await;

    assert_eq!(resp.status, StatusCode::OK);
    assert!(resp.body.starts_with(&delta_frame("ok")));
}

#[actix_web::test]
async fn test_unexpected_fault_is_500_with_detail() {
    let backend = Arc::new(
        MockBackend::new(&[]).with_error(ProxyError::Configuration("boom".to_string())),
    );
    let resp = post_chat(AppState::new(backend), hi_request()).await;

    assert_eq!(resp.status, StatusCode::INTERNAL_SERVER_ERROR);
    let v: Value = serde_json::from_str(&resp.body).unwrap();
    assert_eq!(v, json!({"detail": "configuration error: boom"}));
}

#[actix_web::test]
async fn test_malformed_body_is_422_with_detail() {
    let backend = Arc::new(MockBackend::new(&[]));
    let resp = call(
        AppState::new(backend.clone()),
        test::TestRequest::post()
            .uri("/v1/chat/completions")
            .insert_header(ContentType::json())
            .set_payload(r#"{"model": "gpt-4o-mini"}"#),
    )
    .await;

    assert_eq!(resp.status, StatusCode::UNPROCESSABLE_ENTITY);
    let v: Value = serde_json::from_str(&resp.body).unwrap();
    assert!(v["detail"].is_string());
    assert_eq!(backend.call_count(), 0);
}

#[actix_web::test]
async fn test_health() {
    let resp = call(
        AppState::new(Arc::new(MockBackend::new(&[]))),
        test::TestRequest::get().uri("/health"),
    )
    .await;

    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.body, "OK");
}

// ---------------------------------------------------------------------------
// Full pipeline against a wiremock DuckDuckGo backend
// ---------------------------------------------------------------------------

#[actix_web::test]
async fn test_two_frames_end_to_end() {
    let server = MockServer::start().await;
    mount_handshake(&server, "vqd-1", u64::MAX).await;
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .and(header(SESSION_HEADER, "vqd-1"))
        .and(header("accept", "text/event-stream"))
        .respond_with(event_stream(&[r#"{"message":"He"}"#, r#"{"message":"llo"}"#]))
        .expect(1)
        .mount(&server)
        .await;

    let (_session, state) = duckchat_backend(&server, fast_retry()).await;
    let resp = post_chat(state, hi_request()).await;

    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(
        resp.body,
        format!("{}{}{}{}", delta_frame("He"), delta_frame("llo"), stop_frame(), DONE_FRAME)
    );
}

#[actix_web::test]
async fn test_session_failure_then_success_after_fresh_handshake() {
    let server = MockServer::start().await;
    mount_handshake(&server, "vqd-1", 1).await;
    mount_handshake(&server, "vqd-2", 1).await;
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(ResponseTemplate::new(400))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .and(header(SESSION_HEADER, "vqd-2"))
        .respond_with(event_stream(&[r#"{"message":"ok"}"#]))
        .expect(1)
        .mount(&server)
        .await;

    let (session, state) = duckchat_backend(&server, fast_retry()).await;
    let before = session.current();
    assert_eq!(before, "vqd-1");

    let resp = post_chat(state, hi_request()).await;

    assert_eq!(
        resp.body,
        format!("{}{}{}", delta_frame("ok"), stop_frame(), DONE_FRAME)
    );
    assert_ne!(session.current(), before);
    assert_eq!(session.current(), "vqd-2");
}

#[actix_web::test]
async fn test_system_messages_forwarded_as_user() {
    let server = MockServer::start().await;
    mount_handshake(&server, "vqd-1", u64::MAX).await;
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(event_stream(&[r#"{"message":"ok"}"#]))
        .mount(&server)
        .await;

    let (_session, state) = duckchat_backend(&server, fast_retry()).await;
    post_chat(
        state,
        json!({
            "model": "claude-3-haiku",
            "messages": [
                {"role": "system", "content": "be brief"},
                {"role": "user", "content": "hi"},
                {"role": "assistant", "content": "hello"},
                {"role": "system", "content": "stay brief"}
            ]
        }),
    )
    .await;

    let requests = server.received_requests().await.unwrap();
    let chat = requests
        .iter()
        .find(|r| r.url.path() == CHAT_PATH)
        .expect("backend chat call");
    let body: Value = serde_json::from_slice(&chat.body).unwrap();

    assert_eq!(
        body,
        json!({
            "model": "claude-3-haiku",
            "messages": [
                {"role": "user", "content": "be brief"},
                {"role": "user", "content": "hi"},
                {"role": "assistant", "content": "hello"},
                {"role": "user", "content": "stay brief"}
            ]
        })
    );
}

#[actix_web::test]
async fn test_backend_errors_back_off_then_terminate_cleanly() {
    let server = MockServer::start().await;
    mount_handshake(&server, "vqd-1", u64::MAX).await;
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .expect(3)
        .mount(&server)
        .await;

    let unit = Duration::from_millis(40);
    let (_session, state) = duckchat_backend(&server, RetryPolicy::new(3, unit)).await;

    let started = Instant::now();
    let resp = post_chat(state, hi_request()).await;
    let elapsed = started.elapsed();

    // Waits of 1 and 2 units between the three attempts, none after the last.
    assert!(elapsed >= unit * 3, "elapsed {:?}", elapsed);
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.body, format!("{}{}", stop_frame(), DONE_FRAME));
    assert!(!resp.body.contains("bad gateway"));
}

#[actix_web::test]
async fn test_session_failures_retry_without_backoff() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(STATUS_PATH))
        .respond_with(ResponseTemplate::new(200).insert_header(SESSION_HEADER, "vqd-n"))
        .expect(4)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .respond_with(ResponseTemplate::new(400))
        .expect(3)
        .mount(&server)
        .await;

    let (_session, state) =
        duckchat_backend(&server, RetryPolicy::new(3, Duration::from_secs(10))).await;

    let started = Instant::now();
    let resp = post_chat(state, hi_request()).await;

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(resp.body, format!("{}{}", stop_frame(), DONE_FRAME));
}

#[actix_web::test]
async fn test_unreachable_backend_exhausts_retries() {
    let config = ProxyConfig {
        status_url: "http://127.0.0.1:1/status".to_string(),
        chat_url: "http://127.0.0.1:1/chat".to_string(),
        request_timeout_secs: 2,
        ..ProxyConfig::default()
    }
    .without_proxy();
    let http = config.build_http_client().unwrap();
    let session = Arc::new(SessionHolder::new(http.clone(), config.status_url.clone()));
    session.rotate("vqd-stale");
    let client = DuckChatClient::new(http, session, config.chat_url, fast_retry());

    let resp = post_chat(AppState::new(Arc::new(client)), hi_request()).await;

    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.body, format!("{}{}", stop_frame(), DONE_FRAME));
}

#[actix_web::test]
async fn test_broken_stream_keeps_partial_output_and_appends_retry() {
    let backend = ScriptedBackend::start(vec![
        ScriptedReply::Truncated("data: {\"message\":\"A\"}\n".to_string()),
        ScriptedReply::Complete("data: {\"message\":\"B\"}\n\n".to_string()),
    ])
    .await
    .unwrap();

    let http = ProxyConfig::default().without_proxy().build_http_client().unwrap();
    let session = Arc::new(SessionHolder::new(
        http.clone(),
        format!("{}{}", backend.uri(), STATUS_PATH),
    ));
    session.rotate("vqd-1");
    let client = DuckChatClient::new(
        http,
        session,
        format!("{}{}", backend.uri(), CHAT_PATH),
        fast_retry(),
    );

    let resp = post_chat(AppState::new(Arc::new(client)), hi_request()).await;

    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(
        resp.body,
        format!("{}{}{}{}", delta_frame("A"), delta_frame("B"), stop_frame(), DONE_FRAME)
    );
    assert_eq!(backend.connections(), 2);
}
