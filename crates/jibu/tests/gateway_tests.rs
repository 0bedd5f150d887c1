//! Integration tests for the chat gateway
//!
//! Drive the real router with mock identity and upstream servers, and decode
//! the response body with the same frame decoder the client consumer uses.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use serde_json::json;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use jibu_server::auth::Authenticator;
use jibu_server::config::ChatConfig;
use jibu_server::gateway::providers::{HostedBackend, LocalBackend};
use jibu_server::gateway::{
    AppState, EventKind, OutboundEvent, ProviderSelection, SseDecoder, create_router,
};

// =============================================================================
// Test Fixtures
// =============================================================================

const GOOD_TOKEN: &str = "good-token";

/// Identity service that accepts GOOD_TOKEN and rejects everything else
async fn start_identity_server() -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/auth/v1/user"))
        .and(wiremock::matchers::header(
            "Authorization",
            format!("Bearer {GOOD_TOKEN}").as_str(),
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "user-1"})))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/auth/v1/user"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    server
}

/// Local upstream streaming "Hel", "lo" then a done marker
async fn start_local_upstream() -> MockServer {
    let server = MockServer::start().await;

    let body = concat!(
        "{\"message\":{\"content\":\"Hel\"},\"done\":false}\n",
        "{\"message\":{\"content\":\"lo\"},\"done\":false}\n",
        "{\"done\":true}\n",
    );
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/x-ndjson"))
        .mount(&server)
        .await;

    server
}

/// Local upstream that rejects every call
async fn start_failing_local_upstream() -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(500).set_body_string("model not loaded"))
        .mount(&server)
        .await;

    server
}

/// Hosted upstream streaming "Hi", " there" then the DONE sentinel
async fn start_hosted_upstream() -> MockServer {
    let server = MockServer::start().await;

    let body = concat!(
        "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\" there\"}}]}\n\n",
        "data: [DONE]\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    server
}

/// Hosted upstream that rejects every call
async fn start_failing_hosted_upstream() -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&server)
        .await;

    server
}

struct StateOptions {
    identity_url: String,
    local_url: String,
    hosted_url: String,
    hosted_key: Option<String>,
    default_provider: ProviderSelection,
}

fn create_test_state(options: StateOptions) -> Arc<AppState> {
    let client = reqwest::Client::new();

    Arc::new(AppState {
        chat: ChatConfig {
            default_provider: options.default_provider,
            system_prompt: "You are a test assistant.".to_string(),
        },
        authenticator: Authenticator::new(
            client.clone(),
            options.identity_url,
            Some("anon-key".to_string()),
        ),
        local: LocalBackend::new(client.clone(), options.local_url, "gemma2:2b".to_string()),
        hosted: HostedBackend::new(
            client,
            format!("{}/v1/chat/completions", options.hosted_url),
            "gpt-4o-mini".to_string(),
            0.4,
            options.hosted_key,
        ),
    })
}

fn chat_request(body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/chat")
        .header(header::AUTHORIZATION, format!("Bearer {GOOD_TOKEN}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn collect_events(response: axum::http::Response<Body>) -> Vec<OutboundEvent> {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();

    let mut decoder = SseDecoder::new();
    decoder.push(&text)
}

fn kinds(events: &[OutboundEvent]) -> Vec<EventKind> {
    events.iter().map(|event| event.kind).collect()
}

// =============================================================================
// Pre-stream failures (ordinary status-coded JSON)
// =============================================================================

#[tokio::test]
async fn test_missing_auth_header_returns_401_json() {
    let identity = start_identity_server().await;
    let state = create_test_state(StateOptions {
        identity_url: identity.uri(),
        local_url: "http://127.0.0.1:1".to_string(),
        hosted_url: "http://127.0.0.1:1".to_string(),
        hosted_key: None,
        default_provider: ProviderSelection::Local,
    });
    let app = create_router(state);

    let request = Request::builder()
        .method("POST")
        .uri("/chat")
        .body(Body::from("{\"messages\":[]}"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert_eq!(content_type, "application/json");

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["error"], "Missing auth token.");
}

#[tokio::test]
async fn test_rejected_token_returns_401() {
    let identity = start_identity_server().await;
    let state = create_test_state(StateOptions {
        identity_url: identity.uri(),
        local_url: "http://127.0.0.1:1".to_string(),
        hosted_url: "http://127.0.0.1:1".to_string(),
        hosted_key: None,
        default_provider: ProviderSelection::Local,
    });
    let app = create_router(state);

    let request = Request::builder()
        .method("POST")
        .uri("/chat")
        .header(header::AUTHORIZATION, "Bearer forged-token")
        .body(Body::from("{\"messages\":[]}"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_unconfigured_identity_service_returns_500() {
    let state = create_test_state(StateOptions {
        identity_url: String::new(),
        local_url: "http://127.0.0.1:1".to_string(),
        hosted_url: "http://127.0.0.1:1".to_string(),
        hosted_key: None,
        default_provider: ProviderSelection::Local,
    });
    let app = create_router(state);

    let response = app
        .oneshot(chat_request(json!({"messages": []})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_invalid_json_body_returns_400() {
    let identity = start_identity_server().await;
    let state = create_test_state(StateOptions {
        identity_url: identity.uri(),
        local_url: "http://127.0.0.1:1".to_string(),
        hosted_url: "http://127.0.0.1:1".to_string(),
        hosted_key: None,
        default_provider: ProviderSelection::Local,
    });
    let app = create_router(state);

    let request = Request::builder()
        .method("POST")
        .uri("/chat")
        .header(header::AUTHORIZATION, format!("Bearer {GOOD_TOKEN}"))
        .body(Body::from("this is not json"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["error"], "Invalid JSON body.");
}

// =============================================================================
// Streaming paths
// =============================================================================

#[tokio::test]
async fn test_explicit_local_streams_tokens_then_done() {
    let identity = start_identity_server().await;
    let local = start_local_upstream().await;
    let state = create_test_state(StateOptions {
        identity_url: identity.uri(),
        local_url: local.uri(),
        hosted_url: "http://127.0.0.1:1".to_string(),
        hosted_key: None,
        default_provider: ProviderSelection::Local,
    });
    let app = create_router(state);

    let response = app
        .oneshot(chat_request(json!({
            "messages": [{"role": "user", "content": "hi"}],
            "provider": "local"
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.starts_with("text/event-stream"));

    let events = collect_events(response).await;
    assert_eq!(
        events,
        vec![
            OutboundEvent::new(EventKind::Open, "ok"),
            OutboundEvent::new(EventKind::Token, "Hel"),
            OutboundEvent::new(EventKind::Token, "lo"),
            OutboundEvent::new(EventKind::Done, "ok"),
        ]
    );
}

#[tokio::test]
async fn test_explicit_local_failure_emits_error_without_fallback() {
    let identity = start_identity_server().await;
    let local = start_failing_local_upstream().await;
    let hosted = start_hosted_upstream().await;
    let state = create_test_state(StateOptions {
        identity_url: identity.uri(),
        local_url: local.uri(),
        hosted_url: hosted.uri(),
        hosted_key: Some("test-key".to_string()),
        default_provider: ProviderSelection::Local,
    });
    let app = create_router(state);

    let response = app
        .oneshot(chat_request(json!({
            "messages": [{"role": "user", "content": "hi"}],
            "provider": "local"
        })))
        .await
        .unwrap();

    let events = collect_events(response).await;
    assert_eq!(kinds(&events), vec![EventKind::Open, EventKind::Error]);
    assert!(events[1].payload.contains("500"));

    // The hosted upstream must never have been consulted
    assert!(hosted.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_auto_falls_back_to_hosted_with_single_info() {
    let identity = start_identity_server().await;
    let local = start_failing_local_upstream().await;
    let hosted = start_hosted_upstream().await;
    let state = create_test_state(StateOptions {
        identity_url: identity.uri(),
        local_url: local.uri(),
        hosted_url: hosted.uri(),
        hosted_key: Some("test-key".to_string()),
        default_provider: ProviderSelection::Auto,
    });
    let app = create_router(state);

    let response = app
        .oneshot(chat_request(json!({
            "messages": [{"role": "user", "content": "hi"}],
            "provider": "auto"
        })))
        .await
        .unwrap();

    let events = collect_events(response).await;
    assert_eq!(
        kinds(&events),
        vec![
            EventKind::Open,
            EventKind::Info,
            EventKind::Token,
            EventKind::Token,
            EventKind::Done,
        ]
    );
    assert_eq!(events[2].payload, "Hi");
    assert_eq!(events[3].payload, " there");
}

#[tokio::test]
async fn test_auto_with_both_backends_failing_emits_error() {
    let identity = start_identity_server().await;
    let local = start_failing_local_upstream().await;
    let hosted = start_failing_hosted_upstream().await;
    let state = create_test_state(StateOptions {
        identity_url: identity.uri(),
        local_url: local.uri(),
        hosted_url: hosted.uri(),
        hosted_key: Some("test-key".to_string()),
        default_provider: ProviderSelection::Auto,
    });
    let app = create_router(state);

    let response = app
        .oneshot(chat_request(json!({
            "messages": [{"role": "user", "content": "hi"}],
            "provider": "auto"
        })))
        .await
        .unwrap();

    let events = collect_events(response).await;
    assert_eq!(
        kinds(&events),
        vec![EventKind::Open, EventKind::Info, EventKind::Error]
    );
    // The final failure is the hosted one
    assert!(events[2].payload.contains("503"));
}

#[tokio::test]
async fn test_hosted_without_key_emits_in_stream_error() {
    let identity = start_identity_server().await;
    let state = create_test_state(StateOptions {
        identity_url: identity.uri(),
        local_url: "http://127.0.0.1:1".to_string(),
        hosted_url: "http://127.0.0.1:1".to_string(),
        hosted_key: None,
        default_provider: ProviderSelection::Local,
    });
    let app = create_router(state);

    let response = app
        .oneshot(chat_request(json!({
            "messages": [{"role": "user", "content": "hi"}],
            "provider": "hosted"
        })))
        .await
        .unwrap();

    // Credential problems after stream open are in-band, not status codes
    assert_eq!(response.status(), StatusCode::OK);
    let events = collect_events(response).await;
    assert_eq!(kinds(&events), vec![EventKind::Open, EventKind::Error]);
    assert!(events[1].payload.contains("missing credential"));
}

#[tokio::test]
async fn test_unknown_provider_string_behaves_as_auto() {
    let identity = start_identity_server().await;
    let local = start_failing_local_upstream().await;
    let hosted = start_hosted_upstream().await;
    let state = create_test_state(StateOptions {
        identity_url: identity.uri(),
        local_url: local.uri(),
        hosted_url: hosted.uri(),
        hosted_key: Some("test-key".to_string()),
        default_provider: ProviderSelection::Local,
    });
    let app = create_router(state);

    let response = app
        .oneshot(chat_request(json!({
            "messages": [{"role": "user", "content": "hi"}],
            "provider": "openai"
        })))
        .await
        .unwrap();

    let events = collect_events(response).await;
    assert_eq!(events[0].kind, EventKind::Open);
    assert_eq!(events[1].kind, EventKind::Info);
    assert_eq!(events.last().unwrap().kind, EventKind::Done);
}

// =============================================================================
// Stitched sequence sent upstream
// =============================================================================

#[tokio::test]
async fn test_upstream_receives_directive_and_bounded_history() {
    let identity = start_identity_server().await;
    let local = start_local_upstream().await;
    let state = create_test_state(StateOptions {
        identity_url: identity.uri(),
        local_url: local.uri(),
        hosted_url: "http://127.0.0.1:1".to_string(),
        hosted_key: None,
        default_provider: ProviderSelection::Local,
    });
    let app = create_router(state);

    let messages: Vec<serde_json::Value> = (1..=21)
        .map(|i| json!({"role": "user", "content": format!("turn {i}")}))
        .collect();
    let response = app
        .oneshot(chat_request(json!({
            "messages": messages,
            "provider": "local"
        })))
        .await
        .unwrap();

    // Drain the stream so the upstream call has completed
    let events = collect_events(response).await;
    assert_eq!(events.last().unwrap().kind, EventKind::Done);

    let requests = local.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();

    let sent = body["messages"].as_array().unwrap();
    // One system directive plus the 20 newest turns; turn 1 was dropped
    assert_eq!(sent.len(), 21);
    assert_eq!(sent[0]["role"], "system");
    assert_eq!(sent[0]["content"], "You are a test assistant.");
    assert_eq!(sent[1]["content"], "turn 2");
    assert_eq!(sent[20]["content"], "turn 21");
    assert_eq!(body["stream"], true);
}

#[tokio::test]
async fn test_caller_system_prompt_overrides_default() {
    let identity = start_identity_server().await;
    let local = start_local_upstream().await;
    let state = create_test_state(StateOptions {
        identity_url: identity.uri(),
        local_url: local.uri(),
        hosted_url: "http://127.0.0.1:1".to_string(),
        hosted_key: None,
        default_provider: ProviderSelection::Local,
    });
    let app = create_router(state);

    let response = app
        .oneshot(chat_request(json!({
            "messages": [{"role": "user", "content": "hi"}],
            "provider": "local",
            "systemPrompt": "Answer in one word."
        })))
        .await
        .unwrap();
    collect_events(response).await;

    let requests = local.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["messages"][0]["content"], "Answer in one word.");
}

// =============================================================================
// Health endpoint
// =============================================================================

#[tokio::test]
async fn test_health_check() {
    let state = create_test_state(StateOptions {
        identity_url: String::new(),
        local_url: "http://127.0.0.1:1".to_string(),
        hosted_url: "http://127.0.0.1:1".to_string(),
        hosted_key: None,
        default_provider: ProviderSelection::Local,
    });
    let app = create_router(state);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["status"], "ok");
}
