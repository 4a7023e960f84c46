use chat_accelerator::{
    agent::{runtime::{SESSION_HEADER, USER_HEADER}, AgentRuntime, HttpAgentRuntime, InvocationRequest, LanguageModel, ModelMessage},
    config::{RuntimeConfig, StoreConfig},
    error::{ChatError, StoreError},
    gemini::GeminiClient,
    memory::{
        store::{collect_events, PageRequest},
        ConversationReconstructor, EventStore, HttpEventStore, NewMessage, Paging,
    },
    models::{Role, Turn},
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn store_config(endpoint: &str, max_pages: u32) -> StoreConfig {
    StoreConfig {
        endpoint: endpoint.to_string(),
        api_token: Some("test-token".to_string()),
        page_size: 2,
        max_pages,
        timeout: Duration::from_secs(5),
        connect_timeout: Duration::from_secs(1),
    }
}

fn event(ts: f64, role: &str, text: &str) -> serde_json::Value {
    json!({
        "eventId": format!("e-{}", ts),
        "eventTimestamp": ts,
        "payload": [{"conversational": {"role": role, "content": {"text": text}}}]
    })
}

const EVENTS_PATH: &str = "/memories/mem-1/actor/user-1/sessions/s-1";

#[tokio::test]
async fn missing_session_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(EVENTS_PATH))
        .respond_with(ResponseTemplate::new(404).set_body_string("ResourceNotFoundException"))
        .mount(&server)
        .await;

    let store = HttpEventStore::new(&store_config(&server.uri(), 1), "mem-1").unwrap();
    let err = store
        .list_events("user-1", "s-1", PageRequest::default())
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));

    // The reconstructor treats it as a conversation with no turns
    let reconstructor = ConversationReconstructor::new(Arc::new(store), Paging::default());
    let conversation = reconstructor.get("s-1", "user-1").await.unwrap();
    assert!(conversation.questions.is_empty());
}

#[tokio::test]
async fn throttling_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(EVENTS_PATH))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let store = HttpEventStore::new(&store_config(&server.uri(), 1), "mem-1").unwrap();
    let reconstructor = ConversationReconstructor::new(Arc::new(store), Paging::default());
    let err = reconstructor.get("s-1", "user-1").await.unwrap_err();
    assert_eq!(err.status_code(), axum::http::StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn pages_are_followed_up_to_the_limit() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(EVENTS_PATH))
        .and(body_partial_json(json!({"nextToken": "page-2"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "events": [event(2.0, "ASSISTANT", "first answer"), event(1.0, "USER", "first question")]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(EVENTS_PATH))
        .and(header("authorization", "Bearer test-token"))
        .and(body_partial_json(json!({"includePayloads": true, "maxResults": 2})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "events": [event(4.0, "ASSISTANT", "second answer"), event(3.0, "USER", "second question")],
            "nextToken": "page-2"
        })))
        .mount(&server)
        .await;

    let store = HttpEventStore::new(&store_config(&server.uri(), 2), "mem-1").unwrap();
    let paging = Paging { page_size: 2, max_pages: 2 };
    let events = collect_events(&store, "user-1", "s-1", &paging).await.unwrap();
    assert_eq!(events.len(), 4);

    let reconstructor = ConversationReconstructor::new(Arc::new(store), paging);
    let conversation = reconstructor.get("s-1", "user-1").await.unwrap();
    assert_eq!(
        conversation.questions,
        vec![
            Turn::new("first question", "first answer"),
            Turn::new("second question", "second answer"),
        ]
    );

    // A single page stops at the first token
    let single = collect_events(
        &HttpEventStore::new(&store_config(&server.uri(), 1), "mem-1").unwrap(),
        "user-1",
        "s-1",
        &Paging { page_size: 2, max_pages: 1 },
    )
    .await
    .unwrap();
    assert_eq!(single.len(), 2);
}

#[tokio::test]
async fn create_event_posts_a_conversational_payload() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/memories/mem-1/events"))
        .and(body_partial_json(json!({
            "actorId": "user-1",
            "sessionId": "s-1",
            "payload": [{"conversational": {"role": "USER", "content": {"text": "hello"}}}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"event": {"eventId": "e-1"}})))
        .expect(1)
        .mount(&server)
        .await;

    let store = HttpEventStore::new(&store_config(&server.uri(), 1), "mem-1").unwrap();
    store
        .create_event("user-1", "s-1", NewMessage::new(Role::User, "hello"))
        .await
        .unwrap();
}

fn runtime_config(endpoint: &str) -> RuntimeConfig {
    RuntimeConfig {
        endpoint: endpoint.to_string(),
        api_token: None,
        timeout: Duration::from_secs(5),
        connect_timeout: Duration::from_secs(1),
    }
}

fn invocation() -> InvocationRequest {
    InvocationRequest {
        runtime_id: "arn:aws:bedrock-agentcore:us-east-1:123:runtime/chat".to_string(),
        user_id: "user-1".to_string(),
        session_id: "s-1".to_string(),
        prompt: "What is the refund policy?".to_string(),
    }
}

#[tokio::test]
async fn runtime_sends_session_headers_and_extracts_answer() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path_regex(r"^/runtimes/.+/invocations$"))
        .and(header(SESSION_HEADER, "s-1"))
        .and(header(USER_HEADER, "user-1"))
        .and(body_partial_json(json!({
            "input": {"user_id": "user-1", "prompt": "What is the refund policy?"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "output": {
                "message": {"role": "assistant", "content": [{"text": "Refunds take 30 days."}]},
                "timestamp": "2024-01-05T00:07:00Z",
                "model": "gemini-2.0-flash"
            }
        })))
        .mount(&server)
        .await;

    let runtime = HttpAgentRuntime::new(&runtime_config(&server.uri())).unwrap();
    let answer = runtime.invoke(invocation()).await.unwrap();
    assert_eq!(answer, "Refunds take 30 days.");
}

#[tokio::test]
async fn runtime_error_status_is_upstream() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let runtime = HttpAgentRuntime::new(&runtime_config(&server.uri())).unwrap();
    let err = runtime.invoke(invocation()).await.unwrap_err();
    match err {
        ChatError::Upstream(message) => assert_eq!(message, "agent runtime returned an http 500"),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn gemini_returns_first_candidate() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/generate"))
        .and(query_param("key", "k-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{"content": {"role": "model", "parts": [{"text": "Hello from Gemini"}]}}]
        })))
        .mount(&server)
        .await;

    let client = GeminiClient::new("k-1".to_string(), Duration::from_secs(5))
        .unwrap()
        .with_base_url(format!("{}/generate", server.uri()));
    let answer = client
        .complete("system", &[ModelMessage::user("hi")])
        .await
        .unwrap();
    assert_eq!(answer, "Hello from Gemini");
}

#[tokio::test]
async fn gemini_without_key_fails_fast() {
    let client = GeminiClient::new(String::new(), Duration::from_secs(5)).unwrap();
    let err = client.complete("system", &[ModelMessage::user("hi")]).await.unwrap_err();
    assert!(matches!(err, ChatError::Model(_)));
}
