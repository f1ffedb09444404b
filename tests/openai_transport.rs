//! Transport and full-turn tests against a mocked completion endpoint.

use std::sync::Arc;
use std::time::Duration;

use parlance::{
    ChatSession, CompletionError, ConversationStore, LlmEvent, LlmMessage, LlmRequest,
    LlmTransport, OpenAiTransport, RequestSettings, ResponseClient, Role, StoreConfig,
};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ============= Helper Functions =============

fn transport(server: &MockServer) -> OpenAiTransport {
    OpenAiTransport::new(
        format!("{}/v1", server.uri()),
        "sk-test",
        Duration::from_secs(5),
    )
    .unwrap()
}

fn request(text: &str) -> LlmRequest {
    LlmRequest {
        model: "gpt-4o-mini".into(),
        messages: vec![
            LlmMessage {
                role: Role::System,
                content: "sys".into(),
            },
            LlmMessage {
                role: Role::User,
                content: text.into(),
            },
        ],
        max_tokens: 2000,
        temperature: 0.7,
        stream: false,
    }
}

fn completion_body(content: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }]
    })
}

/// SSE body with one data line per chunk and a closing [DONE]
fn sse_body(chunks: &[&str]) -> String {
    let mut body: String = chunks
        .iter()
        .map(|chunk| {
            format!(
                "data: {}\n\n",
                json!({"choices": [{"index": 0, "delta": {"content": chunk}}]})
            )
        })
        .collect();
    body.push_str("data: [DONE]\n\n");
    body
}

async fn mount_stream(server: &MockServer, chunks: &[&str]) {
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({"stream": true})))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(sse_body(chunks), "text/event-stream"),
        )
        .mount(server)
        .await;
}

async fn collect(mut rx: tokio::sync::mpsc::Receiver<LlmEvent>) -> Vec<LlmEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

// ============= Transport =============

#[tokio::test]
async fn blocking_completion_sends_expected_payload() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "gpt-4o-mini",
            "max_tokens": 2000,
            "stream": false,
            "messages": [
                {"role": "system", "content": "sys"},
                {"role": "user", "content": "Hello"}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("Hi!")))
        .expect(1)
        .mount(&server)
        .await;

    let reply = transport(&server).complete(request("Hello")).await.unwrap();
    assert_eq!(reply.as_deref(), Some("Hi!"));
}

#[tokio::test]
async fn empty_choices_mean_no_text() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
        .mount(&server)
        .await;

    let reply = transport(&server).complete(request("Hello")).await.unwrap();
    assert_eq!(reply, None);
}

#[tokio::test]
async fn status_codes_map_to_variants() {
    let cases: [(u16, serde_json::Value, &str); 4] = [
        (
            401,
            json!({"error": {"message": "Incorrect API key provided", "type": "invalid_request_error"}}),
            "auth",
        ),
        (
            429,
            json!({"error": {"message": "Rate limit reached", "type": "requests"}}),
            "rate",
        ),
        (
            429,
            json!({"error": {"message": "You exceeded your current quota", "code": "insufficient_quota"}}),
            "quota",
        ),
        (
            500,
            json!({"error": {"message": "The server had an error"}}),
            "unknown",
        ),
    ];

    for (status, body, expected) in cases {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(&server)
            .await;

        let err = transport(&server).complete(request("Hello")).await.unwrap_err();
        let kind = match err {
            CompletionError::Auth(_) => "auth",
            CompletionError::RateLimited(_) => "rate",
            CompletionError::QuotaExceeded(_) => "quota",
            CompletionError::Unknown(_) => "unknown",
        };
        assert_eq!(kind, expected, "status {status}");
    }
}

#[tokio::test]
async fn streaming_yields_deltas_then_completion() {
    let server = MockServer::start().await;
    mount_stream(&server, &["Hel", "lo"]).await;

    let rx = transport(&server).stream(request("Hi")).await.unwrap();
    assert_eq!(
        collect(rx).await,
        vec![
            LlmEvent::TextDelta("Hel".into()),
            LlmEvent::TextDelta("lo".into()),
            LlmEvent::StreamComplete,
        ]
    );
}

#[tokio::test]
async fn stream_without_done_still_completes() {
    let server = MockServer::start().await;
    let body = "data: {\"choices\":[{\"delta\":{\"content\":\"tail\"}}]}";

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let rx = transport(&server).stream(request("Hi")).await.unwrap();
    assert_eq!(
        collect(rx).await,
        vec![LlmEvent::TextDelta("tail".into()), LlmEvent::StreamComplete]
    );
}

#[tokio::test]
async fn streaming_error_status_fails_before_any_event() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(429)
                .set_body_json(json!({"error": {"message": "Rate limit reached"}})),
        )
        .mount(&server)
        .await;

    let err = transport(&server).stream(request("Hi")).await.unwrap_err();
    assert!(matches!(err, CompletionError::RateLimited(_)));
}

#[tokio::test]
async fn blocking_call_gives_up_at_the_deadline() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(completion_body("too late"))
                .set_delay(Duration::from_millis(1500)),
        )
        .mount(&server)
        .await;

    let transport = OpenAiTransport::new(
        format!("{}/v1", server.uri()),
        "sk-test",
        Duration::from_millis(300),
    )
    .unwrap();

    let err = transport.complete(request("Hi")).await.unwrap_err();
    match err {
        CompletionError::Unknown(message) => assert!(message.contains("timed out")),
        other => panic!("expected a timeout, got {other:?}"),
    }
}

#[tokio::test]
async fn streams_outlast_the_request_timeout() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(body_partial_json(json!({"stream": true})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(sse_body(&["slow", " but fine"]), "text/event-stream")
                .set_delay(Duration::from_millis(800)),
        )
        .mount(&server)
        .await;

    let transport = OpenAiTransport::new(
        format!("{}/v1", server.uri()),
        "sk-test",
        Duration::from_millis(300),
    )
    .unwrap();

    let rx = transport.stream(request("Hi")).await.unwrap();
    assert_eq!(
        collect(rx).await,
        vec![
            LlmEvent::TextDelta("slow".into()),
            LlmEvent::TextDelta(" but fine".into()),
            LlmEvent::StreamComplete,
        ]
    );
}

#[tokio::test]
async fn unreachable_server_is_unknown() {
    let transport = OpenAiTransport::new("http://127.0.0.1:1/v1", "sk", Duration::from_secs(1)).unwrap();
    let err = transport.complete(request("Hi")).await.unwrap_err();
    assert!(matches!(err, CompletionError::Unknown(_)));
}

// ============= Full turns =============

fn client_and_store(server: &MockServer) -> (ResponseClient, ConversationStore) {
    let client = ResponseClient::new(Arc::new(transport(server)), RequestSettings::default());
    let store = ConversationStore::new(StoreConfig {
        system_instructions: "sys".into(),
        max_conversations: None,
    });
    (client, store)
}

#[tokio::test]
async fn streamed_turn_is_recorded_after_completion() {
    let server = MockServer::start().await;
    mount_stream(&server, &["Hel", "lo"]).await;
    let (client, mut store) = client_and_store(&server);

    let mut chunks = Vec::new();
    client
        .complete_streaming(&mut store, "Hi", "c1", |c| chunks.push(c.to_string()), None)
        .await;

    assert_eq!(chunks, vec!["Hel", "lo"]);
    let history = store.history("c1");
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].content, "Hello");
}

#[tokio::test]
async fn rate_limited_turn_returns_apology() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(429)
                .set_body_json(json!({"error": {"message": "Rate limit reached for requests"}})),
        )
        .mount(&server)
        .await;
    let (client, mut store) = client_and_store(&server);

    let reply = client.complete(&mut store, "Hi", "c1", None).await;
    assert_eq!(
        reply,
        "I apologize, but I'm currently experiencing high demand. Please try again in a moment."
    );
}

#[tokio::test]
async fn session_clear_starts_over() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"stream": false})))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("sure")))
        .mount(&server)
        .await;
    let (client, mut store) = client_and_store(&server);
    let mut session = ChatSession::new("c1").with_streaming(false);

    session.on_send_message(&client, &mut store, "one", |_| {}).await;
    assert_eq!(store.history("c1").len(), 2);

    session.on_clear_conversation(&mut store);
    let memory = store.get_or_create("c1");
    assert_eq!(memory.messages().len(), 1);
    assert_eq!(memory.messages()[0].role, Role::System);
}
