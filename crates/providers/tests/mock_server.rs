//! Provider clients against a local axum server speaking each wire format.

use agentscope_core::{ChatModel, ChatRequest, ChunkAccumulator, ContentBlock, ModelError, Msg};
use agentscope_providers::{DashScopeChatModel, OllamaChatModel, OpenAiChatModel};
use axum::Router;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::post;

const OPENAI_SSE: &str = concat!(
    "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
    "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
    "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"id\":\"call_1\",\"function\":{\"name\":\"echo\",\"arguments\":\"{\\\"x\\\":\"}}]}}]}\n\n",
    "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\"1}\"}}]},\"finish_reason\":\"tool_calls\"}]}\n\n",
    "data: {\"choices\":[],\"usage\":{\"prompt_tokens\":3,\"completion_tokens\":4,\"total_tokens\":7}}\n\n",
    "data: [DONE]\n\n",
);

const DASHSCOPE_SSE: &str = concat!(
    "id:1\nevent:result\n:HTTP_STATUS/200\n",
    "data:{\"output\":{\"choices\":[{\"message\":{\"role\":\"assistant\",\"content\":\"\",\"reasoning_content\":\"hmm\"},\"finish_reason\":\"null\"}]}}\n\n",
    "id:2\nevent:result\n:HTTP_STATUS/200\n",
    "data:{\"output\":{\"choices\":[{\"message\":{\"role\":\"assistant\",\"content\":\"Hi there\"},\"finish_reason\":\"stop\"}]},\"usage\":{\"input_tokens\":2,\"output_tokens\":2,\"total_tokens\":4}}\n\n",
);

const OLLAMA_NDJSON: &str = concat!(
    "{\"model\":\"qwen3\",\"message\":{\"role\":\"assistant\",\"content\":\"Bon\"},\"done\":false}\n",
    "{\"model\":\"qwen3\",\"message\":{\"role\":\"assistant\",\"content\":\"jour\"},\"done\":false}\n",
    "{\"model\":\"qwen3\",\"message\":{\"role\":\"assistant\",\"content\":\"\"},\"done\":true,\"prompt_eval_count\":5,\"eval_count\":2}\n",
);

async fn openai_chat(headers: HeaderMap, body: String) -> impl IntoResponse {
    if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some("Bearer good-key") {
        return (
            StatusCode::UNAUTHORIZED,
            [("retry-after", "0")],
            r#"{"error":{"message":"Incorrect API key provided"}}"#.to_string(),
        );
    }
    if body.contains("\"stream\":true") {
        (StatusCode::OK, [("content-type", "text/event-stream")], OPENAI_SSE.to_string())
    } else {
        (
            StatusCode::OK,
            [("content-type", "application/json")],
            r#"{"id":"x","model":"mock","choices":[{"message":{"content":"pong"},"finish_reason":"stop"}],"usage":{"prompt_tokens":1,"completion_tokens":1,"total_tokens":2}}"#.to_string(),
        )
    }
}

async fn rate_limited() -> impl IntoResponse {
    (
        StatusCode::TOO_MANY_REQUESTS,
        [("retry-after", "7")],
        r#"{"error":{"message":"slow down"}}"#,
    )
}

async fn server_error() -> impl IntoResponse {
    (StatusCode::BAD_GATEWAY, "upstream died")
}

async fn dashscope_generation(headers: HeaderMap) -> impl IntoResponse {
    assert_eq!(
        headers.get("x-dashscope-sse").and_then(|v| v.to_str().ok()),
        Some("enable")
    );
    (StatusCode::OK, [("content-type", "text/event-stream")], DASHSCOPE_SSE)
}

async fn ollama_chat() -> impl IntoResponse {
    (StatusCode::OK, [("content-type", "application/x-ndjson")], OLLAMA_NDJSON)
}

async fn spawn_server() -> String {
    let app = Router::new()
        .route("/ok/v1/chat/completions", post(openai_chat))
        .route("/limited/v1/chat/completions", post(rate_limited))
        .route("/broken/v1/chat/completions", post(server_error))
        .route(
            "/api/v1/services/aigc/text-generation/generation",
            post(dashscope_generation),
        )
        .route("/api/chat", post(ollama_chat));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

async fn collect(model: &dyn ChatModel) -> agentscope_core::ChatResponse {
    let mut rx = model
        .stream(ChatRequest::new("", vec![Msg::user("user", "hi")]))
        .await
        .unwrap();
    let mut acc = ChunkAccumulator::new();
    while let Some(chunk) = rx.recv().await {
        let chunk = chunk.unwrap();
        acc.push(&chunk);
        if chunk.done {
            break;
        }
    }
    acc.finish(model.model_name())
}

#[tokio::test]
async fn openai_non_streaming_roundtrip() {
    let base = spawn_server().await;
    let model =
        OpenAiChatModel::new("mock", format!("{base}/ok/v1"), Some("good-key".into()), "mock").unwrap();
    let response = model
        .chat(ChatRequest::new("", vec![Msg::user("user", "ping")]))
        .await
        .unwrap();
    assert_eq!(response.content, vec![ContentBlock::text("pong")]);
    assert_eq!(response.usage.unwrap().total_tokens, 2);
}

#[tokio::test]
async fn openai_streaming_accumulates_text_and_tool_call() {
    let base = spawn_server().await;
    let model =
        OpenAiChatModel::new("mock", format!("{base}/ok/v1"), Some("good-key".into()), "mock").unwrap();
    let response = collect(&model).await;
    assert_eq!(
        response.content,
        vec![
            ContentBlock::text("Hello"),
            ContentBlock::tool_use("call_1", "echo", serde_json::json!({"x": 1})),
        ]
    );
    assert_eq!(response.usage.unwrap().total_tokens, 7);
}

#[tokio::test]
async fn http_statuses_map_to_errors() {
    let base = spawn_server().await;

    let bad_key =
        OpenAiChatModel::new("mock", format!("{base}/ok/v1"), Some("wrong".into()), "mock").unwrap();
    let err = bad_key
        .chat(ChatRequest::new("", vec![Msg::user("user", "x")]))
        .await
        .unwrap_err();
    assert!(matches!(err, ModelError::Authentication(ref m) if m == "Incorrect API key provided"));

    let limited =
        OpenAiChatModel::new("mock", format!("{base}/limited/v1"), Some("k".into()), "mock").unwrap();
    let err = limited
        .chat(ChatRequest::new("", vec![Msg::user("user", "x")]))
        .await
        .unwrap_err();
    assert!(matches!(err, ModelError::RateLimited { retry_after_secs: 7, .. }));
    assert!(err.is_retryable());

    let broken =
        OpenAiChatModel::new("mock", format!("{base}/broken/v1"), Some("k".into()), "mock").unwrap();
    let err = broken
        .chat(ChatRequest::new("", vec![Msg::user("user", "x")]))
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), Some(502));
    assert!(matches!(err, ModelError::InternalServer { .. }));
}

#[tokio::test]
async fn dashscope_incremental_stream() {
    let base = spawn_server().await;
    let model = DashScopeChatModel::new("sk", "qwen-plus").unwrap().with_base_url(&base);
    let response = collect(&model).await;
    assert_eq!(
        response.content,
        vec![ContentBlock::thinking("hmm"), ContentBlock::text("Hi there")]
    );
    assert_eq!(response.usage.unwrap().input_tokens, 2);
}

#[tokio::test]
async fn ollama_ndjson_stream() {
    let base = spawn_server().await;
    let model = OllamaChatModel::new(Some(base.as_str()), "qwen3").unwrap();
    let response = collect(&model).await;
    assert_eq!(response.content, vec![ContentBlock::text("Bonjour")]);
    assert_eq!(response.usage.unwrap().output_tokens, 2);
}

#[tokio::test]
async fn unreachable_server_is_network_error() {
    let model = OllamaChatModel::new(Some("http://127.0.0.1:1"), "qwen3").unwrap();
    let err = model
        .chat(ChatRequest::new("", vec![Msg::user("user", "x")]))
        .await
        .unwrap_err();
    assert!(matches!(err, ModelError::Network(_)));
}
