//! HTTP transport for the A2A server.
//!
//! `GET /.well-known/agent-card.json` serves the card, `POST /` takes
//! JSON-RPC. Streaming methods answer with Server-Sent Events, one
//! JSON-RPC response per event.

use std::convert::Infallible;
use std::sync::Arc;

use agentscope_config::A2aServerConfig;
use axum::{
    Router,
    body::Bytes,
    extract::State,
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::info;

use super::executor::AgentExecutor;
use super::handler::RequestHandler;
use super::store::{InMemoryTaskStore, TaskStore};
use crate::error::A2aError;
use crate::types::{
    AGENT_CARD_PATH, AgentCard, AgentSkill, JSONRPC_VERSION, JsonRpcError, JsonRpcRequest, JsonRpcResponse,
    methods,
};

#[derive(Clone)]
struct A2aState {
    handler: Arc<RequestHandler>,
    card: Arc<AgentCard>,
}

/// Build the A2A router.
pub fn a2a_router(handler: Arc<RequestHandler>, card: AgentCard) -> Router {
    let state = A2aState {
        handler,
        card: Arc::new(card),
    };
    Router::new()
        .route(AGENT_CARD_PATH, get(card_handler))
        .route("/", post(rpc_handler))
        .route("/health", get(health_handler))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// The card advertised for an agent named `name` under `config`.
pub fn agent_card(name: &str, config: &A2aServerConfig) -> AgentCard {
    let mut card = AgentCard::new(name, config.description.as_str(), config.url());
    card.version = config.version.clone();
    for skill in &config.skills {
        card = card.with_skill(AgentSkill {
            id: skill.id.clone(),
            name: skill.name.clone(),
            description: skill.description.clone(),
            tags: skill.tags.clone(),
            examples: skill.examples.clone(),
        });
    }
    card
}

/// Serve `executor` on `config.host:config.port` until the process stops.
pub async fn serve(
    config: &A2aServerConfig,
    card: AgentCard,
    executor: Arc<dyn AgentExecutor>,
) -> Result<(), A2aError> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    serve_on(listener, card, executor).await
}

/// Serve on an already bound listener.
pub async fn serve_on(
    listener: tokio::net::TcpListener,
    card: AgentCard,
    executor: Arc<dyn AgentExecutor>,
) -> Result<(), A2aError> {
    let store: Arc<dyn TaskStore> = Arc::new(InMemoryTaskStore::new());
    let handler = Arc::new(RequestHandler::new(executor, store));
    let app = a2a_router(handler, card);
    info!(addr = %listener.local_addr()?, "A2A server listening");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn card_handler(State(state): State<A2aState>) -> Json<AgentCard> {
    Json((*state.card).clone())
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

fn rpc_error(id: serde_json::Value, error: JsonRpcError) -> Response {
    Json(JsonRpcResponse::failure(id, error)).into_response()
}

async fn rpc_handler(State(state): State<A2aState>, body: Bytes) -> Response {
    let value: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => return rpc_error(serde_json::Value::Null, JsonRpcError::parse_error(e)),
    };
    let id = value.get("id").cloned().unwrap_or(serde_json::Value::Null);
    let request: JsonRpcRequest = match serde_json::from_value(value) {
        Ok(r) => r,
        Err(e) => return rpc_error(id, JsonRpcError::invalid_request(e)),
    };
    if request.jsonrpc != JSONRPC_VERSION {
        return rpc_error(id, JsonRpcError::invalid_request("jsonrpc must be \"2.0\""));
    }

    match request.method.as_str() {
        methods::SEND_STREAMING_MESSAGE | methods::RESUBSCRIBE => match state.handler.handle_stream(request).await {
            Ok(rx) => {
                let stream = ReceiverStream::new(rx).map(move |item| {
                    let payload = match serde_json::to_value(&item) {
                        Ok(result) => JsonRpcResponse::success(id.clone(), result),
                        Err(e) => JsonRpcResponse::failure(id.clone(), JsonRpcError::internal(e)),
                    };
                    let data = serde_json::to_string(&payload).unwrap_or_default();
                    Ok::<_, Infallible>(SseEvent::default().data(data))
                });
                Sse::new(stream).keep_alive(KeepAlive::default()).into_response()
            }
            Err(error) => rpc_error(id, error),
        },
        _ => Json(state.handler.handle(request).await).into_response(),
    }
}
