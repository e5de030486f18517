//! A2A JSON-RPC client.

use std::time::Duration;

use futures::StreamExt;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::error::A2aError;
use crate::sse::SseDecoder;
use crate::types::{
    AGENT_CARD_PATH, AgentCard, JsonRpcRequest, JsonRpcResponse, MessageSendParams, SendMessageResult,
    StreamResponse, Task, TaskIdParams, TaskQueryParams, methods,
};

/// Items of a streaming call; the channel closes after the final item.
pub type A2aStream = mpsc::Receiver<Result<StreamResponse, A2aError>>;

const STREAM_BUFFER: usize = 64;

/// URL of the agent card published under `base_url`.
pub fn card_url(base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if base.ends_with(AGENT_CARD_PATH) {
        base.to_string()
    } else {
        format!("{base}{AGENT_CARD_PATH}")
    }
}

fn build_http() -> Result<reqwest::Client, A2aError> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| A2aError::Http(format!("Failed to create HTTP client: {e}")))
}

/// Talks to one A2A server endpoint.
#[derive(Clone)]
pub struct A2aClient {
    http: reqwest::Client,
    endpoint: String,
}

impl A2aClient {
    /// A client for the JSON-RPC endpoint `endpoint` (an agent card's `url`).
    pub fn new(endpoint: impl Into<String>) -> Result<Self, A2aError> {
        Ok(Self {
            http: build_http()?,
            endpoint: endpoint.into(),
        })
    }

    pub fn from_card(card: &AgentCard) -> Result<Self, A2aError> {
        Self::new(card.url.clone())
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Fetch the agent card published at `base_url`.
    pub async fn fetch_agent_card(base_url: &str) -> Result<AgentCard, A2aError> {
        let url = card_url(base_url);
        debug!(url = %url, "Fetching agent card");
        let response = build_http()?
            .get(&url)
            .send()
            .await
            .map_err(|e| A2aError::CardUnavailable(format!("{url}: {e}")))?;
        let response = check_status(response).await?;
        response
            .json::<AgentCard>()
            .await
            .map_err(|e| A2aError::CardUnavailable(format!("{url}: {e}")))
    }

    pub async fn send_message(&self, params: MessageSendParams) -> Result<SendMessageResult, A2aError> {
        self.rpc(methods::SEND_MESSAGE, &params).await
    }

    pub async fn send_message_streaming(&self, params: MessageSendParams) -> Result<A2aStream, A2aError> {
        self.rpc_stream(methods::SEND_STREAMING_MESSAGE, &params).await
    }

    pub async fn get_task(&self, id: &str, history_length: Option<usize>) -> Result<Task, A2aError> {
        let params = TaskQueryParams {
            id: id.to_string(),
            history_length,
            metadata: None,
        };
        self.rpc(methods::GET_TASK, &params).await
    }

    pub async fn cancel_task(&self, id: &str) -> Result<Task, A2aError> {
        let params = TaskIdParams {
            id: id.to_string(),
            metadata: None,
        };
        self.rpc(methods::CANCEL_TASK, &params).await
    }

    /// Reattach to the event stream of a running task.
    pub async fn resubscribe(&self, id: &str) -> Result<A2aStream, A2aError> {
        let params = TaskIdParams {
            id: id.to_string(),
            metadata: None,
        };
        self.rpc_stream(methods::RESUBSCRIBE, &params).await
    }

    fn request<P: Serialize>(&self, method: &str, params: &P) -> Result<JsonRpcRequest, A2aError> {
        Ok(JsonRpcRequest::new(method, serde_json::to_value(params)?))
    }

    async fn rpc<P: Serialize, R: DeserializeOwned>(&self, method: &str, params: &P) -> Result<R, A2aError> {
        let request = self.request(method, params)?;
        trace!(method, endpoint = %self.endpoint, "A2A request");
        let response = self.http.post(&self.endpoint).json(&request).send().await?;
        let response = check_status(response).await?;
        let body: JsonRpcResponse = response
            .json()
            .await
            .map_err(|e| A2aError::InvalidResponse(e.to_string()))?;
        unwrap_result(body)
    }

    async fn rpc_stream<P: Serialize>(&self, method: &str, params: &P) -> Result<A2aStream, A2aError> {
        let request = self.request(method, params)?;
        trace!(method, endpoint = %self.endpoint, "A2A streaming request");
        let response = self
            .http
            .post(&self.endpoint)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(&request)
            .send()
            .await?;
        let response = check_status(response).await?;

        // Errors before the stream starts come back as a plain JSON-RPC response
        let is_sse = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("text/event-stream"));
        if !is_sse {
            let body: JsonRpcResponse = response
                .json()
                .await
                .map_err(|e| A2aError::InvalidResponse(e.to_string()))?;
            return match body.error {
                Some(error) => Err(error.into()),
                None => Err(A2aError::InvalidResponse("expected an event stream".into())),
            };
        }

        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        tokio::spawn(async move {
            let mut bytes = response.bytes_stream();
            let mut sse = SseDecoder::default();
            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        let _ = tx.send(Err(A2aError::Http(e.to_string()))).await;
                        return;
                    }
                };
                for data in sse.push(&chunk) {
                    if forward(&tx, &data).await {
                        return;
                    }
                }
            }
            if let Some(data) = sse.finish() {
                forward(&tx, &data).await;
            }
        });
        Ok(rx)
    }
}

/// Decode one SSE payload and send it on. Returns true when the stream is done.
async fn forward(tx: &mpsc::Sender<Result<StreamResponse, A2aError>>, data: &str) -> bool {
    let item = serde_json::from_str::<JsonRpcResponse>(data)
        .map_err(|e| A2aError::InvalidResponse(format!("bad stream event: {e}")))
        .and_then(unwrap_result::<StreamResponse>);
    let done = match &item {
        Ok(item) => item.is_final(),
        Err(_) => true,
    };
    if tx.send(item).await.is_err() {
        return true; // receiver dropped
    }
    done
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, A2aError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    warn!(status = status.as_u16(), body = %body, "A2A server returned error");
    Err(A2aError::Status {
        status: status.as_u16(),
        body,
    })
}

fn unwrap_result<R: DeserializeOwned>(response: JsonRpcResponse) -> Result<R, A2aError> {
    if let Some(error) = response.error {
        return Err(error.into());
    }
    let result = response
        .result
        .ok_or_else(|| A2aError::InvalidResponse("response has neither result nor error".into()))?;
    Ok(serde_json::from_value(result)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{JsonRpcError, codes};
    use serde_json::json;

    #[test]
    fn card_url_variants() {
        assert_eq!(card_url("http://h:1"), "http://h:1/.well-known/agent-card.json");
        assert_eq!(card_url("http://h:1/"), "http://h:1/.well-known/agent-card.json");
        assert_eq!(
            card_url("http://h:1/.well-known/agent-card.json"),
            "http://h:1/.well-known/agent-card.json"
        );
    }

    #[test]
    fn rpc_error_maps_to_a2a_error() {
        let response = JsonRpcResponse::failure(json!("1"), JsonRpcError::task_not_found("t1"));
        let err = unwrap_result::<Task>(response).unwrap_err();
        assert!(matches!(err, A2aError::Rpc { code, .. } if code == codes::TASK_NOT_FOUND));
    }

    #[test]
    fn empty_response_is_invalid() {
        let response = JsonRpcResponse {
            jsonrpc: "2.0".into(),
            id: json!(1),
            result: None,
            error: None,
        };
        assert!(matches!(
            unwrap_result::<Task>(response),
            Err(A2aError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn forward_stops_after_final_item() {
        let (tx, mut rx) = mpsc::channel(4);
        let working = json!({
            "jsonrpc": "2.0", "id": 1,
            "result": {"kind": "status-update", "taskId": "t", "contextId": "c",
                       "status": {"state": "working"}, "final": false}
        });
        let done = json!({
            "jsonrpc": "2.0", "id": 1,
            "result": {"kind": "status-update", "taskId": "t", "contextId": "c",
                       "status": {"state": "completed"}, "final": true}
        });
        assert!(!forward(&tx, &working.to_string()).await);
        assert!(forward(&tx, &done.to_string()).await);
        assert!(forward(&tx, "not json").await);

        assert!(rx.recv().await.unwrap().is_ok());
        assert!(rx.recv().await.unwrap().unwrap().is_final());
        assert!(matches!(rx.recv().await.unwrap(), Err(A2aError::InvalidResponse(_))));
    }
}
