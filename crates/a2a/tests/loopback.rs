//! Client and remote agent against a real server on a loopback port.

use std::sync::Arc;

use agentscope_a2a::server::{AgentScopeExecutor, serve_on};
use agentscope_a2a::{A2aAgent, A2aClient, AgentCard, Message, TaskState};
use agentscope_a2a::types::{MessageSendParams, SendMessageResult, StreamResponse};
use agentscope_agent::ReActAgent;
use agentscope_agent::test_helpers::{ScriptedModel, text_response};
use agentscope_core::{Agent, AgentEvent};

/// Start a server whose agents answer with `replies`, in order, per session.
async fn start_server(replies: &'static [&'static str]) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let base = format!("http://{addr}/");

    let factory = move |_ctx: &str| -> agentscope_core::Result<Arc<dyn Agent>> {
        let model = ScriptedModel::new(replies.iter().map(|r| text_response(r)).collect());
        let agent = ReActAgent::builder().name("Friday").model(Arc::new(model)).build()?;
        Ok(Arc::new(agent))
    };
    let executor = Arc::new(AgentScopeExecutor::new(Arc::new(factory)));
    let card = AgentCard::new("Friday", "test agent", base.as_str());
    tokio::spawn(async move {
        let _ = serve_on(listener, card, executor).await;
    });
    base
}

#[tokio::test]
async fn fetch_card_and_send_message() {
    let base = start_server(&["first answer"]).await;

    let card = A2aClient::fetch_agent_card(&base).await.unwrap();
    assert_eq!(card.name, "Friday");

    let client = A2aClient::from_card(&card).unwrap();
    let result = client
        .send_message(MessageSendParams::new(Message::user_text("hello")))
        .await
        .unwrap();
    let SendMessageResult::Task(task) = result else {
        panic!("expected a task");
    };
    assert_eq!(task.status.state, TaskState::Completed);

    let fetched = client.get_task(&task.id, Some(1)).await.unwrap();
    assert_eq!(fetched.history.len(), 1);

    let err = client.cancel_task(&task.id).await.unwrap_err();
    assert!(err.to_string().contains("-32002"));
}

#[tokio::test]
async fn streaming_client_sees_snapshot_then_final() {
    let base = start_server(&["streamed"]).await;
    let client = A2aClient::new(base).unwrap();

    let mut rx = client
        .send_message_streaming(MessageSendParams::new(Message::user_text("go")))
        .await
        .unwrap();
    let mut items = Vec::new();
    while let Some(item) = rx.recv().await {
        items.push(item.unwrap());
    }
    assert!(matches!(items.first(), Some(StreamResponse::Task(_))));
    assert!(items.last().unwrap().is_final());
    assert!(
        items
            .iter()
            .any(|i| matches!(i, StreamResponse::ArtifactUpdate(u) if u.last_chunk))
    );
}

#[tokio::test]
async fn remote_agent_keeps_its_context() {
    let base = start_server(&["one", "two"]).await;
    let agent = A2aAgent::connect(&base).await.unwrap();
    assert_eq!(agent.name(), "Friday");

    let first = agent
        .call(vec![agentscope_core::Msg::user("user", "hi")])
        .await
        .unwrap();
    assert_eq!(first.text_content(), "one");
    let context = agent.context_id().unwrap();

    // Same context, so the same server-side agent answers with its next reply
    let second = agent
        .call(vec![agentscope_core::Msg::user("user", "again")])
        .await
        .unwrap();
    assert_eq!(second.text_content(), "two");
    assert_eq!(agent.context_id().unwrap(), context);
}

#[tokio::test]
async fn remote_agent_streams_to_done() {
    let base = start_server(&["streamed reply"]).await;
    let agent = A2aAgent::connect(&base).await.unwrap();

    let mut rx = agent
        .stream(vec![agentscope_core::Msg::user("user", "hi")])
        .await
        .unwrap();
    let mut last = None;
    while let Some(event) = rx.recv().await {
        last = Some(event);
    }
    match last {
        Some(AgentEvent::Done { msg, .. }) => assert_eq!(msg.text_content(), "streamed reply"),
        other => panic!("expected Done, got {other:?}"),
    }
}
