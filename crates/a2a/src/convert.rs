//! Conversion between AgentScope messages and A2A messages, tasks and
//! artifacts.
//!
//! Block mapping (`Msg` → `Message`):
//!
//! | content block | A2A part | `metadata.type` |
//! |---|---|---|
//! | text | text | – |
//! | thinking | text | `thinking` |
//! | image / audio / video | file (url → uri, base64 → bytes) | `image` / `audio` / `video` |
//! | tool use | data `{id, name, input}` | `tool_use` |
//! | tool result | data `{id, name, output, is_error}` | `tool_result` |
//!
//! The reverse direction undoes the mapping; data parts it does not
//! recognize become text holding their JSON.

use agentscope_core::{ContentBlock, Msg, MsgRole, Source};
use serde_json::json;

use crate::types::{
    Artifact, FileContent, Message, Metadata, Part, Role, Task, TaskArtifactUpdateEvent,
};

const NAME_KEY: &str = "name";
const MSG_ID_KEY: &str = "msg_id";

fn block_to_part(block: &ContentBlock) -> Part {
    match block {
        ContentBlock::Text { text } => Part::text(text.as_str()),
        ContentBlock::Thinking { thinking } => Part::text(thinking.as_str()).typed("thinking"),
        ContentBlock::Image { source } => media_part(source).typed("image"),
        ContentBlock::Audio { source } => media_part(source).typed("audio"),
        ContentBlock::Video { source } => media_part(source).typed("video"),
        ContentBlock::ToolUse { id, name, input } => {
            Part::data(json!({"id": id, "name": name, "input": input})).typed("tool_use")
        }
        ContentBlock::ToolResult {
            id,
            name,
            output,
            is_error,
        } => Part::data(json!({
            "id": id,
            "name": name,
            "output": output,
            "is_error": is_error,
        }))
        .typed("tool_result"),
    }
}

fn media_part(source: &Source) -> Part {
    let file = match source {
        Source::Url { url } => FileContent {
            uri: Some(url.clone()),
            ..Default::default()
        },
        Source::Base64 { media_type, data } => FileContent {
            mime_type: Some(media_type.clone()),
            bytes: Some(data.clone()),
            ..Default::default()
        },
    };
    Part::File { file, metadata: None }
}

/// Convert a [`Msg`] to an A2A [`Message`].
pub fn msg_to_message(msg: &Msg) -> Message {
    let role = match msg.role {
        MsgRole::Assistant => Role::Agent,
        _ => Role::User,
    };
    let mut metadata = Metadata::new();
    metadata.insert(NAME_KEY.into(), json!(msg.name));
    metadata.insert(MSG_ID_KEY.into(), json!(msg.id));

    let mut message = Message::new(role, msg.content.iter().map(block_to_part).collect());
    message.metadata = Some(metadata);
    message
}

/// Convert several messages into one A2A message, as sent to a remote agent.
///
/// A2A carries one message per request, so the parts are concatenated.
/// The last message decides role and name.
pub fn msgs_to_message(msgs: &[Msg]) -> Message {
    let mut message = match msgs.last() {
        Some(last) => msg_to_message(last),
        None => Message::new(Role::User, Vec::new()),
    };
    if msgs.len() > 1 {
        message.parts = msgs
            .iter()
            .flat_map(|m| m.content.iter().map(block_to_part))
            .collect();
    }
    message
}

fn part_to_block(part: &Part) -> ContentBlock {
    match part {
        Part::Text { text, .. } if part.part_type() == Some("thinking") => ContentBlock::thinking(text.as_str()),
        Part::Text { text, .. } => ContentBlock::text(text.as_str()),
        Part::File { file, .. } => file_to_block(file, part.part_type()),
        Part::Data { data, .. } => data_to_block(data, part.part_type()),
    }
}

fn file_to_block(file: &FileContent, part_type: Option<&str>) -> ContentBlock {
    let source = match (&file.uri, &file.bytes) {
        (Some(uri), _) => Source::Url { url: uri.clone() },
        (None, Some(bytes)) => Source::Base64 {
            media_type: file
                .mime_type
                .clone()
                .unwrap_or_else(|| "application/octet-stream".into()),
            data: bytes.clone(),
        },
        (None, None) => {
            return ContentBlock::text(format!("[file: {}]", file.name.as_deref().unwrap_or("unnamed")));
        }
    };
    let kind = part_type.map(str::to_string).unwrap_or_else(|| {
        let mime = file.mime_type.as_deref().unwrap_or_default();
        mime.split('/').next().unwrap_or_default().to_string()
    });
    match kind.as_str() {
        "audio" => ContentBlock::Audio { source },
        "video" => ContentBlock::Video { source },
        _ => ContentBlock::Image { source },
    }
}

fn data_to_block(data: &serde_json::Value, part_type: Option<&str>) -> ContentBlock {
    let str_field = |key: &str| data.get(key).and_then(|v| v.as_str()).map(str::to_string);
    match (part_type, str_field("id"), str_field("name")) {
        (Some("tool_use"), Some(id), Some(name)) => ContentBlock::ToolUse {
            id,
            name,
            input: data.get("input").cloned().unwrap_or_else(|| json!({})),
        },
        (Some("tool_result"), Some(id), Some(name)) => {
            let output = data
                .get("output")
                .and_then(|o| serde_json::from_value::<Vec<ContentBlock>>(o.clone()).ok())
                .unwrap_or_default();
            let is_error = data.get("is_error").and_then(|e| e.as_bool()).unwrap_or(false);
            ContentBlock::tool_result(id, name, output, is_error)
        }
        _ => ContentBlock::text(data.to_string()),
    }
}

/// Convert an A2A [`Message`] to a [`Msg`].
///
/// The name comes from `metadata.name`, else `default_name`.
pub fn message_to_msg(message: &Message, default_name: &str) -> Msg {
    let meta = message.metadata.as_ref();
    let name = meta
        .and_then(|m| m.get(NAME_KEY))
        .and_then(|v| v.as_str())
        .unwrap_or(default_name);
    let role = match message.role {
        Role::Agent => MsgRole::Assistant,
        Role::User => MsgRole::User,
    };
    let mut msg = Msg::new(name, role, message.parts.iter().map(part_to_block).collect());
    if let Some(id) = meta.and_then(|m| m.get(MSG_ID_KEY)).and_then(|v| v.as_str()) {
        msg.id = id.to_string();
    }
    msg
}

/// The reply a finished task carries.
///
/// Artifact parts in order; else the status message; else the last agent
/// message in history. `None` when the task holds no content at all.
pub fn task_to_msg(task: &Task, default_name: &str) -> Option<Msg> {
    let parts: Vec<&Part> = task.artifacts.iter().flat_map(|a| a.parts.iter()).collect();
    if !parts.is_empty() {
        let content = parts.into_iter().map(part_to_block).collect();
        return Some(Msg::new(default_name, MsgRole::Assistant, content));
    }
    if let Some(message) = &task.status.message {
        return Some(message_to_msg(message, default_name));
    }
    task.history
        .iter()
        .rev()
        .find(|m| m.role == Role::Agent)
        .map(|m| message_to_msg(m, default_name))
}

/// Apply an artifact update to `artifacts`.
///
/// With `append`, the parts extend the artifact with the same id; adjacent
/// plain text parts are joined so streamed text reads as one part.
/// Otherwise the artifact is added or replaced.
pub fn merge_artifact(artifacts: &mut Vec<Artifact>, update: &TaskArtifactUpdateEvent) {
    let incoming = &update.artifact;
    let Some(existing) = artifacts
        .iter_mut()
        .find(|a| a.artifact_id == incoming.artifact_id)
    else {
        artifacts.push(incoming.clone());
        return;
    };

    if !update.append {
        *existing = incoming.clone();
        return;
    }
    for part in &incoming.parts {
        match (existing.parts.last_mut(), part) {
            (
                Some(Part::Text {
                    text: last,
                    metadata: None,
                }),
                Part::Text { text, metadata: None },
            ) => last.push_str(text),
            _ => existing.parts.push(part.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TaskState, TaskStatus};

    fn roundtrip(msg: &Msg) -> Msg {
        message_to_msg(&msg_to_message(msg), "fallback")
    }

    #[test]
    fn text_and_thinking() {
        let msg = Msg::new(
            "Friday",
            MsgRole::Assistant,
            vec![ContentBlock::thinking("hmm"), ContentBlock::text("42")],
        );
        let message = msg_to_message(&msg);
        assert_eq!(message.role, Role::Agent);
        assert_eq!(message.parts[0].part_type(), Some("thinking"));
        assert_eq!(message.parts[1], Part::text("42"));

        let back = roundtrip(&msg);
        assert_eq!(back.name, "Friday");
        assert_eq!(back.id, msg.id);
        assert_eq!(back.role, MsgRole::Assistant);
        assert_eq!(back.content, msg.content);
    }

    #[test]
    fn media_sources() {
        let msg = Msg::new(
            "user",
            MsgRole::User,
            vec![
                ContentBlock::Image {
                    source: Source::Url {
                        url: "https://x/cat.png".into(),
                    },
                },
                ContentBlock::Audio {
                    source: Source::Base64 {
                        media_type: "audio/wav".into(),
                        data: "UklGR".into(),
                    },
                },
            ],
        );
        let message = msg_to_message(&msg);
        match &message.parts[0] {
            Part::File { file, .. } => assert_eq!(file.uri.as_deref(), Some("https://x/cat.png")),
            other => panic!("expected file part, got {other:?}"),
        }
        match &message.parts[1] {
            Part::File { file, .. } => {
                assert_eq!(file.bytes.as_deref(), Some("UklGR"));
                assert_eq!(file.mime_type.as_deref(), Some("audio/wav"));
            }
            other => panic!("expected file part, got {other:?}"),
        }
        assert_eq!(roundtrip(&msg).content, msg.content);
    }

    #[test]
    fn untyped_file_uses_mime_type() {
        let message = Message::new(
            Role::User,
            vec![Part::File {
                file: FileContent {
                    mime_type: Some("video/mp4".into()),
                    uri: Some("https://x/clip.mp4".into()),
                    ..Default::default()
                },
                metadata: None,
            }],
        );
        let msg = message_to_msg(&message, "user");
        assert!(matches!(msg.content[0], ContentBlock::Video { .. }));
    }

    #[test]
    fn tool_blocks_become_data_parts() {
        let msg = Msg::new(
            "Friday",
            MsgRole::Assistant,
            vec![
                ContentBlock::tool_use("t1", "view_text_file", json!({"file_path": "a.txt"})),
                ContentBlock::tool_result("t1", "view_text_file", vec![ContentBlock::text("1: hi")], false),
            ],
        );
        let message = msg_to_message(&msg);
        assert_eq!(message.parts[0].part_type(), Some("tool_use"));
        assert_eq!(message.parts[1].part_type(), Some("tool_result"));
        assert_eq!(roundtrip(&msg).content, msg.content);
    }

    #[test]
    fn unknown_data_becomes_json_text() {
        let message = Message::new(Role::Agent, vec![Part::data(json!({"temp": 21}))]);
        let msg = message_to_msg(&message, "weather");
        assert_eq!(msg.name, "weather");
        assert_eq!(msg.text_content(), r#"{"temp":21}"#);
    }

    #[test]
    fn several_msgs_are_concatenated() {
        let msgs = vec![Msg::user("alice", "first"), Msg::user("alice", "second")];
        let message = msgs_to_message(&msgs);
        assert_eq!(message.text(), "first\nsecond");
        assert_eq!(message.metadata.unwrap()["msg_id"], json!(msgs[1].id));
    }

    #[test]
    fn task_reply_prefers_artifacts() {
        let mut task = Task::new("t1", "c1");
        task.history.push(Message::agent_text("from history"));
        assert_eq!(task_to_msg(&task, "remote").unwrap().text_content(), "from history");

        task.status = TaskStatus::new(TaskState::Completed).with_message(Message::agent_text("from status"));
        assert_eq!(task_to_msg(&task, "remote").unwrap().text_content(), "from status");

        task.artifacts.push(Artifact::new("a1", vec![Part::text("from artifact")]));
        let msg = task_to_msg(&task, "remote").unwrap();
        assert_eq!(msg.text_content(), "from artifact");
        assert_eq!(msg.name, "remote");
        assert_eq!(msg.role, MsgRole::Assistant);

        assert!(task_to_msg(&Task::new("t2", "c1"), "remote").is_none());
    }

    #[test]
    fn streamed_chunks_merge() {
        let update = |text: &str, append: bool| TaskArtifactUpdateEvent {
            task_id: "t1".into(),
            context_id: "c1".into(),
            artifact: Artifact::new("reply", vec![Part::text(text)]),
            append,
            last_chunk: false,
            metadata: None,
        };
        let mut artifacts = Vec::new();
        merge_artifact(&mut artifacts, &update("Hel", true));
        merge_artifact(&mut artifacts, &update("lo", true));
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].parts, vec![Part::text("Hello")]);

        merge_artifact(&mut artifacts, &update("Bye", false));
        assert_eq!(artifacts[0].parts, vec![Part::text("Bye")]);
    }
}
