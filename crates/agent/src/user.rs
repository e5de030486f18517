//! User agent — a human in the loop, reading replies from an input source.

use std::sync::Arc;

use agentscope_core::error::{AgentError, Result};
use agentscope_core::{Agent, Msg};
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

/// Where a [`UserAgent`] gets its text from.
#[async_trait]
pub trait InputSource: Send + Sync {
    /// Show `prompt` and read one line. `None` at end of input.
    async fn read_line(&self, prompt: &str) -> std::result::Result<Option<String>, AgentError>;
}

/// Reads lines from standard input.
pub struct StdinInput {
    reader: Mutex<BufReader<tokio::io::Stdin>>,
}

impl StdinInput {
    pub fn new() -> Self {
        Self {
            reader: Mutex::new(BufReader::new(tokio::io::stdin())),
        }
    }
}

impl Default for StdinInput {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InputSource for StdinInput {
    async fn read_line(&self, prompt: &str) -> std::result::Result<Option<String>, AgentError> {
        let mut stdout = tokio::io::stdout();
        let io_err = |e: std::io::Error| AgentError::InputUnavailable(e.to_string());
        stdout.write_all(prompt.as_bytes()).await.map_err(io_err)?;
        stdout.flush().await.map_err(io_err)?;

        let mut line = String::new();
        let n = self.reader.lock().await.read_line(&mut line).await.map_err(io_err)?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }
}

/// An agent whose replies are typed by a person.
pub struct UserAgent {
    id: String,
    name: String,
    input: Arc<dyn InputSource>,
}

impl UserAgent {
    pub fn new(name: impl Into<String>, input: Arc<dyn InputSource>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            input,
        }
    }

    /// A user agent reading from stdin.
    pub fn stdin(name: impl Into<String>) -> Self {
        Self::new(name, Arc::new(StdinInput::new()))
    }
}

#[async_trait]
impl Agent for UserAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn call(&self, _msgs: Vec<Msg>) -> Result<Msg> {
        let prompt = format!("{}: ", self.name);
        match self.input.read_line(&prompt).await? {
            Some(text) => Ok(Msg::user(self.name.as_str(), text)),
            None => Err(AgentError::InputUnavailable("end of input".into()).into()),
        }
    }

    async fn observe(&self, _msgs: Vec<Msg>) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::ScriptedInput;
    use agentscope_core::{Error, MsgRole};

    #[tokio::test]
    async fn replies_with_typed_line() {
        let user = UserAgent::new("alice", Arc::new(ScriptedInput::new(["hello there"])));
        let msg = user.call(vec![]).await.unwrap();
        assert_eq!(msg.name, "alice");
        assert_eq!(msg.role, MsgRole::User);
        assert_eq!(msg.text_content(), "hello there");
    }

    #[tokio::test]
    async fn end_of_input_is_an_error() {
        let user = UserAgent::new("alice", Arc::new(ScriptedInput::new(Vec::<String>::new())));
        let err = user.call(vec![]).await.unwrap_err();
        assert!(matches!(err, Error::Agent(AgentError::InputUnavailable(_))));
    }
}
