//! ReAct agent — Reason → Act → Observe until the model answers.
//!
//! Each iteration sends the system prompt, transient hints and the
//! conversation memory to the model. Tool-use blocks in the reply are run
//! through the toolkit and their results written back to memory; a reply
//! without tool use ends the call. When `max_iters` runs out, one last
//! model call without tools asks for a summary.
//!
//! Hooks see every step and may rewrite the request, tool inputs and tool
//! results. Long-term memory and knowledge retrieval either run implicitly
//! around the loop or are exposed to the model as tools.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use agentscope_config::AgentConfig;
use agentscope_core::agent::EVENT_BUFFER;
use agentscope_core::error::{AgentError, Result};
use agentscope_core::hook::{fire, Hook, HookEvent};
use agentscope_core::knowledge::{format_documents, Knowledge, RagMode, RetrieveConfig};
use agentscope_core::memory::{LongTermMemory, LongTermMemoryMode, Memory};
use agentscope_core::model::{
    ChatModel, ChatRequest, ChatResponse, ChunkAccumulator, GenerateOptions, ToolSchema, Usage,
};
use agentscope_core::tool::{validate_input, Toolkit};
use agentscope_core::{Agent, AgentEvent, ContentBlock, Msg, MsgRole};
use agentscope_memory::InMemoryMemory;
use agentscope_tools::{RecordToMemoryTool, RetrieveFromMemoryTool, RetrieveKnowledgeTool};
use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex, Notify};
use tracing::{debug, info, warn};

/// Name of the tool that carries structured output.
pub const STRUCTURED_OUTPUT_TOOL: &str = "generate_response";

/// Metadata key holding the structured output of a reply.
pub const STRUCTURED_OUTPUT_KEY: &str = "structured_output";

const INTERRUPTED_REPLY: &str = "I noticed that you have interrupted me. What can I do for you?";

const SUMMARIZE_HINT: &str = "You have failed to generate a response within the maximum iterations. \
Now respond directly by summarizing the current situation.";

const STRUCTURED_HINT: &str =
    "Call the `generate_response` tool to give your final answer in the required format.";

/// Outcome of one agent call.
struct Outcome {
    reply: Msg,
    iterations: usize,
    usage: Usage,
}

struct Inner {
    id: String,
    name: String,
    sys_prompt: String,
    model: Arc<dyn ChatModel>,
    toolkit: Toolkit,
    memory: Arc<dyn Memory>,
    hooks: Vec<Arc<dyn Hook>>,
    max_iters: usize,
    parallel_tool_calls: bool,
    stream: bool,
    options: GenerateOptions,
    long_term: Option<(Arc<dyn LongTermMemory>, LongTermMemoryMode)>,
    recall_limit: usize,
    knowledge: Option<(Arc<dyn Knowledge>, RagMode)>,
    retrieve_config: RetrieveConfig,
    interrupted: AtomicBool,
    interrupt_signal: Notify,
    call_lock: Mutex<()>,
}

/// A reasoning-and-acting agent.
///
/// Cheap to clone; clones share memory and state.
#[derive(Clone)]
pub struct ReActAgent {
    inner: Arc<Inner>,
}

impl ReActAgent {
    pub fn builder() -> ReActAgentBuilder {
        ReActAgentBuilder::default()
    }

    pub fn memory(&self) -> Arc<dyn Memory> {
        self.inner.memory.clone()
    }

    pub fn sys_prompt(&self) -> &str {
        &self.inner.sys_prompt
    }

    /// Schemas of the tools the model is offered.
    pub fn tool_schemas(&self) -> Vec<ToolSchema> {
        self.inner.toolkit.schemas()
    }

    /// Run a call whose final answer must match `schema`.
    ///
    /// The model is offered a `generate_response` tool taking `schema` as its
    /// parameters. The call ends when that tool is called with valid input,
    /// which is placed in the reply's `metadata["structured_output"]`.
    pub async fn call_structured(&self, msgs: Vec<Msg>, schema: serde_json::Value) -> Result<Msg> {
        self.inner.run_with_hooks(msgs, Some(schema), None).await.map(|o| o.reply)
    }
}

#[async_trait]
impl Agent for ReActAgent {
    fn id(&self) -> &str {
        &self.inner.id
    }

    fn name(&self) -> &str {
        &self.inner.name
    }

    async fn call(&self, msgs: Vec<Msg>) -> Result<Msg> {
        self.inner.run_with_hooks(msgs, None, None).await.map(|o| o.reply)
    }

    async fn observe(&self, msgs: Vec<Msg>) -> Result<()> {
        if !msgs.is_empty() {
            self.inner.memory.add(msgs).await?;
        }
        Ok(())
    }

    async fn stream(&self, msgs: Vec<Msg>) -> Result<mpsc::Receiver<AgentEvent>> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let inner = self.inner.clone();
        tokio::spawn(async move {
            let event = match inner.run_with_hooks(msgs, None, Some(&tx)).await {
                Ok(outcome) => AgentEvent::Done {
                    msg: outcome.reply,
                    iterations: outcome.iterations,
                    usage: outcome.usage,
                },
                Err(e) => AgentEvent::Error {
                    message: e.to_string(),
                },
            };
            let _ = tx.send(event).await;
        });
        Ok(rx)
    }

    async fn interrupt(&self) {
        info!(agent = %self.inner.name, "Interrupt requested");
        self.inner.interrupted.store(true, Ordering::SeqCst);
        self.inner.interrupt_signal.notify_waiters();
    }
}

async fn emit(events: Option<&mpsc::Sender<AgentEvent>>, event: AgentEvent) {
    if let Some(tx) = events {
        let _ = tx.send(event).await;
    }
}

fn structured_tool(schema: &serde_json::Value) -> ToolSchema {
    ToolSchema {
        name: STRUCTURED_OUTPUT_TOOL.into(),
        description: "Generate the final response in the required structured format.".into(),
        parameters: schema.clone(),
    }
}

fn is_structured_call(block: &ContentBlock) -> bool {
    matches!(block, ContentBlock::ToolUse { name, .. } if name == STRUCTURED_OUTPUT_TOOL)
}

fn tool_results_msg(name: &str, results: Vec<ContentBlock>) -> Msg {
    Msg::new(name, MsgRole::Tool, results)
}

impl Inner {
    async fn run_with_hooks(
        &self,
        msgs: Vec<Msg>,
        structured: Option<serde_json::Value>,
        events: Option<&mpsc::Sender<AgentEvent>>,
    ) -> Result<Outcome> {
        let _guard = self.call_lock.lock().await;
        self.interrupted.store(false, Ordering::SeqCst);

        match self.run(msgs, structured, events).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                warn!(agent = %self.name, error = %e, "Agent call failed");
                let mut event = HookEvent::Error {
                    agent: self.name.clone(),
                    error: e.to_string(),
                };
                fire(&self.hooks, &mut event).await;
                Err(e)
            }
        }
    }

    fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    async fn run(
        &self,
        msgs: Vec<Msg>,
        structured: Option<serde_json::Value>,
        events: Option<&mpsc::Sender<AgentEvent>>,
    ) -> Result<Outcome> {
        let mut event = HookEvent::PreCall {
            agent: self.name.clone(),
            input: msgs,
        };
        fire(&self.hooks, &mut event).await;
        let HookEvent::PreCall { input, .. } = event else {
            return Err(self.misconfigured("pre_call hook changed the event kind"));
        };

        info!(agent = %self.name, inputs = input.len(), max_iters = self.max_iters, "Agent call started");

        if !input.is_empty() {
            self.memory.add(input.clone()).await?;
        }

        let query = input
            .iter()
            .rev()
            .find(|m| m.role == MsgRole::User)
            .or(input.last())
            .map(|m| m.text_content())
            .unwrap_or_default();
        let hints = self.retrieval_hints(&query).await;

        let mut tools = self.toolkit.schemas();
        if let Some(schema) = &structured {
            tools.push(structured_tool(schema));
        }

        let mut usage = Usage::default();
        let mut reply: Option<Msg> = None;
        let mut nudge: Option<Msg> = None;
        let mut iterations = 0;

        while iterations < self.max_iters {
            if self.is_interrupted() {
                return self.interrupted_outcome(iterations, usage).await;
            }
            iterations += 1;
            debug!(agent = %self.name, iteration = iterations, "ReAct iteration");

            // ── Reason ──
            let mut messages = self.prompt(&hints).await?;
            messages.extend(nudge.take());
            let Some(response) = self.reason(messages, tools.clone(), events).await? else {
                return self.interrupted_outcome(iterations, usage).await;
            };
            if let Some(u) = &response.usage {
                usage.add(u);
            }
            let msg = self.post_reasoning(response).await?;
            self.memory.add(vec![msg.clone()]).await?;

            let tool_uses: Vec<ContentBlock> = msg.tool_uses().into_iter().cloned().collect();
            if tool_uses.is_empty() {
                if structured.is_some() {
                    nudge = Some(Msg::user("user", STRUCTURED_HINT));
                    continue;
                }
                if msg.content.is_empty() {
                    warn!(agent = %self.name, "Model returned neither text nor tool use");
                }
                reply = Some(msg);
                break;
            }

            if self.is_interrupted() {
                self.answer_unrun(&tool_uses, "Tool call skipped: interrupted by user.", true)
                    .await?;
                return self.interrupted_outcome(iterations, usage).await;
            }

            // ── Act ──
            if let Some(schema) = &structured
                && tool_uses.iter().any(is_structured_call)
            {
                if let Some(done) = self.finish_structured(&msg, &tool_uses, schema).await? {
                    reply = Some(done);
                    break;
                }
                continue;
            }
            self.act(tool_uses, events).await?;
        }

        let reply = match reply {
            Some(reply) => reply,
            None if structured.is_some() => {
                return Err(AgentError::StructuredOutput(format!(
                    "no valid `{STRUCTURED_OUTPUT_TOOL}` call within {} iterations",
                    self.max_iters
                ))
                .into());
            }
            None => {
                warn!(agent = %self.name, max_iters = self.max_iters, "Max iterations reached, summarizing");
                let mut messages = self.prompt(&hints).await?;
                messages.push(Msg::user("user", SUMMARIZE_HINT));
                let Some(response) = self.reason(messages, Vec::new(), events).await? else {
                    return self.interrupted_outcome(iterations, usage).await;
                };
                if let Some(u) = &response.usage {
                    usage.add(u);
                }
                let msg = self.post_reasoning(response).await?;
                self.memory.add(vec![msg.clone()]).await?;
                msg
            }
        };

        if let Some((ltm, mode)) = &self.long_term
            && mode.is_static()
        {
            let mut record = input;
            record.push(reply.clone());
            if let Err(e) = ltm.record(&record).await {
                warn!(agent = %self.name, error = %e, "Failed to record long-term memory");
            }
        }

        let mut event = HookEvent::PostCall {
            agent: self.name.clone(),
            output: reply,
        };
        fire(&self.hooks, &mut event).await;
        let HookEvent::PostCall { output: reply, .. } = event else {
            return Err(self.misconfigured("post_call hook changed the event kind"));
        };

        info!(agent = %self.name, iterations, tokens = usage.total_tokens, "Agent call completed");
        Ok(Outcome {
            reply,
            iterations,
            usage,
        })
    }

    fn misconfigured(&self, reason: &str) -> agentscope_core::Error {
        AgentError::Misconfigured {
            agent: self.name.clone(),
            reason: reason.into(),
        }
        .into()
    }

    /// Long-term memories and knowledge retrieved for `query`, as system hints.
    async fn retrieval_hints(&self, query: &str) -> Vec<Msg> {
        let mut hints = Vec::new();
        if query.trim().is_empty() {
            return hints;
        }

        if let Some((ltm, mode)) = &self.long_term
            && mode.is_static()
        {
            match ltm.retrieve(query, self.recall_limit).await {
                Ok(items) if !items.is_empty() => {
                    debug!(agent = %self.name, count = items.len(), "Recalled long-term memories");
                    let lines: Vec<String> = items.iter().map(|i| format!("- {}", i.content)).collect();
                    hints.push(Msg::system(format!(
                        "<long_term_memory>\n{}\n</long_term_memory>",
                        lines.join("\n")
                    )));
                }
                Ok(_) => {}
                Err(e) => warn!(agent = %self.name, error = %e, "Long-term memory recall failed"),
            }
        }

        if let Some((knowledge, RagMode::Generic)) = &self.knowledge {
            match knowledge.retrieve(query, &self.retrieve_config).await {
                Ok(docs) if !docs.is_empty() => {
                    debug!(agent = %self.name, count = docs.len(), "Retrieved knowledge");
                    hints.push(Msg::system(format_documents(&docs)));
                }
                Ok(_) => {}
                Err(e) => warn!(agent = %self.name, error = %e, "Knowledge retrieval failed"),
            }
        }
        hints
    }

    async fn prompt(&self, hints: &[Msg]) -> Result<Vec<Msg>> {
        let mut messages = Vec::new();
        if !self.sys_prompt.is_empty() {
            messages.push(Msg::system(self.sys_prompt.as_str()));
        }
        messages.extend(hints.iter().cloned());
        messages.extend(self.memory.get_memory().await?);
        Ok(messages)
    }

    /// One model call. `None` when interrupted mid-call.
    async fn reason(
        &self,
        messages: Vec<Msg>,
        tools: Vec<ToolSchema>,
        events: Option<&mpsc::Sender<AgentEvent>>,
    ) -> Result<Option<ChatResponse>> {
        let mut request = ChatRequest::new(self.model.model_name(), messages);
        request.tools = tools;
        request.options = self.options.clone();
        request.stream = self.stream;

        let mut event = HookEvent::PreReasoning {
            agent: self.name.clone(),
            request,
        };
        fire(&self.hooks, &mut event).await;
        let HookEvent::PreReasoning { request, .. } = event else {
            return Err(self.misconfigured("pre_reasoning hook changed the event kind"));
        };

        let started = Instant::now();
        let call = async {
            if request.stream {
                self.reason_streaming(request, events).await
            } else {
                Ok(self.model.chat(request).await?)
            }
        };
        let mut response = tokio::select! {
            response = call => response?,
            _ = self.interrupt_signal.notified() => return Ok(None),
        };
        if self.is_interrupted() {
            return Ok(None);
        }

        let elapsed = started.elapsed().as_millis() as u64;
        if let Some(usage) = response.usage.as_mut()
            && usage.time_ms == 0
        {
            usage.time_ms = elapsed;
        }
        Ok(Some(response))
    }

    async fn reason_streaming(
        &self,
        request: ChatRequest,
        events: Option<&mpsc::Sender<AgentEvent>>,
    ) -> Result<ChatResponse> {
        let mut rx = self.model.stream(request).await?;
        let mut acc = ChunkAccumulator::new();
        while let Some(chunk) = rx.recv().await {
            let chunk = chunk?;
            acc.push(&chunk);
            for block in &chunk.content {
                match block {
                    ContentBlock::Text { text } if !text.is_empty() => {
                        emit(events, AgentEvent::ReasoningChunk { text: text.clone() }).await;
                    }
                    ContentBlock::Thinking { thinking } if !thinking.is_empty() => {
                        emit(events, AgentEvent::Thinking { text: thinking.clone() }).await;
                    }
                    _ => {}
                }
            }
            let done = chunk.done;
            let mut event = HookEvent::ReasoningChunk {
                agent: self.name.clone(),
                chunk,
            };
            fire(&self.hooks, &mut event).await;
            if done {
                break;
            }
        }
        Ok(acc.finish(self.model.model_name()))
    }

    async fn post_reasoning(&self, response: ChatResponse) -> Result<Msg> {
        let mut event = HookEvent::PostReasoning {
            agent: self.name.clone(),
            msg: response.into_msg(&self.name),
        };
        fire(&self.hooks, &mut event).await;
        match event {
            HookEvent::PostReasoning { msg, .. } => Ok(msg),
            _ => Err(self.misconfigured("post_reasoning hook changed the event kind")),
        }
    }

    /// Run the tool uses and record their results.
    async fn act(&self, tool_uses: Vec<ContentBlock>, events: Option<&mpsc::Sender<AgentEvent>>) -> Result<()> {
        let mut prepared = Vec::with_capacity(tool_uses.len());
        for tool_use in &tool_uses {
            let mut event = HookEvent::PreActing {
                agent: self.name.clone(),
                tool_use: tool_use.clone(),
            };
            fire(&self.hooks, &mut event).await;
            let HookEvent::PreActing { tool_use, .. } = event else {
                return self.abort_acting(&tool_uses, "pre_acting hook changed the event kind").await;
            };
            if let ContentBlock::ToolUse { id, name, input } = &tool_use {
                debug!(agent = %self.name, tool = %name, "Calling tool");
                emit(
                    events,
                    AgentEvent::ToolUse {
                        id: id.clone(),
                        name: name.clone(),
                        input: input.clone(),
                    },
                )
                .await;
            }
            prepared.push(tool_use);
        }

        let results = self.toolkit.call_many(&prepared, self.parallel_tool_calls).await;

        let mut finished = Vec::with_capacity(results.len());
        for (tool_use, result) in prepared.into_iter().zip(results) {
            let mut event = HookEvent::PostActing {
                agent: self.name.clone(),
                tool_use,
                result,
            };
            fire(&self.hooks, &mut event).await;
            let HookEvent::PostActing { result, .. } = event else {
                return self.abort_acting(&tool_uses, "post_acting hook changed the event kind").await;
            };
            if let Some(ev) = AgentEvent::from_tool_result(&result) {
                emit(events, ev).await;
            }
            finished.push(result);
        }

        self.memory.add(vec![tool_results_msg(&self.name, finished)]).await?;
        Ok(())
    }

    /// Answer every tool use with `reason` and fail the call.
    async fn abort_acting(&self, tool_uses: &[ContentBlock], reason: &str) -> Result<()> {
        self.answer_unrun(tool_uses, reason, true).await?;
        Err(self.misconfigured(reason))
    }

    /// Answer tool uses that will not run, so memory holds no orphaned calls.
    async fn answer_unrun(&self, tool_uses: &[ContentBlock], reason: &str, is_error: bool) -> Result<()> {
        let results: Vec<ContentBlock> = tool_uses
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolUse { id, name, .. } => Some(ContentBlock::tool_result(
                    id.clone(),
                    name.clone(),
                    vec![ContentBlock::text(reason)],
                    is_error,
                )),
                _ => None,
            })
            .collect();
        if !results.is_empty() {
            self.memory.add(vec![tool_results_msg(&self.name, results)]).await?;
        }
        Ok(())
    }

    /// Build the final reply from a valid `generate_response` call. Invalid
    /// input is answered with an error result so the model can retry, and
    /// `None` is returned.
    async fn finish_structured(
        &self,
        msg: &Msg,
        tool_uses: &[ContentBlock],
        schema: &serde_json::Value,
    ) -> Result<Option<Msg>> {
        let Some(ContentBlock::ToolUse { id, input, .. }) = tool_uses.iter().find(|b| is_structured_call(b))
        else {
            return Ok(None);
        };

        if let Err(e) = validate_input(schema, input) {
            debug!(agent = %self.name, error = %e, "Structured output rejected");
            let others: Vec<ContentBlock> = tool_uses
                .iter()
                .filter(|b| !matches!(b, ContentBlock::ToolUse { id: other, .. } if other == id))
                .cloned()
                .collect();
            let mut results = vec![ContentBlock::tool_result(
                id.clone(),
                STRUCTURED_OUTPUT_TOOL,
                vec![ContentBlock::text(format!("Error: {e}"))],
                true,
            )];
            results.extend(
                others
                    .iter()
                    .filter_map(|b| match b {
                        ContentBlock::ToolUse { id, name, .. } => Some(ContentBlock::tool_result(
                            id.clone(),
                            name.clone(),
                            vec![ContentBlock::text("Skipped: fix generate_response first.")],
                            true,
                        )),
                        _ => None,
                    }),
            );
            self.memory.add(vec![tool_results_msg(&self.name, results)]).await?;
            return Ok(None);
        }

        self.answer_unrun(tool_uses, "Successfully generated response.", false)
            .await?;

        let text = msg.text_content();
        let text = if text.is_empty() {
            serde_json::to_string(input).unwrap_or_default()
        } else {
            text
        };
        let reply = Msg::assistant(self.name.as_str(), text)
            .with_metadata(STRUCTURED_OUTPUT_KEY, input.clone());
        self.memory.add(vec![reply.clone()]).await?;
        Ok(Some(reply))
    }

    async fn interrupted_outcome(&self, iterations: usize, usage: Usage) -> Result<Outcome> {
        info!(agent = %self.name, iterations, "Agent call interrupted");
        let reply = Msg::assistant(self.name.as_str(), INTERRUPTED_REPLY)
            .with_metadata("interrupted", serde_json::Value::Bool(true));
        self.memory.add(vec![reply.clone()]).await?;
        self.interrupted.store(false, Ordering::SeqCst);
        Ok(Outcome {
            reply,
            iterations,
            usage,
        })
    }
}

/// Builder for [`ReActAgent`].
pub struct ReActAgentBuilder {
    name: String,
    sys_prompt: Option<String>,
    model: Option<Arc<dyn ChatModel>>,
    toolkit: Toolkit,
    memory: Option<Arc<dyn Memory>>,
    hooks: Vec<Arc<dyn Hook>>,
    max_iters: usize,
    parallel_tool_calls: bool,
    stream: bool,
    options: GenerateOptions,
    long_term: Option<(Arc<dyn LongTermMemory>, LongTermMemoryMode)>,
    recall_limit: usize,
    knowledge: Option<(Arc<dyn Knowledge>, RagMode)>,
    retrieve_config: RetrieveConfig,
}

impl Default for ReActAgentBuilder {
    fn default() -> Self {
        Self {
            name: "Friday".into(),
            sys_prompt: None,
            model: None,
            toolkit: Toolkit::new(),
            memory: None,
            hooks: Vec::new(),
            max_iters: 10,
            parallel_tool_calls: false,
            stream: false,
            options: GenerateOptions::default(),
            long_term: None,
            recall_limit: 5,
            knowledge: None,
            retrieve_config: RetrieveConfig::default(),
        }
    }
}

impl ReActAgentBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn sys_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.sys_prompt = Some(prompt.into());
        self
    }

    pub fn model(mut self, model: Arc<dyn ChatModel>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn toolkit(mut self, toolkit: Toolkit) -> Self {
        self.toolkit = toolkit;
        self
    }

    pub fn memory(mut self, memory: Arc<dyn Memory>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn hook(mut self, hook: Arc<dyn Hook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn max_iters(mut self, max_iters: usize) -> Self {
        self.max_iters = max_iters;
        self
    }

    pub fn parallel_tool_calls(mut self, parallel: bool) -> Self {
        self.parallel_tool_calls = parallel;
        self
    }

    /// Use the model's streaming API, forwarding deltas as events.
    pub fn stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn options(mut self, options: GenerateOptions) -> Self {
        self.options = options;
        self
    }

    pub fn long_term_memory(mut self, memory: Arc<dyn LongTermMemory>, mode: LongTermMemoryMode) -> Self {
        self.long_term = Some((memory, mode));
        self
    }

    pub fn recall_limit(mut self, limit: usize) -> Self {
        self.recall_limit = limit.max(1);
        self
    }

    pub fn knowledge(mut self, knowledge: Arc<dyn Knowledge>, mode: RagMode) -> Self {
        self.knowledge = Some((knowledge, mode));
        self
    }

    pub fn retrieve_config(mut self, config: RetrieveConfig) -> Self {
        self.retrieve_config = config;
        self
    }

    /// Apply the `[agent]` config section.
    pub fn config(self, config: &AgentConfig) -> Self {
        let builder = self
            .name(config.name.clone())
            .max_iters(config.max_iters)
            .parallel_tool_calls(config.parallel_tool_calls);
        if config.sys_prompt.is_empty() {
            builder
        } else {
            builder.sys_prompt(config.sys_prompt.clone())
        }
    }

    pub fn build(self) -> std::result::Result<ReActAgent, AgentError> {
        let misconfigured = |reason: &str| AgentError::Misconfigured {
            agent: self.name.clone(),
            reason: reason.into(),
        };
        let Some(model) = self.model.clone() else {
            return Err(misconfigured("no model set"));
        };
        if self.max_iters == 0 {
            return Err(misconfigured("max_iters must be at least 1"));
        }
        if self.toolkit.get(STRUCTURED_OUTPUT_TOOL).is_some() {
            return Err(misconfigured("tool name 'generate_response' is reserved"));
        }

        let mut toolkit = self.toolkit;
        if let Some((ltm, mode)) = &self.long_term
            && mode.is_agent_controlled()
        {
            toolkit.register(Arc::new(RecordToMemoryTool::new(ltm.clone(), self.name.clone())));
            toolkit.register(Arc::new(RetrieveFromMemoryTool::new(ltm.clone(), self.recall_limit)));
        }
        if let Some((knowledge, RagMode::Agentic)) = &self.knowledge {
            toolkit.register(Arc::new(RetrieveKnowledgeTool::new(
                knowledge.clone(),
                self.retrieve_config.clone(),
            )));
        }

        let sys_prompt = self
            .sys_prompt
            .unwrap_or_else(|| format!("You are a helpful assistant named {}.", self.name));

        Ok(ReActAgent {
            inner: Arc::new(Inner {
                id: uuid::Uuid::new_v4().to_string(),
                name: self.name,
                sys_prompt,
                model,
                toolkit,
                memory: self.memory.unwrap_or_else(|| Arc::new(InMemoryMemory::new())),
                hooks: self.hooks,
                max_iters: self.max_iters,
                parallel_tool_calls: self.parallel_tool_calls,
                stream: self.stream,
                options: self.options,
                long_term: self.long_term,
                recall_limit: self.recall_limit,
                knowledge: self.knowledge,
                retrieve_config: self.retrieve_config,
                interrupted: AtomicBool::new(false),
                interrupt_signal: Notify::new(),
                call_lock: Mutex::new(()),
            }),
        })
    }
}
