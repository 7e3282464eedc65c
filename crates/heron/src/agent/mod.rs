//! The agent facade and its ReAct executor.
//!
//! A [`ReActAgent`] alternates reasoning (one streaming model call) with
//! acting (dispatching the assembled tool call) until the model stops
//! calling registered tools or the iteration bound is reached. `stream`
//! surfaces every intermediate message; `reply` wraps the same loop with
//! pre/post hooks and folds the final round into a single assistant
//! message.

mod accumulator;
mod hooks;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::errors::AgentError;
use crate::format::{ChatFormatter, Formatter};
use crate::memory::Memory;
use crate::message::{object_id, ContentBlock, Msg, Role, ToolResultBlock, ToolUseBlock};
use crate::model::{ChatModel, GenerateOptions};
use crate::tool::{Tool, ToolExecutor, Toolkit};

pub use accumulator::ToolCallAccumulator;
pub use hooks::{HookContext, HookManager, PostReplyHook, PreReplyHook};

/// A lazy stream of every intermediate message an agent emits.
pub type MsgStream = BoxStream<'static, Result<Msg>>;

/// One message or several, accepted anywhere an agent takes input.
#[derive(Debug, Clone)]
pub struct ReplyInput(Vec<Msg>);

impl ReplyInput {
    pub fn into_messages(self) -> Vec<Msg> {
        self.0
    }
}

impl From<Msg> for ReplyInput {
    fn from(msg: Msg) -> Self {
        ReplyInput(vec![msg])
    }
}

impl From<Vec<Msg>> for ReplyInput {
    fn from(msgs: Vec<Msg>) -> Self {
        ReplyInput(msgs)
    }
}

/// Public surface of an agent: a named facade over a memory log, a model
/// adapter, and a tool registry.
#[async_trait]
pub trait Agent: Send + Sync {
    fn id(&self) -> &str;

    fn name(&self) -> &str;

    /// Run the full loop and resolve to one final assistant message.
    async fn reply(&self, input: ReplyInput) -> Result<Msg>;

    /// Lazily emit every intermediate message in emission order.
    fn stream(&self, input: ReplyInput) -> MsgStream;

    /// Record messages into memory without generating a response.
    fn observe(&self, input: ReplyInput);
}

/// ReAct agent: reason with the model, act with the tools, repeat.
#[derive(Clone)]
pub struct ReActAgent {
    id: String,
    name: String,
    sys_prompt: Option<String>,
    model: Arc<dyn ChatModel>,
    formatter: Arc<dyn Formatter>,
    toolkit: Toolkit,
    memory: Memory,
    hooks: HookManager,
    options: GenerateOptions,
    max_iters: usize,
    parallel_tool_calls: bool,
    tool_timeout: Option<Duration>,
    cancel: CancellationToken,
}

impl ReActAgent {
    pub fn builder() -> ReActAgentBuilder {
        ReActAgentBuilder::new()
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn toolkit(&self) -> &Toolkit {
        &self.toolkit
    }

    pub fn hooks(&self) -> &HookManager {
        &self.hooks
    }

    /// Token that cancels the model stream and in-flight tool dispatch of
    /// any running call.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn register_tool<T: Tool + 'static>(&self, tool: T) {
        self.toolkit.register(tool);
    }

    fn prepare_messages(&self) -> Vec<Msg> {
        let mut messages = Vec::new();
        if let Some(prompt) = &self.sys_prompt {
            if !prompt.trim().is_empty() {
                messages.push(Msg::system("system", prompt.clone()));
            }
        }
        messages.extend(self.memory.messages());
        messages
    }

    fn check_cancelled(&self) -> Result<(), AgentError> {
        if self.cancel.is_cancelled() {
            Err(AgentError::Interrupted)
        } else {
            Ok(())
        }
    }

    /// The loop is done when the last message carries no tool call for a
    /// registered tool. A call to an unregistered name is the model
    /// finishing via a finish-function and also terminates.
    fn is_finished(&self, msg: &Msg) -> bool {
        extract_tool_calls(msg)
            .iter()
            .all(|call| !self.toolkit.contains(&call.name))
    }

    fn run_loop(&self, input: Vec<Msg>) -> MsgStream {
        let this = self.clone();
        Box::pin(async_stream::try_stream! {
            for msg in input {
                this.memory.append(msg);
            }

            for iter in 0..this.max_iters {
                this.check_cancelled()?;
                debug!(iter, agent = %this.name, "reasoning");

                // Reasoning: stream chunks to the caller while feeding
                // tool-use fragments to the accumulator.
                let wire = this.formatter.format(&this.prepare_messages());
                let schemas = this.toolkit.schemas();
                let mut chunks = this
                    .model
                    .stream(wire, schemas, this.options.clone())
                    .await?;
                let mut acc = ToolCallAccumulator::new();
                let mut round: Vec<Msg> = Vec::new();

                while let Some(chunk) = chunks.next().await {
                    this.check_cancelled()?;
                    let chunk = chunk?;
                    for block in chunk.content {
                        match block {
                            ContentBlock::ToolUse(fragment) => {
                                acc.observe_response(&chunk.id);
                                acc.merge(&fragment);
                            }
                            block @ (ContentBlock::Text { .. }
                            | ContentBlock::Thinking { .. }) => {
                                let msg = Msg::with_id(
                                    if chunk.id.is_empty() {
                                        object_id("msg")
                                    } else {
                                        chunk.id.clone()
                                    },
                                    this.name.clone(),
                                    Role::Assistant,
                                    block,
                                );
                                round.push(msg.clone());
                                yield msg;
                            }
                            _ => {}
                        }
                    }
                }

                // On stream end, a pending tool call becomes one assistant
                // message; otherwise the streamed text is aggregated.
                let pending_id = acc.msg_id().map(str::to_string);
                if let Some(call) = acc.finish() {
                    let msg = Msg::with_id(
                        pending_id.unwrap_or_else(|| object_id("msg")),
                        this.name.clone(),
                        Role::Assistant,
                        ContentBlock::ToolUse(call),
                    );
                    this.memory.append(msg.clone());
                    yield msg;
                } else if let Some(msg) = aggregate_round(&this.name, &round) {
                    this.memory.append(msg);
                }

                let Some(last) = this.memory.last() else {
                    break;
                };
                if this.is_finished(&last) {
                    break;
                }

                // Acting: dispatch the batch, append one tool-result
                // message per response in input order.
                let calls = extract_tool_calls(&last);
                let executor = {
                    let mut executor = ToolExecutor::new(this.toolkit.clone())
                        .with_cancellation(this.cancel.clone());
                    if let Some(timeout) = this.tool_timeout {
                        executor = executor.with_timeout(timeout);
                    }
                    executor
                };
                let responses = executor
                    .dispatch(&calls, this.parallel_tool_calls)
                    .await;
                for (call, response) in calls.iter().zip(responses) {
                    let msg = Msg::tool(
                        this.name.clone(),
                        ContentBlock::ToolResult(ToolResultBlock {
                            id: call.id.clone(),
                            name: call.name.clone(),
                            output: Box::new(ContentBlock::text(response.text_content())),
                        }),
                    );
                    this.memory.append(msg.clone());
                    yield msg;
                }
            }
        })
    }
}

#[async_trait]
impl Agent for ReActAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn reply(&self, input: ReplyInput) -> Result<Msg> {
        let ctx = HookContext {
            agent_id: self.id.clone(),
            agent_name: self.name.clone(),
        };
        let pre_hooks = self.hooks.pre_reply_snapshot();
        let post_hooks = self.hooks.post_reply_snapshot();

        let args = hooks::apply_pre_reply(&pre_hooks, &ctx, input.into_messages());
        let mut stream = self.run_loop(args.clone());
        let mut collected = Vec::new();
        while let Some(item) = stream.next().await {
            let item = item?;
            collected.push(hooks::apply_post_reply(&post_hooks, &ctx, &args, item));
        }
        Ok(merge_last_round(&self.name, &collected))
    }

    fn stream(&self, input: ReplyInput) -> MsgStream {
        self.run_loop(input.into_messages())
    }

    fn observe(&self, input: ReplyInput) {
        self.memory.extend(input.into_messages());
    }
}

/// Aggregate one reasoning round for memory: the tool-use message wins if
/// present, otherwise the text pieces merge into one assistant message.
/// Thinking commentary stays on the stream only.
fn aggregate_round(name: &str, round: &[Msg]) -> Option<Msg> {
    if round.is_empty() {
        return None;
    }
    if let Some(msg) = round
        .iter()
        .rev()
        .find(|m| m.content.as_tool_use().is_some())
    {
        return Some(msg.clone());
    }

    let mut combined = String::new();
    for msg in round {
        if let ContentBlock::Text { text } = &msg.content {
            combined.push_str(text);
        }
    }
    if combined.is_empty() {
        return Some(round[round.len() - 1].clone());
    }
    Some(Msg::assistant(name, ContentBlock::text(combined)))
}

/// Fold the collected stream into the final reply: starting from the last
/// tool-use message (or the beginning when there is none), concatenate the
/// text of every Text block. Thinking blocks are omitted.
fn merge_last_round(name: &str, collected: &[Msg]) -> Msg {
    let start = collected
        .iter()
        .rposition(|m| m.content.as_tool_use().is_some())
        .unwrap_or(0);

    let mut combined = String::new();
    for msg in &collected[start..] {
        if let ContentBlock::Text { text } = &msg.content {
            combined.push_str(text);
        }
    }
    Msg::assistant(name, ContentBlock::text(combined))
}

fn extract_tool_calls(msg: &Msg) -> Vec<ToolUseBlock> {
    match msg.content.as_tool_use() {
        Some(call) => vec![call.clone()],
        None => Vec::new(),
    }
}

/// Builder for [`ReActAgent`]. A model is required; everything else has
/// working defaults.
pub struct ReActAgentBuilder {
    name: String,
    sys_prompt: Option<String>,
    model: Option<Arc<dyn ChatModel>>,
    formatter: Option<Arc<dyn Formatter>>,
    toolkit: Toolkit,
    memory: Memory,
    options: GenerateOptions,
    max_iters: usize,
    parallel_tool_calls: bool,
    tool_timeout: Option<Duration>,
    cancel: Option<CancellationToken>,
}

impl ReActAgentBuilder {
    fn new() -> Self {
        Self {
            name: "assistant".to_string(),
            sys_prompt: None,
            model: None,
            formatter: None,
            toolkit: Toolkit::new(),
            memory: Memory::new(),
            options: GenerateOptions::default(),
            max_iters: 10,
            parallel_tool_calls: false,
            tool_timeout: None,
            cancel: None,
        }
    }

    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }

    pub fn sys_prompt<S: Into<String>>(mut self, prompt: S) -> Self {
        self.sys_prompt = Some(prompt.into());
        self
    }

    pub fn model<M: ChatModel + 'static>(mut self, model: M) -> Self {
        self.model = Some(Arc::new(model));
        self
    }

    pub fn formatter<F: Formatter + 'static>(mut self, formatter: F) -> Self {
        self.formatter = Some(Arc::new(formatter));
        self
    }

    pub fn toolkit(mut self, toolkit: Toolkit) -> Self {
        self.toolkit = toolkit;
        self
    }

    pub fn memory(mut self, memory: Memory) -> Self {
        self.memory = memory;
        self
    }

    pub fn options(mut self, options: GenerateOptions) -> Self {
        self.options = options;
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

    pub fn tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = Some(timeout);
        self
    }

    pub fn cancellation_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn build(self) -> Result<ReActAgent> {
        let model = self
            .model
            .ok_or_else(|| AgentError::Internal("agent requires a model".to_string()))?;
        Ok(ReActAgent {
            id: object_id("agent"),
            name: self.name,
            sys_prompt: self.sys_prompt,
            model,
            formatter: self
                .formatter
                .unwrap_or_else(|| Arc::new(ChatFormatter::new())),
            toolkit: self.toolkit,
            memory: self.memory,
            hooks: HookManager::new(),
            options: self.options,
            max_iters: self.max_iters,
            parallel_tool_calls: self.parallel_tool_calls,
            tool_timeout: self.tool_timeout,
            cancel: self.cancel.unwrap_or_default(),
        })
    }
}
