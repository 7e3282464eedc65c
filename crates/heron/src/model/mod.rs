//! Model adapters: open a streaming chat call, parse provider output into
//! typed content blocks.

mod anthropic;
mod mock;
mod openai;
mod sse;

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::message::ContentBlock;

pub use anthropic::{AnthropicChatModel, AnthropicConfig};
pub use mock::MockChatModel;
pub use openai::{OpenAiChatModel, OpenAiConfig, FRAGMENT_NAME};

/// Token usage reported by the provider, plus wall-clock seconds for the
/// call as observed by the adapter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub time: f64,
}

/// One unit of incremental model output: the content blocks that arrived
/// since the previous chunk. The final chunk may carry usage totals.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatResponse {
    pub id: String,
    pub content: Vec<ContentBlock>,
    pub usage: Option<ChatUsage>,
}

impl ChatResponse {
    pub fn new<S: Into<String>>(id: S, content: Vec<ContentBlock>) -> Self {
        ChatResponse {
            id: id.into(),
            content,
            usage: None,
        }
    }
}

/// Sampling knobs forwarded to the provider; unset fields mean provider
/// defaults. `enable_thinking` implies streaming, which is always on here.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerateOptions {
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub max_tokens: Option<u32>,
    pub frequency_penalty: Option<f64>,
    pub presence_penalty: Option<f64>,
    pub enable_thinking: Option<bool>,
}

impl GenerateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn temperature(mut self, value: f64) -> Self {
        self.temperature = Some(value);
        self
    }

    pub fn top_p(mut self, value: f64) -> Self {
        self.top_p = Some(value);
        self
    }

    pub fn max_tokens(mut self, value: u32) -> Self {
        self.max_tokens = Some(value);
        self
    }

    pub fn frequency_penalty(mut self, value: f64) -> Self {
        self.frequency_penalty = Some(value);
        self
    }

    pub fn presence_penalty(mut self, value: f64) -> Self {
        self.presence_penalty = Some(value);
        self
    }

    pub fn enable_thinking(mut self, value: bool) -> Self {
        self.enable_thinking = Some(value);
        self
    }
}

/// Schema of a tool as advertised to the model. `parameters` is a
/// JSON-Schema object with `type`, `properties`, and `required`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolSchema {
    pub fn new<N, D>(name: N, description: D, parameters: Value) -> Self
    where
        N: Into<String>,
        D: Into<String>,
    {
        ToolSchema {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// A finite stream of response chunks, terminated by completion or error.
/// Dropping the stream releases the underlying call.
pub type ChatStream = BoxStream<'static, Result<ChatResponse>>;

/// A chat model endpoint that can be driven through a streaming call.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Open a streaming call with formatted wire messages, tool schemas,
    /// and generation options.
    async fn stream(
        &self,
        messages: Vec<Value>,
        tools: Vec<ToolSchema>,
        options: GenerateOptions,
    ) -> Result<ChatStream>;
}
