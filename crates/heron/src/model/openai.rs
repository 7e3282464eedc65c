use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::warn;

use crate::message::{object_id, ContentBlock, ToolUseBlock};
use crate::model::sse::{Chunks, Sse};
use crate::model::{ChatModel, ChatResponse, ChatStream, ChatUsage, GenerateOptions, ToolSchema};

/// Placeholder name carried by tool-use fragments after the first; the
/// accumulator recognizes it and keeps the name from the opening fragment.
pub const FRAGMENT_NAME: &str = "__fragment__";

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub host: String,
    pub api_key: String,
    pub model: String,
}

/// Streaming adapter for OpenAI-compatible chat-completions endpoints.
pub struct OpenAiChatModel {
    client: Client,
    config: OpenAiConfig,
}

impl OpenAiChatModel {
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(600))
            .build()?;
        Ok(Self { client, config })
    }

    fn build_payload(
        &self,
        messages: Vec<Value>,
        tools: &[ToolSchema],
        options: &GenerateOptions,
    ) -> Value {
        let mut payload = json!({
            "model": self.config.model,
            "messages": messages,
            "stream": true,
            "stream_options": { "include_usage": true },
        });

        if !tools.is_empty() {
            let tools_spec: Vec<Value> = tools
                .iter()
                .map(|tool| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": tool.name,
                            "description": tool.description,
                            "parameters": tool.parameters,
                        },
                    })
                })
                .collect();
            payload["tools"] = Value::Array(tools_spec);
        }

        let body = payload.as_object_mut().expect("payload is an object");
        if let Some(temperature) = options.temperature {
            body.insert("temperature".to_string(), json!(temperature));
        }
        if let Some(top_p) = options.top_p {
            body.insert("top_p".to_string(), json!(top_p));
        }
        if let Some(max_tokens) = options.max_tokens {
            body.insert("max_tokens".to_string(), json!(max_tokens));
        }
        if let Some(frequency_penalty) = options.frequency_penalty {
            body.insert("frequency_penalty".to_string(), json!(frequency_penalty));
        }
        if let Some(presence_penalty) = options.presence_penalty {
            body.insert("presence_penalty".to_string(), json!(presence_penalty));
        }
        if options.enable_thinking == Some(true) {
            body.insert("enable_thinking".to_string(), json!(true));
        }
        payload
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    async fn stream(
        &self,
        messages: Vec<Value>,
        tools: Vec<ToolSchema>,
        options: GenerateOptions,
    ) -> Result<ChatStream> {
        let url = format!(
            "{}/v1/chat/completions",
            self.config.host.trim_end_matches('/')
        );
        let payload = self.build_payload(messages, &tools, &options);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Accept", "text/event-stream")
            .json(&payload)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {}
            status if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() >= 500 => {
                return Err(anyhow!("Server error: {}", status));
            }
            status => {
                return Err(anyhow!("Request failed: {}", status));
            }
        }

        let started = Instant::now();
        let mut sse = Sse::new(Chunks::from_response(response));
        let stream = async_stream::stream! {
            loop {
                match sse.next_event().await {
                    Ok(Some(data)) => {
                        if data == "[DONE]" {
                            break;
                        }
                        match serde_json::from_str::<ChatCompletionChunk>(&data) {
                            Ok(chunk) => {
                                if let Some(response) = chunk_to_response(chunk, started) {
                                    yield Ok(response);
                                }
                            }
                            Err(err) => {
                                warn!("skipping malformed stream chunk: {err}");
                            }
                        }
                    }
                    Ok(None) => break,
                    Err(err) => {
                        yield Err(anyhow!("model stream failed: {err:?}"));
                        break;
                    }
                }
            }
        };
        Ok(Box::pin(stream))
    }
}

#[derive(Debug, Clone, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    id: String,
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCallDelta>>,
}

#[derive(Debug, Clone, Deserialize)]
struct ToolCallDelta {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<FunctionDelta>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

/// Convert one parsed chunk into a [`ChatResponse`]. Tool-call deltas that
/// carry a function name open a new call; name-less deltas become
/// placeholder fragments that only extend the raw argument buffer.
fn chunk_to_response(chunk: ChatCompletionChunk, started: Instant) -> Option<ChatResponse> {
    let mut blocks: Vec<ContentBlock> = Vec::new();

    if let Some(choice) = chunk.choices.into_iter().next() {
        let delta = choice.delta;
        if let Some(text) = delta.reasoning_content.filter(|t| !t.is_empty()) {
            blocks.push(ContentBlock::thinking(text));
        }
        if let Some(text) = delta.content.filter(|t| !t.is_empty()) {
            blocks.push(ContentBlock::text(text));
        }
        for call in delta.tool_calls.unwrap_or_default() {
            let function = call.function.unwrap_or_default();
            let raw = function.arguments.filter(|a| !a.is_empty());
            match function.name.filter(|n| !n.is_empty()) {
                Some(name) => {
                    let input = raw
                        .as_deref()
                        .and_then(|args| serde_json::from_str::<Map<String, Value>>(args).ok())
                        .unwrap_or_default();
                    blocks.push(ContentBlock::ToolUse(ToolUseBlock {
                        id: call.id.filter(|i| !i.is_empty()).unwrap_or_else(|| object_id("tool_call")),
                        name,
                        input,
                        raw,
                    }));
                }
                None => {
                    if let Some(raw) = raw {
                        blocks.push(ContentBlock::ToolUse(ToolUseBlock {
                            id: String::new(),
                            name: FRAGMENT_NAME.to_string(),
                            input: Map::new(),
                            raw: Some(raw),
                        }));
                    }
                }
            }
        }
    }

    let usage = chunk.usage.map(|u| ChatUsage {
        input_tokens: u.prompt_tokens,
        output_tokens: u.completion_tokens,
        time: started.elapsed().as_secs_f64(),
    });

    if blocks.is_empty() && usage.is_none() {
        return None;
    }
    Some(ChatResponse {
        id: chunk.id,
        content: blocks,
        usage,
    })
}
