use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::warn;

use crate::message::{ContentBlock, ToolUseBlock};
use crate::model::sse::{Chunks, Sse};
use crate::model::FRAGMENT_NAME;
use crate::model::{ChatModel, ChatResponse, ChatStream, ChatUsage, GenerateOptions, ToolSchema};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 1024;

#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    pub host: String,
    pub api_key: String,
    pub model: String,
}

/// Streaming adapter for the Anthropic messages API.
///
/// Anthropic streams tool calls in the other provider style: the opening
/// `content_block_start` carries the call id and name, and every
/// `input_json_delta` afterwards carries only raw argument characters.
/// Both styles meet in the same fragment shape the accumulator consumes.
pub struct AnthropicChatModel {
    client: Client,
    config: AnthropicConfig,
}

impl AnthropicChatModel {
    pub fn new(config: AnthropicConfig) -> Result<Self> {
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
        let (system, converted) = convert_messages(messages);

        let mut payload = json!({
            "model": self.config.model,
            "messages": converted,
            "max_tokens": options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "stream": true,
        });
        let body = payload.as_object_mut().expect("payload is an object");
        if !system.is_empty() {
            body.insert("system".to_string(), json!(system));
        }
        if !tools.is_empty() {
            let tools_spec: Vec<Value> = tools
                .iter()
                .map(|tool| {
                    json!({
                        "name": tool.name,
                        "description": tool.description,
                        "input_schema": tool.parameters,
                    })
                })
                .collect();
            body.insert("tools".to_string(), json!(tools_spec));
        }
        if let Some(temperature) = options.temperature {
            body.insert("temperature".to_string(), json!(temperature));
        }
        if let Some(top_p) = options.top_p {
            body.insert("top_p".to_string(), json!(top_p));
        }
        payload
    }
}

/// Map chat-completions wire messages onto the messages-API shape: system
/// content is hoisted into the `system` field, assistant `tool_calls`
/// become `tool_use` blocks, and tool-role messages become user messages
/// carrying a `tool_result` block.
fn convert_messages(messages: Vec<Value>) -> (String, Vec<Value>) {
    let mut system = String::new();
    let mut converted = Vec::new();

    for message in messages {
        let role = message
            .get("role")
            .and_then(Value::as_str)
            .unwrap_or("user");
        let text = text_of_content(message.get("content"));

        match role {
            "system" => {
                if !system.is_empty() {
                    system.push('\n');
                }
                system.push_str(&text);
            }
            "assistant" => {
                let mut blocks: Vec<Value> = Vec::new();
                if !text.is_empty() {
                    blocks.push(json!({ "type": "text", "text": text }));
                }
                if let Some(calls) = message.get("tool_calls").and_then(Value::as_array) {
                    for call in calls {
                        let arguments = call
                            .get("function")
                            .and_then(|f| f.get("arguments"))
                            .and_then(Value::as_str)
                            .unwrap_or("{}");
                        let input: Value =
                            serde_json::from_str(arguments).unwrap_or_else(|_| json!({}));
                        blocks.push(json!({
                            "type": "tool_use",
                            "id": call.get("id").cloned().unwrap_or_default(),
                            "name": call
                                .get("function")
                                .and_then(|f| f.get("name"))
                                .cloned()
                                .unwrap_or_default(),
                            "input": input,
                        }));
                    }
                }
                if blocks.is_empty() {
                    blocks.push(json!({ "type": "text", "text": "" }));
                }
                converted.push(json!({ "role": "assistant", "content": blocks }));
            }
            "tool" => {
                converted.push(json!({
                    "role": "user",
                    "content": [{
                        "type": "tool_result",
                        "tool_use_id": message
                            .get("tool_call_id")
                            .cloned()
                            .unwrap_or_default(),
                        "content": text,
                    }],
                }));
            }
            _ => {
                converted.push(json!({ "role": "user", "content": text }));
            }
        }
    }

    (system, converted)
}

fn text_of_content(content: Option<&Value>) -> String {
    match content {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Array(items)) => {
            let texts: Vec<&str> = items
                .iter()
                .filter_map(|item| item.get("text").and_then(Value::as_str))
                .collect();
            texts.join("\n")
        }
        _ => String::new(),
    }
}

#[async_trait]
impl ChatModel for AnthropicChatModel {
    async fn stream(
        &self,
        messages: Vec<Value>,
        tools: Vec<ToolSchema>,
        options: GenerateOptions,
    ) -> Result<ChatStream> {
        let url = format!("{}/v1/messages", self.config.host.trim_end_matches('/'));
        let payload = self.build_payload(messages, &tools, &options);

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
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
            let mut message_id = String::new();
            let mut input_tokens = 0u64;
            loop {
                match sse.next_event().await {
                    Ok(Some(data)) => {
                        let event = match serde_json::from_str::<StreamEvent>(&data) {
                            Ok(event) => event,
                            Err(err) => {
                                warn!("skipping malformed stream event: {err}");
                                continue;
                            }
                        };
                        match event_to_response(
                            event,
                            &mut message_id,
                            &mut input_tokens,
                            started,
                        ) {
                            EventOutcome::Chunk(response) => yield Ok(response),
                            EventOutcome::Skip => {}
                            EventOutcome::Done => break,
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

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamEvent {
    MessageStart {
        message: MessageStart,
    },
    ContentBlockStart {
        content_block: ContentBlockStart,
    },
    ContentBlockDelta {
        delta: BlockDelta,
    },
    ContentBlockStop {},
    MessageDelta {
        #[serde(default)]
        usage: Option<DeltaUsage>,
    },
    MessageStop {},
    Ping {},
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct MessageStart {
    #[serde(default)]
    id: String,
    #[serde(default)]
    usage: Option<StartUsage>,
}

#[derive(Debug, Deserialize)]
struct StartUsage {
    #[serde(default)]
    input_tokens: u64,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlockStart {
    Text {},
    Thinking {},
    ToolUse {
        #[serde(default)]
        id: String,
        #[serde(default)]
        name: String,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BlockDelta {
    TextDelta {
        text: String,
    },
    ThinkingDelta {
        thinking: String,
    },
    InputJsonDelta {
        partial_json: String,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct DeltaUsage {
    #[serde(default)]
    output_tokens: u64,
}

enum EventOutcome {
    Chunk(ChatResponse),
    Skip,
    Done,
}

fn event_to_response(
    event: StreamEvent,
    message_id: &mut String,
    input_tokens: &mut u64,
    started: Instant,
) -> EventOutcome {
    match event {
        StreamEvent::MessageStart { message } => {
            *message_id = message.id;
            if let Some(usage) = message.usage {
                *input_tokens = usage.input_tokens;
            }
            EventOutcome::Skip
        }
        StreamEvent::ContentBlockStart { content_block } => match content_block {
            ContentBlockStart::ToolUse { id, name } => {
                EventOutcome::Chunk(ChatResponse::new(
                    message_id.clone(),
                    vec![ContentBlock::ToolUse(ToolUseBlock {
                        id,
                        name,
                        input: Map::new(),
                        raw: None,
                    })],
                ))
            }
            _ => EventOutcome::Skip,
        },
        StreamEvent::ContentBlockDelta { delta } => match delta {
            BlockDelta::TextDelta { text } => EventOutcome::Chunk(ChatResponse::new(
                message_id.clone(),
                vec![ContentBlock::text(text)],
            )),
            BlockDelta::ThinkingDelta { thinking } => EventOutcome::Chunk(ChatResponse::new(
                message_id.clone(),
                vec![ContentBlock::thinking(thinking)],
            )),
            BlockDelta::InputJsonDelta { partial_json } => {
                if partial_json.is_empty() {
                    EventOutcome::Skip
                } else {
                    EventOutcome::Chunk(ChatResponse::new(
                        message_id.clone(),
                        vec![ContentBlock::ToolUse(ToolUseBlock {
                            id: String::new(),
                            name: FRAGMENT_NAME.to_string(),
                            input: Map::new(),
                            raw: Some(partial_json),
                        })],
                    ))
                }
            }
            BlockDelta::Unknown => EventOutcome::Skip,
        },
        StreamEvent::MessageDelta { usage } => match usage {
            Some(usage) => {
                let mut response = ChatResponse::new(message_id.clone(), Vec::new());
                response.usage = Some(ChatUsage {
                    input_tokens: *input_tokens,
                    output_tokens: usage.output_tokens,
                    time: started.elapsed().as_secs_f64(),
                });
                EventOutcome::Chunk(response)
            }
            None => EventOutcome::Skip,
        },
        StreamEvent::MessageStop {} => EventOutcome::Done,
        StreamEvent::ContentBlockStop {} | StreamEvent::Ping {} | StreamEvent::Unknown => {
            EventOutcome::Skip
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    async fn setup_mock_server(body: &str) -> (MockServer, AnthropicChatModel) {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "test_api_key"))
            .and(header("anthropic-version", ANTHROPIC_VERSION))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(body.to_string(), "text/event-stream"),
            )
            .mount(&server)
            .await;

        let model = AnthropicChatModel::new(AnthropicConfig {
            host: server.uri(),
            api_key: "test_api_key".to_string(),
            model: "claude-sonnet-4-20250514".to_string(),
        })
        .unwrap();
        (server, model)
    }

    async fn collect(model: &AnthropicChatModel) -> Vec<ChatResponse> {
        let stream = model
            .stream(
                vec![json!({"role": "user", "content": "hi"})],
                vec![],
                GenerateOptions::default(),
            )
            .await
            .unwrap();
        stream.map(|chunk| chunk.unwrap()).collect().await
    }

    #[tokio::test]
    async fn test_text_stream() {
        let body = concat!(
            "data: {\"type\":\"message_start\",\"message\":{\"id\":\"msg_1\",\"usage\":{\"input_tokens\":7}}}\n\n",
            "data: {\"type\":\"content_block_start\",\"content_block\":{\"type\":\"text\"}}\n\n",
            "data: {\"type\":\"content_block_delta\",\"delta\":{\"type\":\"text_delta\",\"text\":\"Hel\"}}\n\n",
            "data: {\"type\":\"content_block_delta\",\"delta\":{\"type\":\"text_delta\",\"text\":\"lo\"}}\n\n",
            "data: {\"type\":\"content_block_stop\"}\n\n",
            "data: {\"type\":\"message_delta\",\"usage\":{\"output_tokens\":2}}\n\n",
            "data: {\"type\":\"message_stop\"}\n\n",
        );
        let (_server, model) = setup_mock_server(body).await;
        let chunks = collect(&model).await;

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].id, "msg_1");
        assert_eq!(chunks[0].content, vec![ContentBlock::text("Hel")]);
        assert_eq!(chunks[1].content, vec![ContentBlock::text("lo")]);
        let usage = chunks[2].usage.as_ref().unwrap();
        assert_eq!(usage.input_tokens, 7);
        assert_eq!(usage.output_tokens, 2);
    }

    #[tokio::test]
    async fn test_tool_use_fragments() {
        let body = concat!(
            "data: {\"type\":\"message_start\",\"message\":{\"id\":\"msg_2\"}}\n\n",
            "data: {\"type\":\"content_block_start\",\"content_block\":{\"type\":\"tool_use\",\"id\":\"toolu_1\",\"name\":\"get_time\"}}\n\n",
            "data: {\"type\":\"content_block_delta\",\"delta\":{\"type\":\"input_json_delta\",\"partial_json\":\"{\\\"zone\\\":\"}}\n\n",
            "data: {\"type\":\"content_block_delta\",\"delta\":{\"type\":\"input_json_delta\",\"partial_json\":\"\\\"UTC\\\"}\"}}\n\n",
            "data: {\"type\":\"content_block_stop\"}\n\n",
            "data: {\"type\":\"message_stop\"}\n\n",
        );
        let (_server, model) = setup_mock_server(body).await;
        let chunks = collect(&model).await;

        assert_eq!(chunks.len(), 3);
        let opening = chunks[0].content[0].as_tool_use().unwrap();
        assert_eq!(opening.id, "toolu_1");
        assert_eq!(opening.name, "get_time");
        assert_eq!(opening.raw, None);

        let fragment = chunks[1].content[0].as_tool_use().unwrap();
        assert_eq!(fragment.name, FRAGMENT_NAME);
        assert_eq!(fragment.raw.as_deref(), Some("{\"zone\":"));
        let fragment = chunks[2].content[0].as_tool_use().unwrap();
        assert_eq!(fragment.raw.as_deref(), Some("\"UTC\"}"));
    }

    #[test]
    fn test_convert_messages() {
        let (system, converted) = convert_messages(vec![
            json!({"role": "system", "content": "Be helpful."}),
            json!({"role": "user", "content": "What time is it?"}),
            json!({
                "role": "assistant",
                "content": [{"text": ""}],
                "tool_calls": [{
                    "id": "call_1",
                    "type": "function",
                    "function": {"name": "get_time", "arguments": "{\"zone\":\"UTC\"}"}
                }]
            }),
            json!({"role": "tool", "content": "12:00:00", "tool_call_id": "call_1"}),
        ]);

        assert_eq!(system, "Be helpful.");
        assert_eq!(converted.len(), 3);
        assert_eq!(converted[0], json!({"role": "user", "content": "What time is it?"}));
        assert_eq!(converted[1]["content"][0]["type"], json!("tool_use"));
        assert_eq!(converted[1]["content"][0]["id"], json!("call_1"));
        assert_eq!(converted[1]["content"][0]["input"], json!({"zone": "UTC"}));
        assert_eq!(converted[2]["role"], json!("user"));
        assert_eq!(converted[2]["content"][0]["type"], json!("tool_result"));
        assert_eq!(converted[2]["content"][0]["tool_use_id"], json!("call_1"));
    }
}
