use std::sync::Arc;

use serde_json::{json, Value};
use tracing::debug;

use crate::format::{
    collapse_all_text, format_with_truncation, media_content_entry, sanitize_function_name,
    tool_arguments_json, Formatter, FormatterCapabilities, TokenCounter, Truncation,
};
use crate::message::{object_id, BlockKind, ContentBlock, Msg, Role};

/// Single-chat formatter: every message maps to one wire message in the
/// chat-completions shape.
pub struct ChatFormatter {
    capabilities: FormatterCapabilities,
    truncation: Option<Truncation>,
}

impl ChatFormatter {
    pub fn new() -> Self {
        Self {
            capabilities: capabilities(false),
            truncation: None,
        }
    }

    pub fn with_truncation(counter: Arc<dyn TokenCounter>, max_tokens: usize) -> Self {
        Self {
            capabilities: capabilities(false),
            truncation: Some(Truncation::new(counter, max_tokens)),
        }
    }

    fn format_once(&self, messages: &[Msg]) -> Vec<Value> {
        let mut formatted: Vec<Value> = messages
            .iter()
            .map(|msg| match msg.role {
                Role::System => format_system_message(msg),
                Role::User | Role::Assistant => format_agent_message(msg),
                Role::Tool => format_tool_result_message(msg),
            })
            .collect();
        collapse_all_text(&mut formatted);
        formatted
    }
}

impl Default for ChatFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl Formatter for ChatFormatter {
    fn capabilities(&self) -> &FormatterCapabilities {
        &self.capabilities
    }

    fn format(&self, messages: &[Msg]) -> Vec<Value> {
        format_with_truncation(messages, self.truncation.as_ref(), |msgs| {
            self.format_once(msgs)
        })
    }
}

pub(super) fn capabilities(multi_agent: bool) -> FormatterCapabilities {
    FormatterCapabilities {
        provider_name: "openai".to_string(),
        supports_tool_api: true,
        supports_multi_agent: multi_agent,
        supports_vision: true,
        supported_blocks: vec![
            BlockKind::Text,
            BlockKind::Thinking,
            BlockKind::ToolUse,
            BlockKind::ToolResult,
            BlockKind::Image,
            BlockKind::Audio,
            BlockKind::Video,
        ],
    }
}

pub(super) fn format_system_message(msg: &Msg) -> Value {
    json!({
        "role": "system",
        "content": msg.text_content(),
    })
}

/// Format a user or assistant message. Content is always a block list so
/// the post-pass can decide whether it collapses; tool calls additionally
/// carry a mandatory empty-text placeholder.
pub(super) fn format_agent_message(msg: &Msg) -> Value {
    let mut content_blocks: Vec<Value> = Vec::new();
    let mut tool_calls: Vec<Value> = Vec::new();

    match &msg.content {
        ContentBlock::Text { text } | ContentBlock::Thinking { text } => {
            content_blocks.push(json!({ "text": text }));
        }
        ContentBlock::ToolUse(tool_use) => {
            tool_calls.push(json!({
                "id": tool_use.id,
                "type": "function",
                "function": {
                    "name": sanitize_function_name(&tool_use.name),
                    "arguments": tool_arguments_json(&tool_use.input),
                },
            }));
            debug!(id = %tool_use.id, name = %tool_use.name, "formatted assistant tool call");
            // Some providers reject assistant tool-call messages without content.
            content_blocks.push(json!({ "text": "" }));
        }
        ContentBlock::ToolResult(result) => {
            content_blocks.push(json!({ "text": result.output.render_text() }));
        }
        block if block.is_media() => {
            if let Some(source) = block.media_source() {
                if let Some(entry) = media_content_entry(block.kind(), source) {
                    content_blocks.push(entry);
                }
            }
        }
        block => {
            content_blocks.push(json!({ "text": block.render_text() }));
        }
    }

    let mut formatted = json!({
        "role": msg.role.as_wire_str(),
        "content": content_blocks,
    });
    if !tool_calls.is_empty() {
        formatted["tool_calls"] = Value::Array(tool_calls);
    }
    formatted
}

pub(super) fn format_tool_result_message(msg: &Msg) -> Value {
    match msg.content.as_tool_result() {
        Some(result) => json!({
            "role": "tool",
            "content": result.output.render_text(),
            "tool_call_id": result.id,
        }),
        // The originating call id is unknown; keep the wire structure valid.
        None => json!({
            "role": "tool",
            "content": msg.content.render_text(),
            "tool_call_id": object_id("tool_call"),
        }),
    }
}
