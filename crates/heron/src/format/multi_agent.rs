use std::sync::Arc;

use serde_json::{json, Value};

use crate::format::chat::{capabilities, format_agent_message, format_tool_result_message};
use crate::format::{
    collapse_all_text, format_with_truncation, media_content_entry, Formatter,
    FormatterCapabilities, TokenCounter, Truncation,
};
use crate::message::{ContentBlock, Msg, Role};

const HISTORY_START_TAG: &str = "<history>";
const HISTORY_END_TAG: &str = "</history>";

/// Multi-agent formatter: collapses the non-tool conversation into one
/// synthetic user message wrapped in `<history>` tags, one line per message
/// with role and sender name. Tool calls and tool results keep their own
/// wire messages, emitted after the collapsed history.
pub struct MultiAgentFormatter {
    capabilities: FormatterCapabilities,
    truncation: Option<Truncation>,
}

impl MultiAgentFormatter {
    pub fn new() -> Self {
        Self {
            capabilities: capabilities(true),
            truncation: None,
        }
    }

    pub fn with_truncation(counter: Arc<dyn TokenCounter>, max_tokens: usize) -> Self {
        Self {
            capabilities: capabilities(true),
            truncation: Some(Truncation::new(counter, max_tokens)),
        }
    }

    fn format_once(&self, messages: &[Msg]) -> Vec<Value> {
        let mut conversation: Vec<&Msg> = Vec::new();
        let mut tool_sequence: Vec<&Msg> = Vec::new();

        for msg in messages {
            let is_tool_call =
                msg.role == Role::Assistant && msg.content.as_tool_use().is_some();
            if msg.role == Role::Tool || is_tool_call {
                tool_sequence.push(msg);
            } else {
                conversation.push(msg);
            }
        }

        let mut formatted = Vec::new();
        if !conversation.is_empty() {
            formatted.push(format_conversation(&conversation));
        }
        for msg in tool_sequence {
            match msg.role {
                Role::Assistant => formatted.push(format_agent_message(msg)),
                Role::Tool => formatted.push(format_tool_result_message(msg)),
                _ => {}
            }
        }
        collapse_all_text(&mut formatted);
        formatted
    }
}

impl Default for MultiAgentFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl Formatter for MultiAgentFormatter {
    fn capabilities(&self) -> &FormatterCapabilities {
        &self.capabilities
    }

    fn format(&self, messages: &[Msg]) -> Vec<Value> {
        format_with_truncation(messages, self.truncation.as_ref(), |msgs| {
            self.format_once(msgs)
        })
    }
}

/// Build the collapsed history message. Media blocks flush the accumulated
/// text into its own content entry and the accumulation continues after.
fn format_conversation(messages: &[&Msg]) -> Value {
    let mut content_blocks: Vec<Value> = Vec::new();
    let mut accumulator = String::new();
    accumulator.push_str(HISTORY_START_TAG);
    accumulator.push('\n');

    for msg in messages {
        let label = msg.role.as_label();
        match &msg.content {
            ContentBlock::Text { text } | ContentBlock::Thinking { text } => {
                accumulator.push_str(&format!("{} {}: {}\n", label, msg.name, text));
            }
            block if block.is_media() => {
                if !accumulator.is_empty() {
                    content_blocks.push(json!({ "text": accumulator }));
                    accumulator = String::new();
                }
                if let Some(source) = block.media_source() {
                    if let Some(entry) = media_content_entry(block.kind(), source) {
                        content_blocks.push(entry);
                    }
                }
            }
            _ => {}
        }
    }

    accumulator.push_str(HISTORY_END_TAG);
    if !accumulator.is_empty() {
        content_blocks.push(json!({ "text": accumulator }));
    }

    if content_blocks.is_empty() {
        content_blocks.push(json!({ "text": "" }));
    }
    json!({
        "role": "user",
        "content": content_blocks,
    })
}
