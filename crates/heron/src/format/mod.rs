//! Conversion of conversation messages into provider wire messages.
//!
//! Two variants exist: [`ChatFormatter`] maps every message to its own wire
//! message, [`MultiAgentFormatter`] collapses the non-tool conversation into
//! a single `<history>`-wrapped user message. Both share the all-text
//! collapse post-pass and optional token-driven truncation.

mod chat;
mod multi_agent;
mod tokens;

use std::path::Path;
use std::sync::Arc;

use regex::Regex;
use serde_json::{Map, Value};

use crate::message::{BlockKind, MediaSource, Msg, Role};

pub use chat::ChatFormatter;
pub use multi_agent::MultiAgentFormatter;
pub use tokens::{SimpleTokenCounter, TokenCounter};

/// What a formatter can faithfully express. Documentation for the host;
/// the core never dispatches on it.
#[derive(Debug, Clone)]
pub struct FormatterCapabilities {
    pub provider_name: String,
    pub supports_tool_api: bool,
    pub supports_multi_agent: bool,
    pub supports_vision: bool,
    pub supported_blocks: Vec<BlockKind>,
}

/// Token-driven truncation configuration for a formatter.
#[derive(Clone)]
pub struct Truncation {
    pub counter: Arc<dyn TokenCounter>,
    pub max_tokens: usize,
}

impl Truncation {
    pub fn new(counter: Arc<dyn TokenCounter>, max_tokens: usize) -> Self {
        Self { counter, max_tokens }
    }
}

/// Deterministic conversion of a message list into provider wire messages.
/// Formatting never fails: malformed input degrades to best-effort strings.
pub trait Formatter: Send + Sync {
    fn capabilities(&self) -> &FormatterCapabilities;

    fn format(&self, messages: &[Msg]) -> Vec<Value>;
}

/// Re-format with progressively fewer messages until the token count fits.
/// The oldest non-system message is dropped each round; system messages are
/// never removed.
pub(crate) fn format_with_truncation<F>(
    messages: &[Msg],
    truncation: Option<&Truncation>,
    format_once: F,
) -> Vec<Value>
where
    F: Fn(&[Msg]) -> Vec<Value>,
{
    let Some(truncation) = truncation else {
        return format_once(messages);
    };

    let mut current = messages.to_vec();
    loop {
        let formatted = format_once(&current);
        if truncation.counter.count_messages(&formatted) <= truncation.max_tokens {
            return formatted;
        }
        let Some(oldest) = current.iter().position(|m| m.role != Role::System) else {
            // Only system messages remain.
            return formatted;
        };
        current.remove(oldest);
    }
}

/// Collapse content lists whose entries are all plain text into a single
/// newline-joined string. Mixed lists are left alone.
pub(crate) fn collapse_all_text(messages: &mut [Value]) {
    for message in messages.iter_mut() {
        let Some(items) = message.get("content").and_then(Value::as_array) else {
            continue;
        };
        let mut joined = String::new();
        let mut all_text = true;
        for item in items {
            let type_ok = match item.get("type") {
                None => true,
                Some(tag) => tag.as_str() == Some("text"),
            };
            match item.get("text").and_then(Value::as_str) {
                Some(text) if type_ok => {
                    if !joined.is_empty() {
                        joined.push('\n');
                    }
                    joined.push_str(text);
                }
                _ => {
                    all_text = false;
                    break;
                }
            }
        }
        if all_text {
            message["content"] = Value::String(joined);
        }
    }
}

/// Serialize tool-call input to a JSON-object string. Empty input is `{}`.
pub(crate) fn tool_arguments_json(input: &Map<String, Value>) -> String {
    if input.is_empty() {
        return "{}".to_string();
    }
    serde_json::to_string(input).unwrap_or_else(|_| "{}".to_string())
}

/// Rewrite bare filesystem paths that exist to `file://` URLs; everything
/// else passes through untouched.
pub(crate) fn normalize_media_url(url: &str) -> String {
    if url.is_empty()
        || url.starts_with("http://")
        || url.starts_with("https://")
        || url.starts_with("file://")
        || url.starts_with("data:")
    {
        return url.to_string();
    }
    let path = Path::new(url);
    if path.exists() {
        if let Ok(absolute) = path.canonicalize() {
            return format!("file://{}", absolute.display());
        }
    }
    url.to_string()
}

pub(crate) fn media_content_entry(kind: BlockKind, source: &MediaSource) -> Option<Value> {
    let key = match kind {
        BlockKind::Image => "image",
        BlockKind::Audio => "audio",
        BlockKind::Video => "video",
        _ => return None,
    };
    let mut entry = Map::new();
    entry.insert(
        key.to_string(),
        Value::String(normalize_media_url(&source.url_string())),
    );
    Some(Value::Object(entry))
}

pub(crate) fn sanitize_function_name(name: &str) -> String {
    let re = Regex::new(r"[^a-zA-Z0-9_-]").expect("static regex");
    re.replace_all(name, "_").to_string()
}
