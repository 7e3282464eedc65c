use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Where the bytes of a media block live: a fetchable URL or inline base64.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MediaSource {
    Url(String),
    Base64 { media_type: String, data: String },
}

impl MediaSource {
    /// Render the source as a URL string. Base64 data becomes a data URL.
    pub fn url_string(&self) -> String {
        match self {
            MediaSource::Url(url) => url.clone(),
            MediaSource::Base64 { media_type, data } => {
                format!("data:{};base64,{}", media_type, data)
            }
        }
    }
}

/// A pending tool invocation requested by the model.
///
/// While a call is still streaming, `raw` holds the argument characters
/// received so far and `input` may be empty. Once the call is complete,
/// `input` is the parsed JSON-object form of the arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolUseBlock {
    pub id: String,
    pub name: String,
    pub input: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}

/// The outcome of a tool invocation. `id` matches the originating
/// [`ToolUseBlock`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResultBlock {
    pub id: String,
    pub name: String,
    pub output: Box<ContentBlock>,
}

/// The kind tag of a [`ContentBlock`], used in snapshots and formatter
/// capability declarations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlockKind {
    Text,
    Thinking,
    ToolUse,
    ToolResult,
    Image,
    Audio,
    Video,
}

impl BlockKind {
    pub fn name(&self) -> &'static str {
        match self {
            BlockKind::Text => "TEXT",
            BlockKind::Thinking => "THINKING",
            BlockKind::ToolUse => "TOOL_USE",
            BlockKind::ToolResult => "TOOL_RESULT",
            BlockKind::Image => "IMAGE",
            BlockKind::Audio => "AUDIO",
            BlockKind::Video => "VIDEO",
        }
    }
}

/// Content carried by a single [`Msg`](super::Msg).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    Thinking { text: String },
    ToolUse(ToolUseBlock),
    ToolResult(ToolResultBlock),
    Image { source: MediaSource },
    Audio { source: MediaSource },
    Video { source: MediaSource },
}

impl ContentBlock {
    pub fn text<S: Into<String>>(text: S) -> Self {
        ContentBlock::Text { text: text.into() }
    }

    pub fn thinking<S: Into<String>>(text: S) -> Self {
        ContentBlock::Thinking { text: text.into() }
    }

    pub fn kind(&self) -> BlockKind {
        match self {
            ContentBlock::Text { .. } => BlockKind::Text,
            ContentBlock::Thinking { .. } => BlockKind::Thinking,
            ContentBlock::ToolUse(_) => BlockKind::ToolUse,
            ContentBlock::ToolResult(_) => BlockKind::ToolResult,
            ContentBlock::Image { .. } => BlockKind::Image,
            ContentBlock::Audio { .. } => BlockKind::Audio,
            ContentBlock::Video { .. } => BlockKind::Video,
        }
    }

    /// Get the plain text of a Text or Thinking block.
    pub fn text_content(&self) -> Option<&str> {
        match self {
            ContentBlock::Text { text } | ContentBlock::Thinking { text } => Some(text),
            _ => None,
        }
    }

    pub fn as_tool_use(&self) -> Option<&ToolUseBlock> {
        match self {
            ContentBlock::ToolUse(block) => Some(block),
            _ => None,
        }
    }

    pub fn as_tool_result(&self) -> Option<&ToolResultBlock> {
        match self {
            ContentBlock::ToolResult(block) => Some(block),
            _ => None,
        }
    }

    pub fn is_media(&self) -> bool {
        matches!(
            self,
            ContentBlock::Image { .. } | ContentBlock::Audio { .. } | ContentBlock::Video { .. }
        )
    }

    pub fn media_source(&self) -> Option<&MediaSource> {
        match self {
            ContentBlock::Image { source }
            | ContentBlock::Audio { source }
            | ContentBlock::Video { source } => Some(source),
            _ => None,
        }
    }

    /// Best-effort text rendering; never fails. Media degrades to a
    /// description string, tool calls to their argument JSON.
    pub fn render_text(&self) -> String {
        match self {
            ContentBlock::Text { text } | ContentBlock::Thinking { text } => text.clone(),
            ContentBlock::ToolUse(block) => {
                serde_json::to_string(&block.input).unwrap_or_else(|_| "{}".to_string())
            }
            ContentBlock::ToolResult(block) => block.output.render_text(),
            ContentBlock::Image { source } => {
                format!("[Image content: {}]", source.url_string())
            }
            ContentBlock::Audio { source } => {
                format!("[Audio content: {}]", source.url_string())
            }
            ContentBlock::Video { source } => {
                format!("[Video content: {}]", source.url_string())
            }
        }
    }
}
