mod content;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use content::{BlockKind, ContentBlock, MediaSource, ToolResultBlock, ToolUseBlock};

pub(crate) fn object_id(prefix: &str) -> String {
    format!("{}_{}", prefix, Uuid::new_v4().simple())
}

/// The conversational role of a message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    /// Lowercase form used on provider wire messages.
    pub fn as_wire_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }

    /// Capitalized label used in collapsed conversation history.
    pub fn as_label(&self) -> &'static str {
        match self {
            Role::System => "System",
            Role::User => "User",
            Role::Assistant => "Assistant",
            Role::Tool => "Tool",
        }
    }
}

/// A message in a conversation. Immutable once constructed; both callers
/// and the agent core create these, nobody mutates them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Msg {
    pub id: String,
    pub name: String,
    pub role: Role,
    pub content: ContentBlock,
    pub created: i64,
}

impl Msg {
    pub fn new<S: Into<String>>(name: S, role: Role, content: ContentBlock) -> Self {
        Self::with_id(object_id("msg"), name, role, content)
    }

    pub fn with_id<I: Into<String>, S: Into<String>>(
        id: I,
        name: S,
        role: Role,
        content: ContentBlock,
    ) -> Self {
        Msg {
            id: id.into(),
            name: name.into(),
            role,
            content,
            created: Utc::now().timestamp(),
        }
    }

    pub fn system<S: Into<String>, T: Into<String>>(name: S, text: T) -> Self {
        Self::new(name, Role::System, ContentBlock::text(text))
    }

    pub fn user<S: Into<String>>(name: S, content: ContentBlock) -> Self {
        Self::new(name, Role::User, content)
    }

    pub fn assistant<S: Into<String>>(name: S, content: ContentBlock) -> Self {
        Self::new(name, Role::Assistant, content)
    }

    pub fn tool<S: Into<String>>(name: S, content: ContentBlock) -> Self {
        Self::new(name, Role::Tool, content)
    }

    /// Plain text of a Text or Thinking content block, empty otherwise.
    pub fn text_content(&self) -> &str {
        self.content.text_content().unwrap_or_default()
    }
}
