use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::message::{BlockKind, ContentBlock, Msg, Role};

/// Snapshot record for one message. Text is canonical: non-text content is
/// reduced to its text rendering and flagged via `content_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MsgRecord {
    pub id: String,
    pub name: String,
    pub role: Role,
    pub content: String,
    pub content_type: BlockKind,
}

/// Serializable snapshot of a [`Memory`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemorySnapshot {
    pub messages: Vec<MsgRecord>,
}

/// Ordered, append-only conversation log with shared ownership.
///
/// Cloning the handle shares the underlying log. `append` and `snapshot`
/// are sequentially consistent: a snapshot taken concurrently with an
/// append observes either the pre- or post-append state, never a torn one.
#[derive(Debug, Clone, Default)]
pub struct Memory {
    messages: Arc<RwLock<Vec<Msg>>>,
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, message: Msg) {
        self.write().push(message);
    }

    pub fn extend<I: IntoIterator<Item = Msg>>(&self, messages: I) {
        self.write().extend(messages);
    }

    pub fn messages(&self) -> Vec<Msg> {
        self.read().clone()
    }

    pub fn last(&self) -> Option<Msg> {
        self.read().last().cloned()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn clear(&self) {
        self.write().clear();
    }

    pub fn snapshot(&self) -> MemorySnapshot {
        let messages = self
            .read()
            .iter()
            .map(|msg| MsgRecord {
                id: msg.id.clone(),
                name: msg.name.clone(),
                role: msg.role,
                content: msg.content.text_content().unwrap_or_default().to_string(),
                content_type: msg.content.kind(),
            })
            .collect();
        MemorySnapshot { messages }
    }

    /// Replace the log with the snapshot contents. Every restored message
    /// carries Text content rebuilt from the record's string.
    pub fn restore(&self, snapshot: MemorySnapshot) {
        let restored: Vec<Msg> = snapshot
            .messages
            .into_iter()
            .map(|record| {
                Msg::with_id(
                    record.id,
                    record.name,
                    record.role,
                    ContentBlock::text(record.content),
                )
            })
            .collect();
        *self.write() = restored;
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<Msg>> {
        self.messages.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Vec<Msg>> {
        self.messages.write().unwrap_or_else(|e| e.into_inner())
    }
}
