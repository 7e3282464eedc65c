use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use futures::stream;
use serde_json::Value;

use crate::model::{ChatModel, ChatResponse, ChatStream, GenerateOptions, ToolSchema};

/// A model that replays pre-scripted chunk sequences, one script per
/// `stream` call. Calls past the script return an empty stream.
pub struct MockChatModel {
    scripts: Arc<Mutex<VecDeque<Vec<ChatResponse>>>>,
}

impl MockChatModel {
    pub fn new(scripts: Vec<Vec<ChatResponse>>) -> Self {
        Self {
            scripts: Arc::new(Mutex::new(scripts.into())),
        }
    }
}

#[async_trait]
impl ChatModel for MockChatModel {
    async fn stream(
        &self,
        _messages: Vec<Value>,
        _tools: Vec<ToolSchema>,
        _options: GenerateOptions,
    ) -> Result<ChatStream> {
        let chunks = self
            .scripts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_default();
        Ok(Box::pin(stream::iter(chunks.into_iter().map(Ok))))
    }
}
