//! Tool registration and dispatch.
//!
//! A tool is a named async callable with a JSON-Schema parameter
//! description. Tool failures are data, not errors: the dispatcher folds
//! every failure mode into a [`ToolResponse`] so the ReAct loop can keep
//! going and let the model react to the error text.

mod executor;
mod registry;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::{Map, Value};

use crate::errors::AgentResult;
use crate::message::{object_id, ContentBlock};
use crate::model::ToolSchema;

pub use executor::ToolExecutor;
pub use registry::Toolkit;

/// Sentinel text placed in an interrupted tool response.
pub const INTERRUPTED_SENTINEL: &str =
    "<system-info>The tool call has been interrupted by the user.</system-info>";

/// Result of executing one tool call.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResponse {
    pub content: Vec<ContentBlock>,
    pub metadata: Option<Map<String, Value>>,
    pub is_stream: bool,
    pub is_last: bool,
    pub is_interrupted: bool,
    pub id: String,
}

impl ToolResponse {
    pub fn new(content: Vec<ContentBlock>) -> Self {
        ToolResponse {
            content,
            metadata: None,
            is_stream: false,
            is_last: true,
            is_interrupted: false,
            id: object_id("resp"),
        }
    }

    pub fn text<S: Into<String>>(text: S) -> Self {
        Self::new(vec![ContentBlock::text(text)])
    }

    pub fn error<S: std::fmt::Display>(message: S) -> Self {
        Self::new(vec![ContentBlock::text(format!("Error: {}", message))])
    }

    pub fn interrupted() -> Self {
        ToolResponse {
            content: vec![ContentBlock::text(INTERRUPTED_SENTINEL)],
            metadata: None,
            is_stream: true,
            is_last: true,
            is_interrupted: true,
            id: object_id("resp"),
        }
    }

    pub fn with_id<S: Into<String>>(mut self, id: S) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Newline-joined text of all Text blocks in the response.
    pub fn text_content(&self) -> String {
        let texts: Vec<&str> = self
            .content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        texts.join("\n")
    }
}

/// A named callable the model can invoke.
#[async_trait]
pub trait Tool: Send + Sync {
    fn schema(&self) -> &ToolSchema;

    async fn call(&self, input: Map<String, Value>) -> AgentResult<ToolResponse>;
}

type ToolFuture = BoxFuture<'static, AgentResult<ToolResponse>>;

/// A tool built from an explicit `(name, description, schema, callable)`
/// quadruple, the registration entry point for plain functions.
pub struct FunctionTool {
    schema: ToolSchema,
    handler: Box<dyn Fn(Map<String, Value>) -> ToolFuture + Send + Sync>,
}

impl FunctionTool {
    pub fn new<N, D, F, Fut>(name: N, description: D, parameters: Value, handler: F) -> Self
    where
        N: Into<String>,
        D: Into<String>,
        F: Fn(Map<String, Value>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = AgentResult<ToolResponse>> + Send + 'static,
    {
        FunctionTool {
            schema: ToolSchema::new(name, description, parameters),
            handler: Box::new(move |input| Box::pin(handler(input))),
        }
    }
}

#[async_trait]
impl Tool for FunctionTool {
    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    async fn call(&self, input: Map<String, Value>) -> AgentResult<ToolResponse> {
        (self.handler)(input).await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_error_response_is_prefixed() {
        let response = ToolResponse::error("Tool not found: get_time");
        assert_eq!(response.text_content(), "Error: Tool not found: get_time");
        assert!(!response.is_interrupted);
        assert!(response.is_last);
    }

    #[test]
    fn test_interrupted_response() {
        let response = ToolResponse::interrupted();
        assert!(response.is_interrupted);
        assert_eq!(response.text_content(), INTERRUPTED_SENTINEL);
    }

    #[test]
    fn test_text_content_joins_text_blocks() {
        let response = ToolResponse::new(vec![
            ContentBlock::text("a"),
            ContentBlock::thinking("skipped"),
            ContentBlock::text("b"),
        ]);
        assert_eq!(response.text_content(), "a\nb");
    }

    #[tokio::test]
    async fn test_function_tool_invokes_handler() {
        let tool = FunctionTool::new(
            "echo",
            "Echoes back the input",
            json!({
                "type": "object",
                "properties": {"text": {"type": "string"}},
                "required": ["text"]
            }),
            |input: Map<String, Value>| async move {
                let text = input
                    .get("text")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                Ok(ToolResponse::text(text))
            },
        );

        assert_eq!(tool.schema().name, "echo");
        let mut input = Map::new();
        input.insert("text".to_string(), json!("hello"));
        let response = tool.call(input).await.unwrap();
        assert_eq!(response.text_content(), "hello");
    }
}
