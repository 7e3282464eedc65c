use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde_json::{Map, Value};

use crate::errors::AgentResult;
use crate::model::ToolSchema;
use crate::tool::{FunctionTool, Tool, ToolResponse};

/// Registry mapping tool names to callables. Cloning shares the registry;
/// duplicate registrations silently overwrite (last write wins).
#[derive(Clone, Default)]
pub struct Toolkit {
    tools: Arc<RwLock<HashMap<String, Arc<dyn Tool>>>>,
}

impl Toolkit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: Tool + 'static>(&self, tool: T) {
        let name = tool.schema().name.clone();
        self.write().insert(name, Arc::new(tool));
    }

    /// Register a plain async function as a tool.
    pub fn register_fn<N, D, F, Fut>(&self, name: N, description: D, parameters: Value, handler: F)
    where
        N: Into<String>,
        D: Into<String>,
        F: Fn(Map<String, Value>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = AgentResult<ToolResponse>> + Send + 'static,
    {
        self.register(FunctionTool::new(name, description, parameters, handler));
    }

    pub fn unregister(&self, name: &str) -> bool {
        self.write().remove(name).is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.read().get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.read()
            .values()
            .map(|tool| tool.schema().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Arc<dyn Tool>>> {
        self.tools.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Arc<dyn Tool>>> {
        self.tools.write().unwrap_or_else(|e| e.into_inner())
    }
}
