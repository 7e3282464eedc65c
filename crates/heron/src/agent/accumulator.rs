use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::{Map, Value};

use crate::message::ToolUseBlock;
use crate::model::FRAGMENT_NAME;

static NEXT_CALL_ID: AtomicU64 = AtomicU64::new(1);

fn synthesized_call_id() -> String {
    format!("tool_call_{}", NEXT_CALL_ID.fetch_add(1, Ordering::Relaxed))
}

/// Reassembles streamed tool-use fragments into one canonical call.
///
/// Providers fragment tool calls two ways: some parse JSON per fragment
/// (arguments arrive as partial maps), some stream raw characters
/// (arguments arrive as a growing string). The accumulator accepts both:
/// parsed maps merge shallowly into `args`, raw substrings append to a
/// buffer that is parsed whole at finalization when `args` stayed empty.
///
/// One instance lives per reasoning stream and is consumed on completion.
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    msg_id: Option<String>,
    tool_id: Option<String>,
    name: Option<String>,
    args: Map<String, Value>,
    raw: String,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the id of the chunk the fragment arrived in.
    pub fn observe_response(&mut self, id: &str) {
        if !id.is_empty() {
            self.msg_id = Some(id.to_string());
        }
    }

    pub fn merge(&mut self, fragment: &ToolUseBlock) {
        if self.tool_id.is_none() && !fragment.id.is_empty() {
            self.tool_id = Some(fragment.id.clone());
        }
        if !fragment.name.is_empty() && fragment.name != FRAGMENT_NAME {
            self.name = Some(fragment.name.clone());
        }
        for (key, value) in &fragment.input {
            self.args.insert(key.clone(), value.clone());
        }
        if let Some(raw) = &fragment.raw {
            self.raw.push_str(raw);
        }
    }

    pub fn msg_id(&self) -> Option<&str> {
        self.msg_id.as_deref()
    }

    /// True once at least one fragment carried a real tool name.
    pub fn has_pending_call(&self) -> bool {
        self.name.is_some()
    }

    /// Produce the assembled call, or nothing when no fragment ever named
    /// a tool. Falls back to parsing the raw buffer when no fragment
    /// carried parsed arguments; an unparseable buffer yields empty input.
    pub fn finish(self) -> Option<ToolUseBlock> {
        let name = self.name?;

        let mut input = self.args;
        if input.is_empty() && !self.raw.is_empty() {
            if let Ok(parsed) = serde_json::from_str::<Map<String, Value>>(&self.raw) {
                input = parsed;
            }
        }

        Some(ToolUseBlock {
            id: self.tool_id.unwrap_or_else(synthesized_call_id),
            name,
            input,
            raw: if self.raw.is_empty() { None } else { Some(self.raw) },
        })
    }
}
