use serde_json::Value;

/// Counts tokens over already-formatted wire messages.
pub trait TokenCounter: Send + Sync {
    fn count_text(&self, text: &str) -> usize;

    /// Count content strings, tool-call argument strings, and a fixed
    /// per-message overhead.
    fn count_messages(&self, messages: &[Value]) -> usize {
        let mut total = 0;
        for message in messages {
            match message.get("content") {
                Some(Value::String(text)) => total += self.count_text(text),
                Some(Value::Array(items)) => {
                    for item in items {
                        if let Some(text) = item.get("text").and_then(Value::as_str) {
                            total += self.count_text(text);
                        }
                    }
                }
                _ => {}
            }
            if let Some(calls) = message.get("tool_calls").and_then(Value::as_array) {
                for call in calls {
                    if let Some(args) = call
                        .get("function")
                        .and_then(|f| f.get("arguments"))
                        .and_then(Value::as_str)
                    {
                        total += self.count_text(args);
                    }
                }
            }
            total += MESSAGE_OVERHEAD_TOKENS;
        }
        total
    }
}

const MESSAGE_OVERHEAD_TOKENS: usize = 10;

/// Character-ratio token estimator. Close enough for truncation decisions;
/// swap in a real tokenizer behind [`TokenCounter`] when counts must match
/// the provider.
#[derive(Debug, Clone)]
pub struct SimpleTokenCounter {
    avg_chars_per_token: f64,
}

impl SimpleTokenCounter {
    pub fn new(avg_chars_per_token: f64) -> Self {
        Self { avg_chars_per_token }
    }

    pub fn for_openai() -> Self {
        Self::new(4.0)
    }

    pub fn for_anthropic() -> Self {
        Self::new(3.8)
    }
}

impl TokenCounter for SimpleTokenCounter {
    fn count_text(&self, text: &str) -> usize {
        if text.trim().is_empty() {
            return 0;
        }
        let by_chars = (text.len() as f64 / self.avg_chars_per_token).ceil() as usize;
        let by_words = text.split_whitespace().count();
        by_chars.max(by_words)
    }
}
