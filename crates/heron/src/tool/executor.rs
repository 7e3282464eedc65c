use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::message::ToolUseBlock;
use crate::tool::{ToolResponse, Toolkit};

/// Dispatches a batch of tool calls, in parallel or one after another.
///
/// Responses come back in the order of the input calls regardless of
/// completion order. Every failure mode is folded into a response: unknown
/// tools, tool errors, panics, batch timeout, and cancellation all produce
/// data the loop can feed back to the model.
pub struct ToolExecutor {
    toolkit: Toolkit,
    timeout: Option<Duration>,
    cancel: CancellationToken,
}

impl ToolExecutor {
    pub fn new(toolkit: Toolkit) -> Self {
        Self {
            toolkit,
            timeout: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub async fn dispatch(&self, calls: &[ToolUseBlock], parallel: bool) -> Vec<ToolResponse> {
        if calls.is_empty() {
            return Vec::new();
        }
        debug!(count = calls.len(), parallel, "dispatching tool calls");

        let run = self.run_batch(calls, parallel);
        match self.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, run).await {
                Ok(responses) => responses,
                Err(_) => {
                    warn!(timeout_ms = timeout.as_millis() as u64, "tool batch timed out");
                    calls
                        .iter()
                        .map(|call| {
                            ToolResponse::error("Tool execution timed out").with_id(&call.id)
                        })
                        .collect()
                }
            },
            None => run.await,
        }
    }

    async fn run_batch(&self, calls: &[ToolUseBlock], parallel: bool) -> Vec<ToolResponse> {
        let mut responses = Vec::with_capacity(calls.len());
        if parallel {
            let handles: Vec<_> = calls
                .iter()
                .map(|call| {
                    tokio::spawn(run_one(
                        self.toolkit.clone(),
                        call.clone(),
                        self.cancel.clone(),
                    ))
                })
                .collect();
            for (handle, call) in handles.into_iter().zip(calls) {
                responses.push(join_response(handle.await, call));
            }
        } else {
            for call in calls {
                let handle = tokio::spawn(run_one(
                    self.toolkit.clone(),
                    call.clone(),
                    self.cancel.clone(),
                ));
                responses.push(join_response(handle.await, call));
            }
        }
        responses
    }
}

fn join_response(
    joined: Result<ToolResponse, tokio::task::JoinError>,
    call: &ToolUseBlock,
) -> ToolResponse {
    match joined {
        Ok(response) => response,
        Err(err) => {
            warn!(name = %call.name, "tool task failed: {err}");
            ToolResponse::error(format!("Tool execution failed: {err}")).with_id(&call.id)
        }
    }
}

async fn run_one(toolkit: Toolkit, call: ToolUseBlock, cancel: CancellationToken) -> ToolResponse {
    let Some(tool) = toolkit.get(&call.name) else {
        warn!(name = %call.name, "tool not found");
        return ToolResponse::error(format!("Tool not found: {}", call.name)).with_id(&call.id);
    };

    tokio::select! {
        _ = cancel.cancelled() => ToolResponse::interrupted().with_id(&call.id),
        result = tool.call(call.input.clone()) => match result {
            Ok(response) => response.with_id(&call.id),
            Err(err) => {
                warn!(name = %call.name, "tool call failed: {err}");
                ToolResponse::error(format!("Tool execution failed: {err}")).with_id(&call.id)
            }
        },
    }
}
