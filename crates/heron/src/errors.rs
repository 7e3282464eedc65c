use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures the agent core can surface. Tool-side failures are normally
/// folded into response data before they reach a caller; these variants
/// cover the paths where an error value itself travels.
#[non_exhaustive]
#[derive(Error, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum AgentError {
    #[error("no tool registered under the name {0:?}")]
    ToolNotFound(String),

    #[error("tool arguments did not match the declared schema: {0}")]
    InvalidParameters(String),

    #[error("tool reported a failure: {0}")]
    ExecutionError(String),

    #[error("tool batch exceeded its deadline")]
    Timeout,

    #[error("the call was cancelled before it completed")]
    Interrupted,

    #[error("model endpoint unreachable or stream broken: {0}")]
    Transport(String),

    #[error("invariant violated inside the agent core: {0}")]
    Internal(String),
}

pub type AgentResult<T> = Result<T, AgentError>;
