use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::game_state::PlayerId;

/// Tool-level failure. Reported inline on the tool result, never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum ToolError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("state conflict: {0}")]
    StateConflict(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("narrator request failed: {0}")]
    RequestFailed(String),
    #[error("invalid narrator response: {0}")]
    InvalidResponse(String),
    #[error("narrator gave no complete reply within {0}s")]
    Timeout(u64),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        LlmError::RequestFailed(err.to_string())
    }
}

/// Turn-level failure surfaced to the caller.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("a turn is already in progress for player '{0}'")]
    TurnInProgress(PlayerId),
    #[error("player '{0}' not found")]
    PlayerNotFound(PlayerId),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Internal split used by tool handlers: tool failures stay inline,
/// store failures abort the turn.
#[derive(Debug)]
pub(crate) enum DispatchError {
    Tool(ToolError),
    Store(StoreError),
}

impl From<ToolError> for DispatchError {
    fn from(err: ToolError) -> Self {
        DispatchError::Tool(err)
    }
}

impl From<StoreError> for DispatchError {
    fn from(err: StoreError) -> Self {
        DispatchError::Store(err)
    }
}
