use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::model::game_state::PlayerId;
use crate::model::narrative::{NarrativePatch, StructuredNarrative};
use crate::model::tool_call::{ConsistencyFinding, StateDelta, ToolCallRecord};

/// Shared abort flag for one turn. Cloning shares the flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ToolStatus {
    Pending,
    Success {
        data: Option<Value>,
        state_delta: Option<StateDelta>,
    },
    Failure {
        error: String,
    },
}

/// Final result of a turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnOutcome {
    pub narrative: Option<StructuredNarrative>,
    pub tool_calls: Vec<ToolCallRecord>,
    pub finding: ConsistencyFinding,
    /// The narrator ran past its deadline; the narrative is best effort.
    pub truncated: bool,
    pub cancelled: bool,
    /// The narrative came from the plain-text fallback.
    pub used_fallback: bool,
    pub rounds: u32,
}

/// What the caller sees while a turn runs. `Done` or `Error` ends the stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum TurnEvent {
    NarrativePatch {
        round: u32,
        patch: NarrativePatch,
    },
    ToolStatus {
        call_id: String,
        name: String,
        status: ToolStatus,
    },
    Done {
        outcome: TurnOutcome,
    },
    Error {
        message: String,
    },
}

impl TurnEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TurnEvent::Done { .. } | TurnEvent::Error { .. })
    }
}

pub enum EngineCommand {
    PlayerInput {
        player_id: PlayerId,
        text: String,
        cancel: CancelToken,
    },
    Shutdown,
}

#[derive(Debug, Clone)]
pub enum EngineResponse {
    Turn {
        player_id: PlayerId,
        event: TurnEvent,
    },
    Rejected {
        player_id: PlayerId,
        reason: String,
    },
}
