use std::collections::HashSet;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::engine::config::EngineConfig;
use crate::engine::dispatcher::{narrative_from_result, Dispatcher};
use crate::engine::error::{EngineError, LlmError, StoreError};
use crate::engine::guard::ConsistencyGuard;
use crate::engine::llm_client::{Narrator, NarratorChunk, NarratorRequest};
use crate::engine::narrative_parser::extract_plain_text;
use crate::engine::prompt_builder::{PromptBuilder, PromptContext};
use crate::engine::protocol::{CancelToken, ToolStatus, TurnEvent, TurnOutcome};
use crate::engine::store::GameStore;
use crate::engine::stream_decoder::StreamDecoder;
use crate::engine::tool_catalog::openai_tools;
use crate::model::battle::BattleStatus;
use crate::model::game_state::PlayerId;
use crate::model::message::{Message, NativeToolCall};
use crate::model::narrative::StructuredNarrative;
use crate::model::tool_call::{ToolCallRecord, ToolResult};

/// How often a waiting turn looks at its cancel flag and deadline.
const POLL_INTERVAL: Duration = Duration::from_millis(20);
const CHUNK_BUFFER: usize = 64;

/// Marks a player's turn as in flight until dropped.
struct TurnPermit<'a> {
    active: &'a Mutex<HashSet<PlayerId>>,
    player_id: PlayerId,
}

impl Drop for TurnPermit<'_> {
    fn drop(&mut self) {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.player_id);
    }
}

/// How one narrator stream ended.
#[derive(Debug, Default)]
struct RoundEnd {
    timed_out: bool,
    cancelled: bool,
    upstream_error: Option<String>,
}

/// Runs turns: narrator stream, decoder, tool dispatch, guard.
pub struct Orchestrator {
    config: EngineConfig,
    store: Arc<dyn GameStore>,
    narrator: Arc<dyn Narrator>,
    dispatcher: Dispatcher,
    guard: ConsistencyGuard,
    active_turns: Mutex<HashSet<PlayerId>>,
}

impl Orchestrator {
    pub fn new(config: EngineConfig, store: Arc<dyn GameStore>, narrator: Arc<dyn Narrator>) -> Self {
        let dispatcher = Dispatcher::new(Arc::clone(&store), config.clone());
        Self {
            config,
            store,
            narrator,
            dispatcher,
            guard: ConsistencyGuard::new(),
            active_turns: Mutex::new(HashSet::new()),
        }
    }

    fn acquire(&self, player_id: &PlayerId) -> Result<TurnPermit<'_>, EngineError> {
        let mut active = self
            .active_turns
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !active.insert(player_id.clone()) {
            return Err(EngineError::TurnInProgress(player_id.clone()));
        }
        Ok(TurnPermit {
            active: &self.active_turns,
            player_id: player_id.clone(),
        })
    }

    /// Runs one full turn for `player_id`, reporting progress through `emit`.
    ///
    /// A second call for the same player while one is running fails with
    /// `TurnInProgress`. Tool failures, narrator timeouts and undecodable
    /// output stay inside the outcome; only store failures abort the turn.
    pub fn run_turn(
        &self,
        player_id: &PlayerId,
        input: &str,
        cancel: &CancelToken,
        emit: &mut dyn FnMut(TurnEvent),
    ) -> Result<TurnOutcome, EngineError> {
        let _permit = self.acquire(player_id)?;
        info!(player = %player_id, "turn started");

        match self.turn(player_id, input, cancel, emit) {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                emit(TurnEvent::Error {
                    message: err.to_string(),
                });
                Err(err)
            }
        }
    }

    fn turn(
        &self,
        player_id: &PlayerId,
        input: &str,
        cancel: &CancelToken,
        emit: &mut dyn FnMut(TurnEvent),
    ) -> Result<TurnOutcome, EngineError> {
        let mut messages = self.initial_messages(player_id, input)?;
        let tools = openai_tools();
        let max_rounds = self.config.narrator.max_tool_rounds.max(1);

        let mut outcome = TurnOutcome::default();
        // Latest round that produced any narrative, and whether it was prose.
        let mut latest: Option<(StructuredNarrative, bool)> = None;
        let mut delivered: Option<StructuredNarrative> = None;
        let mut last_raw = String::new();
        let mut upstream_error = None;

        for round in 1..=max_rounds {
            if cancel.is_cancelled() {
                outcome.cancelled = true;
                break;
            }
            outcome.rounds = round;

            let request = NarratorRequest {
                messages: messages.clone(),
                tools: tools.clone(),
            };
            let mut decoder = StreamDecoder::new();
            let mut calls = Vec::new();
            let end = self.pump(request, cancel, round, &mut decoder, &mut calls, emit);

            if !decoder.raw().trim().is_empty() {
                last_raw = decoder.raw().to_string();
                latest = match decoder.finalize() {
                    Some(narrative) => Some((narrative, false)),
                    None => extract_plain_text(decoder.raw()).map(|n| (n, true)),
                }
                .or(latest);
            }

            // Collected calls still run after a timeout; a cancel stops them.
            if !calls.is_empty() {
                messages.push(Message::assistant_tool_calls(decoder.raw(), calls.clone()));
                for call in &calls {
                    if cancel.is_cancelled() {
                        outcome.cancelled = true;
                        break;
                    }
                    let result = self.run_tool(player_id, call, emit)?;
                    if result.success && call.name == "send_narrative" {
                        delivered = narrative_from_result(&result);
                    }
                    messages.push(Message::tool_result(
                        &call.id,
                        serde_json::to_string(&result).unwrap_or_default(),
                    ));
                    outcome.tool_calls.push(ToolCallRecord::from_result(
                        &call.id,
                        &call.name,
                        &call.arguments,
                        &result,
                    ));
                }
            }

            outcome.truncated |= end.timed_out;
            outcome.cancelled |= end.cancelled;
            if end.upstream_error.is_some() {
                upstream_error = end.upstream_error;
            }

            if calls.is_empty()
                || delivered.is_some()
                || outcome.truncated
                || outcome.cancelled
                || upstream_error.is_some()
            {
                break;
            }
        }

        let narrative = match (delivered, latest) {
            (Some(narrative), _) => Some(narrative),
            (None, Some((narrative, prose))) => {
                if prose {
                    warn!(player = %player_id, "narrator output not structured, using plain-text fallback");
                    outcome.used_fallback = true;
                }
                Some(narrative)
            }
            (None, None) => None,
        };

        outcome.finding = match &narrative {
            Some(n) => self.guard.check(&n.narrative, &outcome.tool_calls),
            None => Default::default(),
        };
        outcome.narrative = narrative;

        self.record_history(player_id, input, &outcome, &last_raw)?;

        match &outcome.narrative {
            Some(_) => {
                info!(
                    player = %player_id,
                    tools = outcome.tool_calls.len(),
                    truncated = outcome.truncated,
                    cancelled = outcome.cancelled,
                    flagged = outcome.finding.has_hallucination,
                    "turn finished"
                );
                emit(TurnEvent::Done {
                    outcome: outcome.clone(),
                });
            }
            None => {
                let message = match (&upstream_error, outcome.cancelled) {
                    (Some(err), _) => format!("narrator failed: {}", err),
                    (None, true) => "turn cancelled before any narrative".to_string(),
                    (None, false) => "narrator produced no narrative".to_string(),
                };
                warn!(player = %player_id, %message, "turn ended without narrative");
                emit(TurnEvent::Error { message });
            }
        }
        Ok(outcome)
    }

    fn initial_messages(&self, player_id: &PlayerId, input: &str) -> Result<Vec<Message>, EngineError> {
        let player = self
            .store
            .load_player(player_id)?
            .ok_or_else(|| EngineError::PlayerNotFound(player_id.clone()))?;
        let inventory = self.store.load_inventory(player_id)?;
        let area = self.store.load_area(&player.location.area_id)?;
        let battle = self
            .store
            .load_battle(player_id)?
            .filter(|b| b.status == BattleStatus::Active);
        let quests = self.store.list_quests(player_id)?;

        let system = PromptBuilder::build(&PromptContext {
            player: &player,
            inventory: &inventory,
            area: area.as_ref(),
            battle: battle.as_ref(),
            quests: &quests,
        });

        let mut messages = vec![Message::system(system)];
        messages.extend(
            self.store
                .recent_messages(player_id, self.config.narrator.history_limit)?,
        );
        messages.push(Message::user(input));
        Ok(messages)
    }

    /// Streams one narrator reply on a helper thread, feeding text through
    /// the decoder and collecting tool calls, until the stream ends, the
    /// deadline passes or the turn is cancelled.
    fn pump(
        &self,
        request: NarratorRequest,
        cancel: &CancelToken,
        round: u32,
        decoder: &mut StreamDecoder,
        calls: &mut Vec<NativeToolCall>,
        emit: &mut dyn FnMut(TurnEvent),
    ) -> RoundEnd {
        let rx = self.spawn_stream(request);
        let deadline = Instant::now() + self.config.narrator.timeout();
        let mut end = RoundEnd::default();

        loop {
            if cancel.is_cancelled() {
                end.cancelled = true;
                break;
            }
            let now = Instant::now();
            if now >= deadline {
                let err = LlmError::Timeout(self.config.narrator.timeout().as_secs());
                warn!(round, error = %err, "finalizing what arrived");
                end.timed_out = true;
                break;
            }

            match rx.recv_timeout((deadline - now).min(POLL_INTERVAL)) {
                Ok(Ok(NarratorChunk::Text(text))) => {
                    if let Some(patch) = decoder.append(&text) {
                        emit(TurnEvent::NarrativePatch { round, patch });
                    }
                }
                Ok(Ok(NarratorChunk::ToolCall(call))) => {
                    debug!(round, tool = %call.name, "narrator requested tool");
                    emit(TurnEvent::ToolStatus {
                        call_id: call.id.clone(),
                        name: call.name.clone(),
                        status: ToolStatus::Pending,
                    });
                    calls.push(call);
                }
                Ok(Err(err)) => {
                    warn!(round, error = %err, "narrator stream failed");
                    end.upstream_error = Some(err.to_string());
                    break;
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        end
    }

    fn spawn_stream(&self, request: NarratorRequest) -> Receiver<Result<NarratorChunk, LlmError>> {
        let (tx, rx) = mpsc::sync_channel(CHUNK_BUFFER);
        let narrator = Arc::clone(&self.narrator);

        thread::spawn(move || match narrator.stream(&request) {
            Ok(stream) => {
                for item in stream {
                    // Receiver gone: the turn stopped listening.
                    if tx.send(item).is_err() {
                        break;
                    }
                }
            }
            Err(err) => {
                let _ = tx.send(Err(err));
            }
        });
        rx
    }

    fn run_tool(
        &self,
        player_id: &PlayerId,
        call: &NativeToolCall,
        emit: &mut dyn FnMut(TurnEvent),
    ) -> Result<ToolResult, StoreError> {
        let result = self
            .dispatcher
            .execute(&call.name, &call.arguments, player_id)?;

        let status = if result.success {
            ToolStatus::Success {
                data: result.data.clone(),
                state_delta: result.state_delta.clone(),
            }
        } else {
            ToolStatus::Failure {
                error: result
                    .error
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_default(),
            }
        };
        emit(TurnEvent::ToolStatus {
            call_id: call.id.clone(),
            name: call.name.clone(),
            status,
        });

        Ok(result)
    }

    fn record_history(
        &self,
        player_id: &PlayerId,
        input: &str,
        outcome: &TurnOutcome,
        raw: &str,
    ) -> Result<(), StoreError> {
        self.store.append_message(player_id, &Message::user(input))?;

        let reply = match &outcome.narrative {
            Some(narrative) => {
                serde_json::to_string(narrative).unwrap_or_else(|_| narrative.narrative.clone())
            }
            None if !raw.trim().is_empty() => raw.to_string(),
            None => return Ok(()),
        };
        self.store
            .append_message(player_id, &Message::assistant(reply))
    }
}
