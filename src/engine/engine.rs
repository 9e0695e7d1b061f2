use std::sync::mpsc::{Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{info, warn};

use crate::engine::error::EngineError;
use crate::engine::orchestrator::Orchestrator;
use crate::engine::protocol::{CancelToken, EngineCommand, EngineResponse, TurnEvent};
use crate::model::game_state::PlayerId;

/// Command loop in front of the orchestrator. Each player input runs on its
/// own worker so different players never wait on each other.
pub struct Engine {
    rx: Receiver<EngineCommand>,
    tx: Sender<EngineResponse>,
    orchestrator: Arc<Orchestrator>,
    workers: Vec<JoinHandle<()>>,
}

impl Engine {
    pub fn new(
        rx: Receiver<EngineCommand>,
        tx: Sender<EngineResponse>,
        orchestrator: Arc<Orchestrator>,
    ) -> Self {
        Self {
            rx,
            tx,
            orchestrator,
            workers: Vec::new(),
        }
    }

    pub fn run(&mut self) {
        while let Ok(cmd) = self.rx.recv() {
            match cmd {
                EngineCommand::PlayerInput {
                    player_id,
                    text,
                    cancel,
                } => {
                    self.workers.retain(|w| !w.is_finished());
                    let worker = self.spawn_turn(player_id, text, cancel);
                    self.workers.push(worker);
                }
                EngineCommand::Shutdown => break,
            }
        }

        info!(pending = self.workers.len(), "engine shutting down");
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                warn!("turn worker panicked");
            }
        }
    }

    fn spawn_turn(&self, player_id: PlayerId, text: String, cancel: CancelToken) -> JoinHandle<()> {
        let orchestrator = Arc::clone(&self.orchestrator);
        let tx = self.tx.clone();

        thread::spawn(move || {
            let mut emit = |event: TurnEvent| {
                let _ = tx.send(EngineResponse::Turn {
                    player_id: player_id.clone(),
                    event,
                });
            };

            match orchestrator.run_turn(&player_id, &text, &cancel, &mut emit) {
                Ok(_) => {}
                Err(EngineError::TurnInProgress(_)) => {
                    let _ = tx.send(EngineResponse::Rejected {
                        player_id: player_id.clone(),
                        reason: "a turn is already running for this player".into(),
                    });
                }
                // Already reported through the event stream.
                Err(err) => warn!(player = %player_id, error = %err, "turn failed"),
            }
        })
    }
}
