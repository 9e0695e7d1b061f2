//! Shared fixtures for the integration tests: a seeded world, an in-memory
//! store and narrators that replay scripted replies.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use serde_json::Value;

use adventure_engine::engine::config::{BattleConfig, EngineConfig};
use adventure_engine::engine::error::LlmError;
use adventure_engine::engine::llm_client::{Narrator, NarratorChunk, NarratorRequest, NarratorStream};
use adventure_engine::engine::store::{GameStore, InMemoryStore};
use adventure_engine::model::actor::{Actor, Element};
use adventure_engine::model::battle::EnemyTemplate;
use adventure_engine::model::game_state::{Area, Location, Node, Npc, Player, PlayerId};
use adventure_engine::model::message::NativeToolCall;

pub const PLAYER: &str = "p1";

pub fn player_id() -> PlayerId {
    PlayerId::from(PLAYER)
}

pub fn stats(hp: i32, attack: i32, defense: i32) -> Actor {
    Actor {
        hp,
        max_hp: hp,
        mp: 0,
        max_mp: 0,
        attack,
        defense,
        speed: 5,
        level: 1,
        element: Element::Neutral,
    }
}

pub fn template(id: &str, stats: Actor) -> EnemyTemplate {
    EnemyTemplate {
        id: id.into(),
        name: id.into(),
        stats,
        count_min: 1,
        count_max: 1,
        skills: Vec::new(),
        phases: Vec::new(),
        exp: 10,
        gold: 5,
        drops: Vec::new(),
    }
}

pub fn hero() -> Player {
    Player::new(
        player_id(),
        "Hero",
        Location {
            area_id: "village".into(),
            node_id: "square".into(),
        },
    )
}

fn node(id: &str, connections: &[&str]) -> Node {
    Node {
        id: id.into(),
        name: id.into(),
        description: String::new(),
        connections: connections.iter().map(|c| c.to_string()).collect(),
        npcs: Vec::new(),
        encounters: Vec::new(),
    }
}

/// square <-> tavern, square <-> forest; cellar is unreachable.
pub fn village() -> Area {
    let mut tavern = node("tavern", &["square"]);
    tavern.npcs.push(Npc {
        id: "barkeep".into(),
        name: "Barkeep".into(),
        role: "innkeeper".into(),
        affinity: 95,
        notes: String::new(),
    });
    let mut forest = node("forest", &["square"]);
    forest.encounters.push("rat".into());

    Area {
        id: "village".into(),
        name: "Village".into(),
        description: String::new(),
        nodes: vec![node("square", &["tavern", "forest"]), tavern, forest, node("cellar", &[])],
        enemy_templates: vec![template("rat", stats(10, 3, 0))],
    }
}

pub fn no_crit() -> EngineConfig {
    EngineConfig {
        battle: BattleConfig {
            crit_chance: 0.0,
            ..BattleConfig::default()
        },
        rng_seed: Some(7),
        ..EngineConfig::default()
    }
}

pub fn seeded_store() -> Arc<InMemoryStore> {
    let store = Arc::new(InMemoryStore::new());
    store.save_area(&village()).unwrap();
    store.save_player(&hero()).unwrap();
    store
}

/// One scripted narrator reply.
#[derive(Debug, Clone, Default)]
pub struct Reply {
    pub chunks: Vec<NarratorChunk>,
    /// Sleep this long before yielding the chunk at this index.
    pub stall: Option<(usize, Duration)>,
}

impl Reply {
    pub fn text(parts: &[&str]) -> Self {
        Self {
            chunks: parts.iter().map(|p| NarratorChunk::Text(p.to_string())).collect(),
            stall: None,
        }
    }

    pub fn tools(calls: &[(&str, Value)]) -> Self {
        Self {
            chunks: calls
                .iter()
                .enumerate()
                .map(|(i, (name, args))| {
                    NarratorChunk::ToolCall(NativeToolCall {
                        id: format!("call-{}", i + 1),
                        name: name.to_string(),
                        arguments: args.clone(),
                    })
                })
                .collect(),
            stall: None,
        }
    }

    pub fn stall_before(mut self, index: usize, pause: Duration) -> Self {
        self.stall = Some((index, pause));
        self
    }
}

/// Replays one `Reply` per `stream` call and records every request.
#[derive(Default)]
pub struct ScriptedNarrator {
    replies: Mutex<Vec<Reply>>,
    pub requests: Mutex<Vec<NarratorRequest>>,
}

impl ScriptedNarrator {
    pub fn new(replies: Vec<Reply>) -> Arc<Self> {
        let mut replies = replies;
        replies.reverse();
        Arc::new(Self {
            replies: Mutex::new(replies),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl Narrator for ScriptedNarrator {
    fn stream(&self, request: &NarratorRequest) -> Result<NarratorStream, LlmError> {
        let reply = self.replies.lock().unwrap().pop();
        self.requests.lock().unwrap().push(request.clone());
        let reply = reply.ok_or_else(|| LlmError::RequestFailed("script exhausted".into()))?;

        let stall = reply.stall;
        Ok(Box::new(reply.chunks.into_iter().enumerate().map(move |(i, chunk)| {
            if let Some((at, pause)) = stall {
                if at == i {
                    thread::sleep(pause);
                }
            }
            Ok(chunk)
        })))
    }
}

/// Every request fails before a single chunk arrives.
pub struct DownNarrator;

impl Narrator for DownNarrator {
    fn stream(&self, _request: &NarratorRequest) -> Result<NarratorStream, LlmError> {
        Err(LlmError::RequestFailed("connection refused".into()))
    }
}
