use std::io::{self, BufRead, Write};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use anyhow::Result;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use adventure_engine::engine::config::{config_path, load_config, save_config};
use adventure_engine::engine::engine::Engine;
use adventure_engine::engine::llm_client::OpenAiNarrator;
use adventure_engine::engine::orchestrator::Orchestrator;
use adventure_engine::engine::protocol::{
    CancelToken, EngineCommand, EngineResponse, ToolStatus, TurnEvent,
};
use adventure_engine::engine::store::{GameStore, InMemoryStore};
use adventure_engine::model::actor::{Actor, Element, Skill};
use adventure_engine::model::battle::{BattlePhase, DropEntry, EnemyTemplate};
use adventure_engine::model::game_state::{Area, Location, Node, Npc, Player, PlayerId};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn starter_area() -> Area {
    let node = |id: &str, name: &str, description: &str, connections: &[&str]| Node {
        id: id.into(),
        name: name.into(),
        description: description.into(),
        connections: connections.iter().map(|c| c.to_string()).collect(),
        npcs: Vec::new(),
        encounters: Vec::new(),
    };

    let mut square = node(
        "square",
        "Village Square",
        "A well, a notice board and a few sleepy chickens.",
        &["tavern", "forest_edge"],
    );
    square.npcs.push(Npc {
        id: "elder".into(),
        name: "Elder Maren".into(),
        role: "village elder".into(),
        affinity: 10,
        notes: String::new(),
    });

    let mut forest = node(
        "forest_edge",
        "Forest Edge",
        "Pines crowd the path. Something rustles in the undergrowth.",
        &["square"],
    );
    forest.encounters.push("slime".into());

    Area {
        id: "village".into(),
        name: "Millbrook".into(),
        description: "A farming village at the edge of the old forest.".into(),
        nodes: vec![
            square,
            node("tavern", "The Crooked Kettle", "Warm, loud and smelling of stew.", &["square"]),
            forest,
        ],
        enemy_templates: vec![EnemyTemplate {
            id: "slime".into(),
            name: "Green Slime".into(),
            stats: Actor {
                hp: 30,
                max_hp: 30,
                mp: 10,
                max_mp: 10,
                attack: 8,
                defense: 2,
                speed: 4,
                level: 1,
                element: Element::Water,
            },
            count_min: 1,
            count_max: 2,
            skills: vec![Skill {
                id: "acid_spit".into(),
                name: "Acid Spit".into(),
                damage: 1.3,
                mp_cost: 5,
                cooldown: 2,
                effect: Default::default(),
                priority: 1,
                unlocked_by_phase: true,
            }],
            phases: vec![BattlePhase {
                hp_threshold: 0.5,
                unlocked_skills: vec!["acid_spit".into()],
                description: "The slime bubbles angrily.".into(),
            }],
            exp: 10,
            gold: 5,
            drops: vec![DropEntry {
                item_id: "slime_jelly".into(),
                name: "Slime Jelly".into(),
                chance: 0.5,
                quantity: 1,
            }],
        }],
    }
}

/// Prints streamed turn events, writing only the new tail of each narrative patch.
#[derive(Default)]
struct Console {
    round: u32,
    streamed: String,
}

impl Console {
    fn prompt() {
        print!("> ");
        let _ = io::stdout().flush();
    }

    fn show(&mut self, event: &TurnEvent) {
        match event {
            TurnEvent::NarrativePatch { round, patch } => {
                let Some(text) = &patch.narrative else {
                    return;
                };
                if *round != self.round {
                    self.round = *round;
                    self.streamed.clear();
                    println!();
                }
                let shown = self.streamed.chars().count();
                let tail: String = text.chars().skip(shown).collect();
                print!("{}", tail);
                let _ = io::stdout().flush();
                self.streamed = text.clone();
            }
            TurnEvent::ToolStatus { name, status, .. } => match status {
                ToolStatus::Pending => {}
                ToolStatus::Success { .. } => println!("\n  [{} ok]", name),
                ToolStatus::Failure { error } => println!("\n  [{} failed: {}]", name, error),
            },
            TurnEvent::Done { outcome } => {
                println!();
                if let Some(narrative) = &outcome.narrative {
                    if narrative.narrative != self.streamed {
                        println!("{}", narrative.narrative);
                    }
                    for (i, s) in narrative.suggestions.iter().flatten().enumerate() {
                        println!("  {}) {}", i + 1, s);
                    }
                }
                if outcome.truncated {
                    println!("  (the narrator ran out of time)");
                }
                if let Some(reason) = &outcome.finding.reason {
                    println!("  (consistency warning: {})", reason);
                }
                *self = Console::default();
                Console::prompt();
            }
            TurnEvent::Error { message } => {
                println!("\n  error: {}", message);
                *self = Console::default();
                Console::prompt();
            }
        }
    }
}

fn main() -> Result<()> {
    init_tracing();

    let config = load_config();
    if !config_path().exists() {
        if let Err(err) = save_config(&config) {
            warn!(error = %err, "could not write default config");
        }
    }

    let store = Arc::new(InMemoryStore::new());
    let player_id = PlayerId::from("player");
    store.save_area(&starter_area())?;
    store.save_player(&Player::new(
        player_id.clone(),
        "Traveler",
        Location {
            area_id: "village".into(),
            node_id: "square".into(),
        },
    ))?;

    let narrator = OpenAiNarrator::new(config.narrator.clone())?;
    match narrator.test_connection() {
        Ok(status) => info!(%status, "narrator reachable"),
        Err(err) => warn!(error = %err, endpoint = %config.narrator.endpoint, "narrator not reachable"),
    }

    let orchestrator = Arc::new(Orchestrator::new(config, store, Arc::new(narrator)));

    let (cmd_tx, cmd_rx) = mpsc::channel::<EngineCommand>();
    let (resp_tx, resp_rx) = mpsc::channel::<EngineResponse>();

    let engine = thread::spawn(move || {
        let mut engine = Engine::new(cmd_rx, resp_tx, orchestrator);
        engine.run();
    });

    let printer = thread::spawn(move || {
        let mut console = Console::default();
        while let Ok(response) = resp_rx.recv() {
            match response {
                EngineResponse::Turn { event, .. } => console.show(&event),
                EngineResponse::Rejected { reason, .. } => println!("  ({})", reason),
            }
        }
    });

    println!("Type what you do. 'quit' exits.");
    Console::prompt();

    for line in io::stdin().lock().lines() {
        let line = line?;
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if text == "quit" {
            break;
        }
        cmd_tx.send(EngineCommand::PlayerInput {
            player_id: player_id.clone(),
            text: text.to_string(),
            cancel: CancelToken::new(),
        })?;
    }

    let _ = cmd_tx.send(EngineCommand::Shutdown);
    let _ = engine.join();
    let _ = printer.join();
    Ok(())
}
