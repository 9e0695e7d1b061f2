/// End-to-end turns through the orchestrator with scripted narrators.

mod support;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde_json::json;

use adventure_engine::engine::config::EngineConfig;
use adventure_engine::engine::error::{EngineError, StoreError};
use adventure_engine::engine::orchestrator::Orchestrator;
use adventure_engine::engine::protocol::{CancelToken, ToolStatus, TurnEvent, TurnOutcome};
use adventure_engine::engine::store::GameStore;
use adventure_engine::model::game_state::{Location, Player, PlayerId};
use adventure_engine::model::message::Role;
use adventure_engine::model::narrative::Mood;

use support::{no_crit, player_id, seeded_store, DownNarrator, Reply, ScriptedNarrator};

fn collect_turn(
    orchestrator: &Orchestrator,
    input: &str,
) -> (Result<TurnOutcome, EngineError>, Vec<TurnEvent>) {
    let mut events = Vec::new();
    let result = orchestrator.run_turn(&player_id(), input, &CancelToken::new(), &mut |e| {
        events.push(e)
    });
    (result, events)
}

fn assert_single_terminal_last(events: &[TurnEvent]) {
    let terminals = events.iter().filter(|e| e.is_terminal()).count();
    assert_eq!(terminals, 1, "{:?}", events);
    assert!(events.last().unwrap().is_terminal());
}

#[test]
fn tool_round_then_narrative() {
    let store = seeded_store();
    let narrator = ScriptedNarrator::new(vec![
        Reply::tools(&[("move_to_node", json!({ "nodeId": "tavern" }))]),
        Reply::text(&[
            r#"{"narrative":"You push open the tavern door.","#,
            r#""mood":"calm","suggestions":["Order a drink","Talk to the barkeep"]}"#,
        ]),
    ]);
    let orchestrator = Orchestrator::new(no_crit(), store.clone(), narrator.clone());

    let (result, events) = collect_turn(&orchestrator, "I go to the tavern");
    let outcome = result.unwrap();

    let narrative = outcome.narrative.as_ref().unwrap();
    assert_eq!(narrative.narrative, "You push open the tavern door.");
    assert_eq!(narrative.mood, Some(Mood::Calm));
    assert_eq!(outcome.rounds, 2);
    assert_eq!(outcome.tool_calls.len(), 1);
    assert!(outcome.tool_calls[0].success);
    assert!(!outcome.finding.has_hallucination);
    assert!(!outcome.truncated && !outcome.used_fallback);

    // Pending comes before the result for the same call.
    let statuses: Vec<&ToolStatus> = events
        .iter()
        .filter_map(|e| match e {
            TurnEvent::ToolStatus { status, .. } => Some(status),
            _ => None,
        })
        .collect();
    assert!(matches!(statuses[..], [ToolStatus::Pending, ToolStatus::Success { .. }]));
    assert!(events
        .iter()
        .any(|e| matches!(e, TurnEvent::NarrativePatch { round: 2, .. })));
    assert_single_terminal_last(&events);

    // The second request carries the tool result back to the narrator.
    let requests = narrator.requests.lock().unwrap();
    let last = requests[1].messages.last().unwrap();
    assert_eq!(last.role, Role::Tool);
    assert_eq!(last.tool_call_id.as_deref(), Some("call-1"));
    drop(requests);

    let player = store.load_player(&player_id()).unwrap().unwrap();
    assert_eq!(player.location.node_id, "tavern");
    let history = store.recent_messages(&player_id(), 10).unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].content, "I go to the tavern");
    assert_eq!(history[1].role, Role::Assistant);
}

#[test]
fn unbacked_claim_is_flagged_but_delivered() {
    let narrator = ScriptedNarrator::new(vec![Reply::text(&[
        r#"{"narrative":"你掏出5金币放在柜台上。"}"#,
    ])]);
    let orchestrator = Orchestrator::new(no_crit(), seeded_store(), narrator);

    let (result, events) = collect_turn(&orchestrator, "付钱");
    let outcome = result.unwrap();
    assert!(outcome.narrative.is_some());
    assert!(outcome.finding.has_hallucination);
    assert!(matches!(events.last(), Some(TurnEvent::Done { .. })));
}

#[test]
fn prose_reply_uses_the_fallback() {
    let narrator = ScriptedNarrator::new(vec![Reply::text(&[
        "Rain drums on the roof.\n",
        "- Wait it out\n- Run for the barn",
    ])]);
    let orchestrator = Orchestrator::new(no_crit(), seeded_store(), narrator);

    let outcome = collect_turn(&orchestrator, "look outside").0.unwrap();
    assert!(outcome.used_fallback);
    let narrative = outcome.narrative.unwrap();
    assert_eq!(narrative.narrative, "Rain drums on the roof.");
    assert_eq!(narrative.suggestions.unwrap(), vec!["Wait it out", "Run for the barn"]);
}

#[test]
fn latest_round_wins_even_when_it_is_prose() {
    let mut first = Reply::text(&[r#"{"narrative":"You consider the road ahead."}"#]);
    first
        .chunks
        .extend(Reply::tools(&[("move_to_node", json!({ "nodeId": "tavern" }))]).chunks);
    let narrator = ScriptedNarrator::new(vec![
        first,
        Reply::text(&["Warm light spills from the tavern.\n", "[Go in]\n[Keep walking]"]),
    ]);
    let orchestrator = Orchestrator::new(no_crit(), seeded_store(), narrator);

    let outcome = collect_turn(&orchestrator, "walk on").0.unwrap();
    assert_eq!(outcome.rounds, 2);
    assert!(outcome.used_fallback);
    let narrative = outcome.narrative.unwrap();
    assert_eq!(narrative.narrative, "Warm light spills from the tavern.");
    assert_eq!(narrative.suggestions.unwrap(), vec!["Go in", "Keep walking"]);
}

#[test]
fn send_narrative_ends_the_turn() {
    let narrator = ScriptedNarrator::new(vec![Reply::tools(&[(
        "send_narrative",
        json!({ "narrative": "The well is dry.", "mood": "sad" }),
    )])]);
    let orchestrator = Orchestrator::new(no_crit(), seeded_store(), narrator.clone());

    let outcome = collect_turn(&orchestrator, "look in the well").0.unwrap();
    assert_eq!(outcome.narrative.unwrap().narrative, "The well is dry.");
    assert_eq!(outcome.rounds, 1);
    assert_eq!(narrator.calls(), 1);
}

#[test]
fn second_turn_for_the_same_player_is_rejected() {
    let store = seeded_store();
    store
        .save_player(&Player::new(
            PlayerId::from("p2"),
            "Other",
            Location {
                area_id: "village".into(),
                node_id: "square".into(),
            },
        ))
        .unwrap();

    let narrator = ScriptedNarrator::new(vec![
        Reply::text(&[r#"{"narrative":"#, r#""Slowly the fog lifts."}"#])
            .stall_before(1, Duration::from_millis(500)),
        Reply::text(&[r#"{"narrative":"Elsewhere, a bell rings."}"#]),
    ]);
    let orchestrator = Arc::new(Orchestrator::new(no_crit(), store, narrator.clone()));

    let first = {
        let orchestrator = Arc::clone(&orchestrator);
        thread::spawn(move || {
            orchestrator.run_turn(&player_id(), "wait", &CancelToken::new(), &mut |_| {})
        })
    };
    while narrator.calls() == 0 {
        thread::sleep(Duration::from_millis(5));
    }

    let mut events = Vec::new();
    let rejected = orchestrator.run_turn(&player_id(), "wait again", &CancelToken::new(), &mut |e| {
        events.push(e)
    });
    assert!(matches!(rejected, Err(EngineError::TurnInProgress(_))));
    assert!(events.is_empty());

    // A different player is not blocked.
    let other = orchestrator
        .run_turn(&PlayerId::from("p2"), "listen", &CancelToken::new(), &mut |_| {})
        .unwrap();
    assert_eq!(other.narrative.unwrap().narrative, "Elsewhere, a bell rings.");

    let first = first.join().unwrap().unwrap();
    assert_eq!(first.narrative.unwrap().narrative, "Slowly the fog lifts.");

    // The permit is released once the turn ends.
    assert!(matches!(
        orchestrator.run_turn(&player_id(), "again", &CancelToken::new(), &mut |_| {}),
        Ok(_)
    ));
}

#[test]
fn slow_narrator_is_truncated_at_the_deadline() {
    let mut config = no_crit();
    config.narrator.timeout_secs = 1;
    let narrator = ScriptedNarrator::new(vec![Reply::text(&[
        r#"{"narrative":"The wind "#,
        "howls.",
        r#" Then silence."}"#,
    ])
    .stall_before(2, Duration::from_secs(3))]);
    let orchestrator = Orchestrator::new(config, seeded_store(), narrator);

    let (result, events) = collect_turn(&orchestrator, "listen");
    let outcome = result.unwrap();
    assert!(outcome.truncated);
    assert_eq!(outcome.narrative.unwrap().narrative, "The wind howls.");
    assert!(matches!(events.last(), Some(TurnEvent::Done { .. })));
}

#[test]
fn cancellation_stops_calls_that_have_not_started() {
    let store = seeded_store();
    let narrator = ScriptedNarrator::new(vec![Reply::tools(&[
        ("add_item", json!({ "itemId": "rope", "name": "Rope", "quantity": 1 })),
        ("add_item", json!({ "itemId": "lamp", "name": "Lamp", "quantity": 1 })),
    ])]);
    let orchestrator = Orchestrator::new(no_crit(), store.clone(), narrator.clone());

    let cancel = CancelToken::new();
    let mut events = Vec::new();
    let outcome = orchestrator
        .run_turn(&player_id(), "grab everything", &cancel, &mut |e| {
            if matches!(e, TurnEvent::ToolStatus { status: ToolStatus::Success { .. }, .. }) {
                cancel.cancel();
            }
            events.push(e);
        })
        .unwrap();

    assert!(outcome.cancelled);
    assert_eq!(outcome.tool_calls.len(), 1);
    assert_eq!(narrator.calls(), 1);

    // The call that began is kept; the one after the cancel never ran.
    let inventory = store.load_inventory(&player_id()).unwrap();
    assert_eq!(inventory.quantity("rope"), 1);
    assert_eq!(inventory.quantity("lamp"), 0);

    assert!(outcome.narrative.is_none());
    assert!(matches!(events.last(), Some(TurnEvent::Error { .. })));
    assert_single_terminal_last(&events);
}

#[test]
fn store_outage_mid_turn_is_fatal() {
    let store = seeded_store();
    let narrator = ScriptedNarrator::new(vec![Reply::tools(&[(
        "get_player_state",
        json!({}),
    )])]);
    let orchestrator = Orchestrator::new(no_crit(), store.clone(), narrator);

    let mut events = Vec::new();
    let result = orchestrator.run_turn(&player_id(), "who am I", &CancelToken::new(), &mut |e| {
        if matches!(e, TurnEvent::ToolStatus { status: ToolStatus::Pending, .. }) {
            store.set_available(false);
        }
        events.push(e);
    });

    assert!(matches!(result, Err(EngineError::Store(StoreError::Unavailable(_)))));
    assert!(matches!(events.last(), Some(TurnEvent::Error { .. })));
    assert_single_terminal_last(&events);
}

#[test]
fn narrator_down_ends_with_an_error_event() {
    let orchestrator = Orchestrator::new(no_crit(), seeded_store(), Arc::new(DownNarrator));

    let (result, events) = collect_turn(&orchestrator, "hello");
    let outcome = result.unwrap();
    assert!(outcome.narrative.is_none());
    match events.last() {
        Some(TurnEvent::Error { message }) => assert!(message.contains("connection refused")),
        other => panic!("expected error event, got {:?}", other),
    }
}

#[test]
fn tool_rounds_are_bounded() {
    let mut config = EngineConfig {
        rng_seed: Some(1),
        ..EngineConfig::default()
    };
    config.narrator.max_tool_rounds = 2;
    let narrator = ScriptedNarrator::new(vec![
        Reply::tools(&[("get_player_state", json!({}))]),
        Reply::tools(&[("get_player_state", json!({}))]),
        Reply::tools(&[("get_player_state", json!({}))]),
    ]);
    let orchestrator = Orchestrator::new(config, seeded_store(), narrator.clone());

    let outcome = collect_turn(&orchestrator, "think hard").0.unwrap();
    assert_eq!(outcome.rounds, 2);
    assert_eq!(narrator.calls(), 2);
    assert_eq!(outcome.tool_calls.len(), 2);
}

#[test]
fn unknown_player_is_rejected_before_the_narrator() {
    let narrator = ScriptedNarrator::new(Vec::new());
    let orchestrator = Orchestrator::new(no_crit(), seeded_store(), narrator.clone());

    let result = orchestrator.run_turn(&PlayerId::from("ghost"), "hi", &CancelToken::new(), &mut |_| {});
    assert!(matches!(result, Err(EngineError::PlayerNotFound(_))));
    assert_eq!(narrator.calls(), 0);
}

#[test]
fn engine_loop_streams_events_and_rejects_overlap() {
    use std::sync::mpsc;

    use adventure_engine::engine::engine::Engine;
    use adventure_engine::engine::protocol::{EngineCommand, EngineResponse};

    let narrator = ScriptedNarrator::new(vec![Reply::text(&[
        r#"{"narrative":"#,
        r#""The candle gutters."}"#,
    ])
    .stall_before(1, Duration::from_millis(300))]);
    let orchestrator = Arc::new(Orchestrator::new(no_crit(), seeded_store(), narrator.clone()));

    let (cmd_tx, cmd_rx) = mpsc::channel();
    let (resp_tx, resp_rx) = mpsc::channel();
    let engine = thread::spawn(move || Engine::new(cmd_rx, resp_tx, orchestrator).run());

    let input = |text: &str| EngineCommand::PlayerInput {
        player_id: player_id(),
        text: text.into(),
        cancel: CancelToken::new(),
    };
    cmd_tx.send(input("wait")).unwrap();
    while narrator.calls() == 0 {
        thread::sleep(Duration::from_millis(5));
    }
    cmd_tx.send(input("wait more")).unwrap();

    let mut rejected = 0;
    let mut done = None;
    while done.is_none() || rejected == 0 {
        match resp_rx.recv_timeout(Duration::from_secs(5)).unwrap() {
            EngineResponse::Rejected { .. } => rejected += 1,
            EngineResponse::Turn {
                event: TurnEvent::Done { outcome },
                ..
            } => done = outcome.narrative,
            EngineResponse::Turn { .. } => {}
        }
    }
    assert_eq!(rejected, 1);
    assert_eq!(done.unwrap().narrative, "The candle gutters.");

    cmd_tx.send(EngineCommand::Shutdown).unwrap();
    engine.join().unwrap();
}
