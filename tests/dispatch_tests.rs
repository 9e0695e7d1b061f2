/// Tool dispatch against the in-memory store: validation, atomicity and
/// the battle lifecycle as the narrator drives it.

mod support;

use std::sync::Arc;

use serde_json::json;

use adventure_engine::engine::dispatcher::{narrative_from_result, Dispatcher};
use adventure_engine::engine::error::{StoreError, ToolError};
use adventure_engine::engine::store::{GameStore, InMemoryStore};
use adventure_engine::model::battle::BattleStatus;
use adventure_engine::model::game_state::{Equipment, EquipmentSlot, QuestStatus};
use adventure_engine::model::narrative::Mood;
use adventure_engine::model::tool_call::ToolResult;

use support::{no_crit, player_id, seeded_store, stats, template};

fn dispatcher() -> (Dispatcher, Arc<InMemoryStore>) {
    let store = seeded_store();
    (Dispatcher::new(store.clone(), no_crit()), store)
}

fn error_of(result: &ToolResult) -> ToolError {
    assert!(!result.success, "expected failure, got {:?}", result.data);
    assert!(result.state_delta.is_none());
    result.error.clone().unwrap()
}

#[test]
fn unknown_tool_and_bad_arguments_fail_inline() {
    let (d, _) = dispatcher();
    let id = player_id();

    let result = d.execute("cast_fireball", &json!({}), &id).unwrap();
    assert!(matches!(error_of(&result), ToolError::NotFound(_)));

    let result = d.execute("move_to_node", &json!({ "node": "tavern" }), &id).unwrap();
    assert!(matches!(error_of(&result), ToolError::Validation(_)));

    let result = d
        .execute("execute_battle_action", &json!({ "action": { "type": "dance" } }), &id)
        .unwrap();
    assert!(matches!(error_of(&result), ToolError::Validation(_)));
}

#[test]
fn battle_tools_need_an_active_battle() {
    let (d, _) = dispatcher();
    let result = d
        .execute("execute_battle_action", &json!({ "action": { "type": "attack" } }), &player_id())
        .unwrap();
    assert!(matches!(error_of(&result), ToolError::StateConflict(_)));
}

#[test]
fn moving_follows_connections() {
    let (d, store) = dispatcher();
    let id = player_id();

    let result = d.execute("move_to_node", &json!({ "nodeId": "cellar" }), &id).unwrap();
    assert!(matches!(error_of(&result), ToolError::StateConflict(_)));
    let result = d.execute("move_to_node", &json!({ "nodeId": "attic" }), &id).unwrap();
    assert!(matches!(error_of(&result), ToolError::NotFound(_)));

    let result = d.execute("move_to_node", &json!({ "nodeId": "tavern" }), &id).unwrap();
    assert!(result.success);
    let delta = result.state_delta.unwrap();
    assert_eq!(delta.location.unwrap().node_id, "tavern");
    assert_eq!(store.load_player(&id).unwrap().unwrap().location.node_id, "tavern");
}

#[test]
fn battle_runs_to_victory_and_pays_out() {
    let (d, store) = dispatcher();
    let id = player_id();

    d.execute("move_to_node", &json!({ "nodeId": "forest" }), &id).unwrap();
    let started = d.execute("start_battle", &json!({ "enemies": ["rat"] }), &id).unwrap();
    assert!(started.success);
    assert_eq!(started.data.as_ref().unwrap()["enemies"][0]["name"], "rat");
    assert!(store.load_battle(&id).unwrap().is_some());

    let again = d.execute("start_battle", &json!({ "enemies": ["rat"] }), &id).unwrap();
    assert!(matches!(error_of(&again), ToolError::StateConflict(_)));

    // Rejected action: the stored battle must not move.
    let before = store.load_battle(&id).unwrap();
    let bad = d
        .execute(
            "execute_battle_action",
            &json!({ "action": { "type": "skill", "skillId": "meteor" } }),
            &id,
        )
        .unwrap();
    assert!(matches!(error_of(&bad), ToolError::Validation(_)));
    assert_eq!(store.load_battle(&id).unwrap(), before);

    // Rat: 10 HP, 0 defense. Power strike does 18.
    let won = d
        .execute(
            "execute_battle_action",
            &json!({ "action": { "type": "skill", "skillId": "power_strike", "targetIndex": 0 } }),
            &id,
        )
        .unwrap();
    assert!(won.success);
    let data = won.data.as_ref().unwrap();
    assert_eq!(data["status"], "won");
    assert_eq!(data["rewards"]["exp"], 10);

    let delta = won.state_delta.unwrap();
    assert_eq!(delta.battle, Some(BattleStatus::Won));
    assert_eq!(delta.exp, 10);
    assert_eq!(delta.gold, 5);
    assert_eq!(delta.mp, -5);
    assert!(store.load_battle(&id).unwrap().is_none());
}

#[test]
fn leaving_the_node_flees_the_battle() {
    let (d, store) = dispatcher();
    let id = player_id();

    d.execute("move_to_node", &json!({ "nodeId": "forest" }), &id).unwrap();
    d.execute("start_battle", &json!({ "enemies": ["rat"] }), &id).unwrap();

    let talk = d.execute("interact_npc", &json!({ "npcId": "barkeep" }), &id).unwrap();
    assert!(matches!(error_of(&talk), ToolError::StateConflict(_)));

    let moved = d.execute("move_to_node", &json!({ "nodeId": "square" }), &id).unwrap();
    assert!(moved.success);
    assert_eq!(moved.data.as_ref().unwrap()["fled"]["escapedFrom"][0], "rat");
    assert_eq!(moved.state_delta.unwrap().battle, Some(BattleStatus::Fled));
    assert!(store.load_battle(&id).unwrap().is_none());
}

#[test]
fn losing_a_battle_rescues_the_player_for_a_price() {
    let (d, store) = dispatcher();
    let id = player_id();
    let mut area = store.load_area("village").unwrap().unwrap();
    area.enemy_templates.push(template("ogre", stats(500, 200, 0)));
    store.save_area(&area).unwrap();
    let mut player = store.load_player(&id).unwrap().unwrap();
    player.gold = 100;
    store.save_player(&player).unwrap();

    d.execute("start_battle", &json!({ "enemies": ["ogre"] }), &id).unwrap();
    // 200 attack - 5 defense against 100 HP.
    let lost = d
        .execute("execute_battle_action", &json!({ "action": { "type": "attack" } }), &id)
        .unwrap();
    assert!(lost.success);
    let data = lost.data.as_ref().unwrap();
    assert_eq!(data["status"], "lost");
    assert_eq!(data["penalty"]["goldLost"], 10);
    assert_eq!(data["penalty"]["hpRestoredTo"], 30);

    let delta = lost.state_delta.unwrap();
    assert_eq!(delta.battle, Some(BattleStatus::Lost));
    assert_eq!(delta.gold, -10);
    assert_eq!(delta.hp, -70);

    let player = store.load_player(&id).unwrap().unwrap();
    assert_eq!((player.gold, player.stats.hp, player.stats.mp), (90, 30, 50));
    assert!(store.load_battle(&id).unwrap().is_none());
}

#[test]
fn extreme_deltas_clamp_instead_of_overflowing() {
    let (d, store) = dispatcher();
    let id = player_id();

    let healed = d
        .execute("modify_player_data", &json!({ "hpDelta": i32::MAX, "mpDelta": i32::MAX }), &id)
        .unwrap();
    assert!(healed.success);
    let hurt = d
        .execute("modify_player_data", &json!({ "hpDelta": i32::MIN, "mpDelta": i32::MIN }), &id)
        .unwrap();
    assert!(hurt.success);
    let player = store.load_player(&id).unwrap().unwrap();
    assert_eq!((player.stats.hp, player.stats.mp), (0, 0));

    let rich = d.execute("modify_player_data", &json!({ "goldDelta": i64::MAX }), &id).unwrap();
    assert!(rich.success);
    assert_eq!(store.load_player(&id).unwrap().unwrap().gold, u32::MAX);

    d.execute("move_to_node", &json!({ "nodeId": "tavern" }), &id).unwrap();
    let adored = d
        .execute("interact_npc", &json!({ "npcId": "barkeep", "affinityDelta": i32::MAX }), &id)
        .unwrap();
    assert_eq!(adored.data.as_ref().unwrap()["affinity"], 100);
    let hated = d
        .execute("interact_npc", &json!({ "npcId": "barkeep", "affinityDelta": i32::MIN }), &id)
        .unwrap();
    assert_eq!(hated.data.as_ref().unwrap()["affinity"], -100);
}

#[test]
fn modify_player_checks_everything_before_changing_anything() {
    let (d, store) = dispatcher();
    let id = player_id();

    let result = d
        .execute("modify_player_data", &json!({ "hpDelta": -10, "goldDelta": -1 }), &id)
        .unwrap();
    assert!(matches!(error_of(&result), ToolError::Validation(_)));
    assert_eq!(store.load_player(&id).unwrap().unwrap().stats.hp, 100);

    let result = d
        .execute("modify_player_data", &json!({ "goldDelta": 30, "expDelta": 120 }), &id)
        .unwrap();
    let delta = result.state_delta.unwrap();
    assert_eq!(delta.gold, 30);
    assert_eq!(delta.level.map(|l| (l.from, l.to)), Some((1, 2)));
}

#[test]
fn npc_affinity_is_clamped() {
    let (d, store) = dispatcher();
    let id = player_id();
    d.execute("move_to_node", &json!({ "nodeId": "tavern" }), &id).unwrap();

    let result = d
        .execute(
            "interact_npc",
            &json!({ "npcId": "barkeep", "topic": "rumours", "affinityDelta": 20 }),
            &id,
        )
        .unwrap();
    assert_eq!(result.data.as_ref().unwrap()["affinity"], 100);
    assert_eq!(result.data.as_ref().unwrap()["affinityChange"], 5);

    let area = store.load_area("village").unwrap().unwrap();
    assert_eq!(area.node("tavern").unwrap().npcs[0].affinity, 100);
}

#[test]
fn quest_rewards_are_paid_once() {
    let (d, store) = dispatcher();
    let id = player_id();

    let created = d
        .execute(
            "create_quest",
            &json!({
                "id": "rats",
                "title": "Rat Problem",
                "objectives": [{ "id": "kill", "description": "Kill rats", "required": 3 }],
                "rewards": { "gold": 40, "items": [{ "itemId": "cheese", "name": "Cheese" }] }
            }),
            &id,
        )
        .unwrap();
    assert!(created.success);

    let partial = d
        .execute("update_quest", &json!({ "questId": "rats", "objectiveId": "kill", "progress": 2 }), &id)
        .unwrap();
    assert_eq!(partial.data.as_ref().unwrap()["status"], "active");
    assert_eq!(partial.state_delta.unwrap().gold, 0);

    let done = d
        .execute("update_quest", &json!({ "questId": "rats", "objectiveId": "kill", "progress": 5 }), &id)
        .unwrap();
    assert_eq!(done.data.as_ref().unwrap()["objective"]["progress"], 3);
    assert_eq!(done.state_delta.unwrap().gold, 40);
    assert_eq!(store.load_inventory(&id).unwrap().quantity("cheese"), 1);

    let again = d
        .execute("update_quest", &json!({ "questId": "rats", "objectiveId": "kill", "progress": 1 }), &id)
        .unwrap();
    assert!(matches!(error_of(&again), ToolError::StateConflict(_)));

    let quest = store.load_quest(&id, "rats").unwrap().unwrap();
    assert_eq!(quest.status, QuestStatus::Completed);
    assert!(quest.rewards_claimed);
    assert_eq!(store.load_player(&id).unwrap().unwrap().gold, 40);
}

#[test]
fn items_stack_and_are_consumed() {
    let (d, store) = dispatcher();
    let id = player_id();
    let potion = json!({
        "itemId": "potion",
        "name": "Potion",
        "quantity": 1,
        "effect": { "restoreHp": 30 }
    });
    d.execute("add_item", &potion, &id).unwrap();
    let added = d.execute("add_item", &potion, &id).unwrap();
    assert_eq!(added.data.as_ref().unwrap()["total"], 2);

    d.execute("modify_player_data", &json!({ "hpDelta": -50 }), &id).unwrap();
    let used = d.execute("use_item", &json!({ "itemId": "potion" }), &id).unwrap();
    let delta = used.state_delta.unwrap();
    assert_eq!(delta.hp, 30);
    assert_eq!(delta.items[0].quantity, -1);
    assert_eq!(store.load_inventory(&id).unwrap().quantity("potion"), 1);
}

#[test]
fn enhancing_costs_gold_per_level() {
    let (d, store) = dispatcher();
    let id = player_id();
    let mut player = store.load_player(&id).unwrap().unwrap();
    player.gold = 120;
    player.equipment.push(Equipment {
        id: "sword".into(),
        name: "Sword".into(),
        slot: EquipmentSlot::Weapon,
        attack_bonus: 2,
        defense_bonus: 0,
        enhance_level: 0,
        equipped: true,
    });
    store.save_player(&player).unwrap();

    let first = d.execute("enhance_equipment", &json!({ "equipmentId": "sword" }), &id).unwrap();
    assert_eq!(first.data.as_ref().unwrap()["goldSpent"], 50);
    assert_eq!(first.data.as_ref().unwrap()["attackBonus"], 5);
    assert_eq!(first.state_delta.unwrap().gold, -50);

    // Level 1 -> 2 costs 100, only 70 left.
    let second = d.execute("enhance_equipment", &json!({ "equipmentId": "sword" }), &id).unwrap();
    assert!(matches!(error_of(&second), ToolError::StateConflict(_)));
    let player = store.load_player(&id).unwrap().unwrap();
    assert_eq!(player.gold, 70);
    assert_eq!(player.equipment[0].enhance_level, 1);

    let missing = d.execute("enhance_equipment", &json!({ "equipmentId": "axe" }), &id).unwrap();
    assert!(matches!(error_of(&missing), ToolError::NotFound(_)));
}

#[test]
fn generated_area_is_stored_and_entered() {
    let (d, store) = dispatcher();
    let id = player_id();
    let area = json!({
        "id": "marsh",
        "name": "Grey Marsh",
        "nodes": [
            { "id": "shore", "name": "Shore", "connections": ["reeds"] },
            { "id": "reeds", "name": "Reeds", "connections": ["shore"], "encounters": ["toad"] }
        ],
        "enemyTemplates": [{
            "id": "toad",
            "name": "Bog Toad",
            "stats": {
                "hp": 20, "maxHp": 20, "mp": 0, "maxMp": 0,
                "attack": 4, "defense": 1, "speed": 3, "level": 2, "element": "water"
            }
        }]
    });

    let broken = d
        .execute(
            "generate_area",
            &json!({ "area": { "id": "pit", "name": "Pit", "nodes": [{ "id": "a", "name": "A", "connections": ["b"] }] } }),
            &id,
        )
        .unwrap();
    assert!(matches!(error_of(&broken), ToolError::Validation(_)));
    assert!(store.load_area("pit").unwrap().is_none());

    let made = d.execute("generate_area", &json!({ "area": area.clone(), "enter": true }), &id).unwrap();
    assert!(made.success);
    assert_eq!(made.data.as_ref().unwrap()["entered"], "shore");
    assert_eq!(made.state_delta.unwrap().location.unwrap().area_id, "marsh");
    assert_eq!(store.load_area("marsh").unwrap().unwrap().enemy_templates[0].name, "Bog Toad");

    let again = d.execute("generate_area", &json!({ "area": area }), &id).unwrap();
    assert!(matches!(error_of(&again), ToolError::StateConflict(_)));
}

#[test]
fn send_narrative_is_normalized_and_readable() {
    let (d, _) = dispatcher();
    let result = d
        .execute(
            "send_narrative",
            &json!({
                "narrative": "The rat squeaks.",
                "mood": "tense",
                "suggestions": [" Chase it ", "Chase it", "Ignore it"]
            }),
            &player_id(),
        )
        .unwrap();
    let narrative = narrative_from_result(&result).unwrap();
    assert_eq!(narrative.mood, Some(Mood::Tense));
    assert_eq!(narrative.suggestions.unwrap(), vec!["Chase it", "Ignore it"]);
}

#[test]
fn store_outage_is_an_error_not_a_tool_failure() {
    let (d, store) = dispatcher();
    store.set_available(false);
    let err = d
        .execute("get_player_state", &json!({}), &player_id())
        .unwrap_err();
    assert!(matches!(err, StoreError::Unavailable(_)));
}
