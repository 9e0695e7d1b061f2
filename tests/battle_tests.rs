/// Battle state machine and reward properties, driven round by round.

mod support;

use rand::rngs::StdRng;
use rand::SeedableRng;

use adventure_engine::engine::battle::{resolve_round, start_battle};
use adventure_engine::engine::config::BattleConfig;
use adventure_engine::engine::error::ToolError;
use adventure_engine::engine::progression::roll_drops;
use adventure_engine::model::battle::{BattleAction, BattlePhase, BattleStatus, DropEntry};
use adventure_engine::model::game_state::Inventory;

use support::{hero, stats, template};

fn no_crit() -> BattleConfig {
    BattleConfig {
        crit_chance: 0.0,
        ..BattleConfig::default()
    }
}

fn attack() -> BattleAction {
    BattleAction::Attack { target_index: None }
}

#[test]
fn each_phase_fires_exactly_once() {
    let mut boss = template("ogre", stats(300, 1, 0));
    boss.phases = vec![
        BattlePhase {
            hp_threshold: 0.2,
            unlocked_skills: Vec::new(),
            description: "desperate".into(),
        },
        BattlePhase {
            hp_threshold: 0.5,
            unlocked_skills: Vec::new(),
            description: "enraged".into(),
        },
    ];

    let mut player = hero();
    player.stats.attack = 40;
    player.stats.defense = 100;

    let mut rng = StdRng::seed_from_u64(1);
    let mut battle = start_battle("b1".into(), &player, &[boss], &mut rng);
    let mut inventory = Inventory::default();
    let config = no_crit();

    // 40 damage a round: 300 -> 20 over seven rounds.
    let mut fired = Vec::new();
    for round in 1..=7 {
        let report = resolve_round(&mut battle, &attack(), &mut inventory, &config, &mut rng).unwrap();
        for event in report.phase_events {
            fired.push((round, event.threshold));
        }
    }

    assert_eq!(battle.enemies[0].actor.hp, 20);
    assert_eq!(fired, vec![(4, 0.5), (6, 0.2)]);
    assert_eq!(battle.enemies[0].triggered_phases.len(), 2);

    let last = resolve_round(&mut battle, &attack(), &mut inventory, &config, &mut rng).unwrap();
    assert!(last.phase_events.is_empty());
    assert_eq!(last.status, BattleStatus::Won);
}

#[test]
fn rewards_sum_over_defeated_enemies() {
    let mut rat = template("rat", stats(5, 1, 0));
    rat.exp = 10;
    let mut bat = template("bat", stats(5, 1, 0));
    bat.exp = 15;

    let mut player = hero();
    player.stats.attack = 40;

    let mut rng = StdRng::seed_from_u64(2);
    let mut battle = start_battle("b2".into(), &player, &[rat, bat], &mut rng);
    let mut inventory = Inventory::default();
    let config = no_crit();

    let first = resolve_round(&mut battle, &attack(), &mut inventory, &config, &mut rng).unwrap();
    assert_eq!(first.status, BattleStatus::Active);
    assert_eq!(first.defeated, vec!["rat".to_string()]);

    let second = resolve_round(&mut battle, &attack(), &mut inventory, &config, &mut rng).unwrap();
    assert_eq!(second.status, BattleStatus::Won);
    let rewards = second.rewards.unwrap();
    assert_eq!(rewards.exp, 25);
    assert_eq!(rewards.gold, 10);
}

#[test]
fn drop_chance_is_respected() {
    let entry = |chance: f64| DropEntry {
        item_id: "fang".into(),
        name: "Fang".into(),
        chance,
        quantity: 1,
    };
    let mut rng = StdRng::seed_from_u64(3);
    let mut count = |chance: f64| {
        (0..1000)
            .filter(|_| !roll_drops(&[entry(chance)], &mut rng).is_empty())
            .count()
    };

    assert_eq!(count(1.0), 1000);
    assert_eq!(count(0.0), 0);
    let half = count(0.5);
    assert!((400..=600).contains(&half), "0.5 chance dropped {} times", half);
}

#[test]
fn invalid_skill_leaves_battle_untouched() {
    let player = hero();
    let mut rng = StdRng::seed_from_u64(4);
    let mut battle = start_battle("b3".into(), &player, &[template("rat", stats(30, 3, 0))], &mut rng);
    let mut inventory = Inventory::default();
    let before = battle.clone();

    let action = BattleAction::Skill {
        skill_id: "meteor".into(),
        target_index: None,
    };
    let err = resolve_round(&mut battle, &action, &mut inventory, &no_crit(), &mut rng).unwrap_err();
    assert!(matches!(err, ToolError::Validation(_)));
    assert_eq!(battle, before);

    let action = BattleAction::Attack { target_index: Some(5) };
    assert!(resolve_round(&mut battle, &action, &mut inventory, &no_crit(), &mut rng).is_err());
    assert_eq!(battle, before);
}

#[test]
fn one_shot_skill_wins_with_rewards() {
    // 100 HP / 50 MP hero; power strike lands 25 on a 20 HP enemy.
    let mut player = hero();
    player.stats.attack = 17;
    assert_eq!((player.stats.hp, player.stats.mp), (100, 50));

    let mut rng = StdRng::seed_from_u64(5);
    let mut battle = start_battle("b4".into(), &player, &[template("wolf", stats(20, 3, 1))], &mut rng);
    let mut inventory = Inventory::default();

    let action = BattleAction::Skill {
        skill_id: "power_strike".into(),
        target_index: Some(0),
    };
    let report = resolve_round(&mut battle, &action, &mut inventory, &no_crit(), &mut rng).unwrap();

    // round(17 * 1.5) - 1 = 25.
    assert_eq!(report.player_action.damage, 25);
    assert!(report.player_action.defeated);
    assert!(report.enemy_actions.is_empty());
    assert_eq!(report.status, BattleStatus::Won);
    let rewards = report.rewards.unwrap();
    assert_eq!((rewards.exp, rewards.gold), (10, 5));
    assert_eq!(battle.player.actor.hp, 100);
    assert_eq!(battle.player.actor.mp, 45);
    assert_eq!(battle.round, 1);
}

#[test]
fn a_certain_crit_doubles_damage() {
    let player = hero();
    let mut rng = StdRng::seed_from_u64(8);
    let mut battle = start_battle("b7".into(), &player, &[template("ogre", stats(100, 1, 2))], &mut rng);
    let mut inventory = Inventory::default();
    let config = BattleConfig {
        crit_chance: 1.0,
        crit_multiplier: 2.0,
        ..BattleConfig::default()
    };

    // (12 - 2) * 2.
    let report = resolve_round(&mut battle, &attack(), &mut inventory, &config, &mut rng).unwrap();
    assert!(report.player_action.critical);
    assert_eq!(report.player_action.damage, 20);
}

#[test]
fn enemies_act_in_list_order_not_speed() {
    let mut slow = template("slow", stats(50, 2, 0));
    slow.stats.speed = 1;
    let mut fast = template("fast", stats(50, 2, 0));
    fast.stats.speed = 99;

    let player = hero();
    let mut rng = StdRng::seed_from_u64(6);
    let mut battle = start_battle("b5".into(), &player, &[slow, fast], &mut rng);
    let mut inventory = Inventory::default();

    let report = resolve_round(&mut battle, &BattleAction::Defend, &mut inventory, &no_crit(), &mut rng).unwrap();
    let actors: Vec<&str> = report.enemy_actions.iter().map(|a| a.actor.as_str()).collect();
    assert_eq!(actors, vec!["slow", "fast"]);
    assert_eq!(battle.round, 2);
}

#[test]
fn finished_battle_rejects_further_rounds() {
    let player = hero();
    let mut rng = StdRng::seed_from_u64(7);
    let mut battle = start_battle("b6".into(), &player, &[template("rat", stats(10, 3, 0))], &mut rng);
    let mut inventory = Inventory::default();

    let report = resolve_round(&mut battle, &BattleAction::Flee, &mut inventory, &no_crit(), &mut rng).unwrap();
    assert_eq!(report.status, BattleStatus::Fled);
    assert_eq!(report.escape.unwrap().escaped_from, vec!["rat".to_string()]);

    let err = resolve_round(&mut battle, &attack(), &mut inventory, &no_crit(), &mut rng).unwrap_err();
    assert!(matches!(err, ToolError::StateConflict(_)));
    assert_eq!(battle.status, BattleStatus::Fled);
}
