use rand::Rng;
use tracing::debug;

use crate::engine::config::BattleConfig;
use crate::engine::error::ToolError;
use crate::engine::progression::collect_rewards;
use crate::model::actor::{Actor, Skill, SkillEffect, POISON};
use crate::model::battle::{
    ActionReport, BattleAction, BattlePlayer, BattleState, BattleStatus, Enemy, EnemyTemplate,
    EscapeReport, PhaseEvent, RoundReport,
};
use crate::model::game_state::{Inventory, InventoryItem, ItemKind, Player};

/// `max(1, attack * multiplier - defense)`, before critical hits.
pub fn compute_damage(attack: i32, multiplier: f32, defense: i32) -> i32 {
    ((attack as f32 * multiplier).round() as i32 - defense).max(1)
}

fn roll_damage<R: Rng>(
    attack: i32,
    multiplier: f32,
    defense: i32,
    config: &BattleConfig,
    rng: &mut R,
) -> (i32, bool) {
    let base = compute_damage(attack, multiplier, defense);
    let critical = config.crit_chance > 0.0 && rng.gen::<f32>() < config.crit_chance;
    if critical {
        ((((base as f32) * config.crit_multiplier).round() as i32).max(1), true)
    } else {
        (base, false)
    }
}

fn instance_suffix(index: u32) -> String {
    if index < 26 {
        ((b'A' + index as u8) as char).to_string()
    } else {
        (index + 1).to_string()
    }
}

/// Rolls each template's count within its range and builds fresh enemies.
pub fn instantiate_enemies<R: Rng>(templates: &[EnemyTemplate], rng: &mut R) -> Vec<Enemy> {
    let mut enemies = Vec::new();

    for template in templates {
        let low = template.count_min.max(1);
        let high = template.count_max.max(low);
        let count = rng.gen_range(low..=high);

        let mut phases = template.phases.clone();
        phases.sort_by(|a, b| b.hp_threshold.total_cmp(&a.hp_threshold));

        for i in 0..count {
            let name = if count > 1 {
                format!("{} {}", template.name, instance_suffix(i))
            } else {
                template.name.clone()
            };
            let mut actor = template.stats.clone();
            actor.hp = actor.max_hp;
            actor.mp = actor.max_mp;

            enemies.push(Enemy {
                template_id: template.id.clone(),
                name,
                actor,
                skills: template.skills.clone(),
                phases: phases.clone(),
                triggered_phases: Default::default(),
                unlocked_skills: Default::default(),
                statuses: Default::default(),
                cooldowns: Default::default(),
                exp: template.exp,
                gold: template.gold,
                drops: template.drops.clone(),
            });
        }
    }

    enemies
}

pub fn start_battle<R: Rng>(
    battle_id: String,
    player: &Player,
    templates: &[EnemyTemplate],
    rng: &mut R,
) -> BattleState {
    let enemies = instantiate_enemies(templates, rng);

    let actor = Actor {
        attack: player.attack_power(),
        defense: player.defense_power(),
        ..player.stats.clone()
    };

    let mut state = BattleState {
        id: battle_id,
        player_id: player.id.clone(),
        node_id: player.location.node_id.clone(),
        player: BattlePlayer {
            name: player.name.clone(),
            actor,
            skills: player.usable_skills(),
            statuses: player.statuses.clone(),
            cooldowns: Default::default(),
            defending: false,
        },
        enemies,
        round: 1,
        status: BattleStatus::Active,
        log: Vec::new(),
    };

    let names: Vec<&str> = state.enemies.iter().map(|e| e.name.as_str()).collect();
    let opening = format!("{} faces {}", player.name, names.join(", "));
    state.push_log(opening);
    state
}

/// Copies the fight's HP, MP and statuses back onto the long-lived player.
pub fn write_back(player: &mut Player, battle: &BattleState) {
    player.stats.hp = battle.player.actor.hp.clamp(0, player.stats.max_hp);
    player.stats.mp = battle.player.actor.mp.clamp(0, player.stats.max_mp);
    player.statuses = battle.player.statuses.clone();
}

fn set_status(state: &mut BattleState, next: BattleStatus) -> Result<(), ToolError> {
    if !state.status.can_transition_to(next) {
        return Err(ToolError::StateConflict(format!(
            "battle cannot move from {:?} to {:?}",
            state.status, next
        )));
    }
    state.status = next;
    Ok(())
}

/// Ends the battle without rewards or penalty.
pub fn escape(state: &mut BattleState) -> Result<EscapeReport, ToolError> {
    set_status(state, BattleStatus::Fled)?;
    let escaped_from: Vec<String> = state
        .living_enemies()
        .map(|(_, e)| e.name.clone())
        .collect();
    let text = format!("{} escapes from {}", state.player.name, escaped_from.join(", "));
    state.push_log(text);
    Ok(EscapeReport { escaped_from })
}

enum PlannedAction {
    Attack { target: usize },
    Skill { skill: Skill, target: Option<usize> },
    Defend,
    Item { item: InventoryItem },
    Flee,
}

fn pick_target(state: &BattleState, index: Option<usize>) -> Result<usize, ToolError> {
    match index {
        Some(i) => {
            let Some(enemy) = state.enemies.get(i) else {
                return Err(ToolError::Validation(format!(
                    "targetIndex {} is out of range (0..{})",
                    i,
                    state.enemies.len()
                )));
            };
            if !enemy.is_alive() {
                return Err(ToolError::StateConflict(format!(
                    "{} is already defeated",
                    enemy.name
                )));
            }
            Ok(i)
        }
        None => state
            .living_enemies()
            .map(|(i, _)| i)
            .next()
            .ok_or_else(|| ToolError::StateConflict("no enemy left to target".into())),
    }
}

/// Validates the declared action against the battle without touching it.
fn plan(
    state: &BattleState,
    action: &BattleAction,
    inventory: &Inventory,
) -> Result<PlannedAction, ToolError> {
    match action {
        BattleAction::Attack { target_index } => Ok(PlannedAction::Attack {
            target: pick_target(state, *target_index)?,
        }),

        BattleAction::Skill {
            skill_id,
            target_index,
        } => {
            let Some(skill) = state.player.skills.iter().find(|s| s.matches(skill_id)) else {
                return Err(ToolError::Validation(format!(
                    "skill '{}' is not equipped",
                    skill_id
                )));
            };
            if skill.mp_cost > state.player.actor.mp {
                return Err(ToolError::StateConflict(format!(
                    "{} needs {} MP, only {} left",
                    skill.name, skill.mp_cost, state.player.actor.mp
                )));
            }
            if let Some(rounds) = state.player.cooldowns.get(&skill.id).filter(|r| **r > 0) {
                return Err(ToolError::StateConflict(format!(
                    "{} is on cooldown for {} more round(s)",
                    skill.name, rounds
                )));
            }
            let target = match skill.effect {
                SkillEffect::Heal => None,
                SkillEffect::Damage | SkillEffect::Poison => {
                    Some(pick_target(state, *target_index)?)
                }
            };
            Ok(PlannedAction::Skill {
                skill: skill.clone(),
                target,
            })
        }

        BattleAction::Defend => Ok(PlannedAction::Defend),

        BattleAction::Item { item_id } => {
            let Some(item) = inventory.get(item_id) else {
                return Err(ToolError::NotFound(format!(
                    "item '{}' is not in the inventory",
                    item_id
                )));
            };
            if item.kind != ItemKind::Consumable || item.effect.is_none() {
                return Err(ToolError::Validation(format!(
                    "{} cannot be used in battle",
                    item.name
                )));
            }
            Ok(PlannedAction::Item { item: item.clone() })
        }

        BattleAction::Flee => Ok(PlannedAction::Flee),
    }
}

fn new_report(state: &BattleState, player_action: ActionReport) -> RoundReport {
    RoundReport {
        round: state.round,
        player_action,
        enemy_actions: Vec::new(),
        status_ticks: Vec::new(),
        phase_events: Vec::new(),
        defeated: Vec::new(),
        status: state.status,
        rewards: None,
        penalty: None,
        escape: None,
    }
}

/// Highest priority skill that is unlocked, affordable and off cooldown.
/// Ties go to the skill listed first.
pub fn choose_enemy_skill(enemy: &Enemy) -> Option<&Skill> {
    let mut best: Option<&Skill> = None;
    for skill in &enemy.skills {
        if !enemy.skill_unlocked(skill) || skill.mp_cost > enemy.actor.mp {
            continue;
        }
        if enemy.cooldowns.get(&skill.id).copied().unwrap_or(0) > 0 {
            continue;
        }
        if skill.effect == SkillEffect::Heal && enemy.actor.hp >= enemy.actor.max_hp {
            continue;
        }
        if best.map_or(true, |b| skill.priority > b.priority) {
            best = Some(skill);
        }
    }
    best
}

fn start_cooldown(cooldowns: &mut std::collections::BTreeMap<String, u32>, skill: &Skill) {
    if skill.cooldown > 0 {
        // +1 because every cooldown ticks once at the end of the round it was used in.
        cooldowns.insert(skill.id.clone(), skill.cooldown + 1);
    }
}

fn tick_cooldowns(cooldowns: &mut std::collections::BTreeMap<String, u32>) {
    for rounds in cooldowns.values_mut() {
        *rounds = rounds.saturating_sub(1);
    }
    cooldowns.retain(|_, rounds| *rounds > 0);
}

fn apply_player_action<R: Rng>(
    state: &mut BattleState,
    planned: PlannedAction,
    inventory: &mut Inventory,
    defeated: &mut Vec<String>,
    config: &BattleConfig,
    rng: &mut R,
) -> ActionReport {
    let mut report = ActionReport {
        actor: state.player.name.clone(),
        ..Default::default()
    };

    match planned {
        PlannedAction::Attack { target } => {
            let (damage, critical) = roll_damage(
                state.player.actor.attack,
                1.0,
                state.enemies[target].actor.defense,
                config,
                rng,
            );
            let enemy = &mut state.enemies[target];
            enemy.actor.take_damage(damage);
            report.action = "attack".into();
            report.target = Some(enemy.name.clone());
            report.damage = damage;
            report.critical = critical;
            report.target_hp = Some(enemy.actor.hp);
            report.defeated = !enemy.is_alive();
        }

        PlannedAction::Skill { skill, target } => {
            state.player.actor.mp -= skill.mp_cost;
            start_cooldown(&mut state.player.cooldowns, &skill);
            report.action = skill.name.clone();
            report.mp_spent = skill.mp_cost;

            match (skill.effect, target) {
                (SkillEffect::Heal, _) | (_, None) => {
                    let amount = (state.player.actor.attack as f32 * skill.damage).round() as i32;
                    report.healed = state.player.actor.restore_hp(amount);
                    report.target = Some(state.player.name.clone());
                    report.target_hp = Some(state.player.actor.hp);
                }
                (effect, Some(target)) => {
                    let (damage, critical) = roll_damage(
                        state.player.actor.attack,
                        skill.damage,
                        state.enemies[target].actor.defense,
                        config,
                        rng,
                    );
                    let enemy = &mut state.enemies[target];
                    enemy.actor.take_damage(damage);
                    if effect == SkillEffect::Poison && enemy.is_alive() {
                        enemy.statuses.insert(POISON.to_string());
                    }
                    report.target = Some(enemy.name.clone());
                    report.damage = damage;
                    report.critical = critical;
                    report.target_hp = Some(enemy.actor.hp);
                    report.defeated = !enemy.is_alive();
                }
            }
        }

        PlannedAction::Defend => {
            state.player.defending = true;
            report.action = "defend".into();
        }

        PlannedAction::Item { item } => {
            inventory.take(&item.id, 1);
            let effect = item.effect.unwrap_or_default();
            report.action = item.name.clone();
            report.healed = state.player.actor.restore_hp(effect.restore_hp);
            state.player.actor.restore_mp(effect.restore_mp);
            for cure in &effect.cures {
                state.player.statuses.remove(cure);
            }
            report.target = Some(state.player.name.clone());
            report.target_hp = Some(state.player.actor.hp);
        }

        // Handled before any other effect is applied.
        PlannedAction::Flee => {}
    }

    if report.defeated {
        if let Some(name) = &report.target {
            defeated.push(name.clone());
        }
    }
    report
}

fn enemy_turn<R: Rng>(
    state: &mut BattleState,
    index: usize,
    config: &BattleConfig,
    rng: &mut R,
) -> ActionReport {
    let skill = choose_enemy_skill(&state.enemies[index]).cloned();
    let enemy = &mut state.enemies[index];
    let player = &mut state.player;

    let mut report = ActionReport {
        actor: enemy.name.clone(),
        target: Some(player.name.clone()),
        ..Default::default()
    };

    let (multiplier, effect) = match &skill {
        Some(skill) => {
            enemy.actor.mp -= skill.mp_cost;
            start_cooldown(&mut enemy.cooldowns, skill);
            report.action = skill.name.clone();
            report.mp_spent = skill.mp_cost;
            (skill.damage, skill.effect)
        }
        None => {
            report.action = "attack".into();
            (1.0, SkillEffect::Damage)
        }
    };

    if effect == SkillEffect::Heal {
        let amount = (enemy.actor.attack as f32 * multiplier).round() as i32;
        report.healed = enemy.actor.restore_hp(amount);
        report.target = Some(enemy.name.clone());
        report.target_hp = Some(enemy.actor.hp);
        return report;
    }

    let (mut damage, critical) =
        roll_damage(enemy.actor.attack, multiplier, player.actor.defense, config, rng);
    if player.defending {
        damage = (((damage as f32) * config.defend_factor).round() as i32).max(1);
    }
    player.actor.take_damage(damage);
    if effect == SkillEffect::Poison && player.actor.is_alive() {
        player.statuses.insert(POISON.to_string());
    }

    report.damage = damage;
    report.critical = critical;
    report.target_hp = Some(player.actor.hp);
    report.defeated = !player.actor.is_alive();
    report
}

fn poison_tick(actor: &mut Actor, config: &BattleConfig) -> i32 {
    let damage = ((actor.max_hp as f32 * config.poison_fraction).round() as i32).max(1);
    actor.take_damage(damage);
    damage
}

fn end_of_round_ticks(state: &mut BattleState, report: &mut RoundReport, config: &BattleConfig) {
    if state.player.actor.is_alive() && state.player.statuses.contains(POISON) {
        let damage = poison_tick(&mut state.player.actor, config);
        report.status_ticks.push(ActionReport {
            actor: POISON.into(),
            action: POISON.into(),
            target: Some(state.player.name.clone()),
            damage,
            target_hp: Some(state.player.actor.hp),
            defeated: !state.player.actor.is_alive(),
            ..Default::default()
        });
    }

    for enemy in state.enemies.iter_mut() {
        if enemy.is_alive() && enemy.statuses.contains(POISON) {
            let damage = poison_tick(&mut enemy.actor, config);
            let defeated = !enemy.is_alive();
            if defeated {
                report.defeated.push(enemy.name.clone());
            }
            report.status_ticks.push(ActionReport {
                actor: POISON.into(),
                action: POISON.into(),
                target: Some(enemy.name.clone()),
                damage,
                target_hp: Some(enemy.actor.hp),
                defeated,
                ..Default::default()
            });
        }
        tick_cooldowns(&mut enemy.cooldowns);
    }
    tick_cooldowns(&mut state.player.cooldowns);
}

/// Fires every not-yet-fired phase whose threshold the enemy's HP fraction
/// is now at or below. Thresholds are visited in descending order.
pub fn check_phases(state: &mut BattleState) -> Vec<PhaseEvent> {
    let mut events = Vec::new();

    for (index, enemy) in state.enemies.iter_mut().enumerate() {
        if !enemy.is_alive() {
            continue;
        }
        let fraction = enemy.actor.hp_fraction();
        for (phase_index, phase) in enemy.phases.iter().enumerate() {
            if enemy.triggered_phases.contains(&phase_index) || fraction > phase.hp_threshold {
                continue;
            }
            enemy.triggered_phases.insert(phase_index);
            enemy
                .unlocked_skills
                .extend(phase.unlocked_skills.iter().cloned());
            events.push(PhaseEvent {
                enemy_index: index,
                enemy: enemy.name.clone(),
                threshold: phase.hp_threshold,
                unlocked_skills: phase.unlocked_skills.clone(),
                description: phase.description.clone(),
            });
        }
    }

    for event in &events {
        let text = format!(
            "{} enters a new phase at {:.0}% HP: {}",
            event.enemy,
            event.threshold * 100.0,
            event.description
        );
        state.push_log(text);
    }
    events
}

fn log_action(state: &mut BattleState, action: &ActionReport) {
    let mut text = format!("{} uses {}", action.actor, action.action);
    if let Some(target) = &action.target {
        text.push_str(&format!(" on {}", target));
    }
    if action.damage > 0 {
        text.push_str(&format!(" for {} damage", action.damage));
    }
    if action.critical {
        text.push_str(" (critical)");
    }
    if action.healed > 0 {
        text.push_str(&format!(", restoring {} HP", action.healed));
    }
    if action.defeated {
        text.push_str(", defeating them");
    }
    state.push_log(text);
}

/// Resolves one full round: the player's action, every living enemy's
/// response in list order, end-of-round status effects, phase checks and
/// the terminal check. Validation happens before anything is applied, so
/// an `Err` leaves `state` and `inventory` untouched.
pub fn resolve_round<R: Rng>(
    state: &mut BattleState,
    action: &BattleAction,
    inventory: &mut Inventory,
    config: &BattleConfig,
    rng: &mut R,
) -> Result<RoundReport, ToolError> {
    if state.status != BattleStatus::Active {
        return Err(ToolError::StateConflict(format!(
            "battle is already over ({:?})",
            state.status
        )));
    }

    let planned = plan(state, action, inventory)?;

    if let PlannedAction::Flee = planned {
        let escape_report = escape(state)?;
        let mut report = new_report(
            state,
            ActionReport {
                actor: state.player.name.clone(),
                action: "flee".into(),
                ..Default::default()
            },
        );
        report.status = state.status;
        report.escape = Some(escape_report);
        return Ok(report);
    }

    state.player.defending = false;
    let mut defeated = Vec::new();
    let player_action = apply_player_action(state, planned, inventory, &mut defeated, config, rng);
    log_action(state, &player_action);

    let mut report = new_report(state, player_action);
    report.defeated = defeated;

    for index in 0..state.enemies.len() {
        if !state.player.actor.is_alive() {
            break;
        }
        if !state.enemies[index].is_alive() {
            continue;
        }
        let action = enemy_turn(state, index, config, rng);
        log_action(state, &action);
        report.enemy_actions.push(action);
    }

    end_of_round_ticks(state, &mut report, config);
    report.phase_events = check_phases(state);

    if !state.player.actor.is_alive() {
        set_status(state, BattleStatus::Lost)?;
        let text = format!("{} falls", state.player.name);
        state.push_log(text);
    } else if state.all_enemies_defeated() {
        set_status(state, BattleStatus::Won)?;
        report.rewards = Some(collect_rewards(&state.enemies, rng));
        let text = format!("{} is victorious", state.player.name);
        state.push_log(text);
    } else {
        state.round += 1;
    }

    report.status = state.status;
    debug!(
        battle = %state.id,
        round = report.round,
        status = ?report.status,
        phases = report.phase_events.len(),
        "battle round resolved"
    );
    Ok(report)
}
