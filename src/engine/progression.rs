use rand::Rng;

use crate::engine::config::BattleConfig;
use crate::model::battle::{BattleRewards, DefeatPenalty, DropEntry, DroppedItem, Enemy, LevelUp};
use crate::model::game_state::{Inventory, InventoryItem, ItemKind, Player, QuestRewards};

/// Each entry drops independently with probability `chance`.
pub fn roll_drops<R: Rng>(drops: &[DropEntry], rng: &mut R) -> Vec<DroppedItem> {
    drops
        .iter()
        .filter(|entry| rng.gen::<f64>() < entry.chance)
        .map(|entry| DroppedItem {
            item_id: entry.item_id.clone(),
            name: entry.name.clone(),
            quantity: entry.quantity.max(1),
        })
        .collect()
}

/// Sums exp and gold over every defeated enemy and rolls their drops.
pub fn collect_rewards<R: Rng>(enemies: &[Enemy], rng: &mut R) -> BattleRewards {
    let mut rewards = BattleRewards::default();

    for enemy in enemies.iter().filter(|e| !e.is_alive()) {
        rewards.exp = rewards.exp.saturating_add(enemy.exp);
        rewards.gold = rewards.gold.saturating_add(enemy.gold);

        for dropped in roll_drops(&enemy.drops, rng) {
            match rewards.drops.iter_mut().find(|d| d.item_id == dropped.item_id) {
                Some(existing) => existing.quantity = existing.quantity.saturating_add(dropped.quantity),
                None => rewards.drops.push(dropped),
            }
        }
    }

    rewards
}

pub fn exp_to_next(level: u32, config: &BattleConfig) -> u32 {
    level.max(1).saturating_mul(config.exp_per_level.max(1))
}

/// Adds exp and applies every level-up it pays for. HP and MP are refilled
/// when at least one level is gained.
pub fn apply_exp(player: &mut Player, amount: u32, config: &BattleConfig) -> Option<LevelUp> {
    let from = player.stats.level;
    player.exp = player.exp.saturating_add(amount);

    loop {
        let needed = exp_to_next(player.stats.level, config);
        if player.exp < needed {
            break;
        }
        player.exp -= needed;
        player.stats.level += 1;
        player.stats.max_hp += config.level_hp_gain;
        player.stats.max_mp += config.level_mp_gain;
        player.stats.attack += config.level_attack_gain;
        player.stats.defense += config.level_defense_gain;
    }

    if player.stats.level == from {
        return None;
    }
    player.stats.hp = player.stats.max_hp;
    player.stats.mp = player.stats.max_mp;
    Some(LevelUp {
        from,
        to: player.stats.level,
    })
}

/// Credits a won battle to the player and records any level-up on `rewards`.
pub fn grant_battle_rewards(
    player: &mut Player,
    inventory: &mut Inventory,
    rewards: &mut BattleRewards,
    config: &BattleConfig,
) {
    player.gold = player.gold.saturating_add(rewards.gold);
    for dropped in &rewards.drops {
        inventory.add(InventoryItem {
            id: dropped.item_id.clone(),
            name: dropped.name.clone(),
            kind: ItemKind::Material,
            quantity: dropped.quantity,
            description: None,
            effect: None,
        });
    }
    rewards.level_up = apply_exp(player, rewards.exp, config);
}

pub fn grant_quest_rewards(
    player: &mut Player,
    inventory: &mut Inventory,
    rewards: &QuestRewards,
    config: &BattleConfig,
) -> Option<LevelUp> {
    player.gold = player.gold.saturating_add(rewards.gold);
    for item in &rewards.items {
        inventory.add(InventoryItem {
            id: item.item_id.clone(),
            name: item.name.clone(),
            kind: ItemKind::Material,
            quantity: item.quantity,
            description: None,
            effect: None,
        });
    }
    apply_exp(player, rewards.exp, config)
}

fn percent_ceil(value: i32, percent: u32) -> i32 {
    let scaled = value.max(0) as i64 * percent.min(100) as i64;
    ((scaled + 99) / 100) as i32
}

/// Gold loss plus a rescue: HP and MP are raised to a floor of their maximum.
pub fn apply_defeat_penalty(player: &mut Player, config: &BattleConfig) -> DefeatPenalty {
    let gold_lost = (player.gold as u64 * config.defeat_gold_percent.min(100) as u64 / 100) as u32;
    player.gold -= gold_lost;

    let hp_floor = percent_ceil(player.stats.max_hp, config.rescue_hp_percent);
    let mp_floor = percent_ceil(player.stats.max_mp, config.rescue_mp_percent);
    player.stats.hp = player.stats.hp.max(hp_floor).max(1);
    player.stats.mp = player.stats.mp.max(mp_floor);
    player.statuses.clear();

    DefeatPenalty {
        gold_lost,
        hp_restored_to: player.stats.hp,
        mp_restored_to: player.stats.mp,
    }
}
