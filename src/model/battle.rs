use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::model::actor::{Actor, Skill};
use crate::model::game_state::PlayerId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DropEntry {
    pub item_id: String,
    pub name: String,
    /// Probability in [0, 1], rolled independently per defeated enemy.
    pub chance: f64,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

fn default_quantity() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BattlePhase {
    /// HP fraction in (0, 1]. Fires the first time the owner drops to or below it.
    pub hp_threshold: f32,
    #[serde(default)]
    pub unlocked_skills: Vec<String>,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnemyTemplate {
    pub id: String,
    pub name: String,
    /// Level and element are carried on the stats and fixed per template.
    pub stats: Actor,
    #[serde(default = "default_quantity")]
    pub count_min: u32,
    #[serde(default = "default_quantity")]
    pub count_max: u32,
    #[serde(default)]
    pub skills: Vec<Skill>,
    #[serde(default)]
    pub phases: Vec<BattlePhase>,
    #[serde(default)]
    pub exp: u32,
    #[serde(default)]
    pub gold: u32,
    #[serde(default)]
    pub drops: Vec<DropEntry>,
}

/// One enemy instance in a running battle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Enemy {
    pub template_id: String,
    pub name: String,
    pub actor: Actor,
    pub skills: Vec<Skill>,
    /// Sorted by descending threshold.
    pub phases: Vec<BattlePhase>,
    /// Indices into `phases` that already fired.
    pub triggered_phases: BTreeSet<usize>,
    pub unlocked_skills: BTreeSet<String>,
    pub statuses: BTreeSet<String>,
    pub cooldowns: BTreeMap<String, u32>,
    pub exp: u32,
    pub gold: u32,
    pub drops: Vec<DropEntry>,
}

impl Enemy {
    pub fn is_alive(&self) -> bool {
        self.actor.is_alive()
    }

    pub fn skill_unlocked(&self, skill: &Skill) -> bool {
        !skill.unlocked_by_phase
            || self.unlocked_skills.contains(&skill.id)
            || self.unlocked_skills.contains(&skill.name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BattlePlayer {
    pub name: String,
    /// Effective stats for the fight; attack and defense include equipment.
    pub actor: Actor,
    pub skills: Vec<Skill>,
    pub statuses: BTreeSet<String>,
    pub cooldowns: BTreeMap<String, u32>,
    /// Halves incoming damage for the current round only.
    pub defending: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BattleStatus {
    Active,
    Won,
    Lost,
    Fled,
}

impl BattleStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, BattleStatus::Active)
    }

    /// Only Active may move, and only to a terminal status.
    pub fn can_transition_to(self, next: BattleStatus) -> bool {
        self == BattleStatus::Active && next.is_terminal()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BattleLogEntry {
    pub round: u32,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BattleState {
    pub id: String,
    pub player_id: PlayerId,
    pub node_id: String,
    pub player: BattlePlayer,
    pub enemies: Vec<Enemy>,
    pub round: u32,
    pub status: BattleStatus,
    pub log: Vec<BattleLogEntry>,
}

impl BattleState {
    pub fn living_enemies(&self) -> impl Iterator<Item = (usize, &Enemy)> {
        self.enemies.iter().enumerate().filter(|(_, e)| e.is_alive())
    }

    pub fn all_enemies_defeated(&self) -> bool {
        self.enemies.iter().all(|e| !e.is_alive())
    }

    pub fn push_log(&mut self, text: String) {
        let round = self.round;
        self.log.push(BattleLogEntry { round, text });
    }
}

/// A player's declared action for one round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum BattleAction {
    Attack {
        #[serde(default)]
        target_index: Option<usize>,
    },
    Skill {
        skill_id: String,
        #[serde(default)]
        target_index: Option<usize>,
    },
    Defend,
    Item {
        item_id: String,
    },
    Flee,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionReport {
    pub actor: String,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    pub damage: i32,
    pub critical: bool,
    pub healed: i32,
    pub mp_spent: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_hp: Option<i32>,
    pub defeated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseEvent {
    pub enemy_index: usize,
    pub enemy: String,
    pub threshold: f32,
    pub unlocked_skills: Vec<String>,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelUp {
    pub from: u32,
    pub to: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DroppedItem {
    pub item_id: String,
    pub name: String,
    pub quantity: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BattleRewards {
    pub exp: u32,
    pub gold: u32,
    pub drops: Vec<DroppedItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level_up: Option<LevelUp>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefeatPenalty {
    pub gold_lost: u32,
    pub hp_restored_to: i32,
    pub mp_restored_to: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EscapeReport {
    pub escaped_from: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundReport {
    pub round: u32,
    pub player_action: ActionReport,
    pub enemy_actions: Vec<ActionReport>,
    pub status_ticks: Vec<ActionReport>,
    pub phase_events: Vec<PhaseEvent>,
    pub defeated: Vec<String>,
    pub status: BattleStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rewards: Option<BattleRewards>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub penalty: Option<DefeatPenalty>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub escape: Option<EscapeReport>,
}
