use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::model::actor::{Actor, Element, Skill, SkillEffect};
use crate::model::battle::EnemyTemplate;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub String);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlayerId {
    fn from(id: &str) -> Self {
        PlayerId(id.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub area_id: String,
    pub node_id: String,
}

/// Long-lived player record. The store owns it, tools mutate it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub stats: Actor,

    /// Experience collected towards the next level.
    pub exp: u32,
    pub gold: u32,

    pub skills: Vec<Skill>,
    /// Ids of the skills usable right now.
    pub equipped_skills: Vec<String>,
    pub equipment: Vec<Equipment>,

    #[serde(default)]
    pub statuses: BTreeSet<String>,
    pub location: Location,
    #[serde(default)]
    pub flags: BTreeSet<String>,
}

impl Player {
    pub fn new(id: PlayerId, name: &str, location: Location) -> Self {
        Self {
            id,
            name: name.to_string(),
            stats: Actor {
                hp: 100,
                max_hp: 100,
                mp: 50,
                max_mp: 50,
                attack: 12,
                defense: 5,
                speed: 10,
                level: 1,
                element: Element::Neutral,
            },
            exp: 0,
            gold: 0,
            skills: vec![Skill {
                id: "power_strike".into(),
                name: "Power Strike".into(),
                damage: 1.5,
                mp_cost: 5,
                cooldown: 0,
                effect: SkillEffect::Damage,
                priority: 0,
                unlocked_by_phase: false,
            }],
            equipped_skills: vec!["power_strike".into()],
            equipment: Vec::new(),
            statuses: BTreeSet::new(),
            location,
            flags: BTreeSet::new(),
        }
    }

    pub fn equipped_skill(&self, key: &str) -> Option<&Skill> {
        self.skills
            .iter()
            .find(|s| s.matches(key) && self.equipped_skills.contains(&s.id))
    }

    pub fn usable_skills(&self) -> Vec<Skill> {
        self.skills
            .iter()
            .filter(|s| self.equipped_skills.contains(&s.id))
            .cloned()
            .collect()
    }

    pub fn attack_power(&self) -> i32 {
        self.stats.attack
            + self
                .equipment
                .iter()
                .filter(|e| e.equipped)
                .map(|e| e.attack_bonus)
                .sum::<i32>()
    }

    pub fn defense_power(&self) -> i32 {
        self.stats.defense
            + self
                .equipment
                .iter()
                .filter(|e| e.equipped)
                .map(|e| e.defense_bonus)
                .sum::<i32>()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EquipmentSlot {
    Weapon,
    Armor,
    Accessory,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Equipment {
    pub id: String,
    pub name: String,
    pub slot: EquipmentSlot,
    #[serde(default)]
    pub attack_bonus: i32,
    #[serde(default)]
    pub defense_bonus: i32,
    #[serde(default)]
    pub enhance_level: u32,
    #[serde(default)]
    pub equipped: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    #[default]
    Consumable,
    Material,
    Key,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemEffect {
    #[serde(default)]
    pub restore_hp: i32,
    #[serde(default)]
    pub restore_mp: i32,
    #[serde(default)]
    pub cures: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryItem {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub kind: ItemKind,
    pub quantity: u32,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub effect: Option<ItemEffect>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Inventory {
    pub items: Vec<InventoryItem>,
}

impl Inventory {
    pub fn get(&self, id: &str) -> Option<&InventoryItem> {
        self.items.iter().find(|i| i.id == id)
    }

    pub fn quantity(&self, id: &str) -> u32 {
        self.get(id).map(|i| i.quantity).unwrap_or(0)
    }

    /// Merges into an existing stack when the id is already held.
    pub fn add(&mut self, item: InventoryItem) {
        if let Some(existing) = self.items.iter_mut().find(|i| i.id == item.id) {
            existing.quantity = existing.quantity.saturating_add(item.quantity);
            if existing.effect.is_none() {
                existing.effect = item.effect;
            }
            return;
        }
        self.items.push(item);
    }

    /// Removes `quantity` units, dropping the stack when it empties.
    /// Returns false and leaves the inventory untouched if not enough are held.
    pub fn take(&mut self, id: &str, quantity: u32) -> bool {
        let Some(pos) = self.items.iter().position(|i| i.id == id) else {
            return false;
        };
        if self.items[pos].quantity < quantity {
            return false;
        }
        self.items[pos].quantity -= quantity;
        if self.items[pos].quantity == 0 {
            self.items.remove(pos);
        }
        true
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Npc {
    pub id: String,
    pub name: String,
    pub role: String,
    #[serde(default)]
    pub affinity: i32,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub connections: Vec<String>,
    #[serde(default)]
    pub npcs: Vec<Npc>,
    /// Enemy template ids that can be fought here.
    #[serde(default)]
    pub encounters: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Area {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub enemy_templates: Vec<EnemyTemplate>,
}

impl Area {
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    pub fn template(&self, id: &str) -> Option<&EnemyTemplate> {
        self.enemy_templates.iter().find(|t| t.id == id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestStatus {
    Active,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestObjective {
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub progress: u32,
    #[serde(default = "default_required")]
    pub required: u32,
}

fn default_required() -> u32 {
    1
}

impl QuestObjective {
    pub fn is_complete(&self) -> bool {
        self.progress >= self.required
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardItem {
    pub item_id: String,
    pub name: String,
    #[serde(default = "default_required")]
    pub quantity: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestRewards {
    #[serde(default)]
    pub exp: u32,
    #[serde(default)]
    pub gold: u32,
    #[serde(default)]
    pub items: Vec<RewardItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quest {
    pub id: String,
    pub title: String,
    pub description: String,
    pub status: QuestStatus,
    pub objectives: Vec<QuestObjective>,
    pub rewards: QuestRewards,
    pub rewards_claimed: bool,
}
