use serde::{Deserialize, Serialize};

pub const POISON: &str = "poison";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Element {
    #[default]
    Neutral,
    Fire,
    Water,
    Wind,
    Earth,
    Light,
    Dark,
}

/// Combat stats shared by the player and every enemy instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub hp: i32,
    pub max_hp: i32,
    pub mp: i32,
    pub max_mp: i32,
    pub attack: i32,
    pub defense: i32,
    pub speed: i32,
    pub level: u32,
    #[serde(default)]
    pub element: Element,
}

impl Actor {
    pub fn is_alive(&self) -> bool {
        self.hp > 0
    }

    pub fn hp_fraction(&self) -> f32 {
        if self.max_hp <= 0 {
            return 0.0;
        }
        self.hp.max(0) as f32 / self.max_hp as f32
    }

    /// Returns the HP actually lost.
    pub fn take_damage(&mut self, amount: i32) -> i32 {
        let before = self.hp;
        self.hp = (self.hp - amount.max(0)).max(0);
        before - self.hp
    }

    /// Returns the HP actually restored.
    pub fn restore_hp(&mut self, amount: i32) -> i32 {
        let before = self.hp;
        self.hp = (self.hp + amount.max(0)).min(self.max_hp);
        self.hp - before
    }

    pub fn restore_mp(&mut self, amount: i32) -> i32 {
        let before = self.mp;
        self.mp = (self.mp + amount.max(0)).min(self.max_mp);
        self.mp - before
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkillEffect {
    #[default]
    Damage,
    Heal,
    Poison,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Skill {
    pub id: String,
    pub name: String,

    /// Multiplier applied to the user's attack power.
    #[serde(default = "default_multiplier")]
    pub damage: f32,

    #[serde(default)]
    pub mp_cost: i32,

    /// Rounds the skill stays unusable after being used.
    #[serde(default)]
    pub cooldown: u32,

    #[serde(default)]
    pub effect: SkillEffect,

    /// Enemy AI picks the highest priority usable skill.
    #[serde(default)]
    pub priority: i32,

    /// Locked until one of the owner's battle phases unlocks it.
    #[serde(default)]
    pub unlocked_by_phase: bool,
}

fn default_multiplier() -> f32 {
    1.0
}

impl Skill {
    pub fn matches(&self, key: &str) -> bool {
        self.id == key || self.name == key
    }
}
