use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NarratorConfig {
    pub endpoint: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    /// Narrator calls allowed per turn when it keeps requesting tools.
    pub max_tool_rounds: u32,
    pub history_limit: usize,
}

impl Default for NarratorConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:1234/v1".into(),
            model: "local-model".into(),
            temperature: 0.7,
            max_tokens: 1024,
            timeout_secs: 60,
            max_tool_rounds: 4,
            history_limit: 20,
        }
    }
}

impl NarratorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BattleConfig {
    pub crit_chance: f32,
    pub crit_multiplier: f32,
    /// Incoming damage multiplier while defending.
    pub defend_factor: f32,
    /// Percent of gold lost on defeat, rounded down.
    pub defeat_gold_percent: u32,
    /// Percent of max HP and MP guaranteed after a defeat, rounded up.
    pub rescue_hp_percent: u32,
    pub rescue_mp_percent: u32,
    /// Exp needed for level L -> L+1 is `L * exp_per_level`.
    pub exp_per_level: u32,
    pub level_hp_gain: i32,
    pub level_mp_gain: i32,
    pub level_attack_gain: i32,
    pub level_defense_gain: i32,
    /// Max HP fraction lost to poison at every round end.
    pub poison_fraction: f32,
}

impl Default for BattleConfig {
    fn default() -> Self {
        Self {
            crit_chance: 0.1,
            crit_multiplier: 2.0,
            defend_factor: 0.5,
            defeat_gold_percent: 10,
            rescue_hp_percent: 30,
            rescue_mp_percent: 30,
            exp_per_level: 100,
            level_hp_gain: 10,
            level_mp_gain: 5,
            level_attack_gain: 2,
            level_defense_gain: 1,
            poison_fraction: 0.05,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub narrator: NarratorConfig,
    pub battle: BattleConfig,
    /// Gold for enhancing from level L is `enhance_cost_base * (L + 1)`.
    pub enhance_cost_base: u32,
    /// Fixed seed for reproducible battles; entropy when absent.
    pub rng_seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            narrator: NarratorConfig::default(),
            battle: BattleConfig::default(),
            enhance_cost_base: 50,
            rng_seed: None,
        }
    }
}

pub fn config_path() -> PathBuf {
    let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("adventure_engine");
    path.push("config.json");
    path
}

/// Reads the config file, falling back to defaults when it is missing or broken.
pub fn load_config() -> EngineConfig {
    let path = config_path();
    let Ok(raw) = fs::read_to_string(&path) else {
        return EngineConfig::default();
    };
    match serde_json::from_str(&raw) {
        Ok(config) => config,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "config unreadable, using defaults");
            EngineConfig::default()
        }
    }
}

pub fn save_config(config: &EngineConfig) -> anyhow::Result<()> {
    let path = config_path();
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    let json = serde_json::to_string_pretty(config)?;
    fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_fills_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{ "battle": { "crit_chance": 0.5 }, "rng_seed": 7 }"#).unwrap();
        assert_eq!(config.battle.crit_chance, 0.5);
        assert_eq!(config.battle.crit_multiplier, 2.0);
        assert_eq!(config.rng_seed, Some(7));
        assert_eq!(config.narrator.max_tool_rounds, 4);
    }
}
