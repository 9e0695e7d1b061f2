use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::engine::error::ToolError;
use crate::model::battle::{BattleStatus, LevelUp};
use crate::model::game_state::{Inventory, Location, Player};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemDelta {
    pub item_id: String,
    pub quantity: i64,
}

/// Observable change a tool made to authoritative state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateDelta {
    pub hp: i32,
    pub mp: i32,
    pub gold: i64,
    pub exp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<LevelUp>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<ItemDelta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battle: Option<BattleStatus>,
}

impl StateDelta {
    pub fn between(
        before: &Player,
        after: &Player,
        inventory_before: &Inventory,
        inventory_after: &Inventory,
    ) -> Self {
        let mut items = Vec::new();
        for item in &inventory_after.items {
            let diff = item.quantity as i64 - inventory_before.quantity(&item.id) as i64;
            if diff != 0 {
                items.push(ItemDelta {
                    item_id: item.id.clone(),
                    quantity: diff,
                });
            }
        }
        for item in &inventory_before.items {
            if inventory_after.get(&item.id).is_none() {
                items.push(ItemDelta {
                    item_id: item.id.clone(),
                    quantity: -(item.quantity as i64),
                });
            }
        }

        let level = (after.stats.level != before.stats.level).then_some(LevelUp {
            from: before.stats.level,
            to: after.stats.level,
        });

        Self {
            hp: after.stats.hp - before.stats.hp,
            mp: after.stats.mp - before.stats.mp,
            gold: after.gold as i64 - before.gold as i64,
            exp: after.exp as i64 - before.exp as i64,
            level,
            items,
            location: (after.location != before.location).then(|| after.location.clone()),
            battle: None,
        }
    }

    pub fn with_battle(mut self, status: BattleStatus) -> Self {
        self.battle = Some(status);
        self
    }
}

/// Result of one `Dispatcher::execute` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_delta: Option<StateDelta>,
}

impl ToolResult {
    pub fn success(data: Value, state_delta: Option<StateDelta>) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            state_delta,
        }
    }

    pub fn failure(error: ToolError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
            state_delta: None,
        }
    }
}

/// What the guard sees of a turn's tool activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallRecord {
    pub id: String,
    pub name: String,
    pub args: Value,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolCallRecord {
    pub fn from_result(id: &str, name: &str, args: &Value, result: &ToolResult) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            args: args.clone(),
            success: result.success,
            data: result.data.clone(),
            error: result.error.as_ref().map(|e| e.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnsupportedClaim {
    pub claim: String,
    pub label: String,
    pub required_tools: Vec<String>,
}

/// Advisory audit result attached to a turn. Never drives mutation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsistencyFinding {
    pub has_hallucination: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub claims: Vec<UnsupportedClaim>,
}
