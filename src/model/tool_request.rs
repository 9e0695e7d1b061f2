use serde::{Deserialize, Serialize};

use crate::model::actor::Skill;
use crate::model::battle::BattleAction;
use crate::model::game_state::{Area, ItemEffect, ItemKind, QuestObjective, QuestRewards, QuestStatus};
use crate::model::narrative::{Mood, NarrativeMetadata};

/// A validated request to run one catalog tool.
/// The narrator never reaches state except through one of these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", content = "args", rename_all = "snake_case")]
pub enum ToolRequest {
    GetPlayerState(NoArgs),
    GetAreaInfo(GetAreaInfoArgs),
    GetBattleState(NoArgs),
    StartBattle(StartBattleArgs),
    ExecuteBattleAction(BattleActionArgs),
    UseItem(UseItemArgs),
    MoveToNode(MoveToNodeArgs),
    InteractNpc(InteractNpcArgs),
    EnhanceEquipment(EnhanceEquipmentArgs),
    GenerateArea(GenerateAreaArgs),
    CreateQuest(CreateQuestArgs),
    UpdateQuest(UpdateQuestArgs),
    ModifyPlayerData(ModifyPlayerDataArgs),
    AddItem(AddItemArgs),
    SendNarrative(SendNarrativeArgs),
}

impl ToolRequest {
    pub fn name(&self) -> &'static str {
        match self {
            ToolRequest::GetPlayerState(_) => "get_player_state",
            ToolRequest::GetAreaInfo(_) => "get_area_info",
            ToolRequest::GetBattleState(_) => "get_battle_state",
            ToolRequest::StartBattle(_) => "start_battle",
            ToolRequest::ExecuteBattleAction(_) => "execute_battle_action",
            ToolRequest::UseItem(_) => "use_item",
            ToolRequest::MoveToNode(_) => "move_to_node",
            ToolRequest::InteractNpc(_) => "interact_npc",
            ToolRequest::EnhanceEquipment(_) => "enhance_equipment",
            ToolRequest::GenerateArea(_) => "generate_area",
            ToolRequest::CreateQuest(_) => "create_quest",
            ToolRequest::UpdateQuest(_) => "update_quest",
            ToolRequest::ModifyPlayerData(_) => "modify_player_data",
            ToolRequest::AddItem(_) => "add_item",
            ToolRequest::SendNarrative(_) => "send_narrative",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NoArgs {}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetAreaInfoArgs {
    #[serde(default)]
    pub area_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartBattleArgs {
    /// Enemy template ids from the current area.
    pub enemies: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BattleActionArgs {
    pub action: BattleAction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UseItemArgs {
    pub item_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveToNodeArgs {
    pub node_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractNpcArgs {
    pub npc_id: String,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub affinity_delta: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnhanceEquipmentArgs {
    pub equipment_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateAreaArgs {
    pub area: Area,
    /// Move the player to the first node once the area exists.
    #[serde(default)]
    pub enter: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateQuestArgs {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub objectives: Vec<QuestObjective>,
    #[serde(default)]
    pub rewards: QuestRewards,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateQuestArgs {
    pub quest_id: String,
    #[serde(default)]
    pub objective_id: Option<String>,
    /// Progress added to the objective; may be negative.
    #[serde(default)]
    pub progress: Option<i32>,
    #[serde(default)]
    pub status: Option<QuestStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModifyPlayerDataArgs {
    #[serde(default)]
    pub hp_delta: Option<i32>,
    #[serde(default)]
    pub mp_delta: Option<i32>,
    #[serde(default)]
    pub gold_delta: Option<i64>,
    #[serde(default)]
    pub exp_delta: Option<u32>,
    #[serde(default)]
    pub equip: Option<String>,
    #[serde(default)]
    pub unequip: Option<String>,
    #[serde(default)]
    pub learn_skill: Option<Skill>,
    #[serde(default)]
    pub equip_skill: Option<String>,
    #[serde(default)]
    pub set_flag: Option<String>,
}

impl ModifyPlayerDataArgs {
    pub fn is_empty(&self) -> bool {
        self.hp_delta.is_none()
            && self.mp_delta.is_none()
            && self.gold_delta.is_none()
            && self.exp_delta.is_none()
            && self.equip.is_none()
            && self.unequip.is_none()
            && self.learn_skill.is_none()
            && self.equip_skill.is_none()
            && self.set_flag.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddItemArgs {
    pub item_id: String,
    pub name: String,
    pub quantity: u32,
    #[serde(default)]
    pub kind: ItemKind,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub effect: Option<ItemEffect>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendNarrativeArgs {
    pub narrative: String,
    #[serde(default)]
    pub thought: Option<String>,
    #[serde(default)]
    pub mood: Option<Mood>,
    #[serde(default)]
    pub suggestions: Option<Vec<String>>,
    #[serde(default)]
    pub metadata: Option<NarrativeMetadata>,
}
