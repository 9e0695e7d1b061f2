use serde_json::{json, Value};

/// One entry of the fixed tool catalog offered to the narrator.
#[derive(Debug, Clone, Copy)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    /// Fails with a state conflict unless the player is in an active battle.
    pub requires_battle: bool,
    pub mutates: bool,
    pub parameters: fn() -> Value,
}

impl ToolSpec {
    /// OpenAI-style function declaration.
    pub fn to_openai(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": (self.parameters)(),
            }
        })
    }
}

fn no_params() -> Value {
    json!({ "type": "object", "properties": {} })
}

fn area_info_params() -> Value {
    json!({
        "type": "object",
        "properties": {
            "areaId": { "type": "string", "description": "Defaults to the player's current area." }
        }
    })
}

fn start_battle_params() -> Value {
    json!({
        "type": "object",
        "properties": {
            "enemies": {
                "type": "array",
                "items": { "type": "string" },
                "minItems": 1,
                "description": "Enemy template ids from the current area."
            }
        },
        "required": ["enemies"]
    })
}

fn battle_action_params() -> Value {
    json!({
        "type": "object",
        "properties": {
            "action": {
                "type": "object",
                "properties": {
                    "type": { "type": "string", "enum": ["attack", "skill", "defend", "item", "flee"] },
                    "targetIndex": { "type": "integer", "minimum": 0 },
                    "skillId": { "type": "string" },
                    "itemId": { "type": "string" }
                },
                "required": ["type"]
            }
        },
        "required": ["action"]
    })
}

fn item_params() -> Value {
    json!({
        "type": "object",
        "properties": { "itemId": { "type": "string" } },
        "required": ["itemId"]
    })
}

fn move_params() -> Value {
    json!({
        "type": "object",
        "properties": { "nodeId": { "type": "string" } },
        "required": ["nodeId"]
    })
}

fn npc_params() -> Value {
    json!({
        "type": "object",
        "properties": {
            "npcId": { "type": "string" },
            "topic": { "type": "string" },
            "affinityDelta": { "type": "integer", "minimum": -100, "maximum": 100 }
        },
        "required": ["npcId"]
    })
}

fn enhance_params() -> Value {
    json!({
        "type": "object",
        "properties": { "equipmentId": { "type": "string" } },
        "required": ["equipmentId"]
    })
}

fn actor_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "hp": { "type": "integer" }, "maxHp": { "type": "integer", "minimum": 1 },
            "mp": { "type": "integer" }, "maxMp": { "type": "integer", "minimum": 0 },
            "attack": { "type": "integer" }, "defense": { "type": "integer" },
            "speed": { "type": "integer" }, "level": { "type": "integer", "minimum": 1 },
            "element": { "type": "string", "enum": ["neutral", "fire", "water", "wind", "earth", "light", "dark"] }
        },
        "required": ["hp", "maxHp", "mp", "maxMp", "attack", "defense", "speed", "level"]
    })
}

fn generate_area_params() -> Value {
    json!({
        "type": "object",
        "properties": {
            "area": {
                "type": "object",
                "properties": {
                    "id": { "type": "string" },
                    "name": { "type": "string" },
                    "description": { "type": "string" },
                    "nodes": {
                        "type": "array",
                        "minItems": 1,
                        "items": {
                            "type": "object",
                            "properties": {
                                "id": { "type": "string" },
                                "name": { "type": "string" },
                                "description": { "type": "string" },
                                "connections": { "type": "array", "items": { "type": "string" } },
                                "npcs": { "type": "array", "items": {
                                    "type": "object",
                                    "properties": {
                                        "id": { "type": "string" }, "name": { "type": "string" },
                                        "role": { "type": "string" }, "affinity": { "type": "integer" }
                                    },
                                    "required": ["id", "name", "role"]
                                }},
                                "encounters": { "type": "array", "items": { "type": "string" } }
                            },
                            "required": ["id", "name"]
                        }
                    },
                    "enemyTemplates": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "id": { "type": "string" },
                                "name": { "type": "string" },
                                "stats": actor_schema(),
                                "countMin": { "type": "integer", "minimum": 1 },
                                "countMax": { "type": "integer", "minimum": 1 },
                                "skills": { "type": "array", "items": { "type": "object" } },
                                "phases": { "type": "array", "items": {
                                    "type": "object",
                                    "properties": {
                                        "hpThreshold": { "type": "number", "exclusiveMinimum": 0, "maximum": 1 },
                                        "unlockedSkills": { "type": "array", "items": { "type": "string" } },
                                        "description": { "type": "string" }
                                    },
                                    "required": ["hpThreshold"]
                                }},
                                "exp": { "type": "integer", "minimum": 0 },
                                "gold": { "type": "integer", "minimum": 0 },
                                "drops": { "type": "array", "items": {
                                    "type": "object",
                                    "properties": {
                                        "itemId": { "type": "string" }, "name": { "type": "string" },
                                        "chance": { "type": "number", "minimum": 0, "maximum": 1 },
                                        "quantity": { "type": "integer", "minimum": 1 }
                                    },
                                    "required": ["itemId", "name", "chance"]
                                }}
                            },
                            "required": ["id", "name", "stats"]
                        }
                    }
                },
                "required": ["id", "name", "nodes"]
            },
            "enter": { "type": "boolean" }
        },
        "required": ["area"]
    })
}

fn create_quest_params() -> Value {
    json!({
        "type": "object",
        "properties": {
            "id": { "type": "string" },
            "title": { "type": "string" },
            "description": { "type": "string" },
            "objectives": { "type": "array", "items": {
                "type": "object",
                "properties": {
                    "id": { "type": "string" },
                    "description": { "type": "string" },
                    "required": { "type": "integer", "minimum": 1 }
                },
                "required": ["id", "description"]
            }},
            "rewards": {
                "type": "object",
                "properties": {
                    "exp": { "type": "integer", "minimum": 0 },
                    "gold": { "type": "integer", "minimum": 0 },
                    "items": { "type": "array", "items": {
                        "type": "object",
                        "properties": {
                            "itemId": { "type": "string" }, "name": { "type": "string" },
                            "quantity": { "type": "integer", "minimum": 1 }
                        },
                        "required": ["itemId", "name"]
                    }}
                }
            }
        },
        "required": ["id", "title"]
    })
}

fn update_quest_params() -> Value {
    json!({
        "type": "object",
        "properties": {
            "questId": { "type": "string" },
            "objectiveId": { "type": "string" },
            "progress": { "type": "integer" },
            "status": { "type": "string", "enum": ["active", "completed", "failed"] }
        },
        "required": ["questId"]
    })
}

fn modify_player_params() -> Value {
    json!({
        "type": "object",
        "properties": {
            "hpDelta": { "type": "integer" },
            "mpDelta": { "type": "integer" },
            "goldDelta": { "type": "integer" },
            "expDelta": { "type": "integer", "minimum": 0 },
            "equip": { "type": "string", "description": "Equipment id to equip." },
            "unequip": { "type": "string" },
            "learnSkill": { "type": "object" },
            "equipSkill": { "type": "string" },
            "setFlag": { "type": "string" }
        }
    })
}

fn add_item_params() -> Value {
    json!({
        "type": "object",
        "properties": {
            "itemId": { "type": "string" },
            "name": { "type": "string" },
            "quantity": { "type": "integer", "minimum": 1 },
            "kind": { "type": "string", "enum": ["consumable", "material", "key"] },
            "description": { "type": "string" },
            "effect": {
                "type": "object",
                "properties": {
                    "restoreHp": { "type": "integer" },
                    "restoreMp": { "type": "integer" },
                    "cures": { "type": "array", "items": { "type": "string" } }
                }
            }
        },
        "required": ["itemId", "name", "quantity"]
    })
}

fn send_narrative_params() -> Value {
    json!({
        "type": "object",
        "properties": {
            "thought": { "type": "string" },
            "narrative": { "type": "string", "minLength": 1 },
            "mood": { "type": "string", "enum": ["calm", "tense", "excited", "mysterious", "sad", "joyful"] },
            "suggestions": { "type": "array", "items": { "type": "string" }, "minItems": 2, "maxItems": 4 },
            "metadata": { "type": "object" }
        },
        "required": ["narrative"]
    })
}

pub static TOOL_CATALOG: &[ToolSpec] = &[
    ToolSpec {
        name: "get_player_state",
        description: "Read the player's stats, gold, exp, equipment, skills, inventory and location.",
        requires_battle: false,
        mutates: false,
        parameters: no_params,
    },
    ToolSpec {
        name: "get_area_info",
        description: "Read an area's nodes, NPCs, connections and enemy templates.",
        requires_battle: false,
        mutates: false,
        parameters: area_info_params,
    },
    ToolSpec {
        name: "get_battle_state",
        description: "Read the active battle: enemies, HP, round and log.",
        requires_battle: true,
        mutates: false,
        parameters: no_params,
    },
    ToolSpec {
        name: "start_battle",
        description: "Start a battle against enemy templates defined in the current area.",
        requires_battle: false,
        mutates: true,
        parameters: start_battle_params,
    },
    ToolSpec {
        name: "execute_battle_action",
        description: "Resolve one full battle round with the player's declared action.",
        requires_battle: true,
        mutates: true,
        parameters: battle_action_params,
    },
    ToolSpec {
        name: "use_item",
        description: "Use a consumable outside of battle.",
        requires_battle: false,
        mutates: true,
        parameters: item_params,
    },
    ToolSpec {
        name: "move_to_node",
        description: "Move to a node connected to the current one. Flees an active battle.",
        requires_battle: false,
        mutates: true,
        parameters: move_params,
    },
    ToolSpec {
        name: "interact_npc",
        description: "Talk to an NPC at the current node, optionally shifting affinity.",
        requires_battle: false,
        mutates: true,
        parameters: npc_params,
    },
    ToolSpec {
        name: "enhance_equipment",
        description: "Spend gold to raise an equipment piece's enhancement level.",
        requires_battle: false,
        mutates: true,
        parameters: enhance_params,
    },
    ToolSpec {
        name: "generate_area",
        description: "Create a new area with nodes, NPCs and enemy templates.",
        requires_battle: false,
        mutates: true,
        parameters: generate_area_params,
    },
    ToolSpec {
        name: "create_quest",
        description: "Give the player a new quest.",
        requires_battle: false,
        mutates: true,
        parameters: create_quest_params,
    },
    ToolSpec {
        name: "update_quest",
        description: "Advance a quest objective or change a quest's status.",
        requires_battle: false,
        mutates: true,
        parameters: update_quest_params,
    },
    ToolSpec {
        name: "modify_player_data",
        description: "Adjust HP, MP, gold or exp, equip gear, learn or equip skills, set flags.",
        requires_battle: false,
        mutates: true,
        parameters: modify_player_params,
    },
    ToolSpec {
        name: "add_item",
        description: "Put items into the player's inventory.",
        requires_battle: false,
        mutates: true,
        parameters: add_item_params,
    },
    ToolSpec {
        name: "send_narrative",
        description: "Deliver the turn's narration as a structured document.",
        requires_battle: false,
        mutates: false,
        parameters: send_narrative_params,
    },
];

pub fn lookup(name: &str) -> Option<&'static ToolSpec> {
    TOOL_CATALOG.iter().find(|t| t.name == name)
}

pub fn openai_tools() -> Vec<Value> {
    TOOL_CATALOG.iter().map(ToolSpec::to_openai).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::llm_decode::decode_tool_request;

    #[test]
    fn catalog_names_are_unique_and_decodable() {
        let mut names: Vec<&str> = TOOL_CATALOG.iter().map(|t| t.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), 15);

        // Every catalog name maps to a request variant, even if these
        // particular empty args fail validation.
        for spec in TOOL_CATALOG {
            if let Ok(request) = decode_tool_request(spec.name, &json!({})) {
                assert_eq!(request.name(), spec.name);
            }
        }
    }

    #[test]
    fn schemas_are_objects() {
        for tool in openai_tools() {
            assert_eq!(tool["function"]["parameters"]["type"], "object");
        }
    }
}
