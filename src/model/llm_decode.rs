use std::collections::HashSet;

use serde_json::{json, Map, Value};

use crate::engine::error::ToolError;
use crate::model::battle::BattleAction;
use crate::model::tool_request::ToolRequest;

/// Decode raw narrator tool arguments into a typed, validated ToolRequest
pub fn decode_tool_request(name: &str, args: &Value) -> Result<ToolRequest, ToolError> {
    let args = match args {
        Value::Null => Value::Object(Map::new()),
        Value::Object(_) => args.clone(),
        // Some backends send the arguments still encoded as a JSON string.
        Value::String(raw) if raw.trim().is_empty() => Value::Object(Map::new()),
        Value::String(raw) => serde_json::from_str(raw).map_err(|e| {
            ToolError::Validation(format!("arguments for '{}' are not valid JSON: {}", name, e))
        })?,
        other => {
            return Err(ToolError::Validation(format!(
                "arguments for '{}' must be an object, got {}",
                name, other
            )))
        }
    };

    let request: ToolRequest = serde_json::from_value(json!({ "name": name, "args": args }))
        .map_err(|e| ToolError::Validation(format!("invalid arguments for '{}': {}", name, e)))?;

    validate(&request)?;
    Ok(request)
}

fn require_text(field: &str, value: &str) -> Result<(), ToolError> {
    if value.trim().is_empty() {
        return Err(ToolError::Validation(format!("'{}' must not be empty", field)));
    }
    Ok(())
}

/// Checks that serde cannot express: non-empty ids, ranges, references.
fn validate(request: &ToolRequest) -> Result<(), ToolError> {
    match request {
        ToolRequest::GetPlayerState(_) | ToolRequest::GetBattleState(_) => Ok(()),

        ToolRequest::GetAreaInfo(args) => match &args.area_id {
            Some(id) => require_text("areaId", id),
            None => Ok(()),
        },

        ToolRequest::StartBattle(args) => {
            if args.enemies.is_empty() {
                return Err(ToolError::Validation(
                    "'enemies' must name at least one enemy template".into(),
                ));
            }
            for id in &args.enemies {
                require_text("enemies[]", id)?;
            }
            Ok(())
        }

        ToolRequest::ExecuteBattleAction(args) => match &args.action {
            BattleAction::Skill { skill_id, .. } => require_text("skillId", skill_id),
            BattleAction::Item { item_id } => require_text("itemId", item_id),
            BattleAction::Attack { .. } | BattleAction::Defend | BattleAction::Flee => Ok(()),
        },

        ToolRequest::UseItem(args) => require_text("itemId", &args.item_id),
        ToolRequest::MoveToNode(args) => require_text("nodeId", &args.node_id),
        ToolRequest::InteractNpc(args) => require_text("npcId", &args.npc_id),
        ToolRequest::EnhanceEquipment(args) => require_text("equipmentId", &args.equipment_id),

        ToolRequest::GenerateArea(args) => {
            let area = &args.area;
            require_text("area.id", &area.id)?;
            require_text("area.name", &area.name)?;
            if area.nodes.is_empty() {
                return Err(ToolError::Validation("an area needs at least one node".into()));
            }

            let mut node_ids = HashSet::new();
            for node in &area.nodes {
                require_text("node.id", &node.id)?;
                if !node_ids.insert(node.id.as_str()) {
                    return Err(ToolError::Validation(format!("duplicate node id '{}'", node.id)));
                }
            }
            for node in &area.nodes {
                for link in &node.connections {
                    if !node_ids.contains(link.as_str()) {
                        return Err(ToolError::Validation(format!(
                            "node '{}' connects to unknown node '{}'",
                            node.id, link
                        )));
                    }
                }
                for encounter in &node.encounters {
                    if area.template(encounter).is_none() {
                        return Err(ToolError::Validation(format!(
                            "node '{}' lists unknown enemy template '{}'",
                            node.id, encounter
                        )));
                    }
                }
            }

            for template in &area.enemy_templates {
                require_text("enemyTemplate.id", &template.id)?;
                if template.count_max == 0 || template.count_min > template.count_max {
                    return Err(ToolError::Validation(format!(
                        "enemy template '{}' has an invalid count range {}..={}",
                        template.id, template.count_min, template.count_max
                    )));
                }
                if template.stats.max_hp <= 0 {
                    return Err(ToolError::Validation(format!(
                        "enemy template '{}' needs positive maxHp",
                        template.id
                    )));
                }
                for phase in &template.phases {
                    if !(phase.hp_threshold > 0.0 && phase.hp_threshold <= 1.0) {
                        return Err(ToolError::Validation(format!(
                            "enemy template '{}' has a phase threshold outside (0, 1]",
                            template.id
                        )));
                    }
                }
                for entry in &template.drops {
                    if !(0.0..=1.0).contains(&entry.chance) {
                        return Err(ToolError::Validation(format!(
                            "drop '{}' of '{}' has a chance outside [0, 1]",
                            entry.item_id, template.id
                        )));
                    }
                }
            }
            Ok(())
        }

        ToolRequest::CreateQuest(args) => {
            require_text("id", &args.id)?;
            require_text("title", &args.title)?;
            let mut seen = HashSet::new();
            for objective in &args.objectives {
                require_text("objective.id", &objective.id)?;
                if !seen.insert(objective.id.as_str()) {
                    return Err(ToolError::Validation(format!(
                        "duplicate objective id '{}'",
                        objective.id
                    )));
                }
                if objective.required == 0 {
                    return Err(ToolError::Validation(format!(
                        "objective '{}' must require at least 1",
                        objective.id
                    )));
                }
            }
            Ok(())
        }

        ToolRequest::UpdateQuest(args) => {
            require_text("questId", &args.quest_id)?;
            if args.progress.is_some() && args.objective_id.is_none() {
                return Err(ToolError::Validation("'progress' needs an 'objectiveId'".into()));
            }
            if args.objective_id.is_none() && args.status.is_none() {
                return Err(ToolError::Validation(
                    "update_quest needs an objective update or a status".into(),
                ));
            }
            Ok(())
        }

        ToolRequest::ModifyPlayerData(args) => {
            if args.is_empty() {
                return Err(ToolError::Validation(
                    "modify_player_data needs at least one change".into(),
                ));
            }
            if let Some(skill) = &args.learn_skill {
                require_text("learnSkill.id", &skill.id)?;
                if skill.mp_cost < 0 || skill.damage < 0.0 {
                    return Err(ToolError::Validation(
                        "learnSkill must not have negative cost or damage".into(),
                    ));
                }
            }
            Ok(())
        }

        ToolRequest::AddItem(args) => {
            require_text("itemId", &args.item_id)?;
            require_text("name", &args.name)?;
            if args.quantity == 0 {
                return Err(ToolError::Validation("'quantity' must be at least 1".into()));
            }
            Ok(())
        }

        ToolRequest::SendNarrative(args) => require_text("narrative", &args.narrative),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_encoded_arguments_are_accepted() {
        let request =
            decode_tool_request("move_to_node", &json!("{\"nodeId\":\"gate\"}")).unwrap();
        assert_eq!(request.name(), "move_to_node");
    }

    #[test]
    fn null_arguments_mean_no_arguments() {
        let request = decode_tool_request("get_player_state", &Value::Null).unwrap();
        assert_eq!(request.name(), "get_player_state");
    }

    #[test]
    fn missing_action_is_a_validation_error() {
        let err = decode_tool_request("execute_battle_action", &json!({ "skillId": "nonexistent" }))
            .unwrap_err();
        assert!(matches!(err, ToolError::Validation(_)));
    }

    #[test]
    fn unknown_action_type_is_rejected() {
        let err = decode_tool_request(
            "execute_battle_action",
            &json!({ "action": { "type": "dance" } }),
        )
        .unwrap_err();
        assert!(matches!(err, ToolError::Validation(_)));
    }

    #[test]
    fn camel_case_action_fields_decode() {
        let request = decode_tool_request(
            "execute_battle_action",
            &json!({ "action": { "type": "skill", "skillId": "fireball", "targetIndex": 1 } }),
        )
        .unwrap();
        let ToolRequest::ExecuteBattleAction(args) = request else {
            panic!("wrong variant");
        };
        assert_eq!(
            args.action,
            BattleAction::Skill {
                skill_id: "fireball".into(),
                target_index: Some(1)
            }
        );
    }

    #[test]
    fn zero_quantity_add_item_is_rejected() {
        let err = decode_tool_request(
            "add_item",
            &json!({ "itemId": "herb", "name": "Herb", "quantity": 0 }),
        )
        .unwrap_err();
        assert!(matches!(err, ToolError::Validation(_)));
    }

    #[test]
    fn area_with_dangling_connection_is_rejected() {
        let err = decode_tool_request(
            "generate_area",
            &json!({ "area": {
                "id": "woods", "name": "Woods",
                "nodes": [{ "id": "a", "name": "A", "connections": ["b"] }]
            }}),
        )
        .unwrap_err();
        assert!(matches!(err, ToolError::Validation(_)));
    }
}
