use crate::engine::tool_catalog::TOOL_CATALOG;
use crate::model::battle::BattleState;
use crate::model::game_state::{Area, Inventory, Player, Quest, QuestStatus};

/// Everything the narrator is shown about the current state.
pub struct PromptContext<'a> {
    pub player: &'a Player,
    pub inventory: &'a Inventory,
    pub area: Option<&'a Area>,
    pub battle: Option<&'a BattleState>,
    pub quests: &'a [Quest],
}

/// Builds the system prompt sent to the narrator.
/// Only formats text: no parsing, no networking, no engine logic.
pub struct PromptBuilder;

impl PromptBuilder {
    pub fn build(context: &PromptContext) -> String {
        let mut prompt = String::new();

        push_system_rules(&mut prompt);
        push_output_format(&mut prompt);
        push_tool_section(&mut prompt, context.battle.is_some());
        push_player_section(&mut prompt, context.player, context.inventory);
        push_location_section(&mut prompt, context.player, context.area);
        if let Some(battle) = context.battle {
            push_battle_section(&mut prompt, battle);
        }
        push_quest_section(&mut prompt, context.quests);
        push_reminder(&mut prompt);

        prompt
    }
}

fn push_system_rules(prompt: &mut String) {
    prompt.push_str(
        "You are the narrator and every non-player character of a turn-based adventure.\n\n\
Rules:\n\
- You never change game state yourself. Every change happens through a tool call.\n\
- Never tell the player they gained or spent gold, items, experience or HP unless a tool call this turn did it.\n\
- Battles are resolved only by execute_battle_action. Narrate the numbers it returns, never invent damage.\n\
- If you need a detail you were not given, read it with get_player_state, get_area_info or get_battle_state.\n\
- Never speak or act for the player beyond what they stated.\n\n",
    );
}

fn push_output_format(prompt: &mut String) {
    prompt.push_str(
        "Output Format:\n\
When you are done calling tools, reply with ONE JSON object and nothing else:\n\
{\n\
  \"thought\": \"<private reasoning, optional>\",\n\
  \"narrative\": \"<what the player sees, required>\",\n\
  \"mood\": \"calm | tense | excited | mysterious | sad | joyful\",\n\
  \"suggestions\": [\"<2 to 4 short next actions>\"],\n\
  \"metadata\": { \"bgm\": \"<optional>\", \"scenePrompt\": \"<optional>\" }\n\
}\n\
You may deliver the same object through send_narrative instead.\n\n",
    );
}

fn push_tool_section(prompt: &mut String, in_battle: bool) {
    prompt.push_str("TOOLS:\n");
    for tool in TOOL_CATALOG {
        if tool.requires_battle && !in_battle {
            continue;
        }
        prompt.push_str(&format!("- {}: {}\n", tool.name, tool.description));
    }
    prompt.push_str(
        "\nBattle Notes:\n\
- One execute_battle_action call is one full round: the player acts, then every enemy.\n\
- action.type is attack, skill (with skillId), defend, item (with itemId) or flee.\n\
- targetIndex picks an enemy; omit it to hit the first one still standing.\n\n",
    );
}

fn push_player_section(prompt: &mut String, player: &Player, inventory: &Inventory) {
    let s = &player.stats;
    prompt.push_str("PLAYER:\n");
    prompt.push_str(&format!(
        "{} (level {}) HP {}/{} MP {}/{} ATK {} DEF {} SPD {} gold {} exp {}\n",
        player.name,
        s.level,
        s.hp,
        s.max_hp,
        s.mp,
        s.max_mp,
        player.attack_power(),
        player.defense_power(),
        s.speed,
        player.gold,
        player.exp
    ));

    if !player.statuses.is_empty() {
        let statuses: Vec<&str> = player.statuses.iter().map(String::as_str).collect();
        prompt.push_str(&format!("Statuses: {}\n", statuses.join(", ")));
    }

    let skills = player.usable_skills();
    if !skills.is_empty() {
        prompt.push_str("Skills:\n");
        for skill in skills {
            prompt.push_str(&format!(
                "- {} ({}) MP {} cooldown {}\n",
                skill.name, skill.id, skill.mp_cost, skill.cooldown
            ));
        }
    }

    let equipped: Vec<String> = player
        .equipment
        .iter()
        .filter(|e| e.equipped)
        .map(|e| format!("{} +{} ({})", e.name, e.enhance_level, e.id))
        .collect();
    if !equipped.is_empty() {
        prompt.push_str(&format!("Equipped: {}\n", equipped.join(", ")));
    }

    if inventory.items.is_empty() {
        prompt.push_str("Inventory: empty\n");
    } else {
        prompt.push_str("Inventory:\n");
        for item in &inventory.items {
            prompt.push_str(&format!("- {} x{} ({})\n", item.name, item.quantity, item.id));
        }
    }
    prompt.push('\n');
}

fn push_location_section(prompt: &mut String, player: &Player, area: Option<&Area>) {
    prompt.push_str("LOCATION:\n");
    let Some(area) = area else {
        prompt.push_str(&format!(
            "{} / {} (no area details)\n\n",
            player.location.area_id, player.location.node_id
        ));
        return;
    };

    prompt.push_str(&format!("Area: {} ({})\n", area.name, area.id));
    if let Some(node) = area.node(&player.location.node_id) {
        prompt.push_str(&format!("Node: {} ({})\n", node.name, node.id));
        if !node.description.is_empty() {
            prompt.push_str(&node.description);
            prompt.push('\n');
        }
        if !node.connections.is_empty() {
            prompt.push_str(&format!("Exits: {}\n", node.connections.join(", ")));
        }
        for npc in &node.npcs {
            prompt.push_str(&format!(
                "- NPC {} ({}), {}, affinity {}\n",
                npc.name, npc.id, npc.role, npc.affinity
            ));
        }
        if !node.encounters.is_empty() {
            prompt.push_str(&format!("Possible enemies: {}\n", node.encounters.join(", ")));
        }
    }
    prompt.push('\n');
}

fn push_battle_section(prompt: &mut String, battle: &BattleState) {
    prompt.push_str(&format!("BATTLE (round {}):\n", battle.round));
    for (index, enemy) in battle.enemies.iter().enumerate() {
        let state = if enemy.is_alive() { "" } else { " [defeated]" };
        prompt.push_str(&format!(
            "- [{}] {} HP {}/{}{}\n",
            index, enemy.name, enemy.actor.hp, enemy.actor.max_hp, state
        ));
    }
    for entry in battle.log.iter().rev().take(6).rev() {
        prompt.push_str(&format!("  round {}: {}\n", entry.round, entry.text));
    }
    prompt.push('\n');
}

fn push_quest_section(prompt: &mut String, quests: &[Quest]) {
    let active: Vec<&Quest> = quests
        .iter()
        .filter(|q| q.status == QuestStatus::Active)
        .collect();
    if active.is_empty() {
        return;
    }

    prompt.push_str("QUESTS:\n");
    for quest in active {
        prompt.push_str(&format!("- {} ({})\n", quest.title, quest.id));
        for objective in &quest.objectives {
            prompt.push_str(&format!(
                "  - {} [{}/{}] ({})\n",
                objective.description, objective.progress, objective.required, objective.id
            ));
        }
    }
    prompt.push('\n');
}

fn push_reminder(prompt: &mut String) {
    prompt.push_str(
        "Reminder: call tools first, then answer with the JSON object only. \
No markdown, no text outside the object.\n",
    );
}
