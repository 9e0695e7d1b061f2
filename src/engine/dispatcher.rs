use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::engine::battle::{escape, resolve_round, start_battle, write_back};
use crate::engine::config::EngineConfig;
use crate::engine::error::{DispatchError, StoreError, ToolError};
use crate::engine::progression::{apply_defeat_penalty, apply_exp, grant_battle_rewards, grant_quest_rewards};
use crate::engine::store::GameStore;
use crate::engine::tool_catalog::{lookup, ToolSpec};
use crate::model::battle::{BattleState, BattleStatus};
use crate::model::game_state::{
    Area, EquipmentSlot, Inventory, InventoryItem, ItemKind, Location, Player, PlayerId, Quest,
    QuestStatus,
};
use crate::model::llm_decode::decode_tool_request;
use crate::model::narrative::{normalize_suggestions, StructuredNarrative};
use crate::model::tool_call::{StateDelta, ToolResult};
use crate::model::tool_request::{
    AddItemArgs, BattleActionArgs, CreateQuestArgs, EnhanceEquipmentArgs, GenerateAreaArgs,
    GetAreaInfoArgs, InteractNpcArgs, ModifyPlayerDataArgs, MoveToNodeArgs, SendNarrativeArgs,
    StartBattleArgs, ToolRequest, UpdateQuestArgs, UseItemArgs,
};

const AFFINITY_RANGE: (i32, i32) = (-100, 100);

#[derive(Debug, Default, PartialEq)]
enum BattleWrite {
    #[default]
    Keep,
    Save,
    Clear,
}

/// Working copy of everything one tool call may touch.
/// Nothing here reaches the store unless the handler returns `Ok`.
struct Session {
    player: Player,
    inventory: Inventory,
    battle: Option<BattleState>,
    battle_write: BattleWrite,
    areas: Vec<Area>,
    quests: Vec<Quest>,
}

/// Validates and executes catalog tools against the store.
pub struct Dispatcher {
    store: Arc<dyn GameStore>,
    config: EngineConfig,
    rng: Mutex<StdRng>,
    player_locks: Mutex<HashMap<PlayerId, Arc<Mutex<()>>>>,
    battle_seq: AtomicU64,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn GameStore>, config: EngineConfig) -> Self {
        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            store,
            config,
            rng: Mutex::new(rng),
            player_locks: Mutex::new(HashMap::new()),
            battle_seq: AtomicU64::new(1),
        }
    }

    fn player_lock(&self, id: &PlayerId) -> Arc<Mutex<()>> {
        let mut locks = self
            .player_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        locks.entry(id.clone()).or_default().clone()
    }

    fn rng(&self) -> MutexGuard<'_, StdRng> {
        self.rng.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs one tool call for `player_id`.
    ///
    /// Tool failures come back inline as `success: false` with no state
    /// change. Only a store failure is returned as `Err`; whatever was
    /// already written before it stays written.
    pub fn execute(
        &self,
        name: &str,
        args: &Value,
        player_id: &PlayerId,
    ) -> Result<ToolResult, StoreError> {
        let Some(spec) = lookup(name) else {
            warn!(tool = name, "unknown tool requested");
            return Ok(ToolResult::failure(ToolError::NotFound(format!(
                "unknown tool '{}'",
                name
            ))));
        };

        let request = match decode_tool_request(name, args) {
            Ok(request) => request,
            Err(err) => {
                warn!(tool = name, player = %player_id, error = %err, "tool arguments rejected");
                return Ok(ToolResult::failure(err));
            }
        };

        // One logical action at a time per player.
        let lock = self.player_lock(player_id);
        let _action = lock.lock().unwrap_or_else(PoisonError::into_inner);

        match self.run(spec, request, player_id) {
            Ok(result) => {
                info!(tool = name, player = %player_id, "tool executed");
                Ok(result)
            }
            Err(DispatchError::Tool(err)) => {
                debug!(tool = name, player = %player_id, error = %err, "tool failed");
                Ok(ToolResult::failure(err))
            }
            Err(DispatchError::Store(err)) => {
                error!(tool = name, player = %player_id, error = %err, "store failure during tool");
                Err(err)
            }
        }
    }

    fn run(
        &self,
        spec: &ToolSpec,
        request: ToolRequest,
        player_id: &PlayerId,
    ) -> Result<ToolResult, DispatchError> {
        let player = self
            .store
            .load_player(player_id)?
            .ok_or_else(|| ToolError::NotFound(format!("player '{}'", player_id)))?;
        let battle = self
            .store
            .load_battle(player_id)?
            .filter(|b| b.status == BattleStatus::Active);

        if spec.requires_battle && battle.is_none() {
            return Err(ToolError::StateConflict(format!(
                "{} needs an active battle",
                spec.name
            ))
            .into());
        }

        let mut session = Session {
            player,
            inventory: self.store.load_inventory(player_id)?,
            battle,
            battle_write: BattleWrite::Keep,
            areas: Vec::new(),
            quests: Vec::new(),
        };
        let player_before = session.player.clone();
        let inventory_before = session.inventory.clone();

        let data = match request {
            ToolRequest::GetPlayerState(_) => self.get_player_state(&session),
            ToolRequest::GetAreaInfo(args) => self.get_area_info(&session, args)?,
            ToolRequest::GetBattleState(_) => json!({ "battle": session.battle }),
            ToolRequest::StartBattle(args) => self.start_battle(&mut session, args)?,
            ToolRequest::ExecuteBattleAction(args) => self.battle_action(&mut session, args)?,
            ToolRequest::UseItem(args) => self.use_item(&mut session, args)?,
            ToolRequest::MoveToNode(args) => self.move_to_node(&mut session, args)?,
            ToolRequest::InteractNpc(args) => self.interact_npc(&mut session, args)?,
            ToolRequest::EnhanceEquipment(args) => self.enhance_equipment(&mut session, args)?,
            ToolRequest::GenerateArea(args) => self.generate_area(&mut session, args)?,
            ToolRequest::CreateQuest(args) => self.create_quest(&mut session, player_id, args)?,
            ToolRequest::UpdateQuest(args) => self.update_quest(&mut session, player_id, args)?,
            ToolRequest::ModifyPlayerData(args) => self.modify_player(&mut session, args)?,
            ToolRequest::AddItem(args) => self.add_item(&mut session, args),
            ToolRequest::SendNarrative(args) => send_narrative(args),
        };

        if !spec.mutates {
            return Ok(ToolResult::success(data, None));
        }

        self.persist(player_id, &session)?;

        let mut delta = StateDelta::between(
            &player_before,
            &session.player,
            &inventory_before,
            &session.inventory,
        );
        if session.battle_write != BattleWrite::Keep {
            if let Some(battle) = &session.battle {
                delta = delta.with_battle(battle.status);
            }
        }
        Ok(ToolResult::success(data, Some(delta)))
    }

    /// Writes player, inventory, battle, areas, then quests.
    fn persist(&self, player_id: &PlayerId, session: &Session) -> Result<(), StoreError> {
        self.store.save_player(&session.player)?;
        self.store.save_inventory(player_id, &session.inventory)?;
        match (&session.battle_write, &session.battle) {
            (BattleWrite::Save, Some(battle)) => self.store.save_battle(battle)?,
            (BattleWrite::Clear, _) => self.store.clear_battle(player_id)?,
            _ => {}
        }
        for area in &session.areas {
            self.store.save_area(area)?;
        }
        for quest in &session.quests {
            self.store.save_quest(player_id, quest)?;
        }
        Ok(())
    }

    fn current_area(&self, player: &Player) -> Result<Area, DispatchError> {
        let area_id = &player.location.area_id;
        Ok(self
            .store
            .load_area(area_id)?
            .ok_or_else(|| ToolError::NotFound(format!("area '{}'", area_id)))?)
    }

    fn get_player_state(&self, s: &Session) -> Value {
        json!({
            "player": s.player,
            "attackPower": s.player.attack_power(),
            "defensePower": s.player.defense_power(),
            "inventory": s.inventory.items,
            "inBattle": s.battle.is_some(),
        })
    }

    fn get_area_info(&self, s: &Session, args: GetAreaInfoArgs) -> Result<Value, DispatchError> {
        let area_id = args
            .area_id
            .unwrap_or_else(|| s.player.location.area_id.clone());
        let area = self
            .store
            .load_area(&area_id)?
            .ok_or_else(|| ToolError::NotFound(format!("area '{}'", area_id)))?;
        let here = (area.id == s.player.location.area_id).then(|| s.player.location.node_id.clone());
        Ok(json!({ "area": area, "currentNode": here }))
    }

    fn start_battle(&self, s: &mut Session, args: StartBattleArgs) -> Result<Value, DispatchError> {
        if s.battle.is_some() {
            return Err(ToolError::StateConflict("a battle is already in progress".into()).into());
        }
        if !s.player.stats.is_alive() {
            return Err(ToolError::StateConflict(format!(
                "{} is in no state to fight",
                s.player.name
            ))
            .into());
        }

        let area = self.current_area(&s.player)?;
        let mut templates = Vec::with_capacity(args.enemies.len());
        for id in &args.enemies {
            let template = area.template(id).ok_or_else(|| {
                ToolError::NotFound(format!("enemy template '{}' in area '{}'", id, area.id))
            })?;
            templates.push(template.clone());
        }

        let seq = self.battle_seq.fetch_add(1, Ordering::Relaxed);
        let battle_id = format!("battle-{}-{}", s.player.id, seq);
        let battle = start_battle(battle_id, &s.player, &templates, &mut *self.rng());

        let enemies: Vec<Value> = battle
            .enemies
            .iter()
            .enumerate()
            .map(|(index, e)| {
                json!({
                    "index": index,
                    "name": e.name,
                    "hp": e.actor.hp,
                    "maxHp": e.actor.max_hp,
                    "level": e.actor.level,
                    "element": e.actor.element,
                })
            })
            .collect();
        let data = json!({
            "battleId": battle.id,
            "round": battle.round,
            "enemies": enemies,
        });

        info!(battle = %battle.id, enemies = battle.enemies.len(), "battle started");
        s.battle = Some(battle);
        s.battle_write = BattleWrite::Save;
        Ok(data)
    }

    fn battle_action(&self, s: &mut Session, args: BattleActionArgs) -> Result<Value, DispatchError> {
        let Some(battle) = s.battle.as_mut() else {
            return Err(ToolError::StateConflict("no active battle".into()).into());
        };

        let mut report = resolve_round(
            battle,
            &args.action,
            &mut s.inventory,
            &self.config.battle,
            &mut *self.rng(),
        )?;
        write_back(&mut s.player, battle);

        match report.status {
            BattleStatus::Active => s.battle_write = BattleWrite::Save,
            BattleStatus::Won => {
                if let Some(rewards) = report.rewards.as_mut() {
                    grant_battle_rewards(&mut s.player, &mut s.inventory, rewards, &self.config.battle);
                }
                s.battle_write = BattleWrite::Clear;
            }
            BattleStatus::Lost => {
                report.penalty = Some(apply_defeat_penalty(&mut s.player, &self.config.battle));
                s.battle_write = BattleWrite::Clear;
            }
            BattleStatus::Fled => s.battle_write = BattleWrite::Clear,
        }

        if report.status.is_terminal() {
            info!(battle = %battle.id, status = ?report.status, rounds = report.round, "battle ended");
        }
        Ok(json!(report))
    }

    fn use_item(&self, s: &mut Session, args: UseItemArgs) -> Result<Value, DispatchError> {
        if s.battle.is_some() {
            return Err(ToolError::StateConflict(
                "items are used through execute_battle_action during a battle".into(),
            )
            .into());
        }
        let item = s
            .inventory
            .get(&args.item_id)
            .cloned()
            .ok_or_else(|| ToolError::NotFound(format!("item '{}' in inventory", args.item_id)))?;
        let Some(effect) = item.effect.clone().filter(|_| item.kind == ItemKind::Consumable) else {
            return Err(ToolError::Validation(format!("{} cannot be used", item.name)).into());
        };

        s.inventory.take(&item.id, 1);
        let healed = s.player.stats.restore_hp(effect.restore_hp);
        let restored_mp = s.player.stats.restore_mp(effect.restore_mp);
        let cured: Vec<String> = effect
            .cures
            .iter()
            .filter(|c| s.player.statuses.remove(c.as_str()))
            .cloned()
            .collect();

        Ok(json!({
            "itemId": item.id,
            "item": item.name,
            "healedHp": healed,
            "restoredMp": restored_mp,
            "cured": cured,
            "remaining": s.inventory.quantity(&item.id),
        }))
    }

    fn move_to_node(&self, s: &mut Session, args: MoveToNodeArgs) -> Result<Value, DispatchError> {
        let area = self.current_area(&s.player)?;
        let from = s.player.location.node_id.clone();
        if args.node_id == from {
            return Err(ToolError::StateConflict(format!("already at '{}'", from)).into());
        }
        let target = area
            .node(&args.node_id)
            .ok_or_else(|| ToolError::NotFound(format!("node '{}' in area '{}'", args.node_id, area.id)))?;
        let linked = target.connections.contains(&from)
            || area
                .node(&from)
                .is_some_and(|n| n.connections.contains(&args.node_id));
        if !linked {
            return Err(ToolError::StateConflict(format!(
                "'{}' is not connected to '{}'",
                args.node_id, from
            ))
            .into());
        }

        // Leaving mid-fight counts as fleeing.
        let fled = match s.battle.as_mut() {
            Some(battle) => {
                let report = escape(battle)?;
                write_back(&mut s.player, battle);
                s.battle_write = BattleWrite::Clear;
                Some(report)
            }
            None => None,
        };

        s.player.location = Location {
            area_id: area.id.clone(),
            node_id: target.id.clone(),
        };
        let npcs: Vec<&str> = target.npcs.iter().map(|n| n.name.as_str()).collect();
        Ok(json!({
            "from": from,
            "to": target.id,
            "name": target.name,
            "description": target.description,
            "npcs": npcs,
            "connections": target.connections,
            "encounters": target.encounters,
            "fled": fled,
        }))
    }

    fn interact_npc(&self, s: &mut Session, args: InteractNpcArgs) -> Result<Value, DispatchError> {
        if s.battle.is_some() {
            return Err(ToolError::StateConflict("cannot talk in the middle of a battle".into()).into());
        }
        let mut area = self.current_area(&s.player)?;
        let node_id = s.player.location.node_id.clone();
        let node = area
            .node_mut(&node_id)
            .ok_or_else(|| ToolError::NotFound(format!("node '{}'", node_id)))?;
        let npc = node
            .npcs
            .iter_mut()
            .find(|n| n.id == args.npc_id)
            .ok_or_else(|| ToolError::NotFound(format!("npc '{}' at '{}'", args.npc_id, node_id)))?;

        let before = npc.affinity;
        if let Some(delta) = args.affinity_delta {
            npc.affinity = npc.affinity.saturating_add(delta).clamp(AFFINITY_RANGE.0, AFFINITY_RANGE.1);
        }
        let data = json!({
            "npc": { "id": npc.id, "name": npc.name, "role": npc.role, "notes": npc.notes },
            "topic": args.topic,
            "affinity": npc.affinity,
            "affinityChange": npc.affinity - before,
        });

        if npc.affinity != before {
            s.areas.push(area);
        }
        Ok(data)
    }

    fn enhance_equipment(
        &self,
        s: &mut Session,
        args: EnhanceEquipmentArgs,
    ) -> Result<Value, DispatchError> {
        if s.battle.is_some() {
            return Err(ToolError::StateConflict("cannot enhance equipment during a battle".into()).into());
        }
        let gold = s.player.gold;
        let base = self.config.enhance_cost_base;
        let piece = s
            .player
            .equipment
            .iter_mut()
            .find(|e| e.id == args.equipment_id)
            .ok_or_else(|| ToolError::NotFound(format!("equipment '{}'", args.equipment_id)))?;

        let cost = base.saturating_mul(piece.enhance_level + 1);
        if gold < cost {
            return Err(ToolError::StateConflict(format!(
                "enhancing {} costs {} gold, only {} held",
                piece.name, cost, gold
            ))
            .into());
        }

        piece.enhance_level += 1;
        match piece.slot {
            EquipmentSlot::Weapon => piece.attack_bonus += 3,
            EquipmentSlot::Armor => piece.defense_bonus += 2,
            EquipmentSlot::Accessory => {
                piece.attack_bonus += 1;
                piece.defense_bonus += 1;
            }
        }
        let data = json!({
            "equipment": piece.name,
            "enhanceLevel": piece.enhance_level,
            "attackBonus": piece.attack_bonus,
            "defenseBonus": piece.defense_bonus,
            "goldSpent": cost,
        });
        s.player.gold -= cost;
        Ok(data)
    }

    fn generate_area(&self, s: &mut Session, args: GenerateAreaArgs) -> Result<Value, DispatchError> {
        let area = args.area;
        if self.store.load_area(&area.id)?.is_some() {
            return Err(ToolError::StateConflict(format!("area '{}' already exists", area.id)).into());
        }
        if args.enter && s.battle.is_some() {
            return Err(ToolError::StateConflict("cannot travel during a battle".into()).into());
        }

        let mut entered = None;
        if args.enter {
            if let Some(first) = area.nodes.first() {
                s.player.location = Location {
                    area_id: area.id.clone(),
                    node_id: first.id.clone(),
                };
                entered = Some(first.id.clone());
            }
        }
        let data = json!({
            "areaId": area.id,
            "name": area.name,
            "nodes": area.nodes.iter().map(|n| n.id.as_str()).collect::<Vec<_>>(),
            "enemyTemplates": area.enemy_templates.iter().map(|t| t.id.as_str()).collect::<Vec<_>>(),
            "entered": entered,
        });
        s.areas.push(area);
        Ok(data)
    }

    fn create_quest(
        &self,
        s: &mut Session,
        player_id: &PlayerId,
        args: CreateQuestArgs,
    ) -> Result<Value, DispatchError> {
        if self.store.load_quest(player_id, &args.id)?.is_some() {
            return Err(ToolError::StateConflict(format!("quest '{}' already exists", args.id)).into());
        }
        let mut objectives = args.objectives;
        for objective in objectives.iter_mut() {
            objective.progress = objective.progress.min(objective.required);
        }
        let quest = Quest {
            id: args.id,
            title: args.title,
            description: args.description,
            status: QuestStatus::Active,
            objectives,
            rewards: args.rewards,
            rewards_claimed: false,
        };
        let data = json!({ "quest": quest });
        s.quests.push(quest);
        Ok(data)
    }

    fn update_quest(
        &self,
        s: &mut Session,
        player_id: &PlayerId,
        args: UpdateQuestArgs,
    ) -> Result<Value, DispatchError> {
        let mut quest = self
            .store
            .load_quest(player_id, &args.quest_id)?
            .ok_or_else(|| ToolError::NotFound(format!("quest '{}'", args.quest_id)))?;
        if quest.status != QuestStatus::Active {
            return Err(ToolError::StateConflict(format!(
                "quest '{}' is already {:?}",
                quest.id, quest.status
            ))
            .into());
        }

        let mut objective_progress = None;
        if let Some(objective_id) = &args.objective_id {
            let objective = quest
                .objectives
                .iter_mut()
                .find(|o| &o.id == objective_id)
                .ok_or_else(|| ToolError::NotFound(format!("objective '{}'", objective_id)))?;
            objective.progress = match args.progress {
                Some(delta) => (objective.progress as i64 + delta as i64)
                    .clamp(0, objective.required as i64) as u32,
                None => objective.required,
            };
            objective_progress = Some(json!({
                "id": objective.id,
                "progress": objective.progress,
                "required": objective.required,
            }));
        }

        quest.status = match args.status {
            Some(status) => status,
            None if !quest.objectives.is_empty()
                && quest.objectives.iter().all(|o| o.is_complete()) =>
            {
                QuestStatus::Completed
            }
            None => QuestStatus::Active,
        };

        let mut rewards = None;
        let mut level_up = None;
        if quest.status == QuestStatus::Completed && !quest.rewards_claimed {
            level_up = grant_quest_rewards(
                &mut s.player,
                &mut s.inventory,
                &quest.rewards,
                &self.config.battle,
            );
            quest.rewards_claimed = true;
            rewards = Some(quest.rewards.clone());
        }

        let data = json!({
            "questId": quest.id,
            "status": quest.status,
            "objective": objective_progress,
            "rewards": rewards,
            "levelUp": level_up,
        });
        s.quests.push(quest);
        Ok(data)
    }

    fn modify_player(&self, s: &mut Session, args: ModifyPlayerDataArgs) -> Result<Value, DispatchError> {
        let player = &mut s.player;

        // Every check runs before the first change.
        if s.battle.is_some() && (args.hp_delta.is_some() || args.mp_delta.is_some()) {
            return Err(ToolError::StateConflict(
                "HP and MP change through execute_battle_action during a battle".into(),
            )
            .into());
        }
        let gold = match args.gold_delta {
            Some(delta) => {
                let next = (player.gold as i64).saturating_add(delta);
                if next < 0 {
                    return Err(ToolError::Validation(format!(
                        "goldDelta {} exceeds the {} gold held",
                        delta, player.gold
                    ))
                    .into());
                }
                Some(u32::try_from(next).unwrap_or(u32::MAX))
            }
            None => None,
        };
        let equip_slot = match &args.equip {
            Some(id) => Some(
                player
                    .equipment
                    .iter()
                    .find(|e| &e.id == id)
                    .map(|e| e.slot)
                    .ok_or_else(|| ToolError::NotFound(format!("equipment '{}'", id)))?,
            ),
            None => None,
        };
        if let Some(id) = &args.unequip {
            if !player.equipment.iter().any(|e| &e.id == id) {
                return Err(ToolError::NotFound(format!("equipment '{}'", id)).into());
            }
        }
        if let Some(id) = &args.equip_skill {
            let known = player.skills.iter().any(|sk| &sk.id == id)
                || args.learn_skill.as_ref().is_some_and(|sk| &sk.id == id);
            if !known {
                return Err(ToolError::NotFound(format!("skill '{}'", id)).into());
            }
        }

        let mut changes = serde_json::Map::new();
        if let Some(delta) = args.hp_delta {
            let before = player.stats.hp;
            player.stats.hp = player.stats.hp.saturating_add(delta).clamp(0, player.stats.max_hp);
            changes.insert("hp".into(), json!(player.stats.hp - before));
        }
        if let Some(delta) = args.mp_delta {
            let before = player.stats.mp;
            player.stats.mp = player.stats.mp.saturating_add(delta).clamp(0, player.stats.max_mp);
            changes.insert("mp".into(), json!(player.stats.mp - before));
        }
        if let Some(next) = gold {
            changes.insert("gold".into(), json!(next as i64 - player.gold as i64));
            player.gold = next;
        }
        if let Some(exp) = args.exp_delta {
            let level_up = apply_exp(player, exp, &self.config.battle);
            changes.insert("exp".into(), json!(exp));
            if let Some(level_up) = level_up {
                changes.insert("levelUp".into(), json!(level_up));
            }
        }
        if let Some(id) = &args.unequip {
            for piece in player.equipment.iter_mut().filter(|e| &e.id == id) {
                piece.equipped = false;
            }
            changes.insert("unequipped".into(), json!(id));
        }
        if let (Some(id), Some(slot)) = (&args.equip, equip_slot) {
            for piece in player.equipment.iter_mut().filter(|e| e.slot == slot) {
                piece.equipped = &piece.id == id;
            }
            changes.insert("equipped".into(), json!(id));
        }
        if let Some(skill) = args.learn_skill {
            changes.insert("learnedSkill".into(), json!(skill.id));
            match player.skills.iter_mut().find(|sk| sk.id == skill.id) {
                Some(existing) => *existing = skill,
                None => player.skills.push(skill),
            }
        }
        if let Some(id) = args.equip_skill {
            if !player.equipped_skills.contains(&id) {
                player.equipped_skills.push(id.clone());
            }
            changes.insert("equippedSkill".into(), json!(id));
        }
        if let Some(flag) = args.set_flag {
            player.flags.insert(flag.clone());
            changes.insert("flag".into(), json!(flag));
        }

        Ok(json!({
            "changes": changes,
            "hp": player.stats.hp,
            "mp": player.stats.mp,
            "gold": player.gold,
            "exp": player.exp,
            "level": player.stats.level,
        }))
    }

    fn add_item(&self, s: &mut Session, args: AddItemArgs) -> Value {
        s.inventory.add(InventoryItem {
            id: args.item_id.clone(),
            name: args.name.clone(),
            kind: args.kind,
            quantity: args.quantity,
            description: args.description,
            effect: args.effect,
        });
        json!({
            "itemId": args.item_id,
            "name": args.name,
            "quantity": args.quantity,
            "total": s.inventory.quantity(&args.item_id),
        })
    }
}

/// Normalizes a narrative delivered through the tool channel.
fn send_narrative(args: SendNarrativeArgs) -> Value {
    let narrative = StructuredNarrative {
        thought: args.thought.filter(|t| !t.trim().is_empty()),
        narrative: args.narrative,
        mood: args.mood,
        suggestions: args.suggestions.and_then(normalize_suggestions),
        metadata: args.metadata,
    };
    json!({ "narrative": narrative })
}

/// Reads back the narrative carried by a successful `send_narrative` result.
pub fn narrative_from_result(result: &ToolResult) -> Option<StructuredNarrative> {
    let value = result.data.as_ref()?.get("narrative")?;
    serde_json::from_value(value.clone()).ok()
}
