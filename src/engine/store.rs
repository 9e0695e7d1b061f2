use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::engine::error::StoreError;
use crate::model::battle::BattleState;
use crate::model::game_state::{Area, Inventory, PlayerId, Player, Quest};
use crate::model::message::Message;

/// Authoritative game state. Every read and write made by tools goes
/// through here; the narrator never sees it directly.
pub trait GameStore: Send + Sync {
    fn load_player(&self, id: &PlayerId) -> Result<Option<Player>, StoreError>;
    fn save_player(&self, player: &Player) -> Result<(), StoreError>;

    fn load_inventory(&self, id: &PlayerId) -> Result<Inventory, StoreError>;
    fn save_inventory(&self, id: &PlayerId, inventory: &Inventory) -> Result<(), StoreError>;

    fn load_area(&self, area_id: &str) -> Result<Option<Area>, StoreError>;
    fn save_area(&self, area: &Area) -> Result<(), StoreError>;

    fn load_quest(&self, id: &PlayerId, quest_id: &str) -> Result<Option<Quest>, StoreError>;
    fn list_quests(&self, id: &PlayerId) -> Result<Vec<Quest>, StoreError>;
    fn save_quest(&self, id: &PlayerId, quest: &Quest) -> Result<(), StoreError>;

    /// The player's active battle, if any.
    fn load_battle(&self, id: &PlayerId) -> Result<Option<BattleState>, StoreError>;
    fn save_battle(&self, battle: &BattleState) -> Result<(), StoreError>;
    fn clear_battle(&self, id: &PlayerId) -> Result<(), StoreError>;

    fn append_message(&self, id: &PlayerId, message: &Message) -> Result<(), StoreError>;
    /// Up to `limit` most recent messages, oldest first.
    fn recent_messages(&self, id: &PlayerId, limit: usize) -> Result<Vec<Message>, StoreError>;
}

#[derive(Default)]
struct Tables {
    players: HashMap<PlayerId, Player>,
    inventories: HashMap<PlayerId, Inventory>,
    areas: HashMap<String, Area>,
    quests: HashMap<PlayerId, Vec<Quest>>,
    battles: HashMap<PlayerId, BattleState>,
    history: HashMap<PlayerId, Vec<Message>>,
}

/// Process-local store. `set_available(false)` makes every call fail with
/// `StoreError::Unavailable`, which is how outages are exercised.
pub struct InMemoryStore {
    tables: Mutex<Tables>,
    available: AtomicBool,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            available: AtomicBool::new(true),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("store is offline".into()));
        }
        Ok(self.tables.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl GameStore for InMemoryStore {
    fn load_player(&self, id: &PlayerId) -> Result<Option<Player>, StoreError> {
        Ok(self.tables()?.players.get(id).cloned())
    }

    fn save_player(&self, player: &Player) -> Result<(), StoreError> {
        self.tables()?
            .players
            .insert(player.id.clone(), player.clone());
        Ok(())
    }

    fn load_inventory(&self, id: &PlayerId) -> Result<Inventory, StoreError> {
        Ok(self
            .tables()?
            .inventories
            .get(id)
            .cloned()
            .unwrap_or_default())
    }

    fn save_inventory(&self, id: &PlayerId, inventory: &Inventory) -> Result<(), StoreError> {
        self.tables()?
            .inventories
            .insert(id.clone(), inventory.clone());
        Ok(())
    }

    fn load_area(&self, area_id: &str) -> Result<Option<Area>, StoreError> {
        Ok(self.tables()?.areas.get(area_id).cloned())
    }

    fn save_area(&self, area: &Area) -> Result<(), StoreError> {
        self.tables()?.areas.insert(area.id.clone(), area.clone());
        Ok(())
    }

    fn load_quest(&self, id: &PlayerId, quest_id: &str) -> Result<Option<Quest>, StoreError> {
        Ok(self
            .tables()?
            .quests
            .get(id)
            .and_then(|quests| quests.iter().find(|q| q.id == quest_id).cloned()))
    }

    fn list_quests(&self, id: &PlayerId) -> Result<Vec<Quest>, StoreError> {
        Ok(self.tables()?.quests.get(id).cloned().unwrap_or_default())
    }

    fn save_quest(&self, id: &PlayerId, quest: &Quest) -> Result<(), StoreError> {
        let mut tables = self.tables()?;
        let quests = tables.quests.entry(id.clone()).or_default();
        match quests.iter_mut().find(|q| q.id == quest.id) {
            Some(existing) => *existing = quest.clone(),
            None => quests.push(quest.clone()),
        }
        Ok(())
    }

    fn load_battle(&self, id: &PlayerId) -> Result<Option<BattleState>, StoreError> {
        Ok(self.tables()?.battles.get(id).cloned())
    }

    fn save_battle(&self, battle: &BattleState) -> Result<(), StoreError> {
        self.tables()?
            .battles
            .insert(battle.player_id.clone(), battle.clone());
        Ok(())
    }

    fn clear_battle(&self, id: &PlayerId) -> Result<(), StoreError> {
        self.tables()?.battles.remove(id);
        Ok(())
    }

    fn append_message(&self, id: &PlayerId, message: &Message) -> Result<(), StoreError> {
        self.tables()?
            .history
            .entry(id.clone())
            .or_default()
            .push(message.clone());
        Ok(())
    }

    fn recent_messages(&self, id: &PlayerId, limit: usize) -> Result<Vec<Message>, StoreError> {
        let tables = self.tables()?;
        let Some(history) = tables.history.get(id) else {
            return Ok(Vec::new());
        };
        let start = history.len().saturating_sub(limit);
        Ok(history[start..].to_vec())
    }
}
