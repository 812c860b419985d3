//! In-memory game table: the daemon's stand-in for the game database and rules engine.
//! Games appear when an invitation is accepted; moves are recorded once each.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use wordlink_core::integrity::hash_payload;
use wordlink_core::{
    CreateOutcome, GameFeeder, GameStore, InviteInfo, MoveSummary, PeerAddress, RowId,
};

#[derive(Debug, Clone)]
pub struct StoredGame {
    pub game_id: i32,
    pub name: String,
    pub dict: String,
    pub host: PeerAddress,
    pub moves: Vec<(Vec<u8>, PeerAddress)>,
    seen: HashSet<[u8; 32]>,
}

impl StoredGame {
    fn new(game_id: i32, name: &str, dict: &str, host: PeerAddress) -> Self {
        Self {
            game_id,
            name: name.to_owned(),
            dict: dict.to_owned(),
            host,
            moves: Vec::new(),
            seen: HashSet::new(),
        }
    }
}

#[derive(Default)]
struct Table {
    next_row: RowId,
    rows: BTreeMap<RowId, StoredGame>,
}

#[derive(Default)]
pub struct InMemoryGames {
    table: Mutex<Table>,
}

impl InMemoryGames {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a game directly, as the local user starting one would.
    pub fn insert(&self, game_id: i32, name: &str, host: PeerAddress) -> RowId {
        self.add_row(StoredGame::new(game_id, name, "", host))
    }

    /// Drop every row of a game. Returns whether any existed.
    pub fn delete(&self, game_id: i32) -> bool {
        let mut t = self.lock();
        let before = t.rows.len();
        t.rows.retain(|_, g| g.game_id != game_id);
        t.rows.len() != before
    }

    /// Every row, oldest first.
    pub fn list(&self) -> Vec<(RowId, StoredGame)> {
        self.lock().rows.iter().map(|(&r, g)| (r, g.clone())).collect()
    }

    #[cfg(test)]
    pub fn get(&self, row: RowId) -> Option<StoredGame> {
        self.lock().rows.get(&row).cloned()
    }

    fn add_row(&self, game: StoredGame) -> RowId {
        let mut t = self.lock();
        t.next_row += 1;
        let row = t.next_row;
        t.rows.insert(row, game);
        row
    }

    fn lock(&self) -> MutexGuard<'_, Table> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl GameStore for InMemoryGames {
    fn has_game(&self, game_id: i32) -> bool {
        self.lock().rows.values().any(|g| g.game_id == game_id)
    }

    fn rows_for_game(&self, game_id: i32) -> Vec<RowId> {
        self.lock()
            .rows
            .iter()
            .filter(|(_, g)| g.game_id == game_id)
            .map(|(&row, _)| row)
            .collect()
    }

    fn create_game(&self, info: &InviteInfo, sender_name: &str, sender: &PeerAddress) -> CreateOutcome {
        if info.dict.is_empty() {
            return CreateOutcome::Failed;
        }
        let name = info
            .name
            .clone()
            .unwrap_or_else(|| format!("Game with {sender_name}"));
        let game = StoredGame::new(info.game_id, &name, &info.dict, sender.clone());
        CreateOutcome::Created(self.add_row(game))
    }
}

impl GameFeeder for InMemoryGames {
    // No UI here, so never an open instance.
    fn feed_live(&self, _game_id: i32, _payload: &[u8], _sender: &PeerAddress) -> bool {
        false
    }

    /// Records each distinct payload once per row. A real rules engine dedups by move
    /// sequence instead, so two legitimately identical moves would both apply there.
    fn feed_stored(&self, row: RowId, payload: &[u8], sender: &PeerAddress) -> Option<MoveSummary> {
        let mut t = self.lock();
        let game = t.rows.get_mut(&row)?;
        if !game.seen.insert(hash_payload(payload)) {
            return None;
        }
        game.moves.push((payload.to_vec(), sender.clone()));
        Some(MoveSummary {
            text: format!("{}: move {} from {sender}", game.name, game.moves.len()),
        })
    }
}
