//! In-memory player registry
//!
//! Maps each joined player's identifier to the latest snapshot of their
//! state. States are opaque JSON objects; the registry never looks inside
//! them beyond merging top-level fields.

use shared::{PlayerId, PlayerState};
use std::collections::HashMap;

#[derive(Debug, Default, Clone)]
pub struct PlayerRegistry {
    players: HashMap<PlayerId, PlayerState>,
}

impl PlayerRegistry {
    pub fn new() -> Self {
        Self {
            players: HashMap::new(),
        }
    }

    /// Stores `state` for `id`, replacing any previous entry wholesale.
    pub fn put(&mut self, id: PlayerId, state: PlayerState) {
        self.players.insert(id, state);
    }

    /// Shallow-merges `partial` into the existing state for `id`.
    ///
    /// Fields present in `partial` overwrite the stored ones; everything else
    /// keeps its previous value. Returns the merged state, or `None` without
    /// touching anything if `id` is not registered.
    pub fn merge(&mut self, id: &str, partial: PlayerState) -> Option<&PlayerState> {
        let state = self.players.get_mut(id)?;
        for (field, value) in partial {
            state.insert(field, value);
        }
        Some(&*state)
    }

    pub fn remove(&mut self, id: &str) -> Option<PlayerState> {
        self.players.remove(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.players.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&PlayerState> {
        self.players.get(id)
    }

    /// Point-in-time copy of every registered player.
    pub fn snapshot(&self) -> HashMap<PlayerId, PlayerState> {
        self.players.clone()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}
