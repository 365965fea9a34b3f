use std::collections::{BTreeSet, HashMap, HashSet};

use super::*;
use crate::types::{CellChange, DeltaPayload, FullSnapshot};

/// The subset of a player that delta sampling compares against.
#[derive(Clone, Debug, PartialEq)]
struct ObservedPlayer {
    x: f64,
    y: f64,
    direction: Direction,
    area: u32,
}

impl ObservedPlayer {
    fn of(player: &PlayerInternal) -> Self {
        Self {
            x: player.x,
            y: player.y,
            direction: player.direction,
            area: player.area,
        }
    }
}

/// Dirty cell keys plus the state as of the previous sample.
#[derive(Clone, Debug, Default)]
pub(super) struct DeltaTracker {
    dirty: BTreeSet<CellKey>,
    baseline: HashMap<String, ObservedPlayer>,
    sampled_trails: HashSet<CellKey>,
}

impl DeltaTracker {
    pub(super) fn mark_dirty(&mut self, key: CellKey) {
        self.dirty.insert(key);
    }
}

impl GameEngine {
    /// Players that appear in snapshots and deltas. Respawning players are
    /// hidden until they come back.
    fn visible_players(&self) -> impl Iterator<Item = &PlayerInternal> {
        self.players.iter().filter(|player| !player.is_respawning())
    }

    /// True when `get_state_delta` would report anything beyond the clock.
    pub fn has_changes(&self) -> bool {
        if !self.delta.dirty.is_empty() {
            return true;
        }
        let mut visible = 0;
        for player in self.visible_players() {
            visible += 1;
            match self.delta.baseline.get(&player.id) {
                Some(previous) if *previous == ObservedPlayer::of(player) => {}
                _ => return true,
            }
        }
        visible != self.delta.baseline.len()
    }

    /// Changes since the previous call, then re-baselines.
    pub fn get_state_delta(&mut self) -> DeltaPayload {
        let mut players = BTreeMap::new();
        let mut baseline = HashMap::new();
        for player in self.visible_players() {
            let observed = ObservedPlayer::of(player);
            if self.delta.baseline.get(&player.id) != Some(&observed) {
                players.insert(player.id.clone(), Some(player.view()));
            }
            baseline.insert(player.id.clone(), observed);
        }
        for id in self.delta.baseline.keys() {
            if !baseline.contains_key(id) {
                players.insert(id.clone(), None);
            }
        }

        let mut cells = Vec::with_capacity(self.delta.dirty.len());
        let mut trails = BTreeMap::new();
        for &key in &self.delta.dirty {
            let (col, row) = self.grid.coords_of(key);
            cells.push(CellChange {
                row,
                col,
                cell: self.grid.cell(key).cloned(),
            });
            match self.grid.trail(key) {
                Some(mark) => {
                    trails.insert(self.grid.wire_key(key), Some(mark.clone()));
                }
                None if self.delta.sampled_trails.contains(&key) => {
                    trails.insert(self.grid.wire_key(key), None);
                }
                None => {}
            }
        }

        self.delta.baseline = baseline;
        self.delta.sampled_trails = self.grid.trails().map(|(key, _)| key).collect();
        self.delta.dirty.clear();

        DeltaPayload {
            players,
            cells,
            trails,
            status: self.clock.status(),
        }
    }

    /// Full room state for newly joined clients and periodic resyncs. Does not
    /// touch the delta baseline.
    pub fn get_game_state(&self) -> FullSnapshot {
        FullSnapshot {
            players: self
                .visible_players()
                .map(|player| (player.id.clone(), player.view()))
                .collect(),
            cells: self.grid.rows_snapshot(),
            trails: self
                .grid
                .trails()
                .map(|(key, mark)| (self.grid.wire_key(key), mark.clone()))
                .collect(),
            status: self.clock.status(),
        }
    }
}
