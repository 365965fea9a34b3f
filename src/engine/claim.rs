use tracing::{debug, info};

use super::*;
use crate::types::{Cell, TrailMark};

impl GameEngine {
    /// Resolves the cell a player just stepped onto.
    pub(super) fn claim_cell(&mut self, idx: usize) {
        let (col, row) = (self.players[idx].col, self.players[idx].row);
        let Some(key) = self.grid.key_of(col, row) else {
            return;
        };
        let player_id = self.players[idx].id.clone();

        if let Some(trail) = self.grid.trail(key) {
            if trail.owner_id == player_id {
                debug!(player_id = player_id.as_str(), row, col, "ran into own trail");
                self.eliminate_player(idx);
                return;
            }
            let victim_id = trail.owner_id.clone();
            self.handle_trail_hit(&victim_id, &player_id, key);
        }

        if self.grid.is_owned_by(key, &player_id) {
            self.complete_trail(idx);
            self.fill_captured_areas(idx);
            return;
        }

        if self.players[idx].trail.contains(&key) {
            debug!(player_id = player_id.as_str(), row, col, "self collision on trail set");
            self.eliminate_player(idx);
            return;
        }

        let color = self.players[idx].color.clone();
        self.grid.set_trail(
            key,
            TrailMark {
                owner_id: player_id,
                color,
            },
        );
        self.delta.mark_dirty(key);
        let player = &mut self.players[idx];
        player.is_outside = true;
        player.trail.insert(key);
    }

    /// The trail owner at `key` is knocked out; the attacker carries on.
    fn handle_trail_hit(&mut self, victim_id: &str, attacker_id: &str, key: CellKey) {
        let Some(victim_idx) = self.index_of(victim_id) else {
            return;
        };
        let still_there = self
            .grid
            .trail(key)
            .map(|mark| mark.owner_id == victim_id)
            .unwrap_or(false);
        if !still_there {
            return;
        }
        info!(
            victim_id,
            attacker_id,
            at = self.grid.wire_key(key).as_str(),
            "trail cut"
        );
        self.eliminate_player(victim_idx);
    }

    /// Converts every trail cell of the player into owned territory, seizing
    /// cells from other owners. Returns how many cells changed hands.
    pub(super) fn complete_trail(&mut self, idx: usize) -> u32 {
        let player_id = self.players[idx].id.clone();
        let color = self.players[idx].color.clone();
        let mut keys: Vec<CellKey> = self.players[idx].trail.drain().collect();
        keys.sort_unstable();

        let mut promoted = 0;
        for key in keys {
            self.grid.remove_trail(key);
            let previous = self.grid.set_cell(
                key,
                Some(Cell {
                    owner_id: player_id.clone(),
                    color: color.clone(),
                }),
            );
            self.delta.mark_dirty(key);
            match previous {
                Some(cell) if cell.owner_id == player_id => {}
                Some(cell) => {
                    self.decrement_owner_area(&cell.owner_id);
                    promoted += 1;
                }
                None => promoted += 1,
            }
        }

        let player = &mut self.players[idx];
        player.area += promoted;
        player.is_outside = false;
        if promoted > 0 {
            debug!(
                player_id = player_id.as_str(),
                promoted,
                area = player.area,
                "trail sealed"
            );
        }
        promoted
    }
}
