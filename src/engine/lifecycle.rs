use rand::Rng;
use tracing::{debug, info};

use super::*;
use crate::constants::SPAWN_ATTEMPTS;
use crate::types::Cell;

impl GameEngine {
    /// Active -> Respawning. Wipes territory and trail and schedules the
    /// respawn on the engine clock. No-op if already respawning.
    pub(super) fn eliminate_player(&mut self, idx: usize) {
        if self.players[idx].is_respawning() {
            return;
        }
        self.clear_territory(idx);

        let due = self
            .clock
            .now_ms()
            .saturating_add(self.options.respawn_delay_ms);
        let player = &mut self.players[idx];
        player.direction = Direction::None;
        player.is_moving = false;
        player.move_progress = 0.0;
        player.trail.clear();
        player.is_outside = false;
        player.area = 0;
        player.respawn_due_ms = Some(due);
        info!(player_id = player.id.as_str(), due_ms = due, "player eliminated");
    }

    pub(super) fn process_due_respawns(&mut self) {
        let now = self.clock.now_ms();
        for idx in 0..self.players.len() {
            if matches!(self.players[idx].respawn_due_ms, Some(due) if due <= now) {
                self.finish_respawn(idx);
            }
        }
    }

    /// Respawning -> Active(Home) on a fresh spawn with a new safe zone.
    pub(super) fn finish_respawn(&mut self, idx: usize) {
        if !self.players[idx].is_respawning() {
            return;
        }
        let (col, row) = self.pick_spawn(SAFE_ZONE_RADIUS);
        let (x, y) = self.grid.aligned_position(col, row);

        let player = &mut self.players[idx];
        player.col = col;
        player.row = row;
        player.x = x;
        player.y = y;
        player.direction = Direction::None;
        player.is_moving = false;
        player.move_progress = 0.0;
        player.from_x = x;
        player.from_y = y;
        player.target_x = x;
        player.target_y = y;
        player.target_col = col;
        player.target_row = row;
        player.trail.clear();
        player.is_outside = false;
        player.area = 0;
        player.respawn_due_ms = None;

        self.create_safe_zone(idx, SAFE_ZONE_RADIUS);
        info!(
            player_id = self.players[idx].id.as_str(),
            col,
            row,
            area = self.players[idx].area,
            "player respawned"
        );
    }

    /// Removes the player's territory and trail overlay, leaving the cells
    /// empty. Cells under the trail keep their owners.
    pub(super) fn clear_territory(&mut self, idx: usize) {
        let player_id = self.players[idx].id.clone();

        let owned = self.grid.owned_keys(&player_id);
        for key in &owned {
            self.grid.set_cell(*key, None);
            self.delta.mark_dirty(*key);
        }

        let trail_keys = self.grid.trail_keys_of(&player_id);
        for key in &trail_keys {
            self.grid.remove_trail(*key);
            self.delta.mark_dirty(*key);
        }

        let player = &mut self.players[idx];
        player.area = player.area.saturating_sub(owned.len() as u32);
        player.trail.clear();
        player.is_outside = false;
        debug!(
            player_id = player_id.as_str(),
            cells = owned.len(),
            trails = trail_keys.len(),
            "territory cleared"
        );
    }

    /// Grants the square of `radius` around the player's cell, seizing it from
    /// whoever owned it.
    pub(super) fn create_safe_zone(&mut self, idx: usize, radius: i32) {
        let player_id = self.players[idx].id.clone();
        let color = self.players[idx].color.clone();
        let (center_col, center_row) = (self.players[idx].col, self.players[idx].row);
        self.players[idx].is_outside = false;
        self.players[idx].trail.clear();

        let mut granted = 0;
        for row in (center_row - radius)..=(center_row + radius) {
            for col in (center_col - radius)..=(center_col + radius) {
                let Some(key) = self.grid.key_of(col, row) else {
                    continue;
                };
                if self.grid.is_owned_by(key, &player_id) {
                    continue;
                }
                let previous = self.grid.set_cell(
                    key,
                    Some(Cell {
                        owner_id: player_id.clone(),
                        color: color.clone(),
                    }),
                );
                if let Some(cell) = previous {
                    self.decrement_owner_area(&cell.owner_id);
                }
                self.delta.mark_dirty(key);
                granted += 1;
            }
        }
        self.players[idx].area += granted;
    }

    /// Random free spot whose whole safe zone is unowned, with a best-effort
    /// fallback once the attempts run out.
    pub(super) fn pick_spawn(&mut self, radius: i32) -> (i32, i32) {
        for _ in 0..SPAWN_ATTEMPTS {
            let col = self.random_coordinate(self.grid.cols, radius);
            let row = self.random_coordinate(self.grid.rows, radius);
            if self.grid.zone_available(col, row, radius) {
                return (col, row);
            }
        }
        let col = self.random_coordinate(self.grid.cols, radius);
        let row = self.random_coordinate(self.grid.rows, radius);
        debug!(col, row, "no free spawn zone, placing anyway");
        (col, row)
    }

    fn random_coordinate(&mut self, max: i32, radius: i32) -> i32 {
        let min = radius.min(max - 1).max(0);
        let limit = (max - radius - 1).max(min);
        self.rng.random_range(min..=limit)
    }
}
