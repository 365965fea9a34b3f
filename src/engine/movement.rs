use tracing::{debug, info};

use super::utils::lerp;
use super::*;

impl GameEngine {
    pub(super) fn move_players(&mut self, dt_ms: u64) {
        for idx in 0..self.players.len() {
            if self.players[idx].is_respawning() {
                continue;
            }

            if self.players[idx].area == 0 {
                info!(
                    player_id = self.players[idx].id.as_str(),
                    "no territory left, eliminating"
                );
                self.eliminate_player(idx);
                continue;
            }

            if !self.players[idx].is_moving && self.try_start_move(idx) {
                self.players[idx].move_progress = 0.0;
            }
            if !self.players[idx].is_moving {
                continue;
            }

            let interval = self.players[idx].move_interval;
            self.players[idx].move_progress += dt_ms as f64 / interval;

            while self.players[idx].move_progress >= 1.0 {
                self.players[idx].move_progress -= 1.0;
                self.finish_move(idx);
                if self.players[idx].is_respawning() || !self.try_start_move(idx) {
                    self.players[idx].move_progress = 0.0;
                    break;
                }
            }

            let player = &mut self.players[idx];
            if player.is_moving {
                let t = player.move_progress;
                player.x = lerp(player.from_x, player.target_x, t);
                player.y = lerp(player.from_y, player.target_y, t);
            }
        }
    }

    /// Begins a step toward the latched direction. Leaves `move_progress`
    /// alone so overflow from a finished step carries into the next one.
    pub(super) fn try_start_move(&mut self, idx: usize) -> bool {
        let Some((dc, dr)) = self.players[idx].direction.delta() else {
            return false;
        };
        let next_col = self.players[idx].col + dc;
        let next_row = self.players[idx].row + dr;

        if !self.grid.in_bounds(next_col, next_row) {
            debug!(
                player_id = self.players[idx].id.as_str(),
                next_col, next_row, "blocked by board edge"
            );
            self.players[idx].direction = Direction::None;
            return false;
        }

        let (from_x, from_y) = self
            .grid
            .aligned_position(self.players[idx].col, self.players[idx].row);
        let (target_x, target_y) = self.grid.aligned_position(next_col, next_row);

        let player = &mut self.players[idx];
        player.from_x = from_x;
        player.from_y = from_y;
        player.target_x = target_x;
        player.target_y = target_y;
        player.target_col = next_col;
        player.target_row = next_row;
        player.is_moving = true;
        true
    }

    /// Snaps onto the target cell and resolves it.
    pub(super) fn finish_move(&mut self, idx: usize) {
        let player = &mut self.players[idx];
        player.col = player.target_col;
        player.row = player.target_row;
        player.x = player.target_x;
        player.y = player.target_y;
        player.is_moving = false;
        self.claim_cell(idx);
    }
}
