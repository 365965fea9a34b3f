use tracing::debug;

use super::*;
use crate::types::Cell;

impl GameEngine {
    /// Claims every cell the player's territory now walls off from the board
    /// edge. Returns the number of captured cells.
    pub(super) fn fill_captured_areas(&mut self, idx: usize) -> u32 {
        let player_id = self.players[idx].id.clone();
        let color = self.players[idx].color.clone();
        let enclosed = self.grid.enclosed_cells(&player_id);

        let mut captured = 0;
        for key in enclosed {
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
            captured += 1;
        }

        if captured > 0 {
            self.players[idx].area += captured;
            debug!(
                player_id = player_id.as_str(),
                captured,
                area = self.players[idx].area,
                "enclosed region captured"
            );
        }
        captured
    }

    pub(super) fn decrement_owner_area(&mut self, owner_id: &str) {
        if let Some(owner_idx) = self.index_of(owner_id) {
            let owner = &mut self.players[owner_idx];
            owner.area = owner.area.saturating_sub(1);
        }
    }
}
