use std::collections::{HashMap, VecDeque};

use crate::types::{Arena, Cell, TrailMark};

/// Packed cell address, `row * cols + col`.
pub type CellKey = usize;

/// Fixed-size board: a dense ownership matrix plus a sparse trail overlay.
#[derive(Clone, Debug)]
pub struct Grid {
    pub cols: i32,
    pub rows: i32,
    pub cell_size: i32,
    cells: Vec<Option<Cell>>,
    trails: HashMap<CellKey, TrailMark>,
}

impl Grid {
    pub fn new(cols: i32, rows: i32, cell_size: i32) -> Self {
        let cols = cols.max(1);
        let rows = rows.max(1);
        Self {
            cols,
            rows,
            cell_size: cell_size.max(1),
            cells: vec![None; (cols * rows) as usize],
            trails: HashMap::new(),
        }
    }

    pub fn arena(&self) -> Arena {
        Arena {
            width: self.cols * self.cell_size,
            height: self.rows * self.cell_size,
        }
    }

    pub fn in_bounds(&self, col: i32, row: i32) -> bool {
        col >= 0 && row >= 0 && col < self.cols && row < self.rows
    }

    pub fn key_of(&self, col: i32, row: i32) -> Option<CellKey> {
        if !self.in_bounds(col, row) {
            return None;
        }
        Some((row * self.cols + col) as usize)
    }

    /// `(col, row)` of a packed key.
    pub fn coords_of(&self, key: CellKey) -> (i32, i32) {
        let key = key as i32;
        (key % self.cols, key / self.cols)
    }

    /// Client-facing `"row:col"` form of a key.
    pub fn wire_key(&self, key: CellKey) -> String {
        let (col, row) = self.coords_of(key);
        format!("{row}:{col}")
    }

    pub fn aligned_position(&self, col: i32, row: i32) -> (f64, f64) {
        (
            (col * self.cell_size) as f64,
            (row * self.cell_size) as f64,
        )
    }

    pub fn cell(&self, key: CellKey) -> Option<&Cell> {
        self.cells.get(key).and_then(|cell| cell.as_ref())
    }

    pub fn cell_at(&self, col: i32, row: i32) -> Option<&Cell> {
        self.key_of(col, row).and_then(|key| self.cell(key))
    }

    pub fn owner_of(&self, key: CellKey) -> Option<&str> {
        self.cell(key).map(|cell| cell.owner_id.as_str())
    }

    pub fn is_owned_by(&self, key: CellKey, owner_id: &str) -> bool {
        self.owner_of(key) == Some(owner_id)
    }

    /// Replaces the cell and hands back what was there.
    pub(crate) fn set_cell(&mut self, key: CellKey, cell: Option<Cell>) -> Option<Cell> {
        match self.cells.get_mut(key) {
            Some(slot) => std::mem::replace(slot, cell),
            None => None,
        }
    }

    pub(crate) fn cell_mut(&mut self, key: CellKey) -> Option<&mut Cell> {
        self.cells.get_mut(key).and_then(|cell| cell.as_mut())
    }

    pub fn trail(&self, key: CellKey) -> Option<&TrailMark> {
        self.trails.get(&key)
    }

    pub fn trail_count(&self) -> usize {
        self.trails.len()
    }

    pub fn trails(&self) -> impl Iterator<Item = (CellKey, &TrailMark)> {
        self.trails.iter().map(|(key, mark)| (*key, mark))
    }

    pub(crate) fn set_trail(&mut self, key: CellKey, mark: TrailMark) {
        if key < self.cells.len() {
            self.trails.insert(key, mark);
        }
    }

    pub(crate) fn trail_mut(&mut self, key: CellKey) -> Option<&mut TrailMark> {
        self.trails.get_mut(&key)
    }

    pub(crate) fn remove_trail(&mut self, key: CellKey) -> Option<TrailMark> {
        self.trails.remove(&key)
    }

    pub fn owned_keys(&self, owner_id: &str) -> Vec<CellKey> {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, cell)| {
                cell.as_ref()
                    .map(|cell| cell.owner_id == owner_id)
                    .unwrap_or(false)
            })
            .map(|(key, _)| key)
            .collect()
    }

    pub fn count_owned(&self, owner_id: &str) -> usize {
        self.cells
            .iter()
            .flatten()
            .filter(|cell| cell.owner_id == owner_id)
            .count()
    }

    pub fn trail_keys_of(&self, owner_id: &str) -> Vec<CellKey> {
        let mut keys: Vec<CellKey> = self
            .trails
            .iter()
            .filter(|(_, mark)| mark.owner_id == owner_id)
            .map(|(key, _)| *key)
            .collect();
        keys.sort_unstable();
        keys
    }

    /// True when no cell in the square around the center is owned by anyone.
    /// Out-of-board parts of the square are ignored.
    pub fn zone_available(&self, center_col: i32, center_row: i32, radius: i32) -> bool {
        for row in (center_row - radius)..=(center_row + radius) {
            for col in (center_col - radius)..=(center_col + radius) {
                if self.cell_at(col, row).is_some() {
                    return false;
                }
            }
        }
        true
    }

    /// Cells not owned by `owner_id` that cannot be reached from the board
    /// edge without stepping on `owner_id`'s territory.
    pub fn enclosed_cells(&self, owner_id: &str) -> Vec<CellKey> {
        let mut reachable = vec![false; self.cells.len()];
        let mut queue = VecDeque::new();

        for col in 0..self.cols {
            self.enqueue_open(col, 0, owner_id, &mut reachable, &mut queue);
            self.enqueue_open(col, self.rows - 1, owner_id, &mut reachable, &mut queue);
        }
        for row in 0..self.rows {
            self.enqueue_open(0, row, owner_id, &mut reachable, &mut queue);
            self.enqueue_open(self.cols - 1, row, owner_id, &mut reachable, &mut queue);
        }

        while let Some((col, row)) = queue.pop_front() {
            for (nc, nr) in [(col - 1, row), (col + 1, row), (col, row - 1), (col, row + 1)] {
                self.enqueue_open(nc, nr, owner_id, &mut reachable, &mut queue);
            }
        }

        (0..self.cells.len())
            .filter(|key| !reachable[*key] && !self.is_owned_by(*key, owner_id))
            .collect()
    }

    fn enqueue_open(
        &self,
        col: i32,
        row: i32,
        owner_id: &str,
        reachable: &mut [bool],
        queue: &mut VecDeque<(i32, i32)>,
    ) {
        let Some(key) = self.key_of(col, row) else {
            return;
        };
        if reachable[key] || self.is_owned_by(key, owner_id) {
            return;
        }
        reachable[key] = true;
        queue.push_back((col, row));
    }

    pub fn rows_snapshot(&self) -> Vec<Vec<Option<Cell>>> {
        self.cells
            .chunks(self.cols as usize)
            .map(|row| row.to_vec())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn own(grid: &mut Grid, owner: &str, col: i32, row: i32) {
        let key = grid.key_of(col, row).expect("in bounds");
        grid.set_cell(
            key,
            Some(Cell {
                owner_id: owner.to_string(),
                color: "#000000".to_string(),
            }),
        );
    }

    #[test]
    fn keys_round_trip_through_coordinates() {
        let grid = Grid::new(7, 5, 48);
        let key = grid.key_of(3, 4).expect("in bounds");
        assert_eq!(key, 4 * 7 + 3);
        assert_eq!(grid.coords_of(key), (3, 4));
        assert_eq!(grid.wire_key(key), "4:3");
        assert_eq!(grid.key_of(7, 0), None);
        assert_eq!(grid.key_of(0, -1), None);
    }

    #[test]
    fn aligned_position_scales_by_cell_size() {
        let grid = Grid::new(10, 10, 48);
        assert_eq!(grid.aligned_position(2, 3), (96.0, 144.0));
        assert_eq!(grid.arena().width, 480);
    }

    #[test]
    fn trail_overlay_does_not_touch_cells() {
        let mut grid = Grid::new(4, 4, 10);
        own(&mut grid, "b", 1, 1);
        let key = grid.key_of(1, 1).expect("in bounds");
        grid.set_trail(
            key,
            TrailMark {
                owner_id: "a".to_string(),
                color: "#111111".to_string(),
            },
        );
        assert_eq!(grid.owner_of(key), Some("b"));
        assert_eq!(grid.trail(key).map(|mark| mark.owner_id.as_str()), Some("a"));
        grid.remove_trail(key);
        assert_eq!(grid.owner_of(key), Some("b"));
        assert!(grid.trail(key).is_none());
    }

    #[test]
    fn zone_available_ignores_out_of_board_parts() {
        let mut grid = Grid::new(5, 5, 10);
        assert!(grid.zone_available(0, 0, 1));
        own(&mut grid, "a", 4, 4);
        assert!(!grid.zone_available(3, 3, 1));
        assert!(grid.zone_available(1, 1, 1));
    }

    #[test]
    fn enclosed_cells_finds_ring_interior_only() {
        let mut grid = Grid::new(7, 7, 10);
        for i in 1..=5 {
            own(&mut grid, "a", i, 1);
            own(&mut grid, "a", i, 5);
            own(&mut grid, "a", 1, i);
            own(&mut grid, "a", 5, i);
        }
        own(&mut grid, "b", 3, 3);
        let enclosed = grid.enclosed_cells("a");
        assert_eq!(enclosed.len(), 9);
        assert!(enclosed.contains(&grid.key_of(3, 3).expect("in bounds")));
        assert!(!enclosed.contains(&grid.key_of(0, 0).expect("in bounds")));
    }

    #[test]
    fn open_ring_encloses_nothing() {
        let mut grid = Grid::new(7, 7, 10);
        for i in 1..=5 {
            own(&mut grid, "a", i, 1);
            own(&mut grid, "a", 1, i);
            own(&mut grid, "a", 5, i);
        }
        own(&mut grid, "a", 2, 5);
        own(&mut grid, "a", 4, 5);
        assert!(grid.enclosed_cells("a").is_empty());
    }

    #[test]
    fn rows_snapshot_has_board_shape() {
        let mut grid = Grid::new(3, 2, 10);
        own(&mut grid, "a", 2, 1);
        let rows = grid.rows_snapshot();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].len(), 3);
        assert!(rows[1][2].is_some());
        assert_eq!(grid.count_owned("a"), 1);
        assert_eq!(grid.owned_keys("a"), vec![5]);
    }
}
