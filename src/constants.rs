pub const TICK_RATE: u32 = 60;
pub const TICK_MS: u64 = 1000 / TICK_RATE as u64;
pub const FULL_STATE_INTERVAL_TICKS: u64 = 60;

pub const CELL_SIZE: i32 = 48;
pub const TARGET_ARENA_WIDTH: i32 = 2880;
pub const TARGET_ARENA_HEIGHT: i32 = 1800;

pub const MOVE_INTERVAL_MS: f64 = 188.0;

pub const RESPAWN_DELAY_MS: u64 = 2_000;
pub const MATCH_DURATION_MS: u64 = 10_000;

pub const SAFE_ZONE_RADIUS: i32 = 1;
pub const SPAWN_ATTEMPTS: usize = 50;

pub const NAME_MAX_CHARS: usize = 9;
pub const CHAT_MAX_CHARS: usize = 200;
pub const MAX_PLAYERS_PER_ROOM: usize = 4;

/// Board size that fits the target arena with whole cells on every edge.
pub fn board_dimensions(cell_size: i32) -> (i32, i32) {
    let cell_size = cell_size.max(1);
    (
        (TARGET_ARENA_WIDTH / cell_size).max(1),
        (TARGET_ARENA_HEIGHT / cell_size).max(1),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_board_is_sixty_by_thirty_seven() {
        assert_eq!(board_dimensions(CELL_SIZE), (60, 37));
    }

    #[test]
    fn board_dimensions_never_collapse_to_zero() {
        assert_eq!(board_dimensions(0), (2880, 1800));
        assert_eq!(board_dimensions(10_000), (1, 1));
    }
}
