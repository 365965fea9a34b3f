use std::collections::{BTreeMap, HashMap, HashSet};

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info};

use crate::constants::{
    board_dimensions, CELL_SIZE, MATCH_DURATION_MS, MOVE_INTERVAL_MS, RESPAWN_DELAY_MS,
    SAFE_ZONE_RADIUS,
};
use crate::grid::{CellKey, Grid};
use crate::types::{
    Arena, Direction, Element, ElementError, ElementSelection, PlayerConfig, PlayerView,
    Spectator,
};

mod capture;
mod claim;
mod delta;
mod lifecycle;
mod match_clock;
mod movement;
mod utils;

pub use self::match_clock::MatchClock;

use self::delta::DeltaTracker;
use self::utils::{default_name, sanitize_player_name};

#[derive(Clone, Debug)]
struct PlayerInternal {
    id: String,
    name: String,
    element: Element,
    color: String,
    area: u32,
    col: i32,
    row: i32,
    x: f64,
    y: f64,
    direction: Direction,
    move_interval: f64,
    move_progress: f64,
    is_moving: bool,
    from_x: f64,
    from_y: f64,
    target_x: f64,
    target_y: f64,
    target_col: i32,
    target_row: i32,
    is_outside: bool,
    trail: HashSet<CellKey>,
    respawn_due_ms: Option<u64>,
}

impl PlayerInternal {
    fn is_respawning(&self) -> bool {
        self.respawn_due_ms.is_some()
    }

    fn view(&self) -> PlayerView {
        PlayerView {
            id: self.id.clone(),
            name: self.name.clone(),
            x: self.x,
            y: self.y,
            direction: self.direction,
            color: self.color.clone(),
            area: self.area,
            element: self.element,
        }
    }
}

#[derive(Clone, Debug)]
pub struct EngineOptions {
    pub cols: i32,
    pub rows: i32,
    pub cell_size: i32,
    pub move_interval_ms: f64,
    pub respawn_delay_ms: u64,
    pub match_duration_ms: u64,
    pub seed: Option<u64>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        let (cols, rows) = board_dimensions(CELL_SIZE);
        Self {
            cols,
            rows,
            cell_size: CELL_SIZE,
            move_interval_ms: MOVE_INTERVAL_MS,
            respawn_delay_ms: RESPAWN_DELAY_MS,
            match_duration_ms: MATCH_DURATION_MS,
            seed: None,
        }
    }
}

/// Authoritative simulation of one room. Single-threaded: the driver owns it
/// and serializes ticks with command ingestion.
#[derive(Clone, Debug)]
pub struct GameEngine {
    pub grid: Grid,
    options: EngineOptions,
    rng: StdRng,
    players: Vec<PlayerInternal>,
    index_by_id: HashMap<String, usize>,
    spectators: BTreeMap<String, Spectator>,
    clock: MatchClock,
    delta: DeltaTracker,
}

impl GameEngine {
    pub fn new(options: EngineOptions) -> Self {
        let rng = match options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let move_interval_ms = if options.move_interval_ms > 0.0 {
            options.move_interval_ms
        } else {
            MOVE_INTERVAL_MS
        };
        Self {
            grid: Grid::new(options.cols, options.rows, options.cell_size),
            clock: MatchClock::new(options.match_duration_ms),
            options: EngineOptions {
                move_interval_ms,
                ..options
            },
            rng,
            players: Vec::new(),
            index_by_id: HashMap::new(),
            spectators: BTreeMap::new(),
            delta: DeltaTracker::default(),
        }
    }

    pub fn arena(&self) -> Arena {
        self.grid.arena()
    }

    pub fn clock(&self) -> &MatchClock {
        &self.clock
    }

    pub fn is_game_over(&self) -> bool {
        self.clock.game_over
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn has_player(&self, player_id: &str) -> bool {
        self.index_by_id.contains_key(player_id)
    }

    pub fn is_respawning(&self, player_id: &str) -> bool {
        self.index_of(player_id)
            .map(|idx| self.players[idx].is_respawning())
            .unwrap_or(false)
    }

    /// Current view of a registered player, respawning or not.
    pub fn player_snapshot(&self, player_id: &str) -> Option<PlayerView> {
        self.index_of(player_id).map(|idx| self.players[idx].view())
    }

    /// Views in registration order.
    pub fn players(&self) -> Vec<PlayerView> {
        self.players.iter().map(PlayerInternal::view).collect()
    }

    pub fn spectators(&self) -> Vec<Spectator> {
        self.spectators.values().cloned().collect()
    }

    pub fn add_player(&mut self, player_id: &str, config: PlayerConfig) -> PlayerView {
        if let Some(idx) = self.index_of(player_id) {
            debug!(player_id, "add_player ignored: already registered");
            return self.players[idx].view();
        }

        let spawn = self.pick_spawn(SAFE_ZONE_RADIUS);
        let element = self.select_element_for_new_player(config.element, player_id);
        let name = match config.name.as_deref() {
            Some(raw) => sanitize_player_name(raw, player_id),
            None => default_name(player_id),
        };
        let (x, y) = self.grid.aligned_position(spawn.0, spawn.1);

        let was_empty = self.players.is_empty();
        self.players.push(PlayerInternal {
            id: player_id.to_string(),
            name,
            element,
            color: element.color().to_string(),
            area: 0,
            col: spawn.0,
            row: spawn.1,
            x,
            y,
            direction: Direction::None,
            move_interval: self.options.move_interval_ms,
            move_progress: 0.0,
            is_moving: false,
            from_x: x,
            from_y: y,
            target_x: x,
            target_y: y,
            target_col: spawn.0,
            target_row: spawn.1,
            is_outside: false,
            trail: HashSet::new(),
            respawn_due_ms: None,
        });
        let idx = self.players.len() - 1;
        self.index_by_id.insert(player_id.to_string(), idx);
        self.create_safe_zone(idx, SAFE_ZONE_RADIUS);

        if was_empty {
            self.clock.start();
        }
        info!(
            player_id,
            col = spawn.0,
            row = spawn.1,
            element = ?element,
            "player joined"
        );
        self.players[idx].view()
    }

    pub fn remove_player(&mut self, player_id: &str) {
        let Some(idx) = self.index_of(player_id) else {
            return;
        };
        self.clear_territory(idx);
        // Dropping the record also drops its pending respawn.
        self.players.remove(idx);
        self.rebuild_index();
        info!(player_id, remaining = self.players.len(), "player left");

        if self.players.is_empty() {
            self.clock.reset();
        }
    }

    pub fn add_spectator(&mut self, spectator_id: &str, name: &str) {
        self.spectators.insert(
            spectator_id.to_string(),
            Spectator {
                id: spectator_id.to_string(),
                name: name.to_string(),
            },
        );
    }

    pub fn remove_spectator(&mut self, spectator_id: &str) {
        self.spectators.remove(spectator_id);
    }

    pub fn spectator_count(&self) -> usize {
        self.spectators.len()
    }

    /// Latches input. A stationary player starts moving right away; a moving
    /// one picks the new direction up at the next cell boundary.
    pub fn set_player_direction(&mut self, player_id: &str, direction: Direction) {
        if self.clock.game_over {
            return;
        }
        let Some(idx) = self.index_of(player_id) else {
            return;
        };
        if self.players[idx].is_respawning() {
            return;
        }
        if direction.is_opposite_of(self.players[idx].direction) {
            return;
        }

        self.players[idx].direction = direction;
        if !self.players[idx].is_moving && self.try_start_move(idx) {
            self.players[idx].move_progress = 0.0;
        }
    }

    pub fn set_player_name(&mut self, player_id: &str, raw_name: &str) -> Option<String> {
        let idx = self.index_of(player_id)?;
        let sanitized = sanitize_player_name(raw_name, player_id);
        self.players[idx].name = sanitized.clone();
        Some(sanitized)
    }

    pub fn set_player_element(
        &mut self,
        player_id: &str,
        raw_element: &str,
    ) -> Result<ElementSelection, ElementError> {
        let element = Element::parse(raw_element).ok_or(ElementError::InvalidElement)?;
        let idx = self
            .index_of(player_id)
            .ok_or(ElementError::PlayerNotFound)?;

        if self.players[idx].element != element {
            if !self.is_element_available(element, Some(player_id)) {
                return Err(ElementError::ElementTaken);
            }
            self.players[idx].element = element;
            self.players[idx].color = element.color().to_string();
            self.apply_player_color(idx);
        }

        Ok(ElementSelection {
            element: self.players[idx].element,
            color: self.players[idx].color.clone(),
        })
    }

    pub fn element_availability(&self) -> BTreeMap<Element, bool> {
        Element::ALL
            .iter()
            .map(|element| (*element, self.is_element_available(*element, None)))
            .collect()
    }

    /// Advances the room by one tick of `dt_ms` simulated milliseconds.
    pub fn update(&mut self, dt_ms: u64) {
        self.clock.advance(dt_ms);
        if self.clock.refresh() {
            self.end_match();
        }
        if self.clock.game_over {
            return;
        }
        self.process_due_respawns();
        self.move_players(dt_ms);
    }

    /// Invariant violations, empty when the room is consistent.
    pub fn audit(&self) -> Vec<String> {
        let mut problems = Vec::new();
        for player in &self.players {
            let owned = self.grid.count_owned(&player.id);
            if owned != player.area as usize {
                problems.push(format!(
                    "area mismatch for {}: area={} owned={}",
                    player.id, player.area, owned
                ));
            }
            if player.is_outside != !player.trail.is_empty() {
                problems.push(format!(
                    "isOutside={} but trail has {} cells for {}",
                    player.is_outside,
                    player.trail.len(),
                    player.id
                ));
            }
            let overlay = self.grid.trail_keys_of(&player.id);
            if overlay.len() != player.trail.len()
                || overlay.iter().any(|key| !player.trail.contains(key))
            {
                problems.push(format!("trail overlay out of sync for {}", player.id));
            }
        }
        for (key, mark) in self.grid.trails() {
            if !self.has_player(&mark.owner_id) {
                problems.push(format!(
                    "orphan trail at {} owned by {}",
                    self.grid.wire_key(key),
                    mark.owner_id
                ));
            }
        }
        problems
    }

    fn end_match(&mut self) {
        if self.clock.game_over {
            return;
        }
        let winner = self.determine_winner();
        self.clock.finish(winner.clone());
        for player in &mut self.players {
            player.direction = Direction::None;
            player.is_moving = false;
            player.move_progress = 0.0;
        }
        info!(
            winner_id = winner.as_ref().map(|(id, _)| id.as_str()),
            "match over"
        );
    }

    /// Strictly greatest area; ties keep the earliest registered player.
    fn determine_winner(&self) -> Option<(String, String)> {
        let mut winner: Option<&PlayerInternal> = None;
        for player in &self.players {
            match winner {
                Some(best) if player.area <= best.area => {}
                _ => winner = Some(player),
            }
        }
        winner.map(|player| (player.id.clone(), player.name.clone()))
    }

    fn index_of(&self, player_id: &str) -> Option<usize> {
        self.index_by_id.get(player_id).copied()
    }

    fn rebuild_index(&mut self) {
        self.index_by_id = self
            .players
            .iter()
            .enumerate()
            .map(|(idx, player)| (player.id.clone(), idx))
            .collect();
    }

    fn is_element_available(&self, element: Element, exclude_player_id: Option<&str>) -> bool {
        !self
            .players
            .iter()
            .any(|player| player.element == element && Some(player.id.as_str()) != exclude_player_id)
    }

    fn select_element_for_new_player(&self, preferred: Option<Element>, player_id: &str) -> Element {
        if let Some(element) = preferred {
            if self.is_element_available(element, Some(player_id)) {
                return element;
            }
        }
        Element::ALL
            .iter()
            .copied()
            .find(|element| self.is_element_available(*element, Some(player_id)))
            .unwrap_or(Element::ALL[0])
    }

    fn apply_player_color(&mut self, idx: usize) {
        let player_id = self.players[idx].id.clone();
        let color = self.players[idx].color.clone();
        for key in self.grid.owned_keys(&player_id) {
            if let Some(cell) = self.grid.cell_mut(key) {
                cell.color = color.clone();
                self.delta.mark_dirty(key);
            }
        }
        for key in self.grid.trail_keys_of(&player_id) {
            if let Some(mark) = self.grid.trail_mut(key) {
                mark.color = color.clone();
                self.delta.mark_dirty(key);
            }
        }
    }
}
