use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
    None,
}

impl Direction {
    pub fn parse_move(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "UP" => Some(Self::Up),
            "DOWN" => Some(Self::Down),
            "LEFT" => Some(Self::Left),
            "RIGHT" => Some(Self::Right),
            "NONE" | "" => Some(Self::None),
            _ => None,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Self::Up => Self::Down,
            Self::Down => Self::Up,
            Self::Left => Self::Right,
            Self::Right => Self::Left,
            Self::None => Self::None,
        }
    }

    /// `None` is never opposite to anything.
    pub fn is_opposite_of(self, other: Self) -> bool {
        self != Self::None && other != Self::None && self.opposite() == other
    }

    /// Grid step as `(d_col, d_row)`; rows grow downwards.
    pub fn delta(self) -> Option<(i32, i32)> {
        match self {
            Self::Up => Some((0, -1)),
            Self::Down => Some((0, 1)),
            Self::Left => Some((-1, 0)),
            Self::Right => Some((1, 0)),
            Self::None => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Element {
    Dog,
    Duck,
    Penguin,
    Whale,
}

impl Element {
    pub const ALL: [Element; 4] = [Self::Dog, Self::Duck, Self::Penguin, Self::Whale];

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "dog" => Some(Self::Dog),
            "duck" => Some(Self::Duck),
            "penguin" => Some(Self::Penguin),
            "whale" => Some(Self::Whale),
            _ => None,
        }
    }

    pub fn color(self) -> &'static str {
        match self {
            Self::Dog => "#8B4513",
            Self::Duck => "#FFD700",
            Self::Penguin => "#000000",
            Self::Whale => "#4682B4",
        }
    }
}

/// Owned territory. Trails never live here.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Cell {
    #[serde(rename = "ownerId")]
    pub owner_id: String,
    pub color: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TrailMark {
    #[serde(rename = "ownerId")]
    pub owner_id: String,
    pub color: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Arena {
    pub width: i32,
    pub height: i32,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PlayerView {
    pub id: String,
    pub name: String,
    pub x: f64,
    pub y: f64,
    pub direction: Direction,
    pub color: String,
    pub area: u32,
    pub element: Element,
}

#[derive(Clone, Debug, Default)]
pub struct PlayerConfig {
    pub name: Option<String>,
    pub element: Option<Element>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Spectator {
    pub id: String,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MatchStatus {
    #[serde(rename = "gameTime")]
    pub game_time: u64,
    #[serde(rename = "timeRemaining")]
    pub time_remaining: u64,
    #[serde(rename = "gameOver")]
    pub game_over: bool,
    #[serde(rename = "winnerId")]
    pub winner_id: Option<String>,
    #[serde(rename = "winnerName")]
    pub winner_name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CellChange {
    pub row: i32,
    pub col: i32,
    pub cell: Option<Cell>,
}

/// Everything that changed since the previous sample. `None` entries mean
/// "removed" and serialize as `null`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DeltaPayload {
    pub players: BTreeMap<String, Option<PlayerView>>,
    pub cells: Vec<CellChange>,
    pub trails: BTreeMap<String, Option<TrailMark>>,
    #[serde(flatten)]
    pub status: MatchStatus,
}

impl DeltaPayload {
    pub fn is_empty(&self) -> bool {
        self.players.is_empty() && self.cells.is_empty() && self.trails.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FullSnapshot {
    pub players: BTreeMap<String, PlayerView>,
    pub cells: Vec<Vec<Option<Cell>>>,
    pub trails: BTreeMap<String, TrailMark>,
    #[serde(flatten)]
    pub status: MatchStatus,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ElementSelection {
    pub element: Element,
    pub color: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Error, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ElementError {
    #[error("unknown element")]
    InvalidElement,
    #[error("player not found")]
    PlayerNotFound,
    #[error("element already taken by another player")]
    ElementTaken,
}
