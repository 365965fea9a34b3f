use clap::Parser;
use drawify_rust_server::constants::TICK_MS;
use drawify_rust_server::engine::{EngineOptions, GameEngine};
use drawify_rust_server::server_utils::should_send_full_state;
use drawify_rust_server::types::{
    Cell, DeltaPayload, Direction, FullSnapshot, PlayerConfig, PlayerView, TrailMark,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

const TURN_CHANCE: f64 = 0.08;
const EXTRA_TICKS: u64 = 120;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    #[arg(long, default_value_t = 4)]
    bots: usize,
    #[arg(long, default_value_t = 10)]
    seconds: u64,
    #[arg(long, default_value_t = 1)]
    seed: u64,
    #[arg(long)]
    cols: Option<i32>,
    #[arg(long)]
    rows: Option<i32>,
    #[arg(long)]
    match_id: Option<String>,
    #[arg(long)]
    summary_out: Option<PathBuf>,
}

#[derive(Clone, Debug, Serialize)]
struct Scenario {
    bots: usize,
    seconds: u64,
    seed: u64,
    cols: i32,
    rows: i32,
}

#[derive(Clone, Debug, Serialize)]
struct AnomalyRecord {
    tick: u64,
    message: String,
}

#[derive(Clone, Debug, Serialize)]
struct RunSummary {
    #[serde(rename = "matchId")]
    match_id: String,
    #[serde(rename = "startedAtMs")]
    started_at_ms: u64,
    #[serde(rename = "finishedAtMs")]
    finished_at_ms: u64,
    scenario: Scenario,
    ticks: u64,
    #[serde(rename = "gameTimeMs")]
    game_time_ms: u64,
    #[serde(rename = "gameOver")]
    game_over: bool,
    #[serde(rename = "winnerId")]
    winner_id: Option<String>,
    #[serde(rename = "winnerName")]
    winner_name: Option<String>,
    #[serde(rename = "finalAreas")]
    final_areas: BTreeMap<String, u32>,
    eliminations: BTreeMap<String, u32>,
    #[serde(rename = "deltaMessages")]
    delta_messages: u64,
    #[serde(rename = "deltaCells")]
    delta_cells: u64,
    anomalies: Vec<String>,
    #[serde(rename = "anomalyRecords")]
    anomaly_records: Vec<AnomalyRecord>,
}

#[derive(Clone, Debug, Serialize)]
struct StructuredLogLine {
    #[serde(rename = "timestampMs")]
    timestamp_ms: u64,
    level: String,
    event: String,
    #[serde(rename = "matchId")]
    match_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    tick: Option<u64>,
    details: Value,
}

/// What a client holding the first snapshot plus every delta would see.
#[derive(Debug, Default)]
struct ClientMirror {
    players: BTreeMap<String, PlayerView>,
    cells: Vec<Vec<Option<Cell>>>,
    trails: BTreeMap<String, TrailMark>,
}

impl ClientMirror {
    fn from_snapshot(snapshot: FullSnapshot) -> Self {
        Self {
            players: snapshot.players,
            cells: snapshot.cells,
            trails: snapshot.trails,
        }
    }

    fn apply(&mut self, delta: &DeltaPayload) {
        for (id, view) in &delta.players {
            match view {
                Some(view) => {
                    self.players.insert(id.clone(), view.clone());
                }
                None => {
                    self.players.remove(id);
                }
            }
        }
        for change in &delta.cells {
            if let Some(slot) = self
                .cells
                .get_mut(change.row as usize)
                .and_then(|row| row.get_mut(change.col as usize))
            {
                *slot = change.cell.clone();
            }
        }
        for (key, mark) in &delta.trails {
            match mark {
                Some(mark) => {
                    self.trails.insert(key.clone(), mark.clone());
                }
                None => {
                    self.trails.remove(key);
                }
            }
        }
    }

    fn diff(&self, snapshot: &FullSnapshot) -> Vec<String> {
        let mut problems = Vec::new();
        if self.players != snapshot.players {
            problems.push("delta-applied players diverged from full state".to_string());
        }
        if self.cells != snapshot.cells {
            problems.push("delta-applied cells diverged from full state".to_string());
        }
        if self.trails != snapshot.trails {
            problems.push("delta-applied trails diverged from full state".to_string());
        }
        problems
    }
}

fn main() {
    let cli = Cli::parse();
    let scenario = resolve_scenario(&cli);
    let started_at_ms = now_ms();
    let match_id = cli
        .match_id
        .clone()
        .unwrap_or_else(|| default_match_id(scenario.seed, started_at_ms));

    emit_log(
        "info",
        "run_started",
        &match_id,
        None,
        json!({
            "bots": scenario.bots,
            "seconds": scenario.seconds,
            "seed": scenario.seed,
            "cols": scenario.cols,
            "rows": scenario.rows,
        }),
    );

    let summary = run_scenario(&scenario, match_id.clone(), started_at_ms);

    for anomaly in &summary.anomaly_records {
        emit_log(
            "warn",
            "anomaly_detected",
            &match_id,
            Some(anomaly.tick),
            json!({ "message": anomaly.message }),
        );
    }

    if let Ok(line) = serde_json::to_string(&summary) {
        println!("{line}");
    }

    let mut summary_out_written: Option<String> = None;
    if let Some(path) = cli.summary_out.as_ref() {
        if let Err(error) = write_summary(path, &summary) {
            emit_log(
                "error",
                "summary_write_failed",
                &match_id,
                None,
                json!({
                    "path": path.to_string_lossy(),
                    "error": error.to_string(),
                }),
            );
            std::process::exit(2);
        }
        summary_out_written = Some(path.to_string_lossy().to_string());
    }

    emit_log(
        "info",
        "run_finished",
        &match_id,
        Some(summary.ticks),
        json!({
            "winnerId": summary.winner_id,
            "anomalyCount": summary.anomaly_records.len(),
            "summaryOut": summary_out_written,
        }),
    );

    if !summary.anomalies.is_empty() {
        std::process::exit(1);
    }
}

fn resolve_scenario(cli: &Cli) -> Scenario {
    let defaults = EngineOptions::default();
    Scenario {
        bots: cli.bots.clamp(1, 4),
        seconds: cli.seconds.clamp(1, 600),
        seed: cli.seed,
        cols: cli.cols.unwrap_or(defaults.cols).clamp(5, 200),
        rows: cli.rows.unwrap_or(defaults.rows).clamp(5, 200),
    }
}

fn run_scenario(scenario: &Scenario, match_id: String, started_at_ms: u64) -> RunSummary {
    let mut engine = GameEngine::new(EngineOptions {
        cols: scenario.cols,
        rows: scenario.rows,
        match_duration_ms: scenario.seconds * 1_000,
        seed: Some(scenario.seed),
        ..EngineOptions::default()
    });
    let mut rng = StdRng::seed_from_u64(scenario.seed ^ 0x5eed_b075);

    let bot_ids: Vec<String> = (0..scenario.bots)
        .map(|idx| format!("bot_{}", idx + 1))
        .collect();
    for (idx, id) in bot_ids.iter().enumerate() {
        engine.add_player(
            id,
            PlayerConfig {
                name: Some(format!("Bot-{:02}", idx + 1)),
                element: None,
            },
        );
    }

    let mut mirror = ClientMirror::from_snapshot(engine.get_game_state());
    let mut eliminations: BTreeMap<String, u32> =
        bot_ids.iter().map(|id| (id.clone(), 0)).collect();
    let mut respawning: HashSet<String> = HashSet::new();
    let mut anomalies = Vec::new();
    let mut anomaly_records = Vec::new();
    let mut anomaly_seen = HashSet::new();
    let mut delta_messages = 0u64;
    let mut delta_cells = 0u64;

    let max_ticks = scenario.seconds * 1_000 / TICK_MS + EXTRA_TICKS;
    let mut tick = 0u64;
    while tick < max_ticks && !engine.is_game_over() {
        for id in &bot_ids {
            if rng.random_bool(TURN_CHANCE) {
                engine.set_player_direction(id, random_direction(&mut rng));
            }
        }
        engine.update(TICK_MS);
        tick += 1;

        for id in &bot_ids {
            let now_respawning = engine.is_respawning(id);
            if now_respawning && respawning.insert(id.clone()) {
                *eliminations.entry(id.clone()).or_insert(0) += 1;
            } else if !now_respawning {
                respawning.remove(id);
            }
        }

        for message in engine.audit() {
            push_anomaly(
                &mut anomalies,
                &mut anomaly_records,
                &mut anomaly_seen,
                tick,
                message,
            );
        }

        if engine.has_changes() {
            let delta = engine.get_state_delta();
            delta_messages += 1;
            delta_cells += delta.cells.len() as u64;
            mirror.apply(&delta);
        }
        if should_send_full_state(tick) {
            for message in mirror.diff(&engine.get_game_state()) {
                push_anomaly(
                    &mut anomalies,
                    &mut anomaly_records,
                    &mut anomaly_seen,
                    tick,
                    message,
                );
            }
        }
    }

    if !engine.is_game_over() {
        push_anomaly(
            &mut anomalies,
            &mut anomaly_records,
            &mut anomaly_seen,
            tick,
            format!("match did not end within {max_ticks} ticks"),
        );
    }

    let status = engine.clock().status();
    let final_areas = engine
        .players()
        .into_iter()
        .map(|player| (player.id, player.area))
        .collect();

    RunSummary {
        match_id,
        started_at_ms,
        finished_at_ms: now_ms(),
        scenario: scenario.clone(),
        ticks: tick,
        game_time_ms: status.game_time,
        game_over: status.game_over,
        winner_id: status.winner_id,
        winner_name: status.winner_name,
        final_areas,
        eliminations,
        delta_messages,
        delta_cells,
        anomalies,
        anomaly_records,
    }
}

fn random_direction(rng: &mut StdRng) -> Direction {
    match rng.random_range(0..4) {
        0 => Direction::Up,
        1 => Direction::Down,
        2 => Direction::Left,
        _ => Direction::Right,
    }
}

fn push_anomaly(
    anomalies: &mut Vec<String>,
    anomaly_records: &mut Vec<AnomalyRecord>,
    anomaly_seen: &mut HashSet<String>,
    tick: u64,
    message: String,
) {
    anomaly_records.push(AnomalyRecord {
        tick,
        message: message.clone(),
    });
    if anomaly_seen.insert(message.clone()) {
        anomalies.push(message);
    }
}

fn default_match_id(seed: u64, timestamp_ms: u64) -> String {
    format!("sim-{seed}-{timestamp_ms}")
}

fn emit_log(level: &str, event: &str, match_id: &str, tick: Option<u64>, details: Value) {
    let log_line = StructuredLogLine {
        timestamp_ms: now_ms(),
        level: level.to_string(),
        event: event.to_string(),
        match_id: match_id.to_string(),
        tick,
        details,
    };
    if let Ok(line) = serde_json::to_string(&log_line) {
        eprintln!("{line}");
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn write_summary(path: &Path, summary: &RunSummary) -> io::Result<()> {
    let summary_text = serde_json::to_string_pretty(summary).map_err(io::Error::other)?;
    std::fs::write(path, summary_text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_scenario(seed: u64) -> Scenario {
        Scenario {
            bots: 4,
            seconds: 5,
            seed,
            cols: 24,
            rows: 16,
        }
    }

    #[test]
    fn default_match_id_contains_seed_and_timestamp() {
        assert_eq!(default_match_id(42, 123456789), "sim-42-123456789");
    }

    #[test]
    fn scenario_flags_are_clamped() {
        let cli = Cli::parse_from(["simulate", "--bots", "9", "--seconds", "0", "--cols", "2"]);
        let scenario = resolve_scenario(&cli);
        assert_eq!(scenario.bots, 4);
        assert_eq!(scenario.seconds, 1);
        assert_eq!(scenario.cols, 5);
        assert_eq!(scenario.rows, 37);
    }

    #[test]
    fn short_match_runs_clean_and_picks_a_winner() {
        let summary = run_scenario(&small_scenario(11), "sim-test".to_string(), 0);
        assert!(summary.anomalies.is_empty(), "{:?}", summary.anomalies);
        assert!(summary.game_over);
        assert!(summary.winner_id.is_some());
        assert_eq!(summary.final_areas.len(), 4);
        assert!(summary.delta_messages > 0);
    }

    #[test]
    fn same_seed_gives_same_outcome() {
        let a = run_scenario(&small_scenario(5), "a".to_string(), 0);
        let b = run_scenario(&small_scenario(5), "b".to_string(), 0);
        assert_eq!(a.winner_id, b.winner_id);
        assert_eq!(a.final_areas, b.final_areas);
        assert_eq!(a.eliminations, b.eliminations);
        assert_eq!(a.ticks, b.ticks);
    }

    #[test]
    fn mirror_drops_removed_players_and_trails() {
        let mut mirror = ClientMirror::default();
        mirror.trails.insert(
            "1:2".to_string(),
            TrailMark {
                owner_id: "a".to_string(),
                color: "#000000".to_string(),
            },
        );
        let delta = DeltaPayload {
            players: BTreeMap::from([("a".to_string(), None)]),
            cells: Vec::new(),
            trails: BTreeMap::from([("1:2".to_string(), None)]),
            status: GameEngine::new(EngineOptions::default()).clock().status(),
        };
        mirror.apply(&delta);
        assert!(mirror.trails.is_empty());
        assert!(mirror.players.is_empty());
    }

    #[test]
    fn write_summary_returns_error_when_parent_does_not_exist() {
        let target = std::env::temp_dir()
            .join(format!("drawify-missing-{}", now_ms()))
            .join("summary.json");
        let summary = run_scenario(&small_scenario(3), "sim-3".to_string(), 0);
        assert!(write_summary(&target, &summary).is_err());
    }
}
