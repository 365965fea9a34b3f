use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use drawify_rust_server::config::ServerConfig;
use drawify_rust_server::constants::TICK_MS;
use drawify_rust_server::engine::{EngineOptions, GameEngine};
use drawify_rust_server::server_protocol::{parse_client_message, ParsedClientMessage};
use drawify_rust_server::server_utils::{
    chat_timestamp, sanitize_chat_message, should_send_full_state, spectator_name,
};
use drawify_rust_server::types::{Direction, Element, PlayerConfig};
use futures_util::{SinkExt, StreamExt};
use rand::distr::Alphanumeric;
use rand::Rng;
use serde_json::{json, Value};
use tokio::sync::{mpsc, Mutex};
use tower_http::services::{ServeDir, ServeFile};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

const ROOM_ID: &str = "main";
const CLIENT_QUEUE_CAPACITY: usize = 256;

type SharedState = Arc<Mutex<ServerState>>;

#[derive(Clone, Debug, PartialEq, Eq)]
enum Seat {
    Player(String),
    Spectator,
}

#[derive(Clone)]
struct ClientContext {
    tx: mpsc::Sender<OutboundMessage>,
    seat: Option<Seat>,
}

#[derive(Clone, Debug)]
enum OutboundMessage {
    Text(String),
    Close { code: u16, reason: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum QueuePolicy {
    DropOnFull,
    DisconnectOnFull,
}

struct ServerState {
    clients: HashMap<String, ClientContext>,
    game: GameEngine,
    max_players: usize,
    tick: u64,
}

impl ServerState {
    fn new(config: &ServerConfig) -> Self {
        Self {
            clients: HashMap::new(),
            game: GameEngine::new(EngineOptions {
                match_duration_ms: config.match_duration_ms,
                ..EngineOptions::default()
            }),
            max_players: config.max_players_per_room,
            tick: 0,
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = ServerConfig::load_or_default();
    if let Err(err) = config.validate() {
        error!("invalid configuration: {err}");
        std::process::exit(1);
    }
    info!(
        port = config.port,
        match_duration_ms = config.match_duration_ms,
        max_players = config.max_players_per_room,
        "configuration loaded"
    );

    let state = Arc::new(Mutex::new(ServerState::new(&config)));
    start_tick_loop(state.clone());

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/ws", get(ws_handler))
        .with_state(state);

    let app = if config.static_dir.join("index.html").is_file() {
        info!(root = %config.static_dir.display(), "serving static files");
        let index_file = config.static_dir.join("index.html");
        app.fallback_service(
            ServeDir::new(&config.static_dir).not_found_service(ServeFile::new(index_file)),
        )
    } else {
        warn!(
            root = %config.static_dir.display(),
            "static file root not found, serving API only"
        );
        app
    };

    let bind_addr = SocketAddr::new(config.bind_address, config.port);
    let listener = match tokio::net::TcpListener::bind(bind_addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!("failed to bind {bind_addr}: {err}");
            std::process::exit(1);
        }
    };

    info!(room = ROOM_ID, "listening on {bind_addr}");
    if let Err(err) = axum::serve(listener, app).await {
        error!("server runtime failed: {err}");
        std::process::exit(1);
    }
}

async fn healthz() -> impl IntoResponse {
    Json(json!({ "ok": true }))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<SharedState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket(state: SharedState, socket: WebSocket) {
    let client_id = make_id("client");
    let (tx, mut rx) = mpsc::channel::<OutboundMessage>(CLIENT_QUEUE_CAPACITY);

    {
        let mut guard = state.lock().await;
        guard.clients.insert(
            client_id.clone(),
            ClientContext {
                tx: tx.clone(),
                seat: None,
            },
        );
    }
    debug!(client_id = client_id.as_str(), "client connected");

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let writer = tokio::spawn(async move {
        while let Some(outbound) = rx.recv().await {
            let should_close = matches!(outbound, OutboundMessage::Close { .. });
            let result = match outbound {
                OutboundMessage::Text(payload) => {
                    ws_sender.send(Message::Text(payload.into())).await
                }
                OutboundMessage::Close { code, reason } => {
                    let frame = CloseFrame {
                        code,
                        reason: reason.into(),
                    };
                    ws_sender.send(Message::Close(Some(frame))).await
                }
            };
            if result.is_err() || should_close {
                break;
            }
        }
    });

    while let Some(received) = ws_receiver.next().await {
        let Ok(message) = received else {
            break;
        };

        match message {
            Message::Text(raw) => {
                handle_client_message(state.clone(), &client_id, raw.to_string()).await;
            }
            Message::Binary(raw) => {
                if let Ok(text) = String::from_utf8(raw.to_vec()) {
                    handle_client_message(state.clone(), &client_id, text).await;
                } else {
                    send_error_to_client(&state, &client_id, "invalid utf8 message").await;
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    handle_disconnect(state, &client_id).await;
    drop(tx);
    let _ = writer.await;
}

async fn handle_client_message(state: SharedState, client_id: &str, raw: String) {
    let Some(message) = parse_client_message(&raw) else {
        send_error_to_client(&state, client_id, "invalid message").await;
        return;
    };

    let mut guard = state.lock().await;
    match message {
        ParsedClientMessage::Join {
            name,
            element,
            spectator,
        } => handle_join(&mut guard, client_id, name, element, spectator),
        ParsedClientMessage::Movement { direction } => {
            handle_movement(&mut guard, client_id, direction);
        }
        ParsedClientMessage::SetName { name } => handle_set_name(&mut guard, client_id, &name),
        ParsedClientMessage::SetElement { element } => {
            handle_set_element(&mut guard, client_id, &element);
        }
        ParsedClientMessage::Chat { message } => handle_chat(&mut guard, client_id, &message),
        ParsedClientMessage::Ping { t } => {
            send_to_client(
                &mut guard,
                client_id,
                &json!({
                    "type": "pong",
                    "t": t,
                    "serverTime": now_ms(),
                }),
                QueuePolicy::DisconnectOnFull,
            );
        }
    }
}

fn handle_join(
    state: &mut ServerState,
    client_id: &str,
    name: Option<String>,
    element: Option<Element>,
    spectator: bool,
) {
    let Some(client) = state.clients.get(client_id) else {
        return;
    };
    if client.seat.is_some() {
        send_error(state, client_id, "already joined");
        return;
    }

    if spectator {
        let display_name = spectator_name(name.as_deref());
        state.game.add_spectator(client_id, &display_name);
        set_seat(state, client_id, Seat::Spectator);
        info!(client_id, name = display_name.as_str(), "spectator joined");
        let arena = state.game.arena();
        send_to_client(
            state,
            client_id,
            &json!({
                "type": "spectating",
                "roomId": ROOM_ID,
                "arena": arena,
            }),
            QueuePolicy::DisconnectOnFull,
        );
        send_full_state_to(state, client_id);
        return;
    }

    if state.game.player_count() >= state.max_players {
        send_error(state, client_id, "room is full");
        return;
    }

    let player_id = make_player_id();
    let player = state
        .game
        .add_player(&player_id, PlayerConfig { name, element });
    set_seat(state, client_id, Seat::Player(player_id.clone()));
    info!(
        client_id,
        player_id = player_id.as_str(),
        name = player.name.as_str(),
        "player seated"
    );

    let arena = state.game.arena();
    send_to_client(
        state,
        client_id,
        &json!({
            "type": "init",
            "playerId": player_id,
            "player": player,
            "arena": arena,
            "roomId": ROOM_ID,
        }),
        QueuePolicy::DisconnectOnFull,
    );
    send_full_state_to(state, client_id);
    broadcast_elements(state);
}

fn handle_movement(state: &mut ServerState, client_id: &str, direction: Direction) {
    let Some(player_id) = player_id_of(state, client_id) else {
        return;
    };
    state.game.set_player_direction(&player_id, direction);
}

fn handle_set_name(state: &mut ServerState, client_id: &str, raw_name: &str) {
    let Some(player_id) = player_id_of(state, client_id) else {
        send_error(state, client_id, "join as a player first");
        return;
    };
    let Some(name) = state.game.set_player_name(&player_id, raw_name) else {
        return;
    };
    send_to_client(
        state,
        client_id,
        &json!({
            "type": "name_result",
            "success": true,
            "name": name,
        }),
        QueuePolicy::DisconnectOnFull,
    );
}

fn handle_set_element(state: &mut ServerState, client_id: &str, raw_element: &str) {
    let Some(player_id) = player_id_of(state, client_id) else {
        send_error(state, client_id, "join as a player first");
        return;
    };
    let result = match state.game.set_player_element(&player_id, raw_element) {
        Ok(selection) => json!({
            "type": "element_result",
            "success": true,
            "element": selection.element,
            "color": selection.color,
        }),
        Err(reason) => {
            debug!(player_id = player_id.as_str(), %reason, "element change rejected");
            json!({
                "type": "element_result",
                "success": false,
                "reason": reason,
            })
        }
    };
    let changed = result["success"] == Value::Bool(true);
    send_to_client(state, client_id, &result, QueuePolicy::DisconnectOnFull);
    if changed {
        broadcast_elements(state);
    }
}

fn handle_chat(state: &mut ServerState, client_id: &str, raw_message: &str) {
    let Some(message) = sanitize_chat_message(raw_message) else {
        return;
    };
    let (sender_id, sender_name) = match state.clients.get(client_id).and_then(|c| c.seat.clone()) {
        Some(Seat::Player(player_id)) => {
            let name = state
                .game
                .player_snapshot(&player_id)
                .map(|player| player.name)
                .unwrap_or_default();
            (player_id, name)
        }
        Some(Seat::Spectator) => {
            let name = state
                .game
                .spectators()
                .into_iter()
                .find(|spectator| spectator.id == client_id)
                .map(|spectator| spectator.name)
                .unwrap_or_else(|| spectator_name(None));
            (client_id.to_string(), name)
        }
        None => {
            send_error(state, client_id, "join before chatting");
            return;
        }
    };

    broadcast(
        state,
        &json!({
            "type": "chat",
            "playerId": sender_id,
            "playerName": sender_name,
            "message": message,
            "timestamp": chat_timestamp(),
        }),
        QueuePolicy::DisconnectOnFull,
    );
}

async fn handle_disconnect(state: SharedState, client_id: &str) {
    let mut guard = state.lock().await;
    disconnect_client_internal(&mut guard, client_id);
}

fn disconnect_client_internal(state: &mut ServerState, client_id: &str) {
    let Some(context) = state.clients.remove(client_id) else {
        return;
    };
    match context.seat {
        Some(Seat::Player(player_id)) => {
            state.game.remove_player(&player_id);
            info!(client_id, player_id = player_id.as_str(), "player disconnected");
            broadcast_elements(state);
        }
        Some(Seat::Spectator) => {
            state.game.remove_spectator(client_id);
            info!(client_id, "spectator disconnected");
        }
        None => debug!(client_id, "client disconnected before joining"),
    }
}

fn set_seat(state: &mut ServerState, client_id: &str, seat: Seat) {
    if let Some(ctx) = state.clients.get_mut(client_id) {
        ctx.seat = Some(seat);
    }
}

fn player_id_of(state: &ServerState, client_id: &str) -> Option<String> {
    match state.clients.get(client_id)?.seat.as_ref()? {
        Seat::Player(player_id) => Some(player_id.clone()),
        Seat::Spectator => None,
    }
}

fn send_full_state_to(state: &mut ServerState, client_id: &str) {
    let game_state = state.game.get_game_state();
    send_to_client(
        state,
        client_id,
        &json!({
            "type": "state",
            "gameState": game_state,
        }),
        QueuePolicy::DisconnectOnFull,
    );
}

fn broadcast_elements(state: &mut ServerState) {
    let availability = state.game.element_availability();
    broadcast(
        state,
        &json!({
            "type": "elements",
            "availability": availability,
        }),
        QueuePolicy::DisconnectOnFull,
    );
}

fn start_tick_loop(state: SharedState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(TICK_MS));
        loop {
            interval.tick().await;
            let mut guard = state.lock().await;
            tick_game(&mut guard);
        }
    });
}

fn tick_game(state: &mut ServerState) {
    let was_over = state.game.is_game_over();
    state.game.update(TICK_MS);
    state.tick += 1;

    let just_ended = !was_over && state.game.is_game_over();
    if just_ended {
        let status = state.game.clock().status();
        info!(
            winner_id = status.winner_id.as_deref(),
            winner_name = status.winner_name.as_deref(),
            "match finished"
        );
    }

    if just_ended || should_send_full_state(state.tick) {
        let game_state = state.game.get_game_state();
        broadcast(
            state,
            &json!({
                "type": "state",
                "gameState": game_state,
                "timestamp": now_ms(),
            }),
            QueuePolicy::DropOnFull,
        );
    } else if state.game.has_changes() {
        let delta = state.game.get_state_delta();
        broadcast(
            state,
            &json!({
                "type": "delta",
                "delta": delta,
                "timestamp": now_ms(),
            }),
            QueuePolicy::DropOnFull,
        );
    }
}

fn send_to_client(state: &mut ServerState, client_id: &str, message: &Value, policy: QueuePolicy) {
    let send_failed = if let Some(client) = state.clients.get(client_id) {
        client
            .tx
            .try_send(OutboundMessage::Text(message.to_string()))
            .is_err()
    } else {
        false
    };
    if send_failed && policy == QueuePolicy::DisconnectOnFull {
        close_slow_client(state, client_id);
    }
}

fn broadcast(state: &mut ServerState, message: &Value, policy: QueuePolicy) {
    let payload = message.to_string();
    let mut failed_clients = Vec::new();
    for (client_id, client) in &state.clients {
        if client.seat.is_none() {
            continue;
        }
        if client
            .tx
            .try_send(OutboundMessage::Text(payload.clone()))
            .is_err()
            && policy == QueuePolicy::DisconnectOnFull
        {
            failed_clients.push(client_id.clone());
        }
    }
    for client_id in failed_clients {
        close_slow_client(state, &client_id);
    }
}

fn close_slow_client(state: &mut ServerState, client_id: &str) {
    warn!(client_id, "outbound queue full, disconnecting");
    if let Some(client) = state.clients.get(client_id) {
        let _ = client.tx.try_send(OutboundMessage::Close {
            code: 1013,
            reason: "client too slow".to_string(),
        });
    }
    disconnect_client_internal(state, client_id);
}

fn send_error(state: &mut ServerState, client_id: &str, message: &str) {
    send_to_client(
        state,
        client_id,
        &json!({
            "type": "error",
            "message": message,
        }),
        QueuePolicy::DisconnectOnFull,
    );
}

async fn send_error_to_client(state: &SharedState, client_id: &str, message: &str) {
    let mut guard = state.lock().await;
    send_error(&mut guard, client_id, message);
}

fn make_id(prefix: &str) -> String {
    let seq = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}_{seq}")
}

fn make_player_id() -> String {
    rand::rng()
        .sample_iter(Alphanumeric)
        .take(12)
        .map(char::from)
        .collect()
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_state() -> ServerState {
        ServerState::new(&ServerConfig {
            max_players_per_room: 2,
            ..ServerConfig::default()
        })
    }

    fn connect(state: &mut ServerState) -> (String, mpsc::Receiver<OutboundMessage>) {
        let client_id = make_id("client");
        let (tx, rx) = mpsc::channel(CLIENT_QUEUE_CAPACITY);
        state
            .clients
            .insert(client_id.clone(), ClientContext { tx, seat: None });
        (client_id, rx)
    }

    fn drain(rx: &mut mpsc::Receiver<OutboundMessage>) -> Vec<Value> {
        let mut messages = Vec::new();
        while let Ok(OutboundMessage::Text(payload)) = rx.try_recv() {
            messages.push(serde_json::from_str(&payload).expect("valid json"));
        }
        messages
    }

    fn types_of(messages: &[Value]) -> Vec<String> {
        messages
            .iter()
            .map(|m| m["type"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    #[test]
    fn join_sends_init_and_full_state() {
        let mut state = test_state();
        let (client, mut rx) = connect(&mut state);
        handle_join(&mut state, &client, Some("Ann".into()), Some(Element::Whale), false);

        let messages = drain(&mut rx);
        assert_eq!(types_of(&messages), vec!["init", "state", "elements"]);
        assert_eq!(messages[0]["player"]["name"], "Ann");
        assert_eq!(messages[0]["player"]["element"], "whale");
        assert_eq!(messages[0]["arena"]["width"], 2880);
        assert_eq!(messages[2]["availability"]["whale"], false);
    }

    #[test]
    fn room_rejects_players_past_capacity() {
        let mut state = test_state();
        let mut receivers = Vec::new();
        for _ in 0..3 {
            let (client, rx) = connect(&mut state);
            handle_join(&mut state, &client, None, None, false);
            receivers.push(rx);
        }
        assert_eq!(state.game.player_count(), 2);
        let last = drain(&mut receivers[2]);
        assert_eq!(last[0]["type"], "error");
        assert_eq!(last[0]["message"], "room is full");
    }

    #[test]
    fn spectators_do_not_take_seats() {
        let mut state = test_state();
        let (client, mut rx) = connect(&mut state);
        handle_join(&mut state, &client, Some("Eve".into()), None, true);
        assert_eq!(state.game.player_count(), 0);
        assert_eq!(state.game.spectator_count(), 1);
        assert_eq!(types_of(&drain(&mut rx)), vec!["spectating", "state"]);

        handle_movement(&mut state, &client, Direction::Up);
        disconnect_client_internal(&mut state, &client);
        assert_eq!(state.game.spectator_count(), 0);
    }

    #[test]
    fn element_change_reports_reason_codes() {
        let mut state = test_state();
        let (a, _rx_a) = connect(&mut state);
        let (b, mut rx_b) = connect(&mut state);
        handle_join(&mut state, &a, None, Some(Element::Dog), false);
        handle_join(&mut state, &b, None, Some(Element::Duck), false);
        drain(&mut rx_b);

        handle_set_element(&mut state, &b, "dog");
        let messages = drain(&mut rx_b);
        assert_eq!(messages[0]["success"], false);
        assert_eq!(messages[0]["reason"], "ELEMENT_TAKEN");

        handle_set_element(&mut state, &b, "penguin");
        let messages = drain(&mut rx_b);
        assert_eq!(types_of(&messages), vec!["element_result", "elements"]);
        assert_eq!(messages[0]["color"], "#000000");
    }

    #[test]
    fn chat_is_broadcast_to_joined_clients() {
        let mut state = test_state();
        let (a, mut rx_a) = connect(&mut state);
        let (lurker, mut rx_lurker) = connect(&mut state);
        handle_join(&mut state, &a, Some("Ann".into()), None, false);
        drain(&mut rx_a);

        handle_chat(&mut state, &a, "   ");
        handle_chat(&mut state, &a, "  hello  ");
        let messages = drain(&mut rx_a);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["message"], "hello");
        assert_eq!(messages[0]["playerName"], "Ann");
        assert!(drain(&mut rx_lurker).is_empty());

        handle_chat(&mut state, &lurker, "hi");
        assert_eq!(drain(&mut rx_lurker)[0]["type"], "error");
    }

    #[test]
    fn disconnect_frees_the_seat() {
        let mut state = test_state();
        let (a, _rx) = connect(&mut state);
        handle_join(&mut state, &a, None, None, false);
        assert_eq!(state.game.player_count(), 1);
        disconnect_client_internal(&mut state, &a);
        assert_eq!(state.game.player_count(), 0);
        assert!(!state.clients.contains_key(&a));
    }

    #[test]
    fn ticks_alternate_between_full_state_and_deltas() {
        let mut state = test_state();
        let (a, mut rx) = connect(&mut state);
        handle_join(&mut state, &a, None, None, false);
        drain(&mut rx);

        tick_game(&mut state);
        assert_eq!(types_of(&drain(&mut rx)), vec!["delta"]);
        tick_game(&mut state);
        assert!(drain(&mut rx).is_empty());

        for _ in 2..60 {
            tick_game(&mut state);
        }
        assert_eq!(types_of(&drain(&mut rx)), vec!["state"]);
    }
}
