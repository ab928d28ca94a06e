//! WebSocket Table Server
//!
//! Async WebSocket front end for the table service. Each connection gets
//! a fresh player identity; the server plays the house side of every
//! exchange and expires overdue rounds in the background.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, oneshot, RwLock};
use tokio::time::interval;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, instrument, warn};

use crate::network::protocol::{
    action_name, decode_hash, decode_secret, ClientMessage, ErrorCode, ServerError, ServerMessage, TableInfo,
    VerificationInfo,
};
use crate::proof::commitment::Party;
use crate::proof::verify::Verdict;
use crate::table::house::{HouseAgent, HouseError};
use crate::table::round::{PlayerId, RoundId};
use crate::table::service::{TableError, TableService};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// How often overdue rounds are expired.
    pub expiry_interval: Duration,
    /// Connections silent for this long are closed.
    pub idle_timeout: Duration,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_connections: 1000,
            expiry_interval: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(300),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by `BLACKJACK_BIND_ADDR`,
    /// `BLACKJACK_MAX_CONNECTIONS`, `BLACKJACK_EXPIRY_INTERVAL_SECS` and
    /// `BLACKJACK_IDLE_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self, GameServerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, GameServerError> {
        let mut config = Self::default();
        if let Some(addr) = parse_var(&lookup, "BLACKJACK_BIND_ADDR")? {
            config.bind_addr = addr;
        }
        if let Some(max) = parse_var(&lookup, "BLACKJACK_MAX_CONNECTIONS")? {
            config.max_connections = max;
        }
        if let Some(secs) = parse_var(&lookup, "BLACKJACK_EXPIRY_INTERVAL_SECS")? {
            config.expiry_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var(&lookup, "BLACKJACK_IDLE_TIMEOUT_SECS")? {
            config.idle_timeout = Duration::from_secs(secs);
        }
        Ok(config)
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, GameServerError> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| GameServerError::Config(format!("{}={:?} is not valid", key, raw))),
    }
}

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Connection limit reached.
    #[error("Connection limit reached")]
    ConnectionLimitReached,

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Connected client state.
struct ConnectedClient {
    player_id: PlayerId,
    last_activity: Instant,
    /// Fired to close an idle connection.
    kick: Option<oneshot::Sender<()>>,
}

/// The table server.
pub struct GameServer {
    config: ServerConfig,
    tables: Arc<TableService>,
    house: Arc<HouseAgent>,
    clients: Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Server over a table service.
    pub fn new(config: ServerConfig, tables: Arc<TableService>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            tables,
            house: Arc::new(HouseAgent::new()),
            clients: Arc::new(RwLock::new(BTreeMap::new())),
            shutdown_tx,
        }
    }

    /// Run the server.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!("Table server listening on {}", self.config.bind_addr);

        let cleanup_handle = tokio::spawn(Self::run_cleanup_loop(
            self.tables.clone(),
            self.house.clone(),
            self.clients.clone(),
            self.config.clone(),
        ));

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let clients_count = self.clients.read().await.len();
                            if clients_count >= self.config.max_connections {
                                warn!("{}, rejecting {}", GameServerError::ConnectionLimitReached, addr);
                                continue;
                            }

                            info!("New connection from {}", addr);
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        cleanup_handle.abort();
        Ok(())
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let clients = self.clients.clone();
        let tables = self.tables.clone();
        let house = self.house.clone();
        let version = self.config.version.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("WebSocket handshake failed for {}: {}", addr, e);
                    return;
                }
            };

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(64);
            let (kick_tx, mut kick_rx) = oneshot::channel::<()>();
            let player = PlayerId::random();

            clients.write().await.insert(
                addr,
                ConnectedClient {
                    player_id: player,
                    last_activity: Instant::now(),
                    kick: Some(kick_tx),
                },
            );

            let sender_task = tokio::spawn(async move {
                while let Some(msg) = msg_rx.recv().await {
                    let text = match msg.to_json() {
                        Ok(t) => t,
                        Err(e) => {
                            error!("Failed to serialize message: {}", e);
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
            });

            let _ = msg_tx
                .send(ServerMessage::Welcome {
                    player_id: hex::encode(player.0),
                    server_version: version,
                })
                .await;

            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                let reply = match ClientMessage::from_json(&text) {
                                    Ok(client_msg) => {
                                        if let Some(client) = clients.write().await.get_mut(&addr) {
                                            client.last_activity = Instant::now();
                                        }
                                        if let Some(action) = action_name(&client_msg) {
                                            debug!(player = %player, %action, "Client action");
                                        }
                                        handle_client_message(&tables, &house, player, client_msg).await
                                    }
                                    Err(e) => {
                                        debug!("Invalid message from {}: {}", addr, e);
                                        ServerMessage::Error(ServerError::new(
                                            ErrorCode::InvalidInput,
                                            "Invalid message format",
                                        ))
                                    }
                                };
                                if msg_tx.send(reply).await.is_err() {
                                    break;
                                }
                            }
                            Some(Ok(Message::Ping(_))) => {
                                let _ = msg_tx.send(pong(0)).await;
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("Client {} disconnected", addr);
                                break;
                            }
                            Some(Err(e)) => {
                                error!("WebSocket error for {}: {}", addr, e);
                                break;
                            }
                            _ => {}
                        }
                    }
                    _ = &mut kick_rx => {
                        let _ = msg_tx.send(ServerMessage::Shutdown {
                            reason: "Idle timeout".to_string(),
                        }).await;
                        break;
                    }
                    _ = shutdown_rx.recv() => {
                        let _ = msg_tx.send(ServerMessage::Shutdown {
                            reason: "Server shutting down".to_string(),
                        }).await;
                        break;
                    }
                }
            }

            // Let queued replies flush before the writer goes away
            drop(msg_tx);
            let _ = tokio::time::timeout(Duration::from_secs(1), sender_task).await;

            clients.write().await.remove(&addr);
            disconnect(&tables, &house, player).await;
            info!("Client {} cleaned up", addr);
        });
    }

    /// Expire overdue rounds and close idle connections.
    async fn run_cleanup_loop(
        tables: Arc<TableService>,
        house: Arc<HouseAgent>,
        clients: Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>,
        config: ServerConfig,
    ) {
        let mut ticker = interval(config.expiry_interval);

        loop {
            ticker.tick().await;

            match tables.expire_stale().await {
                Ok(expired) => {
                    for round in &expired {
                        house.forget(round).await;
                    }
                }
                Err(e) => error!("Expiry sweep failed: {}", e),
            }

            let mut clients = clients.write().await;
            for (addr, client) in clients.iter_mut() {
                if client.last_activity.elapsed() > config.idle_timeout {
                    if let Some(kick) = client.kick.take() {
                        info!(player = %client.player_id, "Closing idle connection {}", addr);
                        let _ = kick.send(());
                    }
                }
            }
        }
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Number of connected clients.
    pub async fn connection_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// The table service behind this server.
    pub fn tables(&self) -> &Arc<TableService> {
        &self.tables
    }
}

/// Leave any active round once the connection is gone.
async fn disconnect(tables: &TableService, house: &HouseAgent, player: PlayerId) {
    if let Some(round) = tables.active_round(&player).await {
        if let Err(e) = tables.leave(round).await {
            warn!(player = %player, "Leave on disconnect failed: {}", e);
        }
        house.forget(&round).await;
    }
}

fn pong(timestamp: u64) -> ServerMessage {
    ServerMessage::Pong {
        timestamp,
        server_time: chrono::Utc::now().timestamp_millis().max(0) as u64,
    }
}

fn invalid(field: &str) -> ServerMessage {
    ServerMessage::Error(ServerError::new(
        ErrorCode::InvalidInput,
        format!("{} must be 32 bytes of hex", field),
    ))
}

fn not_seated() -> ServerMessage {
    ServerMessage::Error(ServerError::new(ErrorCode::NotSeated, "Join a table first"))
}

fn house_failure(err: HouseError) -> ServerMessage {
    match err {
        HouseError::Table(e) => ServerMessage::error(&e),
        other => {
            error!("House step failed: {}", other);
            ServerMessage::Error(ServerError::new(ErrorCode::InternalError, other.to_string()))
        }
    }
}

/// Answer one client message on behalf of `player`.
pub(crate) async fn handle_client_message(
    tables: &TableService,
    house: &HouseAgent,
    player: PlayerId,
    msg: ClientMessage,
) -> ServerMessage {
    match msg {
        ClientMessage::Ping { timestamp } => pong(timestamp),
        ClientMessage::ListTables => match tables.tables().await {
            Ok(list) => ServerMessage::Tables {
                tables: list.iter().map(TableInfo::from).collect(),
            },
            Err(e) => ServerMessage::error(&e),
        },
        ClientMessage::Join { table_id } => match tables.join(player, table_id).await {
            Ok(round) => ServerMessage::Joined {
                round_id: hex::encode(round),
                table_id,
            },
            Err(e) => ServerMessage::error(&e),
        },
        ClientMessage::Leave => {
            let Some(round) = tables.active_round(&player).await else {
                return not_seated();
            };
            let reply = match tables.leave(round).await {
                Ok(()) => phase(tables, round).await,
                Err(e) => ServerMessage::error(&e),
            };
            house.forget(&round).await;
            reply
        }
        msg => {
            let Some(round) = tables.latest_round(&player).await else {
                return not_seated();
            };
            round_message(tables, house, round, msg).await
        }
    }
}

async fn round_message(
    tables: &TableService,
    house: &HouseAgent,
    round: RoundId,
    msg: ClientMessage,
) -> ServerMessage {
    let setup = match msg {
        ClientMessage::PlaceBet { amount } => tables.place_bet(round, amount).await,
        ClientMessage::CommitRandomness { cv } => match decode_hash(&cv) {
            Some(cv) => tables.commit_randomness(round, Party::Player, cv).await,
            None => return invalid("cv"),
        },
        ClientMessage::RevealHash { co } => match decode_hash(&co) {
            Some(co) => tables.reveal_hash(round, Party::Player, co).await,
            None => return invalid("co"),
        },
        ClientMessage::RevealSecret { secret } => match decode_secret(&secret) {
            Some(secret) => tables.reveal_secret(round, Party::Player, secret).await,
            None => return invalid("secret"),
        },
        ClientMessage::SubmitCut { cut } => {
            return match tables.submit_cut(round, Party::Player, cut).await {
                Ok(()) => {
                    house.forget(&round).await;
                    hands(tables, round).await
                }
                Err(e) => ServerMessage::error(&e),
            };
        }
        ClientMessage::Hit | ClientMessage::Stand | ClientMessage::DoubleDown => {
            let played = match msg {
                ClientMessage::Hit => tables.hit(round).await,
                ClientMessage::Stand => tables.stand(round).await,
                _ => tables.double_down(round).await,
            };
            return match played {
                Ok(()) => hands(tables, round).await,
                Err(e) => ServerMessage::error(&e),
            };
        }
        ClientMessage::NewGame => {
            let next = match tables.new_game(round).await {
                Ok(next) => next,
                Err(e) => return ServerMessage::error(&e),
            };
            return match tables.get_phase(next).await {
                Ok(view) => ServerMessage::Joined {
                    round_id: hex::encode(next),
                    table_id: view.table_id,
                },
                Err(e) => ServerMessage::error(&e),
            };
        }
        ClientMessage::GetPhase => return phase(tables, round).await,
        ClientMessage::GetHands => return hands(tables, round).await,
        ClientMessage::Verify => return verification(tables, round).await,
        ClientMessage::ListTables
        | ClientMessage::Join { .. }
        | ClientMessage::Leave
        | ClientMessage::Ping { .. } => return not_seated(),
    };

    if let Err(e) = setup {
        return ServerMessage::error(&e);
    }
    if let Err(e) = house.drive(tables, round).await {
        return house_failure(e);
    }
    phase(tables, round).await
}

async fn phase(tables: &TableService, round: RoundId) -> ServerMessage {
    match tables.get_phase(round).await {
        Ok(view) => ServerMessage::Phase(view.into()),
        Err(e) => ServerMessage::error(&e),
    }
}

async fn hands(tables: &TableService, round: RoundId) -> ServerMessage {
    match tables.get_hands(round).await {
        Ok(view) => ServerMessage::Hands(view),
        Err(e) => ServerMessage::error(&e),
    }
}

async fn verification(tables: &TableService, round: RoundId) -> ServerMessage {
    let verdict = match tables.verify(round).await {
        Ok(verdict) => verdict,
        Err(TableError::Tampered(evidence)) => Verdict::Tampered(evidence),
        Err(e) => return ServerMessage::error(&e),
    };
    match tables.transcript(round).await {
        Ok(transcript) => {
            ServerMessage::Verification(VerificationInfo::new(round, verdict, transcript))
        }
        Err(e) => ServerMessage::error(&e),
    }
}
