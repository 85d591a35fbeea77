//! WebSocket Game Server
//!
//! Async WebSocket server in front of the [`PlayEngine`]. Handles
//! authentication, per-player authorization and message routing; every game
//! decision is made by the engine.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use chrono::Utc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, Notify, OwnedSemaphorePermit, RwLock, Semaphore};
use tokio::time::{interval, timeout};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, error, info, instrument, warn};

use crate::game::engine::PlayEngine;
use crate::game::profile::PlayerId;
use crate::network::auth::{validate_token, AuthConfig};
use crate::network::protocol::{AuthRequest, AuthResult, ClientMessage, ErrorCode, ServerError, ServerMessage};
use crate::store::{PlayerStore, ResultStore};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Connections silent for this long are dropped.
    pub idle_timeout: Duration,
    /// How often idle clients and player locks are swept.
    pub cleanup_interval: Duration,
    /// Fixed RNG seed; entropy when unset.
    pub rng_seed: Option<u64>,
    /// Server version string.
    pub version: String,
    /// JWT validation settings.
    pub auth: AuthConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_connections: 1000,
            idle_timeout: Duration::from_secs(300),
            cleanup_interval: Duration::from_secs(60),
            rng_seed: None,
            version: env!("CARGO_PKG_VERSION").to_string(),
            auth: AuthConfig::default(),
        }
    }
}

/// Parse a variable if present.
fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Result<Option<T>, GameServerError> {
    match lookup(name).filter(|v| !v.trim().is_empty()) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| GameServerError::Config(format!("invalid {}: {}", name, raw))),
        None => Ok(None),
    }
}

impl ServerConfig {
    /// Read `BIND_ADDR` (or `PORT`), `MAX_CONNECTIONS`, `RNG_SEED` and the
    /// `AUTH_*` variables.
    pub fn from_env() -> Result<Self, GameServerError> {
        let mut config = Self::from_lookup(|name| std::env::var(name).ok())?;
        config.auth = AuthConfig::from_env();
        Ok(config)
    }

    /// Build from any variable source. Auth settings stay at their default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, GameServerError> {
        let mut config = Self::default();

        if let Some(addr) = parse_var::<SocketAddr>(&lookup, "BIND_ADDR")? {
            config.bind_addr = addr;
        } else if let Some(port) = parse_var::<u16>(&lookup, "PORT")? {
            config.bind_addr.set_port(port);
        }
        if let Some(max) = parse_var(&lookup, "MAX_CONNECTIONS")? {
            config.max_connections = max;
        }
        config.rng_seed = parse_var(&lookup, "RNG_SEED")?;

        Ok(config)
    }
}

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// Bad configuration value.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Connected client state.
struct ConnectedClient {
    /// Player bound by a validated token.
    player_id: Option<PlayerId>,
    /// Connection time.
    connected_at: Instant,
    /// Last activity.
    last_activity: Instant,
    /// Message sender (for direct messaging to client).
    sender: mpsc::Sender<ServerMessage>,
    /// Signals the connection task to close.
    kick: Arc<Notify>,
}

type Clients = Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>;

/// The game server.
pub struct GameServer<S> {
    /// Server configuration.
    config: ServerConfig,
    /// Play engine shared by all connections.
    engine: Arc<PlayEngine<S>>,
    /// Connected clients.
    clients: Clients,
    /// One permit per open connection, taken before the task is spawned.
    slots: Arc<Semaphore>,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl<S: PlayerStore + ResultStore> GameServer<S> {
    /// Create a new game server.
    pub fn new(config: ServerConfig, engine: Arc<PlayEngine<S>>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            slots: Arc::new(Semaphore::new(config.max_connections.min(Semaphore::MAX_PERMITS))),
            config,
            engine,
            clients: Arc::new(RwLock::new(BTreeMap::new())),
            shutdown_tx,
        }
    }

    /// Bind the configured address and serve until shutdown.
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Serve connections from `listener` until shutdown.
    #[instrument(skip_all)]
    pub async fn serve(&self, listener: TcpListener) -> Result<(), GameServerError> {
        info!("Game server listening on {}", listener.local_addr()?);
        if self.config.auth.is_configured() {
            info!("JWT authentication enabled");
        } else {
            warn!("Authentication not configured; requests name their own player id");
        }

        let cleanup_handle = tokio::spawn(Self::run_cleanup_loop(
            self.clients.clone(),
            self.engine.clone(),
            self.config.cleanup_interval,
            self.config.idle_timeout,
        ));

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let Ok(permit) = self.slots.clone().try_acquire_owned() else {
                                warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            };

                            info!("New connection from {}", addr);
                            self.handle_connection(stream, addr, permit);
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

    /// Handle a new WebSocket connection. `permit` is held until it closes.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr, permit: OwnedSemaphorePermit) {
        let clients = self.clients.clone();
        let engine = self.engine.clone();
        let config = self.config.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let _permit = permit;
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("WebSocket handshake failed for {}: {}", addr, e);
                    return;
                }
            };

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(64);
            let kick = Arc::new(Notify::new());

            // Register client
            {
                let mut clients = clients.write().await;
                clients.insert(addr, ConnectedClient {
                    player_id: None,
                    connected_at: Instant::now(),
                    last_activity: Instant::now(),
                    sender: msg_tx.clone(),
                    kick: kick.clone(),
                });
            }

            // Spawn message sender task
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

            // Handle incoming messages
            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                let client_msg = match ClientMessage::from_json(&text) {
                                    Ok(m) => m,
                                    Err(e) => {
                                        debug!("Invalid message from {}: {}", addr, e);
                                        let _ = msg_tx.send(ServerMessage::error(
                                            ErrorCode::InvalidInput,
                                            format!("Invalid message format: {}", e),
                                        )).await;
                                        continue;
                                    }
                                };

                                // Update activity
                                {
                                    let mut clients = clients.write().await;
                                    match clients.get_mut(&addr) {
                                        Some(client) => client.last_activity = Instant::now(),
                                        None => break,
                                    }
                                }

                                let reply = Self::handle_client_message(
                                    addr,
                                    client_msg,
                                    &clients,
                                    &engine,
                                    &config,
                                ).await;
                                if msg_tx.send(reply).await.is_err() {
                                    break;
                                }
                            }
                            Some(Ok(Message::Binary(_))) => {
                                let _ = msg_tx.send(ServerMessage::error(
                                    ErrorCode::InvalidInput,
                                    "Binary frames are not supported",
                                )).await;
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
                    _ = kick.notified() => {
                        debug!("Closing idle connection {}", addr);
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

            // Remove client
            let connected_for = {
                let mut clients = clients.write().await;
                clients.remove(&addr).map(|c| c.connected_at.elapsed())
            };

            // Let queued replies drain before the socket closes
            drop(msg_tx);
            if timeout(Duration::from_secs(1), sender_task).await.is_err() {
                debug!("Sender for {} did not drain in time", addr);
            }

            match connected_for {
                Some(duration) => info!("Client {} cleaned up after {:?}", addr, duration),
                None => info!("Client {} cleaned up", addr),
            }
        });
    }

    /// Handle a client message.
    async fn handle_client_message(
        addr: SocketAddr,
        msg: ClientMessage,
        clients: &Clients,
        engine: &PlayEngine<S>,
        config: &ServerConfig,
    ) -> ServerMessage {
        if let ClientMessage::Auth(auth) = msg {
            return Self::handle_auth(addr, auth, clients, config).await;
        }

        let bound = clients.read().await.get(&addr).and_then(|c| c.player_id.clone());
        if let Err(err) = authorize(config.auth.is_configured(), bound.as_ref(), &msg) {
            debug!("Rejected request from {}: {}", addr, err.message);
            return ServerMessage::Error(err);
        }

        dispatch(engine, msg).await
    }

    /// Handle authentication.
    async fn handle_auth(
        addr: SocketAddr,
        auth: AuthRequest,
        clients: &Clients,
        config: &ServerConfig,
    ) -> ServerMessage {
        let claims = match validate_token(&auth.token, &config.auth) {
            Ok(claims) => claims,
            Err(e) => {
                warn!("Authentication failed for {}: {}", addr, e);
                return ServerMessage::Error(ServerError::from(&e));
            }
        };
        let player_id = claims.player_id();

        {
            let mut clients = clients.write().await;
            if let Some(client) = clients.get_mut(&addr) {
                client.player_id = Some(player_id.clone());
            }
        }

        info!("Client {} authenticated as {} (client {})", addr, player_id, auth.client_version);
        ServerMessage::AuthResult(AuthResult {
            user_id: player_id,
            server_version: config.version.clone(),
        })
    }

    /// Run cleanup loop.
    async fn run_cleanup_loop(
        clients: Clients,
        engine: Arc<PlayEngine<S>>,
        every: Duration,
        idle_timeout: Duration,
    ) {
        let mut interval = interval(every);

        loop {
            interval.tick().await;

            // Cleanup idle connections
            let now = Instant::now();
            let idle: Vec<_> = {
                let clients = clients.read().await;
                clients.iter()
                    .filter(|(_, c)| now.duration_since(c.last_activity) > idle_timeout)
                    .map(|(addr, _)| *addr)
                    .collect()
            };

            for addr in idle {
                let mut clients = clients.write().await;
                if let Some(client) = clients.remove(&addr) {
                    let _ = client.sender.try_send(ServerMessage::Shutdown {
                        reason: "Idle timeout".to_string(),
                    });
                    client.kick.notify_one();
                    info!("Removed idle client {}", addr);
                }
            }

            engine.prune_locks().await;
        }
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get active connection count.
    pub async fn connection_count(&self) -> usize {
        self.clients.read().await.len()
    }
}

/// Check that the connection may send `msg`.
///
/// With authentication on, everything but `ping` needs a bound player, and
/// requests naming a player must name that one.
pub fn authorize(
    auth_required: bool,
    bound: Option<&PlayerId>,
    msg: &ClientMessage,
) -> Result<(), ServerError> {
    if !auth_required || matches!(msg, ClientMessage::Ping { .. }) {
        return Ok(());
    }

    let Some(bound) = bound else {
        return Err(ServerError::new(ErrorCode::NotAuthenticated, "Must authenticate first"));
    };

    match msg.target_player() {
        Some(target) if target != bound => Err(ServerError::new(
            ErrorCode::Forbidden,
            format!("Connection is authenticated as {}", bound),
        )),
        _ => Ok(()),
    }
}

/// Run one request against the engine and build the reply.
pub async fn dispatch<S: PlayerStore + ResultStore>(
    engine: &PlayEngine<S>,
    msg: ClientMessage,
) -> ServerMessage {
    let result = match msg {
        ClientMessage::CreateProfile(req) => engine.create_profile(req).await.map(ServerMessage::Profile),
        ClientMessage::GetProfile { user_id } => engine.get_profile(&user_id).await.map(ServerMessage::Profile),
        ClientMessage::PlaySlot(req) => engine.play_slot(req).await.map(ServerMessage::SlotResult),
        ClientMessage::PlayMiniGame(req) => engine.play_mini_game(req).await.map(ServerMessage::MiniGameResult),
        ClientMessage::History { user_id, limit } => engine
            .history(&user_id, limit)
            .await
            .map(|records| ServerMessage::History { records }),
        ClientMessage::Quests { user_id } => engine
            .quests(&user_id)
            .map(|quests| ServerMessage::Quests { quests }),
        ClientMessage::Events => Ok(ServerMessage::Events { events: engine.events() }),
        ClientMessage::Leaderboard { limit } => engine
            .leaderboard(limit)
            .await
            .map(|entries| ServerMessage::Leaderboard { entries }),
        ClientMessage::Ping { timestamp } => Ok(ServerMessage::Pong {
            timestamp,
            server_time: u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0),
        }),
        ClientMessage::Auth(_) => Ok(ServerMessage::error(
            ErrorCode::InvalidInput,
            "Auth is handled per connection",
        )),
    };

    result.unwrap_or_else(|err| {
        if err.is_client_error() {
            debug!("Request rejected: {}", err);
        } else {
            error!("Request failed: {}", err);
        }
        ServerMessage::Error(ServerError::from(&err))
    })
}
