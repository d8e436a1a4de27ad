//! WebSocket Round Server
//!
//! Async WebSocket server in front of a single [`RoundController`].
//!
//! ```text
//!              ┌──────────────── round actor task ────────────────┐
//!  interval ──>│ controller.tick(now)                             │
//!  mpsc cmd ──>│ controller.place_bet / cash_out / admin ... ─────┼──> oneshot reply
//!              │ drain_events() ──> broadcast ──> every connection│
//!              │ on round_crashed: snapshot ──> writer task       │
//!              └──────────────────────────────────────────────────┘
//! ```
//!
//! Snapshots are written by a separate task on the blocking pool, so a
//! slow disk never delays a tick.
//!
//! The controller is owned by exactly one task; connections talk to it
//! through a [`RoundHandle`]. No lock guards round state.

use std::collections::{BTreeMap, BTreeSet};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, oneshot, RwLock};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, instrument, warn};

use crate::core::derive::{HouseEdge, InvalidEdge};
use crate::core::multiplier::Multiplier;
use crate::core::rng::OsSeedSource;
use crate::game::audit::AuditEntry;
use crate::game::bets::{BetId, CashOut};
use crate::game::events::RoundEvent;
use crate::game::history::HistoryRecord;
use crate::game::state::{PlayerId, RoundId, RoundPhase};
use crate::game::tick::{EngineConfig, PlatformStats, RoundController, RoundError};
use crate::network::protocol::{
    AdminAction, ClientMessage, ErrorCode, ServerError, ServerMessage, VerifyInfo, WelcomeInfo,
};
use crate::proof::commitment::RoundCommitment;
use crate::proof::verify::verify;
use crate::store::{FileStore, MemoryStore, Snapshot, SnapshotStore, StoreError};
use crate::TICK_RATE;

/// Events buffered per subscriber before it starts lagging.
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Commands buffered for the round actor.
pub const COMMAND_CHANNEL_CAPACITY: usize = 256;

/// Snapshots queued for the writer task.
pub const SNAPSHOT_QUEUE_CAPACITY: usize = 8;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Controller tick rate (Hz).
    pub tick_rate: u32,
    /// Key required for admin actions. `None` disables them.
    pub admin_key: Option<String>,
    /// Snapshot file. `None` keeps state in memory only.
    pub store_path: Option<PathBuf>,
    /// Round engine settings.
    pub engine: EngineConfig,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_connections: 1000,
            tick_rate: TICK_RATE,
            admin_key: None,
            store_path: None,
            engine: EngineConfig::default(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by `SKYHIGH_*` environment variables.
    ///
    /// `SKYHIGH_HOUSE_EDGE` only applies when no snapshot exists yet; a
    /// restored snapshot carries its own edge.
    pub fn from_env() -> Result<Self, RoundServerError> {
        let mut config = Self::default();

        if let Ok(bind) = std::env::var("SKYHIGH_BIND") {
            config.bind_addr = bind
                .parse()
                .map_err(|e| RoundServerError::Config(format!("SKYHIGH_BIND={}: {}", bind, e)))?;
        }
        if let Ok(key) = std::env::var("SKYHIGH_ADMIN_KEY") {
            if !key.is_empty() {
                config.admin_key = Some(key);
            }
        }
        if let Ok(path) = std::env::var("SKYHIGH_STORE") {
            if !path.is_empty() {
                config.store_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(max) = std::env::var("SKYHIGH_MAX_CONNECTIONS") {
            config.max_connections = max.parse().map_err(|e| {
                RoundServerError::Config(format!("SKYHIGH_MAX_CONNECTIONS={}: {}", max, e))
            })?;
        }
        if let Ok(edge) = std::env::var("SKYHIGH_HOUSE_EDGE") {
            let percent: f64 = edge
                .parse()
                .map_err(|e| RoundServerError::Config(format!("SKYHIGH_HOUSE_EDGE={}: {}", edge, e)))?;
            config.engine.house_edge = HouseEdge::new(percent)
                .map_err(|InvalidEdge(v)| RoundServerError::Config(format!("SKYHIGH_HOUSE_EDGE={}: out of range", v)))?;
        }

        Ok(config)
    }

    fn tick_interval(&self) -> Duration {
        Duration::from_millis(1000 / u64::from(self.tick_rate.max(1)))
    }
}

/// Round server errors.
#[derive(Debug, thiserror::Error)]
pub enum RoundServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Bad configuration value.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Snapshot could not be loaded.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The controller rejected the operation.
    #[error(transparent)]
    Round(#[from] RoundError),

    /// The round actor is gone.
    #[error("Round actor stopped")]
    ActorStopped,
}

// =============================================================================
// ROUND ACTOR
// =============================================================================

/// Public view of the controller.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundStatus {
    /// Current phase.
    pub phase: RoundPhase,
    /// Commitment of the round in progress.
    pub commitment: Option<RoundCommitment>,
    /// Edge for the next preparation.
    pub house_edge: HouseEdge,
    /// Override armed for the next preparation.
    pub pending_override: Option<Multiplier>,
    /// Current multiplier (1.00 outside the ascent).
    pub multiplier: Multiplier,
}

enum Command {
    PlaceBet {
        player: PlayerId,
        amount: u64,
        auto_cash_out: Option<f64>,
        reply: oneshot::Sender<Result<(RoundId, BetId), RoundError>>,
    },
    CashOut {
        bet_id: BetId,
        reply: oneshot::Sender<Result<CashOut, RoundError>>,
    },
    History {
        limit: usize,
        reply: oneshot::Sender<Vec<HistoryRecord>>,
    },
    Status {
        reply: oneshot::Sender<RoundStatus>,
    },
    SetHouseEdge {
        percent: f64,
        reply: oneshot::Sender<Result<HouseEdge, RoundError>>,
    },
    SetNextOverride {
        value: Option<f64>,
        reply: oneshot::Sender<Result<Option<Multiplier>, RoundError>>,
    },
    ForceCrash {
        reply: oneshot::Sender<Result<Multiplier, RoundError>>,
    },
    AuditLog {
        reply: oneshot::Sender<(Vec<AuditEntry>, PlatformStats)>,
    },
}

/// Cloneable handle to the round actor.
#[derive(Clone)]
pub struct RoundHandle {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<RoundEvent>,
}

impl RoundHandle {
    /// Receive every event produced from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<RoundEvent> {
        self.events.subscribe()
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, RoundServerError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| RoundServerError::ActorStopped)?;
        rx.await.map_err(|_| RoundServerError::ActorStopped)
    }

    /// Bet on the round taking bets.
    pub async fn place_bet(
        &self,
        player: PlayerId,
        amount: u64,
        auto_cash_out: Option<f64>,
    ) -> Result<(RoundId, BetId), RoundServerError> {
        Ok(self
            .request(|reply| Command::PlaceBet {
                player,
                amount,
                auto_cash_out,
                reply,
            })
            .await??)
    }

    /// Cash out at the current multiplier.
    pub async fn cash_out(&self, bet_id: BetId) -> Result<CashOut, RoundServerError> {
        Ok(self.request(|reply| Command::CashOut { bet_id, reply }).await??)
    }

    /// Settled rounds, newest first.
    pub async fn history(&self, limit: usize) -> Result<Vec<HistoryRecord>, RoundServerError> {
        self.request(|reply| Command::History { limit, reply }).await
    }

    /// Phase, commitment and current multiplier.
    pub async fn status(&self) -> Result<RoundStatus, RoundServerError> {
        self.request(|reply| Command::Status { reply }).await
    }

    /// Change the edge for future rounds.
    pub async fn set_house_edge(&self, percent: f64) -> Result<HouseEdge, RoundServerError> {
        Ok(self
            .request(|reply| Command::SetHouseEdge { percent, reply })
            .await??)
    }

    /// Arm or clear the next-round override.
    pub async fn set_next_override(
        &self,
        value: Option<f64>,
    ) -> Result<Option<Multiplier>, RoundServerError> {
        Ok(self
            .request(|reply| Command::SetNextOverride { value, reply })
            .await??)
    }

    /// End the ascending round now.
    pub async fn force_crash(&self) -> Result<Multiplier, RoundServerError> {
        Ok(self.request(|reply| Command::ForceCrash { reply }).await??)
    }

    /// Audit trail and platform totals.
    pub async fn audit_log(&self) -> Result<(Vec<AuditEntry>, PlatformStats), RoundServerError> {
        self.request(|reply| Command::AuditLog { reply }).await
    }
}

/// Spawn the task that owns `controller`.
///
/// The task ends when every [`RoundHandle`] has been dropped.
pub fn spawn_round_actor(
    controller: RoundController,
    store: Box<dyn SnapshotStore>,
    tick_every: Duration,
) -> (RoundHandle, JoinHandle<()>) {
    let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
    let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

    let handle = RoundHandle {
        commands: command_tx,
        events: event_tx.clone(),
    };
    let task = tokio::spawn(run_round_actor(controller, store, tick_every, command_rx, event_tx));
    (handle, task)
}

/// Spawn the task that persists snapshots in queue order.
fn spawn_snapshot_writer(mut store: Box<dyn SnapshotStore>) -> (mpsc::Sender<Snapshot>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<Snapshot>(SNAPSHOT_QUEUE_CAPACITY);
    let task = tokio::spawn(async move {
        while let Some(snapshot) = rx.recv().await {
            let saved = tokio::task::spawn_blocking(move || {
                let result = store.save(&snapshot);
                (store, result)
            })
            .await;
            match saved {
                Ok((returned, result)) => {
                    store = returned;
                    if let Err(e) = result {
                        error!("Failed to save snapshot: {}", e);
                    }
                }
                Err(e) => {
                    error!("Snapshot writer failed: {}", e);
                    return;
                }
            }
        }
    });
    (tx, task)
}

async fn run_round_actor(
    mut controller: RoundController,
    store: Box<dyn SnapshotStore>,
    tick_every: Duration,
    mut commands: mpsc::Receiver<Command>,
    events: broadcast::Sender<RoundEvent>,
) {
    let (saves, writer) = spawn_snapshot_writer(store);
    let mut ticker = interval(tick_every);
    info!("Round actor started, ticking every {:?}", tick_every);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                controller.tick(Instant::now());
            }
            cmd = commands.recv() => {
                match cmd {
                    Some(cmd) => handle_command(&mut controller, cmd),
                    None => break,
                }
            }
        }

        for event in controller.drain_events() {
            if matches!(event, RoundEvent::Crashed { .. }) {
                if let Err(e) = saves.try_send(controller.snapshot()) {
                    warn!("Snapshot not queued: {}", e);
                }
            }
            // No subscribers is fine
            let _ = events.send(event);
        }
    }

    if saves.send(controller.snapshot()).await.is_err() {
        error!("Failed to queue final snapshot");
    }
    drop(saves);
    if let Err(e) = writer.await {
        error!("Snapshot writer failed: {}", e);
    }
    info!("Round actor stopped");
}

fn handle_command(controller: &mut RoundController, cmd: Command) {
    let now = Instant::now();
    // A dropped reply receiver only means the connection went away
    match cmd {
        Command::PlaceBet {
            player,
            amount,
            auto_cash_out,
            reply,
        } => {
            let result = controller
                .place_bet(player, amount, auto_cash_out)
                .map(|bet_id| {
                    let round = controller.current_round().map(|r| r.id).unwrap_or_default();
                    (round, bet_id)
                });
            let _ = reply.send(result);
        }
        Command::CashOut { bet_id, reply } => {
            let _ = reply.send(controller.cash_out(&bet_id, now));
        }
        Command::History { limit, reply } => {
            let records = controller.history().iter().take(limit).cloned().collect();
            let _ = reply.send(records);
        }
        Command::Status { reply } => {
            let _ = reply.send(RoundStatus {
                phase: controller.phase(),
                commitment: controller.commitment(),
                house_edge: controller.risk().house_edge(),
                pending_override: controller.risk().pending_override(),
                multiplier: controller.current_multiplier(now),
            });
        }
        Command::SetHouseEdge { percent, reply } => {
            let _ = reply.send(controller.set_house_edge(percent));
        }
        Command::SetNextOverride { value, reply } => {
            let _ = reply.send(controller.set_next_override(value));
        }
        Command::ForceCrash { reply } => {
            let _ = reply.send(controller.force_crash(now));
        }
        Command::AuditLog { reply } => {
            let entries = controller.audit().entries().cloned().collect();
            let _ = reply.send((entries, controller.stats()));
        }
    }
}

// =============================================================================
// CONNECTIONS
// =============================================================================

/// Connected client state.
struct ConnectedClient {
    player_id: PlayerId,
    connected_at: Instant,
}

/// Per-connection context for answering client messages.
pub struct Session {
    player_id: PlayerId,
    handle: RoundHandle,
    admin_key: Option<String>,
    /// Bets this connection placed in `bets_round`; older rounds are dropped.
    bets_round: RoundId,
    own_bets: BTreeSet<BetId>,
}

impl Session {
    /// Session for one connection.
    pub fn new(player_id: PlayerId, handle: RoundHandle, admin_key: Option<String>) -> Self {
        Self {
            player_id,
            handle,
            admin_key,
            bets_round: RoundId::default(),
            own_bets: BTreeSet::new(),
        }
    }

    fn remember_bet(&mut self, round: RoundId, bet_id: BetId) {
        if round != self.bets_round {
            self.own_bets.clear();
            self.bets_round = round;
        }
        self.own_bets.insert(bet_id);
    }

    /// Answer one client message.
    pub async fn respond(&mut self, msg: ClientMessage) -> ServerMessage {
        match self.dispatch(msg).await {
            Ok(reply) => reply,
            Err(RoundServerError::Round(e)) => ServerMessage::Error(ServerError::from(&e)),
            Err(e) => ServerMessage::Error(ServerError::new(ErrorCode::InternalError, e.to_string())),
        }
    }

    async fn dispatch(&mut self, msg: ClientMessage) -> Result<ServerMessage, RoundServerError> {
        match msg {
            ClientMessage::PlaceBet {
                amount,
                auto_cash_out,
            } => {
                let (round, bet_id) = self
                    .handle
                    .place_bet(self.player_id, amount, auto_cash_out)
                    .await?;
                self.remember_bet(round, bet_id);
                Ok(ServerMessage::BetAccepted { round, bet_id })
            }
            ClientMessage::CashOut { bet_id } => {
                if !self.own_bets.contains(&bet_id) {
                    return Ok(ServerMessage::Error(ServerError::new(
                        ErrorCode::BetRejected,
                        "Unknown bet",
                    )));
                }
                let cash_out = self.handle.cash_out(bet_id).await?;
                Ok(ServerMessage::CashOutResult(cash_out))
            }
            ClientMessage::Verify {
                server_seed,
                house_edge,
                server_hash,
            } => match verify(&server_seed, house_edge) {
                Ok(v) => Ok(ServerMessage::VerifyResult(VerifyInfo {
                    hash: v.hash,
                    crash_point: v.crash_point,
                    instant_crash: v.derivation.instant_crash,
                    matches_commitment: server_hash.map(|h| h == v.hash),
                })),
                Err(e) => Ok(ServerMessage::Error(ServerError::new(
                    ErrorCode::InvalidInput,
                    e.to_string(),
                ))),
            },
            ClientMessage::History { limit } => {
                let limit = limit.unwrap_or(usize::MAX);
                let records = self.handle.history(limit).await?;
                Ok(ServerMessage::History { records })
            }
            ClientMessage::Ping { timestamp } => Ok(ServerMessage::Pong {
                timestamp,
                server_time: chrono::Utc::now().timestamp_millis().max(0) as u64,
            }),
            ClientMessage::Admin { key, action } => {
                if self.admin_key.as_deref() != Some(key.as_str()) {
                    warn!(player = %self.player_id.to_uuid_string(), "Rejected admin action");
                    return Ok(ServerMessage::Error(ServerError::new(
                        ErrorCode::Unauthorized,
                        "Admin key required",
                    )));
                }
                self.admin(action).await
            }
        }
    }

    async fn admin(&self, action: AdminAction) -> Result<ServerMessage, RoundServerError> {
        let crashed_at = match action {
            AdminAction::SetHouseEdge { percent } => {
                self.handle.set_house_edge(percent).await?;
                None
            }
            AdminAction::SetNextOverride { value } => {
                self.handle.set_next_override(value).await?;
                None
            }
            AdminAction::ForceCrash => Some(self.handle.force_crash().await?),
            AdminAction::AuditLog => {
                let (entries, stats) = self.handle.audit_log().await?;
                return Ok(ServerMessage::AuditLog { entries, stats });
            }
        };
        let status = self.handle.status().await?;
        Ok(ServerMessage::AdminAck {
            house_edge: status.house_edge,
            pending_override: status.pending_override,
            crashed_at,
        })
    }
}

/// The round server.
pub struct RoundServer {
    config: ServerConfig,
    handle: RoundHandle,
    clients: Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl RoundServer {
    /// Load the snapshot, build the controller and spawn its actor.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(config: ServerConfig) -> Result<Self, RoundServerError> {
        let store: Box<dyn SnapshotStore> = match &config.store_path {
            Some(path) => Box::new(FileStore::new(path.clone())),
            None => Box::new(MemoryStore::new()),
        };

        let seeds = Box::new(OsSeedSource);
        let controller = match store.load()? {
            Some(snapshot) => RoundController::restore(config.engine.clone(), seeds, snapshot),
            None => RoundController::new(config.engine.clone(), seeds),
        };

        let (handle, _task) = spawn_round_actor(controller, store, config.tick_interval());
        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            config,
            handle,
            clients: Arc::new(RwLock::new(BTreeMap::new())),
            shutdown_tx,
        })
    }

    /// Handle to the round actor.
    pub fn handle(&self) -> &RoundHandle {
        &self.handle
    }

    /// Run the accept loop until shutdown.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), RoundServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!("Round server listening on {}", self.config.bind_addr);

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let clients_count = self.clients.read().await.len();
                            if clients_count >= self.config.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
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

        Ok(())
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let clients = self.clients.clone();
        let handle = self.handle.clone();
        let config = self.config.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut events_rx = self.handle.subscribe();

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

            let player_id = PlayerId::random();
            {
                let mut clients = clients.write().await;
                clients.insert(addr, ConnectedClient {
                    player_id,
                    connected_at: Instant::now(),
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

            match handle.status().await {
                Ok(status) => {
                    let _ = msg_tx.send(ServerMessage::Welcome(WelcomeInfo {
                        player_id,
                        phase: status.phase,
                        commitment: status.commitment,
                        house_edge: status.house_edge,
                        server_version: config.version.clone(),
                    })).await;
                }
                Err(e) => error!("Status unavailable for {}: {}", addr, e),
            }

            let mut session = Session::new(player_id, handle, config.admin_key.clone());

            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                let client_msg = match ClientMessage::from_json(&text) {
                                    Ok(m) => m,
                                    Err(e) => {
                                        debug!("Invalid message from {}: {}", addr, e);
                                        let _ = msg_tx.send(ServerMessage::Error(ServerError::new(
                                            ErrorCode::InvalidInput,
                                            "Invalid message format",
                                        ))).await;
                                        continue;
                                    }
                                };

                                let reply = session.respond(client_msg).await;
                                let _ = msg_tx.send(reply).await;
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
                    event = events_rx.recv() => {
                        match event {
                            Ok(event) => {
                                let _ = msg_tx.send(ServerMessage::Event(event)).await;
                            }
                            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                                warn!("Client {} lagged, skipped {} events", addr, skipped);
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        let _ = msg_tx.send(ServerMessage::Shutdown {
                            reason: "Server shutting down".to_string(),
                        }).await;
                        break;
                    }
                }
            }

            sender_task.abort();
            if let Some(client) = clients.write().await.remove(&addr) {
                info!(
                    "Client {} cleaned up after {:?}",
                    addr,
                    client.connected_at.elapsed()
                );
            }
        });
    }

    /// Number of open connections.
    pub async fn connection_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Players currently connected.
    pub async fn connected_players(&self) -> Vec<PlayerId> {
        self.clients.read().await.values().map(|c| c.player_id).collect()
    }

    /// Signal the accept loop and every connection to stop.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::hash::hash_seed;
    use crate::game::history::Provenance;
    use crate::proof::verify::{verify_record, RecordVerdict};
    use tokio::time::timeout;

    fn fast_engine() -> EngineConfig {
        EngineConfig {
            commit_delay: Duration::from_millis(150),
            hold_delay: Duration::from_millis(100),
            ..Default::default()
        }
    }

    async fn next_matching(
        rx: &mut broadcast::Receiver<RoundEvent>,
        pred: impl Fn(&RoundEvent) -> bool,
    ) -> RoundEvent {
        timeout(Duration::from_secs(5), async {
            loop {
                match rx.recv().await {
                    Ok(event) if pred(&event) => return event,
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
                }
            }
        })
        .await
        .expect("timed out waiting for event")
    }

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.tick_rate, TICK_RATE);
        assert_eq!(config.max_connections, 1000);
        assert!(config.admin_key.is_none());
        assert_eq!(config.tick_interval(), Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_round_actor_runs_overridden_round() {
        let mut controller = RoundController::new(fast_engine(), Box::new(OsSeedSource));
        controller.set_next_override(Some(1.01)).unwrap();
        let (handle, task) = spawn_round_actor(
            controller,
            Box::new(MemoryStore::new()),
            Duration::from_millis(10),
        );
        let mut events = handle.subscribe();

        let committed = next_matching(&mut events, |e| matches!(e, RoundEvent::Committed { .. })).await;
        let player = PlayerId::random();
        let (round, _bet) = handle.place_bet(player, 100, None).await.unwrap();
        assert_eq!(committed.round(), Some(round));

        let crashed = next_matching(&mut events, |e| matches!(e, RoundEvent::Crashed { .. })).await;
        let RoundEvent::Crashed { crash_point, server_seed, server_hash, provenance, bets_lost, .. } = crashed else {
            unreachable!()
        };
        assert_eq!(crash_point, Multiplier::from_hundredths(101));
        assert_eq!(provenance, Provenance::Overridden);
        assert_eq!(bets_lost, 1);
        assert_eq!(hash_seed(&server_seed), server_hash);

        let history = handle.history(10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert!(matches!(verify_record(&history[0]), RecordVerdict::OperatorForced { .. }));

        let (entries, stats) = handle.audit_log().await.unwrap();
        assert!(!entries.is_empty());
        assert_eq!(stats.total_wagered, 100);

        task.abort();
    }

    #[tokio::test]
    async fn test_round_actor_persists_through_writer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rounds.json");

        let mut controller = RoundController::new(fast_engine(), Box::new(OsSeedSource));
        controller.set_next_override(Some(1.01)).unwrap();
        let (handle, task) = spawn_round_actor(
            controller,
            Box::new(FileStore::new(path.clone())),
            Duration::from_millis(10),
        );
        let mut events = handle.subscribe();
        next_matching(&mut events, |e| matches!(e, RoundEvent::Crashed { .. })).await;

        // Dropping the last handle stops the actor after a final save
        drop(handle);
        timeout(Duration::from_secs(5), task).await.unwrap().unwrap();

        let snapshot = FileStore::new(path).load().unwrap().unwrap();
        let first = snapshot.history.last().unwrap();
        assert_eq!(first.round_id(), RoundId(1));
        assert_eq!(first.crash_point(), Multiplier::from_hundredths(101));
    }

    #[tokio::test]
    async fn test_session_forgets_bets_of_past_rounds() {
        let mut controller = RoundController::new(fast_engine(), Box::new(OsSeedSource));
        controller.set_next_override(Some(1.01)).unwrap();
        let (handle, task) = spawn_round_actor(
            controller,
            Box::new(MemoryStore::new()),
            Duration::from_millis(10),
        );
        let mut events = handle.subscribe();
        let mut session = Session::new(PlayerId::random(), handle.clone(), None);
        let place = ClientMessage::PlaceBet {
            amount: 10,
            auto_cash_out: None,
        };

        next_matching(&mut events, |e| matches!(e, RoundEvent::Committed { .. })).await;
        let ServerMessage::BetAccepted { round: first, bet_id: old_bet } = session.respond(place.clone()).await else {
            panic!("first bet rejected");
        };
        next_matching(&mut events, |e| matches!(e, RoundEvent::Crashed { .. })).await;

        next_matching(&mut events, |e| matches!(e, RoundEvent::Committed { .. })).await;
        let ServerMessage::BetAccepted { round: second, .. } = session.respond(place).await else {
            panic!("second bet rejected");
        };
        assert_ne!(first, second);
        assert_eq!(session.bets_round, second);
        assert_eq!(session.own_bets.len(), 1);
        assert!(!session.own_bets.contains(&old_bet));

        let reply = session.respond(ClientMessage::CashOut { bet_id: old_bet }).await;
        assert!(matches!(reply, ServerMessage::Error(ServerError { code: ErrorCode::BetRejected, .. })));

        task.abort();
    }

    #[tokio::test]
    async fn test_session_admin_gate_and_verify() {
        let controller = RoundController::new(fast_engine(), Box::new(OsSeedSource));
        let (handle, task) = spawn_round_actor(
            controller,
            Box::new(MemoryStore::new()),
            Duration::from_millis(10),
        );
        let mut session = Session::new(PlayerId::random(), handle.clone(), Some("secret".to_string()));

        let reply = session
            .respond(ClientMessage::Admin {
                key: "wrong".to_string(),
                action: AdminAction::SetHouseEdge { percent: 5.0 },
            })
            .await;
        assert!(matches!(reply, ServerMessage::Error(ServerError { code: ErrorCode::Unauthorized, .. })));

        let reply = session
            .respond(ClientMessage::Admin {
                key: "secret".to_string(),
                action: AdminAction::SetHouseEdge { percent: 5.0 },
            })
            .await;
        assert!(matches!(reply, ServerMessage::AdminAck { .. }));
        assert_eq!(handle.status().await.unwrap().house_edge, HouseEdge::new(5.0).unwrap());

        let reply = session
            .respond(ClientMessage::Admin {
                key: "secret".to_string(),
                action: AdminAction::SetHouseEdge { percent: 120.0 },
            })
            .await;
        assert!(matches!(reply, ServerMessage::Error(ServerError { code: ErrorCode::InvalidConfig, .. })));

        let reply = session
            .respond(ClientMessage::Verify {
                server_seed: "test-seed".to_string(),
                house_edge: 3.0,
                server_hash: Some(hash_seed("test-seed")),
            })
            .await;
        let ServerMessage::VerifyResult(info) = reply else {
            panic!("expected verify result, got {:?}", reply);
        };
        assert_eq!(info.crash_point.hundredths(), 595);
        assert_eq!(info.matches_commitment, Some(true));

        // Bets of other connections cannot be cashed out
        let reply = session.respond(ClientMessage::CashOut { bet_id: BetId([1; 16]) }).await;
        assert!(matches!(reply, ServerMessage::Error(ServerError { code: ErrorCode::BetRejected, .. })));

        task.abort();
    }

    #[tokio::test]
    async fn test_server_start_in_memory() {
        let config = ServerConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            ..Default::default()
        };
        let server = RoundServer::start(config).unwrap();
        assert_eq!(server.connection_count().await, 0);
        let status = server.handle().status().await.unwrap();
        assert_eq!(status.house_edge, HouseEdge::default());
        server.shutdown();
    }
}
