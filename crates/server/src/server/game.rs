//! Game state and main loop.
//!
//! One task owns every client and the lobby. Transports talk to it through a
//! [`GameHandle`]; commands and ticks are processed one at a time, so a tick
//! never observes a half-applied intent.

use crate::broadcast::{Audience, Outbox};
use crate::config::Config;
use crate::lobby::{Lobby, LobbyStats};
use crate::payout::{LoggingPrizeService, MatchResult, PayoutHandle, PayoutWorker, PrizeService};
use protocol::{ClientPacket, ServerPacket, SessionId};
use serde::Serialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::client::{Client, Delivery};

/// Requests from transports to the game task.
#[derive(Debug)]
pub enum GameCommand {
    Connect {
        addr: SocketAddr,
        tx: mpsc::Sender<String>,
        reply: oneshot::Sender<SessionId>,
    },
    Packet {
        session: SessionId,
        packet: ClientPacket,
    },
    Disconnect {
        session: SessionId,
    },
    Status {
        reply: oneshot::Sender<ServerStatus>,
    },
    RecentMatches {
        reply: oneshot::Sender<Vec<MatchResult>>,
    },
}

/// Snapshot for the status endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerStatus {
    pub version: &'static str,
    pub uptime_secs: u64,
    pub connections: usize,
    pub tick: u64,
    pub tick_avg_ms: f64,
    #[serde(flatten)]
    pub lobby: LobbyStats,
}

/// Cloneable sender side of the game task.
#[derive(Debug, Clone)]
pub struct GameHandle {
    tx: mpsc::UnboundedSender<GameCommand>,
    outbound_queue: usize,
}

impl GameHandle {
    /// Bounded queue for one connection's outbound frames.
    pub fn outbound_channel(&self) -> (mpsc::Sender<String>, mpsc::Receiver<String>) {
        mpsc::channel(self.outbound_queue.max(1))
    }

    /// Register a connection. Frames for it arrive on `tx`.
    pub async fn connect(
        &self,
        addr: SocketAddr,
        tx: mpsc::Sender<String>,
    ) -> anyhow::Result<SessionId> {
        let (reply, rx) = oneshot::channel();
        self.send(GameCommand::Connect { addr, tx, reply })?;
        Ok(rx.await?)
    }

    /// Parse one inbound text frame and forward it. Malformed frames are
    /// answered with an `error` event on `reply` and go no further.
    pub fn handle_text(&self, session: SessionId, text: &str, reply: &mpsc::WeakSender<String>) {
        match ClientPacket::parse(text) {
            Ok(packet) => {
                if let Err(e) = self.send(GameCommand::Packet { session, packet }) {
                    warn!("Dropping packet from {}: {}", session, e);
                }
            }
            Err(e) => {
                warn!("Bad frame from {}: {}", session, e);
                match ServerPacket::error(e.to_string()).encode() {
                    Ok(frame) => {
                        let Some(reply) = reply.upgrade() else {
                            return;
                        };
                        if reply.try_send(frame).is_err() {
                            debug!("Error frame for {} dropped, queue full", session);
                        }
                    }
                    Err(e) => error!("Failed to encode error frame: {}", e),
                }
            }
        }
    }

    pub fn disconnect(&self, session: SessionId) {
        let _ = self.send(GameCommand::Disconnect { session });
    }

    pub async fn status(&self) -> anyhow::Result<ServerStatus> {
        let (reply, rx) = oneshot::channel();
        self.send(GameCommand::Status { reply })?;
        Ok(rx.await?)
    }

    pub async fn recent_matches(&self) -> anyhow::Result<Vec<MatchResult>> {
        let (reply, rx) = oneshot::channel();
        self.send(GameCommand::RecentMatches { reply })?;
        Ok(rx.await?)
    }

    fn send(&self, command: GameCommand) -> anyhow::Result<()> {
        self.tx
            .send(command)
            .map_err(|_| anyhow::anyhow!("game loop is not running"))
    }
}

/// Main game state.
pub struct GameState {
    pub config: Arc<Config>,
    pub lobby: Lobby,
    pub clients: HashMap<SessionId, Client>,
    pub tick_count: u64,
    pub start_time: Instant,
    /// Average tick duration in milliseconds (exponential moving average).
    pub update_time_avg: f64,
    next_session: u32,
    payouts: PayoutHandle,
    out: Outbox,
}

impl GameState {
    pub fn new(config: Arc<Config>, payouts: PayoutHandle) -> Self {
        Self {
            lobby: Lobby::new(Arc::clone(&config)),
            config,
            clients: HashMap::new(),
            tick_count: 0,
            start_time: Instant::now(),
            update_time_avg: 0.0,
            next_session: 1,
            payouts,
            out: Outbox::new(),
        }
    }

    /// Milliseconds since the game task started. All room clocks use this.
    pub fn now_ms(&self) -> u64 {
        self.start_time.elapsed().as_millis() as u64
    }

    pub fn add_client(&mut self, addr: SocketAddr, tx: mpsc::Sender<String>) -> SessionId {
        let id = SessionId(self.next_session);
        self.next_session += 1;
        self.clients.insert(id, Client::new(id, addr, tx));
        info!("Client {} connected from {}", id, addr);
        id
    }

    pub fn remove_client(&mut self, id: SessionId) {
        if let Some(client) = self.clients.remove(&id) {
            info!(
                "Client {} ({}) disconnected after {:?}",
                id,
                client.addr,
                client.connected_at.elapsed()
            );
        }
        let now = self.now_ms();
        self.lobby.disconnect(id, now, &mut self.out);
        self.flush();
    }

    pub fn handle_packet(&mut self, id: SessionId, packet: ClientPacket) {
        let Some(client) = self.clients.get_mut(&id) else {
            return;
        };
        client.touch();

        let event = packet.event_name();
        let now = self.now_ms();
        if let Err(e) = self.lobby.handle_packet(id, packet, now, &mut self.out) {
            debug!("Client {} {} rejected: {}", id, event, e);
            self.out.to(id, ServerPacket::error(e.to_string()));
        }
        self.flush();
    }

    pub fn handle_command(&mut self, command: GameCommand) {
        match command {
            GameCommand::Connect { addr, tx, reply } => {
                let id = self.add_client(addr, tx);
                if reply.send(id).is_err() {
                    self.remove_client(id);
                }
            }
            GameCommand::Packet { session, packet } => self.handle_packet(session, packet),
            GameCommand::Disconnect { session } => self.remove_client(session),
            GameCommand::Status { reply } => {
                let _ = reply.send(self.status());
            }
            GameCommand::RecentMatches { reply } => {
                let _ = reply.send(self.lobby.recent_matches().cloned().collect());
            }
        }
    }

    /// Advance every room and hand finished matches to the payout worker.
    pub fn tick(&mut self) {
        self.tick_count += 1;
        let now = self.now_ms();
        for result in self.lobby.tick(now, &mut self.out) {
            self.payouts.submit(result);
        }
        self.flush();
    }

    pub fn status(&self) -> ServerStatus {
        ServerStatus {
            version: env!("CARGO_PKG_VERSION"),
            uptime_secs: self.start_time.elapsed().as_secs(),
            connections: self.clients.len(),
            tick: self.tick_count,
            tick_avg_ms: self.update_time_avg,
            lobby: self.lobby.stats(),
        }
    }

    /// Encode each pending packet once and queue it for its recipients.
    /// Clients whose queue cannot take a non-snapshot frame are dropped.
    fn flush(&mut self) {
        let mut evicted = Vec::new();
        for envelope in self.out.drain() {
            let frame = match envelope.packet.encode() {
                Ok(frame) => frame,
                Err(e) => {
                    error!("Failed to encode {}: {}", envelope.packet.event_name(), e);
                    continue;
                }
            };
            let snapshot = matches!(envelope.packet, ServerPacket::StateUpdate(_));
            match envelope.audience {
                Audience::Session(id) => {
                    deliver(&mut self.clients, id, frame, snapshot, &mut evicted);
                }
                Audience::Sessions(ids) => {
                    for id in ids {
                        deliver(&mut self.clients, id, frame.clone(), snapshot, &mut evicted);
                    }
                }
            }
        }
        for id in evicted {
            self.remove_client(id);
        }
    }
}

fn deliver(
    clients: &mut HashMap<SessionId, Client>,
    id: SessionId,
    frame: String,
    snapshot: bool,
    evicted: &mut Vec<SessionId>,
) {
    let Some(client) = clients.get_mut(&id) else {
        return;
    };
    match client.send(frame, snapshot) {
        Delivery::Queued => {}
        Delivery::Skipped => {
            if client.skipped % 100 == 1 {
                debug!("Client {} is behind, {} snapshots skipped", id, client.skipped);
            }
        }
        Delivery::Overflow => {
            warn!("Client {} ({}) stopped reading, disconnecting", id, client.addr);
            evicted.push(id);
        }
        Delivery::Closed => evicted.push(id),
    }
}

/// Start the game task with the logging prize service.
pub fn spawn_game(config: Config) -> GameHandle {
    spawn_game_with(config, LoggingPrizeService)
}

/// Start the game task with a custom prize service.
pub fn spawn_game_with<P: PrizeService>(config: Config, service: P) -> GameHandle {
    let payouts = PayoutWorker::new(service).spawn();
    let (tx, rx) = mpsc::unbounded_channel();
    let outbound_queue = config.server.outbound_queue;
    let state = GameState::new(Arc::new(config), payouts);
    tokio::spawn(run_game_loop(state, rx));
    GameHandle { tx, outbound_queue }
}

/// Run the main game loop until every handle is dropped.
pub async fn run_game_loop(mut state: GameState, mut rx: mpsc::UnboundedReceiver<GameCommand>) {
    let tick_interval_ms = state.config.server.tick_interval_ms.max(1);
    let start = Instant::now() + Duration::from_millis(tick_interval_ms);
    let mut ticker = interval_at(start, Duration::from_millis(tick_interval_ms));
    // Skip missed ticks; room timers work off the wall clock anyway.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!("Game loop running at {}ms per tick", tick_interval_ms);

    loop {
        tokio::select! {
            command = rx.recv() => match command {
                Some(command) => state.handle_command(command),
                None => break,
            },
            _ = ticker.tick() => {
                let tick_start = std::time::Instant::now();
                state.tick();
                let tick_ms = tick_start.elapsed().as_secs_f64() * 1000.0;
                state.update_time_avg = state.update_time_avg * 0.5 + tick_ms * 0.5;

                let tick_budget = tick_interval_ms as f64 * 0.9;
                if tick_ms > tick_budget {
                    let stats = state.lobby.stats();
                    warn!(
                        "Slow tick #{}: {:.3}ms (budget: {:.1}ms) - {} rooms, {} players",
                        state.tick_count, tick_ms, tick_budget, stats.rooms, stats.players
                    );
                }
                if state.tick_count % 1200 == 0 {
                    debug!("Tick #{}: avg {:.3}ms", state.tick_count, state.update_time_avg);
                }
            }
        }
    }
    info!("Game loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::packets::StateUpdate;
    use protocol::RoomId;

    fn state() -> GameState {
        let mut config = Config::default();
        config.server.rng_seed = Some(3);
        config.room.min_players = 3;
        GameState::new(Arc::new(config), PayoutWorker::new(LoggingPrizeService).spawn())
    }

    fn join(name: &str) -> ClientPacket {
        ClientPacket::Join {
            name: name.into(),
            wallet: None,
        }
    }

    #[tokio::test]
    async fn test_client_that_stops_reading_is_dropped() {
        let mut state = state();
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();

        // Room for exactly `joined` and the first `waitingRoomUpdate`.
        let (stalled_tx, _stalled_rx) = mpsc::channel(2);
        let stalled = state.add_client(addr, stalled_tx);
        let (tx, mut rx) = mpsc::channel(16);
        let reader = state.add_client(addr, tx);

        state.handle_packet(stalled, join("slow"));
        assert!(state.lobby.room_of(stalled).is_some());

        state.handle_packet(reader, join("quick"));
        assert!(!state.clients.contains_key(&stalled));
        assert_eq!(state.lobby.room_of(stalled), None);
        assert!(state.lobby.room_of(reader).is_some());

        let mut last = None;
        while let Ok(frame) = rx.try_recv() {
            last = Some(ServerPacket::decode(&frame).unwrap());
        }
        let Some(ServerPacket::WaitingRoomUpdate { members, .. }) = last else {
            panic!("expected a waiting room update, got {:?}", last);
        };
        assert_eq!(members.len(), 1);
    }

    #[tokio::test]
    async fn test_snapshots_are_skipped_not_fatal() {
        let mut state = state();
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        let (tx, _rx) = mpsc::channel(1);
        let id = state.add_client(addr, tx);

        state.out.to(id, ServerPacket::error("first"));
        state.flush();
        let snapshot = StateUpdate {
            room_id: RoomId(1),
            tick: 1,
            players: Vec::new(),
            food: Vec::new(),
            projectiles: Vec::new(),
        };
        state.out.to(id, ServerPacket::StateUpdate(snapshot));
        state.flush();

        let client = state.clients.get(&id).unwrap();
        assert_eq!(client.skipped, 1);
    }
}
