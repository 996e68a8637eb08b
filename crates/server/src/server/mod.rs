//! WebSocket gateway.

use crate::config::Config;
use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::RwLock;
use tokio::time::timeout;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{error, info, warn};

pub mod client;
pub mod game;

/// Longest a single socket write may block a connection.
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

pub use game::{
    run_game_loop, spawn_game, spawn_game_with, GameCommand, GameHandle, GameState, ServerStatus,
};

/// Connection tracking state (shared across connection handlers).
#[derive(Debug, Default)]
pub struct ConnectionState {
    /// Number of connections per IP address.
    ip_connections: HashMap<IpAddr, usize>,
    /// Total number of connections.
    total_connections: usize,
}

impl ConnectionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to add a connection, returns true if allowed.
    pub fn try_add_connection(&mut self, ip: IpAddr, max_total: usize, max_per_ip: usize) -> bool {
        if self.total_connections >= max_total {
            return false;
        }
        let current = self.ip_connections.get(&ip).copied().unwrap_or(0);
        if current >= max_per_ip {
            return false;
        }

        *self.ip_connections.entry(ip).or_insert(0) += 1;
        self.total_connections += 1;
        true
    }

    /// Remove a connection.
    pub fn remove_connection(&mut self, ip: IpAddr) {
        if let Some(count) = self.ip_connections.get_mut(&ip) {
            if *count > 0 {
                *count -= 1;
                self.total_connections = self.total_connections.saturating_sub(1);
            }
            if *count == 0 {
                self.ip_connections.remove(&ip);
            }
        }
    }

    pub fn total(&self) -> usize {
        self.total_connections
    }
}

/// Run the game server on the configured address.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;
    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on ws://{}", addr);
    serve(listener, config).await
}

/// Accept WebSocket connections on an already bound listener.
pub async fn serve(listener: TcpListener, config: Config) -> anyhow::Result<()> {
    let max_connections = config.server.max_connections;
    let ip_limit = config.server.ip_limit;
    let game = spawn_game(config);
    let conn_state = Arc::new(RwLock::new(ConnectionState::new()));

    loop {
        let (stream, addr) = listener.accept().await?;
        let ip = addr.ip();

        if !conn_state
            .write()
            .await
            .try_add_connection(ip, max_connections, ip_limit)
        {
            warn!("Connection rejected (limit reached): {}", addr);
            continue;
        }

        let game = game.clone();
        let conn_state = Arc::clone(&conn_state);
        tokio::spawn(async move {
            let result = handle_connection(stream, addr, game).await;

            // Always remove from connection tracking when done
            conn_state.write().await.remove_connection(ip);

            if let Err(e) = result {
                error!("Connection error from {}: {}", addr, e);
            }
        });
    }
}

/// Handle a single WebSocket connection.
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    game: GameHandle,
) -> anyhow::Result<()> {
    let ws_stream = accept_async(stream).await?;
    info!("New connection from {}", addr);

    let (mut write, mut read) = ws_stream.split();
    let (tx, mut rx) = game.outbound_channel();
    // Only the game task holds a strong sender, so eviction ends this loop.
    let reply = tx.downgrade();
    let session = game.connect(addr, tx).await?;

    loop {
        tokio::select! {
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => game.handle_text(session, text.as_str(), &reply),
                    Some(Ok(Message::Close(_))) => {
                        info!("Client {} disconnected", addr);
                        break;
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket error from {}: {}", addr, e);
                        break;
                    }
                    None => break,
                    _ => {}
                }
            }
            frame = rx.recv() => {
                let Some(frame) = frame else { break };
                match timeout(WRITE_TIMEOUT, write.send(Message::Text(frame.into()))).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        warn!("Failed to send to {}: {}", addr, e);
                        break;
                    }
                    Err(_) => {
                        warn!("Write to {} timed out", addr);
                        break;
                    }
                }
            }
        }
    }

    game.disconnect(session);
    Ok(())
}
