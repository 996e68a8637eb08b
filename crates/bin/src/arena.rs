//! Arena - match server with HTTP status endpoints.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    http::{HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use server::server::WRITE_TIMEOUT;
use server::{ConnectionState, GameHandle};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::timeout;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Clone)]
struct AppState {
    game: GameHandle,
    connections: Arc<RwLock<ConnectionState>>,
    max_connections: usize,
    ip_limit: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,server=debug")),
        )
        .init();

    info!("Arena Server v{}", env!("CARGO_PKG_VERSION"));

    let config = server::Config::load()?;
    info!("Loaded configuration");
    config.log_summary();

    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;
    let cors = cors_layer(&config.server.allowed_origins);
    let state = AppState {
        connections: Arc::new(RwLock::new(ConnectionState::new())),
        max_connections: config.server.max_connections,
        ip_limit: config.server.ip_limit,
        game: server::spawn_game(config),
    };

    let app = Router::new()
        .route("/game", get(websocket_handler))
        .route("/status", get(status_handler))
        .route("/matches", get(matches_handler))
        .layer(ServiceBuilder::new().layer(cors))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server running on http://{}", addr);
    info!("Game WebSocket endpoint: ws://{}/game", addr);

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}

/// CORS for the configured origins; permissive when none are configured.
fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET])
        .allow_headers(Any)
}

async fn status_handler(State(state): State<AppState>) -> Response {
    match state.game.status().await {
        Ok(status) => Json(status).into_response(),
        Err(e) => {
            error!("Status query failed: {}", e);
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
    }
}

async fn matches_handler(State(state): State<AppState>) -> Response {
    match state.game.recent_matches().await {
        Ok(matches) => Json(matches).into_response(),
        Err(e) => {
            error!("Match query failed: {}", e);
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
    }
}

/// Handle WebSocket connections for the game
async fn websocket_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> Response {
    let admitted = state.connections.write().await.try_add_connection(
        addr.ip(),
        state.max_connections,
        state.ip_limit,
    );
    if !admitted {
        warn!("Connection rejected (limit reached): {}", addr);
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    ws.on_upgrade(move |socket| async move {
        if let Err(e) = handle_game_connection(socket, addr, state.game).await {
            error!("Connection error from {}: {}", addr, e);
        }
        state.connections.write().await.remove_connection(addr.ip());
    })
}

/// Pump frames between an axum WebSocket and the game task.
async fn handle_game_connection(
    socket: WebSocket,
    addr: SocketAddr,
    game: GameHandle,
) -> anyhow::Result<()> {
    info!("New game connection from {}", addr);
    let (mut write, mut read) = socket.split();
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
