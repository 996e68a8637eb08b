//! End-to-end tests over a real WebSocket listener.

use futures_util::{SinkExt, StreamExt};
use protocol::{EntityId, ServerPacket};
use server::Config;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

fn fast_config() -> Config {
    let mut config = Config::default();
    config.server.tick_interval_ms = 20;
    config.server.rng_seed = Some(1);
    config.room.grace_ms = 0;
    config.room.countdown_seconds = 2;
    config.room.countdown_step_ms = 50;
    config.food.target = 10;
    config
}

async fn start() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(server::serve(listener, fast_config()));
    format!("ws://{}", addr)
}

async fn connect(url: &str) -> Ws {
    let (ws, _) = connect_async(url).await.unwrap();
    ws
}

async fn send(ws: &mut Ws, frame: &str) {
    ws.send(Message::Text(frame.into())).await.unwrap();
}

async fn next_event(ws: &mut Ws) -> ServerPacket {
    loop {
        let msg = timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for a frame")
            .unwrap()
            .unwrap();
        if let Message::Text(text) = msg {
            return ServerPacket::decode(text.as_str()).unwrap();
        }
    }
}

async fn wait_for(ws: &mut Ws, wanted: impl Fn(&ServerPacket) -> bool) -> ServerPacket {
    loop {
        let packet = next_event(ws).await;
        if wanted(&packet) {
            return packet;
        }
    }
}

#[tokio::test]
async fn test_two_clients_play_a_match() {
    let url = start().await;
    let mut alice = connect(&url).await;
    let mut bob = connect(&url).await;

    send(&mut alice, r#"{"event":"join","data":{"name":"alice"}}"#).await;
    let joined = next_event(&mut alice).await;
    assert!(matches!(joined, ServerPacket::Joined { ref name, .. } if name == "alice"));
    send(&mut bob, r#"{"event":"join","data":{"name":"alice"}}"#).await;
    let joined = next_event(&mut bob).await;
    assert!(matches!(joined, ServerPacket::Joined { ref name, .. } if name == "alice1"));

    let mut self_ids: Vec<Option<EntityId>> = Vec::new();
    for ws in [&mut alice, &mut bob] {
        let start = wait_for(ws, |p| matches!(p, ServerPacket::GameStart { .. })).await;
        let ServerPacket::GameStart { self_id, players, .. } = start else {
            unreachable!()
        };
        assert_eq!(players.len(), 2);
        self_ids.push(self_id);
    }
    assert!(self_ids.iter().all(Option::is_some));
    assert_ne!(self_ids[0], self_ids[1]);

    send(&mut alice, r#"{"event":"move","data":{"dx":1,"dz":0}}"#).await;
    let update = wait_for(&mut alice, |p| {
        matches!(p, ServerPacket::StateUpdate(update) if update.tick > 2)
    })
    .await;
    let ServerPacket::StateUpdate(update) = update else {
        unreachable!()
    };
    assert_eq!(update.players.len(), 2);
    assert_eq!(update.food.len(), 10);
}

#[tokio::test]
async fn test_bad_frames_are_answered_with_errors() {
    let url = start().await;
    let mut ws = connect(&url).await;

    send(&mut ws, "not json").await;
    assert!(matches!(next_event(&mut ws).await, ServerPacket::Error { .. }));

    send(&mut ws, r#"{"event":"dance","data":{}}"#).await;
    assert!(matches!(next_event(&mut ws).await, ServerPacket::Error { .. }));

    send(&mut ws, r#"{"event":"join","data":{"name":"!!!"}}"#).await;
    let ServerPacket::Error { message } = next_event(&mut ws).await else {
        panic!("expected an error");
    };
    assert_eq!(message, "Invalid username");

    send(&mut ws, r#"{"event":"split"}"#).await;
    assert!(matches!(next_event(&mut ws).await, ServerPacket::Error { .. }));
}

#[tokio::test]
async fn test_client_score_is_refused() {
    let url = start().await;
    let mut ws = connect(&url).await;

    send(&mut ws, r#"{"event":"join","data":{"name":"carol"}}"#).await;
    wait_for(&mut ws, |p| matches!(p, ServerPacket::WaitingRoomUpdate { .. })).await;

    send(&mut ws, r#"{"event":"updateScore","data":{"id":1,"score":1000000}}"#).await;
    let error = wait_for(&mut ws, |p| matches!(p, ServerPacket::Error { .. })).await;
    assert!(matches!(error, ServerPacket::Error { message } if message.contains("computed by the server")));
}
