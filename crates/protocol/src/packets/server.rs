//! Server -> Client packet building.

use crate::{EntityId, ProtocolError, RoomId, SessionId};
use serde::{Deserialize, Serialize};

/// Server event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerPacket {
    /// Reply to a successful join.
    #[serde(rename_all = "camelCase")]
    Joined {
        session_id: SessionId,
        room_id: RoomId,
        name: String,
    },
    /// Current members of a room that has not started yet.
    #[serde(rename_all = "camelCase")]
    WaitingRoomUpdate {
        room_id: RoomId,
        members: Vec<MemberWire>,
    },
    /// The countdown was cancelled; more players are needed.
    #[serde(rename_all = "camelCase")]
    WaitingForPlayers {
        room_id: RoomId,
        current: usize,
        required: usize,
    },
    /// One countdown step.
    #[serde(rename_all = "camelCase")]
    StartGameCountdown {
        room_id: RoomId,
        seconds_remaining: u32,
    },
    /// Session manifest, delivered to each member when the match starts.
    #[serde(rename_all = "camelCase")]
    GameStart {
        room_id: RoomId,
        self_id: Option<EntityId>,
        players: Vec<PlayerWire>,
    },
    /// Authoritative snapshot of a room.
    StateUpdate(StateUpdate),
    /// Top players by score.
    #[serde(rename_all = "camelCase")]
    UpdateLeaderboard {
        room_id: RoomId,
        entries: Vec<LeaderboardWire>,
    },
    /// A player was eliminated.
    PlayerEaten {
        id: EntityId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        by: Option<EntityId>,
    },
    /// An entity left the room (disconnect, merge, expired fragment).
    RemovePlayer { id: EntityId },
    /// The match is over; final standings.
    #[serde(rename_all = "camelCase")]
    GameOver {
        room_id: RoomId,
        ranking: Vec<LeaderboardWire>,
    },
    /// Validation failure for the acting connection.
    Error { message: String },
}

/// A waiting room member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberWire {
    pub session_id: SessionId,
    pub name: String,
}

/// Kind tag for player-like bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BodyKindWire {
    Player,
    Fragment,
    Boss,
}

/// A player-like body on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerWire {
    pub id: EntityId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    pub name: String,
    pub x: f32,
    pub z: f32,
    pub size: f32,
    pub score: u64,
    pub skin: String,
    pub kind: BodyKindWire,
    /// Origin body of a split fragment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<EntityId>,
    #[serde(default)]
    pub recently_hit: bool,
}

/// An active food item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodWire {
    pub id: EntityId,
    pub x: f32,
    pub z: f32,
    /// Hue in degrees, for the client's color.
    pub hue: u16,
}

/// Kind tag for projectiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProjectileKindWire {
    Mass,
    Laser,
}

/// A projectile in flight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectileWire {
    pub id: EntityId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<EntityId>,
    pub x: f32,
    pub z: f32,
    pub vx: f32,
    pub vz: f32,
    pub kind: ProjectileKindWire,
}

/// Full room snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateUpdate {
    pub room_id: RoomId,
    /// Monotonic per-room tick number.
    pub tick: u64,
    pub players: Vec<PlayerWire>,
    pub food: Vec<FoodWire>,
    pub projectiles: Vec<ProjectileWire>,
}

/// A leaderboard row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardWire {
    pub id: EntityId,
    pub name: String,
    pub score: u64,
}

/// Round to two decimals; positions do not need more on the wire.
#[inline]
pub fn round2(v: f32) -> f32 {
    (v * 100.0).round() / 100.0
}

impl ServerPacket {
    /// Build an `error` packet.
    pub fn error(message: impl Into<String>) -> Self {
        ServerPacket::Error {
            message: message.into(),
        }
    }

    /// Encode as a text frame.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }

    /// Decode a text frame (used by clients and tests).
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(ProtocolError::Malformed)
    }

    /// Event name, for logging.
    pub fn event_name(&self) -> &'static str {
        match self {
            ServerPacket::Joined { .. } => "joined",
            ServerPacket::WaitingRoomUpdate { .. } => "waitingRoomUpdate",
            ServerPacket::WaitingForPlayers { .. } => "waitingForPlayers",
            ServerPacket::StartGameCountdown { .. } => "startGameCountdown",
            ServerPacket::GameStart { .. } => "gameStart",
            ServerPacket::StateUpdate(_) => "stateUpdate",
            ServerPacket::UpdateLeaderboard { .. } => "updateLeaderboard",
            ServerPacket::PlayerEaten { .. } => "playerEaten",
            ServerPacket::RemovePlayer { .. } => "removePlayer",
            ServerPacket::GameOver { .. } => "gameOver",
            ServerPacket::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_countdown_wire_shape() {
        let packet = ServerPacket::StartGameCountdown {
            room_id: RoomId(3),
            seconds_remaining: 4,
        };
        let value: serde_json::Value = serde_json::from_str(&packet.encode().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"event": "startGameCountdown", "data": {"roomId": 3, "secondsRemaining": 4}})
        );
    }

    #[test]
    fn test_state_update_wire_shape() {
        let packet = ServerPacket::StateUpdate(StateUpdate {
            room_id: RoomId(1),
            tick: 7,
            players: vec![PlayerWire {
                id: EntityId(2),
                session_id: Some(SessionId(9)),
                name: "bob".into(),
                x: 1.5,
                z: -2.0,
                size: 40.0,
                score: 10,
                skin: "textures/playerSkin1.png".into(),
                kind: BodyKindWire::Player,
                origin: None,
                recently_hit: false,
            }],
            food: vec![FoodWire {
                id: EntityId(3),
                x: 0.0,
                z: 0.0,
                hue: 120,
            }],
            projectiles: vec![],
        });
        let value: serde_json::Value = serde_json::from_str(&packet.encode().unwrap()).unwrap();
        assert_eq!(value["event"], "stateUpdate");
        assert_eq!(value["data"]["tick"], 7);
        assert_eq!(value["data"]["players"][0]["sessionId"], 9);
        assert_eq!(value["data"]["players"][0]["kind"], "player");
        assert!(value["data"]["players"][0].get("origin").is_none());
        assert_eq!(value["data"]["food"][0]["hue"], 120);
    }

    #[test]
    fn test_error_decodes() {
        let text = ServerPacket::error("Invalid username").encode().unwrap();
        assert_eq!(
            ServerPacket::decode(&text).unwrap(),
            ServerPacket::Error {
                message: "Invalid username".into()
            }
        );
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(1.23456), 1.23);
        assert_eq!(round2(-3.14159), -3.14);
    }
}
