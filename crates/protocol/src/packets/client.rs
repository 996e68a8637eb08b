//! Client -> Server packet parsing.

use crate::{EntityId, ProtocolError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::MAX_CLIENT_FRAME;

/// Parsed client intent.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientPacket {
    /// Ask to be admitted to a waiting room.
    Join {
        name: String,
        /// Opaque wallet reference from the identity service.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        wallet: Option<String>,
    },
    /// Movement direction or target, consumed by the next tick.
    Move(MoveIntent),
    /// Split the primary body into two halves.
    Split {},
    /// Eject a blob of mass in the current heading.
    Eject {},
    /// Fire a laser in the given direction.
    Shoot { dx: f32, dz: f32 },
    /// Leave the room before the match starts.
    LeaveWaitingRoom {},
    /// Client-reported score. Parsed only so it can be refused.
    UpdateScore { id: EntityId, score: f64 },
}

/// Payload of a `move` intent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MoveIntent {
    /// Steer in a direction (need not be normalized).
    Direction { dx: f32, dz: f32 },
    /// Steer toward an absolute point on the plane.
    Target { x: f32, z: f32 },
}

#[derive(Deserialize)]
struct RawFrame {
    event: String,
    #[serde(default)]
    data: Value,
}

#[derive(Deserialize)]
struct JoinData {
    name: String,
    #[serde(default)]
    wallet: Option<String>,
}

#[derive(Deserialize)]
struct ShootData {
    dx: f32,
    dz: f32,
}

#[derive(Deserialize)]
struct ScoreData {
    id: EntityId,
    score: f64,
}

/// Numbers past the `f32` range, such as `1e39`, narrow to infinity.
fn finite(field: &'static str, value: f32) -> Result<f32, ProtocolError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ProtocolError::NonFinite(field))
    }
}

fn payload<T: DeserializeOwned>(data: Value) -> Result<T, ProtocolError> {
    // `{"event":"split"}` and `{"event":"split","data":null}` both mean "no payload".
    let data = if data.is_null() {
        Value::Object(Default::default())
    } else {
        data
    };
    serde_json::from_value(data).map_err(ProtocolError::Malformed)
}

impl ClientPacket {
    /// Parse a client packet from a text frame.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        if text.len() > MAX_CLIENT_FRAME {
            return Err(ProtocolError::TooLarge(text.len()));
        }

        let raw: RawFrame = serde_json::from_str(text).map_err(ProtocolError::Malformed)?;

        match raw.event.as_str() {
            "join" => {
                let JoinData { name, wallet } = payload(raw.data)?;
                Ok(ClientPacket::Join { name, wallet })
            }
            "move" => match payload(raw.data)? {
                MoveIntent::Direction { dx, dz } => Ok(ClientPacket::Move(MoveIntent::Direction {
                    dx: finite("dx", dx)?,
                    dz: finite("dz", dz)?,
                })),
                MoveIntent::Target { x, z } => Ok(ClientPacket::Move(MoveIntent::Target {
                    x: finite("x", x)?,
                    z: finite("z", z)?,
                })),
            },
            "split" => Ok(ClientPacket::Split {}),
            "eject" => Ok(ClientPacket::Eject {}),
            "shoot" => {
                let ShootData { dx, dz } = payload(raw.data)?;
                Ok(ClientPacket::Shoot {
                    dx: finite("dx", dx)?,
                    dz: finite("dz", dz)?,
                })
            }
            "leaveWaitingRoom" => Ok(ClientPacket::LeaveWaitingRoom {}),
            "updateScore" => {
                let ScoreData { id, score } = payload(raw.data)?;
                Ok(ClientPacket::UpdateScore { id, score })
            }
            _ => Err(ProtocolError::UnknownEvent(raw.event)),
        }
    }

    /// Encode as a text frame (used by clients and tests).
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }

    /// Event name, for logging.
    pub fn event_name(&self) -> &'static str {
        match self {
            ClientPacket::Join { .. } => "join",
            ClientPacket::Move(_) => "move",
            ClientPacket::Split {} => "split",
            ClientPacket::Eject {} => "eject",
            ClientPacket::Shoot { .. } => "shoot",
            ClientPacket::LeaveWaitingRoom {} => "leaveWaitingRoom",
            ClientPacket::UpdateScore { .. } => "updateScore",
        }
    }
}
