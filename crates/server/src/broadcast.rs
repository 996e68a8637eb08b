//! Outbound event routing.
//!
//! Rooms never touch sockets. Each handler appends [`Envelope`]s to an
//! [`Outbox`] synchronously, and the game loop delivers them in order once
//! the handler returns, so a client sees snapshots in tick order.

use crate::store::EntityStore;
use protocol::packets::{LeaderboardWire, StateUpdate};
use protocol::{RoomId, ServerPacket, SessionId};

/// Who receives a packet.
#[derive(Debug, Clone, PartialEq)]
pub enum Audience {
    Session(SessionId),
    Sessions(Vec<SessionId>),
}

impl Audience {
    pub fn contains(&self, session: SessionId) -> bool {
        match self {
            Audience::Session(s) => *s == session,
            Audience::Sessions(all) => all.contains(&session),
        }
    }
}

/// A packet and its recipients.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub audience: Audience,
    pub packet: ServerPacket,
}

/// Ordered list of pending packets.
#[derive(Debug, Default)]
pub struct Outbox {
    envelopes: Vec<Envelope>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a packet for one session.
    pub fn to(&mut self, session: SessionId, packet: ServerPacket) {
        self.envelopes.push(Envelope {
            audience: Audience::Session(session),
            packet,
        });
    }

    /// Queue a packet for a group. Nothing is queued for an empty group.
    pub fn to_all(&mut self, sessions: impl IntoIterator<Item = SessionId>, packet: ServerPacket) {
        let sessions: Vec<SessionId> = sessions.into_iter().collect();
        if sessions.is_empty() {
            return;
        }
        self.envelopes.push(Envelope {
            audience: Audience::Sessions(sessions),
            packet,
        });
    }

    pub fn drain(&mut self) -> impl Iterator<Item = Envelope> + '_ {
        self.envelopes.drain(..)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Envelope> {
        self.envelopes.iter()
    }

    /// Packets a given session would receive, in order.
    pub fn packets_for(&self, session: SessionId) -> impl Iterator<Item = &ServerPacket> {
        self.envelopes
            .iter()
            .filter(move |e| e.audience.contains(session))
            .map(|e| &e.packet)
    }

    pub fn len(&self) -> usize {
        self.envelopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.envelopes.is_empty()
    }

    pub fn clear(&mut self) {
        self.envelopes.clear();
    }
}

/// Full snapshot of a room, in insertion order. Only active food is listed.
pub fn snapshot(room_id: RoomId, tick: u64, store: &EntityStore) -> StateUpdate {
    StateUpdate {
        room_id,
        tick,
        players: store.players.iter().map(|p| p.to_wire()).collect(),
        food: store
            .food
            .iter()
            .filter(|f| f.is_active())
            .map(|f| f.to_wire())
            .collect(),
        projectiles: store.projectiles.iter().map(|p| p.to_wire()).collect(),
    }
}

/// Named primary bodies by score, highest first, truncated to `limit`.
/// Ties keep insertion order.
pub fn leaderboard(store: &EntityStore, limit: usize) -> Vec<LeaderboardWire> {
    let mut entries: Vec<LeaderboardWire> = store
        .players
        .iter()
        .filter(|p| p.is_primary() && !p.name.is_empty())
        .map(|p| LeaderboardWire {
            id: p.id,
            name: p.name.clone(),
            score: p.score,
        })
        .collect();
    entries.sort_by(|a, b| b.score.cmp(&a.score));
    entries.truncate(limit);
    entries
}
