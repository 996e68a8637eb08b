//! Room registry and session routing.
//!
//! The lobby places joining sessions into rooms, forwards intents to the room
//! a session belongs to, and tears rooms down once their match is over.

use crate::broadcast::Outbox;
use crate::config::Config;
use crate::error::GameError;
use crate::payout::MatchResult;
use crate::room::{names, Room, RoomPhase};
use protocol::{ClientPacket, RoomId, SessionId};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, info};

/// Room counts for the status endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbyStats {
    pub rooms: usize,
    pub waiting: usize,
    pub active: usize,
    pub players: usize,
}

pub struct Lobby {
    config: Arc<Config>,
    rooms: BTreeMap<RoomId, Room>,
    sessions: HashMap<SessionId, RoomId>,
    rng: StdRng,
    next_room: u32,
    recent: VecDeque<MatchResult>,
}

impl Lobby {
    pub fn new(config: Arc<Config>) -> Self {
        let rng = match config.server.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            config,
            rooms: BTreeMap::new(),
            sessions: HashMap::new(),
            rng,
            next_room: 1,
            recent: VecDeque::new(),
        }
    }

    pub fn room(&self, id: RoomId) -> Option<&Room> {
        self.rooms.get(&id)
    }

    pub fn room_of(&self, session: SessionId) -> Option<RoomId> {
        self.sessions.get(&session).copied()
    }

    pub fn rooms(&self) -> impl Iterator<Item = &Room> {
        self.rooms.values()
    }

    /// Finished matches, newest last.
    pub fn recent_matches(&self) -> impl Iterator<Item = &MatchResult> {
        self.recent.iter()
    }

    pub fn stats(&self) -> LobbyStats {
        let mut stats = LobbyStats {
            rooms: self.rooms.len(),
            players: self.sessions.len(),
            ..Default::default()
        };
        for room in self.rooms.values() {
            match room.phase() {
                RoomPhase::Waiting { .. } | RoomPhase::CountingDown { .. } => stats.waiting += 1,
                RoomPhase::Active { .. } => stats.active += 1,
                RoomPhase::Ended => {}
            }
        }
        stats
    }

    /// Route one client intent.
    pub fn handle_packet(
        &mut self,
        session: SessionId,
        packet: ClientPacket,
        now: u64,
        out: &mut Outbox,
    ) -> Result<(), GameError> {
        match packet {
            ClientPacket::Join { name, wallet } => {
                self.join(session, &name, wallet, now, out).map(|_| ())
            }
            ClientPacket::LeaveWaitingRoom {} => self.leave_waiting_room(session, now, out),
            ClientPacket::UpdateScore { .. } => Err(GameError::ClientScoreRejected),
            intent => {
                let room_id = self.room_of(session).ok_or(GameError::NotInRoom)?;
                let room = self.rooms.get_mut(&room_id).ok_or(GameError::NotInRoom)?;
                room.handle_intent(session, &intent, now)
            }
        }
    }

    /// Place a session into the first open room with space, creating one
    /// when every room is full or already playing.
    pub fn join(
        &mut self,
        session: SessionId,
        raw_name: &str,
        wallet: Option<String>,
        now: u64,
        out: &mut Outbox,
    ) -> Result<RoomId, GameError> {
        if self.sessions.contains_key(&session) {
            return Err(GameError::AlreadyJoined);
        }
        let name = names::sanitize(raw_name, self.config.room.max_name_length)
            .ok_or(GameError::InvalidName)?;

        let open = self.rooms.values().find(|r| r.is_joinable()).map(|r| r.id);
        let room_id = match open {
            Some(id) => id,
            None => self.create_room(),
        };
        let room = self.rooms.get_mut(&room_id).ok_or(GameError::NotInRoom)?;
        room.join(session, &name, wallet, now, out)?;
        self.sessions.insert(session, room_id);
        Ok(room_id)
    }

    pub fn leave_waiting_room(
        &mut self,
        session: SessionId,
        now: u64,
        out: &mut Outbox,
    ) -> Result<(), GameError> {
        let room_id = self.room_of(session).ok_or(GameError::NotInRoom)?;
        let room = self.rooms.get_mut(&room_id).ok_or(GameError::NotInRoom)?;
        room.leave_waiting(session, now, out)?;
        self.sessions.remove(&session);
        Ok(())
    }

    /// Drop a session from whatever room it is in. Safe to call twice.
    pub fn disconnect(&mut self, session: SessionId, now: u64, out: &mut Outbox) {
        let Some(room_id) = self.sessions.remove(&session) else {
            return;
        };
        if let Some(room) = self.rooms.get_mut(&room_id) {
            room.leave(session, now, out);
        }
    }

    /// Advance every room. Returns the matches that finished.
    pub fn tick(&mut self, now: u64, out: &mut Outbox) -> Vec<MatchResult> {
        for room in self.rooms.values_mut() {
            room.poll(now, out);
            room.tick(now, out);
        }

        let mut finished = Vec::new();
        let mut closed = Vec::new();
        for room in self.rooms.values_mut() {
            if let Some(result) = room.take_result() {
                finished.push(result);
            }
            if room.is_ended() || (room.phase().is_open() && room.members().is_empty()) {
                closed.push(room.id);
            }
        }
        for id in closed {
            if let Some(room) = self.rooms.remove(&id) {
                for session in room.sessions() {
                    self.sessions.remove(&session);
                }
                debug!("Room {} closed", id);
            }
        }

        for result in &finished {
            self.recent.push_back(result.clone());
            while self.recent.len() > self.config.server.recent_matches {
                self.recent.pop_front();
            }
        }
        finished
    }

    fn create_room(&mut self) -> RoomId {
        let id = RoomId(self.next_room);
        self.next_room += 1;
        let rng = StdRng::from_rng(&mut self.rng);
        self.rooms
            .insert(id, Room::new(id, Arc::clone(&self.config), rng));
        info!("Room {} created", id);
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::{MoveIntent, ServerPacket};

    fn lobby(capacity: usize) -> Lobby {
        let mut config = Config::default();
        config.room.capacity = capacity;
        config.food.target = 20;
        config.room.match_duration_secs = 2;
        config.server.rng_seed = Some(9);
        Lobby::new(Arc::new(config))
    }

    fn join(lobby: &mut Lobby, id: u32, out: &mut Outbox) -> RoomId {
        lobby
            .join(SessionId(id), &format!("p{}", id), Some(format!("W{}", id)), 0, out)
            .unwrap()
    }

    #[test]
    fn test_full_rooms_shard_new_joiners() {
        let mut lobby = lobby(2);
        let mut out = Outbox::new();
        let first = join(&mut lobby, 1, &mut out);
        assert_eq!(join(&mut lobby, 2, &mut out), first);
        let second = join(&mut lobby, 3, &mut out);
        assert_ne!(second, first);
        assert_eq!(lobby.stats().rooms, 2);
        assert_eq!(lobby.stats().players, 3);
    }

    #[test]
    fn test_join_validation() {
        let mut lobby = lobby(4);
        let mut out = Outbox::new();
        assert_eq!(
            lobby.join(SessionId(1), "<<>>", None, 0, &mut out),
            Err(GameError::InvalidName)
        );
        join(&mut lobby, 1, &mut out);
        assert_eq!(
            lobby.join(SessionId(1), "again", None, 0, &mut out),
            Err(GameError::AlreadyJoined)
        );
        let joined = out
            .packets_for(SessionId(1))
            .filter(|p| matches!(p, ServerPacket::Joined { .. }))
            .count();
        assert_eq!(joined, 1);
    }

    #[test]
    fn test_intents_need_a_room() {
        let mut lobby = lobby(4);
        let mut out = Outbox::new();
        let moving = ClientPacket::Move(MoveIntent::Target { x: 1.0, z: 1.0 });
        assert_eq!(
            lobby.handle_packet(SessionId(5), moving, 0, &mut out),
            Err(GameError::NotInRoom)
        );
        assert_eq!(
            lobby.handle_packet(
                SessionId(5),
                ClientPacket::UpdateScore {
                    id: protocol::EntityId(1),
                    score: 5.0
                },
                0,
                &mut out
            ),
            Err(GameError::ClientScoreRejected)
        );
    }

    #[test]
    fn test_leave_then_rejoin() {
        let mut lobby = lobby(4);
        let mut out = Outbox::new();
        join(&mut lobby, 1, &mut out);
        lobby
            .handle_packet(SessionId(1), ClientPacket::LeaveWaitingRoom {}, 0, &mut out)
            .unwrap();
        assert_eq!(lobby.room_of(SessionId(1)), None);
        assert_eq!(
            lobby.leave_waiting_room(SessionId(1), 0, &mut out),
            Err(GameError::NotInRoom)
        );

        // The empty room is reclaimed on the next tick.
        lobby.tick(50, &mut out);
        assert_eq!(lobby.stats().rooms, 0);
        join(&mut lobby, 1, &mut out);
        assert_eq!(lobby.stats().rooms, 1);
    }

    #[test]
    fn test_finished_match_frees_sessions() {
        let mut lobby = lobby(2);
        let mut out = Outbox::new();
        let room = join(&mut lobby, 1, &mut out);
        join(&mut lobby, 2, &mut out);

        let mut finished = Vec::new();
        let mut now = 0;
        while finished.is_empty() && now < 20_000 {
            now += 50;
            finished.extend(lobby.tick(now, &mut out));
        }

        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].room_id, room);
        assert_eq!(finished[0].ranking.len(), 2);
        assert!(lobby.room(room).is_none());
        assert_eq!(lobby.room_of(SessionId(1)), None);
        assert_eq!(lobby.recent_matches().count(), 1);
        join(&mut lobby, 1, &mut out);
    }

    #[test]
    fn test_disconnect_is_idempotent() {
        let mut lobby = lobby(4);
        let mut out = Outbox::new();
        join(&mut lobby, 1, &mut out);
        join(&mut lobby, 2, &mut out);
        out.clear();

        lobby.disconnect(SessionId(2), 0, &mut out);
        let first = out.len();
        assert!(first > 0);
        lobby.disconnect(SessionId(2), 0, &mut out);
        assert_eq!(out.len(), first);
    }
}
