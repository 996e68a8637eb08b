//! Room lifecycle.
//!
//! A room moves through `Waiting -> CountingDown -> Active -> Ended`:
//! - `Waiting`: accepting joins. Reaching `min_players` arms a short grace
//!   timer that starts the countdown.
//! - `CountingDown`: one step per `countdown_step_ms`; dropping below
//!   `min_players` cancels it and returns to `Waiting`.
//! - `Active`: membership is frozen and gameplay ticks run until the match
//!   timer fires or every member has left.
//! - `Ended`: final; the lobby tears the room down.
//!
//! All state is owned here and mutated synchronously by the game loop.

pub mod names;
pub mod timers;
pub mod world;

use crate::broadcast::{self, Outbox};
use crate::collision::{self, CollisionReport};
use crate::config::Config;
use crate::entity::{Heading, Player};
use crate::error::GameError;
use crate::payout::{MatchResult, RankedPlayer};
use crate::spawn;
use crate::store::EntityStore;
use protocol::packets::{LeaderboardWire, MemberWire};
use protocol::{ClientPacket, EntityId, RoomId, ServerPacket, SessionId};
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use std::sync::Arc;
use timers::{TimerId, Timers};
use tracing::{debug, info};

/// Delayed work owned by a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomJob {
    StartCountdown,
    CountdownStep,
    EndMatch,
    SpawnFood,
    RespawnFood(EntityId),
    SpawnBoss,
}

/// Lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomPhase {
    Waiting {
        /// Pending countdown start, armed once enough members are present.
        grace: Option<TimerId>,
    },
    CountingDown {
        remaining: u32,
        timer: TimerId,
    },
    Active {
        tick: u64,
        started_at: u64,
        ends_at: u64,
    },
    Ended,
}

impl RoomPhase {
    pub fn name(&self) -> &'static str {
        match self {
            RoomPhase::Waiting { .. } => "waiting",
            RoomPhase::CountingDown { .. } => "counting down",
            RoomPhase::Active { .. } => "active",
            RoomPhase::Ended => "ended",
        }
    }

    /// Still accepting members.
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            RoomPhase::Waiting { .. } | RoomPhase::CountingDown { .. }
        )
    }
}

/// A session admitted to the room.
#[derive(Debug, Clone)]
pub struct Member {
    pub session: SessionId,
    /// Unique within the room.
    pub name: String,
    pub wallet: Option<String>,
    /// Primary body assigned at match start. Kept after elimination.
    pub body: Option<EntityId>,
    /// Score at elimination.
    pub final_score: u64,
}

/// One isolated match instance.
#[derive(Debug)]
pub struct Room {
    pub id: RoomId,
    config: Arc<Config>,
    phase: RoomPhase,
    members: Vec<Member>,
    store: EntityStore,
    timers: Timers<RoomJob>,
    rng: StdRng,
    leaderboard: Vec<LeaderboardWire>,
    result: Option<MatchResult>,
}

impl Room {
    pub fn new(id: RoomId, config: Arc<Config>, rng: StdRng) -> Self {
        Self {
            id,
            config,
            phase: RoomPhase::Waiting { grace: None },
            members: Vec::new(),
            store: EntityStore::new(),
            timers: Timers::new(),
            rng,
            leaderboard: Vec::new(),
            result: None,
        }
    }

    #[inline]
    pub fn phase(&self) -> RoomPhase {
        self.phase
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }

    pub fn member(&self, session: SessionId) -> Option<&Member> {
        self.members.iter().find(|m| m.session == session)
    }

    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    #[cfg(test)]
    pub(crate) fn store_mut(&mut self) -> &mut EntityStore {
        &mut self.store
    }

    pub fn sessions(&self) -> Vec<SessionId> {
        self.members.iter().map(|m| m.session).collect()
    }

    /// Open and below capacity.
    pub fn is_joinable(&self) -> bool {
        self.phase.is_open() && self.members.len() < self.config.room.capacity
    }

    pub fn is_ended(&self) -> bool {
        self.phase == RoomPhase::Ended
    }

    /// Take the result of a finished match, once.
    pub fn take_result(&mut self) -> Option<MatchResult> {
        self.result.take()
    }

    /// Admit a session. `name` must already be sanitized; it is made unique
    /// within the room. Returns the name actually assigned.
    pub fn join(
        &mut self,
        session: SessionId,
        name: &str,
        wallet: Option<String>,
        now: u64,
        out: &mut Outbox,
    ) -> Result<String, GameError> {
        if !self.phase.is_open() {
            return Err(GameError::WrongPhase(self.phase.name()));
        }
        if self.member(session).is_some() {
            return Err(GameError::AlreadyJoined);
        }

        let name = names::dedupe(name, self.members.iter().map(|m| m.name.as_str()));
        self.members.push(Member {
            session,
            name: name.clone(),
            wallet,
            body: None,
            final_score: 0,
        });
        info!(
            "Room {}: {} joined as \"{}\" ({}/{})",
            self.id,
            session,
            name,
            self.members.len(),
            self.config.room.capacity
        );

        out.to(
            session,
            ServerPacket::Joined {
                session_id: session,
                room_id: self.id,
                name: name.clone(),
            },
        );
        self.send_waiting_update(out);
        self.arm_grace(now);
        Ok(name)
    }

    /// Remove a session (disconnect or explicit leave). Removing a session
    /// that is not a member is a no-op.
    pub fn leave(&mut self, session: SessionId, now: u64, out: &mut Outbox) -> Option<Member> {
        let index = self.members.iter().position(|m| m.session == session)?;
        let member = self.members.remove(index);
        info!("Room {}: {} ({}) left", self.id, session, member.name);

        match self.phase {
            RoomPhase::Waiting { .. } | RoomPhase::CountingDown { .. } => {
                self.send_waiting_update(out);
                self.check_minimum(out);
            }
            RoomPhase::Active { .. } => {
                if let Some(body) = member.body {
                    let mut removed = vec![body];
                    removed.extend(self.store.fragments_of(body));
                    for id in removed {
                        if self.store.players.remove(id).is_some() {
                            out.to_all(self.sessions(), ServerPacket::RemovePlayer { id });
                        }
                    }
                }
                self.refresh_leaderboard(out);
                if self.members.is_empty() {
                    self.end(now, true, out);
                }
            }
            RoomPhase::Ended => {}
        }
        Some(member)
    }

    /// Explicit `leaveWaitingRoom`: only valid before the match starts.
    pub fn leave_waiting(
        &mut self,
        session: SessionId,
        now: u64,
        out: &mut Outbox,
    ) -> Result<Member, GameError> {
        if !self.phase.is_open() {
            return Err(GameError::WrongPhase(self.phase.name()));
        }
        self.leave(session, now, out).ok_or(GameError::NotInRoom)
    }

    /// Apply a gameplay intent from a member.
    pub fn handle_intent(
        &mut self,
        session: SessionId,
        packet: &ClientPacket,
        now: u64,
    ) -> Result<(), GameError> {
        if let ClientPacket::UpdateScore { .. } = packet {
            return Err(GameError::ClientScoreRejected);
        }
        if !matches!(self.phase, RoomPhase::Active { .. }) {
            return Err(GameError::WrongPhase(self.phase.name()));
        }
        let body = self
            .member(session)
            .ok_or(GameError::NotInRoom)?
            .body
            .filter(|id| self.store.players.contains(*id))
            .ok_or(GameError::NotPlaying)?;

        let config = &self.config;
        match packet {
            ClientPacket::Move(intent) => {
                let heading = world::heading_for(*intent, config.map.half_extent);
                self.steer_family(body, heading);
                Ok(())
            }
            ClientPacket::Split {} => world::split(&mut self.store, body, config, now).map(|_| ()),
            ClientPacket::Eject {} => world::eject(&mut self.store, body, config).map(|_| ()),
            ClientPacket::Shoot { dx, dz } => {
                world::shoot(&mut self.store, body, *dx, *dz, config, now).map(|_| ())
            }
            ClientPacket::Join { .. } => Err(GameError::AlreadyJoined),
            ClientPacket::LeaveWaitingRoom {} => Err(GameError::WrongPhase(self.phase.name())),
            ClientPacket::UpdateScore { .. } => Err(GameError::ClientScoreRejected),
        }
    }

    /// Run every timer job due at `now`.
    pub fn poll(&mut self, now: u64, out: &mut Outbox) {
        while let Some(job) = self.timers.pop_due(now) {
            self.run_job(job, now, out);
        }
    }

    /// One gameplay tick: movement, collisions, then a snapshot.
    pub fn tick(&mut self, now: u64, out: &mut Outbox) {
        let RoomPhase::Active { tick, .. } = &mut self.phase else {
            return;
        };
        *tick += 1;
        let tick = *tick;
        let dt = self.config.server.tick_interval_ms as f32 / 1000.0;

        for id in spawn::expire_bosses(&mut self.store, now) {
            out.to_all(self.sessions(), ServerPacket::RemovePlayer { id });
        }
        world::advance_bodies(&mut self.store, &self.config, dt, now);
        world::advance_projectiles(&mut self.store, &self.config, dt, now);

        let report = collision::resolve(&mut self.store, &self.config, now);
        self.apply_report(&report, now, out);

        out.to_all(
            self.sessions(),
            ServerPacket::StateUpdate(broadcast::snapshot(self.id, tick, &self.store)),
        );
    }

    fn apply_report(&mut self, report: &CollisionReport, now: u64, out: &mut Outbox) {
        let respawn_at = now.saturating_add(self.config.food.respawn_delay_ms);
        for &food in &report.absorbed_food {
            self.timers.schedule_at(respawn_at, RoomJob::RespawnFood(food));
        }

        let sessions = self.sessions();
        for elimination in &report.eliminated {
            if let Some(member) = self
                .members
                .iter_mut()
                .find(|m| m.body == Some(elimination.id))
            {
                info!(
                    "Room {}: {} eliminated with score {}",
                    self.id, member.name, elimination.score
                );
                member.final_score = elimination.score;
            }
            out.to_all(
                sessions.iter().copied(),
                ServerPacket::PlayerEaten {
                    id: elimination.id,
                    by: elimination.by,
                },
            );
        }
        for &id in &report.removed {
            out.to_all(sessions.iter().copied(), ServerPacket::RemovePlayer { id });
        }

        if report.scores_changed || !report.eliminated.is_empty() {
            self.refresh_leaderboard(out);
        }
    }

    fn run_job(&mut self, job: RoomJob, now: u64, out: &mut Outbox) {
        match job {
            RoomJob::StartCountdown => self.start_countdown(now, out),
            RoomJob::CountdownStep => self.countdown_step(now, out),
            RoomJob::EndMatch => self.end(now, false, out),
            RoomJob::SpawnFood => {
                if matches!(self.phase, RoomPhase::Active { .. }) {
                    let added = spawn::spawn_food(
                        &mut self.store,
                        &mut self.rng,
                        self.config.food.target,
                        self.config.food.spawn_batch,
                        self.config.map.half_extent,
                    );
                    if added > 0 {
                        debug!("Room {}: spawned {} food", self.id, added);
                    }
                    self.timers.schedule_at(
                        now + self.config.food.spawn_interval_ms.max(1),
                        RoomJob::SpawnFood,
                    );
                }
            }
            RoomJob::RespawnFood(id) => {
                spawn::respawn_food(
                    &mut self.store,
                    id,
                    &mut self.rng,
                    self.config.map.half_extent,
                    now,
                );
            }
            RoomJob::SpawnBoss => {
                if matches!(self.phase, RoomPhase::Active { .. }) {
                    spawn::spawn_boss(
                        &mut self.store,
                        &mut self.rng,
                        &self.config.boss,
                        self.config.map.half_extent,
                        now,
                    );
                    self.timers
                        .schedule_at(now + self.config.boss.interval_ms, RoomJob::SpawnBoss);
                }
            }
        }
    }

    /// Arm the countdown grace timer once enough members are present.
    fn arm_grace(&mut self, now: u64) {
        if let RoomPhase::Waiting { grace: None } = self.phase {
            if self.members.len() >= self.config.room.min_players {
                let timer = self
                    .timers
                    .schedule_at(now + self.config.room.grace_ms, RoomJob::StartCountdown);
                self.phase = RoomPhase::Waiting { grace: Some(timer) };
                debug!("Room {}: countdown armed", self.id);
            }
        }
    }

    /// Cancel a pending start when membership drops below the minimum.
    fn check_minimum(&mut self, out: &mut Outbox) {
        let required = self.config.room.min_players;
        if self.members.len() >= required {
            return;
        }
        match self.phase {
            RoomPhase::Waiting { grace: Some(timer) } => {
                self.timers.cancel(timer);
                self.phase = RoomPhase::Waiting { grace: None };
            }
            RoomPhase::CountingDown { timer, .. } => {
                self.timers.cancel(timer);
                self.phase = RoomPhase::Waiting { grace: None };
                info!("Room {}: countdown cancelled", self.id);
                out.to_all(
                    self.sessions(),
                    ServerPacket::WaitingForPlayers {
                        room_id: self.id,
                        current: self.members.len(),
                        required,
                    },
                );
            }
            _ => {}
        }
    }

    fn start_countdown(&mut self, now: u64, out: &mut Outbox) {
        if !matches!(self.phase, RoomPhase::Waiting { .. }) {
            return;
        }
        if self.members.len() < self.config.room.min_players {
            self.phase = RoomPhase::Waiting { grace: None };
            return;
        }
        let remaining = self.config.room.countdown_seconds;
        if remaining == 0 {
            self.activate(now, out);
            return;
        }
        let timer = self.schedule_step(now);
        self.phase = RoomPhase::CountingDown { remaining, timer };
        info!("Room {}: countdown started", self.id);
        self.send_countdown(remaining, out);
    }

    fn countdown_step(&mut self, now: u64, out: &mut Outbox) {
        let RoomPhase::CountingDown { remaining, .. } = self.phase else {
            return;
        };
        let remaining = remaining.saturating_sub(1);
        if remaining == 0 {
            self.activate(now, out);
            return;
        }
        let timer = self.schedule_step(now);
        self.phase = RoomPhase::CountingDown { remaining, timer };
        self.send_countdown(remaining, out);
    }

    fn schedule_step(&mut self, now: u64) -> TimerId {
        self.timers
            .schedule_at(now + self.config.room.countdown_step_ms, RoomJob::CountdownStep)
    }

    /// Enter `Active`: spawn bodies, fill food, deliver the manifest and the
    /// first snapshot.
    fn activate(&mut self, now: u64, out: &mut Outbox) {
        let config = Arc::clone(&self.config);
        self.store.clear();
        self.timers.clear();

        for member in self.members.iter_mut() {
            let id = self.store.allocate_id();
            let position = spawn::random_position(&mut self.rng, config.map.spawn_extent);
            let skin = config
                .room
                .skins
                .choose(&mut self.rng)
                .cloned()
                .unwrap_or_default();
            let body = Player::primary(
                id,
                member.session,
                member.name.clone(),
                position,
                config.player.start_size,
                skin,
                config.laser.ammo,
            );
            if self.store.players.insert(body).is_ok() {
                member.body = Some(id);
            }
        }
        spawn::fill_food(&mut self.store, &mut self.rng, &config);

        let ends_at = now + config.room.match_duration_secs * 1000;
        self.timers.schedule_at(ends_at, RoomJob::EndMatch);
        self.timers
            .schedule_at(now + config.food.spawn_interval_ms.max(1), RoomJob::SpawnFood);
        if config.boss.interval_ms > 0 {
            self.timers
                .schedule_at(now + config.boss.interval_ms, RoomJob::SpawnBoss);
        }
        self.phase = RoomPhase::Active {
            tick: 0,
            started_at: now,
            ends_at,
        };
        info!(
            "Room {}: match started with {} players, {} food",
            self.id,
            self.members.len(),
            self.store.food_population()
        );

        let manifest: Vec<_> = self.store.players.iter().map(|p| p.to_wire()).collect();
        // One copy per member stands in for the room broadcast; each carries the full manifest.
        for member in &self.members {
            out.to(
                member.session,
                ServerPacket::GameStart {
                    room_id: self.id,
                    self_id: member.body,
                    players: manifest.clone(),
                },
            );
        }
        self.leaderboard.clear();
        self.refresh_leaderboard(out);
        out.to_all(
            self.sessions(),
            ServerPacket::StateUpdate(broadcast::snapshot(self.id, 0, &self.store)),
        );
    }

    /// Enter `Ended` and build the match result.
    fn end(&mut self, now: u64, abandoned: bool, out: &mut Outbox) {
        let RoomPhase::Active { started_at, .. } = self.phase else {
            return;
        };
        self.phase = RoomPhase::Ended;
        self.timers.clear();

        let mut standings: Vec<(&Member, u64)> = self
            .members
            .iter()
            .map(|m| {
                let score = m
                    .body
                    .and_then(|b| self.store.players.get(b))
                    .map_or(m.final_score, |p| p.score);
                (m, score)
            })
            .collect();
        standings.sort_by(|a, b| b.1.cmp(&a.1));
        let board: Vec<LeaderboardWire> = standings
            .iter()
            .map(|(m, score)| LeaderboardWire {
                id: m.body.unwrap_or(EntityId(0)),
                name: m.name.clone(),
                score: *score,
            })
            .collect();
        let ranking: Vec<RankedPlayer> = standings
            .into_iter()
            .enumerate()
            .map(|(i, (m, score))| RankedPlayer {
                rank: i + 1,
                name: m.name.clone(),
                score,
                wallet: m.wallet.clone(),
            })
            .collect();
        let winners = if abandoned {
            Vec::new()
        } else {
            MatchResult::select_winners(&ranking, self.config.room.winner_count)
        };

        info!(
            "Room {}: match over{} after {}s",
            self.id,
            if abandoned { " (abandoned)" } else { "" },
            now.saturating_sub(started_at) / 1000
        );
        out.to_all(
            self.sessions(),
            ServerPacket::GameOver {
                room_id: self.id,
                ranking: board,
            },
        );

        self.result = Some(MatchResult {
            match_id: u64::from(self.id.0),
            room_id: self.id,
            started_at_ms: started_at,
            ended_at_ms: now,
            abandoned,
            ranking,
            winners,
        });
    }

    /// Set the heading of a member's primary body and all its fragments.
    fn steer_family(&mut self, body: EntityId, heading: Heading) {
        let mut family = self.store.fragments_of(body);
        family.push(body);
        for id in family {
            if let Some(p) = self.store.players.get_mut(id) {
                p.heading = heading;
            }
        }
    }

    /// Re-send the leaderboard when it changed.
    fn refresh_leaderboard(&mut self, out: &mut Outbox) {
        let entries = broadcast::leaderboard(&self.store, self.config.room.leaderboard_size);
        if entries == self.leaderboard {
            return;
        }
        self.leaderboard = entries.clone();
        out.to_all(
            self.sessions(),
            ServerPacket::UpdateLeaderboard {
                room_id: self.id,
                entries,
            },
        );
    }

    fn send_waiting_update(&self, out: &mut Outbox) {
        out.to_all(
            self.sessions(),
            ServerPacket::WaitingRoomUpdate {
                room_id: self.id,
                members: self
                    .members
                    .iter()
                    .map(|m| MemberWire {
                        session_id: m.session,
                        name: m.name.clone(),
                    })
                    .collect(),
            },
        );
    }

    fn send_countdown(&self, seconds_remaining: u32, out: &mut Outbox) {
        out.to_all(
            self.sessions(),
            ServerPacket::StartGameCountdown {
                room_id: self.id,
                seconds_remaining,
            },
        );
    }
}
