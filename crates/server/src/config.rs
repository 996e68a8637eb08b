//! Server configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, warn};

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub room: RoomConfig,
    #[serde(default)]
    pub map: MapConfig,
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub food: FoodConfig,
    #[serde(default)]
    pub split: SplitConfig,
    #[serde(default)]
    pub eject: EjectConfig,
    #[serde(default)]
    pub laser: LaserConfig,
    #[serde(default)]
    pub boss: BossConfig,
}

impl Config {
    /// Load configuration from `config.toml` or use defaults.
    ///
    /// A `PORT` environment variable overrides `server.port`.
    pub fn load() -> anyhow::Result<Self> {
        let path = Path::new("config.toml");
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str(&contents)?
        } else {
            info!("No config.toml found, creating default config");
            let default_config = Self::default();
            std::fs::write(path, toml::to_string_pretty(&default_config)?)?;
            default_config
        };

        if let Ok(port) = std::env::var("PORT") {
            match port.parse() {
                Ok(port) => config.server.port = port,
                Err(_) => warn!("Ignoring invalid PORT value: {}", port),
            }
        }

        Ok(config)
    }

    /// Log the settings an operator usually wants to see at startup.
    pub fn log_summary(&self) {
        let server = &self.server;
        let room = &self.room;
        info!(
            "  Listen: {}:{} ({} connections, {} per IP, {} queued frames each)",
            server.bind, server.port, server.max_connections, server.ip_limit, server.outbound_queue
        );
        info!(
            "  Rooms: {}-{} players, {}ms grace, {}x{}ms countdown, {}s matches, top {} paid",
            room.min_players,
            room.capacity,
            room.grace_ms,
            room.countdown_seconds,
            room.countdown_step_ms,
            room.match_duration_secs,
            room.winner_count
        );
        info!(
            "  World: {}ms ticks, {} food on a {}-unit map",
            server.tick_interval_ms,
            self.food.target,
            self.map.half_extent * 2.0
        );
        if self.boss.interval_ms > 0 {
            info!("  Boss every {}s", self.boss.interval_ms / 1000);
        }
        match server.rng_seed {
            Some(seed) => info!("  Seeded world: {}", seed),
            None => debug!("  World seed drawn from the OS"),
        }
    }
}

/// Server networking and general settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Bind address.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Maximum connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Connections per IP limit.
    #[serde(default = "default_ip_limit")]
    pub ip_limit: usize,
    /// Tick interval in milliseconds.
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
    /// Origins allowed by CORS (empty = any).
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
    /// Fixed RNG seed for reproducible worlds.
    #[serde(default)]
    pub rng_seed: Option<u64>,
    /// Number of finished match results kept for queries.
    #[serde(default = "default_recent_matches")]
    pub recent_matches: usize,
    /// Frames buffered per connection before snapshots are dropped.
    #[serde(default = "default_outbound_queue")]
    pub outbound_queue: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
            max_connections: default_max_connections(),
            ip_limit: default_ip_limit(),
            tick_interval_ms: default_tick_interval(),
            allowed_origins: default_allowed_origins(),
            rng_seed: None,
            recent_matches: default_recent_matches(),
            outbound_queue: default_outbound_queue(),
        }
    }
}

fn default_port() -> u16 {
    5000
}
fn default_bind() -> String {
    "0.0.0.0".to_string()
}
fn default_max_connections() -> usize {
    500
}
fn default_ip_limit() -> usize {
    20
}
fn default_tick_interval() -> u64 {
    50
}
fn default_allowed_origins() -> Vec<String> {
    vec![
        "https://gaming-dashboard.webflow.io".to_string(),
        "http://localhost:5000".to_string(),
    ]
}
fn default_recent_matches() -> usize {
    20
}
fn default_outbound_queue() -> usize {
    64
}

/// Room lifecycle settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RoomConfig {
    /// Maximum members per room. Extra joiners open a new room.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// Members required to start the countdown.
    #[serde(default = "default_min_players")]
    pub min_players: usize,
    /// Delay between reaching `min_players` and starting the countdown.
    #[serde(default = "default_grace_ms")]
    pub grace_ms: u64,
    /// Countdown length in steps.
    #[serde(default = "default_countdown_seconds")]
    pub countdown_seconds: u32,
    /// Duration of one countdown step.
    #[serde(default = "default_countdown_step_ms")]
    pub countdown_step_ms: u64,
    /// Match length.
    #[serde(default = "default_match_duration")]
    pub match_duration_secs: u64,
    /// Rows in the leaderboard.
    #[serde(default = "default_leaderboard_size")]
    pub leaderboard_size: usize,
    /// Ranked players handed to prize distribution.
    #[serde(default = "default_winner_count")]
    pub winner_count: usize,
    /// Skins assigned at random when the match starts.
    #[serde(default = "default_skins")]
    pub skins: Vec<String>,
    #[serde(default = "default_max_name_length")]
    pub max_name_length: usize,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            min_players: default_min_players(),
            grace_ms: default_grace_ms(),
            countdown_seconds: default_countdown_seconds(),
            countdown_step_ms: default_countdown_step_ms(),
            match_duration_secs: default_match_duration(),
            leaderboard_size: default_leaderboard_size(),
            winner_count: default_winner_count(),
            skins: default_skins(),
            max_name_length: default_max_name_length(),
        }
    }
}

fn default_capacity() -> usize {
    10
}
fn default_min_players() -> usize {
    2
}
fn default_grace_ms() -> u64 {
    1000
}
fn default_countdown_seconds() -> u32 {
    5
}
fn default_countdown_step_ms() -> u64 {
    1000
}
fn default_match_duration() -> u64 {
    20 * 60
}
fn default_leaderboard_size() -> usize {
    10
}
fn default_winner_count() -> usize {
    3
}
fn default_skins() -> Vec<String> {
    [
        "textures/playerSkin1.png",
        "textures/playerSkin4.png",
        "textures/playerSkin5.png",
        "textures/playerSkin14.png",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
fn default_max_name_length() -> usize {
    30
}

/// Arena bounds. The map is a square centred on the origin.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MapConfig {
    #[serde(default = "default_half_extent")]
    pub half_extent: f32,
    /// Players spawn within `[-spawn_extent, spawn_extent]` on both axes.
    #[serde(default = "default_spawn_extent")]
    pub spawn_extent: f32,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            half_extent: default_half_extent(),
            spawn_extent: default_spawn_extent(),
        }
    }
}

fn default_half_extent() -> f32 {
    2500.0
}
fn default_spawn_extent() -> f32 {
    500.0
}

/// Player body settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlayerConfig {
    #[serde(default = "default_player_start_size")]
    pub start_size: f32,
    /// Elimination threshold.
    #[serde(default = "default_player_min_size")]
    pub min_size: f32,
    /// Speed in units per second at `start_size`.
    #[serde(default = "default_player_speed")]
    pub speed: f32,
    #[serde(default = "default_speed_exponent")]
    pub speed_exponent: f32,
    #[serde(default = "default_min_speed")]
    pub min_speed: f32,
    /// Body radius as a fraction of size.
    #[serde(default = "default_body_radius")]
    pub body_radius: f32,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            start_size: default_player_start_size(),
            min_size: default_player_min_size(),
            speed: default_player_speed(),
            speed_exponent: default_speed_exponent(),
            min_speed: default_min_speed(),
            body_radius: default_body_radius(),
        }
    }
}

fn default_player_start_size() -> f32 {
    40.0
}
fn default_player_min_size() -> f32 {
    10.0
}
fn default_player_speed() -> f32 {
    300.0
}
fn default_speed_exponent() -> f32 {
    0.439
}
fn default_min_speed() -> f32 {
    40.0
}
fn default_body_radius() -> f32 {
    0.5
}

/// Food population and absorption.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FoodConfig {
    /// Target population (active + pending respawn).
    #[serde(default = "default_food_target")]
    pub target: usize,
    #[serde(default = "default_food_spawn_interval")]
    pub spawn_interval_ms: u64,
    /// Maximum items inserted by one spawn job.
    #[serde(default = "default_food_spawn_batch")]
    pub spawn_batch: usize,
    #[serde(default = "default_food_respawn_delay")]
    pub respawn_delay_ms: u64,
    /// Absorption radius as a multiple of player size.
    #[serde(default = "default_absorb_factor")]
    pub absorb_factor: f32,
    /// Attraction radius as a multiple of player size.
    #[serde(default = "default_attract_factor")]
    pub attract_factor: f32,
    /// Fraction of the remaining distance pulled per tick.
    #[serde(default = "default_attract_pull")]
    pub attract_pull: f32,
    /// Growth at size zero; see `collision::growth_increment`.
    #[serde(default = "default_food_growth")]
    pub growth: f32,
    #[serde(default = "default_growth_falloff")]
    pub growth_falloff: f32,
    /// Score per food item.
    #[serde(default = "default_food_score")]
    pub score: u64,
}

impl Default for FoodConfig {
    fn default() -> Self {
        Self {
            target: default_food_target(),
            spawn_interval_ms: default_food_spawn_interval(),
            spawn_batch: default_food_spawn_batch(),
            respawn_delay_ms: default_food_respawn_delay(),
            absorb_factor: default_absorb_factor(),
            attract_factor: default_attract_factor(),
            attract_pull: default_attract_pull(),
            growth: default_food_growth(),
            growth_falloff: default_growth_falloff(),
            score: default_food_score(),
        }
    }
}

fn default_food_target() -> usize {
    600
}
fn default_food_spawn_interval() -> u64 {
    500
}
fn default_food_spawn_batch() -> usize {
    50
}
fn default_food_respawn_delay() -> u64 {
    10_000
}
fn default_absorb_factor() -> f32 {
    1.5
}
fn default_attract_factor() -> f32 {
    4.0
}
fn default_attract_pull() -> f32 {
    0.2
}
fn default_food_growth() -> f32 {
    1.0
}
fn default_growth_falloff() -> f32 {
    0.01
}
fn default_food_score() -> u64 {
    10
}

/// Split fragments.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SplitConfig {
    /// Size the body must exceed to split.
    #[serde(default = "default_split_min_size")]
    pub min_size: f32,
    #[serde(default = "default_split_cooldown")]
    pub cooldown_ms: u64,
    /// Time before a fragment may merge back.
    #[serde(default = "default_merge_delay")]
    pub merge_delay_ms: u64,
    #[serde(default = "default_merge_distance")]
    pub merge_distance: f32,
    /// Initial fragment speed in units per second.
    #[serde(default = "default_launch_speed")]
    pub launch_speed: f32,
    /// Velocity multiplier applied each tick.
    #[serde(default = "default_velocity_decay")]
    pub velocity_decay: f32,
    /// Spawn offset as a multiple of the fragment size.
    #[serde(default = "default_offset_factor")]
    pub offset_factor: f32,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            min_size: default_split_min_size(),
            cooldown_ms: default_split_cooldown(),
            merge_delay_ms: default_merge_delay(),
            merge_distance: default_merge_distance(),
            launch_speed: default_launch_speed(),
            velocity_decay: default_velocity_decay(),
            offset_factor: default_offset_factor(),
        }
    }
}

fn default_split_min_size() -> f32 {
    100.0
}
fn default_split_cooldown() -> u64 {
    10_000
}
fn default_merge_delay() -> u64 {
    10_000
}
fn default_merge_distance() -> f32 {
    5.0
}
fn default_launch_speed() -> f32 {
    1000.0
}
fn default_velocity_decay() -> f32 {
    0.92
}
fn default_offset_factor() -> f32 {
    1.5
}

/// Ejected mass.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EjectConfig {
    /// Size the body must exceed to eject.
    #[serde(default = "default_eject_min_size")]
    pub min_size: f32,
    /// Size lost by the ejecting body.
    #[serde(default = "default_eject_mass")]
    pub mass: f32,
    #[serde(default = "default_eject_radius")]
    pub radius: f32,
    /// Launch speed in units per second.
    #[serde(default = "default_eject_speed")]
    pub speed: f32,
    /// Velocity multiplier applied each tick.
    #[serde(default = "default_eject_decay")]
    pub decay: f32,
    /// Travel budget before the blob dissolves.
    #[serde(default = "default_eject_max_travel")]
    pub max_travel: f32,
    /// Size gained by a player that catches it.
    #[serde(default = "default_eject_growth")]
    pub growth: f32,
}

impl Default for EjectConfig {
    fn default() -> Self {
        Self {
            min_size: default_eject_min_size(),
            mass: default_eject_mass(),
            radius: default_eject_radius(),
            speed: default_eject_speed(),
            decay: default_eject_decay(),
            max_travel: default_eject_max_travel(),
            growth: default_eject_growth(),
        }
    }
}

fn default_eject_min_size() -> f32 {
    70.0
}
fn default_eject_mass() -> f32 {
    5.0
}
fn default_eject_radius() -> f32 {
    5.0
}
fn default_eject_speed() -> f32 {
    400.0
}
fn default_eject_decay() -> f32 {
    0.8
}
fn default_eject_max_travel() -> f32 {
    200.0
}
fn default_eject_growth() -> f32 {
    1.0
}

/// Laser shots.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LaserConfig {
    #[serde(default = "default_laser_min_size")]
    pub min_size: f32,
    /// Shots per match.
    #[serde(default = "default_laser_ammo")]
    pub ammo: u32,
    /// Shots in flight per player.
    #[serde(default = "default_laser_max_active")]
    pub max_active: usize,
    #[serde(default = "default_laser_radius")]
    pub radius: f32,
    #[serde(default = "default_laser_speed")]
    pub speed: f32,
    #[serde(default = "default_laser_lifetime")]
    pub lifetime_ms: u64,
    /// Size multiplier applied to a body that is hit.
    #[serde(default = "default_hit_factor")]
    pub hit_factor: f32,
}

impl Default for LaserConfig {
    fn default() -> Self {
        Self {
            min_size: default_laser_min_size(),
            ammo: default_laser_ammo(),
            max_active: default_laser_max_active(),
            radius: default_laser_radius(),
            speed: default_laser_speed(),
            lifetime_ms: default_laser_lifetime(),
            hit_factor: default_hit_factor(),
        }
    }
}

fn default_laser_min_size() -> f32 {
    40.0
}
fn default_laser_ammo() -> u32 {
    3
}
fn default_laser_max_active() -> usize {
    3
}
fn default_laser_radius() -> f32 {
    0.7
}
fn default_laser_speed() -> f32 {
    3200.0
}
fn default_laser_lifetime() -> u64 {
    70
}
fn default_hit_factor() -> f32 {
    0.95
}

/// Boss monster. Disabled when `interval_ms` is zero.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BossConfig {
    #[serde(default)]
    pub interval_ms: u64,
    #[serde(default = "default_boss_lifetime")]
    pub lifetime_ms: u64,
    #[serde(default = "default_boss_size")]
    pub size: f32,
    #[serde(default = "default_boss_speed")]
    pub speed: f32,
    /// Size multiplier applied per tick to a body touching the boss.
    #[serde(default = "default_boss_hit_factor")]
    pub hit_factor: f32,
}

impl Default for BossConfig {
    fn default() -> Self {
        Self {
            interval_ms: 0,
            lifetime_ms: default_boss_lifetime(),
            size: default_boss_size(),
            speed: default_boss_speed(),
            hit_factor: default_boss_hit_factor(),
        }
    }
}

fn default_boss_lifetime() -> u64 {
    60_000
}
fn default_boss_size() -> f32 {
    200.0
}
fn default_boss_speed() -> f32 {
    60.0
}
fn default_boss_hit_factor() -> f32 {
    0.98
}
