use std::time::Duration;

use spacegame::DEFAULT_TICK_RATE;

pub const DEFAULT_ASTEROID_SEED: u64 = 0x5EED;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub tick_rate: u32,
    /// Ticks between event flushes and player updates.
    pub broadcast_interval_ticks: u32,
    pub max_clients: usize,
    pub spawn_point_count: usize,
    pub spawn_radius: f32,
    pub laser_lifetime_ms: u64,
    pub free_spawn_point_on_disconnect: bool,
    /// `None` leaves space empty.
    pub asteroid_seed: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tick_rate: DEFAULT_TICK_RATE,
            broadcast_interval_ticks: 10,
            max_clients: 32,
            spawn_point_count: 32,
            spawn_radius: 100.0,
            laser_lifetime_ms: 10_000,
            free_spawn_point_on_disconnect: true,
            asteroid_seed: Some(DEFAULT_ASTEROID_SEED),
        }
    }
}

impl ServerConfig {
    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate.max(1) as f64)
    }

    pub fn dt(&self) -> f32 {
        1.0 / self.tick_rate.max(1) as f32
    }

    /// Clients the transport admits. Every live ship needs a spawn point of its own.
    pub fn peer_capacity(&self) -> usize {
        self.max_clients.min(self.spawn_point_count)
    }
}
