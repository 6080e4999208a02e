use glam::{Quat, Vec3};

use crate::math::Transform;
use crate::net::LaserRecord;

pub const DEFAULT_LASER_LIFETIME_MS: u64 = 10_000;

#[derive(Debug, Clone)]
pub struct Laser {
    pub id: u32,
    /// May name a ship that has since left.
    pub sender_id: u32,
    pub transform: Transform,
    pub origin: Vec3,
    pub direction: Vec3,
    pub speed: f32,
    pub start_time_ms: u64,
    pub end_time_ms: u64,
}

impl Laser {
    pub fn new(
        id: u32,
        sender_id: u32,
        muzzle: &Transform,
        speed: f32,
        start_time_ms: u64,
        lifetime_ms: u64,
    ) -> Self {
        Self {
            id,
            sender_id,
            transform: muzzle.clone(),
            origin: muzzle.position(),
            direction: muzzle.forward(),
            speed,
            start_time_ms,
            end_time_ms: start_time_ms.saturating_add(lifetime_ms),
        }
    }

    /// Rebuilds a laser announced by the server. The sender is not on the wire.
    pub fn from_record(record: &LaserRecord, speed: f32) -> Self {
        let transform = Transform::new(record.origin.into(), Quat::from(record.orientation));
        Self {
            id: record.entity_id,
            sender_id: 0,
            origin: transform.position(),
            direction: transform.forward(),
            transform,
            speed,
            start_time_ms: record.start_time_ms,
            end_time_ms: record.end_time_ms,
        }
    }

    pub fn record(&self) -> LaserRecord {
        LaserRecord {
            entity_id: self.id,
            start_time_ms: self.start_time_ms,
            end_time_ms: self.end_time_ms,
            origin: self.origin.into(),
            orientation: self.transform.orientation().into(),
        }
    }

    pub fn update(&mut self, dt: f32) {
        self.transform.add_position(self.direction * self.speed * dt);
    }

    /// Places the laser where it would be at `now_ms` had it flown since spawning.
    pub fn advance_to(&mut self, now_ms: u64) {
        let flown = now_ms.saturating_sub(self.start_time_ms) as f32 / 1000.0;
        self.transform
            .set_position(self.origin + self.direction * self.speed * flown);
    }

    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.end_time_ms
    }

    /// Segment checked for hits: centred on the laser, `length` long.
    pub fn hit_ray(&self, length: f32) -> (Vec3, Vec3, f32) {
        let start = self.transform.position() - self.direction * (length * 0.5);
        (start, self.direction, length)
    }
}
