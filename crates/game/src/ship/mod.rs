mod config;
mod input;
mod kinematics;
mod laser;

pub use config::ShipConfig;
pub use input::{KeyMap, Keys};
pub use kinematics::ShipMotion;
pub use laser::{Laser, DEFAULT_LASER_LIFETIME_MS};

use glam::{Quat, Vec3};

/// World-space direction and length of each hull probe for a ship with `orientation`.
pub fn hull_rays(config: &ShipConfig, orientation: Quat) -> impl Iterator<Item = (Vec3, f32)> + '_ {
    config
        .collider_end_points
        .iter()
        .map(move |point| (orientation * point.normalize(), point.length()))
}
