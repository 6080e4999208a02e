use glam::{EulerRot, Quat, Vec3};

use crate::math::Transform;

use super::{Keys, ShipConfig};

fn mix(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

fn axis(positive: bool, negative: bool) -> f32 {
    if positive {
        1.0
    } else if negative {
        -1.0
    } else {
        0.0
    }
}

/// Throttle and smoothed rates; advanced identically by the server and the local client.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShipMotion {
    pub linear_velocity: Vec3,
    pub current_speed: f32,
    /// Visual roll from yawing; never feeds back into the orientation.
    pub bank: f32,
    yaw_smooth: f32,
    pitch_smooth: f32,
    roll_smooth: f32,
}

impl ShipMotion {
    pub fn step(&mut self, config: &ShipConfig, keys: Keys, transform: &mut Transform, dt: f32) {
        if keys.contains(Keys::FORWARD) {
            let (target, response) = if keys.contains(Keys::BOOST) {
                (config.boost_speed, config.boost_throttle_response)
            } else {
                (config.normal_speed, config.throttle_response)
            };
            self.current_speed = mix(self.current_speed, target, (dt * response).min(1.0));
        } else {
            self.current_speed = 0.0;
        }

        let desired = transform.orientation()
            * Vec3::new(0.0, 0.0, self.current_speed * config.speed_scale);
        self.linear_velocity = self
            .linear_velocity
            .lerp(desired, dt * config.acceleration_factor);

        transform.add_position(self.linear_velocity * dt);

        let yaw = axis(
            keys.contains(Keys::YAW_LEFT),
            keys.contains(Keys::YAW_RIGHT),
        );
        let pitch = -axis(
            keys.contains(Keys::PITCH_UP),
            keys.contains(Keys::PITCH_DOWN),
        );
        let roll = -axis(
            keys.contains(Keys::ROLL_LEFT),
            keys.contains(Keys::ROLL_RIGHT),
        );

        let rotation_speed = config.rotation_speed * dt;
        let smoothing = dt * config.smooth_factor;
        self.yaw_smooth = mix(self.yaw_smooth, yaw * rotation_speed, smoothing);
        self.pitch_smooth = mix(self.pitch_smooth, pitch * rotation_speed, smoothing);
        self.roll_smooth = mix(self.roll_smooth, roll * rotation_speed, smoothing);

        let local = Quat::from_euler(
            EulerRot::ZYX,
            self.roll_smooth,
            self.yaw_smooth,
            -self.pitch_smooth,
        );
        transform.set_orientation((transform.orientation() * local).normalize());

        self.bank = (self.bank - self.yaw_smooth).clamp(-config.max_bank, config.max_bank);
        self.bank = mix(self.bank, 0.0, smoothing);
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
