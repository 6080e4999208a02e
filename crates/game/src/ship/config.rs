use glam::Vec3;

#[derive(Debug, Clone, PartialEq)]
pub struct ShipConfig {
    pub normal_speed: f32,
    pub boost_speed: f32,
    pub speed_scale: f32,

    pub throttle_response: f32,
    pub boost_throttle_response: f32,
    pub acceleration_factor: f32,

    pub rotation_speed: f32,
    pub smooth_factor: f32,
    pub max_bank: f32,

    pub laser_speed: f32,
    pub laser_ray_length: f32,

    /// Hull probe end points in ship-local space.
    pub collider_end_points: [Vec3; 8],
}

impl Default for ShipConfig {
    fn default() -> Self {
        Self {
            normal_speed: 1.0,
            boost_speed: 2.0,
            speed_scale: 10.0,

            throttle_response: 90.0,
            boost_throttle_response: 30.0,
            acceleration_factor: 1.0,

            rotation_speed: 1.8,
            smooth_factor: 10.0,
            max_bank: 45_f32.to_radians(),

            laser_speed: 50.0,
            laser_ray_length: 1.0,

            collider_end_points: [
                Vec3::new(-1.10657, -0.480347, -0.346542),
                Vec3::new(1.10657, -0.480347, -0.346542),
                Vec3::new(-0.342382, 0.25109, -0.010299),
                Vec3::new(0.342382, 0.25109, -0.010299),
                Vec3::new(-0.285614, -0.10917, 0.869609),
                Vec3::new(0.285614, -0.10917, 0.869609),
                Vec3::new(-0.279064, -0.10917, -0.98846),
                Vec3::new(0.279064, -0.10917, -0.98846),
            ],
        }
    }
}
