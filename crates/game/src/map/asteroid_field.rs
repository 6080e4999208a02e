use glam::{Quat, Vec3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::math::Transform;
use crate::physics::{ColliderId, ColliderShape, CollisionWorld};

pub struct AsteroidFieldConfig {
    pub near_count: usize,
    pub near_span: f32,
    pub far_count: usize,
    pub far_span: f32,
    /// One collider variant per radius.
    pub radii: [f32; 6],
    /// Minimum distance between an asteroid centre and any kept-clear point.
    pub clearance: f32,
}

impl Default for AsteroidFieldConfig {
    fn default() -> Self {
        Self {
            near_count: 100,
            near_span: 20.0,
            far_count: 50,
            far_span: 80.0,
            radii: [0.8, 1.2, 1.6, 2.0, 2.5, 3.0],
            clearance: 8.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Asteroid {
    pub transform: Transform,
    pub variant: usize,
}

/// Static environment shared by ship and laser rays. Identical for identical seeds.
pub struct AsteroidField {
    asteroids: Vec<Asteroid>,
    radii: [f32; 6],
}

impl AsteroidField {
    const MAX_ATTEMPTS: usize = 16;

    pub fn generate(config: &AsteroidFieldConfig, seed: u64, keep_clear: &[Vec3]) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut asteroids = Vec::with_capacity(config.near_count + config.far_count);

        let layers = [
            (config.near_count, config.near_span),
            (config.far_count, config.far_span),
        ];
        for (count, span) in layers {
            for _ in 0..count {
                let Some(position) = Self::place(&mut rng, span, config.clearance, keep_clear)
                else {
                    continue;
                };

                let variant = rng.gen_range(0..config.radii.len());
                let axis = position.normalize_or(Vec3::Y);
                let orientation = Quat::from_axis_angle(axis, position.x);

                asteroids.push(Asteroid {
                    transform: Transform::new(position, orientation),
                    variant,
                });
            }
        }

        log::debug!("Generated {} asteroids from seed {}", asteroids.len(), seed);

        Self {
            asteroids,
            radii: config.radii,
        }
    }

    fn place(rng: &mut StdRng, span: f32, clearance: f32, keep_clear: &[Vec3]) -> Option<Vec3> {
        for _ in 0..Self::MAX_ATTEMPTS {
            let position = Vec3::new(
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
            ) * span;

            if keep_clear
                .iter()
                .all(|point| point.distance(position) >= clearance)
            {
                return Some(position);
            }
        }
        None
    }

    pub fn asteroids(&self) -> &[Asteroid] {
        &self.asteroids
    }

    pub fn len(&self) -> usize {
        self.asteroids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.asteroids.is_empty()
    }

    /// Registers one static collider per asteroid.
    pub fn populate<W: CollisionWorld + ?Sized>(&self, world: &mut W) -> Vec<ColliderId> {
        let meshes: Vec<_> = self
            .radii
            .iter()
            .map(|&radius| world.register_shape(ColliderShape::Ball { radius }))
            .collect();

        self.asteroids
            .iter()
            .map(|asteroid| world.create_collider(meshes[asteroid.variant], &asteroid.transform))
            .collect()
    }
}
