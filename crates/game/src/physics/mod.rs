mod world;

use glam::Vec3;

use crate::math::Transform;

pub use world::PhysicsWorld;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ColliderId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ColliderMeshId(pub u32);

/// Collision geometry standing in for loaded collider meshes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ColliderShape {
    Ball { radius: f32 },
    Cuboid { half_extents: Vec3 },
}

impl ColliderShape {
    /// Box enclosing the hull probe end points.
    pub fn ship_hull() -> Self {
        ColliderShape::Cuboid {
            half_extents: Vec3::new(1.1, 0.5, 1.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub point: Vec3,
    pub distance: f32,
    pub collider: ColliderId,
}

/// Collider placement and ray queries consumed by the simulation.
pub trait CollisionWorld {
    fn register_shape(&mut self, shape: ColliderShape) -> ColliderMeshId;

    fn create_collider(&mut self, mesh: ColliderMeshId, transform: &Transform) -> ColliderId;

    fn set_transform(&mut self, collider: ColliderId, transform: &Transform);

    /// Unknown ids are ignored.
    fn remove_collider(&mut self, collider: ColliderId);

    /// Nearest hit within `max_distance` along the normalized `direction`.
    fn raycast(
        &self,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
        exclude: Option<ColliderId>,
    ) -> Option<RayHit>;

    /// Brings query structures up to date with collider changes.
    fn sync(&mut self) {}
}
