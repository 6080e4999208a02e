use std::collections::HashMap;

use glam::Vec3;
use rapier3d::prelude::*;

use crate::math::Transform;

use super::{ColliderId, ColliderMeshId, ColliderShape, CollisionWorld, RayHit};

fn to_pose(transform: &Transform) -> Pose {
    let p = transform.position();
    let q = transform.orientation();
    Pose::from_parts(
        Vector::new(p.x, p.y, p.z),
        Rotation::from_xyzw(q.x, q.y, q.z, q.w).normalize(),
    )
}

/// Static colliders only; stepping refreshes the broad phase used by ray queries.
pub struct PhysicsWorld {
    pipeline: PhysicsPipeline,
    integration_parameters: IntegrationParameters,
    islands: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd_solver: CCDSolver,
    gravity: Vector,
    shapes: Vec<SharedShape>,
    handles: HashMap<ColliderId, ColliderHandle>,
    next_collider_id: u32,
    dirty: bool,
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl PhysicsWorld {
    const TICK_RATE: Real = 1.0 / 50.0;

    pub fn new() -> Self {
        let mut integration_parameters = IntegrationParameters::default();
        integration_parameters.dt = Self::TICK_RATE;

        Self {
            pipeline: PhysicsPipeline::new(),
            integration_parameters,
            islands: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            gravity: Vector::new(0.0, 0.0, 0.0),
            shapes: Vec::new(),
            handles: HashMap::new(),
            next_collider_id: 1,
            dirty: false,
        }
    }

    pub fn collider_count(&self) -> usize {
        self.handles.len()
    }

    fn step(&mut self) {
        self.pipeline.step(
            self.gravity,
            &self.integration_parameters,
            &mut self.islands,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd_solver,
            &(),
            &(),
        );
    }
}

impl CollisionWorld for PhysicsWorld {
    fn register_shape(&mut self, shape: ColliderShape) -> ColliderMeshId {
        let shared = match shape {
            ColliderShape::Ball { radius } => SharedShape::ball(radius),
            ColliderShape::Cuboid { half_extents } => {
                SharedShape::cuboid(half_extents.x, half_extents.y, half_extents.z)
            }
        };
        self.shapes.push(shared);
        ColliderMeshId(self.shapes.len() as u32 - 1)
    }

    fn create_collider(&mut self, mesh: ColliderMeshId, transform: &Transform) -> ColliderId {
        let id = ColliderId(self.next_collider_id);
        self.next_collider_id += 1;

        let Some(shape) = self.shapes.get(mesh.0 as usize) else {
            log::warn!("Unknown collider mesh {}", mesh.0);
            return id;
        };

        let collider = ColliderBuilder::new(shape.clone())
            .position(to_pose(transform))
            .user_data(id.0 as u128)
            .build();
        let handle = self.colliders.insert(collider);
        self.handles.insert(id, handle);
        self.dirty = true;

        id
    }

    fn set_transform(&mut self, collider: ColliderId, transform: &Transform) {
        let Some(&handle) = self.handles.get(&collider) else {
            return;
        };

        if let Some(collider) = self.colliders.get_mut(handle) {
            collider.set_position(to_pose(transform));
            self.dirty = true;
        }
    }

    fn remove_collider(&mut self, collider: ColliderId) {
        let Some(handle) = self.handles.remove(&collider) else {
            return;
        };

        self.colliders
            .remove(handle, &mut self.islands, &mut self.bodies, true);
        self.dirty = true;
    }

    fn raycast(
        &self,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
        exclude: Option<ColliderId>,
    ) -> Option<RayHit> {
        let mut filter = QueryFilter::default();
        if let Some(&handle) = exclude.and_then(|id| self.handles.get(&id)) {
            filter = filter.exclude_collider(handle);
        }

        let query = self.broad_phase.as_query_pipeline(
            self.narrow_phase.query_dispatcher(),
            &self.bodies,
            &self.colliders,
            filter,
        );
        let ray = Ray::new(
            Vector::new(origin.x, origin.y, origin.z),
            Vector::new(direction.x, direction.y, direction.z),
        );

        let (handle, toi) = query.cast_ray(&ray, max_distance, true)?;
        let collider = self.colliders.get(handle)?;

        Some(RayHit {
            point: origin + direction * toi,
            distance: toi,
            collider: ColliderId(collider.user_data as u32),
        })
    }

    fn sync(&mut self) {
        if self.dirty {
            self.step();
            self.dirty = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use glam::Quat;

    use super::*;

    fn world_with_ball(at: Vec3) -> (PhysicsWorld, ColliderId) {
        let mut world = PhysicsWorld::new();
        let mesh = world.register_shape(ColliderShape::Ball { radius: 1.0 });
        let id = world.create_collider(mesh, &Transform::new(at, Quat::IDENTITY));
        world.sync();
        (world, id)
    }

    #[test]
    fn test_raycast_hits_ball() {
        let (world, id) = world_with_ball(Vec3::new(0.0, 0.0, 5.0));

        let hit = world.raycast(Vec3::ZERO, Vec3::Z, 10.0, None).unwrap();
        assert_eq!(hit.collider, id);
        assert!((hit.distance - 4.0).abs() < 1e-3);
        assert!((hit.point - Vec3::new(0.0, 0.0, 4.0)).length() < 1e-3);

        assert!(world.raycast(Vec3::ZERO, Vec3::Z, 3.0, None).is_none());
        assert!(world.raycast(Vec3::ZERO, Vec3::X, 10.0, None).is_none());
    }

    #[test]
    fn test_raycast_excludes_collider() {
        let (world, id) = world_with_ball(Vec3::ZERO);
        assert!(world.raycast(Vec3::ZERO, Vec3::Z, 2.0, None).is_some());
        assert!(world.raycast(Vec3::ZERO, Vec3::Z, 2.0, Some(id)).is_none());
    }

    #[test]
    fn test_moved_and_removed_colliders() {
        let (mut world, id) = world_with_ball(Vec3::new(0.0, 0.0, 5.0));

        world.set_transform(id, &Transform::new(Vec3::new(5.0, 0.0, 0.0), Quat::IDENTITY));
        world.sync();
        assert!(world.raycast(Vec3::ZERO, Vec3::Z, 10.0, None).is_none());
        assert!(world.raycast(Vec3::ZERO, Vec3::X, 10.0, None).is_some());

        world.remove_collider(id);
        world.remove_collider(id);
        world.sync();
        assert!(world.raycast(Vec3::ZERO, Vec3::X, 10.0, None).is_none());
        assert_eq!(world.collider_count(), 0);
    }
}
