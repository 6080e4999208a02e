use std::cell::Cell;

use glam::{Mat4, Quat, Vec3};

/// Position and orientation with a lazily rebuilt world matrix.
#[derive(Debug, Clone)]
pub struct Transform {
    position: Vec3,
    orientation: Quat,
    matrix: Cell<Option<Mat4>>,
}

impl Default for Transform {
    fn default() -> Self {
        Self::new(Vec3::ZERO, Quat::IDENTITY)
    }
}

impl PartialEq for Transform {
    fn eq(&self, other: &Self) -> bool {
        self.position == other.position && self.orientation == other.orientation
    }
}

impl Transform {
    pub fn new(position: Vec3, orientation: Quat) -> Self {
        Self {
            position,
            orientation,
            matrix: Cell::new(None),
        }
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn orientation(&self) -> Quat {
        self.orientation
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
        self.matrix.set(None);
    }

    pub fn add_position(&mut self, delta: Vec3) {
        self.set_position(self.position + delta);
    }

    pub fn set_orientation(&mut self, orientation: Quat) {
        self.orientation = orientation;
        self.matrix.set(None);
    }

    /// Local +Z rotated into world space.
    pub fn forward(&self) -> Vec3 {
        self.orientation * Vec3::Z
    }

    pub fn matrix(&self) -> Mat4 {
        if let Some(matrix) = self.matrix.get() {
            return matrix;
        }

        let matrix = Mat4::from_rotation_translation(self.orientation, self.position);
        self.matrix.set(Some(matrix));
        matrix
    }

    pub fn transform_point(&self, local: Vec3) -> Vec3 {
        self.matrix().transform_point3(local)
    }
}

/// Orientation at `position` whose +Z axis looks at `target`.
pub fn facing(position: Vec3, target: Vec3) -> Quat {
    let dir = (target - position).normalize_or_zero();
    if dir == Vec3::ZERO {
        return Quat::IDENTITY;
    }
    Quat::from_rotation_arc(Vec3::Z, dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matrix_invalidated_on_mutation() {
        let mut transform = Transform::default();
        assert_eq!(transform.transform_point(Vec3::ZERO), Vec3::ZERO);

        transform.set_position(Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(
            transform.transform_point(Vec3::ZERO),
            Vec3::new(1.0, 2.0, 3.0)
        );

        transform.add_position(Vec3::X);
        assert_eq!(transform.matrix().w_axis.x, 2.0);
    }

    #[test]
    fn test_facing_points_forward_at_target() {
        let position = Vec3::new(0.0, 0.0, 100.0);
        let orientation = facing(position, Vec3::ZERO);
        let forward = orientation * Vec3::Z;
        assert!((forward - Vec3::new(0.0, 0.0, -1.0)).length() < 1e-5);
    }
}
