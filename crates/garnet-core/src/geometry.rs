use crate::glam::{IVec3, Quat, Vec3A};

#[derive(Clone, Copy, Debug)]
pub struct Ray {
    pub start: Vec3A,
    velocity: Vec3A,
    inverse_velocity: Vec3A,
}

impl Ray {
    pub fn new(start: Vec3A, velocity: Vec3A) -> Self {
        Self {
            start,
            velocity,
            inverse_velocity: 1.0 / velocity,
        }
    }

    /// A ray that reaches `end` at `t = 1`.
    pub fn between(start: Vec3A, end: Vec3A) -> Self {
        Self::new(start, end - start)
    }

    pub fn velocity(&self) -> Vec3A {
        self.velocity
    }

    pub fn inverse_velocity(&self) -> Vec3A {
        self.inverse_velocity
    }

    /// Iterates over every unit cube of the integer lattice pierced by this ray, in order of entrance time.
    pub fn voxels(&self) -> VoxelRayIter {
        VoxelRayIter::new(self)
    }
}

/// Amanatides-Woo traversal of the unit lattice.
///
/// Yields `(t_entrance, voxel)` pairs, starting with the voxel that contains the ray's start at `t = 0`. The iterator never
/// terminates on its own for a moving ray; callers stop once `t_entrance` passes the end of their segment.
#[derive(Clone, Debug)]
pub struct VoxelRayIter {
    voxel: IVec3,
    step: IVec3,
    t_max: Vec3A,
    t_delta: Vec3A,
    t_entrance: f32,
}

impl VoxelRayIter {
    pub fn new(ray: &Ray) -> Self {
        let voxel = ray.start.floor().as_ivec3();
        let velocity = ray.velocity();
        let inverse_velocity = ray.inverse_velocity();

        let mut step = IVec3::ZERO;
        let mut t_max = Vec3A::splat(f32::INFINITY);
        let mut t_delta = Vec3A::splat(f32::INFINITY);
        for axis in 0..3 {
            let v = velocity[axis];
            if v > 0.0 {
                step[axis] = 1;
                t_delta[axis] = inverse_velocity[axis];
                t_max[axis] = (voxel[axis] as f32 + 1.0 - ray.start[axis]) * inverse_velocity[axis];
            } else if v < 0.0 {
                step[axis] = -1;
                t_delta[axis] = -inverse_velocity[axis];
                t_max[axis] = (voxel[axis] as f32 - ray.start[axis]) * inverse_velocity[axis];
            }
        }

        Self {
            voxel,
            step,
            t_max,
            t_delta,
            t_entrance: 0.0,
        }
    }
}

impl Iterator for VoxelRayIter {
    type Item = (f32, IVec3);

    fn next(&mut self) -> Option<Self::Item> {
        if !self.t_entrance.is_finite() {
            return None;
        }
        let item = (self.t_entrance, self.voxel);

        // Cross whichever boundary comes first.
        let axis = if self.t_max.x < self.t_max.y {
            if self.t_max.x < self.t_max.z {
                0
            } else {
                2
            }
        } else if self.t_max.y < self.t_max.z {
            1
        } else {
            2
        };
        self.t_entrance = self.t_max[axis];
        self.voxel[axis] += self.step[axis];
        self.t_max[axis] += self.t_delta[axis];

        Some(item)
    }
}

/// A rotation followed by a translation.
///
/// Maps points from a "source" frame into a "target" frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RigidTransform {
    pub rotation: Quat,
    pub translation: Vec3A,
}

impl Default for RigidTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl RigidTransform {
    pub const IDENTITY: Self = Self {
        rotation: Quat::IDENTITY,
        translation: Vec3A::ZERO,
    };

    pub fn new(rotation: Quat, translation: Vec3A) -> Self {
        Self {
            rotation: rotation.normalize(),
            translation,
        }
    }

    pub fn from_translation(translation: Vec3A) -> Self {
        Self {
            rotation: Quat::IDENTITY,
            translation,
        }
    }

    pub fn from_rotation(rotation: Quat) -> Self {
        Self::new(rotation, Vec3A::ZERO)
    }

    #[inline]
    pub fn transform_point(&self, p: Vec3A) -> Vec3A {
        self.rotation.mul_vec3a(p) + self.translation
    }

    pub fn inverse(&self) -> Self {
        let rotation = self.rotation.inverse();
        Self {
            rotation,
            translation: -rotation.mul_vec3a(self.translation),
        }
    }

    /// The transform that applies `other` first, then `self`.
    pub fn compose(&self, other: &Self) -> Self {
        Self {
            rotation: (self.rotation * other.rotation).normalize(),
            translation: self.transform_point(other.translation),
        }
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
