use crate::transform::Stamp;

use garnet_core::geometry::RigidTransform;
use garnet_core::glam::{Vec3, Vec3A};

/// An element of a [`PointCloud`]. Only the position is used for mapping, but clouds may carry anything else along.
pub trait CloudPoint: Clone + Send + Sync {
    fn position(&self) -> Vec3A;
}

impl CloudPoint for Vec3A {
    fn position(&self) -> Vec3A {
        *self
    }
}

impl CloudPoint for Vec3 {
    fn position(&self) -> Vec3A {
        Vec3A::from(*self)
    }
}

impl CloudPoint for [f32; 3] {
    fn position(&self) -> Vec3A {
        Vec3A::from(*self)
    }
}

/// Range measurements taken at one instant, expressed in the frame `frame_id`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PointCloud<P = Vec3A> {
    pub frame_id: String,
    pub stamp: Stamp,
    pub points: Vec<P>,
}

impl<P: CloudPoint> PointCloud<P> {
    pub fn new(frame_id: impl Into<String>, stamp: Stamp, points: Vec<P>) -> Self {
        Self {
            frame_id: frame_id.into(),
            stamp,
            points,
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Positions of all points after applying `tfm`.
    pub fn transformed_positions<'a>(
        &'a self,
        tfm: &'a RigidTransform,
    ) -> impl Iterator<Item = Vec3A> + 'a {
        self.points.iter().map(move |p| tfm.transform_point(p.position()))
    }
}
