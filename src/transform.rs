use garnet_core::geometry::RigidTransform;
use garnet_core::SmallKeyHashSet;

use parking_lot::RwLock;
use std::collections::VecDeque;
use std::fmt;
use thiserror::Error;

/// The acquisition time of a measurement in nanoseconds. [`Stamp::LATEST`] asks for the most recent data available.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Stamp(pub u64);

impl Stamp {
    pub const LATEST: Self = Self(0);
}

impl fmt::Display for Stamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::LATEST {
            write!(f, "latest")
        } else {
            write!(f, "{}ns", self.0)
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq)]
#[error("no transform from {source_frame:?} to {target_frame:?} at {stamp}: {reason}")]
pub struct TransformUnavailable {
    pub target_frame: String,
    pub source_frame: String,
    pub stamp: Stamp,
    pub reason: String,
}

/// Resolves coordinate frames.
pub trait TransformOracle: Send + Sync {
    /// Returns the transform that maps points in `source_frame` into `target_frame`, as it was at `stamp`.
    fn lookup(
        &self,
        target_frame: &str,
        source_frame: &str,
        stamp: Stamp,
    ) -> Result<RigidTransform, TransformUnavailable>;
}

/// A [`TransformOracle`] over a tree of fixed transforms that ignores time.
///
/// Each edge maps a child frame into its parent frame. Lookups chain edges in either direction.
#[derive(Default)]
pub struct StaticTransforms {
    edges: RwLock<Vec<Edge>>,
}

struct Edge {
    parent: String,
    child: String,
    child_to_parent: RigidTransform,
}

impl StaticTransforms {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the transform that maps points in `child` into `parent`, replacing any previous one.
    pub fn set(&self, parent: &str, child: &str, child_to_parent: RigidTransform) {
        let mut edges = self.edges.write();
        edges.retain(|e| !(e.parent == parent && e.child == child));
        edges.push(Edge {
            parent: parent.to_owned(),
            child: child.to_owned(),
            child_to_parent,
        });
    }

    pub fn with(self, parent: &str, child: &str, child_to_parent: RigidTransform) -> Self {
        self.set(parent, child, child_to_parent);
        self
    }

    pub fn remove(&self, parent: &str, child: &str) {
        self.edges
            .write()
            .retain(|e| !(e.parent == parent && e.child == child));
    }
}

impl TransformOracle for StaticTransforms {
    fn lookup(
        &self,
        target_frame: &str,
        source_frame: &str,
        stamp: Stamp,
    ) -> Result<RigidTransform, TransformUnavailable> {
        let unavailable = |reason: &str| TransformUnavailable {
            target_frame: target_frame.to_owned(),
            source_frame: source_frame.to_owned(),
            stamp,
            reason: reason.to_owned(),
        };

        if target_frame.is_empty() || source_frame.is_empty() {
            return Err(unavailable("empty frame id"));
        }
        if target_frame == source_frame {
            return Ok(RigidTransform::IDENTITY);
        }

        // Breadth-first search, carrying the transform from the source frame into the frame being visited.
        let edges = self.edges.read();
        let mut visited = SmallKeyHashSet::default();
        visited.insert(source_frame);
        let mut queue = VecDeque::from([(source_frame, RigidTransform::IDENTITY)]);
        while let Some((frame, source_to_frame)) = queue.pop_front() {
            if frame == target_frame {
                return Ok(source_to_frame);
            }
            for edge in edges.iter() {
                let (next, step) = if edge.child == frame {
                    (edge.parent.as_str(), edge.child_to_parent)
                } else if edge.parent == frame {
                    (edge.child.as_str(), edge.child_to_parent.inverse())
                } else {
                    continue;
                };
                if visited.insert(next) {
                    queue.push_back((next, step.compose(&source_to_frame)));
                }
            }
        }

        Err(unavailable("frames are not connected"))
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝

#[cfg(test)]
mod test {
    use super::*;

    use approx::assert_relative_eq;
    use garnet_core::glam::{Quat, Vec3A};
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn chains_edges_in_both_directions() {
        let transforms = StaticTransforms::new()
            .with("map", "odom", RigidTransform::from_translation(Vec3A::new(1.0, 0.0, 0.0)))
            .with("odom", "base", RigidTransform::from_rotation(Quat::from_rotation_z(FRAC_PI_2)))
            .with("base", "lidar", RigidTransform::from_translation(Vec3A::new(0.0, 0.0, 2.0)));

        let lidar_to_map = transforms.lookup("map", "lidar", Stamp::LATEST).unwrap();
        let p = lidar_to_map.transform_point(Vec3A::new(1.0, 0.0, 0.0));
        assert_relative_eq!(p.x, 1.0, epsilon = 1e-6);
        assert_relative_eq!(p.y, 1.0, epsilon = 1e-6);
        assert_relative_eq!(p.z, 2.0, epsilon = 1e-6);

        let map_to_lidar = transforms.lookup("lidar", "map", Stamp(42)).unwrap();
        let back = map_to_lidar.transform_point(p);
        assert_relative_eq!(back.x, 1.0, epsilon = 1e-6);
        assert_relative_eq!(back.y, 0.0, epsilon = 1e-6);
        assert_relative_eq!(back.z, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn unknown_frames_are_unavailable() {
        let transforms = StaticTransforms::new().with("map", "odom", RigidTransform::IDENTITY);
        let err = transforms.lookup("map", "camera", Stamp(7)).unwrap_err();
        assert_eq!(err.source_frame, "camera");
        assert_eq!(err.stamp, Stamp(7));

        assert!(transforms.lookup("", "odom", Stamp::LATEST).is_err());
        assert_eq!(
            transforms.lookup("odom", "odom", Stamp::LATEST),
            Ok(RigidTransform::IDENTITY)
        );

        transforms.remove("map", "odom");
        assert!(transforms.lookup("map", "odom", Stamp::LATEST).is_err());
    }
}
