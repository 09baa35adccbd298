use crate::coordinates::{voxel_center, voxel_extent_containing};
use crate::grid::OverwriteGrid;
use crate::map::VoxelMap;

use crate::core::geometry::RigidTransform;
use crate::core::glam::Vec3A;

/// Voxel coordinates farther out than this can't be addressed by a section.
const MAX_SECTION_COORDINATE: i32 = 1 << 29;

/// An axis-aligned box, inclusive of its faces.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SectionBounds {
    pub min: Vec3A,
    pub max: Vec3A,
}

impl SectionBounds {
    pub fn new(min: Vec3A, max: Vec3A) -> Self {
        Self { min, max }
    }

    /// Takes `[min_x, min_y, min_z, max_x, max_y, max_z]`.
    pub fn from_array(a: [f32; 6]) -> Self {
        Self::new(Vec3A::new(a[0], a[1], a[2]), Vec3A::new(a[3], a[4], a[5]))
    }

    /// True if the box contains no points, including when any bound is NaN.
    pub fn is_empty(&self) -> bool {
        !self.min.cmple(self.max).all()
    }

    #[inline]
    pub fn contains(&self, p: Vec3A) -> bool {
        self.min.cmple(p).all() && p.cmple(self.max).all()
    }

    pub fn corners(&self) -> [Vec3A; 8] {
        let (a, b) = (self.min, self.max);
        [
            Vec3A::new(a.x, a.y, a.z),
            Vec3A::new(b.x, a.y, a.z),
            Vec3A::new(a.x, b.y, a.z),
            Vec3A::new(b.x, b.y, a.z),
            Vec3A::new(a.x, a.y, b.z),
            Vec3A::new(b.x, a.y, b.z),
            Vec3A::new(a.x, b.y, b.z),
            Vec3A::new(b.x, b.y, b.z),
        ]
    }
}

/// Copies the voxels of `map` whose centers lie inside `bounds`, where `bounds` is given in the requester's frame and
/// `requester_to_map` maps requester coordinates into map coordinates.
///
/// When the transform rotates, the box is not axis-aligned in the map, so every candidate voxel is tested in the requester
/// frame.
pub fn extract_section(
    map: &VoxelMap,
    bounds: &SectionBounds,
    requester_to_map: &RigidTransform,
) -> OverwriteGrid {
    let mut section = OverwriteGrid::new(map.resolution());
    if bounds.is_empty() {
        return section;
    }

    let corners = bounds.corners().map(|c| requester_to_map.transform_point(c));
    let (map_min, map_max) = corners
        .iter()
        .skip(1)
        .fold((corners[0], corners[0]), |(lo, hi), &c| (lo.min(c), hi.max(c)));
    if !(map_min.is_finite() && map_max.is_finite()) {
        return section;
    }

    let resolution = map.resolution();
    let limit = Vec3A::splat(MAX_SECTION_COORDINATE as f32 * resolution);
    let search = voxel_extent_containing(
        resolution,
        map_min.clamp(-limit, limit),
        map_max.clamp(-limit, limit),
    );
    let map_to_requester = requester_to_map.inverse();
    map.visit_voxels_in_extent(search, |p, value| {
        let center = voxel_center(resolution, p);
        if bounds.contains(map_to_requester.transform_point(center)) {
            section.insert(p.0, value);
        }
    });
    log::debug!("Extracted section of {} voxels", section.len());
    section
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
    use crate::core::glam::{IVec3, Quat};
    use crate::units::VoxelUnits;
    use std::f32::consts::FRAC_PI_4;

    fn grid_map() -> VoxelMap {
        let mut map = VoxelMap::new(1.0);
        for x in 0..10 {
            for y in 0..10 {
                for z in 0..3 {
                    map.insert(VoxelUnits(IVec3::new(x, y, z)), 0.01 * (x + y + z) as f32);
                }
            }
        }
        map
    }

    #[test]
    fn identity_covering_box_equals_snapshot() {
        let map = grid_map();
        let bounds = SectionBounds::new(Vec3A::ZERO, Vec3A::new(10.0, 10.0, 3.0));
        let section = extract_section(&map, &bounds, &RigidTransform::IDENTITY);
        assert_eq!(section, map.to_overwrite_grid());
    }

    #[test]
    fn box_outside_map_is_empty() {
        let map = grid_map();
        let bounds = SectionBounds::new(Vec3A::splat(100.0), Vec3A::splat(200.0));
        assert!(extract_section(&map, &bounds, &RigidTransform::IDENTITY).is_empty());

        let inverted = SectionBounds::new(Vec3A::splat(5.0), Vec3A::splat(1.0));
        assert!(inverted.is_empty());
        assert!(extract_section(&map, &inverted, &RigidTransform::IDENTITY).is_empty());
    }

    #[test]
    fn translated_box() {
        let map = grid_map();
        // The requester's origin sits at (5, 5, 0) in the map.
        let requester_to_map = RigidTransform::from_translation(Vec3A::new(5.0, 5.0, 0.0));
        let bounds = SectionBounds::new(Vec3A::ZERO, Vec3A::new(2.0, 2.0, 1.0));
        let section = extract_section(&map, &bounds, &requester_to_map);

        assert_eq!(section.len(), 4);
        for (p, v) in section.iter() {
            assert!((5..7).contains(&p.x) && (5..7).contains(&p.y) && p.z == 0, "{}", p);
            assert_eq!(Some(*v), map.get(VoxelUnits(*p)));
        }
    }

    #[test]
    fn rotated_box_is_clipped_per_voxel() {
        let map = grid_map();
        // A box rotated 45 degrees about z covers a diamond in the map, not its axis-aligned hull.
        let requester_to_map = RigidTransform::new(
            Quat::from_rotation_z(FRAC_PI_4),
            Vec3A::new(5.0, 5.0, 0.0),
        );
        let h = 2.0_f32.sqrt();
        let bounds = SectionBounds::new(Vec3A::new(-h, -h, 0.0), Vec3A::new(h, h, 1.0));
        let section = extract_section(&map, &bounds, &requester_to_map);

        assert!(!section.is_empty());
        let inverse = requester_to_map.inverse();
        for (p, _) in section.iter() {
            let center = voxel_center(1.0, VoxelUnits(*p));
            assert!(bounds.contains(inverse.transform_point(center)));
        }
        // Corner of the axis-aligned hull, but outside the diamond.
        assert_eq!(section.get(IVec3::new(3, 3, 0)), None);
        // Center of the diamond.
        assert!(section.get(IVec3::new(5, 5, 0)).is_some());
    }

    #[test]
    fn huge_box_does_not_overflow() {
        let map = grid_map();
        let bounds = SectionBounds::new(Vec3A::splat(-1.0e30), Vec3A::splat(1.0e30));
        let section = extract_section(&map, &bounds, &RigidTransform::IDENTITY);
        assert_eq!(section.len(), map.len());
    }
}
