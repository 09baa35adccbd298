use crate::{
    chunk::{CHUNK_SHAPE_IVEC3, CHUNK_SHAPE_LOG2_IVEC3},
    units::*,
};

use crate::core::glam::{IVec3, Vec3A};
use crate::core::extent::Extent;

/// Returns the voxel that contains the map-frame point `p`.
pub fn voxel_containing(resolution: f32, p: Vec3A) -> VoxelUnits<IVec3> {
    VoxelUnits((p / resolution).floor().as_ivec3())
}

/// Returns the map-frame center of `voxel`.
pub fn voxel_center(resolution: f32, voxel: VoxelUnits<IVec3>) -> Vec3A {
    (voxel.0.as_vec3a() + Vec3A::splat(0.5)) * resolution
}

/// The smallest voxel extent containing every point of the map-frame box `[min, max]`.
pub fn voxel_extent_containing(
    resolution: f32,
    min: Vec3A,
    max: Vec3A,
) -> VoxelUnits<Extent<IVec3>> {
    let VoxelUnits(min) = voxel_containing(resolution, min);
    let VoxelUnits(max) = voxel_containing(resolution, max);
    VoxelUnits(Extent::from_min_and_max(min, max))
}

pub fn chunk_min(coordinates: ChunkUnits<IVec3>) -> VoxelUnits<IVec3> {
    VoxelUnits(coordinates.0 << CHUNK_SHAPE_LOG2_IVEC3)
}

pub fn chunk_extent_ivec3(coordinates: ChunkUnits<IVec3>) -> VoxelUnits<Extent<IVec3>> {
    chunk_min(coordinates).map(|m| Extent::from_min_and_shape(m, CHUNK_SHAPE_IVEC3))
}

/// Returns the [`ChunkUnits`] coordinates of the chunk that contains `p`.
pub fn in_chunk(p: VoxelUnits<IVec3>) -> ChunkUnits<IVec3> {
    ChunkUnits(p.0 >> CHUNK_SHAPE_LOG2_IVEC3)
}

/// Transforms a [`VoxelUnits`] extent `e` into a [`ChunkUnits`] extent `e'` that contains the coordinates of all chunks
/// intersected by `e`.
pub fn in_chunk_extent(e: VoxelUnits<Extent<IVec3>>) -> ChunkUnits<Extent<IVec3>> {
    ChunkUnits(Extent::from_min_and_max(
        e.0.minimum >> CHUNK_SHAPE_LOG2_IVEC3,
        e.0.max() >> CHUNK_SHAPE_LOG2_IVEC3,
    ))
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

    #[test]
    fn negative_points_round_down() {
        assert_eq!(
            voxel_containing(0.5, Vec3A::new(-0.1, 0.1, -0.6)),
            VoxelUnits(IVec3::new(-1, 0, -2))
        );
        assert_eq!(
            in_chunk(VoxelUnits(IVec3::new(-1, 15, 16))),
            ChunkUnits(IVec3::new(-1, 0, 1))
        );
    }

    #[test]
    fn chunk_extent_covers_partial_chunks() {
        let voxels = VoxelUnits(Extent::from_min_and_max(
            IVec3::new(-3, 0, 15),
            IVec3::new(3, 0, 17),
        ));
        let ChunkUnits(chunks) = in_chunk_extent(voxels);
        assert_eq!(chunks.minimum, IVec3::new(-1, 0, 0));
        assert_eq!(chunks.max(), IVec3::new(0, 0, 1));
    }

    #[test]
    fn voxel_center_is_inside_voxel() {
        let voxel = voxel_containing(0.2, Vec3A::new(1.03, -0.07, 0.0));
        let center = voxel_center(0.2, voxel);
        assert_eq!(voxel_containing(0.2, center), voxel);
    }
}
