use crate::chunk::{delinearize_in_chunk, linearize_in_chunk, Chunk};
use crate::config::{MapConfig, Occupancy};
use crate::coordinates::{chunk_extent_ivec3, chunk_min, in_chunk, in_chunk_extent, voxel_center};
use crate::grid::OverwriteGrid;
use crate::units::*;

use crate::core::extent::Extent;
use crate::core::glam::{IVec3, Vec3A};
use crate::core::SmallKeyHashMap;

use std::sync::Arc;

/// A read-only, point-in-time view of a [`VoxelMap`].
pub type MapSnapshot = Arc<VoxelMap>;

/// A sparse field of occupancy probabilities.
///
/// Chunks are shared with copy-on-write semantics, so cloning a map only copies the chunk table, and mutating a clone only
/// copies the chunks that are touched.
#[derive(Clone, Debug)]
pub struct VoxelMap {
    resolution: f32,
    chunks: SmallKeyHashMap<IVec3, Arc<Chunk>>,
}

impl VoxelMap {
    pub fn new(resolution: f32) -> Self {
        Self {
            resolution,
            chunks: Default::default(),
        }
    }

    pub fn resolution(&self) -> f32 {
        self.resolution
    }

    /// The number of voxels that have a value.
    pub fn len(&self) -> usize {
        self.chunks.values().map(|c| c.num_present()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.values().all(|c| c.is_empty())
    }

    pub fn num_chunks(&self) -> usize {
        self.chunks.len()
    }

    pub fn get(&self, voxel: VoxelUnits<IVec3>) -> Option<f32> {
        let ChunkUnits(chunk_coords) = in_chunk(voxel);
        self.chunks
            .get(&chunk_coords)
            .and_then(|c| c.get(linearize_in_chunk(voxel.0)))
    }

    pub fn classify(&self, voxel: VoxelUnits<IVec3>, config: &MapConfig) -> Option<Occupancy> {
        self.get(voxel).map(|v| config.classify(v))
    }

    /// Sets the value of `voxel`, returning the previous value if there was one.
    pub fn insert(&mut self, voxel: VoxelUnits<IVec3>, value: f32) -> Option<f32> {
        self.update_voxel(voxel, |_| value).0
    }

    /// Replaces the value of `voxel` with `f(old_value)`. Returns the old and new values.
    pub fn update_voxel(
        &mut self,
        voxel: VoxelUnits<IVec3>,
        f: impl FnOnce(Option<f32>) -> f32,
    ) -> (Option<f32>, f32) {
        let ChunkUnits(chunk_coords) = in_chunk(voxel);
        let chunk = Arc::make_mut(self.chunks.entry(chunk_coords).or_default());
        let index = linearize_in_chunk(voxel.0);
        let old = chunk.get(index);
        let new = f(old);
        chunk.set(index, new);
        (old, new)
    }

    /// Replaces a whole chunk. Empty chunks are dropped.
    pub fn insert_chunk(&mut self, coordinates: ChunkUnits<IVec3>, chunk: Chunk) {
        if chunk.is_empty() {
            self.chunks.remove(&coordinates.0);
        } else {
            self.chunks.insert(coordinates.0, Arc::new(chunk));
        }
    }

    pub fn chunks(&self) -> impl Iterator<Item = (ChunkUnits<IVec3>, &Chunk)> {
        self.chunks.iter().map(|(&p, c)| (ChunkUnits(p), c.as_ref()))
    }

    /// Iterates over all voxels with a value, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (VoxelUnits<IVec3>, f32)> + '_ {
        self.chunks.iter().flat_map(|(&chunk_coords, chunk)| {
            let VoxelUnits(min) = chunk_min(ChunkUnits(chunk_coords));
            chunk
                .iter()
                .map(move |(i, v)| (VoxelUnits(min + delinearize_in_chunk(i)), v))
        })
    }

    /// Calls `visitor` on every voxel with a value inside of `extent`.
    pub fn visit_voxels_in_extent(
        &self,
        extent: VoxelUnits<Extent<IVec3>>,
        mut visitor: impl FnMut(VoxelUnits<IVec3>, f32),
    ) {
        if extent.0.is_empty() {
            return;
        }
        let ChunkUnits(chunk_extent) = in_chunk_extent(extent);

        let mut visit_chunk = |chunk_coords: IVec3, chunk: &Chunk| {
            let VoxelUnits(bounds) = chunk_extent_ivec3(ChunkUnits(chunk_coords));
            let clipped = bounds.intersection(&extent.0);
            if clipped == bounds {
                let VoxelUnits(min) = chunk_min(ChunkUnits(chunk_coords));
                for (i, v) in chunk.iter() {
                    visitor(VoxelUnits(min + delinearize_in_chunk(i)), v);
                }
            } else {
                for p in clipped.iter3() {
                    if let Some(v) = chunk.get(linearize_in_chunk(p)) {
                        visitor(VoxelUnits(p), v);
                    }
                }
            }
        };

        // Whichever is smaller: the chunks we have or the chunks the extent covers.
        if chunk_extent.volume() <= self.chunks.len() as i128 {
            for chunk_coords in chunk_extent.iter3() {
                if let Some(chunk) = self.chunks.get(&chunk_coords) {
                    visit_chunk(chunk_coords, &**chunk);
                }
            }
        } else {
            for (&chunk_coords, chunk) in self.chunks.iter() {
                if chunk_extent.contains(chunk_coords) {
                    visit_chunk(chunk_coords, &**chunk);
                }
            }
        }
    }

    /// Copies every voxel into an [`OverwriteGrid`].
    pub fn to_overwrite_grid(&self) -> OverwriteGrid {
        let mut grid = OverwriteGrid::new(self.resolution);
        grid.values.reserve(self.len());
        for (VoxelUnits(p), v) in self.iter() {
            grid.insert(p, v);
        }
        grid
    }

    /// Map-frame centers of all occupied voxels, optionally limited to centers with `z_limits[0] <= z <= z_limits[1]`.
    pub fn occupied_voxel_centers(
        &self,
        config: &MapConfig,
        z_limits: Option<[f32; 2]>,
    ) -> Vec<Vec3A> {
        self.iter()
            .filter(|&(_, v)| config.classify(v) == Occupancy::Occupied)
            .map(|(p, _)| voxel_center(self.resolution, p))
            .filter(|c| z_limits.map_or(true, |[lo, hi]| lo <= c.z && c.z <= hi))
            .collect()
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
