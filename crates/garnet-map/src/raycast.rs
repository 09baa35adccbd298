use crate::config::{MapConfig, PRIOR_PROBABILITY};
use crate::coordinates::voxel_containing;
use crate::grid::{OverwriteGrid, UpdateGrid};
use crate::map::VoxelMap;
use crate::units::VoxelUnits;

use crate::core::geometry::Ray;
use crate::core::glam::{IVec3, Vec3A};

/// The diffs produced by inserting one point cloud.
#[derive(Clone, Debug, PartialEq)]
pub struct InsertionDiffs {
    /// Summed deltas of every ray. In reduce-data mode, only those that changed a classification.
    pub update: UpdateGrid,
    /// New values of the voxels whose classification changed. Only filled in reduce-data mode.
    pub overwrite: OverwriteGrid,
}

impl InsertionDiffs {
    pub fn empty(resolution: f32) -> Self {
        Self {
            update: UpdateGrid::new(resolution),
            overwrite: OverwriteGrid::new(resolution),
        }
    }
}

/// Turns range measurements into an [`UpdateGrid`] using an inverse sensor model.
///
/// The integrator holds no map state, so several clouds can be integrated in parallel.
#[derive(Clone, Debug)]
pub struct RaycastIntegrator {
    config: MapConfig,
    hit_delta: f32,
    miss_delta: f32,
}

impl RaycastIntegrator {
    pub fn new(config: &MapConfig) -> Self {
        Self {
            hit_delta: config.hit_delta(),
            miss_delta: config.miss_delta(),
            config: config.clone(),
        }
    }

    pub fn config(&self) -> &MapConfig {
        &self.config
    }

    /// Casts a ray from `origin` to every point, both in map coordinates.
    ///
    /// Every voxel a ray passes through before its endpoint gets a miss, and the endpoint voxel gets a hit. Rays longer than
    /// `max_range` are cut at `max_range` and contribute misses only, including to the voxel they were cut in. Zero-length
    /// and non-finite rays are skipped.
    pub fn integrate(&self, origin: Vec3A, points: impl IntoIterator<Item = Vec3A>) -> UpdateGrid {
        let mut update = UpdateGrid::new(self.config.resolution);
        if !origin.is_finite() {
            log::warn!("Ignoring point cloud with non-finite sensor origin {}", origin);
            return update;
        }

        let mut num_rays = 0;
        let mut num_skipped = 0;
        for point in points {
            if self.cast_ray(origin, point, &mut update) {
                num_rays += 1;
            } else {
                num_skipped += 1;
            }
        }
        log::debug!(
            "Integrated {} rays into {} voxels, skipped {}",
            num_rays,
            update.len(),
            num_skipped
        );
        update
    }

    fn cast_ray(&self, origin: Vec3A, point: Vec3A, update: &mut UpdateGrid) -> bool {
        if !point.is_finite() {
            return false;
        }
        let offset = point - origin;
        let length = offset.length();
        if length <= 0.0 {
            return false;
        }

        let (end, hit) = if length > self.config.max_range {
            (origin + offset * (self.config.max_range / length), false)
        } else {
            (point, true)
        };

        let resolution = self.config.resolution;
        let VoxelUnits(end_voxel) = voxel_containing(resolution, end);
        let VoxelUnits(start_voxel) = voxel_containing(resolution, origin);
        let ray = Ray::between(origin / resolution, end / resolution);

        // Rounding can make the traversal step around the end voxel, so it gets a generous budget.
        let max_steps = manhattan_distance(start_voxel, end_voxel) + 3;
        for (step, (t, voxel)) in ray.voxels().enumerate() {
            if voxel == end_voxel || t > 1.0 || step as u64 >= max_steps {
                break;
            }
            update.add_delta(voxel, self.miss_delta);
        }
        update.add_delta(end_voxel, if hit { self.hit_delta } else { self.miss_delta });
        true
    }

    /// Keeps only the entries of `update` that would change the classification of their voxel in `map`.
    ///
    /// Applying the reduced grid to `map` gives the same classification as applying `update` for every voxel it keeps.
    pub fn reduce_update(&self, update: &UpdateGrid, map: &VoxelMap) -> UpdateGrid {
        let mut reduced = UpdateGrid::new(update.resolution());
        for (&p, &delta) in update.iter() {
            let current = map.get(VoxelUnits(p)).unwrap_or(PRIOR_PROBABILITY);
            let updated = self.config.accumulate(current, delta);
            if self.config.classify(updated) != self.config.classify(current) {
                reduced.insert(p, delta);
            }
        }
        log::debug!(
            "Reduced update from {} to {} voxels",
            update.len(),
            reduced.len()
        );
        reduced
    }
}

fn manhattan_distance(a: IVec3, b: IVec3) -> u64 {
    (0..3)
        .map(|axis| (b[axis] as i64 - a[axis] as i64).unsigned_abs())
        .sum()
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
