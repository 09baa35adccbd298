use crate::config::{ConfigError, MapConfig, PRIOR_PROBABILITY};
use crate::database::{load_map_from_path, save_map_to_path, PersistenceError};
use crate::grid::{GridValue, OverwriteGrid, UpdateGrid};
use crate::map::{MapSnapshot, VoxelMap};
use crate::units::VoxelUnits;

use parking_lot::RwLock;
use std::path::Path;
use std::sync::Arc;

/// The authoritative [`VoxelMap`] of one mapping node.
///
/// Writers are serialized by a lock, and readers get a [`MapSnapshot`] that never changes after it's returned. A writer only
/// copies the chunks it touches, and only while some snapshot still shares them.
pub struct VoxelMapStore {
    config: MapConfig,
    map: RwLock<MapSnapshot>,
}

impl VoxelMapStore {
    pub fn new(config: MapConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let map = RwLock::new(Arc::new(VoxelMap::new(config.resolution)));
        Ok(Self { config, map })
    }

    pub fn config(&self) -> &MapConfig {
        &self.config
    }

    pub fn resolution(&self) -> f32 {
        self.config.resolution
    }

    pub fn get_map(&self) -> MapSnapshot {
        self.map.read().clone()
    }

    fn write(&self, f: impl FnOnce(&mut VoxelMap)) {
        let mut map = self.map.write();
        f(Arc::make_mut(&mut map));
    }

    /// Combines each delta with its voxel's value, starting from the prior for voxels that don't have one yet.
    pub fn apply_update<T: GridValue>(&self, update: &UpdateGrid<T>) {
        if update.is_empty() {
            return;
        }
        let config = &self.config;
        self.write(|map| {
            for (&p, &delta) in update.iter() {
                map.update_voxel(VoxelUnits(p), |old| {
                    config.accumulate(old.unwrap_or(PRIOR_PROBABILITY), delta.to_f32())
                });
            }
        });
        log::trace!("Applied update of {} voxels", update.len());
    }

    /// Like [`Self::apply_update`], but also returns the new absolute value of every voxel whose classification changed.
    ///
    /// A voxel seen for the first time counts as changed unless it's still uncertain.
    pub fn apply_update_collapsing<T: GridValue>(&self, update: &UpdateGrid<T>) -> OverwriteGrid {
        let mut changed = OverwriteGrid::new(self.config.resolution);
        if update.is_empty() {
            return changed;
        }
        let config = &self.config;
        self.write(|map| {
            for (&p, &delta) in update.iter() {
                let (old, new) = map.update_voxel(VoxelUnits(p), |old| {
                    config.accumulate(old.unwrap_or(PRIOR_PROBABILITY), delta.to_f32())
                });
                let old_class = config.classify(old.unwrap_or(PRIOR_PROBABILITY));
                if config.classify(new) != old_class {
                    changed.insert(p, new);
                }
            }
        });
        changed
    }

    /// Replaces the value of every listed voxel. Voxels not in `overwrite` are untouched.
    pub fn apply_overwrite<T: GridValue>(&self, overwrite: &OverwriteGrid<T>) {
        if overwrite.is_empty() {
            return;
        }
        self.write(|map| {
            for (&p, &value) in overwrite.iter() {
                map.insert(VoxelUnits(p), value.to_f32());
            }
        });
        log::trace!("Applied overwrite of {} voxels", overwrite.len());
    }

    /// Empties the map. Snapshots taken before the reset are unaffected.
    pub fn reset(&self) {
        *self.map.write() = Arc::new(VoxelMap::new(self.config.resolution));
    }

    /// Writes the current map to `path`. Writers wait until the save is done.
    pub fn try_save(&self, path: impl AsRef<Path>) -> Result<(), PersistenceError> {
        let map = self.map.read();
        save_map_to_path(path, &map)
    }

    /// Replaces the current map with the one stored at `path`. The map is untouched if loading fails.
    pub fn try_load(&self, path: impl AsRef<Path>) -> Result<(), PersistenceError> {
        let mut map = self.map.write();
        let loaded = load_map_from_path(path)?;
        if loaded.resolution() != self.config.resolution {
            return Err(PersistenceError::Incompatible(format!(
                "stored map has resolution {}, expected {}",
                loaded.resolution(),
                self.config.resolution
            )));
        }
        *map = Arc::new(loaded);
        Ok(())
    }

    pub fn save(&self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        match self.try_save(path) {
            Ok(()) => {
                log::info!("Saved map to {:?}", path);
                true
            }
            Err(e) => {
                log::error!("Failed to save map to {:?}: {}", path, e);
                false
            }
        }
    }

    pub fn load(&self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        match self.try_load(path) {
            Ok(()) => {
                log::info!("Loaded map from {:?}", path);
                true
            }
            Err(e) => {
                log::error!("Failed to load map from {:?}: {}", path, e);
                false
            }
        }
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
    use crate::config::{Occupancy, ProbabilityModel};
    use crate::core::approx::assert_relative_eq;
    use crate::core::glam::IVec3;

    fn store() -> VoxelMapStore {
        VoxelMapStore::new(MapConfig {
            resolution: 1.0,
            ..Default::default()
        })
        .unwrap()
    }

    fn update(entries: &[(IVec3, f32)]) -> UpdateGrid {
        let mut grid = UpdateGrid::new(1.0);
        for &(p, d) in entries {
            grid.add_delta(p, d);
        }
        grid
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = MapConfig {
            prob_thres_min: 0.5,
            prob_thres_max: 0.5,
            ..Default::default()
        };
        assert!(VoxelMapStore::new(config).is_err());
    }

    #[test]
    fn update_starts_from_prior() {
        for model in [ProbabilityModel::Linear, ProbabilityModel::LogOdds] {
            let store = VoxelMapStore::new(MapConfig {
                resolution: 1.0,
                model,
                ..Default::default()
            })
            .unwrap();
            let hit = store.config().hit_delta();
            store.apply_update(&update(&[(IVec3::ZERO, hit)]));
            assert_relative_eq!(
                store.get_map().get(VoxelUnits(IVec3::ZERO)).unwrap(),
                0.7,
                epsilon = 1e-6
            );
        }
    }

    #[test]
    fn sequential_updates_equal_summed_update() {
        let a = update(&[(IVec3::ZERO, 0.8), (IVec3::X, -0.4)]);
        let b = update(&[(IVec3::ZERO, -0.4), (IVec3::Y, 0.8)]);
        let c = update(&[(IVec3::ZERO, 0.8), (IVec3::X, -0.4)]);

        let one_by_one = store();
        for u in [&a, &b, &c] {
            one_by_one.apply_update(u);
        }

        let mut summed = a.clone();
        summed.merge(&b);
        summed.merge(&c);
        let all_at_once = store();
        all_at_once.apply_update(&summed);

        let (m1, m2) = (one_by_one.get_map(), all_at_once.get_map());
        assert_eq!(m1.len(), m2.len());
        for (p, v) in m1.iter() {
            assert_relative_eq!(v, m2.get(p).unwrap(), epsilon = 1e-5);
        }
    }

    #[test]
    fn saturated_voxel_can_be_cleared() {
        let store = store();
        let config = store.config().clone();
        let (hit, miss) = (config.hit_delta(), config.miss_delta());
        let value = || store.get_map().get(VoxelUnits(IVec3::ZERO)).unwrap();

        for _ in 0..25 {
            store.apply_update(&update(&[(IVec3::ZERO, hit)]));
        }
        assert!(value() < 1.0);
        assert_eq!(config.classify(value()), Occupancy::Occupied);

        for _ in 0..25 {
            store.apply_update(&update(&[(IVec3::ZERO, -hit)]));
        }
        assert!(value() > 0.0);
        assert_eq!(config.classify(value()), Occupancy::Free);

        // An absolute overwrite to certainty can still be lowered by a miss.
        let mut overwrite = OverwriteGrid::<f32>::new(1.0);
        overwrite.insert(IVec3::ZERO, 1.0);
        store.apply_overwrite(&overwrite);
        store.apply_update(&update(&[(IVec3::ZERO, miss)]));
        assert!(value() < 1.0);
    }

    #[test]
    fn realistic_deltas_are_additive() {
        let config = store().config().clone();
        let (hit, miss) = (config.hit_delta(), config.miss_delta());

        let one_by_one = store();
        for _ in 0..5 {
            one_by_one.apply_update(&update(&[(IVec3::ZERO, hit)]));
            one_by_one.apply_update(&update(&[(IVec3::ZERO, miss)]));
        }
        let summed = store();
        summed.apply_update(&update(&[(IVec3::ZERO, 5.0 * (hit + miss))]));

        assert_relative_eq!(
            one_by_one.get_map().get(VoxelUnits(IVec3::ZERO)).unwrap(),
            summed.get_map().get(VoxelUnits(IVec3::ZERO)).unwrap(),
            epsilon = 1e-5
        );
    }

    #[test]
    fn overwrite_is_idempotent() {
        let store = store();
        store.apply_update(&update(&[(IVec3::ZERO, 0.8), (IVec3::X, -0.4)]));

        let mut overwrite = OverwriteGrid::<f32>::new(1.0);
        overwrite.insert(IVec3::ZERO, 0.2);
        overwrite.insert(IVec3::Z, 0.99);

        store.apply_overwrite(&overwrite);
        let once = store.get_map().to_overwrite_grid();
        store.apply_overwrite(&overwrite);
        let twice = store.get_map().to_overwrite_grid();

        assert_eq!(once, twice);
        assert_eq!(once.get(IVec3::ZERO), Some(&0.2));
        assert_eq!(once.len(), 3);
    }

    #[test]
    fn snapshots_survive_mutation_and_reset() {
        let store = store();
        store.apply_update(&update(&[(IVec3::ZERO, 0.8)]));
        let before = store.get_map();

        store.apply_update(&update(&[(IVec3::ZERO, 0.8), (IVec3::X, 0.8)]));
        assert_eq!(before.len(), 1);

        store.reset();
        assert!(store.get_map().is_empty());
        assert_eq!(before.len(), 1);

        // Operations after a reset start from nothing.
        store.apply_update(&update(&[(IVec3::Y, -0.4)]));
        assert_eq!(store.get_map().len(), 1);
        assert_eq!(store.get_map().get(VoxelUnits(IVec3::ZERO)), None);
    }

    #[test]
    fn collapsing_reports_classification_changes() {
        let store = store();
        let config = store.config().clone();

        let big_hit = update(&[(IVec3::ZERO, 10.0), (IVec3::X, 0.1)]);
        let changed = store.apply_update_collapsing(&big_hit);
        assert_eq!(changed.len(), 1);
        let value = *changed.get(IVec3::ZERO).unwrap();
        assert_eq!(config.classify(value), Occupancy::Occupied);
        assert_eq!(store.get_map().get(VoxelUnits(IVec3::ZERO)), Some(value));

        // Already occupied; nothing changes.
        let changed = store.apply_update_collapsing(&update(&[(IVec3::ZERO, 1.0)]));
        assert!(changed.is_empty());
    }

    #[test]
    fn readers_never_see_partial_writes() {
        let store = store();
        let voxels: Vec<IVec3> = (0..40).map(|i| IVec3::new(i * 7, -i, i % 3)).collect();

        crossbeam::scope(|s| {
            s.spawn(|_| {
                for step in 1..=50 {
                    let mut overwrite = OverwriteGrid::<f32>::new(1.0);
                    for &p in voxels.iter() {
                        overwrite.insert(p, step as f32 / 50.0);
                    }
                    store.apply_overwrite(&overwrite);
                }
            });
            for _ in 0..4 {
                s.spawn(|_| {
                    for _ in 0..200 {
                        let map = store.get_map();
                        let mut values = map.iter().map(|(_, v)| v);
                        if let Some(first) = values.next() {
                            assert!(values.all(|v| v == first));
                            assert_eq!(map.len(), voxels.len());
                        }
                    }
                });
            }
        })
        .unwrap();

        assert_eq!(store.get_map().get(VoxelUnits(voxels[5])), Some(1.0));
    }

    #[test]
    fn save_and_load() {
        let dir = std::env::temp_dir().join(format!("garnet-store-test-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);

        let store = store();
        assert!(!store.load(&dir));

        store.apply_update(&update(&[(IVec3::ZERO, 0.8), (IVec3::new(-30, 2, 2), -0.4)]));
        let saved = store.get_map();
        assert!(store.save(&dir));

        store.reset();
        assert!(store.load(&dir));
        let loaded = store.get_map();
        assert_eq!(loaded.len(), saved.len());
        for (p, v) in saved.iter() {
            assert_eq!(loaded.get(p), Some(v));
        }

        // A store with a different resolution refuses the map and keeps its own.
        let other = VoxelMapStore::new(MapConfig {
            resolution: 0.5,
            ..Default::default()
        })
        .unwrap();
        other.apply_overwrite(&{
            let mut g = OverwriteGrid::<f32>::new(0.5);
            g.insert(IVec3::ONE, 0.3);
            g
        });
        assert!(matches!(
            other.try_load(&dir),
            Err(PersistenceError::Incompatible(_))
        ));
        assert_eq!(other.get_map().len(), 1);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
