use crate::config::{NodeConfig, RemoteSourceConfig};
use crate::error::MapError;
use crate::transform::Stamp;

use garnet_core::approx::relative_eq;
use garnet_map::{
    decode_overwrite, decode_update, InsertionDiffs, OverwriteGrid, RaycastIntegrator,
    SectionBounds, UpdateGrid, VoxelMapStore,
};

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A request for every voxel inside of `bounds`, where `bounds` is expressed in `frame_id`.
#[derive(Clone, Debug, PartialEq)]
pub struct SectionRequest {
    pub frame_id: String,
    pub stamp: Stamp,
    pub bounds: SectionBounds,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SectionResponse {
    pub success: bool,
    /// An encoded [`OverwriteGrid`]. Empty unless `success`.
    pub map: Vec<u8>,
}

impl SectionResponse {
    pub fn failure() -> Self {
        Self::default()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ResetResponse {
    pub success: bool,
    pub message: String,
}

/// Fetches map sections from a remote node.
pub trait SectionClient: Send + Sync {
    fn get_map_section(&self, request: &SectionRequest) -> SectionResponse;
}

pub struct RemoteSource {
    config: RemoteSourceConfig,
    section_client: Option<Arc<dyn SectionClient>>,
}

impl RemoteSource {
    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn applies_updates(&self) -> bool {
        self.config.apply_remote_updates
    }

    pub fn applies_overwrites(&self) -> bool {
        self.config.apply_remote_overwrites
    }

    pub fn section_client(&self) -> Option<&dyn SectionClient> {
        self.section_client.as_deref()
    }
}

/// The remote nodes this node accepts diffs from, by id.
#[derive(Default)]
pub struct RemoteSources {
    sources: BTreeMap<String, RemoteSource>,
}

impl RemoteSources {
    pub fn new(configs: &[RemoteSourceConfig]) -> Self {
        let sources = configs
            .iter()
            .map(|config| {
                let source = RemoteSource {
                    config: config.clone(),
                    section_client: None,
                };
                (config.id.clone(), source)
            })
            .collect();
        Self { sources }
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Sorted.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.sources.keys().map(|id| id.as_str())
    }

    pub fn get(&self, id: &str) -> Result<&RemoteSource, MapError> {
        self.sources.get(id).ok_or_else(|| MapError::UnknownRemoteSource {
            id: id.to_owned(),
            available: self.ids().map(str::to_owned).collect(),
        })
    }

    pub(crate) fn set_section_client(
        &mut self,
        id: &str,
        client: Arc<dyn SectionClient>,
    ) -> Result<(), MapError> {
        let available: Vec<String> = self.ids().map(str::to_owned).collect();
        let source = self
            .sources
            .get_mut(id)
            .ok_or_else(|| MapError::UnknownRemoteSource {
                id: id.to_owned(),
                available,
            })?;
        source.section_client = Some(client);
        Ok(())
    }
}

/// Applies grids to a [`VoxelMapStore`], one at a time.
///
/// In reduce-data mode, remote update grids are first cut down to the voxels whose classification they change, and local
/// insertions report only such voxels. The reduction reads the map and the application writes it, so both happen while
/// holding the apply lock.
pub struct ReplicationSynchronizer {
    reduce_data: bool,
    integrator: RaycastIntegrator,
    apply_lock: Mutex<()>,
}

impl ReplicationSynchronizer {
    pub fn new(config: &NodeConfig) -> Self {
        Self {
            reduce_data: config.reduce_data,
            integrator: RaycastIntegrator::new(&config.map),
            apply_lock: Mutex::new(()),
        }
    }

    pub fn reduce_data(&self) -> bool {
        self.reduce_data
    }

    /// Applies the update produced by a local insertion and returns what the insertion changed.
    ///
    /// The full update is always applied to the local map. In reduce-data mode only the returned diffs are reduced: the
    /// update is cut down against the map as it was before the insertion.
    pub fn apply_insertion(&self, store: &VoxelMapStore, update: UpdateGrid) -> InsertionDiffs {
        let _guard = self.apply_lock.lock();
        if self.reduce_data {
            let reduced = self.integrator.reduce_update(&update, &store.get_map());
            let overwrite = store.apply_update_collapsing(&update);
            InsertionDiffs {
                update: reduced,
                overwrite,
            }
        } else {
            store.apply_update(&update);
            InsertionDiffs {
                overwrite: OverwriteGrid::new(update.resolution()),
                update,
            }
        }
    }

    /// Returns the number of voxels that were actually updated.
    pub fn apply_update(
        &self,
        store: &VoxelMapStore,
        update: &UpdateGrid,
    ) -> Result<usize, MapError> {
        check_resolution(store, update.resolution())?;
        let _guard = self.apply_lock.lock();
        if self.reduce_data {
            let reduced = self.integrator.reduce_update(update, &store.get_map());
            store.apply_update(&reduced);
            Ok(reduced.len())
        } else {
            store.apply_update(update);
            Ok(update.len())
        }
    }

    pub fn apply_overwrite(
        &self,
        store: &VoxelMapStore,
        overwrite: &OverwriteGrid,
    ) -> Result<usize, MapError> {
        check_resolution(store, overwrite.resolution())?;
        let _guard = self.apply_lock.lock();
        store.apply_overwrite(overwrite);
        Ok(overwrite.len())
    }

    /// Decodes an encoded [`UpdateGrid`] and applies it. The store is untouched if decoding fails.
    pub fn apply_update_payload(
        &self,
        store: &VoxelMapStore,
        payload: &[u8],
    ) -> Result<usize, MapError> {
        let update = decode_update::<f32>(payload)?;
        self.apply_update(store, &update)
    }

    /// Decodes an encoded [`OverwriteGrid`] and applies it. The store is untouched if decoding fails.
    pub fn apply_overwrite_payload(
        &self,
        store: &VoxelMapStore,
        payload: &[u8],
    ) -> Result<usize, MapError> {
        let overwrite = decode_overwrite::<f32>(payload)?;
        self.apply_overwrite(store, &overwrite)
    }

    /// Runs `f` while no grid is being applied.
    pub fn exclusive<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.apply_lock.lock();
        f()
    }
}

fn check_resolution(store: &VoxelMapStore, found: f32) -> Result<(), MapError> {
    let expected = store.resolution();
    if relative_eq!(expected, found) {
        Ok(())
    } else {
        Err(MapError::ResolutionMismatch { expected, found })
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

    use garnet_core::glam::IVec3;
    use garnet_map::{CodecError, MapConfig, MapSnapshot, Occupancy, VoxelUnits};

    fn node_config(reduce_data: bool) -> NodeConfig {
        NodeConfig {
            map: MapConfig {
                resolution: 1.0,
                ..Default::default()
            },
            reduce_data,
            ..Default::default()
        }
    }

    fn update(entries: &[(IVec3, f32)]) -> UpdateGrid {
        let mut grid = UpdateGrid::new(1.0);
        for &(p, d) in entries {
            grid.add_delta(p, d);
        }
        grid
    }

    #[test]
    fn default_mode_applies_everything() {
        let config = node_config(false);
        let store = VoxelMapStore::new(config.map.clone()).unwrap();
        let sync = ReplicationSynchronizer::new(&config);

        let payload = update(&[(IVec3::ZERO, 0.1), (IVec3::X, -0.1)]).encode();
        assert_eq!(sync.apply_update_payload(&store, &payload).unwrap(), 2);
        assert_eq!(store.get_map().len(), 2);
    }

    #[test]
    fn reduce_mode_keeps_classification_changes_only() {
        let config = node_config(true);
        let store = VoxelMapStore::new(config.map.clone()).unwrap();
        let sync = ReplicationSynchronizer::new(&config);

        let grid = update(&[(IVec3::ZERO, 0.1), (IVec3::X, 8.0)]);
        assert_eq!(sync.apply_update(&store, &grid).unwrap(), 1);

        let map = store.get_map();
        assert_eq!(map.get(VoxelUnits(IVec3::ZERO)), None);
        assert_eq!(
            map.classify(VoxelUnits(IVec3::X), &config.map),
            Some(Occupancy::Occupied)
        );

        // Applying the same grid again changes nothing.
        assert_eq!(sync.apply_update(&store, &grid).unwrap(), 0);
    }

    #[test]
    fn reduce_mode_insertion_reports_overwrites() {
        let config = node_config(true);
        let store = VoxelMapStore::new(config.map.clone()).unwrap();
        let sync = ReplicationSynchronizer::new(&config);

        let diffs = sync.apply_insertion(&store, update(&[(IVec3::ZERO, 8.0), (IVec3::Y, 0.1)]));
        assert_eq!(diffs.update.len(), 1);
        assert_eq!(diffs.overwrite.len(), 1);
        assert_eq!(
            diffs.overwrite.get(IVec3::ZERO).copied(),
            store.get_map().get(VoxelUnits(IVec3::ZERO))
        );
        // The sub-threshold voxel is still recorded locally.
        assert_eq!(store.get_map().len(), 2);
        assert!(store.get_map().get(VoxelUnits(IVec3::Y)).is_some());
    }

    #[test]
    fn reduce_mode_insertions_accumulate_evidence() {
        let config = node_config(true);
        let store = VoxelMapStore::new(config.map.clone()).unwrap();
        let sync = ReplicationSynchronizer::new(&config);
        let (hit, miss) = (config.map.hit_delta(), config.map.miss_delta());
        let (start, end) = (IVec3::ZERO, IVec3::new(3, 0, 0));

        let mut published_updates = 0;
        for i in 0..20 {
            let before = store.get_map();
            let diffs = sync.apply_insertion(&store, update(&[(start, miss), (end, hit)]));
            let after = store.get_map();

            let class_of = |map: &MapSnapshot, p: IVec3| map.classify(VoxelUnits(p), &config.map);
            let changed = [start, end]
                .iter()
                .filter(|&&p| class_of(&before, p) != class_of(&after, p))
                .count();
            // Only the first insertion can see a voxel for the first time.
            if i > 0 {
                assert_eq!(diffs.update.len(), changed, "insertion {}", i);
            }
            assert_eq!(diffs.overwrite.len(), diffs.update.len(), "insertion {}", i);
            if !diffs.update.is_empty() {
                published_updates += 1;
            }
        }

        let map = store.get_map();
        assert_eq!(map.classify(VoxelUnits(end), &config.map), Some(Occupancy::Occupied));
        assert_eq!(map.classify(VoxelUnits(start), &config.map), Some(Occupancy::Free));
        // Five hits make the end occupied and five misses make the start free.
        assert_eq!(published_updates, 1);
    }

    #[test]
    fn mismatched_or_corrupt_payloads_are_rejected() {
        let config = node_config(false);
        let store = VoxelMapStore::new(config.map.clone()).unwrap();
        let sync = ReplicationSynchronizer::new(&config);

        let mut coarse = OverwriteGrid::<f32>::new(2.0);
        coarse.insert(IVec3::ZERO, 0.9);
        let payload = coarse.encode();
        assert!(matches!(
            sync.apply_overwrite_payload(&store, &payload),
            Err(MapError::ResolutionMismatch { .. })
        ));

        assert!(matches!(
            sync.apply_update_payload(&store, b"definitely not a grid"),
            Err(MapError::Codec(CodecError::Format(_)))
        ));

        // An overwrite payload is not an update.
        let mut fine = OverwriteGrid::<f32>::new(1.0);
        fine.insert(IVec3::ZERO, 0.9);
        assert!(matches!(
            sync.apply_update_payload(&store, &fine.encode()),
            Err(MapError::Codec(CodecError::VersionMismatch(_)))
        ));

        assert!(store.get_map().is_empty());
    }

    #[test]
    fn unknown_source_lists_available_ids() {
        let sources = RemoteSources::new(&[
            RemoteSourceConfig {
                id: "zeta".into(),
                ..Default::default()
            },
            RemoteSourceConfig {
                id: "alpha".into(),
                apply_remote_updates: true,
                ..Default::default()
            },
        ]);
        assert!(sources.get("alpha").unwrap().applies_updates());
        match sources.get("beta") {
            Err(MapError::UnknownRemoteSource { id, available }) => {
                assert_eq!(id, "beta");
                assert_eq!(available, vec!["alpha".to_string(), "zeta".to_string()]);
            }
            _ => panic!("expected an unknown source error"),
        }
    }
}
