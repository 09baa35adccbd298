use crate::cloud::{CloudPoint, PointCloud};
use crate::config::NodeConfig;
use crate::error::MapError;
use crate::publish::{MapOutput, MapPublisher, NullPublisher};
use crate::sync::{
    RemoteSources, ReplicationSynchronizer, ResetResponse, SectionClient, SectionRequest,
    SectionResponse,
};
use crate::transform::{Stamp, TransformOracle};

use garnet_core::geometry::RigidTransform;
use garnet_core::glam::Vec3A;
use garnet_map::{
    extract_section, InsertionDiffs, MapSnapshot, OverwriteGrid, RaycastIntegrator, VoxelMapStore,
};

use std::path::Path;
use std::sync::Arc;

/// One mapping node: a [`VoxelMapStore`] plus every pipeline that reads or writes it.
///
/// All methods take `&self`, so a node can be shared between the threads that deliver point clouds, remote diffs and
/// service requests. Point clouds are integrated in parallel, but grids are applied one at a time.
pub struct MappingNode {
    config: NodeConfig,
    store: VoxelMapStore,
    integrator: RaycastIntegrator,
    synchronizer: ReplicationSynchronizer,
    remote_sources: RemoteSources,
    transforms: Arc<dyn TransformOracle>,
    publisher: Box<dyn MapPublisher>,
}

impl MappingNode {
    pub fn new(config: NodeConfig, transforms: Arc<dyn TransformOracle>) -> Result<Self, MapError> {
        config.validate().map_err(|e| {
            log::error!("Refusing to start mapping node: {}", e);
            e
        })?;
        let store = VoxelMapStore::new(config.map.clone())?;
        let integrator = RaycastIntegrator::new(&config.map);
        let synchronizer = ReplicationSynchronizer::new(&config);
        let remote_sources = RemoteSources::new(&config.remote_sources);
        log::info!(
            "Mapping node started in frame {:?} with resolution {} and {} remote sources",
            config.map_frame,
            config.map.resolution,
            remote_sources.len()
        );

        Ok(Self {
            config,
            store,
            integrator,
            synchronizer,
            remote_sources,
            transforms,
            publisher: Box::new(NullPublisher),
        })
    }

    pub fn with_publisher(mut self, publisher: impl MapPublisher + 'static) -> Self {
        self.publisher = Box::new(publisher);
        self
    }

    /// Lets [`Self::trigger_map_section_update`] fetch sections from the remote source `source_id`.
    pub fn with_section_client(
        mut self,
        source_id: &str,
        client: Arc<dyn SectionClient>,
    ) -> Result<Self, MapError> {
        self.remote_sources.set_section_client(source_id, client)?;
        Ok(self)
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn store(&self) -> &VoxelMapStore {
        &self.store
    }

    pub fn remote_sources(&self) -> &RemoteSources {
        &self.remote_sources
    }

    pub fn get_map(&self) -> MapSnapshot {
        self.store.get_map()
    }

    /// Integrates a point cloud expressed in the frame of the sensor that measured it.
    pub fn handle_observation<P: CloudPoint>(
        &self,
        cloud: &PointCloud<P>,
    ) -> Result<InsertionDiffs, MapError> {
        if !self.config.apply_raw_sensor_data {
            log::debug!(
                "Ignoring point cloud in {:?}, raw sensor data is disabled",
                cloud.frame_id
            );
            return Ok(InsertionDiffs::empty(self.store.resolution()));
        }

        let sensor_to_map = self.lookup_transform(&cloud.frame_id, cloud.stamp)?;
        Ok(self.insert_point_cloud(
            sensor_to_map.translation,
            cloud.transformed_positions(&sensor_to_map),
        ))
    }

    /// Integrates a point cloud that has already been registered, e.g. by a localization system. The sensor origin is the
    /// configured sensor frame at the time of the cloud.
    pub fn handle_aligned_observation<P: CloudPoint>(
        &self,
        cloud: &PointCloud<P>,
    ) -> Result<InsertionDiffs, MapError> {
        if !self.config.apply_raw_sensor_data {
            log::debug!(
                "Ignoring aligned point cloud in {:?}, raw sensor data is disabled",
                cloud.frame_id
            );
            return Ok(InsertionDiffs::empty(self.store.resolution()));
        }

        let sensor_to_map = self.lookup_transform(&self.config.sensor_frame, cloud.stamp)?;
        let origin = sensor_to_map.translation;
        if cloud.frame_id == self.config.map_frame {
            return Ok(self.insert_point_cloud(origin, cloud.points.iter().map(|p| p.position())));
        }
        let cloud_to_map = self.lookup_transform(&cloud.frame_id, cloud.stamp)?;
        Ok(self.insert_point_cloud(origin, cloud.transformed_positions(&cloud_to_map)))
    }

    /// Integrates points given in the map frame, measured from `origin`, and publishes the result.
    pub fn insert_point_cloud(
        &self,
        origin: Vec3A,
        points: impl IntoIterator<Item = Vec3A>,
    ) -> InsertionDiffs {
        let update = self.integrator.integrate(origin, points);
        let diffs = self.synchronizer.apply_insertion(&self.store, update);
        log::trace!(
            "Inserted point cloud: {} voxels updated, {} overwritten",
            diffs.update.len(),
            diffs.overwrite.len()
        );

        if self.config.publish_updates {
            self.publisher.publish_update(&diffs.update.encode());
        }
        if self.config.publish_overwrites {
            self.publisher.publish_overwrite(&diffs.overwrite.encode());
        }
        self.publish_map();
        diffs
    }

    /// Applies an encoded [`garnet_map::UpdateGrid`]. Returns the number of voxels updated.
    pub fn on_map_update(&self, payload: &[u8]) -> Result<usize, MapError> {
        let num_voxels = self
            .synchronizer
            .apply_update_payload(&self.store, payload)
            .map_err(|e| {
                log::warn!("Dropped map update: {}", e);
                e
            })?;
        self.publish_map();
        Ok(num_voxels)
    }

    /// Applies an encoded [`OverwriteGrid`]. Returns the number of voxels overwritten.
    pub fn on_map_overwrite(&self, payload: &[u8]) -> Result<usize, MapError> {
        let num_voxels = self
            .synchronizer
            .apply_overwrite_payload(&self.store, payload)
            .map_err(|e| {
                log::warn!("Dropped map overwrite: {}", e);
                e
            })?;
        self.publish_map();
        Ok(num_voxels)
    }

    /// Applies an update published by the remote source `source_id`, if that source is configured to apply updates.
    pub fn on_remote_update(&self, source_id: &str, payload: &[u8]) -> Result<usize, MapError> {
        let source = self.remote_sources.get(source_id).map_err(|e| {
            log::warn!("{}", e);
            e
        })?;
        if !source.applies_updates() {
            let e = MapError::RemoteSourceRejected {
                id: source_id.to_owned(),
                kind: "updates",
            };
            log::warn!("{}", e);
            return Err(e);
        }
        self.on_map_update(payload)
    }

    /// Applies an overwrite published by the remote source `source_id`, if that source is configured to apply overwrites.
    pub fn on_remote_overwrite(&self, source_id: &str, payload: &[u8]) -> Result<usize, MapError> {
        let source = self.remote_sources.get(source_id).map_err(|e| {
            log::warn!("{}", e);
            e
        })?;
        if !source.applies_overwrites() {
            let e = MapError::RemoteSourceRejected {
                id: source_id.to_owned(),
                kind: "overwrites",
            };
            log::warn!("{}", e);
            return Err(e);
        }
        self.on_map_overwrite(payload)
    }

    /// Requests a section from the remote source `source_id` and applies it as an overwrite.
    pub fn trigger_map_section_update(
        &self,
        source_id: &str,
        request: &SectionRequest,
    ) -> Result<usize, MapError> {
        self.try_trigger_map_section_update(source_id, request)
            .map_err(|e| {
                log::error!("Map section update failed: {}", e);
                e
            })
    }

    fn try_trigger_map_section_update(
        &self,
        source_id: &str,
        request: &SectionRequest,
    ) -> Result<usize, MapError> {
        let source = self.remote_sources.get(source_id)?;
        let client = source
            .section_client()
            .ok_or_else(|| MapError::NoSectionClient(source_id.to_owned()))?;

        let response = client.get_map_section(request);
        if !response.success {
            return Err(MapError::RemoteSectionFailed {
                id: source_id.to_owned(),
                reason: "the remote node could not extract the section".into(),
            });
        }
        let num_voxels = self
            .synchronizer
            .apply_overwrite_payload(&self.store, &response.map)?;
        self.publish_map();
        Ok(num_voxels)
    }

    /// Serves a section request from another node.
    pub fn get_map_section(&self, request: &SectionRequest) -> SectionResponse {
        match self.try_get_map_section(request) {
            Ok(section) => SectionResponse {
                success: true,
                map: section.encode(),
            },
            Err(e) => {
                log::error!("Failed to extract map section: {}", e);
                SectionResponse::failure()
            }
        }
    }

    pub fn try_get_map_section(&self, request: &SectionRequest) -> Result<OverwriteGrid, MapError> {
        let requester_to_map = self.lookup_transform(&request.frame_id, request.stamp)?;
        Ok(extract_section(&self.get_map(), &request.bounds, &requester_to_map))
    }

    pub fn reset_map(&self) -> ResetResponse {
        log::info!("Resetting map");
        self.synchronizer.exclusive(|| self.store.reset());
        self.publish_map();
        ResetResponse {
            success: true,
            message: "Reset map successful.".into(),
        }
    }

    /// Saves the map to the configured map directory.
    pub fn save_map(&self) -> bool {
        let path = &self.config.map.map_directory_path;
        if path.is_empty() {
            log::error!("Cannot save map, no map directory path is configured");
            return false;
        }
        self.synchronizer.exclusive(|| self.store.save(path))
    }

    /// Replaces the map with the one saved at `path`. The current map is kept if loading fails.
    pub fn load_map(&self, path: impl AsRef<Path>) -> bool {
        let success = self.synchronizer.exclusive(|| self.store.load(path));
        self.publish_map();
        success
    }

    pub fn publish_map(&self) {
        if !self.config.publish_pointcloud {
            return;
        }
        let snapshot = self.get_map();
        let occupied_centers =
            snapshot.occupied_voxel_centers(&self.config.map, self.config.visualization_z_limits());
        self.publisher.publish_map(&MapOutput {
            frame_id: &self.config.map_frame,
            snapshot: &snapshot,
            occupied_centers,
        });
    }

    /// The transform from `source_frame` into the map frame.
    fn lookup_transform(
        &self,
        source_frame: &str,
        stamp: Stamp,
    ) -> Result<RigidTransform, MapError> {
        self.transforms
            .lookup(&self.config.map_frame, source_frame, stamp)
            .map_err(|e| {
                log::error!("Transform to map frame failed: {}", e);
                e.into()
            })
    }
}

impl SectionClient for MappingNode {
    fn get_map_section(&self, request: &SectionRequest) -> SectionResponse {
        MappingNode::get_map_section(self, request)
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
