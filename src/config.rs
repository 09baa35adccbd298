use garnet_core::SmallKeyHashSet;
use garnet_map::{ConfigError, MapConfig};

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct NodeConfig {
    pub map: MapConfig,
    /// The frame the map is expressed in.
    pub map_frame: String,
    /// The frame of the sensor origin, used for aligned point clouds.
    pub sensor_frame: String,
    pub publish_pointcloud: bool,
    pub publish_updates: bool,
    pub publish_overwrites: bool,
    /// When false, sensor and aligned point clouds are ignored and the map only changes through remote sources.
    pub apply_raw_sensor_data: bool,
    pub reduce_data: bool,
    pub lower_visualization_z_limit: Option<f32>,
    pub upper_visualization_z_limit: Option<f32>,
    pub remote_sources: Vec<RemoteSourceConfig>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            map: MapConfig::default(),
            map_frame: String::new(),
            sensor_frame: String::new(),
            publish_pointcloud: true,
            publish_updates: false,
            publish_overwrites: false,
            apply_raw_sensor_data: true,
            reduce_data: false,
            lower_visualization_z_limit: None,
            upper_visualization_z_limit: None,
            remote_sources: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct RemoteSourceConfig {
    pub id: String,
    pub apply_remote_updates: bool,
    pub apply_remote_overwrites: bool,
}

impl NodeConfig {
    pub fn read_file(path: &str) -> Result<Self, ron::Error> {
        let reader = std::fs::File::open(path)?;

        ron::de::from_reader(reader)
    }

    pub fn from_ron_str(s: &str) -> Result<Self, ron::Error> {
        ron::de::from_str(s)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.map.validate()?;

        if self.map_frame.is_empty() {
            log::warn!(
                "No map frame configured, point clouds and section requests will fail to resolve"
            );
        }
        if self.sensor_frame.is_empty() {
            log::warn!("No sensor frame configured, aligned point clouds will fail to resolve");
        }
        if let [Some(lo), Some(hi)] = [
            self.lower_visualization_z_limit,
            self.upper_visualization_z_limit,
        ] {
            if lo > hi {
                return Err(ConfigError::Invalid(format!(
                    "lower visualization z limit {} is above upper limit {}",
                    lo, hi
                )));
            }
        }

        let mut ids = SmallKeyHashSet::default();
        for source in self.remote_sources.iter() {
            if source.id.is_empty() {
                return Err(ConfigError::Invalid("remote source with empty id".into()));
            }
            if !ids.insert(source.id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate remote source id {:?}",
                    source.id
                )));
            }
        }
        Ok(())
    }

    /// The z band of occupied voxels handed to the publisher. Unset limits are unbounded.
    pub fn visualization_z_limits(&self) -> Option<[f32; 2]> {
        match (self.lower_visualization_z_limit, self.upper_visualization_z_limit) {
            (None, None) => None,
            (lo, hi) => Some([lo.unwrap_or(f32::NEG_INFINITY), hi.unwrap_or(f32::INFINITY)]),
        }
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
