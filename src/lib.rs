//! A mapping node that builds a probabilistic voxel occupancy map from range sensor data and keeps it synchronized with
//! other nodes.
//!
//! The map data model lives in [`garnet_map`]. This crate wires it to the outside world: point clouds arrive through
//! [`MappingNode::handle_observation`], coordinate frames are resolved by a [`TransformOracle`], and diffs are exchanged
//! with remote nodes as opaque byte payloads through a [`MapPublisher`] and the remote source callbacks.

mod cloud;
mod config;
mod error;
mod node;
mod publish;
mod sync;
mod transform;

pub use cloud::{CloudPoint, PointCloud};
pub use config::{NodeConfig, RemoteSourceConfig};
pub use error::MapError;
pub use node::MappingNode;
pub use publish::{MapOutput, MapPublisher, NullPublisher};
pub use sync::{
    RemoteSource, RemoteSources, ReplicationSynchronizer, ResetResponse, SectionClient,
    SectionRequest, SectionResponse,
};
pub use transform::{StaticTransforms, Stamp, TransformOracle, TransformUnavailable};

pub use garnet_core as core;
pub use garnet_map as map;
