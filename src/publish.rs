use garnet_core::glam::Vec3A;
use garnet_map::MapSnapshot;

use std::sync::Arc;

/// What the node hands to its [`MapPublisher`] after every change to the map.
pub struct MapOutput<'a> {
    pub frame_id: &'a str,
    pub snapshot: &'a MapSnapshot,
    /// Centers of occupied voxels within the configured visualization z limits.
    pub occupied_centers: Vec<Vec3A>,
}

/// Outbound side of the node. Every method defaults to doing nothing, so implementors only pick what they forward.
///
/// Diff payloads are encoded with [`garnet_map::GridEncoder`] and are meant to be fed to
/// [`MappingNode::on_remote_update`](crate::MappingNode::on_remote_update) and
/// [`MappingNode::on_remote_overwrite`](crate::MappingNode::on_remote_overwrite) of another node.
pub trait MapPublisher: Send + Sync {
    fn publish_update(&self, _payload: &[u8]) {}

    fn publish_overwrite(&self, _payload: &[u8]) {}

    fn publish_map(&self, _output: &MapOutput) {}
}

pub struct NullPublisher;

impl MapPublisher for NullPublisher {}

impl<P: MapPublisher + ?Sized> MapPublisher for Arc<P> {
    fn publish_update(&self, payload: &[u8]) {
        (**self).publish_update(payload)
    }

    fn publish_overwrite(&self, payload: &[u8]) {
        (**self).publish_overwrite(payload)
    }

    fn publish_map(&self, output: &MapOutput) {
        (**self).publish_map(output)
    }
}
