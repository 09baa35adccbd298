//! The garnet map data model.
//!
//! # Voxels
//!
//! A [`VoxelMap`](crate::VoxelMap) is a sparse field of occupancy probabilities. Space is partitioned into
//! [`Chunk`](crate::Chunk)s of `16^3` voxels, but only chunks that have been observed are allocated. A voxel that has never been
//! observed is *absent*, which is distinct from a voxel that happens to hold the prior probability of `0.5`.
//!
//! ## Occupancy
//!
//! Each voxel stores the probability that its cube of space is occupied. The [`MapConfig`](crate::MapConfig) thresholds
//! classify a probability as [`Occupancy::Free`](crate::Occupancy), `Uncertain` or `Occupied`. Probabilities only ever change
//! through [`UpdateGrid`](crate::UpdateGrid)s (relative deltas combined by the configured
//! [`ProbabilityModel`](crate::ProbabilityModel)) and [`OverwriteGrid`](crate::OverwriteGrid)s (absolute replacement).
//!
//! ## Replication
//!
//! Both kinds of grid can be encoded into a self-describing byte payload with a [`GridEncoder`](crate::GridEncoder) and decoded
//! on another node with [`decode`](crate::decode). A [`VoxelMapStore`](crate::VoxelMapStore) owns the authoritative map and
//! hands out copy-on-write snapshots, so readers never observe a half-applied grid.

mod chunk;
mod codec;
mod config;
mod coordinates;
mod database;
mod grid;
mod map;
mod raycast;
mod section;
mod store;
mod units;

pub use chunk::*;
pub use codec::*;
pub use config::*;
pub use coordinates::*;
pub use database::*;
pub use grid::*;
pub use map::*;
pub use raycast::*;
pub use section::*;
pub use store::*;
pub use units::*;

pub use garnet_core as core;
pub use garnet_core::glam;
