use crate::transform::TransformUnavailable;

use garnet_map::{CodecError, ConfigError, PersistenceError};
use thiserror::Error;

/// Everything that can go wrong while the node handles a request.
///
/// None of these leave the map in a partially updated state.
#[derive(Debug, Error)]
pub enum MapError {
    #[error(transparent)]
    TransformUnavailable(#[from] TransformUnavailable),
    #[error("failed to decode grid: {0}")]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error(transparent)]
    ConfigInvalid(#[from] ConfigError),
    #[error("grid resolution {found} does not match map resolution {expected}")]
    ResolutionMismatch { expected: f32, found: f32 },
    #[error("remote source {id:?} not found, available sources are: [{}]", .available.join(", "))]
    UnknownRemoteSource { id: String, available: Vec<String> },
    #[error("remote source {id:?} is not configured to apply {kind}")]
    RemoteSourceRejected { id: String, kind: &'static str },
    #[error("remote source {0:?} has no section client")]
    NoSectionClient(String),
    #[error("map section request to remote source {id:?} failed: {reason}")]
    RemoteSectionFailed { id: String, reason: String },
}
