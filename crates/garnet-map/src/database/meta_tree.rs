use super::PersistenceError;

use crate::core::rkyv::{self, check_archived_root, AlignedVec, Archive, Deserialize, Serialize};

use sled::{
    transaction::{ConflictableTransactionError, TransactionalTree},
    Tree,
};

const META_KEY: &str = "META";

/// Bumped whenever the layout of the chunk or meta trees changes.
pub const DB_FORMAT_VERSION: u32 = 1;

#[derive(Archive, Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
#[archive(crate = "crate::core::rkyv", check_bytes)]
pub struct MapDbMetadata {
    pub format_version: u32,
    pub resolution: f32,
    pub num_chunks: u64,
}

impl MapDbMetadata {
    pub fn new(resolution: f32, num_chunks: u64) -> Self {
        Self {
            format_version: DB_FORMAT_VERSION,
            resolution,
            num_chunks,
        }
    }
}

pub fn open_meta_tree(map_name: &str, db: &sled::Db) -> Result<Tree, sled::Error> {
    db.open_tree(format!("{}-meta", map_name))
}

pub fn write_meta(
    txn: &TransactionalTree,
    meta: &MapDbMetadata,
) -> Result<(), ConflictableTransactionError> {
    let bytes = rkyv::to_bytes::<_, 32>(meta).expect("in-memory serialization");
    txn.insert(META_KEY, bytes.as_slice())?;
    Ok(())
}

/// Returns `None` if the tree has never been written.
pub fn read_meta(tree: &Tree) -> Result<Option<MapDbMetadata>, PersistenceError> {
    let data = match tree.get(META_KEY)? {
        Some(data) => data,
        None => return Ok(None),
    };
    // sled doesn't guarantee any alignment of values.
    let mut aligned = AlignedVec::with_capacity(data.len());
    aligned.extend_from_slice(&data);
    let archived = check_archived_root::<MapDbMetadata>(&aligned)
        .map_err(|e| PersistenceError::Corrupt(format!("invalid map metadata: {}", e)))?;
    Ok(Some(MapDbMetadata {
        format_version: archived.format_version.into(),
        resolution: archived.resolution.into(),
        num_chunks: archived.num_chunks.into(),
    }))
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
