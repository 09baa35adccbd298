mod chunk_key;
mod meta_tree;

pub use chunk_key::ChunkDbKey;
pub use meta_tree::{MapDbMetadata, DB_FORMAT_VERSION};

use meta_tree::{open_meta_tree, read_meta, write_meta};

use crate::chunk::Chunk;
use crate::map::VoxelMap;

use crate::core::SmallKeyHashSet;

use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::{IVec, Transactional, Tree};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// The map name used for databases written by [`save_map_to_path`].
pub const DEFAULT_MAP_NAME: &str = "voxel-map";

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("database error: {0}")]
    Db(#[from] sled::Error),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("incompatible map: {0}")]
    Incompatible(String),
    #[error("corrupt map: {0}")]
    Corrupt(String),
    #[error("no map found at {0:?}")]
    MissingPath(PathBuf),
}

impl From<TransactionError> for PersistenceError {
    fn from(e: TransactionError) -> Self {
        match e {
            TransactionError::Abort(e) | TransactionError::Storage(e) => Self::Db(e),
        }
    }
}

/// # Map Database
///
/// Persistent storage for one [`VoxelMap`]. All data is stored in two [`sled::Tree`]s.
///
/// ### Meta Tree
///
/// A single [`MapDbMetadata`] entry describing the stored map: the format version, the voxel resolution and the number of
/// chunks.
///
/// ### Chunk Tree
///
/// Every allocated [`Chunk`] of the map, lz4 compressed and keyed by [`ChunkDbKey`].
///
/// A map is always written in a single transaction over both trees, so a reader sees either the old map or the new one.
pub struct MapDb {
    meta_tree: Tree,
    chunk_tree: Tree,
}

impl MapDb {
    pub fn open(db: &sled::Db, map_name: &str) -> Result<Self, sled::Error> {
        let meta_tree = open_meta_tree(map_name, db)?;
        let chunk_tree = db.open_tree(format!("{}-chunks", map_name))?;
        Ok(Self {
            meta_tree,
            chunk_tree,
        })
    }

    pub fn read_meta(&self) -> Result<Option<MapDbMetadata>, PersistenceError> {
        read_meta(&self.meta_tree)
    }

    /// Replaces the stored map with `map`.
    pub fn write_map(&self, map: &VoxelMap) -> Result<(), PersistenceError> {
        let new_chunks: Vec<([u8; 12], IVec)> = map
            .chunks()
            .map(|(coords, chunk)| {
                let key = ChunkDbKey::new(coords).into_sled_key();
                (key, IVec::from(chunk.compress().bytes))
            })
            .collect();
        let new_keys: SmallKeyHashSet<[u8; 12]> = new_chunks.iter().map(|(k, _)| *k).collect();

        // sled transactions can't iterate, so we find the stale keys up front.
        let mut stale_keys = Vec::new();
        for key in self.chunk_tree.iter().keys() {
            let key = key?;
            if key.len() != 12 || !new_keys.contains(&key[..]) {
                stale_keys.push(key);
            }
        }

        let meta = MapDbMetadata::new(map.resolution(), new_chunks.len() as u64);
        (&self.meta_tree, &self.chunk_tree).transaction(|(meta_txn, chunk_txn)| {
            for key in stale_keys.iter() {
                chunk_txn.remove(key)?;
            }
            for (key, bytes) in new_chunks.iter() {
                chunk_txn.insert(&key[..], bytes)?;
            }
            write_meta(meta_txn, &meta)?;
            Ok::<_, ConflictableTransactionError>(())
        })?;

        self.meta_tree.flush()?;
        self.chunk_tree.flush()?;
        log::debug!("Wrote {} chunks, removed {}", new_chunks.len(), stale_keys.len());
        Ok(())
    }

    /// Reads the whole stored map, checking that it is complete and was written by a compatible version.
    pub fn read_map(&self) -> Result<VoxelMap, PersistenceError> {
        let meta = self
            .read_meta()?
            .ok_or_else(|| PersistenceError::Corrupt("missing map metadata".into()))?;
        if meta.format_version != DB_FORMAT_VERSION {
            return Err(PersistenceError::Incompatible(format!(
                "map format version {} is not supported, expected {}",
                meta.format_version, DB_FORMAT_VERSION
            )));
        }
        if !(meta.resolution.is_finite() && meta.resolution > 0.0) {
            return Err(PersistenceError::Corrupt(format!(
                "invalid resolution {}",
                meta.resolution
            )));
        }

        let mut map = VoxelMap::new(meta.resolution);
        for entry in self.chunk_tree.iter() {
            let (key, value) = entry?;
            let key = ChunkDbKey::from_sled_key(&key).ok_or_else(|| {
                PersistenceError::Corrupt(format!("invalid chunk key {:02x?}", &key[..]))
            })?;
            let chunk = Chunk::from_compressed_bytes(&value).map_err(|e| {
                PersistenceError::Corrupt(format!("chunk {:?}: {}", key.coordinates.0, e))
            })?;
            if chunk.iter().any(|(_, v)| !(0.0..=1.0).contains(&v)) {
                return Err(PersistenceError::Corrupt(format!(
                    "chunk {:?} has values that are not probabilities",
                    key.coordinates.0
                )));
            }
            map.insert_chunk(key.coordinates(), chunk);
        }

        if map.num_chunks() as u64 != meta.num_chunks {
            return Err(PersistenceError::Corrupt(format!(
                "expected {} chunks, found {}",
                meta.num_chunks,
                map.num_chunks()
            )));
        }
        Ok(map)
    }
}

/// Writes `map` into the sled database at `path`, creating it if necessary.
pub fn save_map_to_path(path: impl AsRef<Path>, map: &VoxelMap) -> Result<(), PersistenceError> {
    let db = sled::open(path.as_ref())?;
    MapDb::open(&db, DEFAULT_MAP_NAME)?.write_map(map)?;
    db.flush()?;
    Ok(())
}

/// Reads the map stored at `path` by [`save_map_to_path`]. Nothing is created if `path` doesn't exist.
pub fn load_map_from_path(path: impl AsRef<Path>) -> Result<VoxelMap, PersistenceError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(PersistenceError::MissingPath(path.to_owned()));
    }
    let db = sled::open(path)?;
    MapDb::open(&db, DEFAULT_MAP_NAME)?.read_map()
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::glam::IVec3;
    use crate::units::VoxelUnits;

    fn sample_map() -> VoxelMap {
        let mut map = VoxelMap::new(0.2);
        map.insert(VoxelUnits(IVec3::new(0, 0, 0)), 0.9);
        map.insert(VoxelUnits(IVec3::new(-40, 17, 3)), 0.1);
        map.insert(VoxelUnits(IVec3::new(100, 100, -100)), 0.5);
        map
    }

    fn assert_same_voxels(a: &VoxelMap, b: &VoxelMap) {
        assert_eq!(a.resolution(), b.resolution());
        assert_eq!(a.len(), b.len());
        for (p, v) in a.iter() {
            assert_eq!(b.get(p), Some(v));
        }
    }

    #[test]
    fn write_and_read_map() {
        let db = sled::Config::default().temporary(true).open().unwrap();
        let map_db = MapDb::open(&db, "mymap").unwrap();

        let map = sample_map();
        map_db.write_map(&map).unwrap();
        assert_same_voxels(&map_db.read_map().unwrap(), &map);
        assert_eq!(map_db.read_meta().unwrap(), Some(MapDbMetadata::new(0.2, 3)));
    }

    #[test]
    fn rewrite_removes_stale_chunks() {
        let db = sled::Config::default().temporary(true).open().unwrap();
        let map_db = MapDb::open(&db, "mymap").unwrap();
        map_db.write_map(&sample_map()).unwrap();

        let mut smaller = VoxelMap::new(0.2);
        smaller.insert(VoxelUnits(IVec3::new(1, 1, 1)), 0.3);
        map_db.write_map(&smaller).unwrap();

        let read = map_db.read_map().unwrap();
        assert_eq!(read.num_chunks(), 1);
        assert_same_voxels(&read, &smaller);
    }

    #[test]
    fn read_without_meta_is_corrupt() {
        let db = sled::Config::default().temporary(true).open().unwrap();
        let map_db = MapDb::open(&db, "mymap").unwrap();
        assert!(matches!(map_db.read_map(), Err(PersistenceError::Corrupt(_))));
    }

    #[test]
    fn save_and_load_path() {
        let dir = std::env::temp_dir().join(format!("garnet-db-test-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);

        assert!(matches!(
            load_map_from_path(&dir),
            Err(PersistenceError::MissingPath(_))
        ));

        let map = sample_map();
        save_map_to_path(&dir, &map).unwrap();
        assert_same_voxels(&load_map_from_path(&dir).unwrap(), &map);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
