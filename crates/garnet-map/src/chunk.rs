use crate::core::glam::IVec3;
use crate::core::rkyv::{Archive, Deserialize, Serialize};
use crate::core::static_assertions::const_assert_eq;

use bytemuck::{bytes_of, bytes_of_mut, Pod, Zeroable};
use lz4_flex::frame::{FrameDecoder, FrameEncoder};
use std::io::{self, Read};
use std::mem;

pub const CHUNK_EDGE_LENGTH_LOG2: i32 = 4;
pub const CHUNK_EDGE_LENGTH: i32 = 1 << CHUNK_EDGE_LENGTH_LOG2;
pub const CHUNK_SIZE: usize = 1 << (3 * CHUNK_EDGE_LENGTH_LOG2);
pub const CHUNK_SHAPE_IVEC3: IVec3 = IVec3::splat(CHUNK_EDGE_LENGTH);
pub const CHUNK_SHAPE_LOG2_IVEC3: IVec3 = IVec3::splat(CHUNK_EDGE_LENGTH_LOG2);
const CHUNK_MASK: i32 = CHUNK_EDGE_LENGTH - 1;
const PRESENCE_WORDS: usize = CHUNK_SIZE / 64;

const_assert_eq!(CHUNK_SIZE, 16 * 16 * 16);

/// The linear index of `p` within its chunk. Any voxel coordinates are accepted; only the bits below the chunk edge are used.
#[inline]
pub fn linearize_in_chunk(p: IVec3) -> usize {
    let local = p & IVec3::splat(CHUNK_MASK);
    (local.x
        | (local.y << CHUNK_EDGE_LENGTH_LOG2)
        | (local.z << (2 * CHUNK_EDGE_LENGTH_LOG2))) as usize
}

/// Inverse of [`linearize_in_chunk`], relative to the chunk minimum.
#[inline]
pub fn delinearize_in_chunk(i: usize) -> IVec3 {
    let i = i as i32;
    IVec3::new(
        i & CHUNK_MASK,
        (i >> CHUNK_EDGE_LENGTH_LOG2) & CHUNK_MASK,
        i >> (2 * CHUNK_EDGE_LENGTH_LOG2),
    )
}

/// The fundamental unit of voxel storage.
///
/// Every voxel slot holds a probability, but only the slots flagged in the presence bitset are part of the map.
#[derive(Clone, Copy, Debug, PartialEq)]
#[repr(C)]
pub struct Chunk {
    pub values: [f32; CHUNK_SIZE],
    presence: [u64; PRESENCE_WORDS],
}

unsafe impl Zeroable for Chunk {}
unsafe impl Pod for Chunk {}

const_assert_eq!(mem::size_of::<Chunk>(), 4 * 4096 + 8 * 64);

impl Default for Chunk {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl Chunk {
    #[inline]
    pub fn get(&self, index: usize) -> Option<f32> {
        self.is_present(index).then(|| self.values[index])
    }

    #[inline]
    pub fn set(&mut self, index: usize, value: f32) {
        self.values[index] = value;
        self.presence[index / 64] |= 1u64 << (index % 64);
    }

    #[inline]
    pub fn is_present(&self, index: usize) -> bool {
        self.presence[index / 64] & (1u64 << (index % 64)) != 0
    }

    pub fn num_present(&self) -> usize {
        self.presence.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.presence.iter().all(|&w| w == 0)
    }

    /// Iterates over `(linear_index, value)` for all present voxels.
    pub fn iter(&self) -> impl Iterator<Item = (usize, f32)> + '_ {
        self.presence
            .iter()
            .enumerate()
            .filter(|(_, w)| **w != 0)
            .flat_map(move |(word_i, &word)| {
                (0..64)
                    .filter(move |bit| word & (1u64 << bit) != 0)
                    .map(move |bit| {
                        let index = word_i * 64 + bit;
                        (index, self.values[index])
                    })
            })
    }

    pub fn compress(&self) -> CompressedChunk {
        let mut encoder = FrameEncoder::new(Vec::new());
        let mut reader = bytes_of(self);
        // Writing into a Vec can't fail.
        io::copy(&mut reader, &mut encoder).expect("in-memory write");
        CompressedChunk {
            bytes: encoder.finish().expect("in-memory write").into_boxed_slice(),
        }
    }

    pub fn from_compressed_bytes(bytes: &[u8]) -> io::Result<Chunk> {
        let mut chunk = Chunk::zeroed();
        let mut decoder = FrameDecoder::new(bytes);
        let dst = bytes_of_mut(&mut chunk);
        decoder.read_exact(dst)?;
        // The frame must hold exactly one chunk.
        let mut trailing = [0u8; 1];
        if decoder.read(&mut trailing)? != 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "compressed chunk is longer than a chunk",
            ));
        }
        Ok(chunk)
    }
}

#[derive(Archive, Clone, Deserialize, Debug, Eq, PartialEq, Serialize)]
#[archive(crate = "crate::core::rkyv")]
pub struct CompressedChunk {
    pub bytes: Box<[u8]>,
}

const_assert_eq!(
    mem::size_of::<CompressedChunk>(),
    2 * mem::size_of::<usize>()
);

impl CompressedChunk {
    pub fn decompress(&self) -> io::Result<Chunk> {
        Chunk::from_compressed_bytes(&self.bytes)
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
