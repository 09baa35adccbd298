use crate::core::glam::IVec3;
use crate::units::ChunkUnits;

/// The sled key of a stored [`Chunk`](crate::Chunk).
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ChunkDbKey {
    pub coordinates: ChunkUnits<[i32; 3]>,
}

impl ChunkDbKey {
    pub fn new(coordinates: ChunkUnits<IVec3>) -> Self {
        Self {
            coordinates: coordinates.map(|c| c.to_array()),
        }
    }

    pub fn coordinates(&self) -> ChunkUnits<IVec3> {
        self.coordinates.map(IVec3::from)
    }

    /// We implement this manually so we have control over the [`Ord`] as interpreted by [`sled`].
    ///
    /// 12 bytes total per key, 4 big-endian bytes per axis with the sign bit flipped, so byte order agrees with integer
    /// order.
    pub fn into_sled_key(&self) -> [u8; 12] {
        let mut bytes = [0; 12];
        for (axis, c) in self.coordinates.0.iter().enumerate() {
            let biased = (*c as u32) ^ SIGN_BIT;
            bytes[4 * axis..4 * axis + 4].copy_from_slice(&biased.to_be_bytes());
        }
        bytes
    }

    /// Returns `None` if `bytes` is not a key written by [`Self::into_sled_key`].
    pub fn from_sled_key(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != 12 {
            return None;
        }
        let mut coordinates = [0; 3];
        for (axis, c) in coordinates.iter_mut().enumerate() {
            let mut be = [0; 4];
            be.copy_from_slice(&bytes[4 * axis..4 * axis + 4]);
            *c = (u32::from_be_bytes(be) ^ SIGN_BIT) as i32;
        }
        Some(Self {
            coordinates: ChunkUnits(coordinates),
        })
    }
}

const SIGN_BIT: u32 = 1 << 31;

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn sled_key_order_matches_coordinate_order() {
        let keys: Vec<_> = [
            IVec3::new(i32::MIN, 0, 0),
            IVec3::new(-1, 5, 5),
            IVec3::new(0, -3, 0),
            IVec3::new(0, 0, 1),
            IVec3::new(i32::MAX, 0, 0),
        ]
        .into_iter()
        .map(|c| ChunkDbKey::new(ChunkUnits(c)))
        .collect();

        for pair in keys.windows(2) {
            assert!(pair[0] < pair[1]);
            assert!(pair[0].into_sled_key() < pair[1].into_sled_key());
        }
        for key in keys {
            assert_eq!(ChunkDbKey::from_sled_key(&key.into_sled_key()), Some(key));
        }
        assert_eq!(ChunkDbKey::from_sled_key(b"META"), None);
    }
}
