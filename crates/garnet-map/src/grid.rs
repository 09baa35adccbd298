use crate::core::glam::IVec3;
use crate::core::SmallKeyHashMap;

use std::fmt::Debug;
use std::ops::{Deref, DerefMut};

/// A scalar that can be carried by a [`SparseGrid`] and written into an encoded grid stream.
pub trait GridValue: Copy + Debug + Default + PartialEq + Send + Sync + 'static {
    const VALUE_TYPE: ValueType;

    fn write_le_bytes(self, out: &mut Vec<u8>);

    /// Reads one value from the front of `bytes`, which must be exactly [`ValueType::size`] long.
    fn read_le_bytes(bytes: &[u8]) -> Self;

    fn is_finite(self) -> bool;

    fn to_f32(self) -> f32;
}

macro_rules! impl_grid_value {
    ($t:ty, $value_type:expr) => {
        impl GridValue for $t {
            const VALUE_TYPE: ValueType = $value_type;

            #[inline]
            fn write_le_bytes(self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_le_bytes());
            }

            #[inline]
            fn read_le_bytes(bytes: &[u8]) -> Self {
                let mut array = [0; std::mem::size_of::<$t>()];
                array.copy_from_slice(bytes);
                <$t>::from_le_bytes(array)
            }

            #[inline]
            fn is_finite(self) -> bool {
                <$t>::is_finite(self)
            }

            #[inline]
            fn to_f32(self) -> f32 {
                self as f32
            }
        }
    };
}

impl_grid_value!(f32, ValueType::F32);
impl_grid_value!(f64, ValueType::F64);

/// Tags the scalar type of an encoded grid.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[repr(u8)]
pub enum ValueType {
    F32 = 1,
    F64 = 2,
}

impl ValueType {
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Self::F32),
            2 => Some(Self::F64),
            _ => None,
        }
    }

    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Bytes per encoded value.
    pub fn size(self) -> usize {
        match self {
            Self::F32 => 4,
            Self::F64 => 8,
        }
    }
}

/// Whether the values of a grid are relative deltas or absolute probabilities.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[repr(u8)]
pub enum GridKind {
    Update = 1,
    Overwrite = 2,
}

impl GridKind {
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Self::Update),
            2 => Some(Self::Overwrite),
            _ => None,
        }
    }

    pub fn tag(self) -> u8 {
        self as u8
    }
}

/// A sparse mapping from voxel coordinates to values, tagged with the voxel resolution it was built at.
#[derive(Clone, Debug)]
pub struct SparseGrid<T> {
    resolution: f32,
    pub values: SmallKeyHashMap<IVec3, T>,
}

impl<T> SparseGrid<T> {
    pub fn new(resolution: f32) -> Self {
        Self {
            resolution,
            values: Default::default(),
        }
    }

    pub fn resolution(&self) -> f32 {
        self.resolution
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, voxel: IVec3) -> Option<&T> {
        self.values.get(&voxel)
    }

    pub fn insert(&mut self, voxel: IVec3, value: T) -> Option<T> {
        self.values.insert(voxel, value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&IVec3, &T)> {
        self.values.iter()
    }

    /// Entries sorted by coordinates (z, then y, then x), which gives a canonical order for encoding.
    pub fn sorted_entries(&self) -> Vec<(IVec3, T)>
    where
        T: Copy,
    {
        let mut entries: Vec<_> = self.values.iter().map(|(&p, &v)| (p, v)).collect();
        entries.sort_unstable_by_key(|(p, _)| (p.z, p.y, p.x));
        entries
    }
}

impl<T: PartialEq> PartialEq for SparseGrid<T> {
    fn eq(&self, other: &Self) -> bool {
        self.resolution == other.resolution && self.values == other.values
    }
}

macro_rules! def_grid_kind {
    ($t:ident, $kind:expr, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Debug, PartialEq)]
        pub struct $t<T = f32>(pub SparseGrid<T>);

        impl<T> $t<T> {
            pub const KIND: GridKind = $kind;

            pub fn new(resolution: f32) -> Self {
                Self(SparseGrid::new(resolution))
            }

            pub fn into_inner(self) -> SparseGrid<T> {
                self.0
            }
        }

        impl<T> Deref for $t<T> {
            type Target = SparseGrid<T>;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl<T> DerefMut for $t<T> {
            fn deref_mut(&mut self) -> &mut Self::Target {
                &mut self.0
            }
        }
    };
}

def_grid_kind!(
    UpdateGrid,
    GridKind::Update,
    "Relative probability deltas. Applying an update combines each delta with the current value \
     of its voxel."
);
def_grid_kind!(
    OverwriteGrid,
    GridKind::Overwrite,
    "Absolute probabilities. Applying an overwrite replaces the current value of each listed voxel."
);

impl<T: GridValue + std::ops::Add<Output = T>> UpdateGrid<T> {
    /// Sums `delta` into any delta already accumulated for `voxel`.
    #[inline]
    pub fn add_delta(&mut self, voxel: IVec3, delta: T) {
        let entry = self.0.values.entry(voxel).or_default();
        *entry = *entry + delta;
    }

    /// Sums every delta of `other` into `self`.
    pub fn merge(&mut self, other: &Self) {
        for (&voxel, &delta) in other.iter() {
            self.add_delta(voxel, delta);
        }
    }
}

/// The result of decoding a grid stream whose kind is not known in advance.
#[derive(Clone, Debug, PartialEq)]
pub enum DecodedGrid<T = f32> {
    Update(UpdateGrid<T>),
    Overwrite(OverwriteGrid<T>),
}

impl<T> DecodedGrid<T> {
    pub fn kind(&self) -> GridKind {
        match self {
            Self::Update(_) => GridKind::Update,
            Self::Overwrite(_) => GridKind::Overwrite,
        }
    }

    pub fn grid(&self) -> &SparseGrid<T> {
        match self {
            Self::Update(g) => g,
            Self::Overwrite(g) => g,
        }
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
