//! Math and collection primitives shared by the garnet crates.

pub mod extent;
pub mod geometry;

use ahash::{AHashMap, AHashSet};
pub type SmallKeyHashMap<K, V> = AHashMap<K, V>;
pub type SmallKeyHashSet<K> = AHashSet<K>;

// Re-exports.
pub use approx;
pub use glam;
pub use rkyv;
pub use static_assertions;
