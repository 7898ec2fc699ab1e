//! The implicit point tree: index math, cursor, tiers and the index itself.

pub mod branch;
pub mod index;
pub mod point_info;
pub mod registry;
pub mod roller;
pub mod sleepy_tree;
pub mod tier;

pub use branch::Branch;
pub use point_info::{MultiResults, PointInfo, ResultPoint, StoredPoint};
pub use registry::Registry;
pub use roller::{Roller, DIMENSIONS};
pub use sleepy_tree::SleepyTree;
pub use tier::{Rejected, StorageOptions, Tier, TierKind};
