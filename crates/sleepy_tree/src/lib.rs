//! sleepy_tree - persistent, out-of-core spatial index for point clouds
//!
//! Points are placed into the cells of an implicit quadtree numbered
//! breadth-first. Each cell keeps the point nearest its center; the others
//! roll down toward finer cells. Depth thresholds split the tree into three
//! storage tiers:
//!
//! - **Flat**: dense in-memory slots for the shallowest levels
//! - **Cold**: sparse chunks, loaded lazily after a reload
//! - **Disk**: sparse chunks with a bounded cache, for builds larger than memory
//!
//! An index lives in a directory holding a JSON `meta` document plus the
//! tier files, and can be saved and reopened any number of times.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use glam::DVec2;
//! use sleepy_tree::{BBox, PointBuffer, Schema, SleepyTree, TreeConfig};
//!
//! let bbox = BBox::new(DVec2::ZERO, DVec2::splat(100.0))?;
//! let tree = SleepyTree::new("index", bbox, Schema::xyz(), TreeConfig::new(0, 6, 12))?;
//!
//! let mut batch = PointBuffer::new(Arc::new(Schema::xyz()));
//! batch.push(&[50.0, 50.0, 3.0])?;
//! tree.insert(&batch, 0);
//! tree.save()?;
//!
//! let reopened = SleepyTree::open("index")?;
//! assert_eq!(reopened.get_points(0, 6)?.len(), 1);
//! ```

pub mod config;
pub mod error;
pub mod meta;
mod persist;
pub mod tree;
pub mod types;

// Re-export commonly used items
pub use config::{TreeConfig, MAX_FLAT_SLOTS};
pub use error::{Result, TreeError};
pub use meta::{BranchMeta, MetaDocument, RegistryMeta, TreeMeta, META_FILE};
pub use tree::index::{checked_offset, offset};
pub use tree::{
  Branch, MultiResults, PointInfo, Registry, ResultPoint, Roller, SleepyTree, StorageOptions, TierKind,
};
pub use types::{BBox, DimInfo, DimKind, Dir, Origin, Point, PointBuffer, Schema, DIM_X, DIM_Y};
