//! Metadata document stored as `<dir>/meta`.
//!
//! ```json
//! {
//!   "bbox": { "min": [0.0, 0.0], "max": [100.0, 100.0] },
//!   "schema": { "dims": [{ "name": "X", "type": "floating", "size": 8 }, ...] },
//!   "tree": { "baseDepth": 0, "flatDepth": 6, "diskDepth": 12,
//!             "chunkPoints": 4096, "diskCacheChunks": 64, "numPoints": 1,
//!             "nextOrigin": 1 },
//!   "registry": {
//!     "cold": { "depthBegin": 0, "depthEnd": 6, "chunks": [0] },
//!     "disk": { "depthBegin": 6, "depthEnd": 12 }
//!   }
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::TreeConfig;
use crate::error::{Result, TreeError};
use crate::persist;
use crate::types::{BBox, Schema};

/// File name of the metadata document inside an index directory.
pub const META_FILE: &str = "meta";

/// Persisted state of one branch. Only the depth range is common to all
/// tiers; index ranges are always recomputed from it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchMeta {
  pub depth_begin: usize,
  pub depth_end: usize,
  /// Chunk ids with a file on disk (cold and disk tiers).
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub chunks: Vec<u64>,
}

/// Registry section: one entry per non-empty tier.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryMeta {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub flat: Option<BranchMeta>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub cold: Option<BranchMeta>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub disk: Option<BranchMeta>,
}

/// Tree section: configuration plus the running counters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeMeta {
  #[serde(flatten)]
  pub config: TreeConfig,
  #[serde(default)]
  pub num_points: u64,
  /// One past the highest origin inserted so far.
  #[serde(default)]
  pub next_origin: u64,
}

/// The whole metadata document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetaDocument {
  pub bbox: BBox,
  pub schema: Schema,
  pub tree: TreeMeta,
  pub registry: RegistryMeta,
}

impl MetaDocument {
  /// Read and parse `<dir>/meta`.
  pub fn read(dir: &Path) -> Result<Self> {
    let path = dir.join(META_FILE);
    let bytes = persist::read_all(&path)?;
    serde_json::from_slice(&bytes).map_err(|source| TreeError::Parse { path, source })
  }

  /// Write `<dir>/meta` as pretty JSON, replacing any previous document.
  pub fn write(&self, dir: &Path) -> Result<()> {
    let path = dir.join(META_FILE);
    let json = serde_json::to_vec_pretty(self).map_err(|source| TreeError::Parse {
      path: path.clone(),
      source,
    })?;
    persist::write_atomic(&path, &json)
  }
}
