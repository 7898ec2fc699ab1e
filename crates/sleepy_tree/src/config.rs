//! TreeConfig - depth thresholds and storage tuning for an index.
//!
//! The three thresholds split the implicit tree into storage tiers:
//!
//! ```text
//! depth:  0 ........ base_depth ........ flat_depth ........ disk_depth
//!         [   flat   )[       cold       )[       disk       )
//!          in-memory    lazily loaded       out-of-core
//! ```
//!
//! Points that would have to descend to `disk_depth` or deeper are dropped.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TreeError};
use crate::tree::index::{checked_offset, max_depth};

/// Upper bound on the number of dense slots in the flat tier.
pub const MAX_FLAT_SLOTS: u64 = 1 << 24;

/// Configuration for tier layout and chunking.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeConfig {
  /// End of the in-memory flat tier.
  pub base_depth: usize,

  /// End of the lazily-loaded cold tier.
  pub flat_depth: usize,

  /// End of the disk tier; no point is stored at this depth or deeper.
  pub disk_depth: usize,

  /// Consecutive global indices per cold/disk chunk.
  #[serde(default = "default_chunk_points")]
  pub chunk_points: u64,

  /// Disk chunks kept in memory before the least recently used is evicted.
  #[serde(default = "default_disk_cache_chunks")]
  pub disk_cache_chunks: usize,
}

fn default_chunk_points() -> u64 {
  4096
}

fn default_disk_cache_chunks() -> usize {
  64
}

impl TreeConfig {
  pub fn new(base_depth: usize, flat_depth: usize, disk_depth: usize) -> Self {
    Self {
      base_depth,
      flat_depth,
      disk_depth,
      chunk_points: default_chunk_points(),
      disk_cache_chunks: default_disk_cache_chunks(),
    }
  }

  pub fn with_chunk_points(mut self, chunk_points: u64) -> Self {
    self.chunk_points = chunk_points;
    self
  }

  pub fn with_disk_cache_chunks(mut self, chunks: usize) -> Self {
    self.disk_cache_chunks = chunks;
    self
  }

  /// Check the thresholds against each other and the index space.
  pub fn validate(&self, dimensions: u32) -> Result<()> {
    if self.base_depth > self.flat_depth || self.flat_depth > self.disk_depth {
      return Err(TreeError::InvalidConfig(format!(
        "depths must satisfy base <= flat <= disk, got {}/{}/{}",
        self.base_depth, self.flat_depth, self.disk_depth
      )));
    }
    if self.disk_depth == 0 {
      return Err(TreeError::InvalidConfig(
        "disk_depth must be at least 1".into(),
      ));
    }
    // Rollers compute child indices one level below the deepest stored depth.
    let limit = max_depth(dimensions);
    if self.disk_depth >= limit {
      return Err(TreeError::InvalidConfig(format!(
        "disk_depth {} must be below {} for {} dimensions",
        self.disk_depth, limit, dimensions
      )));
    }
    let flat_slots = checked_offset(self.base_depth, dimensions).unwrap_or(u64::MAX);
    if flat_slots > MAX_FLAT_SLOTS {
      return Err(TreeError::InvalidConfig(format!(
        "base_depth {} needs {} flat slots, limit is {}",
        self.base_depth, flat_slots, MAX_FLAT_SLOTS
      )));
    }
    if self.chunk_points == 0 {
      return Err(TreeError::InvalidConfig(
        "chunk_points must be at least 1".into(),
      ));
    }
    if self.disk_cache_chunks == 0 {
      return Err(TreeError::InvalidConfig(
        "disk_cache_chunks must be at least 1".into(),
      ));
    }
    Ok(())
  }
}

impl Default for TreeConfig {
  fn default() -> Self {
    Self::new(6, 10, 20)
  }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;
