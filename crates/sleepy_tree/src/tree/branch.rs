//! Branch - one contiguous depth range of the implicit tree.
//!
//! A branch owns the global indices `[offset(depth_begin), offset(depth_end))`
//! and the storage tier holding points for them. Only the depth range is
//! persisted; the index range is recomputed on every construction.

use std::path::Path;
use std::sync::Arc;

use super::index;
use super::point_info::StoredPoint;
use super::tier::{PutResult, StorageOptions, Tier, TierKind};
use crate::config::MAX_FLAT_SLOTS;
use crate::error::{Result, TreeError};
use crate::meta::BranchMeta;
use crate::types::{Point, Schema};

pub struct Branch {
  schema: Arc<Schema>,
  depth_begin: usize,
  depth_end: usize,
  index_begin: u64,
  index_end: u64,
  tier: Tier,
}

impl Branch {
  /// Branch over depths `[depth_begin, depth_end)` backed by a `kind` tier.
  pub fn new(
    kind: TierKind,
    schema: Arc<Schema>,
    dimensions: u32,
    depth_begin: usize,
    depth_end: usize,
    storage: &StorageOptions,
  ) -> Result<Self> {
    if dimensions > index::MAX_DIMENSIONS {
      return Err(TreeError::InvalidConfig(format!(
        "{dimensions} dimensions exceeds the limit of {}",
        index::MAX_DIMENSIONS
      )));
    }
    if depth_end < depth_begin {
      return Err(TreeError::InvalidDepthRange {
        begin: depth_begin,
        end: depth_end,
      });
    }
    let index_begin = index::offset(depth_begin, dimensions)?;
    let index_end = index::offset(depth_end, dimensions)?;
    let size = index_end - index_begin;
    if kind == TierKind::Flat && size > MAX_FLAT_SLOTS {
      return Err(TreeError::InvalidConfig(format!(
        "flat branch of {size} slots exceeds the limit of {MAX_FLAT_SLOTS}"
      )));
    }

    let tier = Tier::new(kind, index_begin, size, schema.point_size(), storage)?;
    Ok(Self {
      schema,
      depth_begin,
      depth_end,
      index_begin,
      index_end,
      tier,
    })
  }

  /// Rebuild a saved branch and load its tier state from `storage.dir`.
  pub fn from_meta(
    kind: TierKind,
    schema: Arc<Schema>,
    dimensions: u32,
    meta: &BranchMeta,
    storage: &StorageOptions,
  ) -> Result<Self> {
    let branch = Self::new(kind, schema, dimensions, meta.depth_begin, meta.depth_end, storage)?;
    branch
      .tier
      .load(&storage.dir, branch.schema.point_size(), meta)?;
    tracing::debug!(
      tier = ?kind,
      depth_begin = meta.depth_begin,
      depth_end = meta.depth_end,
      chunks = meta.chunks.len(),
      "loaded branch"
    );
    Ok(branch)
  }

  #[inline]
  pub fn accepts(&self, index: u64) -> bool {
    self.index_begin <= index && index < self.index_end
  }

  /// Record the depth range in `meta`, then write tier data under `dir`.
  pub fn save(&self, dir: &Path, meta: &mut BranchMeta) -> Result<()> {
    meta.depth_begin = self.depth_begin;
    meta.depth_end = self.depth_end;
    self.tier.save(dir, self.schema.point_size(), meta)
  }

  pub(crate) fn put(&self, index: u64, candidate: StoredPoint, center: Point) -> PutResult {
    self.tier.put(index, candidate, center)
  }

  pub(crate) fn get(&self, index: u64) -> Result<Option<StoredPoint>> {
    self.tier.get(index)
  }

  pub fn schema(&self) -> &Arc<Schema> {
    &self.schema
  }

  pub fn depth_begin(&self) -> usize {
    self.depth_begin
  }

  pub fn depth_end(&self) -> usize {
    self.depth_end
  }

  pub fn index_begin(&self) -> u64 {
    self.index_begin
  }

  pub fn index_end(&self) -> u64 {
    self.index_end
  }

  /// Capacity of the index range, not the number of stored points.
  pub fn size(&self) -> u64 {
    self.index_end - self.index_begin
  }

  pub fn kind(&self) -> TierKind {
    self.tier.kind()
  }

  pub fn tier(&self) -> &Tier {
    &self.tier
  }
}

#[cfg(test)]
#[path = "branch_test.rs"]
mod branch_test;
