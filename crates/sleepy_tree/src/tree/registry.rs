//! Registry - routes points between the storage tiers.
//!
//! Depth thresholds split the tree into up to three branches:
//!
//! ```text
//! Flat [0, base_depth)  Cold [base_depth, flat_depth)  Disk [flat_depth, disk_depth)
//! ```
//!
//! Empty ranges get no branch. Each cell keeps the point nearest its center;
//! the other point rolls one level deeper, until it finds a free cell or
//! falls off the bottom at `disk_depth`.

use std::path::Path;
use std::sync::Arc;

use rayon::prelude::*;
use smallvec::SmallVec;

use super::branch::Branch;
use super::point_info::{MultiResults, PointInfo, ResultPoint, StoredPoint};
use super::roller::{Roller, DIMENSIONS};
use super::tier::{Rejected, StorageOptions, TierKind};
use crate::config::TreeConfig;
use crate::error::{Result, TreeError};
use crate::meta::{BranchMeta, RegistryMeta, META_FILE};
use crate::types::{BBox, Dir, Schema};

/// Owns one branch per non-empty tier.
pub struct Registry {
  branches: Vec<Branch>,
}

/// Depth range of each tier under `config`, shallowest first.
fn tier_ranges(config: &TreeConfig) -> [(TierKind, usize, usize); 3] {
  [
    (TierKind::Flat, 0, config.base_depth),
    (TierKind::Cold, config.base_depth, config.flat_depth),
    (TierKind::Disk, config.flat_depth, config.disk_depth),
  ]
}

fn storage_options(config: &TreeConfig, dir: &Path) -> StorageOptions {
  StorageOptions {
    dir: dir.to_path_buf(),
    chunk_points: config.chunk_points,
    disk_cache_chunks: config.disk_cache_chunks,
  }
}

fn meta_slot(meta: &mut RegistryMeta, kind: TierKind) -> &mut Option<BranchMeta> {
  match kind {
    TierKind::Flat => &mut meta.flat,
    TierKind::Cold => &mut meta.cold,
    TierKind::Disk => &mut meta.disk,
  }
}

impl Registry {
  /// Empty registry for a fresh index working in `dir`.
  pub fn new(schema: Arc<Schema>, config: &TreeConfig, dir: &Path) -> Result<Self> {
    config.validate(DIMENSIONS)?;
    let storage = storage_options(config, dir);
    let branches = tier_ranges(config)
      .into_iter()
      .filter(|(_, begin, end)| begin < end)
      .map(|(kind, begin, end)| Branch::new(kind, Arc::clone(&schema), DIMENSIONS, begin, end, &storage))
      .collect::<Result<Vec<_>>>()?;
    Ok(Self { branches })
  }

  /// Rebuild a saved registry. Every non-empty tier under `config` must have
  /// a matching entry in `meta`.
  pub fn from_meta(schema: Arc<Schema>, config: &TreeConfig, dir: &Path, meta: &RegistryMeta) -> Result<Self> {
    config.validate(DIMENSIONS)?;
    let storage = storage_options(config, dir);
    let meta_path = dir.join(META_FILE);
    let mut meta = meta.clone();
    let mut branches = Vec::new();

    for (kind, begin, end) in tier_ranges(config) {
      let entry = meta_slot(&mut meta, kind).take();
      match entry {
        None if begin == end => {}
        None => {
          return Err(TreeError::corrupt(
            &meta_path,
            format!("registry has no {kind:?} entry for depths {begin}..{end}"),
          ));
        }
        Some(entry) if (entry.depth_begin, entry.depth_end) != (begin, end) => {
          return Err(TreeError::corrupt(
            &meta_path,
            format!(
              "{kind:?} entry covers depths {}..{}, thresholds give {begin}..{end}",
              entry.depth_begin, entry.depth_end
            ),
          ));
        }
        Some(entry) => {
          branches.push(Branch::from_meta(kind, Arc::clone(&schema), DIMENSIONS, &entry, &storage)?);
        }
      }
    }
    Ok(Self { branches })
  }

  pub fn branches(&self) -> &[Branch] {
    &self.branches
  }

  fn branch_for(&self, index: u64) -> Option<&Branch> {
    self.branches.iter().find(|branch| branch.accepts(index))
  }

  /// Place `info` starting at the cell under `roller`. Returns whether the
  /// inserted point is retained.
  ///
  /// When a tier fails, the point being carried at that moment (the inserted
  /// one or an occupant it displaced) is handed back in the error.
  pub fn put(&self, info: &PointInfo<'_>, roller: Roller) -> std::result::Result<bool, Rejected> {
    self.place(info.to_stored(), roller)
  }

  /// [`put`](Self::put) for a point that is already owned, such as one
  /// handed back by an earlier failure.
  pub fn place(&self, mut candidate: StoredPoint, mut roller: Roller) -> std::result::Result<bool, Rejected> {
    // Whether `candidate` is still the offered point rather than a displaced occupant.
    let mut carrying_offered = true;

    loop {
      let Some(branch) = self.branch_for(roller.index()) else {
        tracing::trace!(
          depth = roller.depth(),
          origin = candidate.origin,
          "point fell below the deepest tier"
        );
        return Ok(!carrying_offered);
      };

      let offered = candidate.point;
      match branch.put(roller.index(), candidate, roller.bbox().mid())? {
        None => return Ok(true),
        Some(next) => {
          // Coordinates identical to the offered point tie, and ties keep the occupant.
          carrying_offered &= next.point == offered;
          roller.magnify(next.point);
          candidate = next;
        }
      }
    }
  }

  /// Collect stored points with depth in `[depth_begin, depth_end)` below
  /// `roller`, restricted to `bbox` if given. Results are appended in
  /// depth-first order.
  pub fn get_points(
    &self,
    roller: Roller,
    results: &mut MultiResults,
    depth_begin: usize,
    depth_end: usize,
    bbox: Option<&BBox>,
  ) -> Result<()> {
    let mut stack: SmallVec<[Roller; 64]> = SmallVec::new();
    stack.push(roller);

    while let Some(cell) = stack.pop() {
      if cell.depth() >= depth_end {
        continue;
      }
      if bbox.is_some_and(|query| !cell.bbox().overlaps(query)) {
        continue;
      }
      let Some(branch) = self.branch_for(cell.index()) else {
        continue;
      };
      // Points only descend through occupied cells.
      let Some(stored) = branch.get(cell.index())? else {
        continue;
      };

      if cell.depth() >= depth_begin && bbox.map_or(true, |query| query.contains(stored.point)) {
        results.push(ResultPoint {
          index: cell.index(),
          depth: cell.depth(),
          point: stored.point,
          origin: stored.origin,
          data: stored.data,
        });
      }
      stack.extend(Dir::ALL.iter().rev().map(|&dir| cell.child(dir)));
    }
    Ok(())
  }

  /// Save every branch under `dir`, filling the matching `meta` entries.
  pub fn save(&self, dir: &Path, meta: &mut RegistryMeta) -> Result<()> {
    let saved = self
      .branches
      .par_iter()
      .map(|branch| {
        let mut entry = BranchMeta::default();
        branch.save(dir, &mut entry)?;
        Ok((branch.kind(), entry))
      })
      .collect::<Result<Vec<_>>>()?;

    *meta = RegistryMeta::default();
    for (kind, entry) in saved {
      *meta_slot(meta, kind) = Some(entry);
    }
    Ok(())
  }
}

#[cfg(test)]
#[path = "registry_test.rs"]
mod registry_test;
