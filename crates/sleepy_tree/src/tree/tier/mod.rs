//! Storage tiers behind a [`Branch`](super::Branch).
//!
//! The set of tiers is closed, so they are variants of one enum rather than
//! trait objects:
//!
//! - [`FlatTier`]: dense in-memory slots, shallowest depths
//! - [`ColdTier`]: sparse chunks, read back lazily after a reload
//! - [`DiskTier`]: sparse chunks with a bounded in-memory cache

pub mod chunk;
pub mod cold;
pub mod disk;
pub mod flat;

use std::path::{Path, PathBuf};

pub use cold::ColdTier;
pub use disk::DiskTier;
pub use flat::FlatTier;

use crate::error::{Result, TreeError};
use crate::meta::BranchMeta;
use crate::tree::point_info::StoredPoint;
use crate::types::Point;

/// Which storage tier backs a branch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TierKind {
  Flat,
  Cold,
  Disk,
}

/// Settings tiers need beyond their index range.
#[derive(Clone, Debug)]
pub struct StorageOptions {
  /// Index directory the cold and disk tiers work in.
  pub dir: PathBuf,
  pub chunk_points: u64,
  pub disk_cache_chunks: usize,
}

/// A point a tier could not place because its storage failed. The point
/// is handed back so the caller still owns it.
#[derive(Debug)]
pub struct Rejected {
  pub error: TreeError,
  pub candidate: StoredPoint,
}

/// Outcome of offering a point to a cell: the point that must continue to a
/// deeper cell, if any.
pub type PutResult = std::result::Result<Option<StoredPoint>, Rejected>;

/// Point storage of one branch.
pub enum Tier {
  Flat(FlatTier),
  Cold(ColdTier),
  Disk(DiskTier),
}

impl Tier {
  pub(crate) fn new(
    kind: TierKind,
    index_begin: u64,
    size: u64,
    point_size: usize,
    storage: &StorageOptions,
  ) -> Result<Self> {
    Ok(match kind {
      TierKind::Flat => Tier::Flat(FlatTier::new(index_begin, size)),
      TierKind::Cold => Tier::Cold(ColdTier::new(
        &storage.dir,
        index_begin,
        storage.chunk_points,
        point_size,
      )),
      TierKind::Disk => Tier::Disk(DiskTier::new(
        &storage.dir,
        index_begin,
        storage.chunk_points,
        point_size,
        storage.disk_cache_chunks,
      )?),
    })
  }

  pub fn kind(&self) -> TierKind {
    match self {
      Tier::Flat(_) => TierKind::Flat,
      Tier::Cold(_) => TierKind::Cold,
      Tier::Disk(_) => TierKind::Disk,
    }
  }

  /// Offer `candidate` to cell `index` centred at `center`. Returns the point
  /// that must continue to a deeper cell, if any.
  pub(crate) fn put(&self, index: u64, candidate: StoredPoint, center: Point) -> PutResult {
    match self {
      Tier::Flat(tier) => Ok(tier.put(index, candidate, center)),
      Tier::Cold(tier) => tier.put(index, candidate, center),
      Tier::Disk(tier) => tier.put(index, candidate, center),
    }
  }

  pub(crate) fn get(&self, index: u64) -> Result<Option<StoredPoint>> {
    match self {
      Tier::Flat(tier) => Ok(tier.get(index)),
      Tier::Cold(tier) => tier.get(index),
      Tier::Disk(tier) => tier.get(index),
    }
  }

  /// Persist point data under `dir`, recording tier fields in `meta`.
  pub(crate) fn save(&self, dir: &Path, point_size: usize, meta: &mut BranchMeta) -> Result<()> {
    match self {
      Tier::Flat(tier) => tier.save(dir, point_size),
      Tier::Cold(tier) => {
        meta.chunks = tier.save(dir)?;
        Ok(())
      }
      Tier::Disk(tier) => {
        meta.chunks = tier.save(dir)?;
        Ok(())
      }
    }
  }

  /// Restore point data saved by [`Tier::save`] from the working directory.
  pub(crate) fn load(&self, dir: &Path, point_size: usize, meta: &BranchMeta) -> Result<()> {
    match self {
      Tier::Flat(tier) => tier.load(dir, point_size),
      Tier::Cold(tier) => {
        tier.load(&meta.chunks);
        Ok(())
      }
      Tier::Disk(tier) => {
        tier.load(&meta.chunks);
        Ok(())
      }
    }
  }
}
