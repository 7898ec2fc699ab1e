//! Cold tier - sparse chunks materialized on first touch.
//!
//! Chunks are created the first time a point lands in their index run. After
//! a reload every saved chunk starts out `Persisted` and is only read back
//! from `cold/<id>` when an insert or query reaches it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rayon::prelude::*;

use super::chunk::Chunk;
use super::{PutResult, Rejected};
use crate::error::{Result, TreeError};
use crate::persist;
use crate::tree::point_info::StoredPoint;
use crate::types::Point;

/// Subdirectory holding cold chunk files.
pub const COLD_DIR: &str = "cold";

enum ColdSlot {
  Resident(Chunk),
  /// Saved to the working directory, not yet read back.
  Persisted,
}

pub struct ColdTier {
  dir: PathBuf,
  index_begin: u64,
  chunk_points: u64,
  point_size: usize,
  chunks: RwLock<HashMap<u64, Arc<Mutex<ColdSlot>>>>,
}

impl ColdTier {
  /// `dir` is the index directory; chunk files live in `dir/cold`.
  pub(crate) fn new(dir: &Path, index_begin: u64, chunk_points: u64, point_size: usize) -> Self {
    Self {
      dir: dir.join(COLD_DIR),
      index_begin,
      chunk_points,
      point_size,
      chunks: RwLock::new(HashMap::new()),
    }
  }

  fn chunk_id(&self, index: u64) -> u64 {
    (index - self.index_begin) / self.chunk_points
  }

  fn chunk_path(&self, id: u64) -> PathBuf {
    self.dir.join(id.to_string())
  }

  fn existing_slot(&self, id: u64) -> Option<Arc<Mutex<ColdSlot>>> {
    self.chunks.read().get(&id).map(Arc::clone)
  }

  fn slot_or_create(&self, id: u64) -> Arc<Mutex<ColdSlot>> {
    if let Some(slot) = self.existing_slot(id) {
      return slot;
    }
    let mut chunks = self.chunks.write();
    let slot = chunks
      .entry(id)
      .or_insert_with(|| Arc::new(Mutex::new(ColdSlot::Resident(Chunk::new()))));
    Arc::clone(slot)
  }

  /// Read a persisted chunk into memory if it is not already resident.
  fn materialize<'a>(&self, id: u64, slot: &'a mut ColdSlot) -> Result<&'a mut Chunk> {
    if let ColdSlot::Persisted = slot {
      let path = self.chunk_path(id);
      let bytes = persist::read_all(&path)?;
      *slot = ColdSlot::Resident(Chunk::decode(&bytes, self.point_size, &path)?);
      tracing::debug!(chunk = id, path = %path.display(), "materialized cold chunk");
    }
    match slot {
      ColdSlot::Resident(chunk) => Ok(chunk),
      ColdSlot::Persisted => Err(TreeError::corrupt(self.chunk_path(id), "chunk not materialized")),
    }
  }

  pub(crate) fn put(&self, index: u64, candidate: StoredPoint, center: Point) -> PutResult {
    let id = self.chunk_id(index);
    let slot = self.slot_or_create(id);
    let mut slot = slot.lock();
    match self.materialize(id, &mut slot) {
      Ok(chunk) => Ok(chunk.put(index, candidate, center)),
      Err(error) => Err(Rejected { error, candidate }),
    }
  }

  pub(crate) fn get(&self, index: u64) -> Result<Option<StoredPoint>> {
    let id = self.chunk_id(index);
    let Some(slot) = self.existing_slot(id) else {
      return Ok(None);
    };
    let mut slot = slot.lock();
    let chunk = self.materialize(id, &mut slot)?;
    Ok(chunk.get(index).cloned())
  }

  /// Number of chunks known to this tier, resident or not.
  pub fn num_chunks(&self) -> usize {
    self.chunks.read().len()
  }

  /// Number of chunks currently held in memory.
  pub fn resident_chunks(&self) -> usize {
    self
      .chunks
      .read()
      .values()
      .filter(|s| matches!(*s.lock(), ColdSlot::Resident(_)))
      .count()
  }

  /// Write every chunk under `dir/cold` and return the saved chunk ids.
  pub(crate) fn save(&self, dir: &Path) -> Result<Vec<u64>> {
    let target = dir.join(COLD_DIR);
    persist::create_dir(&target)?;

    let slots: Vec<(u64, Arc<Mutex<ColdSlot>>)> = self
      .chunks
      .read()
      .iter()
      .map(|(&id, slot)| (id, Arc::clone(slot)))
      .collect();

    slots.par_iter().try_for_each(|(id, slot)| {
      let path = target.join(id.to_string());
      let mut slot = slot.lock();
      match &mut *slot {
        ColdSlot::Resident(chunk) => {
          // Unchanged chunks already on disk in the working dir need no rewrite.
          if chunk.is_dirty() || target != self.dir {
            persist::write_atomic(&path, &chunk.encode(self.point_size))?;
            if target == self.dir {
              chunk.mark_clean();
            }
          }
          Ok(())
        }
        ColdSlot::Persisted => persist::copy_if_elsewhere(&self.chunk_path(*id), &path),
      }
    })?;

    let mut ids: Vec<u64> = slots.into_iter().map(|(id, _)| id).collect();
    ids.sort_unstable();
    tracing::debug!(chunks = ids.len(), dir = %target.display(), "saved cold tier");
    Ok(ids)
  }

  /// Register saved chunks without reading them.
  pub(crate) fn load(&self, chunk_ids: &[u64]) {
    let mut chunks = self.chunks.write();
    for &id in chunk_ids {
      chunks.insert(id, Arc::new(Mutex::new(ColdSlot::Persisted)));
    }
  }
}

#[cfg(test)]
mod tests {
  use glam::DVec2;

  use super::*;

  fn stored(x: f64, origin: u64) -> StoredPoint {
    StoredPoint {
      point: DVec2::new(x, x),
      origin,
      data: vec![7; 3].into_boxed_slice(),
    }
  }

  #[test]
  fn test_chunks_created_on_touch() {
    let tmp = tempfile::TempDir::new().unwrap();
    let tier = ColdTier::new(tmp.path(), 5, 10, 3);
    assert_eq!(tier.num_chunks(), 0);

    tier.put(5, stored(1.0, 0), DVec2::ZERO).unwrap();
    tier.put(14, stored(1.0, 1), DVec2::ZERO).unwrap();
    assert_eq!(tier.num_chunks(), 1);
    tier.put(15, stored(1.0, 2), DVec2::ZERO).unwrap();
    assert_eq!(tier.num_chunks(), 2);

    assert_eq!(tier.get(14).unwrap().map(|p| p.origin), Some(1));
    assert!(tier.get(40).unwrap().is_none());
    assert_eq!(tier.num_chunks(), 2, "reads must not create chunks");
  }

  #[test]
  fn test_reload_is_lazy() {
    let tmp = tempfile::TempDir::new().unwrap();
    let tier = ColdTier::new(tmp.path(), 0, 4, 3);
    tier.put(1, stored(1.0, 10), DVec2::ZERO).unwrap();
    tier.put(9, stored(2.0, 11), DVec2::ZERO).unwrap();
    let ids = tier.save(tmp.path()).unwrap();
    assert_eq!(ids, vec![0, 2]);

    let reloaded = ColdTier::new(tmp.path(), 0, 4, 3);
    reloaded.load(&ids);
    assert_eq!(reloaded.num_chunks(), 2);
    assert_eq!(reloaded.resident_chunks(), 0);

    assert_eq!(reloaded.get(9).unwrap().map(|p| p.origin), Some(11));
    assert_eq!(reloaded.resident_chunks(), 1);
    assert_eq!(reloaded.get(1).unwrap().map(|p| p.origin), Some(10));
    assert_eq!(reloaded.resident_chunks(), 2);
  }

  #[test]
  fn test_missing_chunk_file_is_error() {
    let tmp = tempfile::TempDir::new().unwrap();
    let tier = ColdTier::new(tmp.path(), 0, 4, 3);
    tier.load(&[3]);
    assert!(tier.get(12).is_err());
  }

  #[test]
  fn test_save_elsewhere_copies_unread_chunks() {
    let work = tempfile::TempDir::new().unwrap();
    let copy = tempfile::TempDir::new().unwrap();
    let tier = ColdTier::new(work.path(), 0, 4, 3);
    tier.put(2, stored(1.0, 5), DVec2::ZERO).unwrap();
    let ids = tier.save(work.path()).unwrap();

    let reloaded = ColdTier::new(work.path(), 0, 4, 3);
    reloaded.load(&ids);
    reloaded.save(copy.path()).unwrap();

    let from_copy = ColdTier::new(copy.path(), 0, 4, 3);
    from_copy.load(&ids);
    assert_eq!(from_copy.get(2).unwrap().map(|p| p.origin), Some(5));
  }
}
