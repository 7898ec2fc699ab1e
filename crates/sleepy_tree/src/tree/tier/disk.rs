//! Disk tier - out-of-core chunk storage for the deepest depths.
//!
//! Only `max_resident` chunks are held in memory. Touching a chunk beyond
//! that evicts the least recently touched one: it is written to
//! `disk/<id>` (if changed) and dropped, to be read back on its next touch.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rayon::prelude::*;

use super::chunk::Chunk;
use super::{PutResult, Rejected};
use crate::error::Result;
use crate::persist;
use crate::tree::point_info::StoredPoint;
use crate::types::Point;

/// Subdirectory holding disk chunk files.
pub const DISK_DIR: &str = "disk";

struct Resident {
  chunk: Chunk,
  last_touch: u64,
}

#[derive(Default)]
struct DiskCache {
  resident: HashMap<u64, Resident>,
  /// Chunks with a file in the working directory.
  on_disk: BTreeSet<u64>,
  tick: u64,
}

pub struct DiskTier {
  dir: PathBuf,
  index_begin: u64,
  chunk_points: u64,
  point_size: usize,
  max_resident: usize,
  cache: Mutex<DiskCache>,
}

impl DiskTier {
  /// `dir` is the index directory; chunk files live in `dir/disk`.
  pub(crate) fn new(
    dir: &Path,
    index_begin: u64,
    chunk_points: u64,
    point_size: usize,
    max_resident: usize,
  ) -> Result<Self> {
    let dir = dir.join(DISK_DIR);
    persist::create_dir(&dir)?;
    Ok(Self {
      dir,
      index_begin,
      chunk_points,
      point_size,
      max_resident: max_resident.max(1),
      cache: Mutex::new(DiskCache::default()),
    })
  }

  fn chunk_id(&self, index: u64) -> u64 {
    (index - self.index_begin) / self.chunk_points
  }

  fn chunk_path(&self, id: u64) -> PathBuf {
    self.dir.join(id.to_string())
  }

  /// Make chunk `id` resident, evicting as needed. With `create == false`
  /// a chunk that exists nowhere is not created and `None` is returned.
  fn touch<'a>(&self, cache: &'a mut DiskCache, id: u64, create: bool) -> Result<Option<&'a mut Chunk>> {
    cache.tick += 1;
    let tick = cache.tick;

    if !cache.resident.contains_key(&id) {
      let chunk = if cache.on_disk.contains(&id) {
        let path = self.chunk_path(id);
        let bytes = persist::read_all(&path)?;
        Chunk::decode(&bytes, self.point_size, &path)?
      } else if create {
        Chunk::new()
      } else {
        return Ok(None);
      };
      while cache.resident.len() >= self.max_resident {
        self.evict_oldest(cache)?;
      }
      cache.resident.insert(
        id,
        Resident {
          chunk,
          last_touch: tick,
        },
      );
    }

    Ok(cache.resident.get_mut(&id).map(|entry| {
      entry.last_touch = tick;
      &mut entry.chunk
    }))
  }

  fn evict_oldest(&self, cache: &mut DiskCache) -> Result<()> {
    let Some(id) = cache
      .resident
      .iter()
      .min_by_key(|(_, entry)| entry.last_touch)
      .map(|(&id, _)| id)
    else {
      return Ok(());
    };
    // The chunk stays resident until its file is written.
    if let Some(entry) = cache.resident.get_mut(&id) {
      if entry.chunk.is_dirty() || !cache.on_disk.contains(&id) {
        persist::write_atomic(&self.chunk_path(id), &entry.chunk.encode(self.point_size))?;
        entry.chunk.mark_clean();
        cache.on_disk.insert(id);
      }
    }
    if let Some(entry) = cache.resident.remove(&id) {
      tracing::trace!(chunk = id, points = entry.chunk.len(), "evicted disk chunk");
    }
    Ok(())
  }

  pub(crate) fn put(&self, index: u64, candidate: StoredPoint, center: Point) -> PutResult {
    let id = self.chunk_id(index);
    let mut cache = self.cache.lock();
    match self.touch(&mut cache, id, true) {
      Ok(Some(chunk)) => Ok(chunk.put(index, candidate, center)),
      Ok(None) => Ok(Some(candidate)),
      Err(error) => Err(Rejected { error, candidate }),
    }
  }

  pub(crate) fn get(&self, index: u64) -> Result<Option<StoredPoint>> {
    let id = self.chunk_id(index);
    let mut cache = self.cache.lock();
    Ok(self
      .touch(&mut cache, id, false)?
      .and_then(|chunk| chunk.get(index).cloned()))
  }

  /// Number of chunks held in memory.
  pub fn resident_chunks(&self) -> usize {
    self.cache.lock().resident.len()
  }

  /// Number of chunks known to this tier, resident or not.
  pub fn num_chunks(&self) -> usize {
    let cache = self.cache.lock();
    cache
      .on_disk
      .iter()
      .chain(cache.resident.keys())
      .collect::<BTreeSet<_>>()
      .len()
  }

  /// Flush every resident chunk under `dir/disk` and return all chunk ids.
  pub(crate) fn save(&self, dir: &Path) -> Result<Vec<u64>> {
    let target = dir.join(DISK_DIR);
    persist::create_dir(&target)?;
    let in_place = target == self.dir;

    let mut cache = self.cache.lock();
    let DiskCache {
      resident, on_disk, ..
    } = &mut *cache;

    resident.par_iter_mut().try_for_each(|(id, entry)| {
      if entry.chunk.is_dirty() || !in_place {
        persist::write_atomic(&target.join(id.to_string()), &entry.chunk.encode(self.point_size))?;
        if in_place {
          entry.chunk.mark_clean();
        }
      }
      Ok::<_, crate::error::TreeError>(())
    })?;

    for &id in on_disk.iter().filter(|id| !resident.contains_key(*id)) {
      persist::copy_if_elsewhere(&self.chunk_path(id), &target.join(id.to_string()))?;
    }
    if in_place {
      on_disk.extend(resident.keys().copied());
    }

    let ids: Vec<u64> = on_disk
      .iter()
      .chain(resident.keys())
      .copied()
      .collect::<BTreeSet<_>>()
      .into_iter()
      .collect();
    tracing::debug!(chunks = ids.len(), dir = %target.display(), "saved disk tier");
    Ok(ids)
  }

  /// Register saved chunks; they are read on first touch.
  pub(crate) fn load(&self, chunk_ids: &[u64]) {
    self.cache.lock().on_disk.extend(chunk_ids.iter().copied());
  }
}

#[cfg(test)]
mod tests {
  use glam::DVec2;

  use super::*;
  use crate::error::TreeError;

  fn stored(origin: u64) -> StoredPoint {
    StoredPoint {
      point: DVec2::splat(origin as f64),
      origin,
      data: vec![origin as u8; 2].into_boxed_slice(),
    }
  }

  #[test]
  fn test_cache_evicts_oldest_chunk() {
    let tmp = tempfile::TempDir::new().unwrap();
    let tier = DiskTier::new(tmp.path(), 0, 4, 2, 2).unwrap();

    tier.put(0, stored(0), DVec2::ZERO).unwrap(); // chunk 0
    tier.put(4, stored(1), DVec2::ZERO).unwrap(); // chunk 1
    assert_eq!(tier.resident_chunks(), 2);
    assert!(!tmp.path().join(DISK_DIR).join("0").exists());

    tier.put(8, stored(2), DVec2::ZERO).unwrap(); // chunk 2 evicts chunk 0
    assert_eq!(tier.resident_chunks(), 2);
    assert!(tmp.path().join(DISK_DIR).join("0").exists());
    assert_eq!(tier.num_chunks(), 3);

    // Reading chunk 0 brings it back and evicts chunk 1.
    assert_eq!(tier.get(0).unwrap().map(|p| p.origin), Some(0));
    assert!(tmp.path().join(DISK_DIR).join("1").exists());
    assert_eq!(tier.get(4).unwrap().map(|p| p.origin), Some(1));
  }

  #[test]
  fn test_failed_eviction_keeps_chunk() {
    let tmp = tempfile::TempDir::new().unwrap();
    let tier = DiskTier::new(tmp.path(), 0, 4, 2, 1).unwrap();
    tier.put(0, stored(3), DVec2::ZERO).unwrap();

    // A directory in the way of the temp file makes the eviction write fail.
    let blocker = tmp.path().join(DISK_DIR).join("0.tmp");
    std::fs::create_dir(&blocker).unwrap();
    let rejected = tier.put(4, stored(5), DVec2::ZERO).unwrap_err();
    assert!(matches!(rejected.error, TreeError::Io { .. }));
    assert_eq!(rejected.candidate.origin, 5);
    assert_eq!(tier.resident_chunks(), 1);
    assert_eq!(tier.get(0).unwrap().map(|p| p.origin), Some(3));

    std::fs::remove_dir(&blocker).unwrap();
    tier.put(4, rejected.candidate, DVec2::ZERO).unwrap();
    assert_eq!(tier.get(4).unwrap().map(|p| p.origin), Some(5));
    assert_eq!(tier.get(0).unwrap().map(|p| p.origin), Some(3));
  }

  #[test]
  fn test_get_missing_chunk_does_not_create() {
    let tmp = tempfile::TempDir::new().unwrap();
    let tier = DiskTier::new(tmp.path(), 10, 4, 2, 2).unwrap();
    assert!(tier.get(12).unwrap().is_none());
    assert_eq!(tier.num_chunks(), 0);
  }

  #[test]
  fn test_save_then_load() {
    let tmp = tempfile::TempDir::new().unwrap();
    let tier = DiskTier::new(tmp.path(), 0, 4, 2, 1).unwrap();
    for origin in 0..5u64 {
      tier.put(origin * 4, stored(origin), DVec2::ZERO).unwrap();
    }
    let ids = tier.save(tmp.path()).unwrap();
    assert_eq!(ids, vec![0, 1, 2, 3, 4]);

    let reloaded = DiskTier::new(tmp.path(), 0, 4, 2, 1).unwrap();
    reloaded.load(&ids);
    assert_eq!(reloaded.resident_chunks(), 0);
    for origin in 0..5u64 {
      assert_eq!(
        reloaded.get(origin * 4).unwrap().map(|p| p.origin),
        Some(origin)
      );
    }
  }

  #[test]
  fn test_save_elsewhere() {
    let work = tempfile::TempDir::new().unwrap();
    let copy = tempfile::TempDir::new().unwrap();
    let tier = DiskTier::new(work.path(), 0, 4, 2, 1).unwrap();
    tier.put(0, stored(7), DVec2::ZERO).unwrap();
    tier.put(4, stored(8), DVec2::ZERO).unwrap();
    let ids = tier.save(copy.path()).unwrap();

    let from_copy = DiskTier::new(copy.path(), 0, 4, 2, 1).unwrap();
    from_copy.load(&ids);
    assert_eq!(from_copy.get(0).unwrap().map(|p| p.origin), Some(7));
    assert_eq!(from_copy.get(4).unwrap().map(|p| p.origin), Some(8));
  }
}
