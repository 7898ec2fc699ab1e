use glam::DVec2;
use tempfile::TempDir;

use super::*;
use crate::tree::index::checked_offset;

fn storage(tmp: &TempDir) -> StorageOptions {
  StorageOptions {
    dir: tmp.path().to_path_buf(),
    chunk_points: 16,
    disk_cache_chunks: 2,
  }
}

fn schema() -> Arc<Schema> {
  Arc::new(Schema::xyz())
}

// =========================================================================
// Index range
// =========================================================================

#[test]
fn test_index_range_from_depths() {
  let tmp = TempDir::new().unwrap();
  let branch = Branch::new(TierKind::Cold, schema(), 2, 2, 5, &storage(&tmp)).unwrap();
  assert_eq!(branch.index_begin(), 5);
  assert_eq!(branch.index_end(), 341);
  assert_eq!(branch.size(), 336);
  assert_eq!(branch.depth_begin(), 2);
  assert_eq!(branch.depth_end(), 5);
  assert_eq!(branch.kind(), TierKind::Cold);
}

/// accepts() is true on exactly [index_begin, index_end).
#[test]
fn test_accepts_exact_half_open_range() {
  let tmp = TempDir::new().unwrap();
  for dimensions in [2u32, 3] {
    for (begin, end) in [(0usize, 1usize), (1, 3), (3, 6), (4, 5)] {
      let branch = Branch::new(TierKind::Cold, schema(), dimensions, begin, end, &storage(&tmp)).unwrap();
      assert!(branch.index_begin() < branch.index_end());

      let lo = branch.index_begin();
      let hi = branch.index_end();
      assert!(branch.accepts(lo));
      assert!(branch.accepts(hi - 1));
      assert!(!branch.accepts(hi));
      if lo > 0 {
        assert!(!branch.accepts(lo - 1));
      }
      assert_eq!(lo, checked_offset(begin, dimensions).unwrap());
      assert_eq!(hi, checked_offset(end, dimensions).unwrap());
    }
  }
}

#[test]
fn test_empty_range_accepts_nothing() {
  let tmp = TempDir::new().unwrap();
  let branch = Branch::new(TierKind::Cold, schema(), 2, 3, 3, &storage(&tmp)).unwrap();
  assert_eq!(branch.size(), 0);
  assert!(!branch.accepts(branch.index_begin()));
}

#[test]
fn test_end_before_begin_fails() {
  let tmp = TempDir::new().unwrap();
  let result = Branch::new(TierKind::Cold, schema(), 2, 5, 4, &storage(&tmp));
  assert!(matches!(
    result,
    Err(TreeError::InvalidDepthRange { begin: 5, end: 4 })
  ));
}

#[test]
fn test_unrepresentable_depth_fails() {
  let tmp = TempDir::new().unwrap();
  let result = Branch::new(TierKind::Cold, schema(), 3, 0, 40, &storage(&tmp));
  assert!(matches!(
    result,
    Err(TreeError::DepthOverflow { depth: 40, dimensions: 3 })
  ));
}

#[test]
fn test_too_many_dimensions_fails() {
  let tmp = TempDir::new().unwrap();
  let result = Branch::new(TierKind::Cold, schema(), 4, 0, 2, &storage(&tmp));
  assert!(matches!(result, Err(TreeError::InvalidConfig(_))));
}

#[test]
fn test_oversized_flat_branch_fails() {
  let tmp = TempDir::new().unwrap();
  let result = Branch::new(TierKind::Flat, schema(), 2, 0, 16, &storage(&tmp));
  assert!(matches!(result, Err(TreeError::InvalidConfig(_))));
}

// =========================================================================
// Persistence
// =========================================================================

/// Rebuilding from saved depths reproduces the index range.
#[test]
fn test_meta_round_trip_keeps_index_range() {
  let tmp = TempDir::new().unwrap();
  for kind in [TierKind::Flat, TierKind::Cold, TierKind::Disk] {
    let branch = Branch::new(kind, schema(), 2, 1, 4, &storage(&tmp)).unwrap();
    let mut meta = BranchMeta::default();
    branch.save(tmp.path(), &mut meta).unwrap();
    assert_eq!((meta.depth_begin, meta.depth_end), (1, 4));

    let rebuilt = Branch::from_meta(kind, schema(), 2, &meta, &storage(&tmp)).unwrap();
    assert_eq!(rebuilt.index_begin(), branch.index_begin());
    assert_eq!(rebuilt.index_end(), branch.index_end());
    assert_eq!(rebuilt.kind(), kind);
  }
}

#[test]
fn test_saved_points_come_back() {
  let tmp = TempDir::new().unwrap();
  let point_size = Schema::xyz().point_size();
  let stored = StoredPoint {
    point: DVec2::new(3.0, 4.0),
    origin: 9,
    data: vec![0xAB; point_size].into_boxed_slice(),
  };

  for kind in [TierKind::Flat, TierKind::Cold, TierKind::Disk] {
    let branch = Branch::new(kind, schema(), 2, 0, 3, &storage(&tmp)).unwrap();
    assert!(branch.put(7, stored.clone(), DVec2::ZERO).unwrap().is_none());
    let mut meta = BranchMeta::default();
    branch.save(tmp.path(), &mut meta).unwrap();

    let rebuilt = Branch::from_meta(kind, schema(), 2, &meta, &storage(&tmp)).unwrap();
    assert_eq!(rebuilt.get(7).unwrap(), Some(stored.clone()), "{kind:?}");
    assert!(rebuilt.get(8).unwrap().is_none());
  }
}
