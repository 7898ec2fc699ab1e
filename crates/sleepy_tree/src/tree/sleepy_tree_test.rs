use glam::DVec2;
use tempfile::TempDir;

use super::*;
use crate::meta::META_FILE;
use crate::types::DimInfo;

fn root() -> BBox {
  BBox::new(DVec2::ZERO, DVec2::splat(100.0)).unwrap()
}

fn batch(points: &[(f64, f64)]) -> PointBuffer {
  let mut buf = PointBuffer::new(Arc::new(Schema::xyz()));
  for &(x, y) in points {
    buf.push(&[x, y, 1.0]).unwrap();
  }
  buf
}

fn tree(tmp: &TempDir) -> SleepyTree {
  SleepyTree::new(tmp.path(), root(), Schema::xyz(), TreeConfig::new(0, 6, 12)).unwrap()
}

// =========================================================================
// Construction
// =========================================================================

#[test]
fn test_new_requires_xy() {
  let tmp = TempDir::new().unwrap();
  let schema = Schema::new(vec![DimInfo::floating("X"), DimInfo::floating("Z")]).unwrap();
  let result = SleepyTree::new(tmp.path(), root(), schema, TreeConfig::default());
  assert!(matches!(result, Err(TreeError::Schema(_))));
}

#[test]
fn test_new_rejects_bad_config() {
  let tmp = TempDir::new().unwrap();
  let result = SleepyTree::new(tmp.path(), root(), Schema::xyz(), TreeConfig::new(0, 6, 40));
  assert!(matches!(result, Err(TreeError::InvalidConfig(_))));
}

#[test]
fn test_new_creates_dir() {
  let tmp = TempDir::new().unwrap();
  let dir = tmp.path().join("nested").join("index");
  let tree = SleepyTree::new(&dir, root(), Schema::xyz(), TreeConfig::default()).unwrap();
  assert!(dir.is_dir());
  assert_eq!(tree.dir(), dir);
  assert_eq!(tree.num_points(), 0);
  assert_eq!(*tree.bounds(), root());
  assert_eq!(*tree.point_context(), Schema::xyz());
}

// =========================================================================
// Insert
// =========================================================================

#[test]
fn test_insert_counts_accepted_points() {
  let tmp = TempDir::new().unwrap();
  let tree = tree(&tmp);
  tree.insert(&batch(&[(50.0, 50.0), (20.0, 70.0)]), 0);
  assert_eq!(tree.num_points(), 2);
  tree.insert(&batch(&[(150.0, 50.0), (-0.5, 3.0)]), 1);
  assert_eq!(tree.num_points(), 2);
}

#[test]
fn test_insert_converts_foreign_layout() {
  let tmp = TempDir::new().unwrap();
  let tree = tree(&tmp);
  let schema = Schema::new(vec![DimInfo::floating("Y"), DimInfo::floating("X")]).unwrap();
  let mut buf = PointBuffer::new(Arc::new(schema));
  buf.push(&[30.0, 10.0]).unwrap();
  tree.insert(&buf, 4);

  let hits = tree.get_points(0, 12).unwrap();
  assert_eq!(hits.len(), 1);
  assert_eq!(hits[0].point, DVec2::new(10.0, 30.0));
  assert_eq!(hits[0].origin, 4);

  let mut stored = PointBuffer::new(Arc::new(Schema::xyz()));
  stored.push_record(&hits[0].data).unwrap();
  assert_eq!(stored.field_as_f64("Z", 0), Some(0.0));
}

/// Every point inside the bounds counts, even one pushed below the deepest
/// tier.
#[test]
fn test_num_points_counts_points_inside_bounds() {
  let tmp = TempDir::new().unwrap();
  let tree = SleepyTree::new(tmp.path(), root(), Schema::xyz(), TreeConfig::new(0, 1, 2)).unwrap();

  tree.insert(&batch(&[(10.0, 10.0), (10.0, 10.0), (10.0, 10.0), (50.0, 50.0)]), 0);
  assert_eq!(tree.num_points(), 4);
  assert_eq!(tree.get_points(0, 2).unwrap().len(), 2);
}

#[test]
fn test_next_origin_follows_highest_origin() {
  let tmp = TempDir::new().unwrap();
  let tree = tree(&tmp);
  assert_eq!(tree.next_origin(), 0);
  tree.insert(&batch(&[(50.0, 50.0)]), 4);
  tree.insert(&batch(&[(150.0, 50.0)]), 2);
  assert_eq!(tree.next_origin(), 5);
  tree.save().unwrap();

  assert_eq!(SleepyTree::open(tmp.path()).unwrap().next_origin(), 5);
}

/// One-point disk chunks with a one-chunk cache: the root holds the first
/// point, a tie sends the second into disk chunk 0, and the third ties at
/// the root and heads for disk chunk 3, which evicts chunk 0.
fn tiny_disk_tree(tmp: &TempDir) -> SleepyTree {
  let config = TreeConfig::new(0, 1, 6)
    .with_chunk_points(1)
    .with_disk_cache_chunks(1);
  SleepyTree::new(tmp.path(), root(), Schema::xyz(), config).unwrap()
}

/// A chunk whose eviction cannot be written stays in memory, the point that
/// needed the room is kept aside, and saving stays blocked until it is
/// placed.
#[test]
fn test_failed_eviction_loses_no_points() {
  let tmp = TempDir::new().unwrap();
  let tree = tiny_disk_tree(&tmp);
  tree.insert(&batch(&[(10.0, 10.0), (10.0, 10.0)]), 0);

  let blocker = tmp.path().join("disk").join("0.tmp");
  std::fs::create_dir(&blocker).unwrap();
  tree.insert(&batch(&[(90.0, 90.0)]), 1);
  assert_eq!(tree.num_points(), 3);
  assert_eq!(tree.stranded_points(), 1);
  assert_eq!(tree.get_points(0, 6).unwrap().len(), 2);

  assert!(matches!(tree.save(), Err(TreeError::InsertFailed { stranded: 1, .. })));
  assert!(matches!(tree.save(), Err(TreeError::InsertFailed { .. })));
  assert!(!tmp.path().join(META_FILE).exists());
  assert!(tree.retry_stranded().is_err());

  std::fs::remove_dir(&blocker).unwrap();
  tree.retry_stranded().unwrap();
  assert_eq!(tree.stranded_points(), 0);
  tree.save().unwrap();

  let reloaded = SleepyTree::open(tmp.path()).unwrap();
  assert_eq!(reloaded.num_points(), 3);
  let origins: Vec<_> = reloaded.get_points(0, 6).unwrap().iter().map(|h| h.origin).collect();
  assert_eq!(origins.len(), 3);
  assert!(origins.contains(&1));
}

/// A chunk file that vanished cannot be read back; the displaced point is
/// kept aside and every save reports the failure.
#[test]
fn test_unreadable_chunk_blocks_save() {
  let tmp = TempDir::new().unwrap();
  let tree = tiny_disk_tree(&tmp);
  tree.insert(&batch(&[(10.0, 10.0), (10.0, 10.0), (90.0, 90.0)]), 0);
  std::fs::remove_file(tmp.path().join("disk").join("0")).unwrap();

  tree.insert(&batch(&[(10.0, 10.0)]), 1);
  assert_eq!(tree.num_points(), 4);
  assert_eq!(tree.stranded_points(), 1);
  assert!(matches!(tree.save(), Err(TreeError::InsertFailed { .. })));
  assert!(matches!(tree.save(), Err(TreeError::InsertFailed { .. })));
}

// =========================================================================
// Save / open
// =========================================================================

#[test]
fn test_open_restores_state() {
  let tmp = TempDir::new().unwrap();
  let tree = tree(&tmp);
  tree.insert(&batch(&[(50.0, 50.0), (10.0, 10.0), (90.0, 10.0)]), 0);
  tree.save().unwrap();

  let reloaded = SleepyTree::open(tmp.path()).unwrap();
  assert_eq!(*reloaded.bounds(), *tree.bounds());
  assert_eq!(reloaded.point_context(), tree.point_context());
  assert_eq!(reloaded.config(), tree.config());
  assert_eq!(reloaded.num_points(), 3);
  assert_eq!(reloaded.get_points(0, 12).unwrap(), tree.get_points(0, 12).unwrap());
}

#[test]
fn test_reloaded_tree_keeps_inserting() {
  let tmp = TempDir::new().unwrap();
  let tree = tree(&tmp);
  tree.insert(&batch(&[(50.0, 50.0)]), 0);
  tree.save().unwrap();
  drop(tree);

  let reloaded = SleepyTree::open(tmp.path()).unwrap();
  reloaded.insert(&batch(&[(25.0, 25.0)]), 1);
  assert_eq!(reloaded.num_points(), 2);
  reloaded.save().unwrap();

  let again = SleepyTree::open(tmp.path()).unwrap();
  let origins: Vec<_> = again.get_points(0, 12).unwrap().iter().map(|h| h.origin).collect();
  assert_eq!(origins, vec![0, 1]);
}

#[test]
fn test_save_twice_same_document() {
  let tmp = TempDir::new().unwrap();
  let tree = tree(&tmp);
  tree.insert(&batch(&[(50.0, 50.0), (12.0, 80.0)]), 0);

  tree.save().unwrap();
  let first = MetaDocument::read(tmp.path()).unwrap();
  tree.save().unwrap();
  let second = MetaDocument::read(tmp.path()).unwrap();
  assert_eq!(first, second);
  assert!(!tmp.path().join(format!("{META_FILE}.tmp")).exists());
}

/// A tier that cannot be written fails the save and leaves `meta` as it was.
#[test]
fn test_failed_tier_save_keeps_meta() {
  let tmp = TempDir::new().unwrap();
  let tree = tree(&tmp);
  let meta = tmp.path().join(META_FILE);
  let blocker = tmp.path().join("cold").join("0.tmp");

  tree.insert(&batch(&[(50.0, 50.0)]), 0);
  std::fs::create_dir_all(&blocker).unwrap();
  assert!(matches!(tree.save(), Err(TreeError::Io { .. })));
  assert!(!meta.exists());

  std::fs::remove_dir(&blocker).unwrap();
  tree.save().unwrap();
  let saved = std::fs::read(&meta).unwrap();

  tree.insert(&batch(&[(10.0, 10.0)]), 1);
  std::fs::create_dir(&blocker).unwrap();
  assert!(matches!(tree.save(), Err(TreeError::Io { .. })));
  assert_eq!(std::fs::read(&meta).unwrap(), saved);
  assert_eq!(SleepyTree::open(tmp.path()).unwrap().num_points(), 1);
}

#[test]
fn test_open_missing_dir_is_io_error() {
  let tmp = TempDir::new().unwrap();
  let result = SleepyTree::open(tmp.path().join("absent"));
  assert!(matches!(result, Err(TreeError::Io { .. })));
}

#[test]
fn test_open_malformed_meta_is_parse_error() {
  let tmp = TempDir::new().unwrap();
  std::fs::write(tmp.path().join(META_FILE), "not json").unwrap();
  assert!(matches!(
    SleepyTree::open(tmp.path()),
    Err(TreeError::Parse { .. })
  ));
}

#[test]
fn test_open_rejects_inverted_bounds() {
  let tmp = TempDir::new().unwrap();
  tree(&tmp).save().unwrap();

  let path = tmp.path().join(META_FILE);
  let mut json: serde_json::Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
  json["bbox"]["min"] = serde_json::json!([200.0, 0.0]);
  std::fs::write(&path, json.to_string()).unwrap();

  assert!(matches!(
    SleepyTree::open(tmp.path()),
    Err(TreeError::Corrupt { .. })
  ));
}

#[test]
fn test_open_rejects_schema_without_xy() {
  let tmp = TempDir::new().unwrap();
  tree(&tmp).save().unwrap();

  let path = tmp.path().join(META_FILE);
  let mut json: serde_json::Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
  json["schema"]["dims"][1]["name"] = serde_json::json!("Q");
  std::fs::write(&path, json.to_string()).unwrap();

  assert!(matches!(
    SleepyTree::open(tmp.path()),
    Err(TreeError::Corrupt { .. })
  ));
}
