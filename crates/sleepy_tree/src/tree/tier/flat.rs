//! Flat tier - dense in-memory slots for the shallowest depths.
//!
//! One slot per global index, each behind its own lock so concurrent inserts
//! only contend on the same cell. Persisted as a single `flat` file and
//! loaded eagerly.

use std::path::Path;

use parking_lot::Mutex;

use super::chunk::{decode_points, encode_points, settle};
use crate::error::{Result, TreeError};
use crate::persist;
use crate::tree::point_info::StoredPoint;
use crate::types::Point;

/// File name of the flat tier inside an index directory.
pub const FLAT_FILE: &str = "flat";

pub struct FlatTier {
  index_begin: u64,
  slots: Vec<Mutex<Option<StoredPoint>>>,
}

impl FlatTier {
  pub(crate) fn new(index_begin: u64, size: u64) -> Self {
    let slots = (0..size).map(|_| Mutex::new(None)).collect();
    Self { index_begin, slots }
  }

  fn slot(&self, index: u64) -> &Mutex<Option<StoredPoint>> {
    &self.slots[(index - self.index_begin) as usize]
  }

  pub(crate) fn put(&self, index: u64, candidate: StoredPoint, center: Point) -> Option<StoredPoint> {
    let mut slot = self.slot(index).lock();
    match slot.as_mut() {
      None => {
        *slot = Some(candidate);
        None
      }
      Some(occupant) => Some(settle(occupant, candidate, center)),
    }
  }

  pub(crate) fn get(&self, index: u64) -> Option<StoredPoint> {
    self.slot(index).lock().clone()
  }

  /// Number of occupied slots.
  pub fn num_points(&self) -> usize {
    self.slots.iter().filter(|s| s.lock().is_some()).count()
  }

  pub(crate) fn save(&self, dir: &Path, point_size: usize) -> Result<()> {
    let guards: Vec<_> = self.slots.iter().map(|s| s.lock()).collect();
    let occupied: Vec<(u64, &StoredPoint)> = guards
      .iter()
      .enumerate()
      .filter_map(|(i, slot)| slot.as_ref().map(|p| (self.index_begin + i as u64, p)))
      .collect();
    let bytes = encode_points(occupied.iter().copied(), occupied.len(), point_size);
    persist::write_atomic(&dir.join(FLAT_FILE), &bytes)
  }

  pub(crate) fn load(&self, dir: &Path, point_size: usize) -> Result<()> {
    let path = dir.join(FLAT_FILE);
    let bytes = persist::read_all(&path)?;
    for (index, stored) in decode_points(&bytes, point_size, &path)? {
      let offset = index.wrapping_sub(self.index_begin);
      let slot = self
        .slots
        .get(offset as usize)
        .ok_or_else(|| TreeError::corrupt(&path, format!("index {index} outside flat tier")))?;
      *slot.lock() = Some(stored);
    }
    Ok(())
  }
}
