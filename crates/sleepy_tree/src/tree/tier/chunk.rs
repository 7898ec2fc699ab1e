//! Sparse point chunks and their file encoding.
//!
//! # File layout
//!
//! ```text
//! magic u32 | version u32 | point_size u32 | count u64
//! count x ( index u64 | origin u64 | x f64 | y f64 | record[point_size] )
//! ```
//!
//! All integers and floats little-endian.

use std::collections::HashMap;
use std::path::Path;

use glam::DVec2;

use crate::error::{Result, TreeError};
use crate::tree::point_info::StoredPoint;
use crate::types::Point;

/// Magic number for tier files.
const CHUNK_MAGIC: u32 = 0x534C_5043; // "SLPC"

/// Version of the tier file format.
const CHUNK_VERSION: u32 = 1;

const HEADER_SIZE: usize = 4 + 4 + 4 + 8;
const ENTRY_FIXED_SIZE: usize = 8 + 8 + 8 + 8;

/// Keep whichever of the occupant and the candidate is nearer the cell
/// center. Returns the point that must descend further.
pub(crate) fn settle(occupant: &mut StoredPoint, candidate: StoredPoint, center: Point) -> StoredPoint {
  if candidate.point.distance_squared(center) < occupant.point.distance_squared(center) {
    std::mem::replace(occupant, candidate)
  } else {
    candidate
  }
}

/// Points of one run of consecutive global indices.
#[derive(Debug, Default)]
pub(crate) struct Chunk {
  points: HashMap<u64, StoredPoint>,
  /// Changed since last written.
  dirty: bool,
}

impl Chunk {
  pub(crate) fn new() -> Self {
    Self::default()
  }

  /// Place `candidate` at `index`. Returns the point that must descend.
  pub(crate) fn put(&mut self, index: u64, candidate: StoredPoint, center: Point) -> Option<StoredPoint> {
    use std::collections::hash_map::Entry;

    self.dirty = true;
    match self.points.entry(index) {
      Entry::Vacant(slot) => {
        slot.insert(candidate);
        None
      }
      Entry::Occupied(mut slot) => Some(settle(slot.get_mut(), candidate, center)),
    }
  }

  pub(crate) fn get(&self, index: u64) -> Option<&StoredPoint> {
    self.points.get(&index)
  }

  pub(crate) fn len(&self) -> usize {
    self.points.len()
  }

  pub(crate) fn is_dirty(&self) -> bool {
    self.dirty
  }

  pub(crate) fn mark_clean(&mut self) {
    self.dirty = false;
  }

  pub(crate) fn encode(&self, point_size: usize) -> Vec<u8> {
    encode_points(self.points.iter().map(|(&i, p)| (i, p)), self.points.len(), point_size)
  }

  pub(crate) fn decode(bytes: &[u8], point_size: usize, path: &Path) -> Result<Self> {
    let points = decode_points(bytes, point_size, path)?.into_iter().collect();
    Ok(Self {
      points,
      dirty: false,
    })
  }
}

/// Encode `count` indexed points.
pub(crate) fn encode_points<'a>(
  points: impl Iterator<Item = (u64, &'a StoredPoint)>,
  count: usize,
  point_size: usize,
) -> Vec<u8> {
  let mut buf = Vec::with_capacity(HEADER_SIZE + count * (ENTRY_FIXED_SIZE + point_size));
  buf.extend_from_slice(&CHUNK_MAGIC.to_le_bytes());
  buf.extend_from_slice(&CHUNK_VERSION.to_le_bytes());
  buf.extend_from_slice(&(point_size as u32).to_le_bytes());
  buf.extend_from_slice(&(count as u64).to_le_bytes());
  for (index, stored) in points {
    buf.extend_from_slice(&index.to_le_bytes());
    buf.extend_from_slice(&stored.origin.to_le_bytes());
    buf.extend_from_slice(&stored.point.x.to_le_bytes());
    buf.extend_from_slice(&stored.point.y.to_le_bytes());
    buf.extend_from_slice(&stored.data);
  }
  buf
}

/// Decode indexed points written by [`encode_points`].
pub(crate) fn decode_points(bytes: &[u8], point_size: usize, path: &Path) -> Result<Vec<(u64, StoredPoint)>> {
  let mut reader = Reader { bytes, pos: 0, path };

  if reader.u32()? != CHUNK_MAGIC {
    return Err(TreeError::corrupt(path, "bad magic"));
  }
  let version = reader.u32()?;
  if version != CHUNK_VERSION {
    return Err(TreeError::corrupt(path, format!("unsupported version {version}")));
  }
  let stored_size = reader.u32()? as usize;
  if stored_size != point_size {
    return Err(TreeError::corrupt(
      path,
      format!("point size {stored_size} does not match schema size {point_size}"),
    ));
  }
  let count = reader.u64()? as usize;
  let expected = HEADER_SIZE + count.saturating_mul(ENTRY_FIXED_SIZE + point_size);
  if bytes.len() != expected {
    return Err(TreeError::corrupt(
      path,
      format!("expected {expected} bytes for {count} points, found {}", bytes.len()),
    ));
  }

  let mut points = Vec::with_capacity(count);
  for _ in 0..count {
    let index = reader.u64()?;
    let origin = reader.u64()?;
    let x = reader.f64()?;
    let y = reader.f64()?;
    let data = reader.take(point_size)?.to_vec().into_boxed_slice();
    points.push((
      index,
      StoredPoint {
        point: DVec2::new(x, y),
        origin,
        data,
      },
    ));
  }
  Ok(points)
}

struct Reader<'a> {
  bytes: &'a [u8],
  pos: usize,
  path: &'a Path,
}

impl<'a> Reader<'a> {
  fn take(&mut self, n: usize) -> Result<&'a [u8]> {
    let end = self.pos + n;
    if end > self.bytes.len() {
      return Err(TreeError::corrupt(self.path, "unexpected end of file"));
    }
    let slice = &self.bytes[self.pos..end];
    self.pos = end;
    Ok(slice)
  }

  fn u32(&mut self) -> Result<u32> {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(self.take(4)?);
    Ok(u32::from_le_bytes(raw))
  }

  fn u64(&mut self) -> Result<u64> {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(self.take(8)?);
    Ok(u64::from_le_bytes(raw))
  }

  fn f64(&mut self) -> Result<f64> {
    Ok(f64::from_bits(self.u64()?))
  }
}
