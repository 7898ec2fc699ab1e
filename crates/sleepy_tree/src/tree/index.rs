//! Global index math for the implicit complete n-ary tree.
//!
//! Cells are numbered breadth-first: the root is 0, its `2^dimensions`
//! children follow, then all grandchildren, and so on.
//!
//! ```text
//! offset(0)     = 0
//! offset(d + 1) = offset(d) * 2^dimensions + 1
//! ```
//!
//! `offset(d)` is the number of cells above depth `d`, which is also the
//! global index of the first cell at depth `d`. A depth range
//! `[begin, end)` therefore owns the contiguous index range
//! `[offset(begin), offset(end))`.

use crate::error::{Result, TreeError};

/// Largest supported branching exponent (octree).
pub const MAX_DIMENSIONS: u32 = 3;

/// Global index of the first cell at `depth`, or `None` on overflow.
///
/// Computed with the recurrence rather than a closed-form power sum so that
/// `dimensions == 0` degenerates to `offset(d) = d`.
pub fn checked_offset(depth: usize, dimensions: u32) -> Option<u64> {
  if depth == 0 {
    return Some(0);
  }
  let fanout = 1u64.checked_shl(dimensions)?;
  let mut offset: u64 = 0;
  for _ in 0..depth {
    offset = offset.checked_mul(fanout)?.checked_add(1)?;
  }
  Some(offset)
}

/// Like [`checked_offset`], reporting overflow as a [`TreeError`].
pub fn offset(depth: usize, dimensions: u32) -> Result<u64> {
  checked_offset(depth, dimensions).ok_or(TreeError::DepthOverflow { depth, dimensions })
}

/// Deepest depth whose offset fits in a `u64`.
pub fn max_depth(dimensions: u32) -> usize {
  if dimensions == 0 {
    return usize::MAX;
  }
  let mut depth = 0;
  while checked_offset(depth + 1, dimensions).is_some() {
    depth += 1;
  }
  depth
}

/// Global index of child `dir` of cell `index`.
#[inline]
pub fn child_index(index: u64, dimensions: u32, dir: u8) -> u64 {
  (index << dimensions) + 1 + dir as u64
}

/// Depth of a global index.
pub fn depth_of(index: u64, dimensions: u32) -> usize {
  let mut depth = 0;
  while let Some(next) = checked_offset(depth + 1, dimensions) {
    if index < next {
      break;
    }
    depth += 1;
  }
  depth
}

#[cfg(test)]
#[path = "index_test.rs"]
mod index_test;
