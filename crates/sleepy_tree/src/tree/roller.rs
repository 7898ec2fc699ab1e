//! Roller - cursor over the implicit quadtree.
//!
//! A roller starts at the root cell and descends one level at a time, either
//! toward a point (`magnify`) or into a chosen quadrant (`child`). It tracks
//! the global index, depth and bounds of the cell it sits on.

use super::index::child_index;
use crate::types::{BBox, Dir, Point};

/// Branching exponent of the point tree (quadtree).
pub const DIMENSIONS: u32 = 2;

/// Cursor positioned on one cell of the implicit tree.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Roller {
  bbox: BBox,
  index: u64,
  depth: usize,
}

impl Roller {
  /// Cursor on the root cell covering `bbox`.
  pub fn new(bbox: &BBox) -> Self {
    Self {
      bbox: *bbox,
      index: 0,
      depth: 0,
    }
  }

  /// Descend into the child cell containing `point`.
  #[inline]
  pub fn magnify(&mut self, point: Point) {
    let dir = Dir::of(point, self.bbox.mid());
    *self = self.child(dir);
  }

  /// Cursor on child `dir` of this cell.
  #[inline]
  pub fn child(&self, dir: Dir) -> Self {
    Self {
      bbox: self.bbox.quadrant(dir),
      index: child_index(self.index, DIMENSIONS, dir as u8),
      depth: self.depth + 1,
    }
  }

  /// Global index of the current cell.
  #[inline]
  pub fn index(&self) -> u64 {
    self.index
  }

  /// Depth of the current cell (root = 0).
  #[inline]
  pub fn depth(&self) -> usize {
    self.depth
  }

  /// Bounds of the current cell.
  #[inline]
  pub fn bbox(&self) -> &BBox {
    &self.bbox
  }
}
