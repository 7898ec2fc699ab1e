//! Per-point records used while placing and storing points.

use crate::types::{Origin, Point, PointBuffer, Schema};

/// Transient view of one incoming point.
///
/// Borrows the source batch; lives only for a single insertion. The registry
/// copies the record into a [`StoredPoint`] once it decides to keep it.
#[derive(Clone, Copy, Debug)]
pub struct PointInfo<'a> {
  point: Point,
  schema: &'a Schema,
  buffer: &'a PointBuffer,
  offset: usize,
  origin: Origin,
}

impl<'a> PointInfo<'a> {
  /// Wrap record `offset` of `buffer`, whose coordinates are `point`.
  /// `schema` is the layout the record is stored in.
  pub fn new(
    point: Point,
    schema: &'a Schema,
    buffer: &'a PointBuffer,
    offset: usize,
    origin: Origin,
  ) -> Self {
    Self {
      point,
      schema,
      buffer,
      offset,
      origin,
    }
  }

  /// Owned copy of the record in the tree's layout.
  pub fn to_stored(&self) -> StoredPoint {
    StoredPoint {
      point: self.point,
      origin: self.origin,
      data: self.buffer.record_as(self.offset, self.schema).into_boxed_slice(),
    }
  }
}

/// A point held by a storage tier.
#[derive(Clone, Debug, PartialEq)]
pub struct StoredPoint {
  pub point: Point,
  pub origin: Origin,
  /// Full record in the tree schema's layout.
  pub data: Box<[u8]>,
}

/// One query hit.
#[derive(Clone, Debug, PartialEq)]
pub struct ResultPoint {
  /// Global index of the cell holding the point.
  pub index: u64,
  pub depth: usize,
  pub point: Point,
  pub origin: Origin,
  pub data: Box<[u8]>,
}

/// Points collected by a query, in depth-first cell order.
pub type MultiResults = Vec<ResultPoint>;
