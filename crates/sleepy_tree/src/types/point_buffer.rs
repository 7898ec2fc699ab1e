//! Batch of raw point records laid out per a [`Schema`].

use std::sync::Arc;

use glam::DVec2;

use super::schema::{Schema, DIM_X, DIM_Y};
use crate::error::{Result, TreeError};

/// Identifier of the ingestion source a point came from.
pub type Origin = u64;

/// 2-D point coordinates.
pub type Point = DVec2;

/// Packed point records sharing one schema.
#[derive(Clone, Debug)]
pub struct PointBuffer {
  schema: Arc<Schema>,
  data: Vec<u8>,
  x_offset: Option<usize>,
  y_offset: Option<usize>,
}

impl PointBuffer {
  pub fn new(schema: Arc<Schema>) -> Self {
    Self::with_capacity(schema, 0)
  }

  /// Create an empty buffer with room for `points` records.
  pub fn with_capacity(schema: Arc<Schema>, points: usize) -> Self {
    let x_offset = schema.offset_of(DIM_X);
    let y_offset = schema.offset_of(DIM_Y);
    let data = Vec::with_capacity(points * schema.point_size());
    Self {
      schema,
      data,
      x_offset,
      y_offset,
    }
  }

  pub fn schema(&self) -> &Arc<Schema> {
    &self.schema
  }

  /// Append one record given one value per field, in schema order.
  pub fn push(&mut self, values: &[f64]) -> Result<()> {
    let dims = self.schema.dims();
    if values.len() != dims.len() {
      return Err(TreeError::Schema(format!(
        "expected {} values per point, got {}",
        dims.len(),
        values.len()
      )));
    }
    let start = self.data.len();
    self.data.resize(start + self.schema.point_size(), 0);
    let mut offset = start;
    for (dim, &value) in dims.iter().zip(values) {
      dim.encode(value, &mut self.data[offset..offset + dim.size]);
      offset += dim.size;
    }
    Ok(())
  }

  /// Append a record already encoded in this buffer's layout.
  pub fn push_record(&mut self, record: &[u8]) -> Result<()> {
    if record.len() != self.schema.point_size() {
      return Err(TreeError::Schema(format!(
        "record is {} bytes, schema needs {}",
        record.len(),
        self.schema.point_size()
      )));
    }
    self.data.extend_from_slice(record);
    Ok(())
  }

  /// Number of records.
  pub fn len(&self) -> usize {
    match self.schema.point_size() {
      0 => 0,
      size => self.data.len() / size,
    }
  }

  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }

  /// Raw bytes of record `index`.
  pub fn record(&self, index: usize) -> &[u8] {
    let size = self.schema.point_size();
    &self.data[index * size..(index + 1) * size]
  }

  /// Field `name` of record `index` converted to f64.
  pub fn field_as_f64(&self, name: &str, index: usize) -> Option<f64> {
    let dim = self.schema.find(name)?;
    let offset = self.schema.offset_of(name)?;
    Some(dim.decode(&self.record(index)[offset..]))
  }

  /// X/Y of record `index`, or `None` if the schema lacks a coordinate.
  pub fn point(&self, index: usize) -> Option<Point> {
    let record = self.record(index);
    let x = self.decode_at(record, self.x_offset?, DIM_X)?;
    let y = self.decode_at(record, self.y_offset?, DIM_Y)?;
    Some(DVec2::new(x, y))
  }

  fn decode_at(&self, record: &[u8], offset: usize, name: &str) -> Option<f64> {
    let dim = self.schema.find(name)?;
    Some(dim.decode(&record[offset..]))
  }

  /// Record `index` re-encoded into `target`'s layout, matching fields by
  /// name. Fields missing from this buffer are zero.
  pub fn record_as(&self, index: usize, target: &Schema) -> Vec<u8> {
    if *self.schema == *target {
      return self.record(index).to_vec();
    }
    let mut out = vec![0u8; target.point_size()];
    let mut offset = 0;
    for dim in target.dims() {
      let value = self.field_as_f64(&dim.name, index).unwrap_or(0.0);
      dim.encode(value, &mut out[offset..offset + dim.size]);
      offset += dim.size;
    }
    out
  }
}
