//! Point record layout.
//!
//! A schema is an ordered list of named fields. Records are packed
//! little-endian in field order with no padding.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TreeError};

/// Name of the X coordinate field.
pub const DIM_X: &str = "X";
/// Name of the Y coordinate field.
pub const DIM_Y: &str = "Y";

/// Storage class of a field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DimKind {
  Signed,
  Unsigned,
  Floating,
}

/// One field of a point record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimInfo {
  pub name: String,
  #[serde(rename = "type")]
  pub kind: DimKind,
  /// Width in bytes.
  pub size: usize,
}

impl DimInfo {
  pub fn new(name: impl Into<String>, kind: DimKind, size: usize) -> Self {
    Self {
      name: name.into(),
      kind,
      size,
    }
  }

  pub fn floating(name: impl Into<String>) -> Self {
    Self::new(name, DimKind::Floating, 8)
  }

  fn is_valid_size(&self) -> bool {
    match self.kind {
      DimKind::Floating => matches!(self.size, 4 | 8),
      DimKind::Signed | DimKind::Unsigned => matches!(self.size, 1 | 2 | 4 | 8),
    }
  }

  /// Decode this field from the start of `bytes`.
  pub fn decode(&self, bytes: &[u8]) -> f64 {
    macro_rules! le {
      ($t:ty, $n:expr) => {{
        let mut raw = [0u8; $n];
        raw.copy_from_slice(&bytes[..$n]);
        <$t>::from_le_bytes(raw) as f64
      }};
    }
    match (self.kind, self.size) {
      (DimKind::Floating, 4) => le!(f32, 4),
      (DimKind::Floating, _) => le!(f64, 8),
      (DimKind::Signed, 1) => le!(i8, 1),
      (DimKind::Signed, 2) => le!(i16, 2),
      (DimKind::Signed, 4) => le!(i32, 4),
      (DimKind::Signed, _) => le!(i64, 8),
      (DimKind::Unsigned, 1) => le!(u8, 1),
      (DimKind::Unsigned, 2) => le!(u16, 2),
      (DimKind::Unsigned, 4) => le!(u32, 4),
      (DimKind::Unsigned, _) => le!(u64, 8),
    }
  }

  /// Encode `value` into the start of `out`. Integers saturate.
  pub fn encode(&self, value: f64, out: &mut [u8]) {
    match (self.kind, self.size) {
      (DimKind::Floating, 4) => out[..4].copy_from_slice(&(value as f32).to_le_bytes()),
      (DimKind::Floating, _) => out[..8].copy_from_slice(&value.to_le_bytes()),
      (DimKind::Signed, 1) => out[..1].copy_from_slice(&(value as i8).to_le_bytes()),
      (DimKind::Signed, 2) => out[..2].copy_from_slice(&(value as i16).to_le_bytes()),
      (DimKind::Signed, 4) => out[..4].copy_from_slice(&(value as i32).to_le_bytes()),
      (DimKind::Signed, _) => out[..8].copy_from_slice(&(value as i64).to_le_bytes()),
      (DimKind::Unsigned, 1) => out[..1].copy_from_slice(&(value as u8).to_le_bytes()),
      (DimKind::Unsigned, 2) => out[..2].copy_from_slice(&(value as u16).to_le_bytes()),
      (DimKind::Unsigned, 4) => out[..4].copy_from_slice(&(value as u32).to_le_bytes()),
      (DimKind::Unsigned, _) => out[..8].copy_from_slice(&(value as u64).to_le_bytes()),
    }
  }
}

/// Ordered field layout of a point record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
  dims: Vec<DimInfo>,
}

impl Schema {
  /// Create a schema, validating field widths and name uniqueness.
  pub fn new(dims: Vec<DimInfo>) -> Result<Self> {
    let schema = Self { dims };
    schema.validate()?;
    Ok(schema)
  }

  /// X, Y and Z as 8-byte floats.
  pub fn xyz() -> Self {
    Self {
      dims: vec![
        DimInfo::floating(DIM_X),
        DimInfo::floating(DIM_Y),
        DimInfo::floating("Z"),
      ],
    }
  }

  /// Re-check a schema that bypassed `new`, e.g. one read from disk.
  pub fn validate(&self) -> Result<()> {
    if self.dims.is_empty() {
      return Err(TreeError::Schema("schema has no dimensions".into()));
    }
    for (i, dim) in self.dims.iter().enumerate() {
      if !dim.is_valid_size() {
        return Err(TreeError::Schema(format!(
          "dimension {} has invalid size {} for {:?}",
          dim.name, dim.size, dim.kind
        )));
      }
      if self.dims[..i].iter().any(|d| d.name == dim.name) {
        return Err(TreeError::Schema(format!(
          "duplicate dimension {}",
          dim.name
        )));
      }
    }
    Ok(())
  }

  pub fn dims(&self) -> &[DimInfo] {
    &self.dims
  }

  /// Bytes per point record.
  pub fn point_size(&self) -> usize {
    self.dims.iter().map(|d| d.size).sum()
  }

  /// Field with the given name.
  pub fn find(&self, name: &str) -> Option<&DimInfo> {
    self.dims.iter().find(|d| d.name == name)
  }

  /// Byte offset of a field within a record.
  pub fn offset_of(&self, name: &str) -> Option<usize> {
    let mut offset = 0;
    for dim in &self.dims {
      if dim.name == name {
        return Some(offset);
      }
      offset += dim.size;
    }
    None
  }

  /// Whether both coordinate fields are present.
  pub fn has_xy(&self) -> bool {
    self.find(DIM_X).is_some() && self.find(DIM_Y).is_some()
  }
}

#[cfg(test)]
#[path = "schema_test.rs"]
mod schema_test;
