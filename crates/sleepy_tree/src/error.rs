//! Error types for the point index.

use std::path::PathBuf;

use thiserror::Error;

/// Point index errors.
#[derive(Error, Debug)]
pub enum TreeError {
  /// A file or directory could not be opened, read, or written.
  #[error("IO error on {}: {source}", path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  /// The metadata document is not valid JSON or is missing expected keys.
  #[error("failed to parse {}: {source}", path.display())]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  /// A persisted file parses but describes an impossible index, such as a
  /// tier file with a bad header or metadata with inverted bounds.
  #[error("corrupt data in {}: {reason}", path.display())]
  Corrupt { path: PathBuf, reason: String },

  /// Branch depth range with its end before its begin.
  #[error("invalid depth range: begin {begin} is after end {end}")]
  InvalidDepthRange { begin: usize, end: usize },

  /// The global offset of a depth does not fit in 64 bits.
  #[error("depth {depth} overflows the global index space for {dimensions} dimensions")]
  DepthOverflow { depth: usize, dimensions: u32 },

  /// Bounding box with min greater than max on some axis.
  #[error("invalid bounds: {0}")]
  InvalidBounds(String),

  /// Schema is malformed or a point buffer does not match it.
  #[error("schema error: {0}")]
  Schema(String),

  /// An earlier insert hit a storage failure and left points unplaced.
  #[error("insert failed with {stranded} points left unplaced: {reason}")]
  InsertFailed { stranded: usize, reason: String },

  /// Depth thresholds or storage settings are inconsistent.
  #[error("configuration error: {0}")]
  InvalidConfig(String),
}

impl TreeError {
  pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
    Self::Io {
      path: path.into(),
      source,
    }
  }

  pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
    Self::Corrupt {
      path: path.into(),
      reason: reason.into(),
    }
  }
}

/// Result type for point index operations.
pub type Result<T> = std::result::Result<T, TreeError>;
