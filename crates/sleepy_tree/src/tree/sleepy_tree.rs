//! SleepyTree - the top-level point index.
//!
//! Owns the root bounds, the schema and the registry of storage tiers.
//! Built fresh with [`SleepyTree::new`] or reloaded from a directory with
//! [`SleepyTree::open`]; both end in the same ready state.
//!
//! `insert` takes `&self` and may run on many threads at once. `save` and the
//! queries expect no insert in flight.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::point_info::{MultiResults, PointInfo, StoredPoint};
use super::registry::Registry;
use super::roller::{Roller, DIMENSIONS};
use super::tier::Rejected;
use crate::config::TreeConfig;
use crate::error::{Result, TreeError};
use crate::meta::{MetaDocument, RegistryMeta, TreeMeta, META_FILE};
use crate::persist;
use crate::types::{BBox, Origin, PointBuffer, Schema};

/// Points a storage failure left unplaced, and why.
#[derive(Default)]
struct InsertFailure {
  reason: Option<String>,
  stranded: Vec<StoredPoint>,
}

impl InsertFailure {
  fn error(&self) -> Option<TreeError> {
    self.reason.as_ref().map(|reason| TreeError::InsertFailed {
      stranded: self.stranded.len(),
      reason: reason.clone(),
    })
  }
}

pub struct SleepyTree {
  dir: PathBuf,
  bbox: BBox,
  schema: Arc<Schema>,
  config: TreeConfig,
  registry: Registry,
  num_points: AtomicU64,
  next_origin: AtomicU64,
  /// Set by `insert` on a storage failure; blocks `save` until cleared by
  /// [`SleepyTree::retry_stranded`].
  failure: Mutex<InsertFailure>,
}

impl SleepyTree {
  /// Fresh, empty index working in `dir`.
  pub fn new(dir: impl Into<PathBuf>, bbox: BBox, schema: Schema, config: TreeConfig) -> Result<Self> {
    let dir = dir.into();
    schema.validate()?;
    if !schema.has_xy() {
      return Err(TreeError::Schema("schema must contain X and Y".into()));
    }
    persist::create_dir(&dir)?;

    let schema = Arc::new(schema);
    let registry = Registry::new(Arc::clone(&schema), &config, &dir)?;
    tracing::info!(
      dir = %dir.display(),
      base_depth = config.base_depth,
      flat_depth = config.flat_depth,
      disk_depth = config.disk_depth,
      "created index"
    );
    Ok(Self {
      dir,
      bbox,
      schema,
      config,
      registry,
      num_points: AtomicU64::new(0),
      next_origin: AtomicU64::new(0),
      failure: Mutex::new(InsertFailure::default()),
    })
  }

  /// Reload an index saved in `dir`.
  ///
  /// A document that parses but describes an impossible index (inverted
  /// bounds, a bad schema, inconsistent thresholds) is [`TreeError::Corrupt`].
  #[tracing::instrument(skip_all, fields(dir = %dir.as_ref().display()))]
  pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
    let dir = dir.as_ref().to_path_buf();
    let doc = MetaDocument::read(&dir)?;
    let meta_path = dir.join(META_FILE);
    let corrupt = |err: TreeError| TreeError::corrupt(&meta_path, err.to_string());

    let bbox = BBox::new(doc.bbox.min, doc.bbox.max).map_err(corrupt)?;
    doc.schema.validate().map_err(corrupt)?;
    if !doc.schema.has_xy() {
      return Err(TreeError::corrupt(&meta_path, "schema must contain X and Y"));
    }
    let config = doc.tree.config;
    config.validate(DIMENSIONS).map_err(corrupt)?;
    let schema = Arc::new(doc.schema);
    let registry = Registry::from_meta(Arc::clone(&schema), &config, &dir, &doc.registry)?;

    tracing::info!(num_points = doc.tree.num_points, "opened index");
    Ok(Self {
      dir,
      bbox,
      schema,
      config,
      registry,
      num_points: AtomicU64::new(doc.tree.num_points),
      next_origin: AtomicU64::new(doc.tree.next_origin),
      failure: Mutex::new(InsertFailure::default()),
    })
  }

  /// Insert every point of `batch` that lies inside the root bounds.
  ///
  /// Points outside the bounds, or without X/Y, are skipped; every other
  /// point is counted. If a tier fails, the point it was handed is kept
  /// aside and every later [`save`](Self::save) fails until
  /// [`retry_stranded`](Self::retry_stranded) has placed it.
  pub fn insert(&self, batch: &PointBuffer, origin: Origin) {
    self
      .next_origin
      .fetch_max(origin.saturating_add(1), Ordering::Relaxed);

    let mut accepted = 0u64;
    let mut stranded = Vec::new();
    let mut first_error = None;
    for offset in 0..batch.len() {
      let Some(point) = batch.point(offset) else {
        tracing::trace!(offset, origin, "point without coordinates skipped");
        continue;
      };
      if !self.bbox.contains(point) {
        tracing::trace!(x = point.x, y = point.y, origin, "point outside bounds skipped");
        continue;
      }

      accepted += 1;
      let info = PointInfo::new(point, &self.schema, batch, offset, origin);
      if let Err(Rejected { error, candidate }) = self.registry.put(&info, Roller::new(&self.bbox)) {
        first_error.get_or_insert(error);
        stranded.push(candidate);
      }
    }
    self.num_points.fetch_add(accepted, Ordering::Relaxed);

    if let Some(error) = first_error {
      tracing::warn!(%error, origin, stranded = stranded.len(), "insert failed");
      let mut failure = self.failure.lock();
      failure.reason.get_or_insert_with(|| error.to_string());
      failure.stranded.append(&mut stranded);
    }
  }

  /// Place again the points left aside by failed inserts. When all of them
  /// are stored the failure is cleared and saving works again.
  pub fn retry_stranded(&self) -> Result<()> {
    let mut failure = self.failure.lock();
    let pending = std::mem::take(&mut failure.stranded);
    let mut last_error = None;
    for candidate in pending {
      if let Err(Rejected { error, candidate }) = self.registry.place(candidate, Roller::new(&self.bbox)) {
        failure.stranded.push(candidate);
        last_error = Some(error);
      }
    }

    match last_error {
      Some(error) => {
        failure.reason = Some(error.to_string());
        Err(TreeError::InsertFailed {
          stranded: failure.stranded.len(),
          reason: error.to_string(),
        })
      }
      None => {
        failure.reason = None;
        Ok(())
      }
    }
  }

  /// Points a storage failure left unplaced.
  pub fn stranded_points(&self) -> usize {
    self.failure.lock().stranded.len()
  }

  /// Checkpoint the index into its directory.
  pub fn save(&self) -> Result<()> {
    self.save_to(&self.dir)
  }

  /// Write a complete copy of the index into `dir`.
  ///
  /// Tier files are written first and the metadata document last, so a
  /// failed save never leaves a `meta` describing missing data.
  #[tracing::instrument(skip_all, fields(dir = %dir.as_ref().display()))]
  pub fn save_to(&self, dir: impl AsRef<Path>) -> Result<()> {
    if let Some(err) = self.failure.lock().error() {
      return Err(err);
    }
    let dir = dir.as_ref();
    persist::create_dir(dir)?;

    let mut registry = RegistryMeta::default();
    self.registry.save(dir, &mut registry)?;

    let doc = MetaDocument {
      bbox: self.bbox,
      schema: (*self.schema).clone(),
      tree: TreeMeta {
        config: self.config.clone(),
        num_points: self.num_points(),
        next_origin: self.next_origin(),
      },
      registry,
    };
    doc.write(dir)?;
    tracing::debug!(num_points = doc.tree.num_points, "saved index");
    Ok(())
  }

  /// Stored points with depth in `[depth_begin, depth_end)`.
  pub fn get_points(&self, depth_begin: usize, depth_end: usize) -> Result<MultiResults> {
    let mut results = MultiResults::new();
    self
      .registry
      .get_points(Roller::new(&self.bbox), &mut results, depth_begin, depth_end, None)?;
    Ok(results)
  }

  /// Stored points inside `bbox` with depth in `[depth_begin, depth_end)`.
  pub fn get_points_in(&self, bbox: &BBox, depth_begin: usize, depth_end: usize) -> Result<MultiResults> {
    let mut results = MultiResults::new();
    self.registry.get_points(
      Roller::new(&self.bbox),
      &mut results,
      depth_begin,
      depth_end,
      Some(bbox),
    )?;
    Ok(results)
  }

  pub fn bounds(&self) -> &BBox {
    &self.bbox
  }

  /// Record layout of stored points.
  pub fn point_context(&self) -> &Schema {
    &self.schema
  }

  /// Points inserted inside the bounds over the life of the index,
  /// including before a reload. Points later pushed below the deepest tier
  /// still count.
  pub fn num_points(&self) -> u64 {
    self.num_points.load(Ordering::Relaxed)
  }

  /// Smallest origin not yet used by any insert.
  pub fn next_origin(&self) -> Origin {
    self.next_origin.load(Ordering::Relaxed)
  }

  pub fn dir(&self) -> &Path {
    &self.dir
  }

  pub fn config(&self) -> &TreeConfig {
    &self.config
  }

  pub fn registry(&self) -> &Registry {
    &self.registry
  }
}

#[cfg(test)]
#[path = "sleepy_tree_test.rs"]
mod sleepy_tree_test;
