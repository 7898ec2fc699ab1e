//! File helpers shared by the metadata writer and the storage tiers.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::error::{Result, TreeError};

/// Write `bytes` to `path` atomically: write a sibling temp file, sync,
/// rename, then sync the parent directory so the rename is durable.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
  let tmp_path = tmp_path_for(path);

  let mut file = OpenOptions::new()
    .write(true)
    .create(true)
    .truncate(true)
    .open(&tmp_path)
    .map_err(|e| TreeError::io(&tmp_path, e))?;
  file
    .write_all(bytes)
    .and_then(|_| file.sync_all())
    .map_err(|e| TreeError::io(&tmp_path, e))?;
  drop(file);

  fs::rename(&tmp_path, path).map_err(|e| TreeError::io(path, e))?;

  // Directories cannot be opened for syncing on every platform.
  if let Some(parent) = path.parent() {
    if let Ok(dir) = File::open(parent) {
      let _ = dir.sync_all();
    }
  }
  Ok(())
}

/// Read a whole file.
pub(crate) fn read_all(path: &Path) -> Result<Vec<u8>> {
  let mut file = File::open(path).map_err(|e| TreeError::io(path, e))?;
  let mut bytes = Vec::new();
  file
    .read_to_end(&mut bytes)
    .map_err(|e| TreeError::io(path, e))?;
  Ok(bytes)
}

pub(crate) fn create_dir(path: &Path) -> Result<()> {
  fs::create_dir_all(path).map_err(|e| TreeError::io(path, e))
}

/// Copy `from` to `to` unless they are the same file.
pub(crate) fn copy_if_elsewhere(from: &Path, to: &Path) -> Result<()> {
  if from == to {
    return Ok(());
  }
  fs::copy(from, to).map_err(|e| TreeError::io(from, e))?;
  Ok(())
}

fn tmp_path_for(path: &Path) -> PathBuf {
  let mut name = path.file_name().unwrap_or_default().to_os_string();
  name.push(".tmp");
  path.with_file_name(name)
}
