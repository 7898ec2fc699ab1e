//! Build configuration for `sleepy build`.
//!
//! ```toml
//! output = "index"
//! inputs = ["tiles/a.csv", "tiles/b.csv"]
//! bounds = { min = [0.0, 0.0], max = [1000.0, 1000.0] }
//! base_depth = 6
//! flat_depth = 10
//! disk_depth = 20
//!
//! [[schema.dims]]
//! name = "X"
//! type = "floating"
//! size = 8
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use sleepy_tree::{BBox, Schema, TreeConfig};

/// Root configuration for building an index.
#[derive(Debug, Deserialize)]
pub struct BuildConfig {
	/// Index directory, relative to the config file.
	pub output: PathBuf,
	/// CSV files with a header row; file `i` is ingested as origin `i`.
	pub inputs: Vec<PathBuf>,
	/// Root bounds of the index.
	pub bounds: BBox,
	/// Stored record layout (default: X, Y, Z as doubles).
	#[serde(default = "Schema::xyz")]
	pub schema: Schema,
	pub base_depth: usize,
	pub flat_depth: usize,
	pub disk_depth: usize,
	pub chunk_points: Option<u64>,
	pub disk_cache_chunks: Option<usize>,
	/// Points per batch handed to a worker.
	#[serde(default = "default_batch_size")]
	pub batch_size: usize,
	/// Worker threads, 0 for one per core.
	#[serde(default)]
	pub threads: usize,
}

fn default_batch_size() -> usize {
	16_384
}

impl BuildConfig {
	/// Load configuration from a TOML file. Relative paths are resolved
	/// against the file's directory.
	pub fn load(path: &Path) -> Result<Self> {
		let content = std::fs::read_to_string(path)
			.with_context(|| format!("Failed to read config file: {}", path.display()))?;
		let mut config: BuildConfig =
			toml::from_str(&content).with_context(|| "Failed to parse config TOML")?;

		let base = path.parent().unwrap_or(Path::new("."));
		config.output = base.join(&config.output);
		for input in &mut config.inputs {
			*input = base.join(&*input);
		}

		config.validate()?;
		Ok(config)
	}

	fn validate(&self) -> Result<()> {
		if self.inputs.is_empty() {
			anyhow::bail!("Config must list at least one input file");
		}
		if self.batch_size == 0 {
			anyhow::bail!("batch_size must be at least 1");
		}
		BBox::new(self.bounds.min, self.bounds.max).context("Invalid bounds")?;
		self.schema.validate().context("Invalid schema")?;
		if !self.schema.has_xy() {
			anyhow::bail!("Schema must contain X and Y dimensions");
		}
		self
			.tree_config()
			.validate(sleepy_tree::tree::DIMENSIONS)
			.context("Invalid depth thresholds")?;
		Ok(())
	}

	/// Tree settings with unset storage options at their defaults.
	pub fn tree_config(&self) -> TreeConfig {
		let mut config = TreeConfig::new(self.base_depth, self.flat_depth, self.disk_depth);
		if let Some(chunk_points) = self.chunk_points {
			config = config.with_chunk_points(chunk_points);
		}
		if let Some(chunks) = self.disk_cache_chunks {
			config = config.with_disk_cache_chunks(chunks);
		}
		config
	}
}
