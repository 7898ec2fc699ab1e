//! sleepy - build, inspect and query point indexes.
//!
//! - `sleepy build -c build.toml`: ingest CSV files into a new or existing index
//! - `sleepy info <DIR>`: print bounds, schema, tiers and point count
//! - `sleepy query <DIR>`: dump stored points as CSV

mod config;
mod ingest;

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use glam::DVec2;
use sleepy_tree::tree::Tier;
use sleepy_tree::{BBox, SleepyTree, META_FILE};
use tracing_subscriber::EnvFilter;

use config::BuildConfig;

/// Persistent point-cloud index tool.
#[derive(Parser, Debug)]
#[command(name = "sleepy", version)]
#[command(about = "Builds and queries out-of-core point-cloud indexes")]
struct Args {
	/// Enable verbose logging
	#[arg(short = 'v', long, global = true)]
	verbose: bool,

	/// Log level (error, warn, info, debug, trace)
	#[arg(long, default_value = "info", env = "SLEEPY_LOG_LEVEL", global = true)]
	log_level: String,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Ingest the inputs listed in a build config.
	Build {
		/// Path to configuration TOML file.
		#[arg(short, long)]
		config: PathBuf,

		/// Add to an existing index in the output directory instead of
		/// starting over.
		#[arg(long)]
		resume: bool,
	},
	/// Print a summary of an index.
	Info {
		/// Index directory.
		dir: PathBuf,
	},
	/// Write stored points as CSV to stdout.
	Query {
		/// Index directory.
		dir: PathBuf,

		/// First depth to include.
		#[arg(long, default_value_t = 0)]
		depth_begin: usize,

		/// Depth to stop before (default: every stored depth).
		#[arg(long)]
		depth_end: Option<usize>,

		/// Query window as min_x,min_y,max_x,max_y.
		#[arg(long, value_delimiter = ',', num_args = 4)]
		bbox: Option<Vec<f64>>,
	},
}

fn main() -> Result<()> {
	let args = Args::parse();
	init_logging(&args);

	match args.command {
		Command::Build { config, resume } => build(&config, resume),
		Command::Info { dir } => info(&dir),
		Command::Query {
			dir,
			depth_begin,
			depth_end,
			bbox,
		} => query(&dir, depth_begin, depth_end, bbox),
	}
}

fn init_logging(args: &Args) {
	let level = if args.verbose {
		"debug"
	} else {
		args.log_level.as_str()
	};

	let filter = EnvFilter::try_new(format!("sleepy={level},sleepy_tree={level}"))
		.unwrap_or_else(|_| EnvFilter::new("info"));

	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_target(true)
		.with_writer(std::io::stderr)
		.init();
}

fn build(config_path: &std::path::Path, resume: bool) -> Result<()> {
	let config = BuildConfig::load(config_path)?;
	tracing::info!(config = %config_path.display(), output = %config.output.display(), "loaded build config");

	let tree = if resume && config.output.join(META_FILE).exists() {
		let tree = SleepyTree::open(&config.output)
			.with_context(|| format!("Failed to open index: {}", config.output.display()))?;
		if *tree.point_context() != config.schema {
			anyhow::bail!("Existing index schema differs from the config schema");
		}
		tree
	} else {
		SleepyTree::new(
			&config.output,
			config.bounds,
			config.schema.clone(),
			config.tree_config(),
		)
		.with_context(|| format!("Failed to create index: {}", config.output.display()))?
	};

	let pool = rayon::ThreadPoolBuilder::new()
		.num_threads(config.threads)
		.build()
		.context("Failed to build worker pool")?;

	let first_origin = tree.next_origin();
	let stats = ingest::ingest(&tree, &config.inputs, first_origin, config.batch_size, &pool)?;
	if tree.stranded_points() > 0 {
		tree.retry_stranded().context("Failed to place points after a storage error")?;
	}
	tree.save().context("Failed to save index")?;

	tracing::info!(
		files = stats.files,
		first_origin,
		batches = stats.batches,
		read = stats.points_read,
		indexed = tree.num_points(),
		elapsed_ms = stats.elapsed_ms as u64,
		"build finished"
	);
	println!(
		"Indexed {} of {} points from {} files in {} ms",
		tree.num_points(),
		stats.points_read,
		stats.files,
		stats.elapsed_ms
	);
	Ok(())
}

fn info(dir: &std::path::Path) -> Result<()> {
	let tree = SleepyTree::open(dir).with_context(|| format!("Failed to open index: {}", dir.display()))?;
	let bounds = tree.bounds();
	let config = tree.config();

	println!("Index: {}", tree.dir().display());
	println!(
		"Bounds: [{}, {}] - [{}, {}]",
		bounds.min.x, bounds.min.y, bounds.max.x, bounds.max.y
	);
	println!("Points: {}", tree.num_points());
	println!(
		"Depths: base {} / flat {} / disk {} (chunk {} points, cache {} chunks)",
		config.base_depth, config.flat_depth, config.disk_depth, config.chunk_points, config.disk_cache_chunks
	);
	println!("Schema ({} bytes per point):", tree.point_context().point_size());
	for dim in tree.point_context().dims() {
		println!("  {:<16} {:?} x{}", dim.name, dim.kind, dim.size);
	}
	println!("Tiers:");
	for branch in tree.registry().branches() {
		let chunks = match branch.tier() {
			Tier::Flat(flat) => format!("{} points", flat.num_points()),
			Tier::Cold(cold) => format!("{} chunks", cold.num_chunks()),
			Tier::Disk(disk) => format!("{} chunks", disk.num_chunks()),
		};
		println!(
			"  {:?}: depths {}..{} indices {}..{} ({})",
			branch.kind(),
			branch.depth_begin(),
			branch.depth_end(),
			branch.index_begin(),
			branch.index_end(),
			chunks
		);
	}
	Ok(())
}

fn query(dir: &std::path::Path, depth_begin: usize, depth_end: Option<usize>, bbox: Option<Vec<f64>>) -> Result<()> {
	let tree = SleepyTree::open(dir).with_context(|| format!("Failed to open index: {}", dir.display()))?;
	let depth_end = depth_end.unwrap_or(tree.config().disk_depth);

	let hits = match bbox.as_deref() {
		Some(&[min_x, min_y, max_x, max_y]) => {
			let window = BBox::new(DVec2::new(min_x, min_y), DVec2::new(max_x, max_y)).context("Invalid query bbox")?;
			tree.get_points_in(&window, depth_begin, depth_end)?
		}
		Some(other) => anyhow::bail!("--bbox needs 4 values, got {}", other.len()),
		None => tree.get_points(depth_begin, depth_end)?,
	};
	tracing::debug!(hits = hits.len(), depth_begin, depth_end, "query finished");

	let mut out = std::io::BufWriter::new(std::io::stdout().lock());
	writeln!(out, "index,depth,x,y,origin")?;
	for hit in &hits {
		writeln!(
			out,
			"{},{},{},{},{}",
			hit.index, hit.depth, hit.point.x, hit.point.y, hit.origin
		)?;
	}
	out.flush()?;
	Ok(())
}
