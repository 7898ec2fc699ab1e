//! Parallel ingestion of CSV point files.
//!
//! ```text
//! reader thread                 rayon pool
//! ┌──────────────┐  bounded   ┌─────────────────────┐
//! │ parse file i │──────────▶ │ tree.insert(batch,i)│ x N
//! │ into batches │  channel   └─────────────────────┘
//! └──────────────┘
//! ```
//!
//! The bounded channel keeps at most a few batches in flight, so memory use
//! does not depend on input size.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use crossbeam_channel::{self as channel, Sender};
use rayon::prelude::*;
use sleepy_tree::{Origin, PointBuffer, Schema, SleepyTree};
use web_time::Instant;

/// Totals from one ingestion run.
#[derive(Debug, Clone, Copy, Default)]
pub struct IngestStats {
	pub files: usize,
	pub batches: usize,
	pub points_read: usize,
	pub elapsed_ms: u128,
}

/// Read every input and insert it into `tree`, one origin per file counting
/// up from `first_origin`.
pub fn ingest(
	tree: &SleepyTree,
	inputs: &[PathBuf],
	first_origin: Origin,
	batch_size: usize,
	pool: &rayon::ThreadPool,
) -> Result<IngestStats> {
	let start = Instant::now();
	let schema = Arc::new(tree.point_context().clone());
	let (sender, receiver) = channel::bounded::<(Origin, PointBuffer)>(pool.current_num_threads() * 2);
	let batches = AtomicUsize::new(0);

	let points_read = std::thread::scope(|scope| {
		let reader = scope.spawn(move || read_inputs(inputs, first_origin, &schema, batch_size, &sender));

		pool.install(|| {
			receiver.into_iter().par_bridge().for_each(|(origin, batch)| {
				tree.insert(&batch, origin);
				batches.fetch_add(1, Ordering::Relaxed);
			})
		});

		reader
			.join()
			.map_err(|_| anyhow::anyhow!("Input reader thread panicked"))?
	})?;

	Ok(IngestStats {
		files: inputs.len(),
		batches: batches.into_inner(),
		points_read,
		elapsed_ms: start.elapsed().as_millis(),
	})
}

/// Parse all inputs in order, sending batches until done or a read fails.
fn read_inputs(
	inputs: &[PathBuf],
	first_origin: Origin,
	schema: &Arc<Schema>,
	batch_size: usize,
	sender: &Sender<(Origin, PointBuffer)>,
) -> Result<usize> {
	let mut total = 0;
	for (origin, path) in (first_origin..).zip(inputs) {
		let read = read_file(path, origin, schema, batch_size, sender)
			.with_context(|| format!("Failed to read input: {}", path.display()))?;
		tracing::info!(path = %path.display(), origin, points = read, "read input");
		total += read;
	}
	Ok(total)
}

fn read_file(
	path: &Path,
	origin: Origin,
	schema: &Arc<Schema>,
	batch_size: usize,
	sender: &Sender<(Origin, PointBuffer)>,
) -> Result<usize> {
	let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_path(path)?;
	let columns = column_map(reader.headers()?, schema);

	let mut batch = PointBuffer::with_capacity(Arc::clone(schema), batch_size);
	let mut values = vec![0.0; schema.dims().len()];
	let mut count = 0;

	for (line, record) in reader.records().enumerate() {
		let record = record?;
		for (value, column) in values.iter_mut().zip(&columns) {
			*value = match column.and_then(|c| record.get(c)) {
				Some(field) => field
					.parse()
					.with_context(|| format!("Bad number {field:?} on data row {}", line + 1))?,
				None => 0.0,
			};
		}
		batch.push(&values)?;
		count += 1;

		if batch.len() == batch_size {
			let full = std::mem::replace(&mut batch, PointBuffer::with_capacity(Arc::clone(schema), batch_size));
			if sender.send((origin, full)).is_err() {
				anyhow::bail!("Ingestion workers stopped early");
			}
		}
	}
	if !batch.is_empty() && sender.send((origin, batch)).is_err() {
		anyhow::bail!("Ingestion workers stopped early");
	}
	Ok(count)
}

/// CSV column holding each schema dimension, matched by header name.
fn column_map(headers: &csv::StringRecord, schema: &Schema) -> Vec<Option<usize>> {
	schema
		.dims()
		.iter()
		.map(|dim| headers.iter().position(|h| h.eq_ignore_ascii_case(&dim.name)))
		.collect()
}
