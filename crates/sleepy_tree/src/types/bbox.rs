//! Axis-aligned 2-D bounding box with double precision for georeferenced data.

use glam::DVec2;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TreeError};

/// Quadrant of a box split at its midpoint.
///
/// Bits: bit 0 = east half (x >= mid), bit 1 = north half (y >= mid).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Dir {
	Sw = 0,
	Se = 1,
	Nw = 2,
	Ne = 3,
}

impl Dir {
	/// All quadrants in child-index order.
	pub const ALL: [Dir; 4] = [Dir::Sw, Dir::Se, Dir::Nw, Dir::Ne];

	/// Quadrant of `mid` that `point` falls in. Ties go east/north.
	#[inline]
	pub fn of(point: DVec2, mid: DVec2) -> Self {
		let east = (point.x >= mid.x) as u8;
		let north = ((point.y >= mid.y) as u8) << 1;
		Self::ALL[(east | north) as usize]
	}

	#[inline]
	pub fn is_east(self) -> bool {
		(self as u8) & 1 != 0
	}

	#[inline]
	pub fn is_north(self) -> bool {
		(self as u8) & 2 != 0
	}
}

/// Double-precision axis-aligned bounding box.
///
/// Containment and overlap are closed: points on an edge or corner are inside.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BBox {
	/// Minimum corner (inclusive).
	pub min: DVec2,
	/// Maximum corner (inclusive).
	pub max: DVec2,
}

impl BBox {
	/// Create a box from min and max corners.
	///
	/// Fails if min > max on either axis or a coordinate is not finite.
	pub fn new(min: DVec2, max: DVec2) -> Result<Self> {
		if !min.is_finite() || !max.is_finite() {
			return Err(TreeError::InvalidBounds(format!(
				"non-finite corner: min {min}, max {max}"
			)));
		}
		if min.x > max.x || min.y > max.y {
			return Err(TreeError::InvalidBounds(format!(
				"min {min} must be <= max {max} on all axes"
			)));
		}
		Ok(Self { min, max })
	}

	/// Check if this box contains a point (closed on all edges).
	#[inline]
	pub fn contains(&self, point: DVec2) -> bool {
		point.x >= self.min.x && point.x <= self.max.x && point.y >= self.min.y && point.y <= self.max.y
	}

	/// Check if this box overlaps another, boundaries included.
	#[inline]
	pub fn overlaps(&self, other: &BBox) -> bool {
		self.min.x <= other.max.x
			&& self.max.x >= other.min.x
			&& self.min.y <= other.max.y
			&& self.max.y >= other.min.y
	}

	/// Center of the box.
	#[inline]
	pub fn mid(&self) -> DVec2 {
		(self.min + self.max) * 0.5
	}

	#[inline]
	pub fn width(&self) -> f64 {
		self.max.x - self.min.x
	}

	#[inline]
	pub fn height(&self) -> f64 {
		self.max.y - self.min.y
	}

	/// Child box covering one quadrant of this box.
	pub fn quadrant(&self, dir: Dir) -> Self {
		let mid = self.mid();
		let (min_x, max_x) = if dir.is_east() {
			(mid.x, self.max.x)
		} else {
			(self.min.x, mid.x)
		};
		let (min_y, max_y) = if dir.is_north() {
			(mid.y, self.max.y)
		} else {
			(self.min.y, mid.y)
		};
		Self {
			min: DVec2::new(min_x, min_y),
			max: DVec2::new(max_x, max_y),
		}
	}
}
