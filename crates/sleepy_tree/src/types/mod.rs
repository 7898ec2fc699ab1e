//! Value types shared by the index: bounds, record layout, point batches.

pub mod bbox;
pub mod point_buffer;
pub mod schema;

pub use bbox::{BBox, Dir};
pub use point_buffer::{Origin, Point, PointBuffer};
pub use schema::{DimInfo, DimKind, Schema, DIM_X, DIM_Y};
