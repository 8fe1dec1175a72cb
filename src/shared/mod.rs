//! Value types shared across the window manager

pub mod geometry;

pub use geometry::{Direction, Geometry, Point, Size};
