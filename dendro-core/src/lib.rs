#![warn(clippy::all)]

//! Core data structures for working with forest point clouds
//!
//! `dendro-core` holds the in-memory representation of a height-normalized point cloud
//! ([PointCloud](crate::containers::PointCloud)) together with the small amount of math that
//! every processing stage needs: axis-aligned bounds and robust statistics.

pub extern crate nalgebra;

/// Point cloud containers
pub mod containers;
/// Useful mathematical tools when working with point cloud data
pub mod math;
