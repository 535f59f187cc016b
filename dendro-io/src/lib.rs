#![warn(clippy::all)]
//! Reading and writing of height-normalized point clouds and export of inventory results.
//!
//! Point clouds are exchanged as delimited ASCII files whose columns are described by a format string,
//! see [ascii::AsciiReader]. The results of a run are written as plain text matrices by the
//! [tabular] module.

// Delimited ASCII point clouds.
pub mod ascii;
// Text export of the per-tree and per-section results.
pub mod tabular;
