#![warn(clippy::all)]
//! Algorithms that turn a height-normalized forest point cloud into individual trees.
//!
//! The stages build on each other: voxelization, verticality-guided stem clustering, tree axes and
//! point assignment, tree heights, per-section circle fitting, outlier scoring of the sections and
//! finally the selection of a diameter at breast height together with a tree location. The
//! [pipeline](crate::pipeline) module chains all of them.

// Bounding box of a set of positions.
pub mod bounds;
// Kd-tree backed radius and nearest-neighbour queries over point indices.
pub mod spatial_index;
// Quantization of points into a voxel grid with reversible indexing between points and voxels.
pub mod voxel_grid;
// Structure tensor based local features. Only verticality is needed for stem detection.
pub mod structure_measures;
// Deterministic density clustering and single-linkage clustering.
pub mod clustering;
// Iterative ("peeling") clustering of vertical structures.
pub mod verticality_clustering;
// Principal stem axes and nearest-axis assignment of the whole cloud.
pub mod axes;
// Tree heights from the highest denoised point of every tree.
pub mod heights;
// Least squares circle fitting and its quality checks.
pub mod circle_fit;
// Circle fits for every tree and section, stored as dense matrices.
pub mod sections;
// Outlier probability of section centers based on the tilt between sections.
pub mod tilt;
// Diameter at breast height and tree locations.
pub mod locator;
// Ground models and height normalization.
pub mod normalization;
// Parameter bundle for a complete run.
pub mod parameters;
// Chains all stages into a complete run.
pub mod pipeline;
