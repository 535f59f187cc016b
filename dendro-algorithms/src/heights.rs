use dendro_core::nalgebra::Vector3;
use log::warn;

use crate::axes::{AxisAssignment, TreeAxis};
use crate::clustering::{cluster_sizes, dbscan};
use crate::voxel_grid::voxelate;

/// Coarse clusters with at most this many voxels are treated as noise
const MAX_NOISE_CLUSTER_VOXELS: usize = 3;

/// Parameters of [estimate_heights]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeightParams {
    /// Only points closer than this to their axis can define the height of a tree
    pub max_axis_distance: f64,
    /// Trees whose axis is tilted more than this (in degrees) are not trusted
    pub max_tilt_degrees: f64,
    /// Resolution of the coarse voxel grid used for denoising
    pub resolution: f64,
    /// Coarse voxels closer than this are linked into the same cluster
    pub linking_distance: f64,
    pub n_digits: u32,
}

/// Height of one tree
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TreeHeight {
    /// Highest point that was retained for the tree, `None` if no point was retained
    pub top: Option<Vector3<f64>>,
    /// Height above ground of `top`, `None` if the height is unknown
    pub height: Option<f64>,
    /// `true` if the axis of the tree is close enough to vertical for the height to be reliable
    pub trusted: bool,
}

/// Estimates the height of every tree in `axes` from the highest of its points.
///
/// `voxel_positions` and `assignments` describe the voxelized cloud and the tree assignment of every voxel.
/// The voxels are grouped into a coarse grid whose cells are density clustered; voxels in noise or in
/// clusters of at most three coarse cells are ignored, as are voxels farther than
/// `max_axis_distance` from their axis. A tree without any remaining voxel gets an unknown height.
pub fn estimate_heights(
    voxel_positions: &[Vector3<f64>],
    axes: &[TreeAxis],
    assignments: &[Option<AxisAssignment>],
    params: &HeightParams,
) -> Vec<TreeHeight> {
    let coarse = voxelate(
        voxel_positions,
        params.resolution,
        params.resolution,
        params.n_digits,
    );
    let coarse_labels = dbscan(&coarse.centroids, params.linking_distance, 2);
    let coarse_sizes = cluster_sizes(&coarse_labels);

    let mut tops: Vec<Option<Vector3<f64>>> = vec![None; axes.len()];
    for (voxel, position) in voxel_positions.iter().enumerate() {
        let assignment = match assignments[voxel] {
            Some(assignment) if assignment.distance < params.max_axis_distance => assignment,
            _ => continue,
        };
        let in_large_cluster = coarse_labels[coarse.voxel_of_point[voxel]]
            .map(|label| coarse_sizes[label] > MAX_NOISE_CLUSTER_VOXELS)
            .unwrap_or(false);
        if !in_large_cluster {
            continue;
        }
        let top = &mut tops[assignment.tree];
        if top.map(|t| position.z > t.z).unwrap_or(true) {
            *top = Some(*position);
        }
    }

    axes.iter()
        .zip(tops)
        .map(|(axis, top)| {
            if top.is_none() {
                warn!("No points left to estimate the height of tree {}", axis.tree_id);
            }
            TreeHeight {
                top,
                height: top.map(|t| t.z - axis.height_offset),
                trusted: axis.tilt_degrees() <= params.max_tilt_degrees,
            }
        })
        .collect()
}
