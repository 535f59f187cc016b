use dendro_core::nalgebra::{Unit, Vector3};
use log::debug;
use rayon::prelude::*;

use crate::structure_measures::StructureTensor;
use crate::verticality_clustering::ClusteredPoints;

/// The axis of one tree: a 3D line through the centroid of the tree's stem points along their first
/// principal component.
///
/// The direction always points upwards (non-negative z), so consumers never have to resolve the
/// arbitrary sign of the principal component themselves.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TreeAxis {
    /// Label of the stem cluster this tree was built from
    pub tree_id: usize,
    direction: Unit<Vector3<f64>>,
    /// Centroid of the stem points
    pub centroid: Vector3<f64>,
    /// Mean elevation minus mean normalized height of the stem points. Adding it to a normalized height
    /// gives an elevation
    pub height_offset: f64,
}

impl TreeAxis {
    /// Creates a new axis. Returns `None` if `direction` has no length
    pub fn new(
        tree_id: usize,
        direction: Vector3<f64>,
        centroid: Vector3<f64>,
        height_offset: f64,
    ) -> Option<Self> {
        let upward = if direction.z < 0.0 {
            -direction
        } else {
            direction
        };
        Some(Self {
            tree_id,
            direction: Unit::try_new(upward, f64::EPSILON)?,
            centroid,
            height_offset,
        })
    }

    /// Unit direction of the axis, with a non-negative z component
    pub fn direction(&self) -> &Vector3<f64> {
        self.direction.as_ref()
    }

    /// Angle between the axis and the vertical in degrees
    pub fn tilt_degrees(&self) -> f64 {
        self.direction.xy().norm().atan2(self.direction.z).to_degrees()
    }

    /// Perpendicular distance of `position` to the axis
    pub fn distance_to(&self, position: &Vector3<f64>) -> f64 {
        let offset = position - self.centroid;
        let direction = self.direction.as_ref();
        (offset - direction * offset.dot(direction)).norm()
    }

    /// Point on the axis at the given elevation. For a horizontal axis the centroid is moved to that
    /// elevation instead
    pub fn point_at_elevation(&self, elevation: f64) -> Vector3<f64> {
        if self.direction.z <= f64::EPSILON {
            return Vector3::new(self.centroid.x, self.centroid.y, elevation);
        }
        let t = (elevation - self.centroid.z) / self.direction.z;
        self.centroid + self.direction.as_ref() * t
    }

    /// Point on the axis at the given normalized height (height above ground)
    pub fn point_at_normalized_height(&self, normalized_height: f64) -> Vector3<f64> {
        self.point_at_elevation(normalized_height + self.height_offset)
    }
}

/// Assignment of one position to its closest tree axis
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisAssignment {
    /// Index of the tree in the axes that were assigned against
    pub tree: usize,
    /// Distance of the position to the axis of `tree`
    pub distance: f64,
}

/// Builds one [TreeAxis] for every stem cluster in `stems` that has more than `min_points` points and
/// spans more than `height_range` vertically. Axes are ordered by ascending cluster label
pub fn compute_axes(stems: &ClusteredPoints, min_points: usize, height_range: f64) -> Vec<TreeAxis> {
    let mut members = vec![vec![]; stems.num_clusters()];
    for (index, &label) in stems.labels.iter().enumerate() {
        members[label].push(index);
    }

    let axes = members
        .par_iter()
        .enumerate()
        .filter(|(_, members)| members.len() > min_points)
        .filter_map(|(label, members)| {
            let positions = members
                .iter()
                .map(|&m| *stems.cloud.position(m))
                .collect::<Vec<_>>();
            let (min_z, max_z) = positions
                .iter()
                .fold((f64::MAX, f64::MIN), |(lo, hi), p| (lo.min(p.z), hi.max(p.z)));
            if max_z - min_z <= height_range {
                return None;
            }
            let tensor = StructureTensor::from_points(&positions)?;
            let mean_z0 = members
                .iter()
                .map(|&m| stems.cloud.normalized_height(m))
                .sum::<f64>()
                / members.len() as f64;
            TreeAxis::new(
                label,
                tensor.principal_direction(),
                tensor.centroid,
                tensor.centroid.z - mean_z0,
            )
        })
        .collect::<Vec<_>>();
    debug!(
        "{} of {} stem clusters qualified as trees",
        axes.len(),
        members.len()
    );
    axes
}

/// Assigns every position to the closest axis whose distance is below `max_distance`. On equal distances
/// the axis that comes first in `axes` wins. Positions without such an axis get `None`
pub fn assign_to_axes(
    positions: &[Vector3<f64>],
    axes: &[TreeAxis],
    max_distance: f64,
) -> Vec<Option<AxisAssignment>> {
    positions
        .par_iter()
        .map(|position| {
            let mut best: Option<AxisAssignment> = None;
            for (tree, axis) in axes.iter().enumerate() {
                let distance = axis.distance_to(position);
                let closer = match best {
                    Some(assignment) => distance < assignment.distance,
                    None => true,
                };
                if distance < max_distance && closer {
                    best = Some(AxisAssignment { tree, distance });
                }
            }
            best
        })
        .collect()
}

/// Computes the tree axes from `stems` (see [compute_axes]) and assigns every position of
/// `voxel_positions` to its closest axis (see [assign_to_axes])
pub fn build_axes(
    voxel_positions: &[Vector3<f64>],
    stems: &ClusteredPoints,
    min_points: usize,
    height_range: f64,
    max_axis_distance: f64,
) -> (Vec<TreeAxis>, Vec<Option<AxisAssignment>>) {
    let axes = compute_axes(stems, min_points, height_range);
    let assignments = assign_to_axes(voxel_positions, &axes, max_axis_distance);
    (axes, assignments)
}
