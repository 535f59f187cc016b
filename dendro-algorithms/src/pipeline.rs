use anyhow::{bail, Result};
use dendro_core::containers::PointCloud;
use dendro_core::nalgebra::{DMatrix, Vector3};
use log::{debug, info, warn};

use crate::axes::{build_axes, AxisAssignment, TreeAxis};
use crate::heights::{estimate_heights, TreeHeight};
use crate::locator::{locate_trees, TreeLocation};
use crate::parameters::FinParameters;
use crate::sections::{compute_sections, SectionMatrices};
use crate::tilt::outlier_probability;
use crate::verticality_clustering::verticality_clustering;
use crate::voxel_grid::voxelate;

/// Everything that is known about the trees after a complete run
#[derive(Debug, Clone, PartialEq)]
pub struct FinOutput {
    pub axes: Vec<TreeAxis>,
    /// Closest axis of every point of the input cloud
    pub point_assignments: Vec<Option<AxisAssignment>>,
    pub heights: Vec<TreeHeight>,
    pub sections: SectionMatrices,
    /// Outlier probability of every tree (rows) and section (columns)
    pub outlier_probability: DMatrix<f64>,
    /// `true` for every section whose circle can be trusted
    pub quality: DMatrix<bool>,
    pub locations: Vec<TreeLocation>,
}

/// Summary of one tree
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TreeRecord {
    pub tree_id: usize,
    pub height: Option<f64>,
    pub dbh: Option<f64>,
    pub location: Vector3<f64>,
    pub tilt_degrees: f64,
    /// `true` if the height of the tree is reliable
    pub trusted: bool,
}

impl FinOutput {
    pub fn num_trees(&self) -> usize {
        self.axes.len()
    }

    pub fn tree_records(&self) -> Vec<TreeRecord> {
        self.axes
            .iter()
            .zip(self.heights.iter())
            .zip(self.locations.iter())
            .map(|((axis, height), location)| TreeRecord {
                tree_id: axis.tree_id,
                height: height.height,
                dbh: location.dbh,
                location: location.position,
                tilt_degrees: axis.tilt_degrees(),
                trusted: height.trusted,
            })
            .collect()
    }
}

fn check_input(cloud: &PointCloud, params: &FinParameters) -> Result<()> {
    if cloud.is_empty() {
        bail!("The point cloud is empty");
    }
    if !cloud.normalized_heights().iter().any(|&height| height > 0.0) {
        bail!("The point cloud has no points above the ground, is it height normalized?");
    }
    params.validate()
}

/// Stem points that the sections are fitted to
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StemPoints {
    pub cloud: PointCloud,
    /// Index of every stem point in the input cloud
    pub source_indices: Vec<usize>,
    /// Tree (axis index) of every stem point
    pub trees: Vec<usize>,
}

/// Selects the points close to their axis within the section height range and keeps those that survive a
/// second verticality clustering with the stem parameters
pub fn extract_stems(
    cloud: &PointCloud,
    point_assignments: &[Option<AxisAssignment>],
    params: &FinParameters,
) -> StemPoints {
    let advanced = &params.advanced;
    let search_radius = advanced.stem_search_diameter / 2.0;
    let stem_height_limit = advanced.maximum_height + advanced.section_width;
    let (candidates, candidate_trees): (Vec<usize>, Vec<usize>) = point_assignments
        .iter()
        .zip(cloud.normalized_heights().iter())
        .enumerate()
        .filter_map(|(index, (assignment, &height))| match assignment {
            Some(assignment)
                if assignment.distance < search_radius
                    && height > advanced.minimum_height
                    && height < stem_height_limit =>
            {
                Some((index, assignment.tree))
            }
            _ => None,
        })
        .unzip();
    let stems = verticality_clustering(&cloud.select(&candidates), &params.stem_clustering());
    debug!(
        "{} of {} stem candidates survive the stem clustering",
        stems.len(),
        candidates.len()
    );
    StemPoints {
        source_indices: stems.source_indices.iter().map(|&i| candidates[i]).collect(),
        trees: stems.source_indices.iter().map(|&i| candidate_trees[i]).collect(),
        cloud: stems.cloud,
    }
}

/// Runs all stages on a height-normalized cloud: stem detection in a horizontal stripe, tree axes, heights,
/// circle fits along the stems, outlier scoring of the sections and the diameter at breast height.
///
/// Fails for an empty cloud, a cloud without any point above the ground or parameters rejected by
/// [FinParameters::validate]. A plot without detectable trees is not an error, it produces empty outputs.
pub fn run(cloud: &PointCloud, params: &FinParameters) -> Result<FinOutput> {
    check_input(cloud, params)?;

    let (lower, upper) = (params.basic.stripe_lower_limit, params.basic.stripe_upper_limit);
    let stripe = cloud.select(&cloud.indices_where(|_, height| height > lower && height < upper));
    info!("Stripe contains {} of {} points", stripe.len(), cloud.len());

    let stripe_clusters = verticality_clustering(&stripe, &params.stripe_clustering());
    info!(
        "{} stem candidates with {} points",
        stripe_clusters.num_clusters(),
        stripe_clusters.len()
    );

    let expert = &params.expert;
    let grid = voxelate(
        cloud.positions(),
        expert.cloud_resolution_xy,
        expert.cloud_resolution_z,
        expert.n_digits,
    );
    info!("Cloud reduced to {} voxels", grid.len());

    let (axes, voxel_assignments) = build_axes(
        &grid.centroids,
        &stripe_clusters,
        expert.axis_min_points,
        params.axis_height_range(),
        expert.max_axis_distance,
    );
    if axes.is_empty() {
        warn!("No tree axis was found");
    } else {
        info!("{} tree axes", axes.len());
    }
    let point_assignments = grid.to_points(&voxel_assignments);

    let heights = estimate_heights(&grid.centroids, &axes, &voxel_assignments, &params.heights());

    let stems = extract_stems(cloud, &point_assignments, params);
    info!("{} stem points after clustering", stems.cloud.len());

    let circle_params = params.circle_fit();
    let sections = compute_sections(
        &stems.cloud,
        &stems.trees,
        axes.len(),
        &params.sections(),
        params.advanced.section_width,
        &circle_params,
    );
    info!(
        "Fitted {} sections for {} trees",
        sections.num_sections(),
        sections.num_trees()
    );

    let outliers = outlier_probability(
        &sections.center_x(),
        &sections.center_y(),
        &sections.radius(),
        &sections.sections,
        &expert.outlier_weights,
    );
    let quality = sections.quality(
        &outliers,
        &circle_params,
        expert.locator.max_outlier_probability,
    );
    let locations = locate_trees(&sections, &outliers, &axes, &expert.locator);
    info!(
        "Measured the diameter at breast height of {} of {} trees",
        locations.iter().filter(|location| location.dbh.is_some()).count(),
        locations.len()
    );

    Ok(FinOutput {
        axes,
        point_assignments,
        heights,
        sections,
        outlier_probability: outliers,
        quality,
        locations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voxel_grid::MAX_DIGITS;

    #[test]
    fn test_rejects_empty_cloud() {
        assert!(run(&PointCloud::new(), &FinParameters::default()).is_err());
    }

    #[test]
    fn test_rejects_cloud_without_heights() {
        let cloud = (0..10)
            .map(|i| (Vector3::new(i as f64, 0.0, 0.0), 0.0))
            .collect::<PointCloud>();
        assert!(run(&cloud, &FinParameters::default()).is_err());
    }

    #[test]
    fn test_rejects_too_many_digits() {
        let cloud = (0..10)
            .map(|i| (Vector3::new(0.0, 0.0, i as f64), i as f64))
            .collect::<PointCloud>();
        let mut params = FinParameters::default();
        params.expert.n_digits = MAX_DIGITS + 1;
        assert!(run(&cloud, &params).is_err());
    }

    #[test]
    fn test_rejects_zero_sectors() {
        let cloud = (0..10)
            .map(|i| (Vector3::new(0.0, 0.0, i as f64), i as f64))
            .collect::<PointCloud>();
        let mut params = FinParameters::default();
        params.expert.num_sectors = 0;
        params.expert.min_occupied_sectors = 0;
        assert!(run(&cloud, &params).is_err());
    }

    fn ring_stack(center: Vector3<f64>, radius: f64, height: f64) -> Vec<Vector3<f64>> {
        let spacing = 0.0125;
        let rings = (height / spacing).round() as usize;
        let samples = (2.0 * std::f64::consts::PI * radius / spacing).ceil() as usize;
        (0..=rings)
            .flat_map(|ring| {
                (0..samples).map(move |sample| {
                    let angle = 2.0 * std::f64::consts::PI * sample as f64 / samples as f64;
                    center
                        + Vector3::new(
                            radius * angle.cos(),
                            radius * angle.sin(),
                            ring as f64 * spacing,
                        )
                })
            })
            .collect()
    }

    #[test]
    fn test_small_vertical_fragment_is_not_a_stem() {
        let mut positions = ring_stack(Vector3::new(0.0, 0.0, 0.0), 0.15, 3.0);
        let stem_len = positions.len();
        // a vertical patch of 5 x 10 points, half a meter from the stem
        for column in 0..5 {
            for row in 0..10 {
                positions.push(Vector3::new(
                    0.6 + column as f64 * 0.0125,
                    0.0,
                    1.0 + row as f64 * 0.0125,
                ));
            }
        }
        let cloud = positions
            .iter()
            .map(|p| (*p, p.z))
            .collect::<PointCloud>();
        let assignments = positions
            .iter()
            .map(|p| {
                Some(AxisAssignment {
                    tree: 0,
                    distance: p.xy().norm(),
                })
            })
            .collect::<Vec<_>>();

        let stems = extract_stems(&cloud, &assignments, &FinParameters::default());
        assert!(!stems.cloud.is_empty());
        assert!(stems.source_indices.iter().all(|&index| index < stem_len));
        assert!(stems.trees.iter().all(|&tree| tree == 0));
        assert_eq!(stems.cloud.len(), stems.source_indices.len());

        // with the axis threshold the fragment would be kept
        let mut params = FinParameters::default();
        params.expert.stem_min_cluster_points = params.expert.axis_min_points;
        let stems = extract_stems(&cloud, &assignments, &params);
        assert!(stems.source_indices.iter().any(|&index| index >= stem_len));
    }
}
