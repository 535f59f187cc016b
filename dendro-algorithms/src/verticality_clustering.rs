use dendro_core::containers::PointCloud;
use log::debug;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::clustering::{cluster_sizes, dbscan};
use crate::structure_measures::compute_verticality;
use crate::voxel_grid::voxelate;

/// Parameters of [verticality_clustering]
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct VerticalityClusteringParams {
    /// Radius of the neighbourhood used for the verticality of every voxel
    pub search_radius: f64,
    /// Points with a verticality of at most this value are dropped
    pub verticality_threshold: f64,
    /// Clusters with at most this many points are dropped
    pub min_cluster_points: usize,
    /// Number of filter and cluster passes, each pass runs on the survivors of the previous one
    pub iterations: usize,
    pub resolution_xy: f64,
    pub resolution_z: f64,
    /// Voxels closer than this are linked into the same cluster
    pub linking_distance: f64,
    pub n_digits: u32,
}

/// Points that survived [verticality_clustering], each with the label of its cluster
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClusteredPoints {
    pub cloud: PointCloud,
    /// Cluster label of every point, numbered `0..num_clusters()`
    pub labels: Vec<usize>,
    /// Index of every point in the cloud that was clustered, in ascending order
    pub source_indices: Vec<usize>,
}

impl ClusteredPoints {
    pub fn len(&self) -> usize {
        self.cloud.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cloud.is_empty()
    }

    pub fn num_clusters(&self) -> usize {
        self.labels.iter().max().map(|max| max + 1).unwrap_or(0)
    }

    /// Indices (into this set of points) of all members of cluster `label`
    pub fn members(&self, label: usize) -> Vec<usize> {
        self.labels
            .iter()
            .enumerate()
            .filter(|(_, l)| **l == label)
            .map(|(index, _)| index)
            .collect()
    }
}

/// Isolates vertical structures in `cloud` by repeatedly dropping non-vertical points and clustering
/// what remains.
///
/// Every pass voxelizes its input, computes the verticality of every voxel, keeps the points whose voxel
/// is more vertical than the threshold, voxelizes the survivors again and clusters those voxels. Points
/// in noise or in clusters with at most `min_cluster_points` points are dropped. The next pass runs on
/// the survivors of the previous one.
///
/// With `iterations == 0`, a single pass runs with a threshold of 0, so only points without a defined
/// verticality are dropped by the filter step.
///
/// # Panics
///
/// Panics if a resolution is not positive (see [voxelate](crate::voxel_grid::voxelate))
pub fn verticality_clustering(
    cloud: &PointCloud,
    params: &VerticalityClusteringParams,
) -> ClusteredPoints {
    let (iterations, threshold) = if params.iterations == 0 {
        (1, 0.0)
    } else {
        (params.iterations, params.verticality_threshold)
    };

    let mut current = ClusteredPoints {
        cloud: cloud.clone(),
        labels: vec![0; cloud.len()],
        source_indices: (0..cloud.len()).collect(),
    };
    for iteration in 0..iterations {
        let (kept, labels) = clustering_pass(&current.cloud, threshold, params);
        current = ClusteredPoints {
            cloud: current.cloud.select(&kept),
            labels,
            source_indices: kept.iter().map(|&i| current.source_indices[i]).collect(),
        };
        debug!(
            "Verticality clustering pass {}: {} points in {} clusters",
            iteration + 1,
            current.len(),
            current.num_clusters()
        );
        if current.is_empty() {
            break;
        }
    }
    current
}

/// Returns the indices of the surviving points and their compacted cluster labels
fn clustering_pass(
    cloud: &PointCloud,
    threshold: f64,
    params: &VerticalityClusteringParams,
) -> (Vec<usize>, Vec<usize>) {
    let grid = voxelate(
        cloud.positions(),
        params.resolution_xy,
        params.resolution_z,
        params.n_digits,
    );
    let verticality = grid.to_points(&compute_verticality(&grid.centroids, params.search_radius));
    let vertical = (0..cloud.len())
        .filter(|&i| verticality[i] > threshold)
        .collect::<Vec<_>>();

    let vertical_positions = vertical
        .iter()
        .map(|&i| *cloud.position(i))
        .collect::<Vec<_>>();
    let grid = voxelate(
        &vertical_positions,
        params.resolution_xy,
        params.resolution_z,
        params.n_digits,
    );
    let point_labels = grid.to_points(&dbscan(&grid.centroids, params.linking_distance, 2));
    let sizes = cluster_sizes(&point_labels);

    let mut compacted = vec![None; sizes.len()];
    let mut next_label = 0;
    for (label, &size) in sizes.iter().enumerate() {
        if size > params.min_cluster_points {
            compacted[label] = Some(next_label);
            next_label += 1;
        }
    }

    let mut kept = vec![];
    let mut labels = vec![];
    for (vertical_index, label) in point_labels.into_iter().enumerate() {
        if let Some(label) = label.and_then(|l| compacted[l]) {
            kept.push(vertical[vertical_index]);
            labels.push(label);
        }
    }
    (kept, labels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dendro_core::nalgebra::Vector3;
    use std::f64::consts::PI;

    fn params() -> VerticalityClusteringParams {
        VerticalityClusteringParams {
            search_radius: 0.1,
            verticality_threshold: 0.7,
            min_cluster_points: 50,
            iterations: 2,
            resolution_xy: 0.02,
            resolution_z: 0.02,
            linking_distance: 0.038,
            n_digits: 5,
        }
    }

    fn push_cylinder(cloud: &mut PointCloud, center_x: f64, radius: f64, height: f64) {
        let around = 60;
        let rows = (height / 0.015) as usize;
        for i in 0..around {
            let angle = 2.0 * PI * i as f64 / around as f64;
            for k in 0..rows {
                let z = k as f64 * 0.015;
                cloud.push(
                    Vector3::new(center_x + radius * angle.cos(), radius * angle.sin(), z),
                    z,
                );
            }
        }
    }

    fn push_slope(cloud: &mut PointCloud) {
        // plane tilted by 45 degrees, verticality ~0.29
        for i in 0..40 {
            for k in 0..40 {
                let x = 3.0 + i as f64 * 0.015;
                let y = k as f64 * 0.015;
                cloud.push(Vector3::new(x, y, x - 3.0), x - 3.0);
            }
        }
    }

    #[test]
    fn test_keeps_stems_and_drops_slope() {
        let mut cloud = PointCloud::new();
        push_cylinder(&mut cloud, 0.0, 0.15, 1.0);
        push_cylinder(&mut cloud, 1.5, 0.1, 1.0);
        let num_stem_points = cloud.len();
        push_slope(&mut cloud);

        let clustered = verticality_clustering(&cloud, &params());
        assert_eq!(clustered.num_clusters(), 2);
        assert!(clustered.source_indices.iter().all(|&i| i < num_stem_points));
        assert!(clustered.len() > num_stem_points * 9 / 10);

        // every cluster lies on one cylinder
        for label in 0..clustered.num_clusters() {
            let members = clustered.members(label);
            let first_x = clustered.cloud.position(members[0]).x;
            assert!(members
                .iter()
                .all(|&m| (clustered.cloud.position(m).x > 0.75) == (first_x > 0.75)));
        }
    }

    #[test]
    fn test_output_is_a_partition_of_the_input() {
        let mut cloud = PointCloud::new();
        push_cylinder(&mut cloud, 0.0, 0.15, 1.0);
        push_slope(&mut cloud);
        let clustered = verticality_clustering(&cloud, &params());

        assert_eq!(clustered.labels.len(), clustered.len());
        assert_eq!(clustered.source_indices.len(), clustered.len());
        assert!(clustered.source_indices.windows(2).all(|w| w[0] < w[1]));
        for (index, &source) in clustered.source_indices.iter().enumerate() {
            assert_eq!(clustered.cloud.position(index), cloud.position(source));
        }
    }

    #[test]
    fn test_small_clusters_are_dropped() {
        let mut cloud = PointCloud::new();
        for k in 0..10 {
            let z = k as f64 * 0.01;
            cloud.push(Vector3::new(0.0, (k % 2) as f64 * 0.01, z), z);
        }
        let clustered = verticality_clustering(&cloud, &params());
        assert!(clustered.is_empty());
        assert_eq!(clustered.num_clusters(), 0);
    }

    #[test]
    fn test_zero_iterations_disables_the_verticality_filter() {
        let mut cloud = PointCloud::new();
        push_slope(&mut cloud);

        let filtered = verticality_clustering(&cloud, &params());
        assert!(filtered.is_empty());

        let unfiltered = verticality_clustering(
            &cloud,
            &VerticalityClusteringParams {
                iterations: 0,
                ..params()
            },
        );
        assert_eq!(unfiltered.len(), cloud.len());
        assert_eq!(unfiltered.num_clusters(), 1);
    }
}
