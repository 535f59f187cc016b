mod common;

use assert_approx_eq::assert_approx_eq;
use common::*;
use dendro_algorithms::{
    locator::LocationSource,
    normalization::normalize_cloud,
    parameters::FinParameters,
    pipeline::{run, TreeRecord},
    voxel_grid::voxelate,
};
use dendro_core::{
    containers::PointCloud,
    nalgebra::{Vector2, Vector3},
};

fn record_near(records: &[TreeRecord], x: f64, y: f64) -> TreeRecord {
    *records
        .iter()
        .find(|record| (record.location.xy() - Vector2::new(x, y)).norm() < 0.1)
        .expect("no tree found at the expected location")
}

#[test]
fn test_single_stem() {
    let cloud = stand(&[(Vector2::new(0.0, 0.0), 0.15)], 20.0);
    let output = run(&cloud, &FinParameters::default()).unwrap();

    assert_eq!(output.num_trees(), 1);
    assert_eq!(output.point_assignments.len(), cloud.len());
    assert!(output.point_assignments.iter().all(|a| a.is_some()));

    let records = output.tree_records();
    let tree = record_near(&records, 0.0, 0.0);
    assert_approx_eq!(tree.dbh.unwrap(), 0.30, 0.01);
    assert_approx_eq!(tree.height.unwrap(), 20.0, 0.05);
    assert_approx_eq!(tree.location.z, 1.3, 0.01);
    assert!(tree.tilt_degrees < 1.0);
    assert!(tree.trusted);
    assert!(matches!(output.locations[0].source, LocationSource::Section(_)));

    // sections inside the stem are fitted, sections above the top are empty
    let radius = output.sections.radius();
    let inside = output
        .sections
        .sections
        .iter()
        .position(|&s| s > 5.0)
        .unwrap();
    assert_approx_eq!(radius[(0, inside)], 0.15, 0.005);
    assert!(output.quality[(0, inside)]);
    let above = output
        .sections
        .sections
        .iter()
        .position(|&s| s > 21.0)
        .unwrap();
    assert_eq!(radius[(0, above)], 0.0);
    assert!(!output.quality[(0, above)]);
}

#[test]
fn test_two_stems_are_separated() {
    let cloud = stand(
        &[
            (Vector2::new(0.0, 0.0), 0.15),
            (Vector2::new(4.0, 1.0), 0.25),
        ],
        8.0,
    );
    let output = run(&cloud, &FinParameters::default()).unwrap();
    assert_eq!(output.num_trees(), 2);

    let records = output.tree_records();
    let thin = record_near(&records, 0.0, 0.0);
    let thick = record_near(&records, 4.0, 1.0);
    assert_ne!(thin.tree_id, thick.tree_id);
    assert_approx_eq!(thin.dbh.unwrap(), 0.30, 0.005);
    assert_approx_eq!(thick.dbh.unwrap(), 0.50, 0.005);
    assert_approx_eq!(thin.height.unwrap(), 8.0, 0.1);
    assert_approx_eq!(thick.height.unwrap(), 8.0, 0.1);

    // every point belongs to the stem it was sampled from
    for (position, assignment) in cloud.positions().iter().zip(output.point_assignments.iter()) {
        let expected = if position.x < 2.0 { thin.tree_id } else { thick.tree_id };
        let tree = output.axes[assignment.unwrap().tree].tree_id;
        assert_eq!(tree, expected);
    }
}

#[test]
fn test_small_cluster_yields_no_trees() {
    let cloud = small_blob(Vector3::new(1.0, 1.0, 1.0), 10);
    let output = run(&cloud, &FinParameters::default()).unwrap();

    assert_eq!(output.num_trees(), 0);
    assert!(output.tree_records().is_empty());
    assert!(output.point_assignments.iter().all(|a| a.is_none()));
    assert_eq!(output.sections.num_trees(), 0);
}

#[test]
fn test_run_is_deterministic() {
    let cloud = stand(&[(Vector2::new(2.0, -1.0), 0.2)], 5.0);
    let params = FinParameters::default();
    let first = run(&cloud, &params).unwrap();
    let second = run(&cloud, &params).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_points_are_assigned_to_the_closest_axis() {
    let stems = [
        (Vector2::new(0.0, 0.0), 0.15),
        (Vector2::new(4.0, 1.0), 0.25),
        (Vector2::new(1.5, 3.5), 0.2),
    ];
    let mut cloud = stand(&stems, 6.0);
    for position in ground_grid(4.0, 0.25, |_, _| 0.0) {
        cloud.push(position, 0.0);
    }
    let params = FinParameters::default();
    let output = run(&cloud, &params).unwrap();
    assert_eq!(output.num_trees(), 3);

    // assignments are made per voxel of the cloud grid
    let expert = &params.expert;
    let grid = voxelate(
        cloud.positions(),
        expert.cloud_resolution_xy,
        expert.cloud_resolution_z,
        expert.n_digits,
    );
    for (point, assignment) in output.point_assignments.iter().enumerate() {
        let assignment = assignment.unwrap();
        let centroid = grid.centroids[grid.voxel_of_point[point]];
        assert_eq!(
            output.axes[assignment.tree].distance_to(&centroid),
            assignment.distance
        );
        for (tree, axis) in output.axes.iter().enumerate() {
            let distance = axis.distance_to(&centroid);
            assert!(distance >= assignment.distance);
            if distance == assignment.distance {
                assert!(tree >= assignment.tree);
            }
        }
    }
}

#[test]
fn test_raw_scan_on_a_slope() {
    let elevation = |x: f64, _: f64| 100.0 + 0.1 * x;
    let mut positions = ground_grid(3.0, 0.1, elevation);
    positions.extend(
        cylinder_stem(Vector2::new(0.0, 0.0), 0.15, 8.0)
            .into_iter()
            .map(|p| Vector3::new(p.x, p.y, p.z + elevation(0.0, 0.0))),
    );
    let params = FinParameters::default();

    // without normalization the whole stem lies far above the stripe
    let raw = PointCloud::from_normalized_positions(positions.clone());
    assert_eq!(run(&raw, &params).unwrap().num_trees(), 0);

    let cloud = normalize_cloud(positions, &params.ground()).unwrap();
    let output = run(&cloud, &params).unwrap();
    assert_eq!(output.num_trees(), 1);
    let tree = record_near(&output.tree_records(), 0.0, 0.0);
    assert_approx_eq!(tree.dbh.unwrap(), 0.30, 0.01);
    // the terrain model is interpolated between ground points up to a meter apart
    assert_approx_eq!(tree.height.unwrap(), 8.0, 0.2);
    assert_approx_eq!(tree.location.z, 101.3, 0.15);
}
