use std::collections::BTreeMap;

use anyhow::{bail, Result};
use dendro_core::{
    containers::PointCloud,
    math::median,
    nalgebra::{Vector2, Vector3},
};
use log::info;
use rayon::prelude::*;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::clustering::{cluster_sizes, dbscan};
use crate::spatial_index::SpatialIndex2;
use crate::voxel_grid::voxelate;

/// Number of ground points used by [IdwGround] by default
pub const DEFAULT_GROUND_NEIGHBOURS: usize = 3;
/// Size of the neighbourhood used by [clean_cloth]
const CLOTH_NEIGHBOURS: usize = 15;

/// Source of the ground elevation below any horizontal position
pub trait GroundModel {
    /// Elevation of the ground at `(x, y)`, `None` if the model can't tell
    fn ground_elevation(&self, x: f64, y: f64) -> Option<f64>;
}

/// Ground model interpolating between ground points with inverse distance weighting
pub struct IdwGround {
    index: SpatialIndex2,
    elevations: Vec<f64>,
    neighbours: usize,
}

impl IdwGround {
    /// Creates a ground model that interpolates between the [DEFAULT_GROUND_NEIGHBOURS] closest ground points
    pub fn new(ground: &[Vector3<f64>]) -> Self {
        Self::with_neighbours(ground, DEFAULT_GROUND_NEIGHBOURS)
    }

    pub fn with_neighbours(ground: &[Vector3<f64>], neighbours: usize) -> Self {
        let horizontal = ground.iter().map(|p| p.xy()).collect::<Vec<_>>();
        Self {
            index: SpatialIndex2::build(&horizontal),
            elevations: ground.iter().map(|p| p.z).collect(),
            neighbours: neighbours.max(1),
        }
    }
}

impl GroundModel for IdwGround {
    fn ground_elevation(&self, x: f64, y: f64) -> Option<f64> {
        let nearest = self.index.nearest(&Vector2::new(x, y), self.neighbours);
        if let Some(&(index, _)) = nearest.iter().find(|(_, distance)| *distance <= f64::EPSILON) {
            return Some(self.elevations[index]);
        }
        let (weighted, weights) = nearest
            .iter()
            .fold((0.0, 0.0), |(weighted, weights), &(index, distance)| {
                (
                    weighted + self.elevations[index] / distance,
                    weights + 1.0 / distance,
                )
            });
        if weights > 0.0 {
            Some(weighted / weights)
        } else {
            None
        }
    }
}

/// Height above ground of every position. Fails if `ground` can't provide an elevation for a position
pub fn normalize_heights<G: GroundModel + Sync>(
    positions: &[Vector3<f64>],
    ground: &G,
) -> Result<Vec<f64>> {
    let heights = positions
        .par_iter()
        .map(|p| ground.ground_elevation(p.x, p.y).map(|z| p.z - z))
        .collect::<Option<Vec<_>>>();
    match heights {
        Some(heights) => Ok(heights),
        None => bail!("The ground model has no elevation for some of the points"),
    }
}

/// Builds a [PointCloud] from raw positions by normalizing their heights against `ground`
pub fn normalized_cloud<G: GroundModel + Sync>(
    positions: Vec<Vector3<f64>>,
    ground: &G,
) -> Result<PointCloud> {
    let heights = normalize_heights(&positions, ground)?;
    PointCloud::from_columns(positions, heights)
}

/// Removes isolated clutter from ground points: the points are voxelized with `resolution`, the voxels are
/// density clustered and only the points of voxels in clusters with more than `min_voxels` voxels are kept
pub fn clean_ground(
    ground: &[Vector3<f64>],
    resolution: f64,
    min_voxels: usize,
    linking_distance: f64,
    n_digits: u32,
) -> Vec<Vector3<f64>> {
    let grid = voxelate(ground, resolution, resolution, n_digits);
    let labels = dbscan(&grid.centroids, linking_distance, 2);
    let sizes = cluster_sizes(&labels);
    let keep = labels
        .iter()
        .map(|label| label.map(|l| sizes[l] > min_voxels).unwrap_or(false))
        .collect::<Vec<_>>();
    ground
        .iter()
        .zip(grid.voxel_of_point.iter())
        .filter(|(_, &voxel)| keep[voxel])
        .map(|(point, _)| *point)
        .collect()
}

/// Lowest point of every `cell_size` square of the horizontal plane, ordered by cell
pub fn lowest_points(points: &[Vector3<f64>], cell_size: f64) -> Vec<Vector3<f64>> {
    let mut lowest = BTreeMap::new();
    for point in points {
        let cell = (
            (point.x / cell_size).floor() as i64,
            (point.y / cell_size).floor() as i64,
        );
        let entry = lowest.entry(cell).or_insert(*point);
        if point.z < entry.z {
            *entry = *point;
        }
    }
    lowest.into_iter().map(|(_, point)| point).collect()
}

/// Removes spikes from terrain model points: every point deviates from the median elevation of its 15
/// horizontally closest points by some amount, and points that deviate by more than twice the median of
/// these deviations are dropped
pub fn clean_cloth(points: &[Vector3<f64>]) -> Vec<Vector3<f64>> {
    let horizontal = points.iter().map(|p| p.xy()).collect::<Vec<_>>();
    let index = SpatialIndex2::build(&horizontal);
    let deviations = points
        .par_iter()
        .zip(horizontal.par_iter())
        .map(|(point, xy)| {
            let elevations = index
                .nearest(xy, CLOTH_NEIGHBOURS)
                .into_iter()
                .map(|(neighbour, _)| points[neighbour].z)
                .collect::<Vec<_>>();
            median(&elevations).map(|m| (point.z - m).abs()).unwrap_or(0.0)
        })
        .collect::<Vec<_>>();
    let limit = match median(&deviations) {
        Some(mad) => 2.0 * mad,
        None => return vec![],
    };
    points
        .iter()
        .zip(deviations.iter())
        .filter(|(_, deviation)| **deviation <= limit)
        .map(|(point, _)| *point)
        .collect()
}

/// Parameters of [normalize_cloud]
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GroundParams {
    /// Voxel size of [clean_ground]
    pub resolution: f64,
    pub min_voxels: usize,
    pub linking_distance: f64,
    /// Cell size of the terrain model, one ground point per cell
    pub cell_size: f64,
    pub n_digits: u32,
}

/// Computes the normalized heights of a raw scan. Clutter is removed with [clean_ground], the lowest
/// remaining point of every cell forms the terrain model, [clean_cloth] removes its spikes and every
/// position is normalized against an [IdwGround] over what is left
pub fn normalize_cloud(positions: Vec<Vector3<f64>>, params: &GroundParams) -> Result<PointCloud> {
    if !(params.resolution > 0.0 && params.cell_size > 0.0) {
        bail!("The ground resolution and the terrain cell size must be positive");
    }
    let cleaned = clean_ground(
        &positions,
        params.resolution,
        params.min_voxels,
        params.linking_distance,
        params.n_digits,
    );
    let terrain = clean_cloth(&lowest_points(&cleaned, params.cell_size));
    if terrain.is_empty() {
        bail!("No ground points were found");
    }
    info!(
        "Terrain model with {} points from {} ground candidates",
        terrain.len(),
        cleaned.len()
    );
    normalized_cloud(positions, &IdwGround::new(&terrain))
}
