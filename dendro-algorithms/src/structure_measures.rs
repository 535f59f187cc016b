use dendro_core::nalgebra::{Matrix3, Vector3};
use rayon::prelude::*;

use crate::spatial_index::SpatialIndex3;

/// Eigen-decomposition of the covariance matrix of a local neighbourhood of points
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StructureTensor {
    /// Eigenvalues sorted from largest to smallest
    pub eigenvalues: [f64; 3],
    /// Unit eigenvectors in the order of `eigenvalues`
    pub eigenvectors: [Vector3<f64>; 3],
    /// Centroid of the neighbourhood
    pub centroid: Vector3<f64>,
}

impl StructureTensor {
    /// Computes the structure tensor of the given points. Returns `None` if there are less than three points
    /// or the decomposition does not produce finite values
    pub fn from_points(points: &[Vector3<f64>]) -> Option<Self> {
        if points.len() < 3 {
            return None;
        }
        let centroid = calc_centroid(points);
        let covariance_matrix = calc_covariance_matrix(&centroid, points);
        let eigen = covariance_matrix.symmetric_eigen();

        let mut order = [0, 1, 2];
        order.sort_by(|&a, &b| eigen.eigenvalues[b].total_cmp(&eigen.eigenvalues[a]));
        let eigenvalues = [
            eigen.eigenvalues[order[0]],
            eigen.eigenvalues[order[1]],
            eigen.eigenvalues[order[2]],
        ];
        if eigenvalues.iter().any(|e| !e.is_finite()) {
            return None;
        }
        let eigenvectors = [
            eigen.eigenvectors.column(order[0]).normalize(),
            eigen.eigenvectors.column(order[1]).normalize(),
            eigen.eigenvectors.column(order[2]).normalize(),
        ];
        Some(Self {
            eigenvalues,
            eigenvectors,
            centroid,
        })
    }

    /// Direction of largest variance (first principal component). The sign is arbitrary
    pub fn principal_direction(&self) -> Vector3<f64> {
        self.eigenvectors[0]
    }

    /// Direction of smallest variance, i.e. the normal of the local surface. The sign is arbitrary
    pub fn normal(&self) -> Vector3<f64> {
        self.eigenvectors[2]
    }

    /// `1 - |n_z|` with `n` being the surface normal. 1 for vertical surfaces such as stems, 0 for
    /// horizontal surfaces such as the ground
    pub fn verticality(&self) -> f64 {
        1.0 - self.normal().z.abs()
    }
}

/// Computes the verticality (see [StructureTensor::verticality]) for every position, using all positions
/// within `search_radius` (including the position itself) as the neighbourhood.
///
/// Positions with less than three neighbours get `NaN`, which fails every threshold comparison
pub fn compute_verticality(positions: &[Vector3<f64>], search_radius: f64) -> Vec<f64> {
    let index = SpatialIndex3::build(positions);
    positions
        .par_iter()
        .map(|position| {
            let neighbourhood = index
                .within_radius(position, search_radius)
                .into_iter()
                .map(|neighbour| positions[neighbour])
                .collect::<Vec<_>>();
            StructureTensor::from_points(&neighbourhood)
                .map(|tensor| tensor.verticality())
                .unwrap_or(f64::NAN)
        })
        .collect()
}

fn calc_centroid(points: &[Vector3<f64>]) -> Vector3<f64> {
    let sum: Vector3<f64> = points.iter().sum();

    sum / (points.len() as f64)
}

fn calc_covariance_matrix(centroid: &Vector3<f64>, points: &[Vector3<f64>]) -> Matrix3<f64> {
    let unweighted_covariance_matrix: Matrix3<f64> = points
        .iter()
        .map(|v| {
            let diff: Vector3<f64> = v - centroid;
            diff * diff.transpose()
        })
        .sum();
    unweighted_covariance_matrix / (points.len() as f64)
}
