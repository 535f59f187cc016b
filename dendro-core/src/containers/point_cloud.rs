use std::iter::FromIterator;

use anyhow::{bail, Result};
use nalgebra::Vector3;

/// A height-normalized point cloud stored as columns: one 3D position and one normalized height
/// (height above local ground, called `z0`) per point.
///
/// The cloud is treated as an immutable source by all processing stages: filtering returns new
/// clouds (or index lists into this one) instead of modifying points in place.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PointCloud {
    positions: Vec<Vector3<f64>>,
    normalized_heights: Vec<f64>,
}

impl PointCloud {
    /// Creates a new empty `PointCloud`
    pub fn new() -> Self {
        Default::default()
    }

    /// Creates a new empty `PointCloud` with space for `capacity` points
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            positions: Vec::with_capacity(capacity),
            normalized_heights: Vec::with_capacity(capacity),
        }
    }

    /// Creates a `PointCloud` from a position column and a normalized height column. Fails if the two
    /// columns have different lengths
    pub fn from_columns(positions: Vec<Vector3<f64>>, normalized_heights: Vec<f64>) -> Result<Self> {
        if positions.len() != normalized_heights.len() {
            bail!(
                "Column length mismatch: {} positions but {} normalized heights",
                positions.len(),
                normalized_heights.len()
            );
        }
        Ok(Self {
            positions,
            normalized_heights,
        })
    }

    /// Creates a `PointCloud` whose normalized heights equal the z coordinates, for clouds that are
    /// already normalized
    pub fn from_normalized_positions(positions: Vec<Vector3<f64>>) -> Self {
        let normalized_heights = positions.iter().map(|p| p.z).collect();
        Self {
            positions,
            normalized_heights,
        }
    }

    pub fn push(&mut self, position: Vector3<f64>, normalized_height: f64) {
        self.positions.push(position);
        self.normalized_heights.push(normalized_height);
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn positions(&self) -> &[Vector3<f64>] {
        &self.positions
    }

    pub fn normalized_heights(&self) -> &[f64] {
        &self.normalized_heights
    }

    /// Position of the point at `index`. Panics if `index` is out of bounds
    pub fn position(&self, index: usize) -> &Vector3<f64> {
        &self.positions[index]
    }

    /// Normalized height of the point at `index`. Panics if `index` is out of bounds
    pub fn normalized_height(&self, index: usize) -> f64 {
        self.normalized_heights[index]
    }

    /// Iterate over `(position, normalized_height)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (&Vector3<f64>, f64)> + '_ {
        self.positions
            .iter()
            .zip(self.normalized_heights.iter().copied())
    }

    /// Indices of all points for which `predicate` returns `true`, in ascending order
    pub fn indices_where<F: Fn(&Vector3<f64>, f64) -> bool>(&self, predicate: F) -> Vec<usize> {
        self.iter()
            .enumerate()
            .filter(|(_, (position, z0))| predicate(position, *z0))
            .map(|(index, _)| index)
            .collect()
    }

    /// Creates a new `PointCloud` from the points at the given `indices`, in the order of `indices`.
    /// Panics if any index is out of bounds
    pub fn select(&self, indices: &[usize]) -> PointCloud {
        indices
            .iter()
            .map(|&index| (self.positions[index], self.normalized_heights[index]))
            .collect()
    }
}

impl FromIterator<(Vector3<f64>, f64)> for PointCloud {
    fn from_iter<T: IntoIterator<Item = (Vector3<f64>, f64)>>(iter: T) -> Self {
        let (positions, normalized_heights) = iter.into_iter().unzip();
        Self {
            positions,
            normalized_heights,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_point_cloud() -> PointCloud {
        let mut cloud = PointCloud::new();
        cloud.push(Vector3::new(0.0, 0.0, 10.0), 0.0);
        cloud.push(Vector3::new(1.0, 0.0, 11.3), 1.3);
        cloud.push(Vector3::new(1.0, 2.0, 12.0), 2.0);
        cloud
    }

    #[test]
    fn test_from_columns_length_mismatch() {
        let result = PointCloud::from_columns(vec![Vector3::new(0.0, 0.0, 0.0)], vec![]);
        assert!(result.is_err());
    }

    #[test]
    fn test_select_and_filter() {
        let cloud = setup_point_cloud();
        let above_breast_height = cloud.indices_where(|_, z0| z0 >= 1.3);
        assert_eq!(above_breast_height, vec![1, 2]);

        let selected = cloud.select(&[2, 0]);
        assert_eq!(selected.len(), 2);
        assert_eq!(*selected.position(0), Vector3::new(1.0, 2.0, 12.0));
        assert_eq!(selected.normalized_height(1), 0.0);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_serde_roundtrip() {
        let cloud = setup_point_cloud();
        let json = serde_json::to_string(&cloud).unwrap();
        let parsed: PointCloud = serde_json::from_str(&json).unwrap();
        assert_eq!(cloud, parsed);
    }
}
