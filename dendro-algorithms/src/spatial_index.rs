use dendro_core::nalgebra::{Vector2, Vector3};
use kd_tree::{KdPoint, KdTree};

macro_rules! indexed_point {
    ($name:ident, $dim:ty, $n:expr) => {
        #[derive(Debug, Clone, Copy)]
        struct $name {
            position: [f64; $n],
            index: usize,
        }

        impl KdPoint for $name {
            type Scalar = f64;
            type Dim = $dim;
            fn at(&self, k: usize) -> f64 {
                self.position[k]
            }
        }
    };
}

indexed_point!(IndexedPoint3, typenum::U3, 3);
indexed_point!(IndexedPoint2, typenum::U2, 2);

/// Kd-tree over 3D positions that answers queries with the indices of the original positions.
///
/// All query results are sorted by index so that algorithms iterating over them are deterministic.
pub struct SpatialIndex3 {
    tree: Option<KdTree<IndexedPoint3>>,
}

impl SpatialIndex3 {
    pub fn build(positions: &[Vector3<f64>]) -> Self {
        if positions.is_empty() {
            return Self { tree: None };
        }
        let points = positions
            .iter()
            .enumerate()
            .map(|(index, p)| IndexedPoint3 {
                position: [p.x, p.y, p.z],
                index,
            })
            .collect::<Vec<_>>();
        Self {
            tree: Some(KdTree::build_by_ordered_float(points)),
        }
    }

    /// Indices of all positions within `radius` of `query`, including `query` itself if it is part of the index
    pub fn within_radius(&self, query: &Vector3<f64>, radius: f64) -> Vec<usize> {
        let tree = match &self.tree {
            Some(tree) => tree,
            None => return vec![],
        };
        let query = IndexedPoint3 {
            position: [query.x, query.y, query.z],
            index: usize::MAX,
        };
        let mut indices = tree
            .within_radius(&query, radius)
            .into_iter()
            .map(|point| point.index)
            .collect::<Vec<_>>();
        indices.sort_unstable();
        indices
    }
}

/// Kd-tree over 2D positions, see [SpatialIndex3]
pub struct SpatialIndex2 {
    tree: Option<KdTree<IndexedPoint2>>,
}

impl SpatialIndex2 {
    pub fn build(positions: &[Vector2<f64>]) -> Self {
        if positions.is_empty() {
            return Self { tree: None };
        }
        let points = positions
            .iter()
            .enumerate()
            .map(|(index, p)| IndexedPoint2 {
                position: [p.x, p.y],
                index,
            })
            .collect::<Vec<_>>();
        Self {
            tree: Some(KdTree::build_by_ordered_float(points)),
        }
    }

    pub fn within_radius(&self, query: &Vector2<f64>, radius: f64) -> Vec<usize> {
        let tree = match &self.tree {
            Some(tree) => tree,
            None => return vec![],
        };
        let query = IndexedPoint2 {
            position: [query.x, query.y],
            index: usize::MAX,
        };
        let mut indices = tree
            .within_radius(&query, radius)
            .into_iter()
            .map(|point| point.index)
            .collect::<Vec<_>>();
        indices.sort_unstable();
        indices
    }

    /// The `k` positions closest to `query` as `(index, distance)` pairs, closest first. Ties in distance
    /// are ordered by index
    pub fn nearest(&self, query: &Vector2<f64>, k: usize) -> Vec<(usize, f64)> {
        let tree = match &self.tree {
            Some(tree) => tree,
            None => return vec![],
        };
        let query = IndexedPoint2 {
            position: [query.x, query.y],
            index: usize::MAX,
        };
        let mut neighbours = tree
            .nearests(&query, k)
            .into_iter()
            .map(|found| (found.item.index, found.squared_distance.sqrt()))
            .collect::<Vec<_>>();
        neighbours.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        neighbours
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_within_radius_3d() {
        let positions = vec![
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(0.5, 0.0, 0.0),
            Vector3::new(0.0, 0.0, 2.0),
            Vector3::new(0.0, 0.9, 0.0),
        ];
        let index = SpatialIndex3::build(&positions);
        assert_eq!(index.within_radius(&positions[0], 1.0), vec![0, 1, 3]);
        assert_eq!(index.within_radius(&positions[2], 1.0), vec![2]);
    }

    #[test]
    fn test_empty_index() {
        let index = SpatialIndex3::build(&[]);
        assert!(index.within_radius(&Vector3::new(0.0, 0.0, 0.0), 10.0).is_empty());
        let index = SpatialIndex2::build(&[]);
        assert!(index.nearest(&Vector2::new(0.0, 0.0), 3).is_empty());
    }

    #[test]
    fn test_nearest_2d() {
        let positions = vec![
            Vector2::new(0.0, 0.0),
            Vector2::new(3.0, 0.0),
            Vector2::new(1.0, 0.0),
            Vector2::new(0.0, 2.0),
        ];
        let index = SpatialIndex2::build(&positions);
        let nearest = index.nearest(&Vector2::new(0.1, 0.0), 3);
        let indices = nearest.iter().map(|(i, _)| *i).collect::<Vec<_>>();
        assert_eq!(indices, vec![0, 2, 3]);
        assert!((nearest[0].1 - 0.1).abs() < 1e-12);
    }
}
