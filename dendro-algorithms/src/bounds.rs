use dendro_core::{
    math::AABB,
    nalgebra::{Point3, Vector3},
};

/// Calculate the bounding box of the given `positions`. Returns `None` if there are zero positions
pub fn calculate_bounds(positions: &[Vector3<f64>]) -> Option<AABB<f64>> {
    if positions.is_empty() {
        return None;
    }
    let mut pos_min = Point3::new(f64::MAX, f64::MAX, f64::MAX);
    let mut pos_max = Point3::new(f64::MIN, f64::MIN, f64::MIN);
    for pos in positions {
        for axis in 0..3 {
            if pos[axis] < pos_min[axis] {
                pos_min[axis] = pos[axis];
            }
            if pos[axis] > pos_max[axis] {
                pos_max[axis] = pos[axis];
            }
        }
    }
    Some(AABB::from_min_max(pos_min, pos_max))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calculate_bounds() {
        let positions = vec![
            Vector3::new(1.0, 5.0, -2.0),
            Vector3::new(-3.0, 2.0, 0.0),
            Vector3::new(0.0, 0.0, 4.0),
        ];
        let bounds = calculate_bounds(&positions).unwrap();
        assert_eq!(*bounds.min(), Point3::new(-3.0, 0.0, -2.0));
        assert_eq!(*bounds.max(), Point3::new(1.0, 5.0, 4.0));
        assert!(calculate_bounds(&[]).is_none());
    }
}
