#![allow(dead_code)]

use dendro_core::{
    containers::PointCloud,
    nalgebra::{Vector2, Vector3},
};

/// Vertical and angular spacing of the synthetic scans
pub const SPACING: f64 = 0.0125;

/// A straight vertical stem sampled as stacked rings, from the ground up to `height`
pub fn cylinder_stem(center: Vector2<f64>, radius: f64, height: f64) -> Vec<Vector3<f64>> {
    let rings = (height / SPACING).round() as usize;
    let samples = (2.0 * std::f64::consts::PI * radius / SPACING).ceil() as usize;
    (0..=rings)
        .flat_map(|ring| {
            let z = ring as f64 * SPACING;
            (0..samples).map(move |sample| {
                let angle = 2.0 * std::f64::consts::PI * sample as f64 / samples as f64;
                Vector3::new(
                    center.x + radius * angle.cos(),
                    center.y + radius * angle.sin(),
                    z,
                )
            })
        })
        .collect()
}

/// Stems `(center, radius)` of the same height on flat ground at z = 0
pub fn stand(stems: &[(Vector2<f64>, f64)], height: f64) -> PointCloud {
    stems
        .iter()
        .flat_map(|(center, radius)| cylinder_stem(*center, *radius, height))
        .map(|position| (position, position.z))
        .collect()
}

/// A handful of points around `center`, too few to form a stem
pub fn small_blob(center: Vector3<f64>, num_points: usize) -> PointCloud {
    (0..num_points)
        .map(|i| {
            let offset = Vector3::new(0.01 * (i % 3) as f64, 0.01 * (i % 2) as f64, 0.02 * i as f64);
            let position = center + offset;
            (position, position.z)
        })
        .collect()
}

/// Square grid of ground points around the origin, from `-half_size` to `half_size` in x and y, with the
/// elevation given by `elevation(x, y)`
pub fn ground_grid<F: Fn(f64, f64) -> f64>(half_size: f64, spacing: f64, elevation: F) -> Vec<Vector3<f64>> {
    let steps = (2.0 * half_size / spacing).round() as usize;
    let mut ground = Vec::with_capacity((steps + 1) * (steps + 1));
    for i in 0..=steps {
        for j in 0..=steps {
            let x = -half_size + i as f64 * spacing;
            let y = -half_size + j as f64 * spacing;
            ground.push(Vector3::new(x, y, elevation(x, y)));
        }
    }
    ground
}
