use dendro_core::nalgebra::Vector3;

use crate::bounds::calculate_bounds;

/// A voxelization of a set of points.
///
/// Voxels are ordered by their voxel code (z bin first, then y, then x), so the layout only depends on the
/// point positions and not on the order of the input points.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VoxelGrid {
    /// Center of every voxel
    pub centroids: Vec<Vector3<f64>>,
    /// For every input point, the index of the voxel that contains it
    pub voxel_of_point: Vec<usize>,
    /// For every voxel, the smallest index of an input point that falls into it
    pub first_point_of_voxel: Vec<usize>,
    /// Number of input points per voxel
    pub points_per_voxel: Vec<usize>,
}

impl VoxelGrid {
    /// Number of voxels
    pub fn len(&self) -> usize {
        self.centroids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.centroids.is_empty()
    }

    /// Broadcasts one value per voxel to all points of the voxel, returning one value per input point
    pub fn to_points<T: Copy>(&self, per_voxel: &[T]) -> Vec<T> {
        self.voxel_of_point
            .iter()
            .map(|&voxel| per_voxel[voxel])
            .collect()
    }

    /// Samples one value per point at the representative point of every voxel, returning one value per voxel
    pub fn to_voxels<T: Copy>(&self, per_point: &[T]) -> Vec<T> {
        self.first_point_of_voxel
            .iter()
            .map(|&point| per_point[point])
            .collect()
    }
}

/// Largest number of decimal digits per axis for which three slots still fit into a `u64` code
pub const MAX_DIGITS: u32 = 6;

/// Integer code of the voxel bin `(x, y, z)`. Bins are placed into decimal slots of `n_digits` digits each,
/// codes of bins that need more digits than that collide
pub fn voxel_code(bin: [u64; 3], n_digits: u32) -> u64 {
    let base = 10u64.wrapping_pow(n_digits);
    bin[2]
        .wrapping_mul(base.wrapping_mul(base))
        .wrapping_add(bin[1].wrapping_mul(base))
        .wrapping_add(bin[0])
}

/// Decodes a voxel code created by [voxel_code] into its `(x, y, z)` bin
pub fn decode_voxel_code(code: u64, n_digits: u32) -> [u64; 3] {
    let base = 10u64.pow(n_digits);
    let z = code / (base * base);
    let y = (code % (base * base)) / base;
    let x = code % base;
    [x, y, z]
}

/// Quantizes `positions` into a voxel grid with horizontal resolution `resolution_xy` and vertical
/// resolution `resolution_z`.
///
/// The positions are translated so that their minimum is the origin, then every position receives an
/// integer voxel code (see [voxel_code]). Points sharing a code share a voxel. The centroid of a voxel is
/// the center of its bin in the original coordinate frame.
///
/// `n_digits` must be large enough to hold the number of bins along every axis, otherwise distinct bins
/// collide into the same voxel. This is not reported as an error.
///
/// # Panics
///
/// Panics if `resolution_xy` or `resolution_z` is not positive, or if `n_digits` exceeds [MAX_DIGITS]
///
/// # Examples
///
/// ```
/// # use dendro_core::nalgebra::Vector3;
/// # use dendro_algorithms::voxel_grid::voxelate;
/// let positions = vec![
///     Vector3::new(0.01, 0.01, 0.01),
///     Vector3::new(0.5, 0.5, 0.5),
///     Vector3::new(0.02, 0.03, 0.01),
/// ];
/// let grid = voxelate(&positions, 0.1, 0.1, 5);
/// assert_eq!(grid.len(), 2);
/// assert_eq!(grid.voxel_of_point, vec![0, 1, 0]);
/// assert_eq!(grid.first_point_of_voxel, vec![0, 1]);
/// assert_eq!(grid.points_per_voxel, vec![2, 1]);
/// ```
pub fn voxelate(
    positions: &[Vector3<f64>],
    resolution_xy: f64,
    resolution_z: f64,
    n_digits: u32,
) -> VoxelGrid {
    if n_digits > MAX_DIGITS {
        panic!("voxelate: n_digits must not exceed {}", MAX_DIGITS);
    }
    if !(resolution_xy > 0.0 && resolution_z > 0.0) {
        panic!(
            "voxelate: resolutions must be positive (got {} / {})",
            resolution_xy, resolution_z
        );
    }
    let bounds = match calculate_bounds(positions) {
        Some(bounds) => bounds,
        None => return VoxelGrid::default(),
    };
    let origin = bounds.min().coords;
    let resolution = Vector3::new(resolution_xy, resolution_xy, resolution_z);

    let codes = positions
        .iter()
        .map(|position| {
            let offset = position - origin;
            let bin = [
                (offset.x / resolution.x).floor() as u64,
                (offset.y / resolution.y).floor() as u64,
                (offset.z / resolution.z).floor() as u64,
            ];
            voxel_code(bin, n_digits)
        })
        .collect::<Vec<_>>();

    // Stable sort, so the first point of every run is the smallest point index of that voxel
    let mut order = (0..positions.len()).collect::<Vec<_>>();
    order.sort_by_key(|&index| codes[index]);

    let mut grid = VoxelGrid {
        voxel_of_point: vec![0; positions.len()],
        ..Default::default()
    };
    let mut current_code = None;
    for point in order {
        let code = codes[point];
        if current_code != Some(code) {
            current_code = Some(code);
            let bin = decode_voxel_code(code, n_digits);
            grid.centroids.push(Vector3::new(
                bin[0] as f64 * resolution.x + origin.x + resolution.x / 2.0,
                bin[1] as f64 * resolution.y + origin.y + resolution.y / 2.0,
                bin[2] as f64 * resolution.z + origin.z + resolution.z / 2.0,
            ));
            grid.first_point_of_voxel.push(point);
            grid.points_per_voxel.push(0);
        }
        let voxel = grid.centroids.len() - 1;
        grid.voxel_of_point[point] = voxel;
        grid.points_per_voxel[voxel] += 1;
    }
    grid
}
