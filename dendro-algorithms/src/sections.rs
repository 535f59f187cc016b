use dendro_core::{
    containers::PointCloud,
    nalgebra::{DMatrix, Vector2},
};
use float_ord::FloatOrd;
use rayon::prelude::*;

use crate::circle_fit::{fit_section, CircleFitParams, SectionFit};

/// Lower bounds of the sections from `min_height` up to (excluding) `max_height`, spaced by `step`
///
/// ```
/// # use dendro_algorithms::sections::section_heights;
/// let heights = section_heights(0.3, 1.0, 0.2);
/// assert_eq!(heights.len(), 4);
/// assert!((heights[3] - 0.9).abs() < 1e-12);
/// ```
pub fn section_heights(min_height: f64, max_height: f64, step: f64) -> Vec<f64> {
    if !(step > 0.0) || max_height <= min_height {
        return vec![];
    }
    let count = ((max_height - min_height) / step).ceil() as usize;
    (0..count).map(|i| min_height + i as f64 * step).collect()
}

/// Circle fits of every tree (rows) and section (columns)
#[derive(Debug, Clone, PartialEq)]
pub struct SectionMatrices {
    /// Lower bound (normalized height) of every section
    pub sections: Vec<f64>,
    pub fits: DMatrix<SectionFit>,
}

impl SectionMatrices {
    pub fn num_trees(&self) -> usize {
        self.fits.nrows()
    }

    pub fn num_sections(&self) -> usize {
        self.fits.ncols()
    }

    pub fn center_x(&self) -> DMatrix<f64> {
        self.fits
            .map(|fit| fit.circle().map(|c| c.circle.center.x).unwrap_or(0.0))
    }

    pub fn center_y(&self) -> DMatrix<f64> {
        self.fits
            .map(|fit| fit.circle().map(|c| c.circle.center.y).unwrap_or(0.0))
    }

    /// Radii, 0 where no circle was fitted
    pub fn radius(&self) -> DMatrix<f64> {
        self.fits.map(|fit| fit.radius())
    }

    pub fn inner_points(&self) -> DMatrix<usize> {
        self.fits
            .map(|fit| fit.circle().map(|c| c.inner_points).unwrap_or(0))
    }

    pub fn sector_percentage(&self) -> DMatrix<f64> {
        self.fits
            .map(|fit| fit.circle().map(|c| c.sector_occupancy.percentage).unwrap_or(0.0))
    }

    /// See [SectionFit::review_code]
    pub fn review(&self) -> DMatrix<u8> {
        self.fits.map(|fit| fit.review_code())
    }

    /// See [SectionFit::retry_code]
    pub fn retry(&self) -> DMatrix<u8> {
        self.fits.map(|fit| fit.retry_code())
    }

    /// Aggregated quality of every section: `true` iff the section has enough occupied sectors, few enough
    /// inner points, an outlier probability of at most `max_outlier_probability` and a radius within the
    /// allowed range
    pub fn quality(
        &self,
        outlier_probability: &DMatrix<f64>,
        params: &CircleFitParams,
        max_outlier_probability: f64,
    ) -> DMatrix<bool> {
        let min_percentage = params.min_occupied_sectors as f64 * 100.0 / params.num_sectors as f64;
        DMatrix::from_fn(self.num_trees(), self.num_sections(), |tree, section| {
            let outlier = outlier_probability[(tree, section)];
            match self.fits[(tree, section)].circle() {
                Some(circle) => {
                    circle.sector_occupancy.percentage >= min_percentage
                        && circle.inner_points <= params.max_inner_points
                        && outlier <= max_outlier_probability
                        && circle.circle.radius >= params.min_radius
                        && circle.circle.radius <= params.max_radius
                }
                None => false,
            }
        })
    }
}

/// Fits the circle of every tree and section (see [fit_section]).
///
/// `stems` holds the stem points and `tree_of_point` the tree index (`0..num_trees`) of every stem point.
/// A section of a tree contains the points with `section <= z0 < section + section_width`.
/// Sections of different trees are fitted in parallel.
///
/// # Panics
///
/// Panics if `tree_of_point` and `stems` differ in length or a tree index is not below `num_trees`
pub fn compute_sections(
    stems: &PointCloud,
    tree_of_point: &[usize],
    num_trees: usize,
    sections: &[f64],
    section_width: f64,
    params: &CircleFitParams,
) -> SectionMatrices {
    if stems.len() != tree_of_point.len() {
        panic!(
            "compute_sections: {} stem points but {} tree indices",
            stems.len(),
            tree_of_point.len()
        );
    }
    let mut points_of_tree = vec![vec![]; num_trees];
    for (point, &tree) in tree_of_point.iter().enumerate() {
        points_of_tree[tree].push(point);
    }

    let rows = points_of_tree
        .into_par_iter()
        .map(|mut points| {
            points.sort_by_key(|&p| FloatOrd(stems.normalized_height(p)));
            let heights = points
                .iter()
                .map(|&p| stems.normalized_height(p))
                .collect::<Vec<_>>();
            sections
                .iter()
                .map(|&lower| {
                    let first = heights.partition_point(|&z0| z0 < lower);
                    let end = heights.partition_point(|&z0| z0 < lower + section_width);
                    let section_points = points[first..end.max(first)]
                        .iter()
                        .map(|&p| stems.position(p).xy())
                        .collect::<Vec<Vector2<f64>>>();
                    fit_section(&section_points, params)
                })
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();

    SectionMatrices {
        sections: sections.to_vec(),
        fits: DMatrix::from_fn(num_trees, sections.len(), |tree, section| {
            rows[tree][section]
        }),
    }
}
