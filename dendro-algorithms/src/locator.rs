use dendro_core::{
    math::{median, median_absolute_deviation},
    nalgebra::{DMatrix, Vector3},
};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::axes::TreeAxis;
use crate::sections::SectionMatrices;

/// Normalized height at which the diameter of a tree is measured
pub const BREAST_HEIGHT: f64 = 1.3;
/// Radius differences (in meters) below this are rounding noise of the circle fit
const RADIUS_NOISE: f64 = 1e-9;

/// Parameters of [locate_trees]
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LocatorParams {
    /// Sections with an outlier probability of at least this value are not used
    pub max_outlier_probability: f64,
    /// Sections with at most this percentage of occupied sectors are not used
    pub min_sector_percentage: f64,
    /// Allowed relative radius difference when the breast height section is the first section
    pub lower_boundary_tolerance: f64,
    /// Allowed relative radius difference when the breast height section is the last section
    pub upper_boundary_tolerance: f64,
    /// Radii farther than this many median absolute deviations from the median disagree
    pub mad_factor: f64,
}

impl Default for LocatorParams {
    fn default() -> Self {
        Self {
            max_outlier_probability: 0.3,
            min_sector_percentage: 30.0,
            lower_boundary_tolerance: 0.10,
            upper_boundary_tolerance: 0.15,
            mad_factor: 3.0,
        }
    }
}

/// Where the location of a tree comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationSource {
    /// Center of the circle fitted in the section with the given index
    Section(usize),
    /// The tree axis at breast height
    AxisProjection,
}

/// Diameter at breast height and location of one tree
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TreeLocation {
    /// Diameter at breast height, `None` if it could not be measured reliably
    pub dbh: Option<f64>,
    /// Location of the tree at breast height
    pub position: Vector3<f64>,
    pub source: LocationSource,
}

/// Selects the diameter at breast height and the location of every tree.
///
/// The section closest to breast height is used if it and its direct neighbours (one on each side where
/// they exist) all have a valid circle, a low outlier probability and enough occupied sectors, and if their
/// radii agree. Two radii agree if they differ by at most a tolerance fraction of the larger one, three
/// radii agree if none is more than `mad_factor` median absolute deviations away from their median.
///
/// Otherwise, and always if every section lies above breast height, the tree axis is intersected with
/// breast height and the diameter stays unknown.
pub fn locate_trees(
    matrices: &SectionMatrices,
    outlier_probability: &DMatrix<f64>,
    axes: &[TreeAxis],
    params: &LocatorParams,
) -> Vec<TreeLocation> {
    let sections = &matrices.sections;
    let closest = sections
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f64)>, (index, &height)| {
            let distance = (height - BREAST_HEIGHT).abs();
            match best {
                Some((_, best_distance)) if best_distance <= distance => best,
                _ => Some((index, distance)),
            }
        })
        .map(|(index, _)| index);
    let reaches_breast_height = sections.iter().any(|&s| s <= BREAST_HEIGHT);

    axes.iter()
        .enumerate()
        .map(|(tree, axis)| {
            let measured = match closest {
                Some(section) if reaches_breast_height => {
                    measure_at_section(matrices, outlier_probability, tree, section, axis, params)
                }
                _ => None,
            };
            measured.unwrap_or_else(|| TreeLocation {
                dbh: None,
                position: axis.point_at_normalized_height(BREAST_HEIGHT),
                source: LocationSource::AxisProjection,
            })
        })
        .collect()
}

fn measure_at_section(
    matrices: &SectionMatrices,
    outlier_probability: &DMatrix<f64>,
    tree: usize,
    section: usize,
    axis: &TreeAxis,
    params: &LocatorParams,
) -> Option<TreeLocation> {
    let last = matrices.num_sections() - 1;
    let candidates = section.saturating_sub(1)..=(section + 1).min(last);

    let mut radii = vec![];
    for candidate in candidates {
        let circle = matrices.fits[(tree, candidate)].circle()?;
        let valid = circle.circle.radius > 0.0
            && outlier_probability[(tree, candidate)] < params.max_outlier_probability
            && circle.sector_occupancy.percentage > params.min_sector_percentage;
        if !valid {
            return None;
        }
        radii.push(circle.circle.radius);
    }

    let agree = match radii.len() {
        2 => {
            let tolerance = if section == 0 {
                params.lower_boundary_tolerance
            } else {
                params.upper_boundary_tolerance
            };
            (radii[0] - radii[1]).abs() <= tolerance * radii[0].max(radii[1])
        }
        3 => {
            let center = median(&radii)?;
            let limit = params.mad_factor * median_absolute_deviation(&radii)? + RADIUS_NOISE;
            radii.iter().all(|r| (r - center).abs() <= limit)
        }
        _ => true,
    };
    if !agree {
        return None;
    }

    let circle = matrices.fits[(tree, section)].circle()?.circle;
    Some(TreeLocation {
        dbh: Some(2.0 * circle.radius),
        position: Vector3::new(
            circle.center.x,
            circle.center.y,
            axis.height_offset + BREAST_HEIGHT,
        ),
        source: LocationSource::Section(section),
    })
}
