use dendro_core::{
    math::{iqr_outliers_with_tolerance, median},
    nalgebra::{DMatrix, Vector2},
};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Range factor of the interquartile range test
const IQR_RANGE: f64 = 1.5;
/// Tilts (in degrees) that differ by less than this are equal for the outlier tests, so rounding noise between
/// the centers of a straight stem is no outlier
const TILT_TOLERANCE: f64 = 1e-6;

/// Weights of the two outlier tests in [outlier_probability]
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OutlierWeights {
    /// Weight of the test on the summed tilt of a section against all others
    pub absolute: f64,
    /// Weight of the test of a section within the tilts seen from one other section
    pub relative: f64,
}

impl Default for OutlierWeights {
    fn default() -> Self {
        Self {
            absolute: 3.0,
            relative: 1.0,
        }
    }
}

/// Computes the probability of every section center being an outlier of its tree.
///
/// For every tree, the valid sections (radius > 0) are compared pairwise: the tilt between two sections is
/// the angle from vertical (in degrees) of the line through their centers. A section is an absolute outlier
/// if the sum of its tilts to all other sections is an outlier (interquartile range test) among these sums.
/// Additionally, every row of the tilt matrix is tested on its own, with the undefined diagonal replaced
/// by the median of the row; every row in which a section is an outlier adds to its probability.
///
/// With `n` valid sections, the absolute test has the weight `absolute / (n * relative + absolute)` and
/// each row test the weight `relative / (n * relative + absolute)`, so the probability is at most 1.
/// Trees with less than two valid sections get 0 everywhere.
pub fn outlier_probability(
    center_x: &DMatrix<f64>,
    center_y: &DMatrix<f64>,
    radius: &DMatrix<f64>,
    sections: &[f64],
    weights: &OutlierWeights,
) -> DMatrix<f64> {
    let mut probability = DMatrix::zeros(radius.nrows(), radius.ncols());
    for tree in 0..radius.nrows() {
        let valid = (0..radius.ncols())
            .filter(|&section| radius[(tree, section)] > 0.0)
            .collect::<Vec<_>>();
        let n = valid.len();
        if n < 2 {
            continue;
        }
        let centers = valid
            .iter()
            .map(|&s| Vector2::new(center_x[(tree, s)], center_y[(tree, s)]))
            .collect::<Vec<_>>();
        let tilt = DMatrix::from_fn(n, n, |j, k| {
            if j == k {
                return f64::NAN;
            }
            let horizontal = (centers[j] - centers[k]).norm();
            let vertical = (sections[valid[j]] - sections[valid[k]]).abs();
            (horizontal / vertical).atan().to_degrees()
        });

        let normalization = n as f64 * weights.relative + weights.absolute;
        let absolute_weight = weights.absolute / normalization;
        let relative_weight = weights.relative / normalization;

        let tilt_sums = (0..n)
            .map(|k| tilt.column(k).iter().filter(|t| !t.is_nan()).sum::<f64>())
            .collect::<Vec<_>>();
        let absolute_outliers =
            iqr_outliers_with_tolerance(&tilt_sums, IQR_RANGE, TILT_TOLERANCE);
        for (index, outlier) in absolute_outliers.into_iter().enumerate() {
            if outlier {
                probability[(tree, valid[index])] += absolute_weight;
            }
        }

        for j in 0..n {
            let mut row = tilt.row(j).iter().copied().collect::<Vec<_>>();
            let others = row
                .iter()
                .copied()
                .filter(|t| !t.is_nan())
                .collect::<Vec<_>>();
            row[j] = median(&others).unwrap_or(0.0);
            let relative_outliers = iqr_outliers_with_tolerance(&row, IQR_RANGE, TILT_TOLERANCE);
            for (index, outlier) in relative_outliers.into_iter().enumerate() {
                if outlier {
                    probability[(tree, valid[index])] += relative_weight;
                }
            }
        }
    }
    probability
}
