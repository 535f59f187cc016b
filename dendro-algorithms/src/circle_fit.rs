use std::f64::consts::PI;

use dendro_core::nalgebra::{Matrix2, Vector2};
use itertools::Itertools;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::clustering::{largest_cluster, single_linkage};

const MAX_ITERATIONS: usize = 100;
const MAX_DAMPING: f64 = 1e12;

/// A circle in the XY plane
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Circle {
    pub center: Vector2<f64>,
    pub radius: f64,
}

/// Fits a circle to `points` by minimizing the variance of the distances of the points to a free center.
///
/// The center starts at the barycenter of the points and is refined with Levenberg-Marquardt iterations;
/// the radius is the mean distance of the points to the final center. Returns `None` for less than three
/// points or if the fit does not produce finite values.
pub fn fit_circle(points: &[Vector2<f64>]) -> Option<Circle> {
    if points.len() < 3 {
        return None;
    }
    let mut center = points.iter().sum::<Vector2<f64>>() / points.len() as f64;
    let mut cost = radial_variance(points, &center);
    let mut damping = 1e-3;

    for _ in 0..MAX_ITERATIONS {
        let (normal_matrix, gradient) = normal_equations(points, &center);
        let mut improved = false;
        while damping < MAX_DAMPING {
            let damped = normal_matrix
                + Matrix2::from_diagonal(&normal_matrix.diagonal()) * damping
                + Matrix2::identity() * f64::EPSILON;
            let step = match damped.try_inverse() {
                Some(inverse) => -(inverse * gradient),
                None => break,
            };
            let candidate = center + step;
            let candidate_cost = radial_variance(points, &candidate);
            if candidate_cost < cost {
                let converged = step.norm() <= 1e-12 * (1.0 + center.norm());
                center = candidate;
                cost = candidate_cost;
                damping = (damping / 10.0).max(1e-12);
                improved = !converged;
                break;
            }
            damping *= 10.0;
        }
        if !improved {
            break;
        }
    }

    let radius = points.iter().map(|p| (p - center).norm()).sum::<f64>() / points.len() as f64;
    if center.iter().all(|c| c.is_finite()) && radius.is_finite() {
        Some(Circle { center, radius })
    } else {
        None
    }
}

fn radial_variance(points: &[Vector2<f64>], center: &Vector2<f64>) -> f64 {
    let radii = points.iter().map(|p| (p - center).norm()).collect::<Vec<_>>();
    let mean = radii.iter().sum::<f64>() / radii.len() as f64;
    radii.iter().map(|r| (r - mean).powi(2)).sum()
}

/// `J^T J` and `J^T f` for the residuals `f_i = r_i - mean(r)`
fn normal_equations(points: &[Vector2<f64>], center: &Vector2<f64>) -> (Matrix2<f64>, Vector2<f64>) {
    let radii = points.iter().map(|p| (p - center).norm()).collect::<Vec<_>>();
    let gradients = points
        .iter()
        .zip(radii.iter())
        .map(|(p, &r)| {
            if r > f64::EPSILON {
                -(p - center) / r
            } else {
                Vector2::zeros()
            }
        })
        .collect::<Vec<_>>();
    let n = points.len() as f64;
    let mean_radius = radii.iter().sum::<f64>() / n;
    let mean_gradient = gradients.iter().sum::<Vector2<f64>>() / n;

    let mut normal_matrix = Matrix2::zeros();
    let mut gradient = Vector2::zeros();
    for (g, r) in gradients.iter().zip(radii.iter()) {
        let row = g - mean_gradient;
        normal_matrix += row * row.transpose();
        gradient += row * (r - mean_radius);
    }
    (normal_matrix, gradient)
}

/// Number of points closer to the center of `circle` than `proportion` times its radius
pub fn inner_circle_count(points: &[Vector2<f64>], circle: &Circle, proportion: f64) -> usize {
    let limit = circle.radius * proportion;
    points
        .iter()
        .filter(|p| (*p - circle.center).norm() < limit)
        .count()
}

/// Occupancy of the angular sectors around a circle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SectorOccupancy {
    /// Number of sectors that contain at least one point
    pub occupied: usize,
    /// Occupied sectors as a percentage of all sectors
    pub percentage: f64,
}

/// Splits the ring `(radius - width, radius + width)` around `circle` into `num_sectors` equal angular
/// sectors and counts the sectors that contain at least one of `points`
pub fn sector_occupancy(
    points: &[Vector2<f64>],
    circle: &Circle,
    num_sectors: usize,
    width: f64,
) -> SectorOccupancy {
    if num_sectors == 0 {
        return SectorOccupancy {
            occupied: 0,
            percentage: 0.0,
        };
    }
    let sector_angle = 2.0 * PI / num_sectors as f64;
    let occupied = points
        .iter()
        .map(|p| p - circle.center)
        .filter(|offset| {
            let distance = offset.norm();
            distance > circle.radius - width && distance < circle.radius + width
        })
        .map(|offset| {
            let sector = ((offset.y.atan2(offset.x) + PI) / sector_angle).floor() as usize;
            sector.min(num_sectors - 1)
        })
        .unique()
        .count();
    SectorOccupancy {
        occupied,
        percentage: occupied as f64 * 100.0 / num_sectors as f64,
    }
}

/// Parameters for fitting the circle of one section, see [fit_section]
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CircleFitParams {
    /// Sections with at most this many points are not fitted
    pub min_points: usize,
    /// Points closer to the center than this proportion of the radius are inner points
    pub inner_proportion: f64,
    /// Fits with more inner points than this fail
    pub max_inner_points: usize,
    pub min_radius: f64,
    pub max_radius: f64,
    pub num_sectors: usize,
    /// Fits with less occupied sectors than this fail
    pub min_occupied_sectors: usize,
    /// Half width of the ring used for the sector occupancy
    pub circle_width: f64,
    /// Largest gap between two points of the same cluster when a failed fit is retried
    pub max_point_gap: f64,
}

/// A fitted circle and its quality measures
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SectionCircle {
    pub circle: Circle,
    pub inner_points: usize,
    pub sector_occupancy: SectorOccupancy,
}

/// Outcome of fitting the circle of one section
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SectionFit {
    /// The first fit passed all checks
    Fitted(SectionCircle),
    /// The first fit failed, the fit on the largest cluster of points passed
    RetriedFitted(SectionCircle),
    /// Both fits failed. The circle of the second fit is kept for inspection
    RetriedRejected(SectionCircle),
    /// Not enough points in the section
    RejectedSmall,
    /// The first fit failed and the largest cluster of points was too small for a second fit
    RejectedRetrySmall,
}

impl SectionFit {
    /// The fitted circle, if a circle was fitted at all
    pub fn circle(&self) -> Option<&SectionCircle> {
        match self {
            SectionFit::Fitted(circle)
            | SectionFit::RetriedFitted(circle)
            | SectionFit::RetriedRejected(circle) => Some(circle),
            SectionFit::RejectedSmall | SectionFit::RejectedRetrySmall => None,
        }
    }

    /// Radius of the fit, 0 if there is none
    pub fn radius(&self) -> f64 {
        self.circle().map(|c| c.circle.radius).unwrap_or(0.0)
    }

    /// 0 if a fit passed, 1 if the retry failed, 2 if the section was too small
    pub fn review_code(&self) -> u8 {
        match self {
            SectionFit::Fitted(_) | SectionFit::RetriedFitted(_) => 0,
            SectionFit::RetriedRejected(_) | SectionFit::RejectedRetrySmall => 1,
            SectionFit::RejectedSmall => 2,
        }
    }

    /// 0 if no retry was needed, 1 if the fit was retried, 2 if the section was too small
    pub fn retry_code(&self) -> u8 {
        match self {
            SectionFit::Fitted(_) => 0,
            SectionFit::RetriedFitted(_)
            | SectionFit::RetriedRejected(_)
            | SectionFit::RejectedRetrySmall => 1,
            SectionFit::RejectedSmall => 2,
        }
    }
}

impl Default for SectionFit {
    fn default() -> Self {
        SectionFit::RejectedSmall
    }
}

/// Fits the circle of one section to its XY `points`.
///
/// A fit fails if it has too many inner points, a radius outside of the allowed range or too few occupied
/// sectors. A failed first fit is retried once on the largest single-linkage cluster of the points,
/// which removes branches and other clutter that is not connected to the stem.
pub fn fit_section(points: &[Vector2<f64>], params: &CircleFitParams) -> SectionFit {
    if points.len() <= params.min_points {
        return SectionFit::RejectedSmall;
    }
    if let Some((circle, true)) = checked_fit(points, params) {
        return SectionFit::Fitted(circle);
    }

    let labels = single_linkage(points, params.max_point_gap);
    let cluster = largest_cluster(&labels)
        .into_iter()
        .map(|index| points[index])
        .collect::<Vec<_>>();
    if cluster.len() <= params.min_points {
        return SectionFit::RejectedRetrySmall;
    }
    match checked_fit(&cluster, params) {
        Some((circle, true)) => SectionFit::RetriedFitted(circle),
        Some((circle, false)) => SectionFit::RetriedRejected(circle),
        None => SectionFit::RejectedRetrySmall,
    }
}

fn checked_fit(points: &[Vector2<f64>], params: &CircleFitParams) -> Option<(SectionCircle, bool)> {
    let circle = fit_circle(points)?;
    let inner_points = inner_circle_count(points, &circle, params.inner_proportion);
    let sector_occupancy =
        sector_occupancy(points, &circle, params.num_sectors, params.circle_width);
    let passed = inner_points <= params.max_inner_points
        && circle.radius >= params.min_radius
        && circle.radius <= params.max_radius
        && sector_occupancy.occupied >= params.min_occupied_sectors;
    Some((
        SectionCircle {
            circle,
            inner_points,
            sector_occupancy,
        },
        passed,
    ))
}
