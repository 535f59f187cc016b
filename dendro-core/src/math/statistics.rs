use float_ord::FloatOrd;

/// Returns a sorted copy of `values`. NaN values sort as the largest values
pub fn sorted(values: &[f64]) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by_key(|v| FloatOrd(*v));
    sorted
}

/// Computes the `q`-th quantile of the already sorted slice `sorted_values`, interpolating linearly
/// between the two closest ranks. Returns `None` for an empty slice.
///
/// # Panics
///
/// Panics if `q` is not within `[0, 1]`
///
/// ```
/// # use dendro_core::math::quantile_sorted;
/// assert_eq!(quantile_sorted(&[1.0, 2.0, 3.0, 4.0], 0.25), Some(1.75));
/// assert_eq!(quantile_sorted(&[], 0.5), None);
/// ```
pub fn quantile_sorted(sorted_values: &[f64], q: f64) -> Option<f64> {
    if !(0.0..=1.0).contains(&q) {
        panic!("quantile_sorted: q must be within [0, 1], got {}", q);
    }
    if sorted_values.is_empty() {
        return None;
    }
    let rank = q * (sorted_values.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let fraction = rank - lower as f64;
    Some(sorted_values[lower] + (sorted_values[upper] - sorted_values[lower]) * fraction)
}

/// Computes the `q`-th quantile of `values` (see [quantile_sorted])
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    quantile_sorted(&sorted(values), q)
}

/// Median of `values`, `None` if `values` is empty
pub fn median(values: &[f64]) -> Option<f64> {
    quantile(values, 0.5)
}

/// Median absolute deviation of `values` around their median
///
/// ```
/// # use dendro_core::math::median_absolute_deviation;
/// assert_eq!(median_absolute_deviation(&[1.0, 2.0, 4.0]), Some(1.0));
/// ```
pub fn median_absolute_deviation(values: &[f64]) -> Option<f64> {
    let center = median(values)?;
    let deviations = values.iter().map(|v| (v - center).abs()).collect::<Vec<_>>();
    median(&deviations)
}

/// Flags every value outside of `[Q1 - range * IQR, Q3 + range * IQR]`. NaN values are never flagged.
/// The usual choice for `range` is 1.5
pub fn iqr_outliers(values: &[f64], range: f64) -> Vec<bool> {
    iqr_outliers_with_tolerance(values, range, 0.0)
}

/// Like [iqr_outliers], but a value is only flagged if it lies more than `tolerance` outside of the
/// interval. This keeps rounding noise from being flagged when all values are (nearly) equal
///
/// ```
/// # use dendro_core::math::iqr_outliers_with_tolerance;
/// let values = [1.0, 1.0, 1.0 + 1e-15, 1.0];
/// assert_eq!(iqr_outliers_with_tolerance(&values, 1.5, 1e-9), vec![false; 4]);
/// ```
pub fn iqr_outliers_with_tolerance(values: &[f64], range: f64, tolerance: f64) -> Vec<bool> {
    let sorted_values = sorted(values);
    let (q1, q3) = match (
        quantile_sorted(&sorted_values, 0.25),
        quantile_sorted(&sorted_values, 0.75),
    ) {
        (Some(q1), Some(q3)) => (q1, q3),
        _ => return vec![],
    };
    let iqr = q3 - q1;
    let lower = q1 - range * iqr - tolerance;
    let upper = q3 + range * iqr + tolerance;
    values.iter().map(|v| *v < lower || *v > upper).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantile_interpolates_linearly() {
        let values = [4.0, 1.0, 3.0, 2.0, 5.0];
        assert_eq!(quantile(&values, 0.0), Some(1.0));
        assert_eq!(quantile(&values, 1.0), Some(5.0));
        assert_eq!(quantile(&values, 0.5), Some(3.0));
        assert_eq!(quantile(&values, 0.25), Some(2.0));
        assert_eq!(quantile(&values, 0.625), Some(3.5));
        assert_eq!(median(&[2.0, 1.0]), Some(1.5));
    }

    #[test]
    #[should_panic(expected = "q must be within [0, 1]")]
    fn test_quantile_rejects_invalid_q() {
        quantile(&[1.0], 1.5);
    }

    #[test]
    fn test_iqr_outliers() {
        let values = [1.0, 1.1, 0.9, 1.0, 1.05, 10.0];
        let flags = iqr_outliers(&values, 1.5);
        assert_eq!(flags, vec![false, false, false, false, false, true]);
    }

    #[test]
    fn test_iqr_outliers_constant_values() {
        let flags = iqr_outliers(&[2.0, 2.0, 2.0], 1.5);
        assert!(flags.iter().all(|flag| !flag));
        let flags = iqr_outliers_with_tolerance(&[2.0, 2.0, 2.0, 2.5], 1.5, 0.1);
        assert_eq!(flags, vec![false, false, false, true]);
        let flags = iqr_outliers_with_tolerance(&[2.0, 2.0, 2.0, 2.05], 1.5, 0.1);
        assert!(flags.iter().all(|flag| !flag));
        assert!(iqr_outliers(&[], 1.5).is_empty());
    }

    #[test]
    fn test_mad_of_empty_slice() {
        assert_eq!(median_absolute_deviation(&[]), None);
        assert_eq!(median_absolute_deviation(&[3.0, 3.0, 3.0]), Some(0.0));
    }
}
