use statrs::statistics::Statistics;

use crate::error::{Error, Result};

/// Checks that a numerical hyperparameter lies in the interval `[a,b]`
///
/// ### Example
/// ```
/// # use classic_rl::util::check_interval;
/// assert!(check_interval("gamma", 0.9, 0.0, 1.0).is_ok());
/// assert!(check_interval("gamma", 2.0, 0.0, 1.0).is_err());
/// ```
pub fn check_interval(name: &str, value: f64, a: f64, b: f64) -> Result<()> {
    if value >= a && value <= b {
        Ok(())
    } else {
        Err(Error::InvalidConfig(format!(
            "`{name}` is {value}, must be in the interval [{a}, {b}]"
        )))
    }
}

/// Checks that a count-like hyperparameter is nonzero
pub fn check_positive(name: &str, value: usize) -> Result<()> {
    if value > 0 {
        Ok(())
    } else {
        Err(Error::InvalidConfig(format!("`{name}` must be positive")))
    }
}

/// The `q`-th percentile of `values`, `q` given as a fraction in `[0, 1]`
///
/// Interpolates linearly between the two closest ranks, so the 0th and 100th
/// percentiles are the minimum and maximum. Returns `NaN` for an empty slice.
pub fn percentile(values: &[f32], q: f32) -> f32 {
    if values.is_empty() {
        return f32::NAN;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f32::total_cmp);

    let rank = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f32;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f32)
}

/// Arithmetic mean, `NaN` when empty
pub fn mean(values: &[f32]) -> f32 {
    values.iter().map(|&x| x as f64).mean() as f32
}

/// Mean of the last `n` values (or all of them if there are fewer)
pub fn tail_mean(values: &[f32], n: usize) -> f32 {
    let start = values.len().saturating_sub(n);
    mean(&values[start..])
}

/// Least-squares line through `(i, ys[i])`
///
/// **Returns** `(slope, intercept)`, or `None` with fewer than two points
pub fn linear_fit(ys: &[f32]) -> Option<(f64, f64)> {
    if ys.len() < 2 {
        return None;
    }

    let xs = (0..ys.len()).map(|i| i as f64).collect::<Vec<_>>();
    let ys = ys.iter().map(|&y| y as f64).collect::<Vec<_>>();

    let slope = xs.iter().covariance(ys.iter()) / xs.iter().variance();
    let intercept = ys.iter().mean() - slope * xs.iter().mean();
    Some((slope, intercept))
}

/// Index of the first maximum, as numpy's `argmax` picks it
pub fn argmax(values: &[f32]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |(best_ix, best), (ix, &v)| {
            if v > best {
                (ix, v)
            } else {
                (best_ix, best)
            }
        })
        .0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_interval_functional() {
        assert!(check_interval("x", 0.0, 0.0, 1.0).is_ok());
        assert!(check_interval("x", 1.0, 0.0, 1.0).is_ok());
        assert!(check_interval("x", -0.1, 0.0, 1.0).is_err());
        assert!(check_interval("x", f64::NAN, 0.0, 1.0).is_err());
        assert!(check_positive("n", 0).is_err());
    }

    #[test]
    fn percentile_interpolates() {
        let values = [4.0, 1.0, 3.0, 2.0];
        assert_eq!(percentile(&values, 0.0), 1.0);
        assert_eq!(percentile(&values, 1.0), 4.0);
        assert_eq!(percentile(&values, 0.5), 2.5);
        assert_eq!(percentile(&values, 0.75), 3.25);
        assert_eq!(percentile(&[7.0], 0.3), 7.0);
        assert!(percentile(&[], 0.5).is_nan());
    }

    #[test]
    fn tail_mean_uses_window() {
        let values = [100.0, 1.0, 2.0, 3.0];
        assert_eq!(tail_mean(&values, 3), 2.0);
        assert_eq!(tail_mean(&values, 10), 26.5);
        assert_eq!(mean(&[2.0, 4.0]), 3.0);
    }

    #[test]
    fn linear_fit_recovers_line() {
        let ys = [1.0, 3.0, 5.0, 7.0];
        let (slope, intercept) = linear_fit(&ys).unwrap();
        assert!((slope - 2.0).abs() < 1e-9);
        assert!((intercept - 1.0).abs() < 1e-9);
        assert!(linear_fit(&[1.0]).is_none());
    }

    #[test]
    fn argmax_picks_first_maximum() {
        assert_eq!(argmax(&[0.0, 2.0, 2.0, 1.0]), 1);
        assert_eq!(argmax(&[0.0, 0.0]), 0);
    }
}
