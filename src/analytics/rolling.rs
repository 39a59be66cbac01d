use serde::{Deserialize, Serialize};

/// Trading days per year used to annualize the rolling ratio.
pub const ANNUALIZATION_FACTOR: f64 = 252.0;
pub const DEFAULT_CONVERGENCE_WINDOW: usize = 5;
pub const DEFAULT_CONVERGENCE_THRESHOLD: f64 = 0.001;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SeriesPoint {
    pub t: i64,
    pub value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollingRatioArgs {
    pub points: Vec<SeriesPoint>,
    pub window: usize,
}

/// Period-over-period relative changes; `returns[j]` is the change into
/// `points[j + 1]`. A zero base yields a zero return.
pub fn period_returns(points: &[SeriesPoint]) -> Vec<f64> {
    points
        .windows(2)
        .map(|pair| {
            let previous = pair[0].value;
            if previous == 0.0 {
                0.0
            } else {
                (pair[1].value - previous) / previous
            }
        })
        .collect()
}

/// Population mean and population standard deviation.
pub fn population_mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let count = values.len() as f64;
    let mean = values.iter().sum::<f64>() / count;
    let variance = values
        .iter()
        .map(|value| (value - mean).powi(2))
        .sum::<f64>()
        / count;
    (mean, variance.sqrt())
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10_f64.powi(decimals);
    (value * scale).round() / scale
}

/// Annualized rolling mean/std ratio of period returns.
///
/// Each output point carries the timestamp of the point whose return closes
/// the window, so the first value appears at index `window`. Fewer than
/// `window + 1` points produce nothing.
pub fn rolling_ratio(points: &[SeriesPoint], window: usize) -> Vec<SeriesPoint> {
    if window == 0 || points.len() < window + 1 {
        return Vec::new();
    }

    let returns = period_returns(points);
    let annualization = ANNUALIZATION_FACTOR.sqrt();

    (window..points.len())
        .map(|closing_index| {
            let trailing = &returns[closing_index - window..closing_index];
            let (mean, std_dev) = population_mean_std(trailing);
            let ratio = if std_dev == 0.0 {
                0.0
            } else {
                (mean / std_dev) * annualization
            };
            SeriesPoint {
                t: points[closing_index].t,
                value: round_to(ratio, 3),
            }
        })
        .collect()
}

/// True once best fitness moved less than `threshold` between the two ends of
/// the trailing `window`.
///
/// Only the endpoints are compared, so a value that oscillates inside the
/// window and returns to where it started also counts as converged.
pub fn is_converged(best_history: &[f64], window: usize, threshold: f64) -> bool {
    if window == 0 || best_history.len() < window + 1 {
        return false;
    }
    let last = best_history.len() - 1;
    let window_start = last + 1 - window;
    (best_history[last] - best_history[window_start]).abs() < threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(values: &[f64]) -> Vec<SeriesPoint> {
        values
            .iter()
            .enumerate()
            .map(|(index, value)| SeriesPoint {
                t: 1_000 * index as i64,
                value: *value,
            })
            .collect()
    }

    #[test]
    fn first_ratio_appears_at_window_index() {
        // Returns: +1%, +2%, -1%, +3%.
        let points = series(&[100.0, 101.0, 103.02, 101.9898, 105.049494]);
        let ratios = rolling_ratio(&points, 2);

        assert_eq!(ratios.len(), 3);
        assert_eq!(ratios[0].t, points[2].t);
        assert_eq!(ratios[2].t, points[4].t);
    }

    #[test]
    fn needs_window_plus_one_points() {
        let points = series(&[100.0, 101.0]);
        assert!(rolling_ratio(&points, 2).is_empty());
        assert_eq!(rolling_ratio(&series(&[100.0, 101.0, 102.0]), 2).len(), 1);
        assert!(rolling_ratio(&points, 0).is_empty());
    }

    #[test]
    fn uses_population_std_and_annualizes() {
        // Returns 1% and 3%: mean 2%, population std 1%.
        let points = series(&[100.0, 101.0, 104.03]);
        let ratios = rolling_ratio(&points, 2);

        assert_eq!(ratios.len(), 1);
        assert_eq!(ratios[0].value, 31.749);
    }

    #[test]
    fn flat_window_yields_zero() {
        let points = series(&[100.0, 100.0, 100.0, 100.0]);
        let ratios = rolling_ratio(&points, 2);
        assert!(ratios.iter().all(|point| point.value == 0.0));
    }

    #[test]
    fn zero_base_contributes_zero_return() {
        let returns = period_returns(&series(&[0.0, 50.0, 100.0]));
        assert_eq!(returns, vec![0.0, 1.0]);
    }

    #[test]
    fn convergence_compares_window_endpoints() {
        let history = [1.0, 1.0004, 1.0007, 1.0009, 1.00095, 1.00098];
        assert!(is_converged(
            &history,
            DEFAULT_CONVERGENCE_WINDOW,
            DEFAULT_CONVERGENCE_THRESHOLD
        ));

        let improving = [1.0, 1.1, 1.2, 1.3, 1.4, 1.5];
        assert!(!is_converged(&improving, 5, 0.001));
    }

    #[test]
    fn convergence_requires_window_plus_one_samples() {
        let history = [1.0, 1.0, 1.0, 1.0, 1.0];
        assert!(!is_converged(&history, 5, 0.001));
        assert!(is_converged(&[1.0, 1.0, 1.0, 1.0, 1.0, 1.0], 5, 0.001));
    }

    #[test]
    fn oscillating_history_counts_as_converged() {
        let history = [0.5, 1.0, 1.3, 0.7, 1.2, 1.0];
        assert!(is_converged(&history, 5, 0.001));
    }
}
