use crate::error::AppError;
use serde::{Deserialize, Serialize};

/// Upper bound on bins per histogram.
pub const MAX_HISTOGRAM_BINS: usize = 10_000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HistogramBin {
    pub range_label: String,
    pub center: f64,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistogramArgs {
    pub values: Vec<f64>,
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

fn bound_label(value: f64) -> String {
    let rounded = (value * 1e6).round() / 1e6;
    if rounded == 0.0 {
        return "0".to_string();
    }
    format!("{rounded}")
}

/// Partitions `values` into `ceil((max - min) / step)` fixed-width bins
/// starting at `min`.
///
/// Values below `min` count toward the first bin and values at or above `max`
/// toward the last, so every finite or infinite input is counted. NaN has no
/// position on the axis and is skipped.
///
/// Bounds whose bin count is not finite, below one, or above
/// [`MAX_HISTOGRAM_BINS`] are rejected.
pub fn bin_values(
    values: &[f64],
    min: f64,
    max: f64,
    step: f64,
) -> Result<Vec<HistogramBin>, AppError> {
    if !min.is_finite() || !max.is_finite() || !step.is_finite() {
        return Err(AppError::InvalidArgument(
            "histogram bounds and step must be finite".to_string(),
        ));
    }
    if step <= 0.0 || max <= min {
        return Err(AppError::InvalidArgument(
            "histogram requires step > 0 and max > min".to_string(),
        ));
    }

    let span_in_steps = ((max - min) / step).ceil();
    if !span_in_steps.is_finite() || span_in_steps < 1.0 {
        return Err(AppError::InvalidArgument(format!(
            "histogram range {min}..{max} with step {step} yields no usable bins"
        )));
    }
    if span_in_steps > MAX_HISTOGRAM_BINS as f64 {
        return Err(AppError::InvalidArgument(format!(
            "histogram would need {span_in_steps} bins; at most {MAX_HISTOGRAM_BINS} allowed"
        )));
    }

    let bin_count = span_in_steps as usize;
    let last_index = bin_count - 1;
    let mut counts = vec![0_u64; bin_count];

    for &value in values {
        if value.is_nan() {
            continue;
        }
        let raw_index = ((value - min) / step).floor();
        let index = raw_index.clamp(0.0, last_index as f64) as usize;
        counts[index] += 1;
    }

    Ok(counts
        .into_iter()
        .enumerate()
        .map(|(index, count)| {
            let lower = min + index as f64 * step;
            let upper = lower + step;
            HistogramBin {
                range_label: format!("{} to {}", bound_label(lower), bound_label(upper)),
                center: lower + step / 2.0,
                count,
            }
        })
        .collect())
}
