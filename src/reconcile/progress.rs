use crate::analytics::histogram::{bin_values, HistogramBin};
use crate::analytics::rolling::is_converged;
use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerationSample {
    pub generation: u32,
    pub best: f64,
    pub avg: f64,
    pub worst: f64,
}

/// Per-run fitness history fed by progress pushes.
#[derive(Debug, Clone, Default)]
pub struct ProgressHistory {
    runs: HashMap<String, Vec<GenerationSample>>,
}

impl ProgressHistory {
    /// Appends `sample` when its generation is newer than the last one seen
    /// for `run_id`. Redelivered or out-of-order generations return `false`.
    pub fn record(&mut self, run_id: &str, sample: GenerationSample) -> bool {
        let samples = self.runs.entry(run_id.to_string()).or_default();
        if samples
            .last()
            .is_some_and(|last| sample.generation <= last.generation)
        {
            return false;
        }
        samples.push(sample);
        true
    }

    pub fn samples(&self, run_id: &str) -> &[GenerationSample] {
        self.runs.get(run_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn best_history(&self, run_id: &str) -> Vec<f64> {
        self.samples(run_id).iter().map(|sample| sample.best).collect()
    }

    pub fn is_converged(&self, run_id: &str, window: usize, threshold: f64) -> bool {
        is_converged(&self.best_history(run_id), window, threshold)
    }

    pub fn fitness_histogram(
        &self,
        run_id: &str,
        min: f64,
        max: f64,
        step: f64,
    ) -> Result<Vec<HistogramBin>, AppError> {
        bin_values(&self.best_history(run_id), min, max, step)
    }

    /// Drops runs that are no longer being monitored.
    pub fn retain_runs<'a, I>(&mut self, live_run_ids: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        let keep: Vec<&str> = live_run_ids.into_iter().collect();
        self.runs.retain(|run_id, _| keep.contains(&run_id.as_str()));
    }
}
