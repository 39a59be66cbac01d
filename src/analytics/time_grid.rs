use crate::error::AppError;
use crate::monitor::types::RunCandle;
use serde::Serialize;
use std::ops::Sub;

/// Index of the grid member nearest to `query`.
///
/// `grid` must be non-empty, ascending and free of duplicates. When `query`
/// sits exactly between two members the later one wins.
fn nearest_index<T>(grid: &[T], query: T) -> usize
where
    T: Copy + PartialOrd + Sub<Output = T>,
{
    let lo = grid.partition_point(|value| *value < query);
    if lo == 0 {
        return 0;
    }
    if lo == grid.len() {
        return grid.len() - 1;
    }

    let left_distance = query - grid[lo - 1];
    let right_distance = grid[lo] - query;
    if left_distance < right_distance {
        lo - 1
    } else {
        lo
    }
}

/// Snaps `query` onto the nearest member of an ascending, deduplicated grid.
///
/// Snapping against an empty grid is a caller bug and fails with
/// [`AppError::EmptyGrid`].
pub fn snap<T>(grid: &[T], query: T) -> Result<T, AppError>
where
    T: Copy + PartialOrd + Sub<Output = T>,
{
    if grid.is_empty() {
        return Err(AppError::EmptyGrid);
    }
    Ok(grid[nearest_index(grid, query)])
}

/// Bar open times of one loaded series, in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TimeGrid {
    times: Vec<i64>,
}

impl TimeGrid {
    pub fn from_open_times<I>(open_times: I) -> Result<Self, AppError>
    where
        I: IntoIterator<Item = i64>,
    {
        let mut times: Vec<i64> = open_times.into_iter().collect();
        times.sort_unstable();
        times.dedup();
        if times.is_empty() {
            return Err(AppError::EmptyGrid);
        }
        Ok(Self { times })
    }

    pub fn from_candles(candles: &[RunCandle]) -> Result<Self, AppError> {
        Self::from_open_times(candles.iter().map(|candle| candle.open_time))
    }

    pub fn snap(&self, query: i64) -> i64 {
        self.times[nearest_index(&self.times, query)]
    }

    pub fn contains(&self, time: i64) -> bool {
        self.times.binary_search(&time).is_ok()
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn as_slice(&self) -> &[i64] {
        &self.times
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snaps_to_strictly_closer_left_neighbor() {
        let grid = [100.0, 110.0, 120.0];
        assert_eq!(snap(&grid, 104.9).expect("grid is non-empty"), 100.0);
    }

    #[test]
    fn exact_tie_resolves_to_later_member() {
        let grid = [100.0, 110.0, 120.0];
        assert_eq!(snap(&grid, 105.0).expect("grid is non-empty"), 110.0);
        assert_eq!(snap(&[100_i64, 110, 120], 115).expect("grid is non-empty"), 120);
    }

    #[test]
    fn clamps_queries_outside_the_grid() {
        let grid = [100_i64, 110, 120];
        assert_eq!(snap(&grid, -5_000).expect("grid is non-empty"), 100);
        assert_eq!(snap(&grid, 9_000).expect("grid is non-empty"), 120);
        assert_eq!(snap(&grid, 110).expect("grid is non-empty"), 110);
    }

    #[test]
    fn empty_grid_is_rejected() {
        let grid: [i64; 0] = [];
        assert!(matches!(snap(&grid, 10), Err(AppError::EmptyGrid)));
        assert!(matches!(
            TimeGrid::from_open_times(Vec::new()),
            Err(AppError::EmptyGrid)
        ));
    }

    #[test]
    fn no_grid_member_is_strictly_closer_than_the_result() {
        let grid = TimeGrid::from_open_times([0, 60_000, 120_000, 180_000, 240_000])
            .expect("grid should build");

        for query in (-30_000..300_000).step_by(7_919) {
            let snapped = grid.snap(query);
            assert!(grid.contains(snapped));
            let best = (snapped - query).abs();
            assert!(grid
                .as_slice()
                .iter()
                .all(|candidate| (candidate - query).abs() >= best));
        }
    }

    #[test]
    fn builds_sorted_deduplicated_grid() {
        let grid = TimeGrid::from_open_times([180_000, 60_000, 120_000, 60_000])
            .expect("grid should build");
        assert_eq!(grid.as_slice(), &[60_000, 120_000, 180_000]);
        assert_eq!(grid.len(), 3);
    }

    #[test]
    fn builds_grid_from_candle_series() {
        let candle = |open_time| RunCandle {
            open_time,
            open: 1.0,
            high: 1.0,
            low: 1.0,
            close: 1.0,
            volume: 0.0,
        };
        let grid = TimeGrid::from_candles(&[candle(120_000), candle(60_000)])
            .expect("grid should build");
        assert_eq!(grid.as_slice(), &[60_000, 120_000]);
        assert!(matches!(TimeGrid::from_candles(&[]), Err(AppError::EmptyGrid)));
    }
}
