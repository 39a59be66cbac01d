use crate::analytics::histogram::{bin_values, HistogramArgs, HistogramBin};
use crate::analytics::markers::{place_markers, Marker};
use crate::analytics::rolling::{rolling_ratio as rolling_ratio_series, RollingRatioArgs, SeriesPoint};
use crate::analytics::time_grid::TimeGrid;
use crate::error::AppError;
use crate::monitor::types::{RunCandle, RunChartMarkersArgs};
use crate::state::AppState;

pub fn build_run_markers(
    candles: &[RunCandle],
    args: &RunChartMarkersArgs,
) -> Result<Vec<Marker>, AppError> {
    let grid = TimeGrid::from_candles(candles)?;
    Ok(place_markers(&grid, &args.trades))
}

pub async fn run_chart_markers_with(
    state: &AppState,
    args: RunChartMarkersArgs,
) -> Result<Vec<Marker>, AppError> {
    let api = state.api_client().await?;
    let candles = api.fetch_run_candles(&args.run_id).await?;
    build_run_markers(&candles, &args)
}

pub fn build_rolling_ratio(args: &RollingRatioArgs) -> Result<Vec<SeriesPoint>, AppError> {
    if args.window == 0 {
        return Err(AppError::InvalidArgument(
            "rolling window must be at least 1".to_string(),
        ));
    }
    Ok(rolling_ratio_series(&args.points, args.window))
}

pub fn build_value_histogram(args: &HistogramArgs) -> Result<Vec<HistogramBin>, AppError> {
    bin_values(&args.values, args.min, args.max, args.step)
}

#[cfg(feature = "desktop")]
#[tauri::command]
pub async fn run_chart_markers(
    state: tauri::State<'_, AppState>,
    args: RunChartMarkersArgs,
) -> Result<Vec<Marker>, AppError> {
    run_chart_markers_with(&state, args).await
}

#[cfg(feature = "desktop")]
#[tauri::command]
pub fn rolling_ratio(args: RollingRatioArgs) -> Result<Vec<SeriesPoint>, AppError> {
    build_rolling_ratio(&args)
}

#[cfg(feature = "desktop")]
#[tauri::command]
pub fn value_histogram(args: HistogramArgs) -> Result<Vec<HistogramBin>, AppError> {
    build_value_histogram(&args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::markers::{MarkerKind, TradeEvent, TradeSide};

    fn candle(open_time: i64) -> RunCandle {
        RunCandle {
            open_time,
            open: 100.0,
            high: 101.0,
            low: 99.0,
            close: 100.5,
            volume: 3.0,
        }
    }

    #[test]
    fn markers_land_on_loaded_bars() {
        let args = RunChartMarkersArgs {
            run_id: "run-1".to_string(),
            trades: vec![TradeEvent {
                time: 61_000,
                kind: MarkerKind::Entry,
                side: TradeSide::Buy,
                label: "L".to_string(),
            }],
        };
        let markers = build_run_markers(&[candle(0), candle(60_000), candle(120_000)], &args)
            .expect("markers should build");

        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].snapped_time, 60_000);
        assert_eq!(markers[0].event_time, 61_000);
    }

    #[test]
    fn markers_need_candles() {
        let args = RunChartMarkersArgs {
            run_id: "run-1".to_string(),
            trades: Vec::new(),
        };
        assert!(matches!(
            build_run_markers(&[], &args),
            Err(AppError::EmptyGrid)
        ));
    }

    #[test]
    fn rolling_ratio_rejects_zero_window() {
        let args = RollingRatioArgs {
            points: Vec::new(),
            window: 0,
        };
        assert!(build_rolling_ratio(&args).is_err());
    }

    #[test]
    fn histogram_args_are_validated() {
        let args = HistogramArgs {
            values: vec![1.0, 2.0],
            min: 0.0,
            max: 0.0,
            step: 1.0,
        };
        assert!(build_value_histogram(&args).is_err());
    }
}
