use super::time_grid::TimeGrid;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MarkerKind {
    Entry,
    Exit,
}

/// A fill reported by a run, at its own (unaligned) timestamp.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TradeEvent {
    pub time: i64,
    pub kind: MarkerKind,
    pub side: TradeSide,
    pub label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Marker {
    pub snapped_time: i64,
    pub event_time: i64,
    pub kind: MarkerKind,
    pub side: TradeSide,
    pub label: String,
}

/// Places one marker per trade on the bar nearest to the trade time.
///
/// Output is ordered by bar; trades on the same bar keep their input order.
pub fn place_markers(grid: &TimeGrid, trades: &[TradeEvent]) -> Vec<Marker> {
    let mut markers: Vec<Marker> = trades
        .iter()
        .map(|trade| Marker {
            snapped_time: grid.snap(trade.time),
            event_time: trade.time,
            kind: trade.kind,
            side: trade.side,
            label: trade.label.clone(),
        })
        .collect();
    markers.sort_by_key(|marker| marker.snapped_time);
    markers
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trade(time: i64, kind: MarkerKind, side: TradeSide, label: &str) -> TradeEvent {
        TradeEvent {
            time,
            kind,
            side,
            label: label.to_string(),
        }
    }

    #[test]
    fn every_marker_lands_on_a_grid_member() {
        let grid =
            TimeGrid::from_open_times([0, 60_000, 120_000, 180_000]).expect("grid should build");
        let trades = vec![
            trade(130_500, MarkerKind::Exit, TradeSide::Sell, "TP"),
            trade(29_999, MarkerKind::Entry, TradeSide::Buy, "L"),
            trade(90_000, MarkerKind::Entry, TradeSide::Buy, "add"),
            trade(999_999, MarkerKind::Exit, TradeSide::Sell, "EOB"),
        ];

        let markers = place_markers(&grid, &trades);

        assert!(markers.iter().all(|marker| grid.contains(marker.snapped_time)));
        let snapped: Vec<i64> = markers.iter().map(|marker| marker.snapped_time).collect();
        assert_eq!(snapped, vec![0, 120_000, 120_000, 180_000]);
        // 90_000 ties between two bars and lands on the later one; markers on
        // the same bar keep input order.
        assert_eq!(markers[1].label, "TP");
        assert_eq!(markers[2].label, "add");
    }

    #[test]
    fn keeps_original_event_time() {
        let grid = TimeGrid::from_open_times([0, 60_000]).expect("grid should build");
        let markers = place_markers(
            &grid,
            &[trade(41_000, MarkerKind::Entry, TradeSide::Buy, "L")],
        );

        assert_eq!(markers[0].snapped_time, 60_000);
        assert_eq!(markers[0].event_time, 41_000);
    }
}
