pub mod histogram;
pub mod markers;
pub mod rolling;
pub mod time_grid;

pub use histogram::{bin_values, HistogramBin};
pub use markers::{place_markers, Marker, TradeEvent};
pub use rolling::{is_converged, rolling_ratio, SeriesPoint};
pub use time_grid::{snap, TimeGrid};
