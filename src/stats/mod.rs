//! Stats module - scale bounds and aggregation

mod calculator;

pub use calculator::{
    BoxSummary, PercentileBounds, StatsCalculator, StatsError, COLOR_SCALE_PERCENTILES,
    DELTA_AXIS_PERCENTILES,
};
