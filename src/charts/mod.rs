//! Charts module - Figure building, theming and export

mod builder;
mod export;
mod figure;
mod renderer;
mod theme;

pub use builder::{
    ChartKind, FigureBuilder, FigureError, FigureRequest, DEFAULT_TOP_N, DELTA_WINDOW_YEARS,
};
pub use export::{write_figure, ExportError, OutputFormat};
pub use figure::{
    Axis, BarTrace, BoxTrace, ChoroplethTrace, ColorAxis, FigureSpec, Layout, Mapbox, Marker,
    ScatterTrace, Trace,
};
pub use renderer::{mercator, RenderError, StaticChartRenderer};
pub use theme::{Rgb, Theme, BACKGROUND, FONT_COLOR, VIRIDIS};
