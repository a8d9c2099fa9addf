//! Static Chart Renderer
//! Draws a FigureSpec to PNG or SVG with plotters, using the dashboard theme.
//!
//! Layout:
//! 1. Title centered at the top
//! 2. Plot area: map polygons, stacked bars with a volume line, or year boxes
//! 3. Maps get a Viridis color bar on the right

use crate::charts::figure::{BarTrace, BoxTrace, ChoroplethTrace, FigureSpec, ScatterTrace, Trace};
use crate::charts::theme::{Rgb, Theme, BACKGROUND, GRID_COLOR, MAP_OPACITY};
use crate::stats::{PercentileBounds, StatsCalculator};
use plotters::coord::Shift;
use plotters::prelude::*;
use std::collections::{BTreeMap, HashMap};
use std::f64::consts::PI;
use std::path::Path;
use thiserror::Error;

/// Map zoom follows the vector-tile convention of 512px tiles.
const TILE_SIZE: f64 = 512.0;
const COLORBAR_WIDTH: u32 = 90;
const FONT: &str = "sans-serif";

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Drawing failed: {0}")]
    Backend(String),
    #[error("Cannot render figure: {0}")]
    Unsupported(&'static str),
}

fn backend<E: std::fmt::Display>(e: E) -> RenderError {
    RenderError::Backend(e.to_string())
}

fn rgb(color: Rgb) -> RGBColor {
    RGBColor(color.0, color.1, color.2)
}

fn hex_color(hex: Option<&str>, fallback: Rgb) -> RGBColor {
    rgb(hex.and_then(Rgb::from_hex).unwrap_or(fallback))
}

fn background() -> RGBColor {
    hex_color(Some(BACKGROUND), Rgb(0x34, 0x3a, 0x40))
}

fn grid() -> RGBColor {
    hex_color(Some(GRID_COLOR), Rgb(0x4b, 0x54, 0x5c))
}

fn text_style(size: f64) -> TextStyle<'static> {
    (FONT, size).into_font().color(&WHITE)
}

/// Project a longitude/latitude pair to Web Mercator pixels at `zoom`.
pub fn mercator(lon: f64, lat: f64, zoom: f64) -> (f64, f64) {
    let world = TILE_SIZE * 2.0_f64.powf(zoom);
    let lat_rad = lat.clamp(-85.0511, 85.0511).to_radians();
    let x = (lon + 180.0) / 360.0 * world;
    let y = (1.0 - (lat_rad.tan() + (1.0 / lat_rad.cos())).ln() / PI) / 2.0 * world;
    (x, y)
}

pub struct StaticChartRenderer {
    width: u32,
    height: u32,
}

impl Default for StaticChartRenderer {
    fn default() -> Self {
        Self::new(1200, 800)
    }
}

impl StaticChartRenderer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(200),
            height: height.max(200),
        }
    }

    pub fn render_png(&self, figure: &FigureSpec, path: &Path) -> Result<(), RenderError> {
        let root = BitMapBackend::new(path, (self.width, self.height)).into_drawing_area();
        self.draw(figure, &root)?;
        root.present().map_err(backend)
    }

    pub fn render_svg(&self, figure: &FigureSpec, path: &Path) -> Result<(), RenderError> {
        let root = SVGBackend::new(path, (self.width, self.height)).into_drawing_area();
        self.draw(figure, &root)?;
        root.present().map_err(backend)
    }

    /// Draw the figure onto any plotters drawing area.
    pub fn draw<DB: DrawingBackend>(
        &self,
        figure: &FigureSpec,
        root: &DrawingArea<DB, Shift>,
    ) -> Result<(), RenderError> {
        root.fill(&background()).map_err(backend)?;

        let mut maps = Vec::new();
        let mut bars = Vec::new();
        let mut lines = Vec::new();
        let mut boxes = Vec::new();
        for trace in &figure.data {
            match trace {
                Trace::Choroplethmapbox(t) => maps.push(t),
                Trace::Bar(t) => bars.push(t),
                Trace::Scatter(t) => lines.push(t),
                Trace::BoxPlot(t) => boxes.push(t),
            }
        }

        if !maps.is_empty() {
            self.draw_map(figure, &maps, root)
        } else if !bars.is_empty() || !lines.is_empty() {
            self.draw_bars(figure, &bars, &lines, root)
        } else if !boxes.is_empty() {
            self.draw_boxes(figure, &boxes, root)
        } else {
            // Placeholder: title only
            root.titled(figure.title(), text_style(20.0))
                .map_err(backend)
                .map(|_| ())
        }
    }

    fn draw_map<DB: DrawingBackend>(
        &self,
        figure: &FigureSpec,
        traces: &[&ChoroplethTrace],
        root: &DrawingArea<DB, Shift>,
    ) -> Result<(), RenderError> {
        let mapbox = figure
            .layout
            .mapbox
            .as_ref()
            .ok_or(RenderError::Unsupported("map trace without map settings"))?;

        let (w, h) = root.dim_in_pixel();
        let map_width = w.saturating_sub(COLORBAR_WIDTH);
        let (map_area, bar_area) = root.split_horizontally(map_width as i32);

        // Color range: explicit axis bounds, else the data extent
        let values: Vec<f64> = traces.iter().flat_map(|t| t.z.iter().copied()).collect();
        let (cmin, cmax) = match figure.color_range() {
            Some([lo, hi]) => (lo, hi),
            None => {
                let sorted = StatsCalculator::sorted_finite(&values);
                match (sorted.first(), sorted.last()) {
                    (Some(&lo), Some(&hi)) => (lo, hi),
                    _ => (0.0, 1.0),
                }
            }
        };

        let scale = PercentileBounds {
            low: cmin.min(cmax),
            high: cmin.max(cmax),
        };

        // North-up view of the map window centered on the region
        let (cx, cy) = mercator(mapbox.center.lon, mapbox.center.lat, mapbox.zoom);
        let half_w = map_width as f64 / 2.0;
        let half_h = h as f64 / 2.0;

        let mut chart = ChartBuilder::on(&map_area)
            .caption(figure.title(), text_style(20.0))
            .margin(10)
            .build_cartesian_2d((cx - half_w)..(cx + half_w), (-cy - half_h)..(-cy + half_h))
            .map_err(backend)?;

        for trace in traces {
            let key = trace
                .featureidkey
                .strip_prefix("properties.")
                .unwrap_or(&trace.featureidkey);
            let by_location: HashMap<&str, f64> = trace
                .locations
                .iter()
                .map(String::as_str)
                .zip(trace.z.iter().copied())
                .collect();
            let opacity = trace.marker.opacity.unwrap_or(MAP_OPACITY);

            for feature in &trace.geojson.features {
                let name = feature
                    .properties
                    .as_ref()
                    .and_then(|p| p.get(key))
                    .and_then(|v| match v {
                        serde_json::Value::String(s) => Some(s.clone()),
                        serde_json::Value::Number(n) => Some(n.to_string()),
                        _ => None,
                    });
                let Some(value) = name.and_then(|n| by_location.get(n.as_str()).copied()) else {
                    continue;
                };
                let Some(geometry) = &feature.geometry else {
                    continue;
                };

                let color = rgb(Theme::color_for(scale.clamp(value), scale.low, scale.high));
                let rings = outer_rings(&geometry.value);
                chart
                    .draw_series(rings.into_iter().map(|ring| {
                        let points: Vec<(f64, f64)> = ring
                            .iter()
                            .filter(|p| p.len() >= 2)
                            .map(|p| {
                                let (x, y) = mercator(p[0], p[1], mapbox.zoom);
                                (x, -y)
                            })
                            .collect();
                        Polygon::new(points, color.mix(opacity).filled())
                    }))
                    .map_err(backend)?;
            }
        }

        let label = figure
            .layout
            .coloraxis
            .as_ref()
            .map(|c| c.colorbar.title.text.as_str())
            .unwrap_or_default();
        draw_colorbar(&bar_area, scale.low, scale.high, label)
    }

    fn draw_bars<DB: DrawingBackend>(
        &self,
        figure: &FigureSpec,
        bars: &[&BarTrace],
        lines: &[&ScatterTrace],
        root: &DrawingArea<DB, Shift>,
    ) -> Result<(), RenderError> {
        let years: Vec<i32> = bars
            .iter()
            .flat_map(|b| b.x.iter().copied())
            .chain(lines.iter().flat_map(|l| l.x.iter().copied()))
            .collect();
        let (Some(&first), Some(&last)) = (years.iter().min(), years.iter().max()) else {
            return Err(RenderError::Unsupported("bar chart without x values"));
        };
        let x_range = (first as f64 - 0.6)..(last as f64 + 0.6);

        let mut stacked: BTreeMap<i32, f64> = BTreeMap::new();
        for bar in bars {
            for (x, y) in bar.x.iter().zip(&bar.y) {
                *stacked.entry(*x).or_default() += y.max(0.0);
            }
        }
        let y_max = stacked.values().copied().fold(0.0, f64::max).max(1.0) * 1.1;
        let y2_max = lines
            .iter()
            .flat_map(|l| l.y.iter().copied())
            .fold(0.0, f64::max)
            .max(1.0)
            * 1.1;

        let axis_title = |axis: &Option<crate::charts::figure::Axis>| {
            axis.as_ref()
                .map(|a| a.title.text.clone())
                .unwrap_or_default()
        };

        let mut chart = ChartBuilder::on(root)
            .caption(figure.title(), text_style(20.0))
            .margin(15)
            .x_label_area_size(45)
            .y_label_area_size(80)
            .right_y_label_area_size(80)
            .build_cartesian_2d(x_range.clone(), 0.0..y_max)
            .map_err(backend)?
            .set_secondary_coord(x_range, 0.0..y2_max);

        chart
            .configure_mesh()
            .x_desc(axis_title(&figure.layout.xaxis))
            .y_desc(axis_title(&figure.layout.yaxis))
            .x_labels((last - first + 1).clamp(2, 30) as usize)
            .x_label_formatter(&|x| format!("{:.0}", x))
            .label_style(text_style(12.0))
            .axis_desc_style(text_style(14.0))
            .axis_style(WHITE)
            .light_line_style(TRANSPARENT)
            .bold_line_style(grid())
            .draw()
            .map_err(backend)?;

        chart
            .configure_secondary_axes()
            .y_desc(axis_title(&figure.layout.yaxis2))
            .label_style(text_style(12.0))
            .axis_desc_style(text_style(14.0))
            .axis_style(WHITE)
            .draw()
            .map_err(backend)?;

        let palette = Theme::category_colors(bars.len());
        let mut base: BTreeMap<i32, f64> = BTreeMap::new();
        for (i, bar) in bars.iter().enumerate() {
            let fallback = palette.get(i).and_then(|h| Rgb::from_hex(h)).unwrap_or(Rgb(255, 255, 255));
            let color = hex_color(bar.marker.color.as_deref(), fallback);
            chart
                .draw_series(bar.x.iter().zip(&bar.y).map(|(&x, &y)| {
                    let bottom = base.entry(x).or_default();
                    let rect = Rectangle::new(
                        [(x as f64 - 0.4, *bottom), (x as f64 + 0.4, *bottom + y.max(0.0))],
                        color.filled(),
                    );
                    *bottom += y.max(0.0);
                    rect
                }))
                .map_err(backend)?
                .label(bar.name.clone())
                .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], color.filled()));
        }

        for line in lines {
            let color = hex_color(Some(line.line.color.as_str()), Theme::sample(1.0));
            let points: Vec<(f64, f64)> = line
                .x
                .iter()
                .zip(&line.y)
                .map(|(&x, &y)| (x as f64, y))
                .collect();
            chart
                .draw_secondary_series(LineSeries::new(points.clone(), color.stroke_width(2)))
                .map_err(backend)?
                .label(line.name.clone())
                .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 15, y)], color.stroke_width(2)));
            chart
                .draw_secondary_series(points.into_iter().map(|p| Circle::new(p, 4, color.filled())))
                .map_err(backend)?;
        }

        chart
            .configure_series_labels()
            .position(SeriesLabelPosition::UpperLeft)
            .background_style(background().mix(0.85))
            .border_style(WHITE)
            .label_font(text_style(12.0))
            .draw()
            .map_err(backend)
    }

    fn draw_boxes<DB: DrawingBackend>(
        &self,
        figure: &FigureSpec,
        boxes: &[&BoxTrace],
        root: &DrawingArea<DB, Shift>,
    ) -> Result<(), RenderError> {
        let summaries = boxes
            .iter()
            .map(|b| {
                let x = b.x.first().copied().unwrap_or_default();
                StatsCalculator::box_summary(&b.y).map(|s| (x, *b, s))
            })
            .filter_map(Result::ok)
            .collect::<Vec<_>>();

        let (Some(first), Some(last)) = (
            summaries.iter().map(|(x, _, _)| *x).min(),
            summaries.iter().map(|(x, _, _)| *x).max(),
        ) else {
            return Err(RenderError::Unsupported("box plot without values"));
        };

        let y_axis = figure.layout.yaxis.as_ref();
        let [y_lo, y_hi] = match y_axis.and_then(|a| a.range) {
            Some(range) if range[0] < range[1] => range,
            Some([v, _]) => [v - 1.0, v + 1.0],
            None => {
                let lo = summaries.iter().map(|(_, _, s)| s.min).fold(f64::INFINITY, f64::min);
                let hi = summaries.iter().map(|(_, _, s)| s.max).fold(f64::NEG_INFINITY, f64::max);
                [lo, hi.max(lo + 1.0)]
            }
        };
        let y_bounds = PercentileBounds { low: y_lo, high: y_hi };
        let clip = |v: f64| y_bounds.clamp(v);

        let mut chart = ChartBuilder::on(root)
            .caption(figure.title(), text_style(20.0))
            .margin(15)
            .x_label_area_size(45)
            .y_label_area_size(70)
            .build_cartesian_2d((first as f64 - 0.6)..(last as f64 + 0.6), y_lo..y_hi)
            .map_err(backend)?;

        chart
            .configure_mesh()
            .x_desc(figure.layout.xaxis.as_ref().map(|a| a.title.text.clone()).unwrap_or_default())
            .y_desc(y_axis.map(|a| a.title.text.clone()).unwrap_or_default())
            .x_labels((last - first + 1).clamp(2, 30) as usize)
            .x_label_formatter(&|x| format!("{:.0}", x))
            .label_style(text_style(12.0))
            .axis_desc_style(text_style(14.0))
            .axis_style(WHITE)
            .light_line_style(TRANSPARENT)
            .bold_line_style(grid())
            .draw()
            .map_err(backend)?;

        let palette = Theme::category_colors(summaries.len());
        for (i, (x, trace, s)) in summaries.iter().enumerate() {
            let fallback = palette.get(i).and_then(|h| Rgb::from_hex(h)).unwrap_or(Rgb(255, 255, 255));
            let color = hex_color(trace.marker.color.as_deref(), fallback);
            let cx = *x as f64;
            let half = 0.3;

            let (q1, q3) = (clip(s.q1), clip(s.q3));
            chart
                .draw_series([
                    Rectangle::new([(cx - half, q1), (cx + half, q3)], color.mix(0.35).filled()),
                    Rectangle::new([(cx - half, q1), (cx + half, q3)], color.stroke_width(2)),
                ])
                .map_err(backend)?;

            let median = clip(s.median);
            let mean = clip(s.mean);
            chart
                .draw_series([
                    PathElement::new(vec![(cx - half, median), (cx + half, median)], WHITE.stroke_width(2)),
                    PathElement::new(vec![(cx, q3), (cx, clip(s.upper_whisker))], color.stroke_width(1)),
                    PathElement::new(vec![(cx, q1), (cx, clip(s.lower_whisker))], color.stroke_width(1)),
                    PathElement::new(vec![(cx - half, mean), (cx + half, mean)], color.stroke_width(1)),
                ])
                .map_err(backend)?;

            // Outliers beyond the whiskers, only where they fall inside the axis
            chart
                .draw_series(
                    trace
                        .y
                        .iter()
                        .filter(|v| (**v < s.lower_whisker || **v > s.upper_whisker) && y_bounds.contains(**v))
                        .map(|v| Circle::new((cx, *v), 3, color.filled())),
                )
                .map_err(backend)?;
        }

        Ok(())
    }
}

/// Outer rings of polygonal geometry; holes are ignored.
fn outer_rings(value: &geojson::Value) -> Vec<&Vec<Vec<f64>>> {
    match value {
        geojson::Value::Polygon(rings) => rings.first().into_iter().collect(),
        geojson::Value::MultiPolygon(polygons) => {
            polygons.iter().filter_map(|rings| rings.first()).collect()
        }
        _ => Vec::new(),
    }
}

fn draw_colorbar<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    cmin: f64,
    cmax: f64,
    label: &str,
) -> Result<(), RenderError> {
    let (lo, hi) = if cmax > cmin { (cmin, cmax) } else { (cmin - 1.0, cmin + 1.0) };
    let steps = 64;
    let step = (hi - lo) / steps as f64;

    let mut bar = ChartBuilder::on(area)
        .margin_top(60)
        .margin_bottom(40)
        .margin_right(10)
        .y_label_area_size(0)
        .right_y_label_area_size(55)
        .build_cartesian_2d(0.0..1.0, lo..hi)
        .map_err(backend)?;

    bar.configure_mesh()
        .disable_mesh()
        .disable_x_axis()
        .y_desc(label)
        .label_style(text_style(11.0))
        .axis_desc_style(text_style(12.0))
        .axis_style(WHITE)
        .draw()
        .map_err(backend)?;

    bar.draw_series((0..steps).map(|i| {
        let from = lo + step * i as f64;
        let color = rgb(Theme::color_for(from + step / 2.0, lo, hi));
        Rectangle::new([(0.0, from), (1.0, from + step)], color.filled())
    }))
    .map_err(backend)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::charts::builder::tests::fixture;
    use crate::charts::builder::{ChartKind, FigureBuilder, FigureRequest};
    use std::fs;
    use tempfile::TempDir;

    fn assert_written(path: &Path) {
        let len = fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        assert!(len > 0, "{} is empty", path.display());
    }

    #[test]
    fn test_mercator_origin_and_orientation() {
        let (x, y) = mercator(0.0, 0.0, 0.0);
        assert!((x - TILE_SIZE / 2.0).abs() < 1e-9);
        assert!((y - TILE_SIZE / 2.0).abs() < 1e-9);

        // North is smaller y; east is larger x
        let (_, y_north) = mercator(0.0, 51.5, 7.0);
        let (_, y_south) = mercator(0.0, 50.5, 7.0);
        assert!(y_north < y_south);
        let (x_west, _) = mercator(-1.0, 51.0, 7.0);
        let (x_east, _) = mercator(1.0, 51.0, 7.0);
        assert!(x_west < x_east);
    }

    #[test]
    fn test_zoom_doubles_scale() {
        let (x1, _) = mercator(10.0, 0.0, 3.0);
        let (x2, _) = mercator(10.0, 0.0, 4.0);
        assert!((x2 - 2.0 * x1).abs() < 1e-6);
    }

    #[test]
    fn test_outer_rings_ignores_holes_and_points() {
        let square = vec![vec![0.0, 0.0], vec![1.0, 0.0], vec![1.0, 1.0], vec![0.0, 0.0]];
        let hole = vec![vec![0.2, 0.2], vec![0.3, 0.2], vec![0.3, 0.3], vec![0.2, 0.2]];
        let polygon = geojson::Value::Polygon(vec![square.clone(), hole]);
        assert_eq!(outer_rings(&polygon).len(), 1);

        let multi = geojson::Value::MultiPolygon(vec![vec![square.clone()], vec![square]]);
        assert_eq!(outer_rings(&multi).len(), 2);

        assert!(outer_rings(&geojson::Value::Point(vec![0.0, 0.0])).is_empty());
    }

    #[test]
    fn test_renders_every_kind_to_svg_and_png() {
        let fx = fixture();
        let builder = FigureBuilder::new(&fx.config);
        let renderer = StaticChartRenderer::new(640, 480);
        let out = TempDir::new().unwrap();

        let mut figures: Vec<(&str, FigureSpec)> = ChartKind::ALL
            .iter()
            .map(|kind| {
                let request = FigureRequest::new(*kind, "London", 2022).with_top_n(3);
                (kind.slug(), builder.build(&request).unwrap())
            })
            .collect();
        figures.push(("placeholder", FigureSpec::placeholder("no data")));

        for (name, figure) in &figures {
            let svg = out.path().join(format!("{}.svg", name));
            renderer.render_svg(figure, &svg).unwrap();
            assert_written(&svg);

            let png = out.path().join(format!("{}.png", name));
            renderer.render_png(figure, &png).unwrap();
            assert_written(&png);
        }
    }

    #[test]
    fn test_degenerate_ranges_still_render() {
        let fx = fixture();
        let builder = FigureBuilder::new(&fx.config);
        let renderer = StaticChartRenderer::default();
        let out = TempDir::new().unwrap();

        // Single-value color axis
        let mut map = builder.delta_map("London", 2022).unwrap();
        let axis = map.layout.coloraxis.as_mut().unwrap();
        axis.cmin = Some(2.0);
        axis.cmax = Some(2.0);
        let path = out.path().join("flat-map.svg");
        renderer.render_svg(&map, &path).unwrap();
        assert_written(&path);

        // Box y axis collapsed to one value
        let mut boxes = builder.delta_box_plot("London", 2022).unwrap();
        boxes.layout.yaxis.as_mut().unwrap().range = Some([1.5, 1.5]);
        let path = out.path().join("flat-box.svg");
        renderer.render_svg(&boxes, &path).unwrap();
        assert_written(&path);
    }
}
