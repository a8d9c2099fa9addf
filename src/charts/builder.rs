//! Figure Builder Module
//! The six dashboard figures, built through one load -> filter -> join -> bound -> style pipeline.

use crate::charts::figure::{
    Axis, BarTrace, BoxTrace, ChoroplethTrace, ColorAxis, ColorBar, FigureSpec, Legend, Line,
    Mapbox, Marker, ScatterTrace, Title, Trace,
};
use crate::charts::theme::{Theme, MAP_OPACITY, MAP_STYLE};
use crate::config::{AppConfig, RegionConfig};
use crate::data::{DataStore, LoaderError, PriceRecord, PropertyType};
use crate::stats::{StatsCalculator, StatsError, COLOR_SCALE_PERCENTILES, DELTA_AXIS_PERCENTILES};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

/// Default slider value for the growth maps.
pub const DEFAULT_TOP_N: usize = 50;

/// Years covered by the delta box plot, ending at the requested year.
pub const DELTA_WINDOW_YEARS: i32 = 3;

const PRICE_LABEL: &str = "Average Price £";
const DELTA_LABEL: &str = "Price Change %";

#[derive(Error, Debug)]
pub enum FigureError {
    #[error("Unknown region: {0}")]
    UnknownRegion(String),
    #[error("Year {0} is not available")]
    UnknownYear(i32),
    #[error(transparent)]
    Load(#[from] LoaderError),
    #[error("No {dataset} data for {region} ({years})")]
    EmptyResult {
        region: String,
        dataset: &'static str,
        years: String,
    },
    #[error(transparent)]
    Stats(#[from] StatsError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, clap::ValueEnum)]
pub enum ChartKind {
    AveragePriceMap,
    AveragePriceBar,
    DeltaBoxPlot,
    DeltaMap,
    FastestGrowingMap,
    FastestDecliningMap,
}

impl ChartKind {
    pub const ALL: [ChartKind; 6] = [
        ChartKind::AveragePriceMap,
        ChartKind::AveragePriceBar,
        ChartKind::DeltaBoxPlot,
        ChartKind::DeltaMap,
        ChartKind::FastestGrowingMap,
        ChartKind::FastestDecliningMap,
    ];

    pub fn slug(&self) -> &'static str {
        match self {
            ChartKind::AveragePriceMap => "average-price-map",
            ChartKind::AveragePriceBar => "average-price-bar",
            ChartKind::DeltaBoxPlot => "delta-box-plot",
            ChartKind::DeltaMap => "delta-map",
            ChartKind::FastestGrowingMap => "fastest-growing-map",
            ChartKind::FastestDecliningMap => "fastest-declining-map",
        }
    }

    pub fn is_map(&self) -> bool {
        !matches!(self, ChartKind::AveragePriceBar | ChartKind::DeltaBoxPlot)
    }
}

/// Inputs for one figure.
#[derive(Debug, Clone, PartialEq)]
pub struct FigureRequest {
    pub kind: ChartKind,
    pub region: String,
    pub year: i32,
    /// Sector count for the growth maps; ignored by the other kinds.
    pub top_n: usize,
}

impl FigureRequest {
    pub fn new(kind: ChartKind, region: impl Into<String>, year: i32) -> Self {
        Self {
            kind,
            region: region.into(),
            year,
            top_n: DEFAULT_TOP_N,
        }
    }

    pub fn with_top_n(mut self, top_n: usize) -> Self {
        self.top_n = top_n;
        self
    }
}

#[derive(Debug, Clone, Copy)]
enum Metric {
    AvgPrice,
    Delta,
}

impl Metric {
    fn value(&self, record: &PriceRecord) -> Option<f64> {
        match self {
            Metric::AvgPrice => record.avg_price,
            Metric::Delta => record.delta,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Metric::AvgPrice => PRICE_LABEL,
            Metric::Delta => DELTA_LABEL,
        }
    }

    fn dataset(&self) -> &'static str {
        match self {
            Metric::AvgPrice => "average price",
            Metric::Delta => "price change",
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Selection {
    All,
    Top(usize),
    Bottom(usize),
}

/// Per-kind parameters of the choropleth pipeline.
struct MapSpec {
    metric: Metric,
    selection: Selection,
    clip: Option<(f64, f64)>,
    hover_volume: bool,
    title: String,
}

/// Builds figures from the static data directory. Holds no mutable state.
pub struct FigureBuilder<'a> {
    config: &'a AppConfig,
    store: DataStore,
}

impl<'a> FigureBuilder<'a> {
    pub fn new(config: &'a AppConfig) -> Self {
        Self {
            config,
            store: DataStore::new(&config.data),
        }
    }

    pub fn build(&self, request: &FigureRequest) -> Result<FigureSpec, FigureError> {
        let region = request.region.as_str();
        let year = request.year;
        match request.kind {
            ChartKind::AveragePriceMap => self.average_price_map(region, year),
            ChartKind::AveragePriceBar => self.average_price_bar(region, year),
            ChartKind::DeltaBoxPlot => self.delta_box_plot(region, year),
            ChartKind::DeltaMap => self.delta_map(region, year),
            ChartKind::FastestGrowingMap => self.fastest_growing_map(region, year, request.top_n),
            ChartKind::FastestDecliningMap => {
                self.fastest_declining_map(region, year, request.top_n)
            }
        }
    }

    pub fn average_price_map(&self, region: &str, year: i32) -> Result<FigureSpec, FigureError> {
        let region_config = self.check_request(region, year)?;
        let records = self.store.average_prices(region, year)?;
        self.choropleth(
            region,
            year,
            region_config,
            &records,
            MapSpec {
                metric: Metric::AvgPrice,
                selection: Selection::All,
                clip: Some(COLOR_SCALE_PERCENTILES),
                hover_volume: true,
                title: format!(
                    "Average price by postcode sector for {} in {}",
                    region, year
                ),
            },
        )
    }

    pub fn delta_map(&self, region: &str, year: i32) -> Result<FigureSpec, FigureError> {
        let region_config = self.check_request(region, year)?;
        let records = self.store.price_deltas(region, year)?;
        self.choropleth(
            region,
            year,
            region_config,
            &records,
            MapSpec {
                metric: Metric::Delta,
                selection: Selection::All,
                clip: Some(COLOR_SCALE_PERCENTILES),
                hover_volume: false,
                title: format!("Year-on-year price change for {} in {}", region, year),
            },
        )
    }

    pub fn fastest_growing_map(
        &self,
        region: &str,
        year: i32,
        top_n: usize,
    ) -> Result<FigureSpec, FigureError> {
        let region_config = self.check_request(region, year)?;
        let records = self.store.price_deltas(region, year)?;
        self.choropleth(
            region,
            year,
            region_config,
            &records,
            MapSpec {
                metric: Metric::Delta,
                selection: Selection::Top(top_n),
                clip: None,
                hover_volume: false,
                title: format!(
                    "Top {} fastest growing sectors in {} in {}",
                    top_n, region, year
                ),
            },
        )
    }

    pub fn fastest_declining_map(
        &self,
        region: &str,
        year: i32,
        top_n: usize,
    ) -> Result<FigureSpec, FigureError> {
        let region_config = self.check_request(region, year)?;
        let records = self.store.price_deltas(region, year)?;
        self.choropleth(
            region,
            year,
            region_config,
            &records,
            MapSpec {
                metric: Metric::Delta,
                selection: Selection::Bottom(top_n),
                clip: None,
                hover_volume: false,
                title: format!(
                    "Top {} fastest declining sectors in {} in {}",
                    top_n, region, year
                ),
            },
        )
    }

    /// Stacked average price per property type for every year of the region,
    /// with total volume per year on a secondary axis.
    pub fn average_price_bar(&self, region: &str, year: i32) -> Result<FigureSpec, FigureError> {
        self.check_request(region, year)?;
        let records = self.store.region_prices(region)?;
        if records.is_empty() {
            return Err(empty(region, "regional price", "all years".into()));
        }

        let mut by_type: BTreeMap<PropertyType, Vec<(i32, f64)>> = BTreeMap::new();
        for record in &records {
            if let (Some(pt), Some(price)) = (&record.property_type, record.avg_price) {
                by_type.entry(pt.clone()).or_default().push((record.year, price));
            }
        }

        let colors = Theme::category_colors(by_type.len());
        let mut data: Vec<Trace> = by_type
            .into_iter()
            .zip(colors)
            .map(|((pt, mut points), color)| {
                points.sort_by_key(|(y, _)| *y);
                Trace::Bar(BarTrace {
                    name: pt.label().to_string(),
                    x: points.iter().map(|(y, _)| *y).collect(),
                    y: points.iter().map(|(_, p)| *p).collect(),
                    marker: Marker {
                        color: Some(color),
                        opacity: None,
                    },
                })
            })
            .collect();

        let volume = StatsCalculator::group_sum(&records, |r| r.year, |r| r.volume);
        data.push(Trace::Scatter(ScatterTrace {
            name: "Volume".to_string(),
            x: volume.keys().copied().collect(),
            y: volume.values().map(|v| *v as f64).collect(),
            mode: "lines+markers".to_string(),
            yaxis: "y2".to_string(),
            line: Line {
                color: Theme::sample(1.0).to_hex(),
            },
        }));

        let mut layout = Theme::dark_layout(format!(
            "Average price and sales volume for {} in {}",
            region, year
        ));
        layout.barmode = Some("stack".to_string());
        layout.xaxis = Some(Axis::titled("Year"));
        layout.yaxis = Some(Axis::titled(PRICE_LABEL));
        layout.yaxis2 = Some(Axis {
            title: Title::new("Volume"),
            overlaying: Some("y".to_string()),
            side: Some("right".to_string()),
            showgrid: Some(false),
            range: None,
        });
        layout.legend = Some(Legend {
            title: Some(Title::new("Property Type")),
            orientation: "h".to_string(),
            x: 1.0,
            y: 1.02,
            xanchor: Some("right".to_string()),
            yanchor: Some("bottom".to_string()),
        });

        debug!("Bar figure for {}: {} rows", region, records.len());
        Ok(FigureSpec { data, layout })
    }

    /// One box of sector deltas per year over the trailing window.
    pub fn delta_box_plot(&self, region: &str, year: i32) -> Result<FigureSpec, FigureError> {
        self.check_request(region, year)?;
        let window = self.delta_window(year);
        let records = self.store.price_deltas_window(region, &window)?;

        let deltas: Vec<f64> = records.iter().filter_map(|r| r.delta).collect();
        // Title spans the full trailing window
        let start = year - DELTA_WINDOW_YEARS + 1;
        if deltas.is_empty() {
            return Err(empty(region, "price change", format!("{}-{}", start, year)));
        }

        let (low_p, high_p) = DELTA_AXIS_PERCENTILES;
        let bounds = StatsCalculator::percentile_bounds(&deltas, low_p, high_p)?;

        let mut by_year: BTreeMap<i32, Vec<f64>> = BTreeMap::new();
        for record in &records {
            if let Some(delta) = record.delta {
                by_year.entry(record.year).or_default().push(delta);
            }
        }

        let colors = Theme::category_colors(by_year.len());
        let data = by_year
            .into_iter()
            .zip(colors)
            .map(|((y, values), color)| {
                Trace::BoxPlot(BoxTrace {
                    name: y.to_string(),
                    x: vec![y; values.len()],
                    y: values,
                    marker: Marker {
                        color: Some(color),
                        opacity: None,
                    },
                    boxmean: true,
                })
            })
            .collect();

        let mut layout = Theme::dark_layout(format!(
            "Year-on-year sector average price change for {} between {} and {}",
            region, start, year
        ));
        layout.xaxis = Some(Axis::titled("Year"));
        layout.yaxis = Some(Axis {
            range: Some(bounds.as_range()),
            ..Axis::titled(DELTA_LABEL)
        });

        debug!(
            "Box figure for {} {:?}: {} deltas, y range {:?}",
            region,
            window,
            deltas.len(),
            bounds
        );
        Ok(FigureSpec { data, layout })
    }

    /// Years `[year - 2, year]` restricted to the configured years.
    pub fn delta_window(&self, year: i32) -> Vec<i32> {
        ((year - DELTA_WINDOW_YEARS + 1)..=year)
            .filter(|y| self.config.has_year(*y))
            .collect()
    }

    fn check_request(&self, region: &str, year: i32) -> Result<&RegionConfig, FigureError> {
        let region_config = self
            .config
            .region(region)
            .ok_or_else(|| FigureError::UnknownRegion(region.to_string()))?;
        if !self.config.has_year(year) {
            return Err(FigureError::UnknownYear(year));
        }
        Ok(region_config)
    }

    fn choropleth(
        &self,
        region: &str,
        year: i32,
        region_config: &RegionConfig,
        records: &[PriceRecord],
        spec: MapSpec,
    ) -> Result<FigureSpec, FigureError> {
        let metric = spec.metric;

        let rows: Vec<&PriceRecord> = records
            .iter()
            .filter(|r| metric.value(r).is_some())
            .collect();
        if rows.is_empty() {
            return Err(empty(region, metric.dataset(), year.to_string()));
        }

        // Scale bounds come from the whole regional column, before any join
        let bounds = match spec.clip {
            Some((low_p, high_p)) => {
                let values: Vec<f64> = rows.iter().filter_map(|r| metric.value(r)).collect();
                Some(StatsCalculator::percentile_bounds(&values, low_p, high_p)?)
            }
            None => None,
        };

        let key = |r: &&PriceRecord| metric.value(r).unwrap_or(f64::NAN);
        let selected: Vec<&PriceRecord> = match spec.selection {
            Selection::All => rows,
            Selection::Top(n) => StatsCalculator::top_n(&rows, n, key)
                .into_iter()
                .copied()
                .collect(),
            Selection::Bottom(n) => StatsCalculator::bottom_n(&rows, n, key)
                .into_iter()
                .copied()
                .collect(),
        };

        let boundaries = self.store.boundaries(region)?;
        let (joined, dropped) = boundaries.join(&selected);
        if dropped > 0 {
            debug!(
                "Dropped {} of {} sectors without boundaries in {}",
                dropped,
                selected.len(),
                region
            );
        }

        let locations: Vec<String> = joined.iter().map(|r| r.sector().to_string()).collect();
        let z: Vec<f64> = joined
            .iter()
            .map(|r| metric.value(r).unwrap_or(f64::NAN))
            .collect();
        let geojson = boundaries.subset(locations.iter().map(String::as_str));

        let label = metric.label();
        let (customdata, hovertemplate) = if spec.hover_volume {
            (
                Some(joined.iter().map(|r| [r.volume.unwrap_or(0)]).collect()),
                format!(
                    "%{{location}}<br>{}=%{{z}}<br>volume=%{{customdata[0]}}<extra></extra>",
                    label
                ),
            )
        } else {
            (None, format!("%{{location}}<br>{}=%{{z}}<extra></extra>", label))
        };

        let trace = ChoroplethTrace {
            name: String::new(),
            geojson,
            featureidkey: boundaries.feature_id_key(),
            locations,
            z,
            coloraxis: "coloraxis".to_string(),
            marker: Marker {
                color: None,
                opacity: Some(MAP_OPACITY),
            },
            customdata,
            hovertemplate,
        };

        let mut layout = Theme::dark_layout(spec.title);
        layout.mapbox = Some(Mapbox {
            style: MAP_STYLE.to_string(),
            center: region_config.center,
            zoom: region_config.zoom,
        });
        layout.coloraxis = Some(ColorAxis {
            colorscale: Theme::colorscale(),
            cmin: bounds.map(|b| b.low),
            cmax: bounds.map(|b| b.high),
            colorbar: ColorBar {
                title: Title::new(label),
            },
        });

        Ok(FigureSpec {
            data: vec![Trace::Choroplethmapbox(trace)],
            layout,
        })
    }
}

fn empty(region: &str, dataset: &'static str, years: String) -> FigureError {
    FigureError::EmptyResult {
        region: region.to_string(),
        dataset,
        years,
    }
}
