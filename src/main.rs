//! propdash - UK Property Price Dashboard Figures
//!
//! Command line front end: builds the dashboard figures for a region and year
//! and writes them as Plotly JSON or static PNG/SVG images.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use propdash::charts::{
    write_figure, ChartKind, FigureBuilder, FigureRequest, FigureSpec, OutputFormat,
    StaticChartRenderer, DEFAULT_TOP_N,
};
use propdash::config::AppConfig;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[arg(short, long, value_name = "FILE", default_value = "config.toml", env = "PROPDASH_CONFIG")]
    config: PathBuf,

    /// Log filter, e.g. `debug` or `propdash=trace`. Falls back to RUST_LOG, then `info`.
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List configured regions and available years
    Regions,
    /// Build a single figure
    Figure {
        #[arg(value_enum)]
        kind: ChartKind,
        #[arg(short, long)]
        region: Option<String>,
        #[arg(short, long)]
        year: Option<i32>,
        /// Number of sectors shown on the growth maps
        #[arg(long, default_value_t = DEFAULT_TOP_N)]
        top: usize,
        /// .json, .png or .svg; JSON goes to stdout when omitted
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
    /// Build every figure for every region and year
    Export {
        #[arg(short, long, value_name = "DIR")]
        output_dir: PathBuf,
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
        #[arg(long, default_value_t = DEFAULT_TOP_N)]
        top: usize,
    },
    /// Build the pair of figures shown on one dashboard page
    Page {
        #[arg(value_enum)]
        page: Page,
        #[arg(short, long)]
        region: Option<String>,
        #[arg(short, long)]
        year: Option<i32>,
        #[arg(long, default_value_t = DEFAULT_TOP_N)]
        top: usize,
        #[arg(short, long, value_name = "DIR", default_value = ".")]
        output_dir: PathBuf,
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Page {
    AveragePrice,
    Delta,
    Growth,
}

impl Page {
    fn kinds(self) -> [ChartKind; 2] {
        match self {
            Page::AveragePrice => [ChartKind::AveragePriceMap, ChartKind::AveragePriceBar],
            Page::Delta => [ChartKind::DeltaBoxPlot, ChartKind::DeltaMap],
            Page::Growth => [ChartKind::FastestGrowingMap, ChartKind::FastestDecliningMap],
        }
    }
}

fn setup_logging(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info")),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    // stdout carries figure JSON, so logs go to stderr
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.log_level.as_deref());

    let config = AppConfig::load_from_file(&cli.config)
        .with_context(|| format!("Failed to load config {}", cli.config.display()))?;
    debug!(
        regions = config.regions.len(),
        years = ?config.years,
        data_dir = %config.data.data_dir.display(),
        "Configuration loaded"
    );

    match cli.command {
        Commands::Regions => list_regions(&config),
        Commands::Figure {
            kind,
            region,
            year,
            top,
            output,
        } => {
            let request = request_for(&config, kind, region, year, top);
            build_one(&config, &request, output.as_deref())
        }
        Commands::Export {
            output_dir,
            format,
            top,
        } => export_all(&config, &output_dir, format, top),
        Commands::Page {
            page,
            region,
            year,
            top,
            output_dir,
            format,
        } => build_page(&config, page, region, year, top, &output_dir, format),
    }
}

fn request_for(
    config: &AppConfig,
    kind: ChartKind,
    region: Option<String>,
    year: Option<i32>,
    top: usize,
) -> FigureRequest {
    let region = region.unwrap_or_else(|| config.default_region.clone());
    let year = year.unwrap_or_else(|| config.default_year());
    FigureRequest::new(kind, region, year).with_top_n(top)
}

fn list_regions(config: &AppConfig) -> Result<()> {
    for (name, region) in &config.regions {
        let marker = if *name == config.default_region { " (default)" } else { "" };
        println!(
            "{}{}: center {:.4}, {:.4}, zoom {}",
            name, marker, region.center.lat, region.center.lon, region.zoom
        );
    }
    let years: Vec<String> = config.years.iter().map(i32::to_string).collect();
    println!("Years: {} (default {})", years.join(", "), config.default_year());
    Ok(())
}

fn build_one(config: &AppConfig, request: &FigureRequest, output: Option<&Path>) -> Result<()> {
    let builder = FigureBuilder::new(config);
    let figure = builder.build(request).with_context(|| {
        format!(
            "Failed to build {} for {} {}",
            request.kind.slug(),
            request.region,
            request.year
        )
    })?;

    match output {
        Some(path) => {
            write_figure(&figure, path, &StaticChartRenderer::default())?;
            info!(path = %path.display(), points = figure.point_count(), "Figure written");
        }
        None => println!("{}", figure.to_json_pretty()?),
    }
    Ok(())
}

/// File-name friendly form of a region name ("South East" -> "south-east").
fn slugify(name: &str) -> String {
    name.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(str::to_ascii_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

fn export_all(config: &AppConfig, output_dir: &Path, format: OutputFormat, top: usize) -> Result<()> {
    let builder = FigureBuilder::new(config);
    let renderer = StaticChartRenderer::default();

    let jobs: Vec<FigureRequest> = config
        .region_names()
        .flat_map(|region| {
            config.years.iter().flat_map(move |&year| {
                ChartKind::ALL
                    .into_iter()
                    .map(move |kind| FigureRequest::new(kind, region, year).with_top_n(top))
            })
        })
        .collect();
    info!(figures = jobs.len(), dir = %output_dir.display(), "Starting export");

    let failed = jobs
        .par_iter()
        .filter(|request| {
            let path = output_dir
                .join(slugify(&request.region))
                .join(request.year.to_string())
                .join(format!("{}.{}", request.kind.slug(), format.extension()));

            let result = builder
                .build(request)
                .map_err(anyhow::Error::from)
                .and_then(|figure| Ok(write_figure(&figure, &path, &renderer)?));
            match result {
                Ok(_) => {
                    debug!(path = %path.display(), "Exported");
                    false
                }
                Err(e) => {
                    warn!(
                        kind = request.kind.slug(),
                        region = %request.region,
                        year = request.year,
                        "Export failed: {:#}",
                        e
                    );
                    true
                }
            }
        })
        .count();

    info!(
        written = jobs.len() - failed,
        failed,
        "Export complete"
    );
    if failed > 0 {
        bail!("{} of {} figures failed to export", failed, jobs.len());
    }
    Ok(())
}

fn build_page(
    config: &AppConfig,
    page: Page,
    region: Option<String>,
    year: Option<i32>,
    top: usize,
    output_dir: &Path,
    format: OutputFormat,
) -> Result<()> {
    let builder = FigureBuilder::new(config);
    let renderer = StaticChartRenderer::default();

    for kind in page.kinds() {
        let request = request_for(config, kind, region.clone(), year, top);
        // A failed figure still occupies its slot on the page
        let figure = builder.build(&request).unwrap_or_else(|e| {
            warn!(kind = kind.slug(), "Showing placeholder: {}", e);
            FigureSpec::placeholder(e)
        });

        let path = output_dir.join(format!("{}.{}", kind.slug(), format.extension()));
        write_figure(&figure, &path, &renderer)?;
        info!(path = %path.display(), points = figure.point_count(), "Figure written");
    }
    Ok(())
}
