//! CSV Data Loader Module
//! Reads region-filtered slices of the price tables using Polars.

use crate::config::DataConfig;
use crate::data::boundary::BoundarySet;
use crate::data::model::{DatasetKind, PriceRecord, PropertyType};
use polars::prelude::*;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("Data file not found: {}", .0.display())]
    FileNotFound(PathBuf),
    #[error("Failed to parse {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },
}

impl LoaderError {
    pub(crate) fn parse(path: &Path, message: impl ToString) -> Self {
        LoaderError::Parse {
            path: path.to_path_buf(),
            message: message.to_string(),
        }
    }
}

/// Read-only view of the static data directory. Every call re-reads from disk.
#[derive(Debug, Clone)]
pub struct DataStore {
    data_dir: PathBuf,
    boundary_dir: PathBuf,
    boundary_key: String,
}

impl DataStore {
    pub fn new(config: &DataConfig) -> Self {
        Self {
            data_dir: config.data_dir.clone(),
            boundary_dir: config.boundary_dir.clone(),
            boundary_key: config.boundary_key.clone(),
        }
    }

    pub fn dataset_path(&self, kind: DatasetKind, year: Option<i32>) -> PathBuf {
        self.data_dir
            .join(kind.directory())
            .join(kind.file_name(year))
    }

    pub fn boundary_path(&self, region: &str) -> PathBuf {
        self.boundary_dir
            .join(format!("{}_postcode_sectors.geojson", region))
    }

    /// Load the rows of one dataset belonging to `region`.
    ///
    /// `year` selects the file for year-partitioned datasets and fills the
    /// `year` field when the file has no year column.
    pub fn records(
        &self,
        kind: DatasetKind,
        region: &str,
        year: Option<i32>,
    ) -> Result<Vec<PriceRecord>, LoaderError> {
        let path = self.dataset_path(kind, year);
        let df = read_region_frame(&path, region)?;
        let records = frame_to_records(&df, kind, year, &path)?;
        debug!(
            "Loaded {} {:?} rows for {} from {}",
            records.len(),
            kind,
            region,
            path.display()
        );
        Ok(records)
    }

    pub fn average_prices(&self, region: &str, year: i32) -> Result<Vec<PriceRecord>, LoaderError> {
        self.records(DatasetKind::AveragePriceByYear, region, Some(year))
    }

    pub fn region_prices(&self, region: &str) -> Result<Vec<PriceRecord>, LoaderError> {
        self.records(DatasetKind::RegionAvgPrice, region, None)
    }

    pub fn price_deltas(&self, region: &str, year: i32) -> Result<Vec<PriceRecord>, LoaderError> {
        self.records(DatasetKind::AvgPriceDelta, region, Some(year))
    }

    /// Concatenate the delta rows of several years, in the order given.
    pub fn price_deltas_window(
        &self,
        region: &str,
        years: &[i32],
    ) -> Result<Vec<PriceRecord>, LoaderError> {
        let mut all = Vec::new();
        for &year in years {
            all.extend(self.price_deltas(region, year)?);
        }
        Ok(all)
    }

    pub fn boundaries(&self, region: &str) -> Result<BoundarySet, LoaderError> {
        BoundarySet::load(&self.boundary_path(region), &self.boundary_key)
    }
}

/// Read a CSV file and keep only the rows of one region.
fn read_region_frame(path: &Path, region: &str) -> Result<DataFrame, LoaderError> {
    if !path.is_file() {
        return Err(LoaderError::FileNotFound(path.to_path_buf()));
    }

    LazyCsvReader::new(path)
        .with_infer_schema_length(Some(10000))
        .finish()
        .and_then(|lazy| lazy.filter(col("region").eq(lit(region))).collect())
        .map_err(|e| LoaderError::parse(path, e))
}

fn text_column(df: &DataFrame, name: &str) -> PolarsResult<Option<Vec<Option<String>>>> {
    let Ok(column) = df.column(name) else {
        return Ok(None);
    };
    let cast = column.cast(&DataType::String)?;
    let values = cast
        .str()?
        .into_iter()
        .map(|v| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()))
        .collect();
    Ok(Some(values))
}

fn float_column(df: &DataFrame, name: &str) -> PolarsResult<Option<Vec<Option<f64>>>> {
    let Ok(column) = df.column(name) else {
        return Ok(None);
    };
    let cast = column.strict_cast(&DataType::Float64)?;
    Ok(Some(cast.f64()?.into_iter().collect()))
}

fn int_column(df: &DataFrame, name: &str) -> PolarsResult<Option<Vec<Option<i64>>>> {
    let Ok(column) = df.column(name) else {
        return Ok(None);
    };
    let cast = column.strict_cast(&DataType::Int64)?;
    Ok(Some(cast.i64()?.into_iter().collect()))
}

/// Fetch one cell, enforcing presence for the dataset's required columns.
fn cell<T: Clone>(
    values: &Option<Vec<Option<T>>>,
    row: usize,
    name: &str,
    kind: DatasetKind,
    path: &Path,
) -> Result<Option<T>, LoaderError> {
    let required = kind.requires(name);
    match values {
        None if required => Err(LoaderError::parse(
            path,
            format!("missing required column '{}'", name),
        )),
        None => Ok(None),
        Some(column) => match column.get(row).cloned().flatten() {
            None if required => Err(LoaderError::parse(
                path,
                format!("empty value in column '{}' at row {}", name, row + 1),
            )),
            value => Ok(value),
        },
    }
}

fn frame_to_records(
    df: &DataFrame,
    kind: DatasetKind,
    fallback_year: Option<i32>,
    path: &Path,
) -> Result<Vec<PriceRecord>, LoaderError> {
    let parse = |e: PolarsError| LoaderError::parse(path, e);

    let regions = text_column(df, "region").map_err(parse)?;
    let sectors = text_column(df, "postcode_sector").map_err(parse)?;
    let years = int_column(df, "year").map_err(parse)?;
    let prices = float_column(df, "avg_price").map_err(parse)?;
    let volumes = int_column(df, "volume").map_err(parse)?;
    let types = text_column(df, "property_type").map_err(parse)?;
    let deltas = float_column(df, "delta").map_err(parse)?;

    if years.is_none() && (!kind.is_partitioned_by_year() || fallback_year.is_none()) {
        return Err(LoaderError::parse(path, "missing required column 'year'"));
    }

    let mut records = Vec::with_capacity(df.height());
    for row in 0..df.height() {
        let region = cell(&regions, row, "region", kind, path)?.unwrap_or_default();

        let year = match cell(&years, row, "year", kind, path)? {
            Some(y) => i32::try_from(y)
                .map_err(|_| LoaderError::parse(path, format!("year {} out of range", y)))?,
            None => fallback_year.ok_or_else(|| {
                LoaderError::parse(path, format!("empty value in column 'year' at row {}", row + 1))
            })?,
        };

        let volume = cell(&volumes, row, "volume", kind, path)?
            .map(|v| {
                u64::try_from(v).map_err(|_| {
                    LoaderError::parse(path, format!("negative volume {} at row {}", v, row + 1))
                })
            })
            .transpose()?;

        records.push(PriceRecord {
            region,
            postcode_sector: cell(&sectors, row, "postcode_sector", kind, path)?,
            year,
            avg_price: cell(&prices, row, "avg_price", kind, path)?,
            volume,
            property_type: cell(&types, row, "property_type", kind, path)?
                .map(|code| PropertyType::from_code(&code)),
            delta: cell(&deltas, row, "delta", kind, path)?,
        });
    }

    Ok(records)
}
