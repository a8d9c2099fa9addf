//! Price Record Model
//! Row types for the pre-aggregated price tables.

use std::fmt;

/// Property category as recorded in the price-paid data.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PropertyType {
    Detached,
    SemiDetached,
    Terraced,
    Flat,
    /// Any code outside the four standard ones, kept verbatim.
    Other(String),
}

impl PropertyType {
    /// Map a single-letter code (or a full name) to a property type.
    pub fn from_code(code: &str) -> Self {
        match code.trim() {
            "D" | "Detached" => PropertyType::Detached,
            "S" | "Semi-Detached" => PropertyType::SemiDetached,
            "T" | "Terraced" => PropertyType::Terraced,
            "F" | "Flat" => PropertyType::Flat,
            other => PropertyType::Other(other.to_string()),
        }
    }

    /// Display name used for legend entries.
    pub fn label(&self) -> &str {
        match self {
            PropertyType::Detached => "Detached",
            PropertyType::SemiDetached => "Semi-Detached",
            PropertyType::Terraced => "Terraced",
            PropertyType::Flat => "Flat",
            PropertyType::Other(code) => code,
        }
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One row of a price table. Columns a dataset does not carry are `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceRecord {
    pub region: String,
    pub postcode_sector: Option<String>,
    pub year: i32,
    pub avg_price: Option<f64>,
    pub volume: Option<u64>,
    pub property_type: Option<PropertyType>,
    /// Year-over-year change in percent.
    pub delta: Option<f64>,
}

impl PriceRecord {
    pub fn sector(&self) -> &str {
        self.postcode_sector.as_deref().unwrap_or_default()
    }
}

/// The pre-processed table families on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatasetKind {
    /// Per-sector average price and volume, one file per year.
    AveragePriceByYear,
    /// Per-region average price by property type, all years in one file.
    RegionAvgPrice,
    /// Per-sector year-over-year delta, one file per year.
    AvgPriceDelta,
}

impl DatasetKind {
    pub fn directory(&self) -> &'static str {
        match self {
            DatasetKind::AveragePriceByYear => "average_price_by_year",
            DatasetKind::RegionAvgPrice => "region_avg_price",
            DatasetKind::AvgPriceDelta => "avg_price_delta",
        }
    }

    pub fn file_name(&self, year: Option<i32>) -> String {
        match (self, year) {
            (DatasetKind::AveragePriceByYear, Some(year)) => format!("region_data_{}.csv", year),
            (DatasetKind::AvgPriceDelta, Some(year)) => format!("avg_price_delta_{}.csv", year),
            (DatasetKind::RegionAvgPrice, _) => "region_avg_prices.csv".to_string(),
            (DatasetKind::AveragePriceByYear, None) => "region_data.csv".to_string(),
            (DatasetKind::AvgPriceDelta, None) => "avg_price_delta.csv".to_string(),
        }
    }

    /// Whether the year comes from the file name rather than a column.
    pub fn is_partitioned_by_year(&self) -> bool {
        !matches!(self, DatasetKind::RegionAvgPrice)
    }

    pub fn required_columns(&self) -> &'static [&'static str] {
        match self {
            DatasetKind::AveragePriceByYear => &["region", "postcode_sector", "avg_price", "volume"],
            DatasetKind::RegionAvgPrice => &["region", "year", "property_type", "avg_price", "volume"],
            DatasetKind::AvgPriceDelta => &["region", "postcode_sector", "delta"],
        }
    }

    pub fn requires(&self, column: &str) -> bool {
        self.required_columns().contains(&column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_mapping_is_total() {
        assert_eq!(PropertyType::from_code("D").label(), "Detached");
        assert_eq!(PropertyType::from_code("S").label(), "Semi-Detached");
        assert_eq!(PropertyType::from_code("T").label(), "Terraced");
        assert_eq!(PropertyType::from_code("F").label(), "Flat");
    }

    #[test]
    fn test_unknown_code_passes_through() {
        assert_eq!(PropertyType::from_code("O").label(), "O");
        assert_eq!(PropertyType::from_code("Volume").label(), "Volume");
        assert_eq!(PropertyType::from_code("X"), PropertyType::Other("X".into()));
    }

    #[test]
    fn test_full_names_round_trip() {
        for code in ["D", "S", "T", "F"] {
            let pt = PropertyType::from_code(code);
            assert_eq!(PropertyType::from_code(pt.label()), pt);
        }
    }

    #[test]
    fn test_standard_types_sort_before_other() {
        let mut types = vec![
            PropertyType::Other("O".into()),
            PropertyType::Flat,
            PropertyType::Detached,
            PropertyType::Terraced,
            PropertyType::SemiDetached,
        ];
        types.sort();
        assert_eq!(types[0], PropertyType::Detached);
        assert_eq!(types[3], PropertyType::Flat);
        assert_eq!(types[4], PropertyType::Other("O".into()));
    }

    #[test]
    fn test_dataset_file_names() {
        assert_eq!(
            DatasetKind::AveragePriceByYear.file_name(Some(2022)),
            "region_data_2022.csv"
        );
        assert_eq!(
            DatasetKind::AvgPriceDelta.file_name(Some(2021)),
            "avg_price_delta_2021.csv"
        );
        assert_eq!(
            DatasetKind::RegionAvgPrice.file_name(Some(2021)),
            "region_avg_prices.csv"
        );
        assert!(DatasetKind::AvgPriceDelta.requires("delta"));
        assert!(!DatasetKind::AvgPriceDelta.requires("volume"));
    }
}
